//! CRM contact handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::{IntoParams, OpenApi, ToSchema};
use uuid::Uuid;

use super::{like_pattern, trimmed, AuditMeta};
use crate::api::dto::{DeletedResponse, Pagination, PaginationQuery};
use crate::api::validation;
use crate::api::SharedState;
use crate::error::{AppError, Result};
use crate::models::crm::Contact;
use crate::services::audit_service::{AuditAction, ResourceType};

/// Nested under `/api/crm/contacts`.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_contacts).post(create_contact))
        .route(
            "/:id",
            get(get_contact).patch(update_contact).delete(delete_contact),
        )
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListContactsQuery {
    /// Matches first name, last name or email
    pub search: Option<String>,
    pub company_id: Option<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ContactListResponse {
    pub items: Vec<Contact>,
    pub pagination: Pagination,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ContactRequest {
    pub company_id: Option<Uuid>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub title: Option<String>,
    pub notes: Option<String>,
}

fn optional_email(value: Option<String>) -> Result<Option<String>> {
    let email = trimmed(value).map(|e| e.to_lowercase());
    if let Some(email) = email.as_deref() {
        validation::email("email", email)?;
    }
    Ok(email)
}

/// List contacts
#[utoipa::path(
    get,
    path = "",
    context_path = "/api/crm/contacts",
    tag = "crm",
    params(ListContactsQuery, PaginationQuery),
    responses((status = 200, description = "Contacts", body = ContactListResponse)),
    security(("bearer_auth" = []))
)]
pub async fn list_contacts(
    State(state): State<SharedState>,
    Query(query): Query<ListContactsQuery>,
    Query(pagination): Query<PaginationQuery>,
) -> Result<Json<ContactListResponse>> {
    let search = like_pattern(query.search.as_deref());

    let items: Vec<Contact> = sqlx::query_as(
        r#"
        SELECT * FROM contacts
        WHERE ($1::text IS NULL OR first_name ILIKE $1 OR last_name ILIKE $1 OR email ILIKE $1)
          AND ($2::uuid IS NULL OR company_id = $2)
        ORDER BY first_name ASC, last_name ASC NULLS FIRST
        OFFSET $3 LIMIT $4
        "#,
    )
    .bind(&search)
    .bind(query.company_id)
    .bind(pagination.offset())
    .bind(pagination.limit())
    .fetch_all(&state.db)
    .await?;

    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM contacts
        WHERE ($1::text IS NULL OR first_name ILIKE $1 OR last_name ILIKE $1 OR email ILIKE $1)
          AND ($2::uuid IS NULL OR company_id = $2)
        "#,
    )
    .bind(&search)
    .bind(query.company_id)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(ContactListResponse {
        items,
        pagination: Pagination::from_query_and_total(&pagination, total),
    }))
}

/// Get a contact
#[utoipa::path(
    get,
    path = "/{id}",
    context_path = "/api/crm/contacts",
    tag = "crm",
    params(("id" = Uuid, Path, description = "Contact ID")),
    responses(
        (status = 200, description = "Contact", body = Contact),
        (status = 404, description = "Contact not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_contact(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Contact>> {
    let contact: Contact = sqlx::query_as("SELECT * FROM contacts WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Contact not found".to_string()))?;
    Ok(Json(contact))
}

/// Create a contact
#[utoipa::path(
    post,
    path = "",
    context_path = "/api/crm/contacts",
    tag = "crm",
    request_body = ContactRequest,
    responses(
        (status = 201, description = "Contact created", body = Contact),
        (status = 400, description = "Validation error or unknown company")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_contact(
    State(state): State<SharedState>,
    meta: AuditMeta,
    Json(payload): Json<ContactRequest>,
) -> Result<(StatusCode, Json<Contact>)> {
    let first_name = validation::required("first_name", payload.first_name.as_deref())?;
    validation::max_len("first_name", first_name, 100)?;
    let email = optional_email(payload.email)?;

    let contact: Contact = sqlx::query_as(
        r#"
        INSERT INTO contacts (company_id, first_name, last_name, email, phone, title, notes)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(payload.company_id)
    .bind(first_name)
    .bind(trimmed(payload.last_name))
    .bind(&email)
    .bind(trimmed(payload.phone))
    .bind(trimmed(payload.title))
    .bind(trimmed(payload.notes))
    .fetch_one(&state.db)
    .await
    .map_err(|e| AppError::from_write(e, "Contact already exists"))?;

    state
        .audit()
        .record(
            meta.entry(AuditAction::Created, ResourceType::Contact)
                .resource(contact.id)
                .details(json!({ "company_id": contact.company_id })),
        )
        .await;

    Ok((StatusCode::CREATED, Json(contact)))
}

/// Update a contact
#[utoipa::path(
    patch,
    path = "/{id}",
    context_path = "/api/crm/contacts",
    tag = "crm",
    params(("id" = Uuid, Path, description = "Contact ID")),
    request_body = ContactRequest,
    responses(
        (status = 200, description = "Contact updated", body = Contact),
        (status = 400, description = "Validation error or unknown company"),
        (status = 404, description = "Contact not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_contact(
    State(state): State<SharedState>,
    meta: AuditMeta,
    Path(id): Path<Uuid>,
    Json(payload): Json<ContactRequest>,
) -> Result<Json<Contact>> {
    let first_name = validation::optional("first_name", payload.first_name.as_deref(), 100)?;
    let email = optional_email(payload.email)?;

    let contact: Contact = sqlx::query_as(
        r#"
        UPDATE contacts SET
            company_id = COALESCE($2, company_id),
            first_name = COALESCE($3, first_name),
            last_name = COALESCE($4, last_name),
            email = COALESCE($5, email),
            phone = COALESCE($6, phone),
            title = COALESCE($7, title),
            notes = COALESCE($8, notes),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(payload.company_id)
    .bind(&first_name)
    .bind(trimmed(payload.last_name))
    .bind(&email)
    .bind(trimmed(payload.phone))
    .bind(trimmed(payload.title))
    .bind(trimmed(payload.notes))
    .fetch_optional(&state.db)
    .await
    .map_err(|e| AppError::from_write(e, "Contact already exists"))?
    .ok_or_else(|| AppError::NotFound("Contact not found".to_string()))?;

    state
        .audit()
        .record(meta.entry(AuditAction::Updated, ResourceType::Contact).resource(id))
        .await;

    Ok(Json(contact))
}

/// Delete a contact
#[utoipa::path(
    delete,
    path = "/{id}",
    context_path = "/api/crm/contacts",
    tag = "crm",
    params(("id" = Uuid, Path, description = "Contact ID")),
    responses(
        (status = 200, description = "Contact deleted", body = DeletedResponse),
        (status = 404, description = "Contact not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_contact(
    State(state): State<SharedState>,
    meta: AuditMeta,
    Path(id): Path<Uuid>,
) -> Result<Json<DeletedResponse>> {
    let result = sqlx::query("DELETE FROM contacts WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Contact not found".to_string()));
    }

    state
        .audit()
        .record(meta.entry(AuditAction::Deleted, ResourceType::Contact).resource(id))
        .await;

    Ok(Json(DeletedResponse { deleted: true }))
}

#[derive(OpenApi)]
#[openapi(
    paths(list_contacts, get_contact, create_contact, update_contact, delete_contact),
    components(schemas(Contact, ContactListResponse, ContactRequest))
)]
pub struct ContactsApiDoc;
