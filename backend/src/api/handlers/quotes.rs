//! Quote handlers: visitors save a scoping result, admins follow up.

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
use crate::api::dto::{Pagination, PaginationQuery};
use crate::api::validation;
use crate::api::SharedState;
use crate::error::{AppError, Result};
use crate::models::quote::{Quote, QuoteStatus};
use crate::services::audit_service::{AuditAction, ResourceType};
use crate::services::scoping_service::ScopingInputs;
use crate::services::slack_service;

/// Admin routes, nested under `/api/admin/quotes`.
pub fn admin_router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_quotes))
        .route("/:id", get(get_quote).patch(update_quote))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateQuoteRequest {
    pub package_id: Option<Uuid>,
    #[schema(value_type = Object)]
    pub inputs: Option<ScopingInputs>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub company: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateQuoteRequest {
    pub status: Option<QuoteStatus>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListQuotesQuery {
    pub status: Option<QuoteStatus>,
    pub package_id: Option<Uuid>,
    /// Matches name, email or company
    pub search: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct QuoteListResponse {
    pub items: Vec<Quote>,
    pub pagination: Pagination,
}

/// Save a quote
///
/// Prices the answers exactly like `/api/scoping/calculate` and stores the
/// result with the visitor's details.
#[utoipa::path(
    post,
    path = "",
    context_path = "/api/quotes",
    tag = "scoping",
    request_body = CreateQuoteRequest,
    responses(
        (status = 201, description = "Quote saved", body = Quote),
        (status = 400, description = "Validation error"),
        (status = 404, description = "Package not found"),
        (status = 429, description = "Too many submissions")
    )
)]
pub async fn create_quote(
    State(state): State<SharedState>,
    meta: AuditMeta,
    Json(payload): Json<CreateQuoteRequest>,
) -> Result<(StatusCode, Json<Quote>)> {
    let package_id = payload
        .package_id
        .ok_or_else(|| AppError::Validation("package_id is required".to_string()))?;
    let name = validation::required("name", payload.name.as_deref())?;
    validation::max_len("name", name, 200)?;
    let email = validation::required("email", payload.email.as_deref())?;
    validation::email("email", email)?;
    let company = trimmed(payload.company);
    if let Some(company) = company.as_deref() {
        validation::max_len("company", company, 200)?;
    }
    let notes = trimmed(payload.notes);
    if let Some(notes) = notes.as_deref() {
        validation::max_len("notes", notes, 5000)?;
    }
    let inputs = payload.inputs.unwrap_or_default();

    let scoping = state.scoping();
    let package = scoping.active_package(package_id).await?;
    let result = scoping.calculate(&package, &inputs).await?;

    let quote: Quote = sqlx::query_as(
        r#"
        INSERT INTO quotes (
            package_id, name, email, company, notes, inputs,
            base_price_cents, total_price_cents, base_timeline_weeks, total_timeline_weeks, breakdown
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING *
        "#,
    )
    .bind(package_id)
    .bind(name)
    .bind(email)
    .bind(&company)
    .bind(&notes)
    .bind(serde_json::Value::Object(inputs))
    .bind(result.base_price_cents)
    .bind(result.total_price_cents)
    .bind(result.base_timeline_weeks)
    .bind(result.total_timeline_weeks)
    .bind(serde_json::to_value(&result.adjustments)?)
    .fetch_one(&state.db)
    .await?;

    tracing::info!(
        quote_id = %quote.id,
        package_id = %package_id,
        total_price_cents = quote.total_price_cents,
        "Quote saved"
    );

    if let Some(slack) = &state.slack {
        if let Err(e) = slack
            .notify(&slack_service::quote_message(&quote, &package.name))
            .await
        {
            tracing::warn!(quote_id = %quote.id, error = %e, "Failed to notify Slack about quote");
        }
    }

    state
        .audit()
        .record(
            meta.entry(AuditAction::Created, ResourceType::Quote)
                .resource(quote.id)
                .details(json!({
                    "package_id": package_id,
                    "total_price_cents": quote.total_price_cents,
                })),
        )
        .await;

    Ok((StatusCode::CREATED, Json(quote)))
}

/// List quotes (admin), newest first
#[utoipa::path(
    get,
    path = "",
    context_path = "/api/admin/quotes",
    tag = "scoping",
    params(ListQuotesQuery, PaginationQuery),
    responses((status = 200, description = "Quotes", body = QuoteListResponse)),
    security(("bearer_auth" = []))
)]
pub async fn list_quotes(
    State(state): State<SharedState>,
    Query(query): Query<ListQuotesQuery>,
    Query(pagination): Query<PaginationQuery>,
) -> Result<Json<QuoteListResponse>> {
    let search = like_pattern(query.search.as_deref());

    let items: Vec<Quote> = sqlx::query_as(
        r#"
        SELECT * FROM quotes
        WHERE ($1::quote_status IS NULL OR status = $1)
          AND ($2::uuid IS NULL OR package_id = $2)
          AND ($3::text IS NULL OR name ILIKE $3 OR email ILIKE $3 OR company ILIKE $3)
        ORDER BY created_at DESC
        OFFSET $4 LIMIT $5
        "#,
    )
    .bind(query.status)
    .bind(query.package_id)
    .bind(&search)
    .bind(pagination.offset())
    .bind(pagination.limit())
    .fetch_all(&state.db)
    .await?;

    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM quotes
        WHERE ($1::quote_status IS NULL OR status = $1)
          AND ($2::uuid IS NULL OR package_id = $2)
          AND ($3::text IS NULL OR name ILIKE $3 OR email ILIKE $3 OR company ILIKE $3)
        "#,
    )
    .bind(query.status)
    .bind(query.package_id)
    .bind(&search)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(QuoteListResponse {
        items,
        pagination: Pagination::from_query_and_total(&pagination, total),
    }))
}

/// Get a quote
#[utoipa::path(
    get,
    path = "/{id}",
    context_path = "/api/admin/quotes",
    tag = "scoping",
    params(("id" = Uuid, Path, description = "Quote ID")),
    responses(
        (status = 200, description = "Quote", body = Quote),
        (status = 404, description = "Quote not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_quote(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Quote>> {
    let quote: Quote = sqlx::query_as("SELECT * FROM quotes WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Quote not found".to_string()))?;
    Ok(Json(quote))
}

/// Update a quote's follow-up status or notes
#[utoipa::path(
    patch,
    path = "/{id}",
    context_path = "/api/admin/quotes",
    tag = "scoping",
    params(("id" = Uuid, Path, description = "Quote ID")),
    request_body = UpdateQuoteRequest,
    responses(
        (status = 200, description = "Quote updated", body = Quote),
        (status = 400, description = "Nothing to update"),
        (status = 404, description = "Quote not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_quote(
    State(state): State<SharedState>,
    meta: AuditMeta,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateQuoteRequest>,
) -> Result<Json<Quote>> {
    let notes = trimmed(payload.notes);
    if payload.status.is_none() && notes.is_none() {
        return Err(AppError::Validation(
            "status or notes is required".to_string(),
        ));
    }

    let previous: Option<QuoteStatus> =
        sqlx::query_scalar("SELECT status FROM quotes WHERE id = $1")
            .bind(id)
            .fetch_optional(&state.db)
            .await?;
    let Some(previous) = previous else {
        return Err(AppError::NotFound("Quote not found".to_string()));
    };

    let quote: Quote = sqlx::query_as(
        r#"
        UPDATE quotes SET
            status = COALESCE($2, status),
            notes = COALESCE($3, notes),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(payload.status)
    .bind(&notes)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound("Quote not found".to_string()))?;

    let action = if quote.status != previous {
        AuditAction::StatusChanged
    } else {
        AuditAction::Updated
    };
    state
        .audit()
        .record(
            meta.entry(action, ResourceType::Quote)
                .resource(id)
                .details(json!({ "from": previous, "to": quote.status })),
        )
        .await;

    Ok(Json(quote))
}

#[derive(OpenApi)]
#[openapi(
    paths(create_quote, list_quotes, get_quote, update_quote),
    components(schemas(
        Quote,
        QuoteStatus,
        CreateQuoteRequest,
        UpdateQuoteRequest,
        QuoteListResponse,
    ))
)]
pub struct QuotesApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    use axum::routing::post;

    use crate::api::handlers::test_support::{self, assert_validation};

    fn public_app() -> Router {
        Router::new()
            .route("/", post(create_quote))
            .with_state(test_support::state())
    }

    #[tokio::test]
    async fn test_create_requires_name() {
        let (status, body) = test_support::send(
            public_app(),
            "POST",
            "/",
            Some(json!({
                "package_id": Uuid::new_v4(),
                "email": "ada@example.com",
                "inputs": {},
            })),
        )
        .await;
        assert_validation(status, &body, "name is required");
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_email() {
        let (status, body) = test_support::send(
            public_app(),
            "POST",
            "/",
            Some(json!({
                "package_id": Uuid::new_v4(),
                "name": "Ada",
                "email": "ada-at-example",
            })),
        )
        .await;
        assert_validation(status, &body, "valid email");
    }

    #[tokio::test]
    async fn test_create_requires_package() {
        let (status, body) = test_support::send(
            public_app(),
            "POST",
            "/",
            Some(json!({ "name": "Ada", "email": "ada@example.com" })),
        )
        .await;
        assert_validation(status, &body, "package_id is required");
    }

    #[tokio::test]
    async fn test_update_requires_a_field() {
        let app = admin_router().with_state(test_support::state());
        let uri = format!("/{}", Uuid::new_v4());
        let (status, body) = test_support::send(app, "PATCH", &uri, Some(json!({}))).await;
        assert_validation(status, &body, "status or notes");
    }

    #[tokio::test]
    async fn test_update_rejects_unknown_status() {
        let app = admin_router().with_state(test_support::state());
        let uri = format!("/{}", Uuid::new_v4());
        let (status, _) =
            test_support::send(app, "PATCH", &uri, Some(json!({ "status": "archived" }))).await;
        assert!(status.is_client_error());
    }
}
