//! CRM company handlers.

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
use crate::models::crm::Company;
use crate::services::audit_service::{AuditAction, ResourceType};

/// Nested under `/api/crm/companies`.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_companies).post(create_company))
        .route(
            "/:id",
            get(get_company).patch(update_company).delete(delete_company),
        )
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListCompaniesQuery {
    /// Matches name or domain
    pub search: Option<String>,
    pub industry: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CompanyListResponse {
    pub items: Vec<Company>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CompanyDetail {
    #[serde(flatten)]
    pub company: Company,
    pub contact_count: i64,
    pub deal_count: i64,
    pub project_count: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateCompanyRequest {
    pub name: Option<String>,
    pub domain: Option<String>,
    pub industry: Option<String>,
    pub size: Option<String>,
    pub website: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateCompanyRequest {
    pub name: Option<String>,
    pub domain: Option<String>,
    pub industry: Option<String>,
    pub size: Option<String>,
    pub website: Option<String>,
    pub notes: Option<String>,
}

/// List companies
#[utoipa::path(
    get,
    path = "",
    context_path = "/api/crm/companies",
    tag = "crm",
    params(ListCompaniesQuery, PaginationQuery),
    responses((status = 200, description = "Companies by name", body = CompanyListResponse)),
    security(("bearer_auth" = []))
)]
pub async fn list_companies(
    State(state): State<SharedState>,
    Query(query): Query<ListCompaniesQuery>,
    Query(pagination): Query<PaginationQuery>,
) -> Result<Json<CompanyListResponse>> {
    let search = like_pattern(query.search.as_deref());
    let industry = trimmed(query.industry);

    let items: Vec<Company> = sqlx::query_as(
        r#"
        SELECT * FROM companies
        WHERE ($1::text IS NULL OR name ILIKE $1 OR domain ILIKE $1)
          AND ($2::text IS NULL OR industry = $2)
        ORDER BY name ASC
        OFFSET $3 LIMIT $4
        "#,
    )
    .bind(&search)
    .bind(&industry)
    .bind(pagination.offset())
    .bind(pagination.limit())
    .fetch_all(&state.db)
    .await?;

    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM companies
        WHERE ($1::text IS NULL OR name ILIKE $1 OR domain ILIKE $1)
          AND ($2::text IS NULL OR industry = $2)
        "#,
    )
    .bind(&search)
    .bind(&industry)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(CompanyListResponse {
        items,
        pagination: Pagination::from_query_and_total(&pagination, total),
    }))
}

/// Get a company with related record counts
#[utoipa::path(
    get,
    path = "/{id}",
    context_path = "/api/crm/companies",
    tag = "crm",
    params(("id" = Uuid, Path, description = "Company ID")),
    responses(
        (status = 200, description = "Company", body = CompanyDetail),
        (status = 404, description = "Company not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_company(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CompanyDetail>> {
    let company: Company = sqlx::query_as("SELECT * FROM companies WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Company not found".to_string()))?;

    let (contact_count, deal_count, project_count): (i64, i64, i64) = sqlx::query_as(
        r#"
        SELECT
            (SELECT COUNT(*) FROM contacts WHERE company_id = $1),
            (SELECT COUNT(*) FROM deals WHERE company_id = $1),
            (SELECT COUNT(*) FROM projects WHERE company_id = $1)
        "#,
    )
    .bind(id)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(CompanyDetail {
        company,
        contact_count,
        deal_count,
        project_count,
    }))
}

/// Create a company
#[utoipa::path(
    post,
    path = "",
    context_path = "/api/crm/companies",
    tag = "crm",
    request_body = CreateCompanyRequest,
    responses(
        (status = 201, description = "Company created", body = Company),
        (status = 400, description = "Validation error")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_company(
    State(state): State<SharedState>,
    meta: AuditMeta,
    Json(payload): Json<CreateCompanyRequest>,
) -> Result<(StatusCode, Json<Company>)> {
    let name = validation::required("name", payload.name.as_deref())?;
    validation::max_len("name", name, 200)?;

    let company: Company = sqlx::query_as(
        r#"
        INSERT INTO companies (name, domain, industry, size, website, notes)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(name)
    .bind(trimmed(payload.domain).map(|d| d.to_lowercase()))
    .bind(trimmed(payload.industry))
    .bind(trimmed(payload.size))
    .bind(trimmed(payload.website))
    .bind(trimmed(payload.notes))
    .fetch_one(&state.db)
    .await?;

    state
        .audit()
        .record(
            meta.entry(AuditAction::Created, ResourceType::Company)
                .resource(company.id)
                .details(json!({ "name": company.name })),
        )
        .await;

    Ok((StatusCode::CREATED, Json(company)))
}

/// Update a company
#[utoipa::path(
    patch,
    path = "/{id}",
    context_path = "/api/crm/companies",
    tag = "crm",
    params(("id" = Uuid, Path, description = "Company ID")),
    request_body = UpdateCompanyRequest,
    responses(
        (status = 200, description = "Company updated", body = Company),
        (status = 400, description = "Validation error"),
        (status = 404, description = "Company not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_company(
    State(state): State<SharedState>,
    meta: AuditMeta,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateCompanyRequest>,
) -> Result<Json<Company>> {
    let name = validation::optional("name", payload.name.as_deref(), 200)?;

    let company: Company = sqlx::query_as(
        r#"
        UPDATE companies SET
            name = COALESCE($2, name),
            domain = COALESCE($3, domain),
            industry = COALESCE($4, industry),
            size = COALESCE($5, size),
            website = COALESCE($6, website),
            notes = COALESCE($7, notes),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(&name)
    .bind(trimmed(payload.domain).map(|d| d.to_lowercase()))
    .bind(trimmed(payload.industry))
    .bind(trimmed(payload.size))
    .bind(trimmed(payload.website))
    .bind(trimmed(payload.notes))
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound("Company not found".to_string()))?;

    state
        .audit()
        .record(meta.entry(AuditAction::Updated, ResourceType::Company).resource(id))
        .await;

    Ok(Json(company))
}

/// Delete a company
///
/// Contacts, deals and projects stay and lose their company link.
#[utoipa::path(
    delete,
    path = "/{id}",
    context_path = "/api/crm/companies",
    tag = "crm",
    params(("id" = Uuid, Path, description = "Company ID")),
    responses(
        (status = 200, description = "Company deleted", body = DeletedResponse),
        (status = 404, description = "Company not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_company(
    State(state): State<SharedState>,
    meta: AuditMeta,
    Path(id): Path<Uuid>,
) -> Result<Json<DeletedResponse>> {
    let name: Option<String> =
        sqlx::query_scalar("DELETE FROM companies WHERE id = $1 RETURNING name")
            .bind(id)
            .fetch_optional(&state.db)
            .await?;
    let Some(name) = name else {
        return Err(AppError::NotFound("Company not found".to_string()));
    };

    state
        .audit()
        .record(
            meta.entry(AuditAction::Deleted, ResourceType::Company)
                .resource(id)
                .details(json!({ "name": name })),
        )
        .await;

    Ok(Json(DeletedResponse { deleted: true }))
}

#[derive(OpenApi)]
#[openapi(
    paths(list_companies, get_company, create_company, update_company, delete_company),
    components(schemas(
        Company,
        CompanyDetail,
        CompanyListResponse,
        CreateCompanyRequest,
        UpdateCompanyRequest,
    ))
)]
pub struct CompaniesApiDoc;
