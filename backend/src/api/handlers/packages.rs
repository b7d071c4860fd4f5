//! Package handlers.

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
use crate::models::package::Package;
use crate::models::scoping::ScopingFactor;
use crate::services::audit_service::{AuditAction, ResourceType};

const DUPLICATE_SLUG: &str = "A package with this slug already exists";

/// Public routes, nested under `/api/packages`.
pub fn public_router() -> Router<SharedState> {
    Router::new()
        .route("/:id", get(get_public_package))
        .route("/:id/scoping-factors", get(list_package_factors))
}

/// Admin routes, nested under `/api/admin/packages`.
pub fn admin_router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_packages).post(create_package))
        .route(
            "/:id",
            get(get_package).patch(update_package).delete(delete_package),
        )
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PackageListResponse {
    pub items: Vec<Package>,
    pub pagination: Pagination,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListPackagesQuery {
    pub service_id: Option<Uuid>,
    pub search: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreatePackageRequest {
    pub service_id: Option<Uuid>,
    pub slug: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub base_price_cents: Option<i64>,
    pub base_timeline_weeks: Option<i32>,
    pub features: Option<Vec<String>>,
    pub is_popular: Option<bool>,
    pub is_active: Option<bool>,
    pub sort_order: Option<i32>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdatePackageRequest {
    pub service_id: Option<Uuid>,
    pub slug: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub base_price_cents: Option<i64>,
    pub base_timeline_weeks: Option<i32>,
    pub features: Option<Vec<String>>,
    pub is_popular: Option<bool>,
    pub is_active: Option<bool>,
    pub sort_order: Option<i32>,
}

fn validate_pricing(price_cents: Option<i64>, timeline_weeks: Option<i32>) -> Result<()> {
    if let Some(price) = price_cents {
        validation::non_negative("base_price_cents", price)?;
    }
    if let Some(weeks) = timeline_weeks {
        validation::non_negative("base_timeline_weeks", weeks)?;
    }
    Ok(())
}

/// Get an active package
#[utoipa::path(
    get,
    path = "/{id}",
    context_path = "/api/packages",
    tag = "catalog",
    params(("id" = Uuid, Path, description = "Package ID")),
    responses(
        (status = 200, description = "Package", body = Package),
        (status = 404, description = "Package not found")
    )
)]
pub async fn get_public_package(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Package>> {
    Ok(Json(state.scoping().active_package(id).await?))
}

/// Scoping quiz questions for a package
#[utoipa::path(
    get,
    path = "/{id}/scoping-factors",
    context_path = "/api/packages",
    tag = "scoping",
    params(("id" = Uuid, Path, description = "Package ID")),
    responses(
        (status = 200, description = "Active factors, package-specific and global", body = Vec<ScopingFactor>),
        (status = 404, description = "Package not found")
    )
)]
pub async fn list_package_factors(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<ScopingFactor>>> {
    let scoping = state.scoping();
    scoping.active_package(id).await?;
    Ok(Json(scoping.factors_for_package(id).await?))
}

/// List packages (admin)
#[utoipa::path(
    get,
    path = "",
    context_path = "/api/admin/packages",
    tag = "catalog",
    params(ListPackagesQuery, PaginationQuery),
    responses((status = 200, description = "Packages", body = PackageListResponse)),
    security(("bearer_auth" = []))
)]
pub async fn list_packages(
    State(state): State<SharedState>,
    Query(query): Query<ListPackagesQuery>,
    Query(pagination): Query<PaginationQuery>,
) -> Result<Json<PackageListResponse>> {
    let search = like_pattern(query.search.as_deref());

    let items: Vec<Package> = sqlx::query_as(
        r#"
        SELECT * FROM packages
        WHERE ($1::uuid IS NULL OR service_id = $1)
          AND ($2::text IS NULL OR name ILIKE $2 OR slug ILIKE $2)
          AND ($3::boolean IS NULL OR is_active = $3)
        ORDER BY sort_order, name
        OFFSET $4 LIMIT $5
        "#,
    )
    .bind(query.service_id)
    .bind(&search)
    .bind(query.is_active)
    .bind(pagination.offset())
    .bind(pagination.limit())
    .fetch_all(&state.db)
    .await?;

    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM packages
        WHERE ($1::uuid IS NULL OR service_id = $1)
          AND ($2::text IS NULL OR name ILIKE $2 OR slug ILIKE $2)
          AND ($3::boolean IS NULL OR is_active = $3)
        "#,
    )
    .bind(query.service_id)
    .bind(&search)
    .bind(query.is_active)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(PackageListResponse {
        items,
        pagination: Pagination::from_query_and_total(&pagination, total),
    }))
}

/// Get a package (admin)
#[utoipa::path(
    get,
    path = "/{id}",
    context_path = "/api/admin/packages",
    tag = "catalog",
    params(("id" = Uuid, Path, description = "Package ID")),
    responses(
        (status = 200, description = "Package", body = Package),
        (status = 404, description = "Package not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_package(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Package>> {
    let package: Package = sqlx::query_as("SELECT * FROM packages WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Package not found".to_string()))?;
    Ok(Json(package))
}

/// Create a package
#[utoipa::path(
    post,
    path = "",
    context_path = "/api/admin/packages",
    tag = "catalog",
    request_body = CreatePackageRequest,
    responses(
        (status = 201, description = "Package created", body = Package),
        (status = 400, description = "Validation error"),
        (status = 409, description = "Slug already in use")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_package(
    State(state): State<SharedState>,
    meta: AuditMeta,
    Json(payload): Json<CreatePackageRequest>,
) -> Result<(StatusCode, Json<Package>)> {
    let service_id = payload
        .service_id
        .ok_or_else(|| AppError::Validation("service_id is required".to_string()))?;
    let name = validation::required("name", payload.name.as_deref())?;
    validation::max_len("name", name, 200)?;
    let slug = validation::required("slug", payload.slug.as_deref())?;
    validation::slug(slug)?;
    validate_pricing(payload.base_price_cents, payload.base_timeline_weeks)?;

    let package: Package = sqlx::query_as(
        r#"
        INSERT INTO packages (
            service_id, slug, name, description, base_price_cents, base_timeline_weeks,
            features, is_popular, is_active, sort_order
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING *
        "#,
    )
    .bind(service_id)
    .bind(slug)
    .bind(name)
    .bind(trimmed(payload.description))
    .bind(payload.base_price_cents.unwrap_or(0))
    .bind(payload.base_timeline_weeks.unwrap_or(0))
    .bind(payload.features.unwrap_or_default())
    .bind(payload.is_popular.unwrap_or(false))
    .bind(payload.is_active.unwrap_or(true))
    .bind(payload.sort_order.unwrap_or(0))
    .fetch_one(&state.db)
    .await
    .map_err(|e| AppError::from_write(e, DUPLICATE_SLUG))?;

    tracing::info!(package_id = %package.id, slug = %package.slug, "Package created");

    state
        .audit()
        .record(
            meta.entry(AuditAction::Created, ResourceType::Package)
                .resource(package.id)
                .details(json!({
                    "slug": package.slug,
                    "service_id": package.service_id,
                    "base_price_cents": package.base_price_cents,
                })),
        )
        .await;

    Ok((StatusCode::CREATED, Json(package)))
}

/// Update a package
#[utoipa::path(
    patch,
    path = "/{id}",
    context_path = "/api/admin/packages",
    tag = "catalog",
    params(("id" = Uuid, Path, description = "Package ID")),
    request_body = UpdatePackageRequest,
    responses(
        (status = 200, description = "Package updated", body = Package),
        (status = 400, description = "Validation error"),
        (status = 404, description = "Package not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_package(
    State(state): State<SharedState>,
    meta: AuditMeta,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdatePackageRequest>,
) -> Result<Json<Package>> {
    if let Some(name) = payload.name.as_deref() {
        validation::max_len("name", validation::required("name", Some(name))?, 200)?;
    }
    let slug = payload.slug.as_deref().map(str::trim);
    if let Some(slug) = slug {
        validation::slug(slug)?;
    }
    validate_pricing(payload.base_price_cents, payload.base_timeline_weeks)?;

    let package: Package = sqlx::query_as(
        r#"
        UPDATE packages SET
            service_id = COALESCE($2, service_id),
            slug = COALESCE($3, slug),
            name = COALESCE($4, name),
            description = COALESCE($5, description),
            base_price_cents = COALESCE($6, base_price_cents),
            base_timeline_weeks = COALESCE($7, base_timeline_weeks),
            features = COALESCE($8, features),
            is_popular = COALESCE($9, is_popular),
            is_active = COALESCE($10, is_active),
            sort_order = COALESCE($11, sort_order),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(payload.service_id)
    .bind(slug)
    .bind(trimmed(payload.name))
    .bind(trimmed(payload.description))
    .bind(payload.base_price_cents)
    .bind(payload.base_timeline_weeks)
    .bind(&payload.features)
    .bind(payload.is_popular)
    .bind(payload.is_active)
    .bind(payload.sort_order)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| AppError::from_write(e, DUPLICATE_SLUG))?
    .ok_or_else(|| AppError::NotFound("Package not found".to_string()))?;

    state
        .audit()
        .record(
            meta.entry(AuditAction::Updated, ResourceType::Package)
                .resource(id)
                .details(json!({
                    "slug": package.slug,
                    "base_price_cents": package.base_price_cents,
                    "base_timeline_weeks": package.base_timeline_weeks,
                })),
        )
        .await;

    Ok(Json(package))
}

/// Delete a package
#[utoipa::path(
    delete,
    path = "/{id}",
    context_path = "/api/admin/packages",
    tag = "catalog",
    params(("id" = Uuid, Path, description = "Package ID")),
    responses(
        (status = 200, description = "Package deleted", body = DeletedResponse),
        (status = 404, description = "Package not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_package(
    State(state): State<SharedState>,
    meta: AuditMeta,
    Path(id): Path<Uuid>,
) -> Result<Json<DeletedResponse>> {
    let slug: Option<String> =
        sqlx::query_scalar("DELETE FROM packages WHERE id = $1 RETURNING slug")
            .bind(id)
            .fetch_optional(&state.db)
            .await?;

    let Some(slug) = slug else {
        return Err(AppError::NotFound("Package not found".to_string()));
    };

    state
        .audit()
        .record(
            meta.entry(AuditAction::Deleted, ResourceType::Package)
                .resource(id)
                .details(json!({ "slug": slug })),
        )
        .await;

    Ok(Json(DeletedResponse { deleted: true }))
}

#[derive(OpenApi)]
#[openapi(
    paths(
        get_public_package,
        list_package_factors,
        list_packages,
        get_package,
        create_package,
        update_package,
        delete_package,
    ),
    components(schemas(
        Package,
        PackageListResponse,
        CreatePackageRequest,
        UpdatePackageRequest,
    ))
)]
pub struct PackagesApiDoc;
