//! Service catalog handlers.
//!
//! Public routes only ever return active services and packages; the admin
//! routes see everything.

use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use utoipa::{IntoParams, OpenApi, ToSchema};
use uuid::Uuid;

use super::{like_pattern, trimmed, AuditMeta};
use crate::api::dto::{DeletedResponse, Pagination, PaginationQuery};
use crate::api::validation;
use crate::api::SharedState;
use crate::error::{AppError, Result};
use crate::models::package::Package;
use crate::models::service::Service;
use crate::services::audit_service::{AuditAction, ResourceType};

const DUPLICATE_SLUG: &str = "A service with this slug already exists";

/// Public catalog routes, nested under `/api/services`.
pub fn public_router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_public_services))
        .route("/:slug", get(get_public_service))
}

/// Admin routes, nested under `/api/admin/services`.
pub fn admin_router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_services).post(create_service))
        .route(
            "/:id",
            get(get_service).patch(update_service).delete(delete_service),
        )
}

/// A service with its packages.
#[derive(Debug, Serialize, ToSchema)]
pub struct ServiceWithPackages {
    #[serde(flatten)]
    pub service: Service,
    pub packages: Vec<Package>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ServiceListResponse {
    pub items: Vec<Service>,
    pub pagination: Pagination,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListServicesQuery {
    /// Case-insensitive match on name or slug
    pub search: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateServiceRequest {
    pub slug: Option<String>,
    pub name: Option<String>,
    pub tagline: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub icon: Option<String>,
    pub features: Option<Vec<String>>,
    pub is_active: Option<bool>,
    pub sort_order: Option<i32>,
}

/// Fields left out (or null) keep their current value.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateServiceRequest {
    pub slug: Option<String>,
    pub name: Option<String>,
    pub tagline: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub icon: Option<String>,
    pub features: Option<Vec<String>>,
    pub is_active: Option<bool>,
    pub sort_order: Option<i32>,
}

/// Active packages of the given services, grouped by service.
pub(crate) async fn active_packages_by_service(
    db: &PgPool,
    service_ids: &[Uuid],
) -> Result<HashMap<Uuid, Vec<Package>>> {
    let packages: Vec<Package> = sqlx::query_as(
        r#"
        SELECT * FROM packages
        WHERE service_id = ANY($1) AND is_active = true
        ORDER BY sort_order, base_price_cents, name
        "#,
    )
    .bind(service_ids)
    .fetch_all(db)
    .await?;

    let mut grouped: HashMap<Uuid, Vec<Package>> = HashMap::new();
    for package in packages {
        grouped.entry(package.service_id).or_default().push(package);
    }
    Ok(grouped)
}

/// List active services with their packages
#[utoipa::path(
    get,
    path = "",
    context_path = "/api/services",
    tag = "catalog",
    responses(
        (status = 200, description = "Active services", body = Vec<ServiceWithPackages>)
    )
)]
pub async fn list_public_services(
    State(state): State<SharedState>,
) -> Result<Json<Vec<ServiceWithPackages>>> {
    let services: Vec<Service> = sqlx::query_as(
        "SELECT * FROM services WHERE is_active = true ORDER BY sort_order, name",
    )
    .fetch_all(&state.db)
    .await?;

    let ids: Vec<Uuid> = services.iter().map(|s| s.id).collect();
    let mut packages = active_packages_by_service(&state.db, &ids).await?;

    let items = services
        .into_iter()
        .map(|service| ServiceWithPackages {
            packages: packages.remove(&service.id).unwrap_or_default(),
            service,
        })
        .collect();

    Ok(Json(items))
}

/// Get an active service by slug
#[utoipa::path(
    get,
    path = "/{slug}",
    context_path = "/api/services",
    tag = "catalog",
    params(("slug" = String, Path, description = "Service slug")),
    responses(
        (status = 200, description = "Service with packages", body = ServiceWithPackages),
        (status = 404, description = "Service not found")
    )
)]
pub async fn get_public_service(
    State(state): State<SharedState>,
    Path(slug): Path<String>,
) -> Result<Json<ServiceWithPackages>> {
    let service: Service =
        sqlx::query_as("SELECT * FROM services WHERE slug = $1 AND is_active = true")
            .bind(&slug)
            .fetch_optional(&state.db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Service '{}' not found", slug)))?;

    let packages = active_packages_by_service(&state.db, &[service.id])
        .await?
        .remove(&service.id)
        .unwrap_or_default();

    Ok(Json(ServiceWithPackages { service, packages }))
}

/// List services (admin)
#[utoipa::path(
    get,
    path = "",
    context_path = "/api/admin/services",
    tag = "catalog",
    params(ListServicesQuery, PaginationQuery),
    responses(
        (status = 200, description = "Services", body = ServiceListResponse),
        (status = 401, description = "Missing or invalid API key")
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_services(
    State(state): State<SharedState>,
    Query(query): Query<ListServicesQuery>,
    Query(pagination): Query<PaginationQuery>,
) -> Result<Json<ServiceListResponse>> {
    let search = like_pattern(query.search.as_deref());

    let items: Vec<Service> = sqlx::query_as(
        r#"
        SELECT * FROM services
        WHERE ($1::text IS NULL OR name ILIKE $1 OR slug ILIKE $1)
          AND ($2::boolean IS NULL OR is_active = $2)
        ORDER BY sort_order, name
        OFFSET $3 LIMIT $4
        "#,
    )
    .bind(&search)
    .bind(query.is_active)
    .bind(pagination.offset())
    .bind(pagination.limit())
    .fetch_all(&state.db)
    .await?;

    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM services
        WHERE ($1::text IS NULL OR name ILIKE $1 OR slug ILIKE $1)
          AND ($2::boolean IS NULL OR is_active = $2)
        "#,
    )
    .bind(&search)
    .bind(query.is_active)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(ServiceListResponse {
        items,
        pagination: Pagination::from_query_and_total(&pagination, total),
    }))
}

/// Get a service (admin)
#[utoipa::path(
    get,
    path = "/{id}",
    context_path = "/api/admin/services",
    tag = "catalog",
    params(("id" = Uuid, Path, description = "Service ID")),
    responses(
        (status = 200, description = "Service", body = Service),
        (status = 404, description = "Service not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_service(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Service>> {
    let service: Service = sqlx::query_as("SELECT * FROM services WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Service not found".to_string()))?;
    Ok(Json(service))
}

/// Create a service
#[utoipa::path(
    post,
    path = "",
    context_path = "/api/admin/services",
    tag = "catalog",
    request_body = CreateServiceRequest,
    responses(
        (status = 201, description = "Service created", body = Service),
        (status = 400, description = "Validation error"),
        (status = 409, description = "Slug already in use")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_service(
    State(state): State<SharedState>,
    meta: AuditMeta,
    Json(payload): Json<CreateServiceRequest>,
) -> Result<(StatusCode, Json<Service>)> {
    let name = validation::required("name", payload.name.as_deref())?;
    validation::max_len("name", name, 200)?;
    let slug = validation::required("slug", payload.slug.as_deref())?;
    validation::slug(slug)?;

    let service: Service = sqlx::query_as(
        r#"
        INSERT INTO services (slug, name, tagline, description, category, icon, features, is_active, sort_order)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING *
        "#,
    )
    .bind(slug)
    .bind(name)
    .bind(trimmed(payload.tagline))
    .bind(trimmed(payload.description))
    .bind(trimmed(payload.category))
    .bind(trimmed(payload.icon))
    .bind(payload.features.unwrap_or_default())
    .bind(payload.is_active.unwrap_or(true))
    .bind(payload.sort_order.unwrap_or(0))
    .fetch_one(&state.db)
    .await
    .map_err(|e| AppError::from_write(e, DUPLICATE_SLUG))?;

    tracing::info!(service_id = %service.id, slug = %service.slug, "Service created");

    state
        .audit()
        .record(
            meta.entry(AuditAction::Created, ResourceType::Service)
                .resource(service.id)
                .details(json!({ "slug": service.slug, "name": service.name })),
        )
        .await;

    Ok((StatusCode::CREATED, Json(service)))
}

/// Update a service
#[utoipa::path(
    patch,
    path = "/{id}",
    context_path = "/api/admin/services",
    tag = "catalog",
    params(("id" = Uuid, Path, description = "Service ID")),
    request_body = UpdateServiceRequest,
    responses(
        (status = 200, description = "Service updated", body = Service),
        (status = 400, description = "Validation error"),
        (status = 404, description = "Service not found"),
        (status = 409, description = "Slug already in use")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_service(
    State(state): State<SharedState>,
    meta: AuditMeta,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateServiceRequest>,
) -> Result<Json<Service>> {
    let name = match payload.name.as_deref() {
        Some(name) => {
            let name = validation::required("name", Some(name))?;
            validation::max_len("name", name, 200)?;
            Some(name.to_string())
        }
        None => None,
    };
    let slug = match payload.slug.as_deref() {
        Some(slug) => {
            let slug = slug.trim();
            validation::slug(slug)?;
            Some(slug.to_string())
        }
        None => None,
    };

    let service: Service = sqlx::query_as(
        r#"
        UPDATE services SET
            slug = COALESCE($2, slug),
            name = COALESCE($3, name),
            tagline = COALESCE($4, tagline),
            description = COALESCE($5, description),
            category = COALESCE($6, category),
            icon = COALESCE($7, icon),
            features = COALESCE($8, features),
            is_active = COALESCE($9, is_active),
            sort_order = COALESCE($10, sort_order),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(&slug)
    .bind(&name)
    .bind(trimmed(payload.tagline))
    .bind(trimmed(payload.description))
    .bind(trimmed(payload.category))
    .bind(trimmed(payload.icon))
    .bind(&payload.features)
    .bind(payload.is_active)
    .bind(payload.sort_order)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| AppError::from_write(e, DUPLICATE_SLUG))?
    .ok_or_else(|| AppError::NotFound("Service not found".to_string()))?;

    state
        .audit()
        .record(
            meta.entry(AuditAction::Updated, ResourceType::Service)
                .resource(id)
                .details(json!({ "slug": service.slug })),
        )
        .await;

    Ok(Json(service))
}

/// Delete a service and its packages
#[utoipa::path(
    delete,
    path = "/{id}",
    context_path = "/api/admin/services",
    tag = "catalog",
    params(("id" = Uuid, Path, description = "Service ID")),
    responses(
        (status = 200, description = "Service deleted", body = DeletedResponse),
        (status = 404, description = "Service not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_service(
    State(state): State<SharedState>,
    meta: AuditMeta,
    Path(id): Path<Uuid>,
) -> Result<Json<DeletedResponse>> {
    let slug: Option<String> = sqlx::query_scalar("DELETE FROM services WHERE id = $1 RETURNING slug")
        .bind(id)
        .fetch_optional(&state.db)
        .await?;

    let Some(slug) = slug else {
        return Err(AppError::NotFound("Service not found".to_string()));
    };

    tracing::info!(service_id = %id, slug = %slug, "Service deleted");

    state
        .audit()
        .record(
            meta.entry(AuditAction::Deleted, ResourceType::Service)
                .resource(id)
                .details(json!({ "slug": slug })),
        )
        .await;

    Ok(Json(DeletedResponse { deleted: true }))
}

#[derive(OpenApi)]
#[openapi(
    paths(
        list_public_services,
        get_public_service,
        list_services,
        get_service,
        create_service,
        update_service,
        delete_service,
    ),
    components(schemas(
        Service,
        ServiceWithPackages,
        ServiceListResponse,
        CreateServiceRequest,
        UpdateServiceRequest,
    ))
)]
pub struct ServicesApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::api::handlers::test_support::{self, assert_validation};

    fn app() -> Router {
        admin_router().with_state(test_support::state())
    }

    #[tokio::test]
    async fn test_create_requires_name() {
        let (status, body) =
            test_support::send(app(), "POST", "/", Some(json!({ "slug": "revops-audit" }))).await;
        assert_validation(status, &body, "name is required");
    }

    #[tokio::test]
    async fn test_create_requires_slug() {
        let (status, body) =
            test_support::send(app(), "POST", "/", Some(json!({ "name": "RevOps Audit" }))).await;
        assert_validation(status, &body, "slug is required");
    }

    #[tokio::test]
    async fn test_create_rejects_bad_slug() {
        let (status, body) = test_support::send(
            app(),
            "POST",
            "/",
            Some(json!({ "name": "RevOps Audit", "slug": "RevOps Audit" })),
        )
        .await;
        assert_validation(status, &body, "slug");
    }

    #[tokio::test]
    async fn test_update_rejects_blank_name() {
        let uri = format!("/{}", Uuid::new_v4());
        let (status, body) =
            test_support::send(app(), "PATCH", &uri, Some(json!({ "name": "  " }))).await;
        assert_validation(status, &body, "name is required");
    }

    #[test]
    fn test_service_with_packages_flattens() {
        let now = chrono::Utc::now();
        let item = ServiceWithPackages {
            service: Service {
                id: Uuid::nil(),
                slug: "crm".to_string(),
                name: "CRM Implementation".to_string(),
                tagline: None,
                description: None,
                category: None,
                icon: None,
                features: vec![],
                is_active: true,
                sort_order: 0,
                created_at: now,
                updated_at: now,
            },
            packages: vec![],
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["slug"], "crm");
        assert_eq!(json["packages"], json!([]));
        assert!(json.get("service").is_none());
    }
}
