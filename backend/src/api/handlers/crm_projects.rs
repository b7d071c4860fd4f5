//! CRM client project handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::{IntoParams, OpenApi, ToSchema};
use uuid::Uuid;

use super::{like_pattern, trimmed, AuditMeta};
use crate::api::dto::{DeletedResponse, Pagination, PaginationQuery};
use crate::api::validation;
use crate::api::SharedState;
use crate::error::{AppError, Result};
use crate::models::crm::{Project, ProjectStatus};
use crate::services::audit_service::{AuditAction, ResourceType};

/// Nested under `/api/crm/projects`.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_projects).post(create_project))
        .route(
            "/:id",
            get(get_project).patch(update_project).delete(delete_project),
        )
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListProjectsQuery {
    /// Matches the project name
    pub search: Option<String>,
    pub company_id: Option<Uuid>,
    pub deal_id: Option<Uuid>,
    pub status: Option<ProjectStatus>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProjectListResponse {
    pub items: Vec<Project>,
    pub pagination: Pagination,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ProjectRequest {
    pub company_id: Option<Uuid>,
    pub deal_id: Option<Uuid>,
    pub name: Option<String>,
    pub status: Option<ProjectStatus>,
    pub start_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub budget_cents: Option<i64>,
    pub notes: Option<String>,
}

impl ProjectRequest {
    fn check_numbers(&self) -> Result<()> {
        if let Some(budget) = self.budget_cents {
            validation::non_negative("budget_cents", budget)?;
        }
        if let (Some(start), Some(due)) = (self.start_date, self.due_date) {
            if due < start {
                return Err(AppError::Validation(
                    "due_date must not be before start_date".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// List client projects
#[utoipa::path(
    get,
    path = "",
    context_path = "/api/crm/projects",
    tag = "crm",
    params(ListProjectsQuery, PaginationQuery),
    responses((status = 200, description = "Projects", body = ProjectListResponse)),
    security(("bearer_auth" = []))
)]
pub async fn list_projects(
    State(state): State<SharedState>,
    Query(query): Query<ListProjectsQuery>,
    Query(pagination): Query<PaginationQuery>,
) -> Result<Json<ProjectListResponse>> {
    let search = like_pattern(query.search.as_deref());

    let items: Vec<Project> = sqlx::query_as(
        r#"
        SELECT * FROM projects
        WHERE ($1::text IS NULL OR name ILIKE $1)
          AND ($2::uuid IS NULL OR company_id = $2)
          AND ($3::uuid IS NULL OR deal_id = $3)
          AND ($4::crm_project_status IS NULL OR status = $4)
        ORDER BY due_date ASC NULLS LAST, created_at DESC
        OFFSET $5 LIMIT $6
        "#,
    )
    .bind(&search)
    .bind(query.company_id)
    .bind(query.deal_id)
    .bind(query.status)
    .bind(pagination.offset())
    .bind(pagination.limit())
    .fetch_all(&state.db)
    .await?;

    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM projects
        WHERE ($1::text IS NULL OR name ILIKE $1)
          AND ($2::uuid IS NULL OR company_id = $2)
          AND ($3::uuid IS NULL OR deal_id = $3)
          AND ($4::crm_project_status IS NULL OR status = $4)
        "#,
    )
    .bind(&search)
    .bind(query.company_id)
    .bind(query.deal_id)
    .bind(query.status)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(ProjectListResponse {
        items,
        pagination: Pagination::from_query_and_total(&pagination, total),
    }))
}

/// Get a client project
#[utoipa::path(
    get,
    path = "/{id}",
    context_path = "/api/crm/projects",
    tag = "crm",
    params(("id" = Uuid, Path, description = "Project ID")),
    responses(
        (status = 200, description = "Project", body = Project),
        (status = 404, description = "Project not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_project(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Project>> {
    let project: Project = sqlx::query_as("SELECT * FROM projects WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Project not found".to_string()))?;
    Ok(Json(project))
}

/// Create a client project
#[utoipa::path(
    post,
    path = "",
    context_path = "/api/crm/projects",
    tag = "crm",
    request_body = ProjectRequest,
    responses(
        (status = 201, description = "Project created", body = Project),
        (status = 400, description = "Validation error or unknown company/deal")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_project(
    State(state): State<SharedState>,
    meta: AuditMeta,
    Json(payload): Json<ProjectRequest>,
) -> Result<(StatusCode, Json<Project>)> {
    let name = validation::required("name", payload.name.as_deref())?;
    validation::max_len("name", name, 200)?;
    payload.check_numbers()?;

    let project: Project = sqlx::query_as(
        r#"
        INSERT INTO projects (company_id, deal_id, name, status, start_date, due_date, budget_cents, notes)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(payload.company_id)
    .bind(payload.deal_id)
    .bind(name)
    .bind(payload.status.unwrap_or(ProjectStatus::Planned))
    .bind(payload.start_date)
    .bind(payload.due_date)
    .bind(payload.budget_cents)
    .bind(trimmed(payload.notes))
    .fetch_one(&state.db)
    .await
    .map_err(|e| AppError::from_write(e, "Project already exists"))?;

    state
        .audit()
        .record(
            meta.entry(AuditAction::Created, ResourceType::Project)
                .resource(project.id)
                .details(json!({ "name": project.name, "deal_id": project.deal_id })),
        )
        .await;

    Ok((StatusCode::CREATED, Json(project)))
}

/// Update a client project
#[utoipa::path(
    patch,
    path = "/{id}",
    context_path = "/api/crm/projects",
    tag = "crm",
    params(("id" = Uuid, Path, description = "Project ID")),
    request_body = ProjectRequest,
    responses(
        (status = 200, description = "Project updated", body = Project),
        (status = 400, description = "Validation error"),
        (status = 404, description = "Project not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_project(
    State(state): State<SharedState>,
    meta: AuditMeta,
    Path(id): Path<Uuid>,
    Json(payload): Json<ProjectRequest>,
) -> Result<Json<Project>> {
    let name = validation::optional("name", payload.name.as_deref(), 200)?;
    payload.check_numbers()?;

    let project: Project = sqlx::query_as(
        r#"
        UPDATE projects SET
            company_id = COALESCE($2, company_id),
            deal_id = COALESCE($3, deal_id),
            name = COALESCE($4, name),
            status = COALESCE($5, status),
            start_date = COALESCE($6, start_date),
            due_date = COALESCE($7, due_date),
            budget_cents = COALESCE($8, budget_cents),
            notes = COALESCE($9, notes),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(payload.company_id)
    .bind(payload.deal_id)
    .bind(&name)
    .bind(payload.status)
    .bind(payload.start_date)
    .bind(payload.due_date)
    .bind(payload.budget_cents)
    .bind(trimmed(payload.notes))
    .fetch_optional(&state.db)
    .await
    .map_err(|e| AppError::from_write(e, "Project already exists"))?
    .ok_or_else(|| AppError::NotFound("Project not found".to_string()))?;

    let action = if payload.status.is_some() {
        AuditAction::StatusChanged
    } else {
        AuditAction::Updated
    };
    state
        .audit()
        .record(
            meta.entry(action, ResourceType::Project)
                .resource(id)
                .details(json!({ "status": project.status })),
        )
        .await;

    Ok(Json(project))
}

/// Delete a client project and its tasks
#[utoipa::path(
    delete,
    path = "/{id}",
    context_path = "/api/crm/projects",
    tag = "crm",
    params(("id" = Uuid, Path, description = "Project ID")),
    responses(
        (status = 200, description = "Project deleted", body = DeletedResponse),
        (status = 404, description = "Project not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_project(
    State(state): State<SharedState>,
    meta: AuditMeta,
    Path(id): Path<Uuid>,
) -> Result<Json<DeletedResponse>> {
    let name: Option<String> =
        sqlx::query_scalar("DELETE FROM projects WHERE id = $1 RETURNING name")
            .bind(id)
            .fetch_optional(&state.db)
            .await?;
    let Some(name) = name else {
        return Err(AppError::NotFound("Project not found".to_string()));
    };

    state
        .audit()
        .record(
            meta.entry(AuditAction::Deleted, ResourceType::Project)
                .resource(id)
                .details(json!({ "name": name })),
        )
        .await;

    Ok(Json(DeletedResponse { deleted: true }))
}

#[derive(OpenApi)]
#[openapi(
    paths(list_projects, get_project, create_project, update_project, delete_project),
    components(schemas(Project, ProjectStatus, ProjectListResponse, ProjectRequest))
)]
pub struct CrmProjectsApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::test_support::{self, assert_validation};

    fn app() -> Router {
        router().with_state(test_support::state())
    }

    #[tokio::test]
    async fn test_create_requires_name() {
        let (status, body) =
            test_support::send(app(), "POST", "/", Some(json!({ "status": "active" }))).await;
        assert_validation(status, &body, "name is required");
    }

    #[tokio::test]
    async fn test_create_rejects_due_before_start() {
        let (status, body) = test_support::send(
            app(),
            "POST",
            "/",
            Some(json!({
                "name": "HubSpot rollout",
                "start_date": "2026-11-10",
                "due_date": "2026-11-01",
            })),
        )
        .await;
        assert_validation(status, &body, "due_date must not be before start_date");
    }

    #[tokio::test]
    async fn test_update_rejects_negative_budget() {
        let uri = format!("/{}", Uuid::new_v4());
        let (status, body) =
            test_support::send(app(), "PATCH", &uri, Some(json!({ "budget_cents": -5 }))).await;
        assert_validation(status, &body, "budget_cents must not be negative");
    }
}
