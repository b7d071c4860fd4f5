//! TaskFlow project handlers.

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
use crate::models::taskflow::TfProject;
use crate::services::audit_service::{AuditAction, ResourceType};
use crate::services::taskflow_service::{record_activity, ActivityAction};

const DEFAULT_COLOR: &str = "#6366f1";

/// Nested under `/api/taskflow/projects`.
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
    pub search: Option<String>,
    /// Include archived projects (default false)
    pub include_archived: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProjectListResponse {
    pub items: Vec<TfProject>,
    pub pagination: Pagination,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ProjectRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    /// `#RRGGBB`
    pub color: Option<String>,
    pub is_archived: Option<bool>,
}

fn color(value: Option<String>) -> Result<Option<String>> {
    let color = trimmed(value).map(|c| c.to_lowercase());
    if let Some(c) = color.as_deref() {
        validation::hex_color(c)?;
    }
    Ok(color)
}

/// List TaskFlow projects
#[utoipa::path(
    get,
    path = "",
    context_path = "/api/taskflow/projects",
    tag = "taskflow",
    params(ListProjectsQuery, PaginationQuery),
    responses((status = 200, description = "Projects by name", body = ProjectListResponse)),
    security(("bearer_auth" = []))
)]
pub async fn list_projects(
    State(state): State<SharedState>,
    Query(query): Query<ListProjectsQuery>,
    Query(pagination): Query<PaginationQuery>,
) -> Result<Json<ProjectListResponse>> {
    let search = like_pattern(query.search.as_deref());
    let include_archived = query.include_archived.unwrap_or(false);

    let items: Vec<TfProject> = sqlx::query_as(
        r#"
        SELECT * FROM taskflow_projects
        WHERE ($1::text IS NULL OR name ILIKE $1)
          AND ($2 OR NOT is_archived)
        ORDER BY name ASC
        OFFSET $3 LIMIT $4
        "#,
    )
    .bind(&search)
    .bind(include_archived)
    .bind(pagination.offset())
    .bind(pagination.limit())
    .fetch_all(&state.db)
    .await?;

    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM taskflow_projects
        WHERE ($1::text IS NULL OR name ILIKE $1)
          AND ($2 OR NOT is_archived)
        "#,
    )
    .bind(&search)
    .bind(include_archived)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(ProjectListResponse {
        items,
        pagination: Pagination::from_query_and_total(&pagination, total),
    }))
}

/// Get a TaskFlow project
#[utoipa::path(
    get,
    path = "/{id}",
    context_path = "/api/taskflow/projects",
    tag = "taskflow",
    params(("id" = Uuid, Path, description = "Project ID")),
    responses(
        (status = 200, description = "Project", body = TfProject),
        (status = 404, description = "Project not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_project(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TfProject>> {
    let project: TfProject = sqlx::query_as("SELECT * FROM taskflow_projects WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Project not found".to_string()))?;
    Ok(Json(project))
}

/// Create a TaskFlow project
#[utoipa::path(
    post,
    path = "",
    context_path = "/api/taskflow/projects",
    tag = "taskflow",
    request_body = ProjectRequest,
    responses(
        (status = 201, description = "Project created", body = TfProject),
        (status = 400, description = "Validation error")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_project(
    State(state): State<SharedState>,
    meta: AuditMeta,
    Json(payload): Json<ProjectRequest>,
) -> Result<(StatusCode, Json<TfProject>)> {
    let name = validation::required("name", payload.name.as_deref())?;
    validation::max_len("name", name, 200)?;
    let color = color(payload.color)?.unwrap_or_else(|| DEFAULT_COLOR.to_string());

    let mut tx = state.db.begin().await?;
    let project: TfProject = sqlx::query_as(
        r#"
        INSERT INTO taskflow_projects (name, description, color, is_archived)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(name)
    .bind(trimmed(payload.description))
    .bind(&color)
    .bind(payload.is_archived.unwrap_or(false))
    .fetch_one(&mut *tx)
    .await?;

    record_activity(
        &mut *tx,
        ActivityAction::ProjectCreated,
        None,
        Some(project.id),
        Some(json!({ "name": project.name })),
    )
    .await?;
    tx.commit().await?;

    state
        .audit()
        .record(
            meta.entry(AuditAction::Created, ResourceType::TaskflowProject)
                .resource(project.id)
                .details(json!({ "name": project.name })),
        )
        .await;

    Ok((StatusCode::CREATED, Json(project)))
}

/// Update a TaskFlow project
#[utoipa::path(
    patch,
    path = "/{id}",
    context_path = "/api/taskflow/projects",
    tag = "taskflow",
    params(("id" = Uuid, Path, description = "Project ID")),
    request_body = ProjectRequest,
    responses(
        (status = 200, description = "Project updated", body = TfProject),
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
) -> Result<Json<TfProject>> {
    let name = validation::optional("name", payload.name.as_deref(), 200)?;
    let color = color(payload.color)?;

    let mut tx = state.db.begin().await?;
    let project: TfProject = sqlx::query_as(
        r#"
        UPDATE taskflow_projects SET
            name = COALESCE($2, name),
            description = COALESCE($3, description),
            color = COALESCE($4, color),
            is_archived = COALESCE($5, is_archived),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(&name)
    .bind(trimmed(payload.description))
    .bind(&color)
    .bind(payload.is_archived)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::NotFound("Project not found".to_string()))?;

    record_activity(
        &mut *tx,
        ActivityAction::ProjectUpdated,
        None,
        Some(id),
        Some(json!({ "name": project.name, "is_archived": project.is_archived })),
    )
    .await?;
    tx.commit().await?;

    state
        .audit()
        .record(meta.entry(AuditAction::Updated, ResourceType::TaskflowProject).resource(id))
        .await;

    Ok(Json(project))
}

/// Delete a TaskFlow project
///
/// Its tasks are kept and become unassigned.
#[utoipa::path(
    delete,
    path = "/{id}",
    context_path = "/api/taskflow/projects",
    tag = "taskflow",
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
    let mut tx = state.db.begin().await?;

    // Detached tasks join the end of the unassigned columns.
    let detached = sqlx::query(
        r#"
        UPDATE taskflow_tasks t
        SET project_id = NULL,
            sort_order = t.sort_order + (
                SELECT COALESCE(MAX(u.sort_order) + 1, 0) FROM taskflow_tasks u
                WHERE u.project_id IS NULL AND u.status = t.status
            ),
            updated_at = NOW()
        WHERE t.project_id = $1
        "#,
    )
    .bind(id)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    let name: Option<String> =
        sqlx::query_scalar("DELETE FROM taskflow_projects WHERE id = $1 RETURNING name")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
    let Some(name) = name else {
        return Err(AppError::NotFound("Project not found".to_string()));
    };

    record_activity(
        &mut *tx,
        ActivityAction::ProjectDeleted,
        None,
        Some(id),
        Some(json!({ "name": name, "detached_tasks": detached })),
    )
    .await?;
    tx.commit().await?;

    tracing::info!(project_id = %id, detached_tasks = detached, "TaskFlow project deleted");

    state
        .audit()
        .record(
            meta.entry(AuditAction::Deleted, ResourceType::TaskflowProject)
                .resource(id)
                .details(json!({ "name": name })),
        )
        .await;

    Ok(Json(DeletedResponse { deleted: true }))
}

#[derive(OpenApi)]
#[openapi(
    paths(list_projects, get_project, create_project, update_project, delete_project),
    components(schemas(TfProject, ProjectListResponse, ProjectRequest))
)]
pub struct TaskflowProjectsApiDoc;

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
            test_support::send(app(), "POST", "/", Some(json!({ "color": "#112233" }))).await;
        assert_validation(status, &body, "name is required");
    }

    #[tokio::test]
    async fn test_create_rejects_bad_color() {
        let (status, body) = test_support::send(
            app(),
            "POST",
            "/",
            Some(json!({ "name": "Website", "color": "blue" })),
        )
        .await;
        assert_validation(status, &body, "#RRGGBB");
    }

    #[test]
    fn test_color_normalizes_case() {
        assert_eq!(
            color(Some("#AABBCC".to_string())).unwrap().as_deref(),
            Some("#aabbcc")
        );
        assert_eq!(color(None).unwrap(), None);
    }
}
