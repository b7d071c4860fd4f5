//! CRM task handlers (client project delivery tasks).

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
use crate::models::crm::{CrmTaskStatus, Task, TaskPriority};
use crate::services::audit_service::{AuditAction, ResourceType};

/// Nested under `/api/crm/tasks`.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_tasks).post(create_task))
        .route("/:id", get(get_task).patch(update_task).delete(delete_task))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListTasksQuery {
    /// Matches the task title
    pub search: Option<String>,
    pub project_id: Option<Uuid>,
    pub status: Option<CrmTaskStatus>,
    pub priority: Option<TaskPriority>,
    pub assignee: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TaskListResponse {
    pub items: Vec<Task>,
    pub pagination: Pagination,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TaskRequest {
    pub project_id: Option<Uuid>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<CrmTaskStatus>,
    pub priority: Option<TaskPriority>,
    pub due_date: Option<NaiveDate>,
    pub assignee: Option<String>,
}

/// List CRM tasks
#[utoipa::path(
    get,
    path = "",
    context_path = "/api/crm/tasks",
    tag = "crm",
    params(ListTasksQuery, PaginationQuery),
    responses((status = 200, description = "Tasks, soonest due first", body = TaskListResponse)),
    security(("bearer_auth" = []))
)]
pub async fn list_tasks(
    State(state): State<SharedState>,
    Query(query): Query<ListTasksQuery>,
    Query(pagination): Query<PaginationQuery>,
) -> Result<Json<TaskListResponse>> {
    let search = like_pattern(query.search.as_deref());
    let assignee = trimmed(query.assignee);

    let items: Vec<Task> = sqlx::query_as(
        r#"
        SELECT * FROM tasks
        WHERE ($1::text IS NULL OR title ILIKE $1)
          AND ($2::uuid IS NULL OR project_id = $2)
          AND ($3::crm_task_status IS NULL OR status = $3)
          AND ($4::task_priority IS NULL OR priority = $4)
          AND ($5::text IS NULL OR assignee = $5)
        ORDER BY due_date ASC NULLS LAST, created_at ASC
        OFFSET $6 LIMIT $7
        "#,
    )
    .bind(&search)
    .bind(query.project_id)
    .bind(query.status)
    .bind(query.priority)
    .bind(&assignee)
    .bind(pagination.offset())
    .bind(pagination.limit())
    .fetch_all(&state.db)
    .await?;

    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM tasks
        WHERE ($1::text IS NULL OR title ILIKE $1)
          AND ($2::uuid IS NULL OR project_id = $2)
          AND ($3::crm_task_status IS NULL OR status = $3)
          AND ($4::task_priority IS NULL OR priority = $4)
          AND ($5::text IS NULL OR assignee = $5)
        "#,
    )
    .bind(&search)
    .bind(query.project_id)
    .bind(query.status)
    .bind(query.priority)
    .bind(&assignee)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(TaskListResponse {
        items,
        pagination: Pagination::from_query_and_total(&pagination, total),
    }))
}

/// Get a CRM task
#[utoipa::path(
    get,
    path = "/{id}",
    context_path = "/api/crm/tasks",
    tag = "crm",
    params(("id" = Uuid, Path, description = "Task ID")),
    responses(
        (status = 200, description = "Task", body = Task),
        (status = 404, description = "Task not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_task(State(state): State<SharedState>, Path(id): Path<Uuid>) -> Result<Json<Task>> {
    let task: Task = sqlx::query_as("SELECT * FROM tasks WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Task not found".to_string()))?;
    Ok(Json(task))
}

/// Create a CRM task
#[utoipa::path(
    post,
    path = "",
    context_path = "/api/crm/tasks",
    tag = "crm",
    request_body = TaskRequest,
    responses(
        (status = 201, description = "Task created", body = Task),
        (status = 400, description = "Validation error or unknown project")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_task(
    State(state): State<SharedState>,
    meta: AuditMeta,
    Json(payload): Json<TaskRequest>,
) -> Result<(StatusCode, Json<Task>)> {
    let title = validation::required("title", payload.title.as_deref())?;
    validation::max_len("title", title, 300)?;
    let status = payload.status.unwrap_or(CrmTaskStatus::Todo);

    let task: Task = sqlx::query_as(
        r#"
        INSERT INTO tasks (project_id, title, description, status, priority, due_date, assignee, completed_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, CASE WHEN $8 THEN NOW() END)
        RETURNING *
        "#,
    )
    .bind(payload.project_id)
    .bind(title)
    .bind(trimmed(payload.description))
    .bind(status)
    .bind(payload.priority.unwrap_or(TaskPriority::Medium))
    .bind(payload.due_date)
    .bind(trimmed(payload.assignee))
    .bind(status == CrmTaskStatus::Done)
    .fetch_one(&state.db)
    .await
    .map_err(|e| AppError::from_write(e, "Task already exists"))?;

    state
        .audit()
        .record(
            meta.entry(AuditAction::Created, ResourceType::Task)
                .resource(task.id)
                .details(json!({ "title": task.title, "project_id": task.project_id })),
        )
        .await;

    Ok((StatusCode::CREATED, Json(task)))
}

/// Update a CRM task
///
/// Moving to `done` stamps `completed_at`; moving back out clears it.
#[utoipa::path(
    patch,
    path = "/{id}",
    context_path = "/api/crm/tasks",
    tag = "crm",
    params(("id" = Uuid, Path, description = "Task ID")),
    request_body = TaskRequest,
    responses(
        (status = 200, description = "Task updated", body = Task),
        (status = 400, description = "Validation error"),
        (status = 404, description = "Task not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_task(
    State(state): State<SharedState>,
    meta: AuditMeta,
    Path(id): Path<Uuid>,
    Json(payload): Json<TaskRequest>,
) -> Result<Json<Task>> {
    let title = validation::optional("title", payload.title.as_deref(), 300)?;

    let task: Task = sqlx::query_as(
        r#"
        UPDATE tasks SET
            project_id = COALESCE($2, project_id),
            title = COALESCE($3, title),
            description = COALESCE($4, description),
            status = COALESCE($5, status),
            priority = COALESCE($6, priority),
            due_date = COALESCE($7, due_date),
            assignee = COALESCE($8, assignee),
            completed_at = CASE
                WHEN $5::crm_task_status IS NULL OR $5 = status THEN completed_at
                WHEN $5 = 'done' THEN NOW()
                ELSE NULL
            END,
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(payload.project_id)
    .bind(&title)
    .bind(trimmed(payload.description))
    .bind(payload.status)
    .bind(payload.priority)
    .bind(payload.due_date)
    .bind(trimmed(payload.assignee))
    .fetch_optional(&state.db)
    .await
    .map_err(|e| AppError::from_write(e, "Task already exists"))?
    .ok_or_else(|| AppError::NotFound("Task not found".to_string()))?;

    let action = if payload.status.is_some() {
        AuditAction::StatusChanged
    } else {
        AuditAction::Updated
    };
    state
        .audit()
        .record(
            meta.entry(action, ResourceType::Task)
                .resource(id)
                .details(json!({ "status": task.status })),
        )
        .await;

    Ok(Json(task))
}

/// Delete a CRM task
#[utoipa::path(
    delete,
    path = "/{id}",
    context_path = "/api/crm/tasks",
    tag = "crm",
    params(("id" = Uuid, Path, description = "Task ID")),
    responses(
        (status = 200, description = "Task deleted", body = DeletedResponse),
        (status = 404, description = "Task not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_task(
    State(state): State<SharedState>,
    meta: AuditMeta,
    Path(id): Path<Uuid>,
) -> Result<Json<DeletedResponse>> {
    let result = sqlx::query("DELETE FROM tasks WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Task not found".to_string()));
    }

    state
        .audit()
        .record(meta.entry(AuditAction::Deleted, ResourceType::Task).resource(id))
        .await;

    Ok(Json(DeletedResponse { deleted: true }))
}

#[derive(OpenApi)]
#[openapi(
    paths(list_tasks, get_task, create_task, update_task, delete_task),
    components(schemas(Task, CrmTaskStatus, TaskPriority, TaskListResponse, TaskRequest))
)]
pub struct CrmTasksApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::test_support::{self, assert_validation};

    fn app() -> Router {
        router().with_state(test_support::state())
    }

    #[tokio::test]
    async fn test_create_requires_title() {
        let (status, body) =
            test_support::send(app(), "POST", "/", Some(json!({ "priority": "high" }))).await;
        assert_validation(status, &body, "title is required");
    }

    #[tokio::test]
    async fn test_update_rejects_blank_title() {
        let uri = format!("/{}", Uuid::new_v4());
        let (status, body) =
            test_support::send(app(), "PATCH", &uri, Some(json!({ "title": "   " }))).await;
        assert_validation(status, &body, "title is required");
    }

    #[tokio::test]
    async fn test_unknown_status_is_rejected() {
        let (status, _) = test_support::send(
            app(),
            "POST",
            "/",
            Some(json!({ "title": "Kickoff", "status": "blocked" })),
        )
        .await;
        assert!(status.is_client_error());
    }
}
