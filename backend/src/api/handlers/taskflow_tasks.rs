//! TaskFlow task handlers: CRUD plus drag-and-drop moves.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
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
use crate::models::taskflow::{TaskPriority, TaskStatus, TfTask};
use crate::services::audit_service::{AuditAction, ResourceType};
use crate::services::taskflow_service::{record_activity, ActivityAction, TaskflowService};

const MAX_TAGS: usize = 20;
const MAX_TAG_LEN: usize = 50;

/// Nested under `/api/taskflow/tasks`.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_tasks).post(create_task))
        .route("/reorder", post(reorder_tasks))
        .route("/:id", get(get_task).patch(update_task).delete(delete_task))
        .route("/:id/move", post(move_task))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListTasksQuery {
    pub project_id: Option<Uuid>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    /// Matches title or description
    pub search: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TaskListResponse {
    pub items: Vec<TfTask>,
    pub pagination: Pagination,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TaskRequest {
    pub project_id: Option<Uuid>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub due_date: Option<NaiveDate>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MoveTaskRequest {
    pub status: Option<TaskStatus>,
    /// Target position in the column, clamped to its bounds
    pub order: Option<i32>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReorderRequest {
    pub status: Option<TaskStatus>,
    pub task_ids: Option<Vec<Uuid>>,
}

/// Trimmed, de-duplicated tags in first-seen order.
fn clean_tags(tags: Option<Vec<String>>) -> Result<Option<Vec<String>>> {
    let Some(tags) = tags else {
        return Ok(None);
    };
    let mut cleaned: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if tag.is_empty() || cleaned.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
            continue;
        }
        validation::max_len("tag", tag, MAX_TAG_LEN)?;
        cleaned.push(tag.to_string());
    }
    if cleaned.len() > MAX_TAGS {
        return Err(AppError::Validation(format!(
            "A task can have at most {} tags",
            MAX_TAGS
        )));
    }
    Ok(Some(cleaned))
}

/// List tasks
#[utoipa::path(
    get,
    path = "",
    context_path = "/api/taskflow/tasks",
    tag = "taskflow",
    params(ListTasksQuery, PaginationQuery),
    responses((status = 200, description = "Tasks in board order", body = TaskListResponse)),
    security(("bearer_auth" = []))
)]
pub async fn list_tasks(
    State(state): State<SharedState>,
    Query(query): Query<ListTasksQuery>,
    Query(pagination): Query<PaginationQuery>,
) -> Result<Json<TaskListResponse>> {
    let search = like_pattern(query.search.as_deref());

    let items: Vec<TfTask> = sqlx::query_as(
        r#"
        SELECT * FROM taskflow_tasks
        WHERE ($1::uuid IS NULL OR project_id = $1)
          AND ($2::taskflow_status IS NULL OR status = $2)
          AND ($3::task_priority IS NULL OR priority = $3)
          AND ($4::text IS NULL OR title ILIKE $4 OR description ILIKE $4)
        ORDER BY status, sort_order, created_at
        OFFSET $5 LIMIT $6
        "#,
    )
    .bind(query.project_id)
    .bind(query.status)
    .bind(query.priority)
    .bind(&search)
    .bind(pagination.offset())
    .bind(pagination.limit())
    .fetch_all(&state.db)
    .await?;

    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM taskflow_tasks
        WHERE ($1::uuid IS NULL OR project_id = $1)
          AND ($2::taskflow_status IS NULL OR status = $2)
          AND ($3::task_priority IS NULL OR priority = $3)
          AND ($4::text IS NULL OR title ILIKE $4 OR description ILIKE $4)
        "#,
    )
    .bind(query.project_id)
    .bind(query.status)
    .bind(query.priority)
    .bind(&search)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(TaskListResponse {
        items,
        pagination: Pagination::from_query_and_total(&pagination, total),
    }))
}

/// Get a task
#[utoipa::path(
    get,
    path = "/{id}",
    context_path = "/api/taskflow/tasks",
    tag = "taskflow",
    params(("id" = Uuid, Path, description = "Task ID")),
    responses(
        (status = 200, description = "Task", body = TfTask),
        (status = 404, description = "Task not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_task(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TfTask>> {
    let task: TfTask = sqlx::query_as("SELECT * FROM taskflow_tasks WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Task not found".to_string()))?;
    Ok(Json(task))
}

/// Create a task at the end of its column
#[utoipa::path(
    post,
    path = "",
    context_path = "/api/taskflow/tasks",
    tag = "taskflow",
    request_body = TaskRequest,
    responses(
        (status = 201, description = "Task created", body = TfTask),
        (status = 400, description = "Validation error or unknown project")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_task(
    State(state): State<SharedState>,
    meta: AuditMeta,
    Json(payload): Json<TaskRequest>,
) -> Result<(StatusCode, Json<TfTask>)> {
    let title = validation::required("title", payload.title.as_deref())?;
    validation::max_len("title", title, 300)?;
    let tags = clean_tags(payload.tags)?.unwrap_or_default();
    let status = payload.status.unwrap_or(TaskStatus::Todo);

    let mut tx = state.db.begin().await?;
    let position = TaskflowService::next_position(&mut *tx, payload.project_id, status).await?;

    let task: TfTask = sqlx::query_as(
        r#"
        INSERT INTO taskflow_tasks (
            project_id, title, description, status, priority, due_date, tags, sort_order, completed_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, CASE WHEN $4 = 'done'::taskflow_status THEN NOW() END)
        RETURNING *
        "#,
    )
    .bind(payload.project_id)
    .bind(title)
    .bind(trimmed(payload.description))
    .bind(status)
    .bind(payload.priority.unwrap_or(TaskPriority::Medium))
    .bind(payload.due_date)
    .bind(&tags)
    .bind(position)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| AppError::from_write(e, "Task already exists"))?;

    record_activity(
        &mut *tx,
        ActivityAction::TaskCreated,
        Some(task.id),
        task.project_id,
        Some(json!({ "title": task.title, "status": task.status, "order": task.sort_order })),
    )
    .await?;
    tx.commit().await?;

    state
        .audit()
        .record(
            meta.entry(AuditAction::Created, ResourceType::TaskflowTask)
                .resource(task.id)
                .details(json!({ "title": task.title })),
        )
        .await;

    Ok((StatusCode::CREATED, Json(task)))
}

/// Update a task
///
/// A new `status` appends the task to that column; a new `project_id`
/// appends it to the same status column of that project. Nothing is saved
/// if any part of the change is rejected.
#[utoipa::path(
    patch,
    path = "/{id}",
    context_path = "/api/taskflow/tasks",
    tag = "taskflow",
    params(("id" = Uuid, Path, description = "Task ID")),
    request_body = TaskRequest,
    responses(
        (status = 200, description = "Task updated", body = TfTask),
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
) -> Result<Json<TfTask>> {
    let title = validation::optional("title", payload.title.as_deref(), 300)?;
    let tags = clean_tags(payload.tags)?;
    let description = trimmed(payload.description);

    let mut tx = state.db.begin().await?;
    let mut task: TfTask = sqlx::query_as(
        r#"
        UPDATE taskflow_tasks SET
            title = COALESCE($2, title),
            description = COALESCE($3, description),
            priority = COALESCE($4, priority),
            due_date = COALESCE($5, due_date),
            tags = COALESCE($6, tags),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(&title)
    .bind(&description)
    .bind(payload.priority)
    .bind(payload.due_date)
    .bind(&tags)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::NotFound("Task not found".to_string()))?;

    let changed: Vec<&str> = [
        ("title", title.is_some()),
        ("description", description.is_some()),
        ("priority", payload.priority.is_some()),
        ("due_date", payload.due_date.is_some()),
        ("tags", tags.is_some()),
    ]
    .iter()
    .filter(|(_, set)| *set)
    .map(|(field, _)| *field)
    .collect();

    if !changed.is_empty() {
        record_activity(
            &mut *tx,
            ActivityAction::TaskUpdated,
            Some(id),
            task.project_id,
            Some(json!({ "fields": changed })),
        )
        .await?;
    }

    if let Some(project_id) = payload.project_id {
        if task.project_id != Some(project_id) {
            task = TaskflowService::transfer(&mut tx, id, project_id).await?;
        }
    }
    if let Some(status) = payload.status {
        if task.status != status {
            task = TaskflowService::move_in(&mut tx, id, status, i32::MAX).await?;
        }
    }
    tx.commit().await?;

    state
        .audit()
        .record(meta.entry(AuditAction::Updated, ResourceType::TaskflowTask).resource(id))
        .await;

    Ok(Json(task))
}

/// Delete a task
#[utoipa::path(
    delete,
    path = "/{id}",
    context_path = "/api/taskflow/tasks",
    tag = "taskflow",
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
    let task = state.taskflow().delete_task(id).await?;

    state
        .audit()
        .record(
            meta.entry(AuditAction::Deleted, ResourceType::TaskflowTask)
                .resource(id)
                .details(json!({ "title": task.title })),
        )
        .await;

    Ok(Json(DeletedResponse { deleted: true }))
}

/// Move a task to a position in a column
#[utoipa::path(
    post,
    path = "/{id}/move",
    context_path = "/api/taskflow/tasks",
    tag = "taskflow",
    params(("id" = Uuid, Path, description = "Task ID")),
    request_body = MoveTaskRequest,
    responses(
        (status = 200, description = "Task moved", body = TfTask),
        (status = 400, description = "Validation error"),
        (status = 404, description = "Task not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn move_task(
    State(state): State<SharedState>,
    meta: AuditMeta,
    Path(id): Path<Uuid>,
    Json(payload): Json<MoveTaskRequest>,
) -> Result<Json<TfTask>> {
    let status = payload
        .status
        .ok_or_else(|| AppError::Validation("status is required".to_string()))?;
    let order = payload
        .order
        .ok_or_else(|| AppError::Validation("order is required".to_string()))?;
    validation::non_negative("order", order)?;

    let task = state.taskflow().move_task(id, status, order).await?;

    state
        .audit()
        .record(
            meta.entry(AuditAction::Moved, ResourceType::TaskflowTask)
                .resource(id)
                .details(json!({ "status": task.status, "order": task.sort_order })),
        )
        .await;

    Ok(Json(task))
}

/// Reorder a column
#[utoipa::path(
    post,
    path = "/reorder",
    context_path = "/api/taskflow/tasks",
    tag = "taskflow",
    request_body = ReorderRequest,
    responses(
        (status = 200, description = "Tasks in their new order", body = Vec<TfTask>),
        (status = 400, description = "Unknown, duplicate or out-of-column task ids")
    ),
    security(("bearer_auth" = []))
)]
pub async fn reorder_tasks(
    State(state): State<SharedState>,
    Json(payload): Json<ReorderRequest>,
) -> Result<Json<Vec<TfTask>>> {
    let status = payload
        .status
        .ok_or_else(|| AppError::Validation("status is required".to_string()))?;
    let task_ids = payload
        .task_ids
        .ok_or_else(|| AppError::Validation("task_ids is required".to_string()))?;

    let tasks = state.taskflow().reorder(status, &task_ids).await?;
    Ok(Json(tasks))
}

#[derive(OpenApi)]
#[openapi(
    paths(
        list_tasks,
        get_task,
        create_task,
        update_task,
        delete_task,
        move_task,
        reorder_tasks,
    ),
    components(schemas(
        TfTask,
        TaskStatus,
        TaskListResponse,
        TaskRequest,
        MoveTaskRequest,
        ReorderRequest,
    ))
)]
pub struct TaskflowTasksApiDoc;
