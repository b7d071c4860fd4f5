//! TaskFlow board view, activity feed and stats.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, OpenApi, ToSchema};
use uuid::Uuid;

use crate::api::SharedState;
use crate::error::Result;
use crate::models::taskflow::{TfActivity, TfTask};
use crate::services::taskflow_service::{build_board, BoardColumn, StatusCount, TaskflowStats};

const DEFAULT_ACTIVITY_LIMIT: i64 = 50;
const MAX_ACTIVITY_LIMIT: i64 = 200;

/// Nested under `/api/taskflow`.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/board", get(get_board))
        .route("/activity", get(list_activity))
        .route("/stats", get(get_stats))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct BoardQuery {
    /// Restrict the board to one project
    pub project_id: Option<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BoardResponse {
    pub project_id: Option<Uuid>,
    pub columns: Vec<BoardColumn>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ActivityQuery {
    pub task_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    /// Max entries (default 50, max 200)
    pub limit: Option<i64>,
}

impl ActivityQuery {
    fn limit(&self) -> i64 {
        self.limit
            .unwrap_or(DEFAULT_ACTIVITY_LIMIT)
            .clamp(1, MAX_ACTIVITY_LIMIT)
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct StatsQuery {
    pub project_id: Option<Uuid>,
}

/// Kanban board
///
/// Every workflow column is present, tasks sorted by `order`.
#[utoipa::path(
    get,
    path = "/board",
    context_path = "/api/taskflow",
    tag = "taskflow",
    params(BoardQuery),
    responses((status = 200, description = "Board columns in workflow order", body = BoardResponse)),
    security(("bearer_auth" = []))
)]
pub async fn get_board(
    State(state): State<SharedState>,
    Query(query): Query<BoardQuery>,
) -> Result<Json<BoardResponse>> {
    let tasks: Vec<TfTask> = sqlx::query_as(
        r#"
        SELECT * FROM taskflow_tasks
        WHERE ($1::uuid IS NULL OR project_id = $1)
        ORDER BY sort_order, created_at
        "#,
    )
    .bind(query.project_id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(BoardResponse {
        project_id: query.project_id,
        columns: build_board(tasks),
    }))
}

/// Activity feed, newest first
#[utoipa::path(
    get,
    path = "/activity",
    context_path = "/api/taskflow",
    tag = "taskflow",
    params(ActivityQuery),
    responses((status = 200, description = "Activity entries", body = Vec<TfActivity>)),
    security(("bearer_auth" = []))
)]
pub async fn list_activity(
    State(state): State<SharedState>,
    Query(query): Query<ActivityQuery>,
) -> Result<Json<Vec<TfActivity>>> {
    let entries: Vec<TfActivity> = sqlx::query_as(
        r#"
        SELECT * FROM taskflow_activity
        WHERE ($1::uuid IS NULL OR task_id = $1)
          AND ($2::uuid IS NULL OR project_id = $2)
        ORDER BY created_at DESC
        LIMIT $3
        "#,
    )
    .bind(query.task_id)
    .bind(query.project_id)
    .bind(query.limit())
    .fetch_all(&state.db)
    .await?;

    Ok(Json(entries))
}

/// Board statistics
#[utoipa::path(
    get,
    path = "/stats",
    context_path = "/api/taskflow",
    tag = "taskflow",
    params(StatsQuery),
    responses((status = 200, description = "Counts per status, overdue and recently completed", body = TaskflowStats)),
    security(("bearer_auth" = []))
)]
pub async fn get_stats(
    State(state): State<SharedState>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<TaskflowStats>> {
    Ok(Json(state.taskflow().stats(query.project_id).await?))
}

#[derive(OpenApi)]
#[openapi(
    paths(get_board, list_activity, get_stats),
    components(schemas(
        BoardResponse,
        BoardColumn,
        TfActivity,
        TaskflowStats,
        StatusCount,
    ))
)]
pub struct TaskflowBoardApiDoc;
