//! TaskFlow board ordering, activity feed and stats.
//!
//! A column is the set of tasks sharing a project and a status. Positions in
//! a column are kept dense (`0..n`) by every move.

use serde::Serialize;
use serde_json::{json, Value};
use sqlx::{PgExecutor, PgPool, Postgres, Transaction};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::taskflow::{TaskStatus, TfTask};

type PgTransaction<'c> = Transaction<'c, Postgres>;

/// Activity action types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityAction {
    TaskCreated,
    TaskUpdated,
    TaskMoved,
    TasksReordered,
    TaskDeleted,
    ProjectCreated,
    ProjectUpdated,
    ProjectDeleted,
}

impl ActivityAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityAction::TaskCreated => "task_created",
            ActivityAction::TaskUpdated => "task_updated",
            ActivityAction::TaskMoved => "task_moved",
            ActivityAction::TasksReordered => "tasks_reordered",
            ActivityAction::TaskDeleted => "task_deleted",
            ActivityAction::ProjectCreated => "project_created",
            ActivityAction::ProjectUpdated => "project_updated",
            ActivityAction::ProjectDeleted => "project_deleted",
        }
    }
}

/// Append an activity row using any executor (pool or open transaction).
pub async fn record_activity<'e, E: PgExecutor<'e>>(
    executor: E,
    action: ActivityAction,
    task_id: Option<Uuid>,
    project_id: Option<Uuid>,
    details: Option<Value>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO taskflow_activity (task_id, project_id, action, details)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(task_id)
    .bind(project_id)
    .bind(action.as_str())
    .bind(details)
    .execute(executor)
    .await?;
    Ok(())
}

/// Board column
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BoardColumn {
    pub status: TaskStatus,
    pub label: String,
    pub tasks: Vec<TfTask>,
}

/// Group tasks into every workflow column, sorted by position.
pub fn build_board(tasks: Vec<TfTask>) -> Vec<BoardColumn> {
    let mut columns: Vec<BoardColumn> = TaskStatus::WORKFLOW
        .iter()
        .map(|status| BoardColumn {
            status: *status,
            label: status.label().to_string(),
            tasks: Vec::new(),
        })
        .collect();

    for task in tasks {
        if let Some(column) = columns.iter_mut().find(|c| c.status == task.status) {
            column.tasks.push(task);
        }
    }
    for column in &mut columns {
        column
            .tasks
            .sort_by(|a, b| (a.sort_order, a.created_at).cmp(&(b.sort_order, b.created_at)));
    }
    columns
}

/// New column order after placing `task_id` at `position`.
///
/// The task is removed from wherever it was and inserted at `position`,
/// clamped to the column bounds.
pub fn place(column: &[Uuid], task_id: Uuid, position: i32) -> Vec<Uuid> {
    let mut ids: Vec<Uuid> = column.iter().copied().filter(|id| *id != task_id).collect();
    let index = (position.max(0) as usize).min(ids.len());
    ids.insert(index, task_id);
    ids
}

/// Full column order for a reorder: `listed` first, then the rest of
/// `column` in its current order.
pub fn reordered_column(column: &[Uuid], listed: &[Uuid]) -> Vec<Uuid> {
    let mut ids = listed.to_vec();
    ids.extend(column.iter().copied().filter(|id| !listed.contains(id)));
    ids
}

/// The one project every reordered task belongs to.
pub fn single_project(found: &[(Uuid, Option<Uuid>)]) -> Result<Option<Uuid>> {
    let project_id = found.first().and_then(|(_, p)| *p);
    if found.iter().any(|(_, p)| *p != project_id) {
        return Err(AppError::Validation(
            "All tasks must belong to the same project".to_string(),
        ));
    }
    Ok(project_id)
}

/// Reject duplicate ids in a reorder request.
pub fn ensure_unique(ids: &[Uuid]) -> Result<()> {
    let mut seen = std::collections::HashSet::with_capacity(ids.len());
    for id in ids {
        if !seen.insert(id) {
            return Err(AppError::Validation(format!("Duplicate task id {}", id)));
        }
    }
    Ok(())
}

/// Per-status count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct StatusCount {
    pub status: TaskStatus,
    pub count: i64,
}

/// Board statistics
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TaskflowStats {
    pub total: i64,
    pub by_status: Vec<StatusCount>,
    pub overdue: i64,
    pub completed_last_7_days: i64,
}

/// Counts for every workflow status, zero-filled.
pub fn fill_status_counts(rows: &[(TaskStatus, i64)]) -> Vec<StatusCount> {
    TaskStatus::WORKFLOW
        .iter()
        .map(|status| StatusCount {
            status: *status,
            count: rows
                .iter()
                .filter(|(s, _)| s == status)
                .map(|(_, c)| *c)
                .sum(),
        })
        .collect()
}

/// Board operations
pub struct TaskflowService {
    db: PgPool,
}

impl TaskflowService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Next free position at the end of a column.
    pub async fn next_position<'e, E: PgExecutor<'e>>(
        executor: E,
        project_id: Option<Uuid>,
        status: TaskStatus,
    ) -> Result<i32> {
        let max: Option<i32> = sqlx::query_scalar(
            r#"
            SELECT MAX(sort_order) FROM taskflow_tasks
            WHERE project_id IS NOT DISTINCT FROM $1 AND status = $2
            "#,
        )
        .bind(project_id)
        .bind(status)
        .fetch_one(executor)
        .await?;
        Ok(max.map_or(0, |m| m + 1))
    }

    /// Move a task to `position` in the `status` column of its project.
    pub async fn move_task(&self, task_id: Uuid, status: TaskStatus, position: i32) -> Result<TfTask> {
        let mut tx = self.db.begin().await?;
        let moved = Self::move_in(&mut tx, task_id, status, position).await?;
        tx.commit().await?;
        Ok(moved)
    }

    /// [`move_task`](Self::move_task) inside a caller-owned transaction.
    pub async fn move_in(
        tx: &mut PgTransaction<'_>,
        task_id: Uuid,
        status: TaskStatus,
        position: i32,
    ) -> Result<TfTask> {
        let task = sqlx::query_as::<_, TfTask>("SELECT * FROM taskflow_tasks WHERE id = $1 FOR UPDATE")
            .bind(task_id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| AppError::NotFound("Task not found".to_string()))?;

        let from_status = task.status;
        let from_position = task.sort_order;

        let target: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM taskflow_tasks
            WHERE project_id IS NOT DISTINCT FROM $1 AND status = $2 AND id <> $3
            ORDER BY sort_order, created_at
            FOR UPDATE
            "#,
        )
        .bind(task.project_id)
        .bind(status)
        .bind(task_id)
        .fetch_all(&mut **tx)
        .await?;

        let target = place(&target, task_id, position);

        sqlx::query(
            r#"
            UPDATE taskflow_tasks
            SET status = $2,
                completed_at = CASE
                    WHEN $2 = 'done'::taskflow_status THEN COALESCE(completed_at, NOW())
                    ELSE NULL
                END,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(task_id)
        .bind(status)
        .execute(&mut **tx)
        .await?;

        renumber(tx, &target).await?;

        if from_status != status {
            let source = column_ids(tx, task.project_id, from_status).await?;
            renumber(tx, &source).await?;
        }

        let to_position = target.iter().position(|id| *id == task_id).unwrap_or(0) as i32;

        record_activity(
            &mut **tx,
            ActivityAction::TaskMoved,
            Some(task_id),
            task.project_id,
            Some(json!({
                "from": { "status": from_status, "order": from_position },
                "to": { "status": status, "order": to_position },
            })),
        )
        .await?;

        let moved = sqlx::query_as::<_, TfTask>("SELECT * FROM taskflow_tasks WHERE id = $1")
            .bind(task_id)
            .fetch_one(&mut **tx)
            .await?;

        tracing::debug!(
            task_id = %task_id,
            from = from_status.as_str(),
            to = status.as_str(),
            position = to_position,
            "Task moved"
        );

        Ok(moved)
    }

    /// Put `task_ids` at the top of their column in the given order.
    ///
    /// All ids must be in the `status` column of one project. Tasks of that
    /// column left out of the request keep their relative order after them.
    pub async fn reorder(&self, status: TaskStatus, task_ids: &[Uuid]) -> Result<Vec<TfTask>> {
        ensure_unique(task_ids)?;
        if task_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.db.begin().await?;

        let found: Vec<(Uuid, Option<Uuid>)> = sqlx::query_as(
            "SELECT id, project_id FROM taskflow_tasks WHERE id = ANY($1) AND status = $2 FOR UPDATE",
        )
        .bind(task_ids)
        .bind(status)
        .fetch_all(&mut *tx)
        .await?;

        if found.len() != task_ids.len() {
            return Err(AppError::Validation(format!(
                "All tasks must exist and be in the '{}' column",
                status.as_str()
            )));
        }
        let project_id = single_project(&found)?;

        let column = column_ids(&mut tx, project_id, status).await?;
        let ordered = reordered_column(&column, task_ids);
        renumber(&mut tx, &ordered).await?;

        record_activity(
            &mut *tx,
            ActivityAction::TasksReordered,
            None,
            project_id,
            Some(json!({ "status": status, "task_ids": task_ids })),
        )
        .await?;

        let tasks = sqlx::query_as::<_, TfTask>(
            "SELECT * FROM taskflow_tasks WHERE id = ANY($1) ORDER BY sort_order",
        )
        .bind(task_ids)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(tasks)
    }

    /// Move a task to another project, at the end of the same status
    /// column. Runs inside the caller's transaction.
    pub async fn transfer(
        tx: &mut PgTransaction<'_>,
        task_id: Uuid,
        project_id: Uuid,
    ) -> Result<TfTask> {
        let task = sqlx::query_as::<_, TfTask>("SELECT * FROM taskflow_tasks WHERE id = $1 FOR UPDATE")
            .bind(task_id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| AppError::NotFound("Task not found".to_string()))?;
        if task.project_id == Some(project_id) {
            return Ok(task);
        }

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM taskflow_projects WHERE id = $1)")
                .bind(project_id)
                .fetch_one(&mut **tx)
                .await?;
        if !exists {
            return Err(AppError::Validation(format!("Project {} does not exist", project_id)));
        }

        let position = Self::next_position(&mut **tx, Some(project_id), task.status).await?;
        let moved = sqlx::query_as::<_, TfTask>(
            r#"
            UPDATE taskflow_tasks
            SET project_id = $2, sort_order = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(task_id)
        .bind(project_id)
        .bind(position)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| AppError::from_write(e, "Task already exists"))?;

        let source = column_ids(tx, task.project_id, task.status).await?;
        renumber(tx, &source).await?;

        record_activity(
            &mut **tx,
            ActivityAction::TaskUpdated,
            Some(task_id),
            Some(project_id),
            Some(json!({ "project_id": { "from": task.project_id, "to": project_id } })),
        )
        .await?;

        Ok(moved)
    }

    /// Delete a task and close the gap it leaves in its column.
    pub async fn delete_task(&self, task_id: Uuid) -> Result<TfTask> {
        let mut tx = self.db.begin().await?;

        let task = sqlx::query_as::<_, TfTask>("DELETE FROM taskflow_tasks WHERE id = $1 RETURNING *")
            .bind(task_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("Task not found".to_string()))?;

        let column = column_ids(&mut tx, task.project_id, task.status).await?;
        renumber(&mut tx, &column).await?;

        record_activity(
            &mut *tx,
            ActivityAction::TaskDeleted,
            Some(task_id),
            task.project_id,
            Some(json!({ "title": task.title, "status": task.status })),
        )
        .await?;

        tx.commit().await?;
        Ok(task)
    }

    /// Counts per status, overdue open tasks and recent completions.
    pub async fn stats(&self, project_id: Option<Uuid>) -> Result<TaskflowStats> {
        let rows: Vec<(TaskStatus, i64)> = sqlx::query_as(
            r#"
            SELECT status, COUNT(*) FROM taskflow_tasks
            WHERE ($1::uuid IS NULL OR project_id = $1)
            GROUP BY status
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.db)
        .await?;

        let overdue: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM taskflow_tasks
            WHERE ($1::uuid IS NULL OR project_id = $1)
              AND status <> 'done' AND due_date < CURRENT_DATE
            "#,
        )
        .bind(project_id)
        .fetch_one(&self.db)
        .await?;

        let completed_last_7_days: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM taskflow_tasks
            WHERE ($1::uuid IS NULL OR project_id = $1)
              AND completed_at >= NOW() - INTERVAL '7 days'
            "#,
        )
        .bind(project_id)
        .fetch_one(&self.db)
        .await?;

        let by_status = fill_status_counts(&rows);
        Ok(TaskflowStats {
            total: by_status.iter().map(|s| s.count).sum(),
            by_status,
            overdue,
            completed_last_7_days,
        })
    }
}

/// Ids of one column in board order, locked for the rest of the transaction.
async fn column_ids(
    tx: &mut PgTransaction<'_>,
    project_id: Option<Uuid>,
    status: TaskStatus,
) -> Result<Vec<Uuid>> {
    let ids = sqlx::query_scalar(
        r#"
        SELECT id FROM taskflow_tasks
        WHERE project_id IS NOT DISTINCT FROM $1 AND status = $2
        ORDER BY sort_order, created_at
        FOR UPDATE
        "#,
    )
    .bind(project_id)
    .bind(status)
    .fetch_all(&mut **tx)
    .await?;
    Ok(ids)
}

async fn renumber(tx: &mut PgTransaction<'_>, ids: &[Uuid]) -> Result<()> {
    // unnest WITH ORDINALITY keeps this to one statement per column
    sqlx::query(
        r#"
        UPDATE taskflow_tasks t
        SET sort_order = o.position - 1
        FROM unnest($1::uuid[]) WITH ORDINALITY AS o(id, position)
        WHERE t.id = o.id AND t.sort_order IS DISTINCT FROM (o.position - 1)::int
        "#,
    )
    .bind(ids)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
