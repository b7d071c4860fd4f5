//! Audit log browsing for admins.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, OpenApi, ToSchema};
use uuid::Uuid;

use super::trimmed;
use crate::api::dto::{Pagination, PaginationQuery};
use crate::api::SharedState;
use crate::error::{AppError, Result};
use crate::models::audit_log::AuditLog;
use crate::services::audit_service::AuditQuery;

/// Nested under `/api/admin/audit-logs`.
pub fn admin_router() -> Router<SharedState> {
    Router::new().route("/", get(list_audit_logs))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct AuditLogQuery {
    pub actor: Option<String>,
    /// e.g. `CREATED`, `STATUS_CHANGED`
    pub action: Option<String>,
    /// e.g. `deal`, `taskflow_task`
    pub resource_type: Option<String>,
    pub resource_id: Option<Uuid>,
    /// Inclusive lower bound (RFC 3339)
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound (RFC 3339)
    pub to: Option<DateTime<Utc>>,
}

impl AuditLogQuery {
    fn into_filter(self) -> Result<AuditQuery> {
        if let (Some(from), Some(to)) = (self.from, self.to) {
            if from > to {
                return Err(AppError::Validation("from must not be after to".to_string()));
            }
        }
        Ok(AuditQuery {
            actor: trimmed(self.actor),
            action: trimmed(self.action).map(|a| a.to_uppercase()),
            resource_type: trimmed(self.resource_type).map(|r| r.to_lowercase()),
            resource_id: self.resource_id,
            from: self.from,
            to: self.to,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuditLogListResponse {
    pub items: Vec<AuditLog>,
    pub pagination: Pagination,
}

/// List audit log entries, newest first
#[utoipa::path(
    get,
    path = "",
    context_path = "/api/admin/audit-logs",
    tag = "audit",
    params(AuditLogQuery, PaginationQuery),
    responses(
        (status = 200, description = "Audit entries", body = AuditLogListResponse),
        (status = 400, description = "Invalid filter")
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_audit_logs(
    State(state): State<SharedState>,
    Query(query): Query<AuditLogQuery>,
    Query(pagination): Query<PaginationQuery>,
) -> Result<Json<AuditLogListResponse>> {
    let filter = query.into_filter()?;
    let (items, total) = state
        .audit()
        .query(&filter, pagination.offset(), pagination.limit())
        .await?;

    Ok(Json(AuditLogListResponse {
        items,
        pagination: Pagination::from_query_and_total(&pagination, total),
    }))
}

#[derive(OpenApi)]
#[openapi(
    paths(list_audit_logs),
    components(schemas(AuditLog, AuditLogListResponse))
)]
pub struct AuditLogsApiDoc;
