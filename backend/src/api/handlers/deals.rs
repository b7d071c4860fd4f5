//! CRM deal handlers and the pipeline summary.

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
use crate::models::crm::{Deal, DealStage};
use crate::services::audit_service::{AuditAction, ResourceType};

/// Nested under `/api/crm/deals`.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_deals).post(create_deal))
        .route("/:id", get(get_deal).patch(update_deal).delete(delete_deal))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListDealsQuery {
    /// Matches the deal title
    pub search: Option<String>,
    pub company_id: Option<Uuid>,
    pub contact_id: Option<Uuid>,
    pub stage: Option<DealStage>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DealListResponse {
    pub items: Vec<Deal>,
    pub pagination: Pagination,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DealRequest {
    pub company_id: Option<Uuid>,
    pub contact_id: Option<Uuid>,
    pub title: Option<String>,
    pub value_cents: Option<i64>,
    pub stage: Option<DealStage>,
    pub expected_close_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StageSummary {
    pub stage: DealStage,
    pub count: i64,
    pub total_value_cents: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PipelineResponse {
    /// Every stage in pipeline order, including empty ones
    pub stages: Vec<StageSummary>,
    /// Value of deals not yet won or lost
    pub open_value_cents: i64,
    /// Open value weighted by each stage's win probability
    pub weighted_value_cents: i64,
}

/// Fold per-stage aggregates into the full pipeline.
pub(crate) fn summarize(rows: &[(DealStage, i64, i64)]) -> PipelineResponse {
    let stages: Vec<StageSummary> = DealStage::ALL
        .iter()
        .map(|stage| {
            let (count, total) = rows
                .iter()
                .find(|(s, _, _)| s == stage)
                .map(|(_, c, t)| (*c, *t))
                .unwrap_or((0, 0));
            StageSummary {
                stage: *stage,
                count,
                total_value_cents: total,
            }
        })
        .collect();

    let open = stages.iter().filter(|s| !s.stage.is_closed());
    let open_value_cents = open.clone().map(|s| s.total_value_cents).sum();
    let weighted_value_cents = open
        .map(|s| s.total_value_cents * s.stage.win_probability() / 100)
        .sum();

    PipelineResponse {
        stages,
        open_value_cents,
        weighted_value_cents,
    }
}

/// List deals
#[utoipa::path(
    get,
    path = "",
    context_path = "/api/crm/deals",
    tag = "crm",
    params(ListDealsQuery, PaginationQuery),
    responses((status = 200, description = "Deals, most recently updated first", body = DealListResponse)),
    security(("bearer_auth" = []))
)]
pub async fn list_deals(
    State(state): State<SharedState>,
    Query(query): Query<ListDealsQuery>,
    Query(pagination): Query<PaginationQuery>,
) -> Result<Json<DealListResponse>> {
    let search = like_pattern(query.search.as_deref());

    let items: Vec<Deal> = sqlx::query_as(
        r#"
        SELECT * FROM deals
        WHERE ($1::text IS NULL OR title ILIKE $1)
          AND ($2::uuid IS NULL OR company_id = $2)
          AND ($3::uuid IS NULL OR contact_id = $3)
          AND ($4::deal_stage IS NULL OR stage = $4)
        ORDER BY updated_at DESC
        OFFSET $5 LIMIT $6
        "#,
    )
    .bind(&search)
    .bind(query.company_id)
    .bind(query.contact_id)
    .bind(query.stage)
    .bind(pagination.offset())
    .bind(pagination.limit())
    .fetch_all(&state.db)
    .await?;

    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM deals
        WHERE ($1::text IS NULL OR title ILIKE $1)
          AND ($2::uuid IS NULL OR company_id = $2)
          AND ($3::uuid IS NULL OR contact_id = $3)
          AND ($4::deal_stage IS NULL OR stage = $4)
        "#,
    )
    .bind(&search)
    .bind(query.company_id)
    .bind(query.contact_id)
    .bind(query.stage)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(DealListResponse {
        items,
        pagination: Pagination::from_query_and_total(&pagination, total),
    }))
}

/// Get a deal
#[utoipa::path(
    get,
    path = "/{id}",
    context_path = "/api/crm/deals",
    tag = "crm",
    params(("id" = Uuid, Path, description = "Deal ID")),
    responses(
        (status = 200, description = "Deal", body = Deal),
        (status = 404, description = "Deal not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_deal(State(state): State<SharedState>, Path(id): Path<Uuid>) -> Result<Json<Deal>> {
    let deal: Deal = sqlx::query_as("SELECT * FROM deals WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Deal not found".to_string()))?;
    Ok(Json(deal))
}

/// Create a deal
#[utoipa::path(
    post,
    path = "",
    context_path = "/api/crm/deals",
    tag = "crm",
    request_body = DealRequest,
    responses(
        (status = 201, description = "Deal created", body = Deal),
        (status = 400, description = "Validation error or unknown company/contact")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_deal(
    State(state): State<SharedState>,
    meta: AuditMeta,
    Json(payload): Json<DealRequest>,
) -> Result<(StatusCode, Json<Deal>)> {
    let title = validation::required("title", payload.title.as_deref())?;
    validation::max_len("title", title, 200)?;
    let value_cents = payload.value_cents.unwrap_or(0);
    validation::non_negative("value_cents", value_cents)?;
    let stage = payload.stage.unwrap_or(DealStage::Lead);

    let deal: Deal = sqlx::query_as(
        r#"
        INSERT INTO deals (company_id, contact_id, title, value_cents, stage, expected_close_date, notes, closed_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, CASE WHEN $8 THEN NOW() END)
        RETURNING *
        "#,
    )
    .bind(payload.company_id)
    .bind(payload.contact_id)
    .bind(title)
    .bind(value_cents)
    .bind(stage)
    .bind(payload.expected_close_date)
    .bind(trimmed(payload.notes))
    .bind(stage.is_closed())
    .fetch_one(&state.db)
    .await
    .map_err(|e| AppError::from_write(e, "Deal already exists"))?;

    tracing::info!(deal_id = %deal.id, stage = stage.as_str(), "Deal created");

    state
        .audit()
        .record(
            meta.entry(AuditAction::Created, ResourceType::Deal)
                .resource(deal.id)
                .details(json!({ "title": deal.title, "stage": stage, "value_cents": value_cents })),
        )
        .await;

    Ok((StatusCode::CREATED, Json(deal)))
}

/// Update a deal
///
/// Moving to `won` or `lost` stamps `closed_at`; moving back to an open
/// stage clears it.
#[utoipa::path(
    patch,
    path = "/{id}",
    context_path = "/api/crm/deals",
    tag = "crm",
    params(("id" = Uuid, Path, description = "Deal ID")),
    request_body = DealRequest,
    responses(
        (status = 200, description = "Deal updated", body = Deal),
        (status = 400, description = "Validation error"),
        (status = 404, description = "Deal not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_deal(
    State(state): State<SharedState>,
    meta: AuditMeta,
    Path(id): Path<Uuid>,
    Json(payload): Json<DealRequest>,
) -> Result<Json<Deal>> {
    let title = validation::optional("title", payload.title.as_deref(), 200)?;
    if let Some(value) = payload.value_cents {
        validation::non_negative("value_cents", value)?;
    }

    let previous: Option<DealStage> = sqlx::query_scalar("SELECT stage FROM deals WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?;
    let Some(previous) = previous else {
        return Err(AppError::NotFound("Deal not found".to_string()));
    };

    let deal: Deal = sqlx::query_as(
        r#"
        UPDATE deals SET
            company_id = COALESCE($2, company_id),
            contact_id = COALESCE($3, contact_id),
            title = COALESCE($4, title),
            value_cents = COALESCE($5, value_cents),
            stage = COALESCE($6, stage),
            expected_close_date = COALESCE($7, expected_close_date),
            notes = COALESCE($8, notes),
            closed_at = CASE
                WHEN $6::deal_stage IS NULL OR $6 = stage THEN closed_at
                WHEN $6 IN ('won', 'lost') THEN NOW()
                ELSE NULL
            END,
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(payload.company_id)
    .bind(payload.contact_id)
    .bind(&title)
    .bind(payload.value_cents)
    .bind(payload.stage)
    .bind(payload.expected_close_date)
    .bind(trimmed(payload.notes))
    .fetch_optional(&state.db)
    .await
    .map_err(|e| AppError::from_write(e, "Deal already exists"))?
    .ok_or_else(|| AppError::NotFound("Deal not found".to_string()))?;

    if deal.stage != previous {
        tracing::info!(
            deal_id = %id,
            from = previous.as_str(),
            to = deal.stage.as_str(),
            "Deal stage changed"
        );
        state
            .audit()
            .record(
                meta.entry(AuditAction::StatusChanged, ResourceType::Deal)
                    .resource(id)
                    .details(json!({ "from": previous, "to": deal.stage })),
            )
            .await;
    } else {
        state
            .audit()
            .record(meta.entry(AuditAction::Updated, ResourceType::Deal).resource(id))
            .await;
    }

    Ok(Json(deal))
}

/// Delete a deal
#[utoipa::path(
    delete,
    path = "/{id}",
    context_path = "/api/crm/deals",
    tag = "crm",
    params(("id" = Uuid, Path, description = "Deal ID")),
    responses(
        (status = 200, description = "Deal deleted", body = DeletedResponse),
        (status = 404, description = "Deal not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_deal(
    State(state): State<SharedState>,
    meta: AuditMeta,
    Path(id): Path<Uuid>,
) -> Result<Json<DeletedResponse>> {
    let title: Option<String> = sqlx::query_scalar("DELETE FROM deals WHERE id = $1 RETURNING title")
        .bind(id)
        .fetch_optional(&state.db)
        .await?;
    let Some(title) = title else {
        return Err(AppError::NotFound("Deal not found".to_string()));
    };

    state
        .audit()
        .record(
            meta.entry(AuditAction::Deleted, ResourceType::Deal)
                .resource(id)
                .details(json!({ "title": title })),
        )
        .await;

    Ok(Json(DeletedResponse { deleted: true }))
}

/// Pipeline summary by stage
#[utoipa::path(
    get,
    path = "/pipeline",
    context_path = "/api/crm",
    tag = "crm",
    responses((status = 200, description = "Per-stage counts and values", body = PipelineResponse)),
    security(("bearer_auth" = []))
)]
pub async fn pipeline(State(state): State<SharedState>) -> Result<Json<PipelineResponse>> {
    let rows: Vec<(DealStage, i64, i64)> = sqlx::query_as(
        r#"
        SELECT stage, COUNT(*), COALESCE(SUM(value_cents), 0)::BIGINT
        FROM deals
        GROUP BY stage
        "#,
    )
    .fetch_all(&state.db)
    .await?;

    Ok(Json(summarize(&rows)))
}

#[derive(OpenApi)]
#[openapi(
    paths(list_deals, get_deal, create_deal, update_deal, delete_deal, pipeline),
    components(schemas(
        Deal,
        DealStage,
        DealListResponse,
        DealRequest,
        StageSummary,
        PipelineResponse,
    ))
)]
pub struct DealsApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::test_support::{self, assert_validation};

    fn app() -> Router {
        router().with_state(test_support::state())
    }

    #[test]
    fn test_summarize_includes_empty_stages() {
        let summary = summarize(&[(DealStage::Proposal, 2, 1_000_000)]);
        assert_eq!(summary.stages.len(), DealStage::ALL.len());
        assert_eq!(summary.stages[0].stage, DealStage::Lead);
        assert_eq!(summary.stages[0].count, 0);
        assert_eq!(summary.stages[2].count, 2);
        assert_eq!(summary.stages[2].total_value_cents, 1_000_000);
    }

    #[test]
    fn test_summarize_weights_open_deals_only() {
        let summary = summarize(&[
            (DealStage::Lead, 1, 100_000),
            (DealStage::Negotiation, 1, 400_000),
            (DealStage::Won, 3, 900_000),
            (DealStage::Lost, 1, 200_000),
        ]);
        assert_eq!(summary.open_value_cents, 500_000);
        // 10% of 1000 + 75% of 4000
        assert_eq!(summary.weighted_value_cents, 10_000 + 300_000);
    }

    #[tokio::test]
    async fn test_create_requires_title() {
        let (status, body) =
            test_support::send(app(), "POST", "/", Some(json!({ "value_cents": 500 }))).await;
        assert_validation(status, &body, "title is required");
    }

    #[tokio::test]
    async fn test_create_rejects_negative_value() {
        let (status, body) = test_support::send(
            app(),
            "POST",
            "/",
            Some(json!({ "title": "Audit", "value_cents": -1 })),
        )
        .await;
        assert_validation(status, &body, "value_cents must not be negative");
    }

    #[tokio::test]
    async fn test_update_rejects_negative_value() {
        let uri = format!("/{}", Uuid::new_v4());
        let (status, body) =
            test_support::send(app(), "PATCH", &uri, Some(json!({ "value_cents": -10 }))).await;
        assert_validation(status, &body, "value_cents must not be negative");
    }
}
