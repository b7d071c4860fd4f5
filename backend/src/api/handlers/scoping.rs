//! Scoping calculator and admin management of quiz factors and pricing rules.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use utoipa::{IntoParams, OpenApi, ToSchema};
use uuid::Uuid;

use super::{trimmed, AuditMeta};
use crate::api::dto::{DeletedResponse, Pagination, PaginationQuery};
use crate::api::validation;
use crate::api::SharedState;
use crate::error::{AppError, Result};
use crate::models::scoping::{
    AdjustmentType, FactorInputType, RuleOperator, ScopingFactor, ScopingRule,
};
use crate::services::audit_service::{AuditAction, ResourceType};
use crate::services::scoping_service::{
    validate_rule, AppliedAdjustment, ScopingInputs, ScopingResult,
};

const DUPLICATE_FACTOR: &str = "A factor with this key already exists for the package";

/// Public routes, nested under `/api/scoping`.
pub fn public_router() -> Router<SharedState> {
    Router::new().route("/calculate", post(calculate))
}

/// Admin routes, nested under `/api/admin/scoping-factors`.
pub fn factors_router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_factors).post(create_factor))
        .route(
            "/:id",
            get(get_factor).patch(update_factor).delete(delete_factor),
        )
}

/// Admin routes, nested under `/api/admin/scoping-rules`.
pub fn rules_router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_rules).post(create_rule))
        .route("/:id", get(get_rule).patch(update_rule).delete(delete_rule))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CalculateRequest {
    pub package_id: Option<Uuid>,
    /// Quiz answers keyed by factor key
    #[schema(value_type = Object)]
    pub inputs: Option<ScopingInputs>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListByPackageQuery {
    pub package_id: Option<Uuid>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FactorListResponse {
    pub items: Vec<ScopingFactor>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RuleListResponse {
    pub items: Vec<ScopingRule>,
    pub pagination: Pagination,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateFactorRequest {
    /// Omit for a question asked for every package
    pub package_id: Option<Uuid>,
    pub key: Option<String>,
    pub label: Option<String>,
    pub help_text: Option<String>,
    pub input_type: Option<FactorInputType>,
    #[schema(value_type = Option<Object>)]
    pub options: Option<Value>,
    pub is_required: Option<bool>,
    pub sort_order: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateFactorRequest {
    pub key: Option<String>,
    pub label: Option<String>,
    pub help_text: Option<String>,
    pub input_type: Option<FactorInputType>,
    #[schema(value_type = Option<Object>)]
    pub options: Option<Value>,
    pub is_required: Option<bool>,
    pub sort_order: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateRuleRequest {
    pub package_id: Option<Uuid>,
    pub factor_key: Option<String>,
    pub operator: Option<RuleOperator>,
    #[schema(value_type = Option<Object>)]
    pub value: Option<Value>,
    pub price_adjustment_type: Option<AdjustmentType>,
    pub price_adjustment: Option<f64>,
    pub timeline_adjustment_weeks: Option<i32>,
    pub priority: Option<i32>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateRuleRequest {
    pub factor_key: Option<String>,
    pub operator: Option<RuleOperator>,
    #[schema(value_type = Option<Object>)]
    pub value: Option<Value>,
    pub price_adjustment_type: Option<AdjustmentType>,
    pub price_adjustment: Option<f64>,
    pub timeline_adjustment_weeks: Option<i32>,
    pub priority: Option<i32>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

/// Factor keys double as JSON keys in quiz answers.
fn validate_key(field: &str, key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && key.len() <= 100
        && key
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');
    if !valid {
        return Err(AppError::Validation(format!(
            "{} must contain only lowercase letters, digits, '_' and '-'",
            field
        )));
    }
    Ok(())
}

/// Options must be an array of `{ "value": ..., "label": ... }` objects, and
/// choice questions need at least one.
fn validate_options(input_type: FactorInputType, options: &Value) -> Result<()> {
    let Some(items) = options.as_array() else {
        return Err(AppError::Validation("options must be an array".to_string()));
    };
    if items
        .iter()
        .any(|item| item.get("value").is_none() || item.get("label").is_none())
    {
        return Err(AppError::Validation(
            "each option needs a value and a label".to_string(),
        ));
    }
    if matches!(
        input_type,
        FactorInputType::Select | FactorInputType::MultiSelect
    ) && items.is_empty()
    {
        return Err(AppError::Validation(
            "select factors need at least one option".to_string(),
        ));
    }
    Ok(())
}

/// Price a package against quiz answers
#[utoipa::path(
    post,
    path = "/calculate",
    context_path = "/api/scoping",
    tag = "scoping",
    request_body = CalculateRequest,
    responses(
        (status = 200, description = "Price and timeline breakdown", body = ScopingResult),
        (status = 400, description = "Missing package or required answers"),
        (status = 404, description = "Package not found")
    )
)]
pub async fn calculate(
    State(state): State<SharedState>,
    Json(payload): Json<CalculateRequest>,
) -> Result<Json<ScopingResult>> {
    let package_id = payload
        .package_id
        .ok_or_else(|| AppError::Validation("package_id is required".to_string()))?;
    let inputs = payload.inputs.unwrap_or_default();

    let scoping = state.scoping();
    let package = scoping.active_package(package_id).await?;
    Ok(Json(scoping.calculate(&package, &inputs).await?))
}

/// List scoping factors (admin)
#[utoipa::path(
    get,
    path = "",
    context_path = "/api/admin/scoping-factors",
    tag = "scoping",
    params(ListByPackageQuery, PaginationQuery),
    responses((status = 200, description = "Factors", body = FactorListResponse)),
    security(("bearer_auth" = []))
)]
pub async fn list_factors(
    State(state): State<SharedState>,
    Query(query): Query<ListByPackageQuery>,
    Query(pagination): Query<PaginationQuery>,
) -> Result<Json<FactorListResponse>> {
    let items: Vec<ScopingFactor> = sqlx::query_as(
        r#"
        SELECT * FROM scoping_factors
        WHERE ($1::uuid IS NULL OR package_id = $1)
          AND ($2::boolean IS NULL OR is_active = $2)
        ORDER BY package_id NULLS FIRST, sort_order, label
        OFFSET $3 LIMIT $4
        "#,
    )
    .bind(query.package_id)
    .bind(query.is_active)
    .bind(pagination.offset())
    .bind(pagination.limit())
    .fetch_all(&state.db)
    .await?;

    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM scoping_factors
        WHERE ($1::uuid IS NULL OR package_id = $1)
          AND ($2::boolean IS NULL OR is_active = $2)
        "#,
    )
    .bind(query.package_id)
    .bind(query.is_active)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(FactorListResponse {
        items,
        pagination: Pagination::from_query_and_total(&pagination, total),
    }))
}

/// Get a scoping factor
#[utoipa::path(
    get,
    path = "/{id}",
    context_path = "/api/admin/scoping-factors",
    tag = "scoping",
    params(("id" = Uuid, Path, description = "Factor ID")),
    responses(
        (status = 200, description = "Factor", body = ScopingFactor),
        (status = 404, description = "Factor not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_factor(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ScopingFactor>> {
    let factor: ScopingFactor = sqlx::query_as("SELECT * FROM scoping_factors WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Scoping factor not found".to_string()))?;
    Ok(Json(factor))
}

/// Create a scoping factor
#[utoipa::path(
    post,
    path = "",
    context_path = "/api/admin/scoping-factors",
    tag = "scoping",
    request_body = CreateFactorRequest,
    responses(
        (status = 201, description = "Factor created", body = ScopingFactor),
        (status = 400, description = "Validation error"),
        (status = 409, description = "Key already used for the package")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_factor(
    State(state): State<SharedState>,
    meta: AuditMeta,
    Json(payload): Json<CreateFactorRequest>,
) -> Result<(StatusCode, Json<ScopingFactor>)> {
    let key = validation::required("key", payload.key.as_deref())?;
    validate_key("key", key)?;
    let label = validation::required("label", payload.label.as_deref())?;
    validation::max_len("label", label, 300)?;
    let input_type = payload
        .input_type
        .ok_or_else(|| AppError::Validation("input_type is required".to_string()))?;
    let options = payload.options.unwrap_or_else(|| json!([]));
    validate_options(input_type, &options)?;

    let factor: ScopingFactor = sqlx::query_as(
        r#"
        INSERT INTO scoping_factors (
            package_id, key, label, help_text, input_type, options, is_required, sort_order, is_active
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING *
        "#,
    )
    .bind(payload.package_id)
    .bind(key)
    .bind(label)
    .bind(trimmed(payload.help_text))
    .bind(input_type)
    .bind(&options)
    .bind(payload.is_required.unwrap_or(false))
    .bind(payload.sort_order.unwrap_or(0))
    .bind(payload.is_active.unwrap_or(true))
    .fetch_one(&state.db)
    .await
    .map_err(|e| AppError::from_write(e, DUPLICATE_FACTOR))?;

    state
        .audit()
        .record(
            meta.entry(AuditAction::Created, ResourceType::ScopingFactor)
                .resource(factor.id)
                .details(json!({ "key": factor.key, "package_id": factor.package_id })),
        )
        .await;

    Ok((StatusCode::CREATED, Json(factor)))
}

/// Update a scoping factor
#[utoipa::path(
    patch,
    path = "/{id}",
    context_path = "/api/admin/scoping-factors",
    tag = "scoping",
    params(("id" = Uuid, Path, description = "Factor ID")),
    request_body = UpdateFactorRequest,
    responses(
        (status = 200, description = "Factor updated", body = ScopingFactor),
        (status = 400, description = "Validation error"),
        (status = 404, description = "Factor not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_factor(
    State(state): State<SharedState>,
    meta: AuditMeta,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateFactorRequest>,
) -> Result<Json<ScopingFactor>> {
    let key = payload.key.as_deref().map(str::trim);
    if let Some(key) = key {
        validate_key("key", key)?;
    }
    if let Some(label) = payload.label.as_deref() {
        validation::max_len("label", validation::required("label", Some(label))?, 300)?;
    }

    let current: ScopingFactor = sqlx::query_as("SELECT * FROM scoping_factors WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Scoping factor not found".to_string()))?;

    let input_type = payload.input_type.unwrap_or(current.input_type);
    let options = payload.options.clone().unwrap_or(current.options);
    validate_options(input_type, &options)?;

    let factor: ScopingFactor = sqlx::query_as(
        r#"
        UPDATE scoping_factors SET
            key = COALESCE($2, key),
            label = COALESCE($3, label),
            help_text = COALESCE($4, help_text),
            input_type = $5,
            options = $6,
            is_required = COALESCE($7, is_required),
            sort_order = COALESCE($8, sort_order),
            is_active = COALESCE($9, is_active),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(key)
    .bind(trimmed(payload.label))
    .bind(trimmed(payload.help_text))
    .bind(input_type)
    .bind(&options)
    .bind(payload.is_required)
    .bind(payload.sort_order)
    .bind(payload.is_active)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| AppError::from_write(e, DUPLICATE_FACTOR))?
    .ok_or_else(|| AppError::NotFound("Scoping factor not found".to_string()))?;

    state
        .audit()
        .record(
            meta.entry(AuditAction::Updated, ResourceType::ScopingFactor)
                .resource(id)
                .details(json!({ "key": factor.key })),
        )
        .await;

    Ok(Json(factor))
}

/// Delete a scoping factor
#[utoipa::path(
    delete,
    path = "/{id}",
    context_path = "/api/admin/scoping-factors",
    tag = "scoping",
    params(("id" = Uuid, Path, description = "Factor ID")),
    responses(
        (status = 200, description = "Factor deleted", body = DeletedResponse),
        (status = 404, description = "Factor not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_factor(
    State(state): State<SharedState>,
    meta: AuditMeta,
    Path(id): Path<Uuid>,
) -> Result<Json<DeletedResponse>> {
    let key: Option<String> =
        sqlx::query_scalar("DELETE FROM scoping_factors WHERE id = $1 RETURNING key")
            .bind(id)
            .fetch_optional(&state.db)
            .await?;
    let Some(key) = key else {
        return Err(AppError::NotFound("Scoping factor not found".to_string()));
    };

    state
        .audit()
        .record(
            meta.entry(AuditAction::Deleted, ResourceType::ScopingFactor)
                .resource(id)
                .details(json!({ "key": key })),
        )
        .await;

    Ok(Json(DeletedResponse { deleted: true }))
}

/// List pricing rules (admin)
#[utoipa::path(
    get,
    path = "",
    context_path = "/api/admin/scoping-rules",
    tag = "scoping",
    params(ListByPackageQuery, PaginationQuery),
    responses((status = 200, description = "Rules in application order", body = RuleListResponse)),
    security(("bearer_auth" = []))
)]
pub async fn list_rules(
    State(state): State<SharedState>,
    Query(query): Query<ListByPackageQuery>,
    Query(pagination): Query<PaginationQuery>,
) -> Result<Json<RuleListResponse>> {
    let items: Vec<ScopingRule> = sqlx::query_as(
        r#"
        SELECT * FROM scoping_rules
        WHERE ($1::uuid IS NULL OR package_id = $1)
          AND ($2::boolean IS NULL OR is_active = $2)
        ORDER BY package_id, priority, created_at
        OFFSET $3 LIMIT $4
        "#,
    )
    .bind(query.package_id)
    .bind(query.is_active)
    .bind(pagination.offset())
    .bind(pagination.limit())
    .fetch_all(&state.db)
    .await?;

    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM scoping_rules
        WHERE ($1::uuid IS NULL OR package_id = $1)
          AND ($2::boolean IS NULL OR is_active = $2)
        "#,
    )
    .bind(query.package_id)
    .bind(query.is_active)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(RuleListResponse {
        items,
        pagination: Pagination::from_query_and_total(&pagination, total),
    }))
}

/// Get a pricing rule
#[utoipa::path(
    get,
    path = "/{id}",
    context_path = "/api/admin/scoping-rules",
    tag = "scoping",
    params(("id" = Uuid, Path, description = "Rule ID")),
    responses(
        (status = 200, description = "Rule", body = ScopingRule),
        (status = 404, description = "Rule not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_rule(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ScopingRule>> {
    Ok(Json(fetch_rule(&state, id).await?))
}

async fn fetch_rule(state: &SharedState, id: Uuid) -> Result<ScopingRule> {
    sqlx::query_as("SELECT * FROM scoping_rules WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Scoping rule not found".to_string()))
}

/// Create a pricing rule
#[utoipa::path(
    post,
    path = "",
    context_path = "/api/admin/scoping-rules",
    tag = "scoping",
    request_body = CreateRuleRequest,
    responses(
        (status = 201, description = "Rule created", body = ScopingRule),
        (status = 400, description = "Validation error")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_rule(
    State(state): State<SharedState>,
    meta: AuditMeta,
    Json(payload): Json<CreateRuleRequest>,
) -> Result<(StatusCode, Json<ScopingRule>)> {
    let package_id = payload
        .package_id
        .ok_or_else(|| AppError::Validation("package_id is required".to_string()))?;
    let factor_key = validation::required("factor_key", payload.factor_key.as_deref())?;
    validate_key("factor_key", factor_key)?;
    let operator = payload
        .operator
        .ok_or_else(|| AppError::Validation("operator is required".to_string()))?;
    let value = payload.value.unwrap_or(Value::Null);
    let adjustment_type = payload.price_adjustment_type.unwrap_or(AdjustmentType::Fixed);
    let price_adjustment = payload.price_adjustment.unwrap_or(0.0);
    let timeline_adjustment_weeks = payload.timeline_adjustment_weeks.unwrap_or(0);
    validate_rule(operator, &value, adjustment_type, price_adjustment, timeline_adjustment_weeks)?;

    let rule: ScopingRule = sqlx::query_as(
        r#"
        INSERT INTO scoping_rules (
            package_id, factor_key, operator, value, price_adjustment_type, price_adjustment,
            timeline_adjustment_weeks, priority, description, is_active
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING *
        "#,
    )
    .bind(package_id)
    .bind(factor_key)
    .bind(operator)
    .bind(&value)
    .bind(adjustment_type)
    .bind(price_adjustment)
    .bind(timeline_adjustment_weeks)
    .bind(payload.priority.unwrap_or(100))
    .bind(trimmed(payload.description))
    .bind(payload.is_active.unwrap_or(true))
    .fetch_one(&state.db)
    .await
    .map_err(|e| AppError::from_write(e, "Duplicate scoping rule"))?;

    tracing::info!(rule_id = %rule.id, package_id = %package_id, "Scoping rule created");

    state
        .audit()
        .record(
            meta.entry(AuditAction::Created, ResourceType::ScopingRule)
                .resource(rule.id)
                .details(json!({
                    "package_id": package_id,
                    "factor_key": rule.factor_key,
                    "priority": rule.priority,
                })),
        )
        .await;

    Ok((StatusCode::CREATED, Json(rule)))
}

/// Update a pricing rule
///
/// The merged rule is validated as a whole, so changing only the operator
/// still checks it against the stored value.
#[utoipa::path(
    patch,
    path = "/{id}",
    context_path = "/api/admin/scoping-rules",
    tag = "scoping",
    params(("id" = Uuid, Path, description = "Rule ID")),
    request_body = UpdateRuleRequest,
    responses(
        (status = 200, description = "Rule updated", body = ScopingRule),
        (status = 400, description = "Validation error"),
        (status = 404, description = "Rule not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_rule(
    State(state): State<SharedState>,
    meta: AuditMeta,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateRuleRequest>,
) -> Result<Json<ScopingRule>> {
    let factor_key = payload.factor_key.as_deref().map(str::trim);
    if let Some(key) = factor_key {
        validate_key("factor_key", key)?;
    }

    let current = fetch_rule(&state, id).await?;
    let operator = payload.operator.unwrap_or(current.operator);
    let value = payload.value.clone().unwrap_or(current.value);
    let adjustment_type = payload
        .price_adjustment_type
        .unwrap_or(current.price_adjustment_type);
    let price_adjustment = payload.price_adjustment.unwrap_or(current.price_adjustment);
    let timeline_adjustment_weeks = payload
        .timeline_adjustment_weeks
        .unwrap_or(current.timeline_adjustment_weeks);
    validate_rule(operator, &value, adjustment_type, price_adjustment, timeline_adjustment_weeks)?;

    let rule: ScopingRule = sqlx::query_as(
        r#"
        UPDATE scoping_rules SET
            factor_key = COALESCE($2, factor_key),
            operator = $3,
            value = $4,
            price_adjustment_type = $5,
            price_adjustment = $6,
            timeline_adjustment_weeks = COALESCE($7, timeline_adjustment_weeks),
            priority = COALESCE($8, priority),
            description = COALESCE($9, description),
            is_active = COALESCE($10, is_active),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(factor_key)
    .bind(operator)
    .bind(&value)
    .bind(adjustment_type)
    .bind(price_adjustment)
    .bind(payload.timeline_adjustment_weeks)
    .bind(payload.priority)
    .bind(trimmed(payload.description))
    .bind(payload.is_active)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound("Scoping rule not found".to_string()))?;

    state
        .audit()
        .record(
            meta.entry(AuditAction::Updated, ResourceType::ScopingRule)
                .resource(id)
                .details(json!({
                    "factor_key": rule.factor_key,
                    "price_adjustment": rule.price_adjustment,
                    "priority": rule.priority,
                })),
        )
        .await;

    Ok(Json(rule))
}

/// Delete a pricing rule
#[utoipa::path(
    delete,
    path = "/{id}",
    context_path = "/api/admin/scoping-rules",
    tag = "scoping",
    params(("id" = Uuid, Path, description = "Rule ID")),
    responses(
        (status = 200, description = "Rule deleted", body = DeletedResponse),
        (status = 404, description = "Rule not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_rule(
    State(state): State<SharedState>,
    meta: AuditMeta,
    Path(id): Path<Uuid>,
) -> Result<Json<DeletedResponse>> {
    let result = sqlx::query("DELETE FROM scoping_rules WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Scoping rule not found".to_string()));
    }

    state
        .audit()
        .record(meta.entry(AuditAction::Deleted, ResourceType::ScopingRule).resource(id))
        .await;

    Ok(Json(DeletedResponse { deleted: true }))
}

#[derive(OpenApi)]
#[openapi(
    paths(
        calculate,
        list_factors,
        get_factor,
        create_factor,
        update_factor,
        delete_factor,
        list_rules,
        get_rule,
        create_rule,
        update_rule,
        delete_rule,
    ),
    components(schemas(
        CalculateRequest,
        ScopingResult,
        AppliedAdjustment,
        ScopingFactor,
        ScopingRule,
        FactorInputType,
        RuleOperator,
        AdjustmentType,
        FactorListResponse,
        RuleListResponse,
        CreateFactorRequest,
        UpdateFactorRequest,
        CreateRuleRequest,
        UpdateRuleRequest,
    ))
)]
pub struct ScopingApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    use crate::api::handlers::test_support::{self, assert_validation};

    #[tokio::test]
    async fn test_calculate_requires_package_id() {
        let app = public_router().with_state(test_support::state());
        let (status, body) = test_support::send(
            app,
            "POST",
            "/calculate",
            Some(json!({ "inputs": { "crm": "hubspot" } })),
        )
        .await;
        assert_validation(status, &body, "package_id is required");
    }

    #[tokio::test]
    async fn test_create_rule_in_requires_array() {
        let app = rules_router().with_state(test_support::state());
        let (status, body) = test_support::send(
            app,
            "POST",
            "/",
            Some(json!({
                "package_id": Uuid::new_v4(),
                "factor_key": "crm",
                "operator": "in",
                "value": "hubspot",
                "price_adjustment": 50000,
            })),
        )
        .await;
        assert_validation(status, &body, "array");
    }

    #[tokio::test]
    async fn test_create_rule_numeric_operator_needs_number() {
        let app = rules_router().with_state(test_support::state());
        let (status, body) = test_support::send(
            app,
            "POST",
            "/",
            Some(json!({
                "package_id": Uuid::new_v4(),
                "factor_key": "seats",
                "operator": "gte",
                "value": "many",
            })),
        )
        .await;
        assert_validation(status, &body, "numeric");
    }

    #[tokio::test]
    async fn test_create_rule_percent_floor() {
        let app = rules_router().with_state(test_support::state());
        let (status, body) = test_support::send(
            app,
            "POST",
            "/",
            Some(json!({
                "package_id": Uuid::new_v4(),
                "factor_key": "discount",
                "operator": "is_true",
                "price_adjustment_type": "percent",
                "price_adjustment": -100,
            })),
        )
        .await;
        assert_validation(status, &body, "-100");
    }

    #[tokio::test]
    async fn test_create_rule_requires_operator() {
        let app = rules_router().with_state(test_support::state());
        let (status, body) = test_support::send(
            app,
            "POST",
            "/",
            Some(json!({ "package_id": Uuid::new_v4(), "factor_key": "crm" })),
        )
        .await;
        assert_validation(status, &body, "operator is required");
    }

    #[tokio::test]
    async fn test_create_factor_requires_options_for_select() {
        let app = factors_router().with_state(test_support::state());
        let (status, body) = test_support::send(
            app,
            "POST",
            "/",
            Some(json!({
                "key": "crm_platform",
                "label": "Which CRM do you use?",
                "input_type": "select",
            })),
        )
        .await;
        assert_validation(status, &body, "at least one option");
    }

    #[tokio::test]
    async fn test_create_factor_requires_label() {
        let app = factors_router().with_state(test_support::state());
        let (status, body) = test_support::send(
            app,
            "POST",
            "/",
            Some(json!({ "key": "seats", "input_type": "number" })),
        )
        .await;
        assert_validation(status, &body, "label is required");
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("key", "crm_platform").is_ok());
        assert!(validate_key("key", "team-size2").is_ok());
        assert!(validate_key("key", "CRM").is_err());
        assert!(validate_key("key", "has space").is_err());
        assert!(validate_key("key", "").is_err());
    }

    #[test]
    fn test_validate_options() {
        let options = json!([{ "value": "hubspot", "label": "HubSpot" }]);
        assert!(validate_options(FactorInputType::Select, &options).is_ok());
        assert!(validate_options(FactorInputType::Number, &json!([])).is_ok());
        assert!(validate_options(FactorInputType::MultiSelect, &json!([])).is_err());
        assert!(validate_options(FactorInputType::Select, &json!({})).is_err());
        assert!(validate_options(FactorInputType::Select, &json!([{ "value": 1 }])).is_err());
    }
}
