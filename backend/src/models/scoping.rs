//! Scoping quiz factors and pricing rules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// How a factor is asked in the quiz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "scoping_input_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FactorInputType {
    Select,
    MultiSelect,
    Number,
    Boolean,
    Text,
}

/// Comparison applied between a quiz answer and a rule's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "scoping_operator", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RuleOperator {
    Equals,
    NotEquals,
    In,
    Contains,
    Gt,
    Gte,
    Lt,
    Lte,
    IsTrue,
    IsFalse,
}

impl RuleOperator {
    /// Operators that compare numbers and therefore need a numeric rule value.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            RuleOperator::Gt | RuleOperator::Gte | RuleOperator::Lt | RuleOperator::Lte
        )
    }

    /// Operators that ignore the rule value entirely.
    pub fn is_unary(&self) -> bool {
        matches!(self, RuleOperator::IsTrue | RuleOperator::IsFalse)
    }
}

/// Whether a price adjustment is an absolute amount or a percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "price_adjustment_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentType {
    /// Adds `price_adjustment` cents
    Fixed,
    /// Scales the running price by `price_adjustment` percent
    Percent,
}

/// A quiz question.
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct ScopingFactor {
    pub id: Uuid,
    /// `None` for factors asked for every package
    pub package_id: Option<Uuid>,
    pub key: String,
    pub label: String,
    pub help_text: Option<String>,
    pub input_type: FactorInputType,
    /// Array of `{ "value": ..., "label": ... }` choices
    #[schema(value_type = Object)]
    pub options: serde_json::Value,
    pub is_required: bool,
    pub sort_order: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A conditional price/timeline adjustment.
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct ScopingRule {
    pub id: Uuid,
    pub package_id: Uuid,
    pub factor_key: String,
    pub operator: RuleOperator,
    #[schema(value_type = Object)]
    pub value: serde_json::Value,
    pub price_adjustment_type: AdjustmentType,
    pub price_adjustment: f64,
    pub timeline_adjustment_weeks: i32,
    /// Lower runs first
    pub priority: i32,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
