//! Saved quote model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "quote_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum QuoteStatus {
    New,
    Contacted,
    Won,
    Lost,
}

/// A scoping calculation a visitor asked to keep, with their contact details.
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct Quote {
    pub id: Uuid,
    pub package_id: Uuid,
    pub name: String,
    pub email: String,
    pub company: Option<String>,
    pub notes: Option<String>,
    #[schema(value_type = Object)]
    pub inputs: serde_json::Value,
    pub base_price_cents: i64,
    pub total_price_cents: i64,
    pub base_timeline_weeks: i32,
    pub total_timeline_weeks: i32,
    /// Applied adjustments, as returned by the calculator
    #[schema(value_type = Object)]
    pub breakdown: serde_json::Value,
    pub status: QuoteStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
