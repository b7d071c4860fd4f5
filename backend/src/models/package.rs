//! Priced package model.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// A fixed-scope offering under a service, with the base price the scoping
/// rules adjust.
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct Package {
    pub id: Uuid,
    pub service_id: Uuid,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub base_price_cents: i64,
    pub base_timeline_weeks: i32,
    pub features: Vec<String>,
    pub is_popular: bool,
    pub is_active: bool,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
