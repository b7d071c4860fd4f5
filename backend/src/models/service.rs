//! Consulting service model.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// A service line offered on the marketing site (e.g. "CRM Implementation").
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct Service {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub tagline: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub icon: Option<String>,
    pub features: Vec<String>,
    pub is_active: bool,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
