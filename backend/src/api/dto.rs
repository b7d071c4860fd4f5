//! Shared Data Transfer Objects (DTOs) for API handlers.
//!
//! List handlers take `Query<PaginationQuery>` next to their own filter query
//! and answer with `{ items, pagination }`.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

const DEFAULT_PER_PAGE: u32 = 20;
const MAX_PER_PAGE: u32 = 100;

/// Pagination metadata for list responses.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Pagination {
    /// Current page number (1-indexed)
    pub page: u32,
    /// Number of items per page
    pub per_page: u32,
    /// Total number of items across all pages
    pub total: i64,
    /// Total number of pages
    pub total_pages: u32,
}

impl Pagination {
    /// Create pagination from query parameters and total count.
    pub fn from_query_and_total(query: &PaginationQuery, total: i64) -> Self {
        let page = query.page();
        let per_page = query.per_page();
        let total_pages = if total <= 0 {
            0
        } else {
            ((total as f64) / (per_page as f64)).ceil() as u32
        };

        Self {
            page,
            per_page,
            total,
            total_pages,
        }
    }
}

/// Query parameters for paginated list requests.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct PaginationQuery {
    /// Requested page number (default: 1)
    pub page: Option<u32>,
    /// Requested items per page (default: 20, max: 100)
    pub per_page: Option<u32>,
}

impl PaginationQuery {
    /// Page number, at least 1.
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    /// Page size, clamped to 1..=100.
    pub fn per_page(&self) -> u32 {
        self.per_page
            .unwrap_or(DEFAULT_PER_PAGE)
            .clamp(1, MAX_PER_PAGE)
    }

    /// SQL `OFFSET`
    pub fn offset(&self) -> i64 {
        (self.page() as i64 - 1) * self.per_page() as i64
    }

    /// SQL `LIMIT`
    pub fn limit(&self) -> i64 {
        self.per_page() as i64
    }
}

/// Body returned by delete endpoints.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DeletedResponse {
    pub deleted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_query_defaults() {
        let query = PaginationQuery::default();
        assert_eq!(query.page(), 1);
        assert_eq!(query.per_page(), 20);
        assert_eq!(query.offset(), 0);
        assert_eq!(query.limit(), 20);
    }

    #[test]
    fn test_pagination_query_clamps() {
        let query = PaginationQuery {
            page: Some(0),
            per_page: Some(10_000),
        };
        assert_eq!(query.page(), 1);
        assert_eq!(query.per_page(), 100);

        let query = PaginationQuery {
            page: Some(2),
            per_page: Some(0),
        };
        assert_eq!(query.per_page(), 1);
    }

    #[test]
    fn test_pagination_query_offset() {
        let query = PaginationQuery {
            page: Some(3),
            per_page: Some(15),
        };
        assert_eq!(query.offset(), 30);
        assert_eq!(query.limit(), 15);
    }

    #[test]
    fn test_pagination_from_query_basic() {
        let query = PaginationQuery {
            page: Some(1),
            per_page: Some(10),
        };
        let p = Pagination::from_query_and_total(&query, 25);
        assert_eq!(p.page, 1);
        assert_eq!(p.per_page, 10);
        assert_eq!(p.total, 25);
        assert_eq!(p.total_pages, 3);
    }

    #[test]
    fn test_pagination_from_query_zero_total() {
        let p = Pagination::from_query_and_total(&PaginationQuery::default(), 0);
        assert_eq!(p.total, 0);
        assert_eq!(p.total_pages, 0);
    }

    #[test]
    fn test_pagination_from_query_exact_division() {
        let p = Pagination::from_query_and_total(&PaginationQuery::default(), 100);
        assert_eq!(p.total_pages, 5);
    }

    #[test]
    fn test_pagination_query_deserialize_partial() {
        let query: PaginationQuery = serde_json::from_str(r#"{"page": 2}"#).unwrap();
        assert_eq!(query.page(), 2);
        assert_eq!(query.per_page(), 20);
    }

    #[test]
    fn test_pagination_serialize() {
        let p = Pagination {
            page: 2,
            per_page: 10,
            total: 45,
            total_pages: 5,
        };
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["page"], 2);
        assert_eq!(json["total_pages"], 5);
    }
}
