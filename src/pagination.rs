//! `{ "data": ... }` envelopes and page/per_page handling for list endpoints.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

pub const DEFAULT_PER_PAGE: i64 = 20;
pub const MAX_PER_PAGE: i64 = 100;

/// Raw query values; out-of-range input is clamped, never rejected.
#[derive(Debug, Clone, Copy, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PaginationParams {
    /// 1-based page number.
    #[param(minimum = 1, default = 1)]
    #[serde(default = "first_page")]
    page: i64,
    #[param(minimum = 1, maximum = 100, default = 20)]
    #[serde(default = "default_per_page")]
    per_page: i64,
}

fn first_page() -> i64 {
    1
}

fn default_per_page() -> i64 {
    DEFAULT_PER_PAGE
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self::new(1, DEFAULT_PER_PAGE)
    }
}

impl PaginationParams {
    pub fn new(page: i64, per_page: i64) -> Self {
        Self { page, per_page }
    }

    pub fn page(&self) -> i64 {
        self.page.max(1)
    }

    pub fn per_page(&self) -> i64 {
        self.per_page.clamp(1, MAX_PER_PAGE)
    }

    /// `(LIMIT, OFFSET)` for the clamped page.
    pub fn limit_offset(&self) -> (i64, i64) {
        let per_page = self.per_page();
        (per_page, (self.page() - 1).saturating_mul(per_page))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct PaginationMeta {
    #[schema(example = 1)]
    pub page: i64,
    #[schema(example = 20)]
    pub per_page: i64,
    #[schema(example = 42)]
    pub total_count: i64,
    /// Zero when there are no rows.
    #[schema(example = 3)]
    pub total_pages: i64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl PaginationMeta {
    pub fn for_page(params: &PaginationParams, total_count: i64) -> Self {
        let (page, per_page) = (params.page(), params.per_page());
        let total_pages = (total_count.max(0) + per_page - 1) / per_page;
        Self {
            page,
            per_page,
            total_count,
            total_pages,
            has_next: page < total_pages,
            has_prev: page > 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}

impl<T: Serialize> DataResponse<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PaginatedResponse<T: Serialize> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

impl<T: Serialize> PaginatedResponse<T> {
    pub fn from_params(data: Vec<T>, params: &PaginationParams, total_count: i64) -> Self {
        Self {
            data,
            pagination: PaginationMeta::for_page(params, total_count),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_are_clamped() {
        assert_eq!(PaginationParams::new(-3, 20).page(), 1);
        assert_eq!(PaginationParams::new(1, 0).per_page(), 1);
        assert_eq!(PaginationParams::new(1, 5_000).per_page(), MAX_PER_PAGE);
    }

    #[test]
    fn test_limit_offset() {
        assert_eq!(PaginationParams::default().limit_offset(), (20, 0));
        assert_eq!(PaginationParams::new(3, 10).limit_offset(), (10, 20));
        assert_eq!(PaginationParams::new(0, 10).limit_offset(), (10, 0));
    }

    #[test]
    fn test_meta_page_counts() {
        let meta = PaginationMeta::for_page(&PaginationParams::new(1, 20), 95);
        assert_eq!(meta.total_pages, 5);
        assert!(meta.has_next && !meta.has_prev);

        let last = PaginationMeta::for_page(&PaginationParams::new(5, 20), 100);
        assert!(!last.has_next && last.has_prev);

        let empty = PaginationMeta::for_page(&PaginationParams::default(), 0);
        assert_eq!(empty.total_pages, 0);
        assert!(!empty.has_next);
    }

    #[test]
    fn test_query_defaults_when_absent() {
        let params: PaginationParams = serde_json::from_str("{}").unwrap();
        assert_eq!((params.page(), params.per_page()), (1, DEFAULT_PER_PAGE));
    }

    #[test]
    fn test_envelopes_serialize() {
        let single = serde_json::to_value(DataResponse::new(serde_json::json!({"id": 1}))).unwrap();
        assert_eq!(single["data"]["id"], 1);

        let page = PaginatedResponse::from_params(vec!["a", "b"], &PaginationParams::new(2, 2), 3);
        let body = serde_json::to_value(page).unwrap();
        assert_eq!(body["data"], serde_json::json!(["a", "b"]));
        assert_eq!(body["pagination"]["has_prev"], true);
        assert_eq!(body["pagination"]["total_pages"], 2);
    }
}
