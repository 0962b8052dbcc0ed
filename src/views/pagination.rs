//! Page-number pagination with a caller-controlled page size.

use serde::Serialize;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Normalized `page` / `page_size` query parameters.
#[derive(Clone, Copy, Debug)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
}

impl Pagination {
    /// Page numbers start at 1; `page_size` is clamped to [1, 100].
    pub fn from_params(page: Option<u32>, page_size: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            page_size: page_size
                .unwrap_or(DEFAULT_PAGE_SIZE)
                .clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.page_size)
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.page_size)
    }

    /// In-memory page slice, for lists filtered after the query.
    pub fn slice<T>(&self, items: Vec<T>) -> Vec<T> {
        items
            .into_iter()
            .skip(self.offset() as usize)
            .take(self.page_size as usize)
            .collect()
    }
}

/// Standard list envelope.
#[derive(Serialize, Debug)]
pub struct Page<T> {
    pub count: i64,
    pub page: u32,
    pub page_size: u32,
    pub results: Vec<T>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_is_capped_at_100() {
        let p = Pagination::from_params(None, Some(5000));
        assert_eq!(p.page_size, MAX_PAGE_SIZE);
    }

    #[test]
    fn defaults_apply_when_params_missing() {
        let p = Pagination::from_params(None, None);
        assert_eq!(p.page, 1);
        assert_eq!(p.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(p.offset(), 0);
    }

    #[test]
    fn offset_advances_with_page() {
        let p = Pagination::from_params(Some(3), Some(10));
        assert_eq!(p.offset(), 20);
        assert_eq!(p.limit(), 10);
    }

    #[test]
    fn zero_values_are_normalized() {
        let p = Pagination::from_params(Some(0), Some(0));
        assert_eq!(p.page, 1);
        assert_eq!(p.page_size, 1);
    }

    #[test]
    fn slice_returns_the_requested_window() {
        let p = Pagination::from_params(Some(2), Some(2));
        assert_eq!(p.slice(vec![1, 2, 3, 4, 5]), vec![3, 4]);
    }
}
