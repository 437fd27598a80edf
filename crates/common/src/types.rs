//! Small shared value types used across repositories and services.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Creation/update bookkeeping carried by every aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditInfo {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AuditInfo {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl Default for AuditInfo {
    fn default() -> Self {
        Self::new()
    }
}

/// Offset/limit pagination request, clamped to a sane maximum page size.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Pagination {
    pub offset: u64,
    pub limit: u64,
}

impl Pagination {
    const MAX_LIMIT: u64 = 200;

    pub fn new(offset: u64, limit: u64) -> Self {
        Self {
            offset,
            limit: limit.clamp(1, Self::MAX_LIMIT),
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(0, 50)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagedResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

impl<T> PagedResult<T> {
    pub fn new(items: Vec<T>, total: u64, pagination: Pagination) -> Self {
        Self {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        }
    }

    pub fn has_more(&self) -> bool {
        self.offset + (self.items.len() as u64) < self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_clamps_limit_to_max() {
        let p = Pagination::new(0, 10_000);
        assert_eq!(p.limit, Pagination::MAX_LIMIT);
    }

    #[test]
    fn pagination_rejects_zero_limit() {
        let p = Pagination::new(0, 0);
        assert_eq!(p.limit, 1);
    }

    #[test]
    fn paged_result_reports_has_more() {
        let page = PagedResult::new(vec![1, 2], 5, Pagination::new(0, 2));
        assert!(page.has_more());
        let page = PagedResult::new(vec![1, 2, 3], 3, Pagination::new(0, 3));
        assert!(!page.has_more());
    }
}
