pub mod alerts;
pub mod inventory;
pub mod ledger;
pub mod reports;

use serde::Serialize;

/// Bounds applied to client supplied pagination parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub default_page_size: u64,
    pub max_page_size: u64,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default_page_size: 10,
            max_page_size: 100,
        }
    }
}

impl From<&crate::config::AppConfig> for PageLimits {
    fn from(cfg: &crate::config::AppConfig) -> Self {
        Self {
            default_page_size: cfg.default_page_size,
            max_page_size: cfg.max_page_size,
        }
    }
}

/// 1-based page number and a page size within [`PageLimits`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u64,
    pub page_size: u64,
}

impl PageRequest {
    /// Pages past the last representable offset (`page * page_size` must
    /// fit the `i64` the databases bind OFFSET as) collapse onto that offset
    /// and come back empty.
    pub fn resolve(page: Option<u64>, page_size: Option<u64>, limits: PageLimits) -> Self {
        let page_size = page_size
            .unwrap_or(limits.default_page_size)
            .clamp(1, limits.max_page_size.max(1));
        let last_page = (i64::MAX as u64 / page_size).max(1);
        Self {
            page: page.unwrap_or(1).clamp(1, last_page),
            page_size,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: u64, request: PageRequest) -> Self {
        Self {
            items,
            total,
            page: request.page,
            page_size: request.page_size,
        }
    }
}
