//! Service layer
//!
//! Contains business logic separated from HTTP handlers.
//! Services orchestrate database, rendering, token and mail operations.

mod account;
mod post;
mod social;

pub use account::AccountService;
pub use post::PostService;
pub use social::SocialService;

/// One page of a listing
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// 1-based page number actually served
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> i64 {
        if self.total == 0 {
            0
        } else {
            (self.total + self.per_page - 1) / self.per_page
        }
    }
}

/// Clamp a requested page to 1-based and derive the row offset
///
/// The page number comes straight from the query string, so the
/// offset math saturates instead of overflowing on absurd values.
pub(crate) fn page_offset(page: i64, per_page: i64) -> (i64, i64) {
    let page = page.max(1);
    (page, page.saturating_sub(1).saturating_mul(per_page))
}
