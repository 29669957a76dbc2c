//! Dual-mode topic listing support.
//!
//! Offset mode (`page_index`/`page_size`) gives random page access with a
//! total count, newest topics first. Cursor mode (`cursor`/`limit`) gives
//! stable forward iteration in ascending id order. A request is in cursor
//! mode exactly when `cursor` is present; zero means "start from the
//! beginning". The cursor is forward-only: there is no previous-page field.

use serde::{Deserialize, Serialize};
use utoipa::IntoParams;

use crate::models::Id;

pub const DEFAULT_PAGE_SIZE: i64 = 20;

#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct ListParams {
    /// Offset mode: zero-based page number.
    pub page_index: Option<i64>,
    /// Offset mode: items per page.
    pub page_size: Option<i64>,
    /// Cursor mode selector: smallest topic id to include (0 = from start).
    pub cursor: Option<Id>,
    /// Cursor mode: items per page.
    pub limit: Option<i64>,
}

impl ListParams {
    pub fn page_index(&self) -> i64 {
        self.page_index.unwrap_or(0).max(0)
    }

    pub fn page_size(&self) -> i64 {
        self.page_size.unwrap_or(DEFAULT_PAGE_SIZE).max(1)
    }

    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).max(1)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OffsetPage<T> {
    pub items: Vec<T>,
    pub total_count: i64,
    pub total_page: i64,
    pub current_page: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CursorPage<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<Id>,
    pub limit: i64,
}

/// `ceil(total_count / page_size)`; `page_size` must be positive.
pub fn total_pages(total_count: i64, page_size: i64) -> i64 {
    (total_count + page_size - 1) / page_size
}

/// Split a `limit + 1` fetch into the page and the next cursor.
///
/// If the store returned more than `limit` rows, the overflow row's id is the
/// next cursor and the page is truncated to `limit`; otherwise the data is
/// exhausted.
pub fn cursor_window<T>(mut rows: Vec<T>, limit: usize, id_of: impl Fn(&T) -> Id) -> (Vec<T>, Option<Id>) {
    if rows.len() > limit {
        let next = id_of(&rows[limit]);
        rows.truncate(limit);
        (rows, Some(next))
    } else {
        (rows, None)
    }
}
