//! Offset pagination: page/page-size normalization and page descriptors.

use serde::{Deserialize, Serialize};

use crate::errors::{QueryError, Result};

/// Normalize a 1-based page number; anything `<= 0` becomes page 1.
#[must_use]
pub fn normalize_page(page: i64) -> u64 {
    u64::try_from(page).unwrap_or(0).max(1)
}

/// Validate a requested page size.
///
/// # Errors
/// Returns [`QueryError::InvalidPageSize`] when `page_size <= 0`.
pub fn normalize_page_size(page_size: i64) -> Result<u64> {
    u64::try_from(page_size)
        .ok()
        .filter(|n| *n > 0)
        .ok_or(QueryError::InvalidPageSize(page_size))
}

/// Compute `(limit, offset)` for a page request.
///
/// Both values fit in `i64`, the widest type SQL drivers bind.
///
/// # Errors
/// - [`QueryError::InvalidPageSize`] when `page_size <= 0`
/// - [`QueryError::PageOutOfRange`] when the offset of `page` does not fit in `i64`
pub fn paginate(page: i64, page_size: i64) -> Result<(u64, u64)> {
    let size = normalize_page_size(page_size)?;
    let offset = (page.max(1) - 1)
        .checked_mul(page_size)
        .and_then(|o| u64::try_from(o).ok())
        .ok_or(QueryError::PageOutOfRange { page, page_size })?;
    Ok((size, offset))
}

/// Build the page descriptor for a query that matched `total_records` rows.
///
/// # Errors
/// Returns [`QueryError::InvalidPageSize`] when `page_size <= 0`.
pub fn describe(page: i64, page_size: i64, total_records: u64) -> Result<Pagination> {
    let size = normalize_page_size(page_size)?;
    Ok(Pagination {
        page: normalize_page(page),
        page_size: size,
        total_records,
        total_pages: total_records.div_ceil(size).max(1),
    })
}

/// Page descriptor returned alongside a result list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u64,
    pub page_size: u64,
    pub total_records: u64,
    pub total_pages: u64,
}

impl Pagination {
    /// `(limit, offset)` of the page this descriptor points at.
    #[must_use]
    pub const fn limit(&self) -> (u64, u64) {
        (
            self.page_size,
            self.page.saturating_sub(1).saturating_mul(self.page_size),
        )
    }
}

/// Result list plus its page descriptor.
///
/// Serializes flat: `{"page":1,"pageSize":10,"totalRecords":1,"totalPages":1,"list":[...]}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    #[serde(flatten)]
    pub pagination: Pagination,
    pub list: Vec<T>,
}

impl<T> Page<T> {
    #[must_use]
    pub fn new(pagination: Pagination, list: Vec<T>) -> Self {
        Self { pagination, list }
    }

    /// Map items, keeping the page descriptor.
    #[must_use]
    pub fn map_items<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            pagination: self.pagination,
            list: self.list.into_iter().map(f).collect(),
        }
    }
}
