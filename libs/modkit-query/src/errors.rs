//! Errors raised while translating a [`Query`](crate::Query).
//!
//! Every variant describes a caller fault (bad request or bad registry), never
//! a transient condition, so none of them should be retried.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// A filter or sort entry names a field that is not registered.
    #[error("unknown filter field: {0}")]
    UnknownFilterField(String),

    /// Page size was zero or negative.
    #[error("invalid page size: {0} (must be a positive integer)")]
    InvalidPageSize(i64),

    /// The row offset of the requested page does not fit in a signed 64-bit integer.
    #[error("page {page} with page size {page_size} is out of range")]
    PageOutOfRange { page: i64, page_size: i64 },

    /// The value shape does not fit the operator declared for the field.
    #[error("invalid value for field {field}: expected {expected}, got {got}")]
    InvalidFilterValue {
        field: String,
        expected: &'static str,
        got: &'static str,
    },
}

/// Library-local result type.
pub type Result<T> = std::result::Result<T, QueryError>;
