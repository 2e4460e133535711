#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Generic filter / sort / pagination translation.
//!
//! A repository declares its query surface once as a [`FilterRegistry`]
//! (API field name to column + operator). Incoming [`Query`] DTOs are checked
//! against it and turned into a storage-agnostic [`Translation`]; storage
//! crates apply the translation to their own statement builders.
//!
//! ```
//! use modkit_query::{FilterRegistry, Operator, Query, Scalar};
//!
//! let registry = FilterRegistry::new()
//!     .with("email", Operator::Like)
//!     .with("id", Operator::In);
//!
//! let query = Query::new(1, 10)
//!     .filter("email", "test@x.cn")
//!     .filter("id", vec![Scalar::Int(1), Scalar::Int(2), Scalar::Int(3)])
//!     .sort("email", true);
//!
//! let t = registry.translate(&query).unwrap();
//! assert_eq!(
//!     t.to_string(),
//!     "WHERE email LIKE ? AND id IN (?, ?, ?) ORDER BY email DESC LIMIT 10 OFFSET 0"
//! );
//! ```

pub mod errors;
pub mod filter;
pub mod pagination;
pub mod query;
pub mod translate;
pub mod value;

pub use errors::{QueryError, Result};
pub use filter::{Filter, FilterRegistry, Operator};
pub use pagination::{Page, Pagination, describe, normalize_page, normalize_page_size, paginate};
pub use query::{FilterEntry, Query, SortEntry};
pub use translate::{
    CompareOp, LIKE_ESCAPE, OrderKey, Predicate, PredicateKind, Translation, translate,
};
pub use value::{FilterValue, Scalar};
