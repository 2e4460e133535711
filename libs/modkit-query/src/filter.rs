//! Declared query surface of a repository.
//!
//! A [`FilterRegistry`] maps API-visible field names to a [`Filter`]: the
//! storage column the field addresses and the single operator it accepts.
//! Requests can only name fields present here; the operator is fixed at
//! registration and never taken from the request.

use std::collections::HashMap;
use std::fmt;

/// Operator a registered field is matched with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// Exact match: `col = v`
    Eq,
    /// `col <> v`
    Ne,
    /// `col > v`
    Gt,
    /// `col >= v`
    Ge,
    /// `col < v`
    Lt,
    /// `col <= v`
    Le,
    /// Substring match: `col LIKE '%v%'`
    Like,
    /// Prefix match: `col LIKE 'v%'`
    StartsWith,
    /// Suffix match: `col LIKE '%v'`
    EndsWith,
    /// Membership: `col IN (v1, v2, ...)`
    In,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::Eq => write!(f, "eq"),
            Operator::Ne => write!(f, "ne"),
            Operator::Gt => write!(f, "gt"),
            Operator::Ge => write!(f, "ge"),
            Operator::Lt => write!(f, "lt"),
            Operator::Le => write!(f, "le"),
            Operator::Like => write!(f, "like"),
            Operator::StartsWith => write!(f, "startswith"),
            Operator::EndsWith => write!(f, "endswith"),
            Operator::In => write!(f, "in"),
        }
    }
}

/// One registered field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    /// Storage column the field maps to.
    pub field_name: String,
    pub operator: Operator,
}

impl Filter {
    pub fn new(field_name: impl Into<String>, operator: Operator) -> Self {
        Self {
            field_name: field_name.into(),
            operator,
        }
    }
}

/// Immutable mapping from API field name to [`Filter`].
///
/// Lookups are ASCII case-insensitive on the API name.
///
/// ```
/// use modkit_query::{FilterRegistry, Operator};
///
/// let registry = FilterRegistry::new()
///     .with("email", Operator::Like)
///     .with_column("id", "user_id", Operator::In);
///
/// assert_eq!(registry.get("EMAIL").map(|f| f.operator), Some(Operator::Like));
/// assert_eq!(registry.get("id").map(|f| f.field_name.as_str()), Some("user_id"));
/// assert!(registry.get("password").is_none());
/// ```
#[derive(Debug, Clone, Default)]
#[must_use]
pub struct FilterRegistry {
    map: HashMap<String, Filter>,
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a field whose column has the same name as the API field.
    pub fn with(self, name: &str, operator: Operator) -> Self {
        self.with_column(name, name, operator)
    }

    /// Register a field that addresses a differently named column.
    pub fn with_column(mut self, name: &str, column: &str, operator: Operator) -> Self {
        self.map
            .insert(name.to_ascii_lowercase(), Filter::new(column, operator));
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Filter> {
        self.map.get(&name.to_ascii_lowercase())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl<'a> FromIterator<(&'a str, Operator)> for FilterRegistry {
    fn from_iter<I: IntoIterator<Item = (&'a str, Operator)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::new(), |reg, (name, op)| reg.with(name, op))
    }
}
