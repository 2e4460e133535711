//! `Query` + `FilterRegistry` to predicates, ordering and limit/offset.
//!
//! The translation is pure: it validates the request against the registry and
//! returns a [`Translation`] that a storage layer applies to a live session.
//! Column names in the output always come from the registry, never from the
//! request.

use std::fmt;

use crate::errors::{QueryError, Result};
use crate::filter::{FilterRegistry, Operator};
use crate::pagination::paginate;
use crate::query::Query;
use crate::value::{FilterValue, Scalar};

/// Scalar comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
        }
    }
}

/// Shape of one predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum PredicateKind {
    Compare { op: CompareOp, value: Scalar },
    /// `LIKE` with an already escaped pattern; [`LIKE_ESCAPE`] is the escape character.
    Like(String),
    /// Non-empty membership list.
    In(Vec<Scalar>),
    /// Matches no row (`IN` over an empty sequence).
    Never,
}

/// A single clause bound to a registered column.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub column: String,
    pub kind: PredicateKind,
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            PredicateKind::Compare { op, .. } => write!(f, "{} {} ?", self.column, op.as_sql()),
            PredicateKind::Like(_) => write!(f, "{} LIKE ?", self.column),
            PredicateKind::In(values) => {
                write!(f, "{} IN (", self.column)?;
                for i in 0..values.len() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    f.write_str("?")?;
                }
                f.write_str(")")
            }
            PredicateKind::Never => f.write_str("1 = 0"),
        }
    }
}

/// One `ORDER BY` key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderKey {
    pub column: String,
    pub desc: bool,
}

impl fmt::Display for OrderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.desc {
            write!(f, "{} DESC", self.column)
        } else {
            write!(f, "{} ASC", self.column)
        }
    }
}

/// Result of [`translate`].
///
/// Predicates are AND-ed; they keep request order so the rendered SQL text is
/// stable for the same request. `Display` renders the statement tail with `?`
/// placeholders, e.g. `WHERE email LIKE ? AND id IN (?, ?) ORDER BY email DESC LIMIT 10 OFFSET 0`.
#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
    pub predicates: Vec<Predicate>,
    pub order: Vec<OrderKey>,
    pub limit: u64,
    pub offset: u64,
}

impl Translation {
    /// Values bound to the placeholders, in rendering order.
    #[must_use]
    pub fn bind_values(&self) -> Vec<Scalar> {
        let mut out = Vec::new();
        for p in &self.predicates {
            match &p.kind {
                PredicateKind::Compare { value, .. } => out.push(value.clone()),
                PredicateKind::Like(pattern) => out.push(Scalar::Text(pattern.clone())),
                PredicateKind::In(values) => out.extend(values.iter().cloned()),
                PredicateKind::Never => {}
            }
        }
        out
    }
}

impl fmt::Display for Translation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, p) in self.predicates.iter().enumerate() {
            f.write_str(if i == 0 { "WHERE " } else { " AND " })?;
            write!(f, "{p}")?;
        }
        for (i, o) in self.order.iter().enumerate() {
            let sep = match (i, self.predicates.is_empty()) {
                (0, true) => "ORDER BY ",
                (0, false) => " ORDER BY ",
                _ => ", ",
            };
            write!(f, "{sep}{o}")?;
        }
        if !self.predicates.is_empty() || !self.order.is_empty() {
            f.write_str(" ")?;
        }
        write!(f, "LIMIT {} OFFSET {}", self.limit, self.offset)
    }
}

/* ---------- LIKE helpers ---------- */

/// Escape character of generated `LIKE` patterns. Statements must carry it in an
/// explicit `ESCAPE` clause; `SQLite` has no default.
pub const LIKE_ESCAPE: char = '!';

fn like_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '%' | '_' | LIKE_ESCAPE => {
                out.push(LIKE_ESCAPE);
                out.push(ch);
            }
            c => out.push(c),
        }
    }
    out
}

/* ---------- value guards ---------- */

fn expect_scalar<'a>(field: &str, value: &'a FilterValue) -> Result<&'a Scalar> {
    match value {
        FilterValue::Scalar(s) => Ok(s),
        FilterValue::List(_) => Err(QueryError::InvalidFilterValue {
            field: field.to_owned(),
            expected: "scalar",
            got: "sequence",
        }),
    }
}

fn like_text(field: &str, value: &FilterValue) -> Result<String> {
    match expect_scalar(field, value)? {
        Scalar::Bool(_) => Err(QueryError::InvalidFilterValue {
            field: field.to_owned(),
            expected: "string or number",
            got: "bool",
        }),
        s => Ok(like_escape(&s.to_string())),
    }
}

fn membership(field: &str, value: &FilterValue) -> Result<Vec<Scalar>> {
    match value {
        FilterValue::List(items) => Ok(items.clone()),
        // "1,2,3" is accepted as a comma-separated sequence.
        FilterValue::Scalar(Scalar::Text(s)) => Ok(s
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(|item| Scalar::Text(item.to_owned()))
            .collect()),
        FilterValue::Scalar(other) => Err(QueryError::InvalidFilterValue {
            field: field.to_owned(),
            expected: "sequence",
            got: other.kind_name(),
        }),
    }
}

fn build_predicate(
    field: &str,
    column: &str,
    op: Operator,
    value: &FilterValue,
) -> Result<Predicate> {
    let compare = |op: CompareOp| -> Result<PredicateKind> {
        Ok(PredicateKind::Compare {
            op,
            value: expect_scalar(field, value)?.clone(),
        })
    };

    let kind = match op {
        Operator::Eq => compare(CompareOp::Eq)?,
        Operator::Ne => compare(CompareOp::Ne)?,
        Operator::Gt => compare(CompareOp::Gt)?,
        Operator::Ge => compare(CompareOp::Ge)?,
        Operator::Lt => compare(CompareOp::Lt)?,
        Operator::Le => compare(CompareOp::Le)?,
        Operator::Like => PredicateKind::Like(format!("%{}%", like_text(field, value)?)),
        Operator::StartsWith => PredicateKind::Like(format!("{}%", like_text(field, value)?)),
        Operator::EndsWith => PredicateKind::Like(format!("%{}", like_text(field, value)?)),
        Operator::In => {
            let items = membership(field, value)?;
            if items.is_empty() {
                PredicateKind::Never
            } else {
                PredicateKind::In(items)
            }
        }
    };

    Ok(Predicate {
        column: column.to_owned(),
        kind,
    })
}

/// Translate a request against the registry of the target repository.
///
/// # Errors
/// - [`QueryError::UnknownFilterField`] if a `filtered` or `sorted` entry names an
///   unregistered field
/// - [`QueryError::InvalidFilterValue`] if a value does not fit the field's operator
/// - [`QueryError::InvalidPageSize`] if `page_size <= 0`
/// - [`QueryError::PageOutOfRange`] if the page offset does not fit in `i64`
pub fn translate(query: &Query, registry: &FilterRegistry) -> Result<Translation> {
    let predicates = query
        .filtered
        .iter()
        .map(|entry| {
            let filter = registry
                .get(&entry.id)
                .ok_or_else(|| QueryError::UnknownFilterField(entry.id.clone()))?;
            build_predicate(&entry.id, &filter.field_name, filter.operator, &entry.value)
        })
        .collect::<Result<Vec<_>>>()?;

    let order = query
        .sorted
        .iter()
        .map(|entry| {
            registry
                .get(&entry.id)
                .map(|filter| OrderKey {
                    column: filter.field_name.clone(),
                    desc: entry.desc,
                })
                .ok_or_else(|| QueryError::UnknownFilterField(entry.id.clone()))
        })
        .collect::<Result<Vec<_>>>()?;

    let (limit, offset) = paginate(query.page, query.page_size)?;

    Ok(Translation {
        predicates,
        order,
        limit,
        offset,
    })
}

impl FilterRegistry {
    /// Shorthand for [`translate`] with this registry.
    ///
    /// # Errors
    /// See [`translate`].
    pub fn translate(&self, query: &Query) -> Result<Translation> {
        translate(query, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> FilterRegistry {
        FilterRegistry::new()
            .with("email", Operator::Like)
            .with("id", Operator::In)
            .with("name", Operator::Eq)
    }

    #[test]
    fn like_escapes_wildcards() {
        assert_eq!(like_escape("50%_off!"), "50!%!_off!!");
        assert_eq!(like_escape("a\\b"), "a\\b");
    }

    #[test]
    fn starts_and_ends_with_anchor_patterns() {
        let reg = FilterRegistry::new()
            .with("a", Operator::StartsWith)
            .with("b", Operator::EndsWith);
        let t = translate(&Query::new(1, 5).filter("a", "x").filter("b", "y"), &reg).unwrap();
        assert_eq!(t.predicates[0].kind, PredicateKind::Like("x%".to_owned()));
        assert_eq!(t.predicates[1].kind, PredicateKind::Like("%y".to_owned()));
    }

    #[test]
    fn comma_separated_text_is_a_sequence() {
        let t = translate(&Query::new(1, 5).filter("id", "1, 2,,3"), &registry()).unwrap();
        assert_eq!(
            t.predicates[0].kind,
            PredicateKind::In(vec!["1".into(), "2".into(), "3".into()])
        );
    }

    #[test]
    fn eq_rejects_sequence() {
        let q = Query::new(1, 5).filter("name", vec![Scalar::Int(1)]);
        assert_eq!(
            translate(&q, &registry()).unwrap_err(),
            QueryError::InvalidFilterValue {
                field: "name".to_owned(),
                expected: "scalar",
                got: "sequence",
            }
        );
    }

    #[test]
    fn in_rejects_non_text_scalar() {
        let q = Query::new(1, 5).filter("id", 7_i64);
        assert!(matches!(
            translate(&q, &registry()),
            Err(QueryError::InvalidFilterValue { .. })
        ));
    }

    #[test]
    fn bind_values_follow_placeholders() {
        let q = Query::new(1, 5)
            .filter("email", "a")
            .filter("id", vec![Scalar::Int(1), Scalar::Int(2)]);
        let t = translate(&q, &registry()).unwrap();
        assert_eq!(
            t.bind_values(),
            vec![Scalar::Text("%a%".to_owned()), Scalar::Int(1), Scalar::Int(2)]
        );
    }

    #[test]
    fn renders_without_clauses() {
        let t = translate(&Query::new(2, 10), &registry()).unwrap();
        assert_eq!(t.to_string(), "LIMIT 10 OFFSET 10");
    }
}
