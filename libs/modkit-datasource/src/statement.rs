//! [`Translation`] to `sea_query` statements on a physical table.
//!
//! Column names come from the translation (i.e. from the filter registry);
//! every value is bound, never inlined.

use modkit_query::{CompareOp, LIKE_ESCAPE, Predicate, PredicateKind, Scalar, Translation};
use sea_orm::sea_query::{Alias, Condition, Expr, LikeExpr, Order, Query, SelectStatement, SimpleExpr};

/// Alias of the count column produced by [`count_statement`].
pub const COUNT_ALIAS: &str = "num_items";

const COUNT_EXPR: &str = "COUNT(*) AS num_items";

/// Bindable value of a filter scalar.
#[must_use]
pub fn scalar_value(s: &Scalar) -> sea_orm::Value {
    match s {
        Scalar::Bool(b) => sea_orm::Value::Bool(Some(*b)),
        Scalar::Int(i) => sea_orm::Value::BigInt(Some(*i)),
        Scalar::Float(f) => sea_orm::Value::Double(Some(*f)),
        Scalar::Text(t) => sea_orm::Value::String(Some(Box::new(t.clone()))),
    }
}

/// One predicate as a SQL expression.
#[must_use]
pub fn predicate_expr(p: &Predicate) -> SimpleExpr {
    let col = || Expr::col(Alias::new(p.column.as_str()));
    match &p.kind {
        PredicateKind::Compare { op, value } => {
            let v = scalar_value(value);
            match op {
                CompareOp::Eq => col().eq(v),
                CompareOp::Ne => col().ne(v),
                CompareOp::Gt => col().gt(v),
                CompareOp::Ge => col().gte(v),
                CompareOp::Lt => col().lt(v),
                CompareOp::Le => col().lte(v),
            }
        }
        PredicateKind::Like(pattern) => {
            col().like(LikeExpr::new(pattern.as_str()).escape(LIKE_ESCAPE))
        }
        PredicateKind::In(values) => col().is_in(values.iter().map(scalar_value)),
        // empty IN matches nothing
        PredicateKind::Never => Expr::cust("1=0"),
    }
}

/// AND of all predicates; `None` when there are none.
#[must_use]
pub fn where_condition(t: &Translation) -> Option<Condition> {
    if t.predicates.is_empty() {
        return None;
    }
    Some(
        t.predicates
            .iter()
            .fold(Condition::all(), |cond, p| cond.add(predicate_expr(p))),
    )
}

/// `SELECT <columns> FROM <table> WHERE .. ORDER BY .. LIMIT .. OFFSET ..`
#[must_use]
pub fn select_statement(table: &str, columns: &[&str], t: &Translation) -> SelectStatement {
    let mut stmt = Query::select();
    stmt.columns(columns.iter().map(|c| Alias::new(*c)))
        .from(Alias::new(table));
    if let Some(cond) = where_condition(t) {
        stmt.cond_where(cond);
    }
    for key in &t.order {
        let order = if key.desc { Order::Desc } else { Order::Asc };
        stmt.order_by(Alias::new(key.column.as_str()), order);
    }
    stmt.limit(t.limit).offset(t.offset);
    stmt
}

/// `SELECT COUNT(*) AS num_items FROM <table> WHERE ..` for the same predicates.
#[must_use]
pub fn count_statement(table: &str, t: &Translation) -> SelectStatement {
    let mut stmt = Query::select();
    stmt.expr(Expr::cust(COUNT_EXPR))
        .from(Alias::new(table));
    if let Some(cond) = where_condition(t) {
        stmt.cond_where(cond);
    }
    stmt
}

#[cfg(test)]
mod tests {
    use super::*;
    use modkit_query::{FilterRegistry, Operator, Query as ListQuery};
    use sea_orm::sea_query::{QueryStatementWriter, SqliteQueryBuilder};

    fn registry() -> FilterRegistry {
        FilterRegistry::new()
            .with("email", Operator::Like)
            .with("id", Operator::In)
            .with_column("createdBy", "create_by", Operator::Eq)
    }

    #[test]
    fn select_binds_values_in_order() {
        let q = ListQuery::new(2, 10)
            .filter("email", "a_b")
            .filter("id", vec![Scalar::Int(1), Scalar::Int(2)])
            .sort("email", true);
        let t = registry().translate(&q).unwrap();

        let (sql, values) =
            select_statement("os_1000_test", &["id", "email"], &t).build(SqliteQueryBuilder);
        assert!(
            sql.starts_with(r#"SELECT "id", "email" FROM "os_1000_test" WHERE "email" LIKE ?"#),
            "{sql}"
        );
        assert!(sql.contains("ESCAPE '!'"), "{sql}");
        assert!(
            sql.ends_with(r#"AND "id" IN (?, ?) ORDER BY "email" DESC LIMIT ? OFFSET ?"#),
            "{sql}"
        );
        assert_eq!(
            values.0[0],
            sea_orm::Value::String(Some(Box::new("%a!_b%".to_owned())))
        );
        assert_eq!(values.0[1], sea_orm::Value::BigInt(Some(1)));
    }

    #[test]
    fn empty_in_renders_false_condition() {
        let t = registry()
            .translate(&ListQuery::new(1, 10).filter("id", Vec::<Scalar>::new()))
            .unwrap();
        let (sql, _) = count_statement("t", &t).build(SqliteQueryBuilder);
        assert_eq!(sql, r#"SELECT COUNT(*) AS num_items FROM "t" WHERE 1=0"#);
    }

    #[test]
    fn no_predicates_no_where() {
        let t = registry().translate(&ListQuery::new(1, 10)).unwrap();
        let (sql, _) = count_statement("t", &t).build(SqliteQueryBuilder);
        assert_eq!(sql, r#"SELECT COUNT(*) AS num_items FROM "t""#);
    }
}
