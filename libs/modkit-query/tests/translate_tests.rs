#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Translation behaviour over the public API.

use modkit_query::{FilterRegistry, Operator, PredicateKind, Query, QueryError, Scalar, translate};

fn user_registry() -> FilterRegistry {
    FilterRegistry::new()
        .with("email", Operator::Like)
        .with("id", Operator::In)
        .with_column("createdBy", "create_by", Operator::Eq)
        .with("score", Operator::Ge)
}

#[test]
fn unknown_filter_field_is_rejected_not_dropped() {
    let registry = user_registry();
    for unknown in ["password", "e-mail", ""] {
        let q = Query::new(1, 10)
            .filter("email", "a")
            .filter(unknown, "x");
        assert_eq!(
            translate(&q, &registry).unwrap_err(),
            QueryError::UnknownFilterField(unknown.to_owned())
        );
    }
}

#[test]
fn unknown_sort_field_fails_like_unknown_filter() {
    let q = Query::new(1, 10).sort("email", false).sort("password", true);
    assert_eq!(
        translate(&q, &user_registry()).unwrap_err(),
        QueryError::UnknownFilterField("password".to_owned())
    );
}

#[test]
fn empty_registry_rejects_any_filter() {
    let q = Query::new(1, 10).filter("id", vec![Scalar::Int(1)]);
    assert!(matches!(
        translate(&q, &FilterRegistry::new()),
        Err(QueryError::UnknownFilterField(_))
    ));
}

#[test]
fn operator_comes_from_registry() {
    // The same value shape is treated differently per registered operator.
    let q = Query::new(1, 10)
        .filter("email", "bob")
        .filter("createdBy", 7_i64)
        .filter("score", 10_i64);
    let t = translate(&q, &user_registry()).unwrap();

    assert_eq!(t.predicates[0].column, "email");
    assert_eq!(t.predicates[0].kind, PredicateKind::Like("%bob%".to_owned()));
    assert_eq!(t.predicates[1].column, "create_by");
    assert_eq!(
        t.to_string(),
        "WHERE email LIKE ? AND create_by = ? AND score >= ? LIMIT 10 OFFSET 0"
    );
}

#[test]
fn empty_in_matches_nothing() {
    let q = Query::new(1, 10).filter("id", Vec::<Scalar>::new());
    let t = translate(&q, &user_registry()).unwrap();
    assert_eq!(t.predicates.len(), 1);
    assert_eq!(t.predicates[0].kind, PredicateKind::Never);
    assert_eq!(t.to_string(), "WHERE 1 = 0 LIMIT 10 OFFSET 0");
}

#[test]
fn sort_keys_keep_request_order() {
    let q = Query::new(3, 25)
        .sort("score", true)
        .sort("email", false)
        .sort("id", true);
    let t = translate(&q, &user_registry()).unwrap();
    let cols: Vec<_> = t.order.iter().map(|o| (o.column.as_str(), o.desc)).collect();
    assert_eq!(cols, vec![("score", true), ("email", false), ("id", true)]);
    assert_eq!(t.limit, 25);
    assert_eq!(t.offset, 50);
    assert_eq!(
        t.to_string(),
        "ORDER BY score DESC, email ASC, id DESC LIMIT 25 OFFSET 50"
    );
}

#[test]
fn same_request_renders_same_text() {
    let q = Query::new(1, 10)
        .filter("email", "test@x.cn")
        .filter("id", vec![Scalar::Int(1), Scalar::Int(2), Scalar::Int(3)])
        .sort("email", true);
    let a = translate(&q, &user_registry()).unwrap();
    let b = translate(&q.clone(), &user_registry()).unwrap();
    assert_eq!(a.to_string(), b.to_string());
    assert_eq!(a, b);
}

#[test]
fn invalid_page_size_surfaces_from_translation() {
    let q = Query::new(1, 0).filter("email", "x");
    assert_eq!(
        translate(&q, &user_registry()).unwrap_err(),
        QueryError::InvalidPageSize(0)
    );
}

#[test]
fn far_page_is_rejected_before_any_statement() {
    let page = 1_i64 << 61;
    let q = Query::new(page, 10).filter("email", "x");
    assert_eq!(
        translate(&q, &user_registry()).unwrap_err(),
        QueryError::PageOutOfRange { page, page_size: 10 }
    );
}

#[test]
fn non_positive_page_normalizes_to_first() {
    for page in [-1_i64, 0, 1] {
        let t = translate(&Query::new(page, 10), &user_registry()).unwrap();
        assert_eq!(t.offset, 0);
    }
}

#[test]
fn translates_wire_request() {
    let q: Query = serde_json::from_str(
        r#"{"pageSize":10,"page":1,"sorted":[{"id":"email","desc":true}],
            "filtered":[{"id":"email","value":"test@x.cn"},{"id":"id","value":[1,2,3]}]}"#,
    )
    .unwrap();
    let t = translate(&q, &user_registry()).unwrap();
    assert_eq!(
        t.to_string(),
        "WHERE email LIKE ? AND id IN (?, ?, ?) ORDER BY email DESC LIMIT 10 OFFSET 0"
    );
}
