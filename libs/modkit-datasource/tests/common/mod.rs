#![allow(clippy::unwrap_used, clippy::expect_used)]
#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use modkit_datasource::{DbConnTrait, DbHandle, EntitySchema, MemoryConfigStore};
use modkit_query::{FilterRegistry, Operator};
use sea_orm::{FromQueryResult, Value};
use serde_json::json;

pub const NAMESPACE: &str = "base/datasource";

/// Row of the logical `test` table.
#[derive(Debug, Clone, PartialEq, FromQueryResult)]
pub struct TestRow {
    pub id: i64,
    pub email: String,
    pub login_name: String,
    pub name: String,
    pub create_by: i64,
}

impl TestRow {
    pub fn new(id: i64, email: &str) -> Self {
        Self {
            id,
            email: email.to_owned(),
            login_name: format!("login{id}"),
            name: format!("name{id}"),
            create_by: 1,
        }
    }
}

impl EntitySchema for TestRow {
    const TABLE: &'static str = "test";
    const COLUMNS: &'static [&'static str] = &["id", "email", "login_name", "name", "create_by"];

    fn values(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("id", self.id.into()),
            ("email", self.email.clone().into()),
            ("login_name", self.login_name.clone().into()),
            ("name", self.name.clone().into()),
            ("create_by", self.create_by.into()),
        ]
    }
}

pub fn test_filters() -> FilterRegistry {
    FilterRegistry::new()
        .with("id", Operator::In)
        .with("email", Operator::Like)
        .with("name", Operator::Like)
        .with_column("loginName", "login_name", Operator::Eq)
        .with_column("createdBy", "create_by", Operator::Eq)
}

fn sqlite_doc(dir: &Path, id: &str) -> String {
    json!({
        "dsn": dir.join(format!("{id}.db")).display().to_string(),
        "prefix": format!("os_{id}_"),
    })
    .to_string()
}

/// Store with:
/// - `1000`, `1200`: valid `SQLite` datasources under `dir`
/// - `1300`: unparseable document
/// - `1400`: empty DSN
/// - `1900`: granted but without a document
/// - privileges `{"1000": ["1200", "1300", "1400", "1900"]}`
pub fn seed_store(dir: &Path) -> Arc<MemoryConfigStore> {
    let store = Arc::new(MemoryConfigStore::new());
    store.put(
        format!("{NAMESPACE}/common"),
        json!({
            "dialect": "sqlite3",
            "minPoolSize": 1,
            "maxPoolSize": 4,
            "queryTimeout": "10s",
            "execTimeout": "10s",
            "tranTimeout": "10s",
        })
        .to_string(),
    );
    store.put(format!("{NAMESPACE}/1000"), sqlite_doc(dir, "1000"));
    store.put(format!("{NAMESPACE}/1200"), sqlite_doc(dir, "1200"));
    store.put(format!("{NAMESPACE}/1300"), "{oops");
    store.put(format!("{NAMESPACE}/1400"), r#"{"dsn": "", "prefix": "os_1400_"}"#);
    store.put(
        format!("{NAMESPACE}/privileges"),
        json!({ "1000": ["1200", "1300", "1400", "1900"] }).to_string(),
    );
    store
}

/// Create the physical `test` table of `db`.
pub async fn create_test_table(db: &DbHandle) -> Result<()> {
    let sql = format!(
        "CREATE TABLE IF NOT EXISTS {} (
            id INTEGER PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            login_name TEXT NOT NULL,
            name TEXT NOT NULL,
            create_by INTEGER NOT NULL
        )",
        db.table_name(TestRow::TABLE)
    );
    db.conn().execute_unprepared(&sql).await?;
    Ok(())
}

/// Poll `cond` until it holds or two seconds pass.
pub async fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    cond()
}
