#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! `ModKit` tenant-aware relational datasource access.
//!
//! A service instance is bound to one tenant. Its datasources are described by
//! JSON documents in a [`ConfigStore`] (`base/datasource/common` plus one
//! document per datasource id) and guarded by a privileges document mapping
//! tenants to the foreign datasources they may use.
//!
//! - [`DatasourceResolver`] checks access, merges configuration and hands out
//!   cached [`DbHandle`]s
//! - [`ReplicaSet`] routes reads to a random replica and writes to the master
//! - [`Repository`] runs filtered, sorted and paged list queries (translated by
//!   [`modkit_query`]) plus CRUD and transactions on one logical table
//!
//! # Features
//! - `pg`, `mysql`, `sqlite`: enable `SQLx` backends (`sqlite` by default)
//!
//! # Example
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use modkit_datasource::{DatasourceResolver, MemoryConfigStore};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> modkit_datasource::Result<()> {
//! let store = Arc::new(MemoryConfigStore::new());
//! store.put("base/datasource/common", r#"{"dialect":"sqlite3","maxPoolSize":4}"#);
//! store.put("base/datasource/1000", r#"{"dsn":"/var/lib/app/1000.db","prefix":"os_1000_"}"#);
//! store.put("base/datasource/privileges", r#"{"1000":["1200"]}"#);
//!
//! let resolver = DatasourceResolver::new(store, "1000");
//! let _watcher = resolver.start(CancellationToken::new()).await?;
//!
//! let db = resolver.handle("").await?;
//! assert_eq!(db.table_name("user"), "os_1000_user");
//! # Ok(())
//! # }
//! ```

#![cfg_attr(
    not(any(feature = "pg", feature = "mysql", feature = "sqlite")),
    allow(
        unused_imports,
        unused_variables,
        dead_code,
        unreachable_code,
        unused_lifetimes,
        clippy::unused_async,
    )
)]

pub mod config;
pub mod error;
pub mod factory;
pub mod handle;
pub mod privileges;
pub mod repository;
pub mod resolver;
pub mod router;
pub mod statement;
pub mod store;

// Internal modules
mod pool_opts;

pub use sea_orm::ConnectionTrait as DbConnTrait;

pub use config::{DatasourceConfig, ExpandValue, merge_documents};
pub use error::{DatasourceError, ExecError, ExecErrorKind, Result};
pub use factory::{ConnectionFactory, build_db_handle, redact_credentials_in_dsn};
pub use handle::{DbEngine, DbHandle, DbPool, Timeouts};
pub use privileges::{PrivilegeSnapshot, PrivilegeTable};
pub use repository::{EntitySchema, Repository, SaveOutcome, TxFuture};
pub use resolver::DatasourceResolver;
pub use router::{ReplicaSet, pick_read};
pub use store::{ConfigStore, ConfigStoreError, MemoryConfigStore};
