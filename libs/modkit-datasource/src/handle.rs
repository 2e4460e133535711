//! Live connection handle of one datasource.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use sea_orm::{DatabaseConnection, DatabaseTransaction, TransactionTrait};

#[cfg(feature = "mysql")]
use sea_orm::sqlx::MySqlPool;
#[cfg(feature = "pg")]
use sea_orm::sqlx::PgPool;
#[cfg(feature = "sqlite")]
use sea_orm::sqlx::SqlitePool;

use crate::config::DatasourceConfig;
use crate::error::{ExecError, Result};

/// Supported engines.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DbEngine {
    Postgres,
    MySql,
    Sqlite,
}

impl DbEngine {
    /// Map a configured dialect name.
    #[must_use]
    pub fn from_dialect(dialect: &str) -> Option<Self> {
        match dialect.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => Some(Self::Sqlite),
            "mysql" => Some(Self::MySql),
            "postgres" | "postgresql" | "pg" | "pgx" => Some(Self::Postgres),
            _ => None,
        }
    }

    /// Detect engine by DSN scheme.
    #[must_use]
    pub fn detect(dsn: &str) -> Option<Self> {
        let s = dsn.trim_start();
        if s.starts_with("postgres://") || s.starts_with("postgresql://") {
            Some(Self::Postgres)
        } else if s.starts_with("mysql://") {
            Some(Self::MySql)
        } else if s.starts_with("sqlite:") {
            Some(Self::Sqlite)
        } else {
            None
        }
    }
}

/// One concrete sqlx pool.
#[derive(Clone, Debug)]
pub enum DbPool {
    #[cfg(feature = "pg")]
    Postgres(PgPool),
    #[cfg(feature = "mysql")]
    MySql(MySqlPool),
    #[cfg(feature = "sqlite")]
    Sqlite(SqlitePool),
}

/// Per-operation deadlines; `None` leaves the operation unbounded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Timeouts {
    pub query: Option<Duration>,
    pub exec: Option<Duration>,
    pub tran: Option<Duration>,
}

impl Timeouts {
    #[must_use]
    pub fn from_config(cfg: &DatasourceConfig) -> Self {
        Self {
            query: cfg.query_timeout,
            exec: cfg.exec_timeout,
            tran: cfg.tran_timeout,
        }
    }
}

#[derive(Debug)]
struct HandleInner {
    datasource_id: String,
    engine: DbEngine,
    pool: DbPool,
    sea: DatabaseConnection,
    config: DatasourceConfig,
    timeouts: Timeouts,
}

/// Shared handle; clones refer to the same pool.
#[derive(Debug, Clone)]
pub struct DbHandle {
    inner: Arc<HandleInner>,
}

impl DbHandle {
    pub(crate) fn new(
        datasource_id: &str,
        engine: DbEngine,
        pool: DbPool,
        sea: DatabaseConnection,
        config: DatasourceConfig,
    ) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                datasource_id: datasource_id.to_owned(),
                engine,
                pool,
                sea,
                timeouts: Timeouts::from_config(&config),
                config,
            }),
        }
    }

    #[must_use]
    pub fn datasource_id(&self) -> &str {
        &self.inner.datasource_id
    }

    #[must_use]
    pub fn engine(&self) -> DbEngine {
        self.inner.engine
    }

    /// Configuration this handle was built from.
    #[must_use]
    pub fn config(&self) -> &DatasourceConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn timeouts(&self) -> Timeouts {
        self.inner.timeouts
    }

    /// Table prefix of this datasource.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.inner.config.prefix
    }

    /// Physical name of a logical table: prefix + base name.
    #[must_use]
    pub fn table_name(&self, base: &str) -> String {
        format!("{}{base}", self.inner.config.prefix)
    }

    /// `SeaORM` connection over the pool.
    #[must_use]
    pub fn conn(&self) -> &DatabaseConnection {
        &self.inner.sea
    }

    #[must_use]
    pub fn pool(&self) -> &DbPool {
        &self.inner.pool
    }

    /// Whether both handles share one pool.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Begin a transaction on this datasource.
    ///
    /// # Errors
    /// Returns [`DatasourceError::QueryExecutionFailed`](crate::DatasourceError::QueryExecutionFailed)
    /// if the connection cannot start one.
    pub async fn begin(&self) -> Result<DatabaseTransaction> {
        Ok(self.inner.sea.begin().await?)
    }

    /// Graceful pool close. Other clones of this handle see a closed pool.
    pub async fn close(&self) {
        match self.inner.pool {
            #[cfg(feature = "pg")]
            DbPool::Postgres(ref p) => p.close().await,
            #[cfg(feature = "mysql")]
            DbPool::MySql(ref p) => p.close().await,
            #[cfg(feature = "sqlite")]
            DbPool::Sqlite(ref p) => p.close().await,
        }
    }

    /// Whether the pool has been closed, e.g. by eviction or a rebuild.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        match self.inner.pool {
            #[cfg(feature = "pg")]
            DbPool::Postgres(ref p) => p.is_closed(),
            #[cfg(feature = "mysql")]
            DbPool::MySql(ref p) => p.is_closed(),
            #[cfg(feature = "sqlite")]
            DbPool::Sqlite(ref p) => p.is_closed(),
        }
    }
}

/// Run `fut` under `limit`, mapping an elapsed deadline to a timeout error.
pub(crate) async fn bounded<T, F>(limit: Option<Duration>, operation: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match limit {
        Some(after) if !after.is_zero() => tokio::time::timeout(after, fut)
            .await
            .map_err(|_| ExecError::timeout(operation, after))?,
        _ => fut.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DatasourceError, ExecErrorKind};

    #[test]
    fn dialect_names() {
        for d in ["sqlite3", "SQLite", " sqlite "] {
            assert_eq!(DbEngine::from_dialect(d), Some(DbEngine::Sqlite));
        }
        assert_eq!(DbEngine::from_dialect("mysql"), Some(DbEngine::MySql));
        assert_eq!(DbEngine::from_dialect("postgres"), Some(DbEngine::Postgres));
        assert_eq!(DbEngine::from_dialect("mssql"), None);
    }

    #[test]
    fn scheme_detection() {
        assert_eq!(DbEngine::detect("sqlite::memory:"), Some(DbEngine::Sqlite));
        assert_eq!(DbEngine::detect("  mysql://h/db"), Some(DbEngine::MySql));
        assert_eq!(DbEngine::detect("postgresql://h/db"), Some(DbEngine::Postgres));
        assert_eq!(DbEngine::detect("/var/lib/app.db"), None);
    }

    #[tokio::test]
    async fn bounded_maps_elapsed_deadline() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, DatasourceError>(1)
        };
        let err = bounded(Some(Duration::from_millis(10)), "query", slow)
            .await
            .unwrap_err();
        assert_eq!(err.exec_kind(), Some(ExecErrorKind::Timeout));

        let fast = async { Ok::<_, DatasourceError>(2) };
        assert_eq!(bounded(None, "query", fast).await.unwrap(), 2);
    }
}
