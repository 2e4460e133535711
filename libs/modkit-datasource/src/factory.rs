//! Connection construction and the per-datasource handle cache.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::OnceCell;

#[cfg(any(feature = "pg", feature = "mysql", feature = "sqlite"))]
use sea_orm::sqlx::ConnectOptions;

use crate::config::DatasourceConfig;
use crate::error::{DatasourceError, Result};
use crate::handle::{DbEngine, DbHandle};
#[cfg(any(feature = "pg", feature = "mysql", feature = "sqlite"))]
use crate::handle::DbPool;
#[cfg(any(feature = "pg", feature = "mysql", feature = "sqlite"))]
use crate::pool_opts::ApplyPoolOpts;
use crate::pool_opts::PoolSettings;

/// Redact the password of a DSN for logging.
#[must_use]
pub fn redact_credentials_in_dsn(dsn: Option<&str>) -> String {
    match dsn {
        Some(dsn) if dsn.contains('@') => {
            if let Ok(mut parsed) = url::Url::parse(dsn) {
                if parsed.password().is_some() {
                    let _ = parsed.set_password(Some("***"));
                }
                parsed.to_string()
            } else {
                "***".to_owned()
            }
        }
        Some(dsn) => dsn.to_owned(),
        None => "none".to_owned(),
    }
}

#[cfg(any(feature = "pg", feature = "mysql", feature = "sqlite"))]
fn init_failed(datasource: &str, source: sea_orm::sqlx::Error) -> DatasourceError {
    DatasourceError::ConnectionInitFailed {
        datasource: datasource.to_owned(),
        source: Box::new(source),
    }
}

/// Statement logging: `debug` logs every statement at info level, `enableLog`
/// at debug level plus slow statements at warn level once past `queryTimeout`.
#[cfg(any(feature = "pg", feature = "mysql", feature = "sqlite"))]
fn with_statement_logging<O: ConnectOptions>(opts: O, cfg: &DatasourceConfig) -> O {
    let opts = if cfg.debug {
        opts.log_statements(log::LevelFilter::Info)
    } else if cfg.enable_log {
        opts.log_statements(log::LevelFilter::Debug)
    } else {
        opts.disable_statement_logging()
    };
    match cfg.query_timeout {
        Some(slow) if cfg.enable_log || cfg.debug => {
            opts.log_slow_statements(log::LevelFilter::Warn, slow)
        }
        _ => opts,
    }
}

/// Bare paths and `sqlite:` URLs are both accepted; the file is created if missing.
#[cfg(feature = "sqlite")]
fn sqlite_options(
    dsn: &str,
) -> std::result::Result<sea_orm::sqlx::sqlite::SqliteConnectOptions, sea_orm::sqlx::Error> {
    use std::str::FromStr;

    use sea_orm::sqlx::sqlite::SqliteConnectOptions;

    let dsn = dsn.trim();
    let opts = if dsn.starts_with("sqlite:") {
        SqliteConnectOptions::from_str(dsn)?
    } else {
        SqliteConnectOptions::new().filename(dsn)
    };
    Ok(opts.create_if_missing(true))
}

/// Build a pooled handle for one datasource. No retry is attempted.
///
/// # Errors
/// - [`DatasourceError::DatasourceMisconfigured`] if `cfg` fails validation or
///   its engine is not compiled in
/// - [`DatasourceError::ConnectionInitFailed`] if the pool cannot connect
pub async fn build_db_handle(datasource_id: &str, cfg: &DatasourceConfig) -> Result<DbHandle> {
    cfg.validate(datasource_id)?;
    let engine = cfg
        .engine()
        .ok_or_else(|| DatasourceError::misconfigured(datasource_id, "unknown engine"))?;
    let settings = PoolSettings::from_config(cfg);

    tracing::debug!(
        datasource = datasource_id,
        dsn = redact_credentials_in_dsn(Some(&cfg.dsn)),
        engine = ?engine,
        "Building datasource connection pool"
    );

    match engine {
        #[cfg(feature = "pg")]
        DbEngine::Postgres => {
            use std::str::FromStr;

            use sea_orm::sqlx::postgres::{PgConnectOptions, PgPoolOptions};

            let opts = PgConnectOptions::from_str(cfg.dsn.trim())
                .map_err(|e| init_failed(datasource_id, e))?;
            let pool = PgPoolOptions::new()
                .apply(&settings)
                .connect_with(with_statement_logging(opts, cfg))
                .await
                .map_err(|e| init_failed(datasource_id, e))?;
            let sea = sea_orm::SqlxPostgresConnector::from_sqlx_postgres_pool(pool.clone());
            Ok(DbHandle::new(
                datasource_id,
                engine,
                DbPool::Postgres(pool),
                sea,
                cfg.clone(),
            ))
        }
        #[cfg(feature = "mysql")]
        DbEngine::MySql => {
            use std::str::FromStr;

            use sea_orm::sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};

            let opts = MySqlConnectOptions::from_str(cfg.dsn.trim())
                .map_err(|e| init_failed(datasource_id, e))?;
            let pool = MySqlPoolOptions::new()
                .apply(&settings)
                .connect_with(with_statement_logging(opts, cfg))
                .await
                .map_err(|e| init_failed(datasource_id, e))?;
            let sea = sea_orm::SqlxMySqlConnector::from_sqlx_mysql_pool(pool.clone());
            Ok(DbHandle::new(
                datasource_id,
                engine,
                DbPool::MySql(pool),
                sea,
                cfg.clone(),
            ))
        }
        #[cfg(feature = "sqlite")]
        DbEngine::Sqlite => {
            use sea_orm::sqlx::sqlite::SqlitePoolOptions;

            let opts = sqlite_options(&cfg.dsn).map_err(|e| init_failed(datasource_id, e))?;
            let pool = SqlitePoolOptions::new()
                .apply(&settings)
                .connect_with(with_statement_logging(opts, cfg))
                .await
                .map_err(|e| init_failed(datasource_id, e))?;
            let sea = sea_orm::SqlxSqliteConnector::from_sqlx_sqlite_pool(pool.clone());
            Ok(DbHandle::new(
                datasource_id,
                engine,
                DbPool::Sqlite(pool),
                sea,
                cfg.clone(),
            ))
        }
        #[allow(unreachable_patterns)]
        other => Err(DatasourceError::misconfigured(
            datasource_id,
            format!("{other:?} support is not enabled"),
        )),
    }
}

/// Handle cache keyed by datasource id.
///
/// The first caller for an id builds the handle; concurrent callers wait for
/// that build instead of starting their own. A failed build leaves the slot
/// empty so the next caller retries.
#[derive(Debug, Default)]
pub struct ConnectionFactory {
    cache: DashMap<String, Arc<OnceCell<DbHandle>>>,
}

impl ConnectionFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached handle for `datasource_id`, building it from `cfg` on first use.
    ///
    /// A cached handle built from a different configuration is replaced.
    ///
    /// # Errors
    /// See [`build_db_handle`].
    pub async fn get_or_build(
        &self,
        datasource_id: &str,
        cfg: &DatasourceConfig,
    ) -> Result<DbHandle> {
        loop {
            let cell = Arc::clone(
                self.cache
                    .entry(datasource_id.to_owned())
                    .or_default()
                    .value(),
            );
            let handle = cell
                .get_or_try_init(|| build_db_handle(datasource_id, cfg))
                .await?;
            if handle.config() == cfg {
                return Ok(handle.clone());
            }
            tracing::info!(
                datasource = datasource_id,
                "Datasource configuration changed, rebuilding connection pool"
            );
            let stale = handle.clone();
            if self
                .cache
                .remove_if(datasource_id, |_, current| Arc::ptr_eq(current, &cell))
                .is_some()
            {
                stale.close().await;
            }
        }
    }

    /// Already built handle, if any.
    #[must_use]
    pub fn cached(&self, datasource_id: &str) -> Option<DbHandle> {
        self.cache
            .get(datasource_id)
            .and_then(|cell| cell.get().cloned())
    }

    /// Drop the cached handle and close its pool.
    pub async fn evict(&self, datasource_id: &str) -> bool {
        let Some((_, cell)) = self.cache.remove(datasource_id) else {
            return false;
        };
        if let Some(handle) = cell.get() {
            handle.close().await;
            tracing::info!(datasource = datasource_id, "Closed datasource connection pool");
        }
        true
    }

    /// Number of built handles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.iter().filter(|e| e.value().initialized()).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_password_only() {
        assert_eq!(
            redact_credentials_in_dsn(Some("mysql://app:secret@db:3306/app")),
            "mysql://app:***@db:3306/app"
        );
        assert_eq!(redact_credentials_in_dsn(Some("/tmp/x.db")), "/tmp/x.db");
        assert_eq!(redact_credentials_in_dsn(None), "none");
    }

    #[tokio::test]
    async fn invalid_config_is_not_cached() {
        let factory = ConnectionFactory::new();
        let cfg = DatasourceConfig::default();
        let err = factory.get_or_build("1000", &cfg).await.unwrap_err();
        assert!(matches!(err, DatasourceError::DatasourceMisconfigured { .. }));
        assert!(factory.cached("1000").is_none());
        assert!(factory.is_empty());
    }
}
