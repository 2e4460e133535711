//! Error taxonomy of the datasource layer.

use std::fmt;
use std::time::Duration;

use modkit_query::QueryError;
use sea_orm::DbErr;
use thiserror::Error;

use crate::store::ConfigStoreError;

/// Library-local result type.
pub type Result<T> = std::result::Result<T, DatasourceError>;

/// Typed error for resolution, connection setup and query execution.
#[derive(Debug, Error)]
pub enum DatasourceError {
    /// Filter, sort or paging input rejected by translation.
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("tenant [{tenant}] has no access to datasource [{datasource}]")]
    AccessDenied { tenant: String, datasource: String },

    #[error("datasource [{datasource}] is misconfigured: {reason}")]
    DatasourceMisconfigured { datasource: String, reason: String },

    #[error("failed to initialize datasource [{datasource}]: {source}")]
    ConnectionInitFailed {
        datasource: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("configuration document [{document}] is unparseable: {source}")]
    ConfigDocumentUnparseable {
        document: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    ConfigStore(#[from] ConfigStoreError),

    #[error("unknown column [{column}] for table [{table}]")]
    UnknownColumn { table: String, column: String },

    #[error(transparent)]
    QueryExecutionFailed(#[from] ExecError),
}

impl DatasourceError {
    pub(crate) fn misconfigured(datasource: &str, reason: impl Into<String>) -> Self {
        Self::DatasourceMisconfigured {
            datasource: datasource.to_owned(),
            reason: reason.into(),
        }
    }

    /// Execution failure kind, when this is a query execution error.
    #[must_use]
    pub fn exec_kind(&self) -> Option<ExecErrorKind> {
        match self {
            Self::QueryExecutionFailed(e) => Some(e.kind),
            _ => None,
        }
    }
}

impl From<DbErr> for DatasourceError {
    fn from(err: DbErr) -> Self {
        Self::QueryExecutionFailed(ExecError::from(err))
    }
}

/// Coarse classification of a storage failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecErrorKind {
    DuplicateKey,
    Timeout,
    Connectivity,
    Other,
}

impl fmt::Display for ExecErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExecErrorKind::DuplicateKey => "duplicate key",
            ExecErrorKind::Timeout => "timeout",
            ExecErrorKind::Connectivity => "connectivity",
            ExecErrorKind::Other => "other",
        })
    }
}

/// Native codes reported for unique constraint violations.
///
/// `MySQL` 1062, `PostgreSQL` SQLSTATE 23505, `SQLite` extended codes 2067 (UNIQUE) and
/// 1555 (PRIMARY KEY).
pub const DUPLICATE_KEY_CODES: &[&str] = &["1062", "23505", "2067", "1555"];

/// Storage failure with its kind and, when available, the native error code.
#[derive(Debug, Error)]
#[error("query execution failed ({kind}): {message}")]
pub struct ExecError {
    pub kind: ExecErrorKind,
    pub code: Option<String>,
    pub message: String,
    #[source]
    pub source: Option<DbErr>,
}

impl ExecError {
    /// Deadline exceeded for the named operation.
    #[must_use]
    pub fn timeout(operation: &str, after: Duration) -> Self {
        Self {
            kind: ExecErrorKind::Timeout,
            code: None,
            message: format!("{operation} exceeded {after:?}"),
            source: None,
        }
    }

    pub(crate) fn statement(err: &impl fmt::Display) -> Self {
        Self {
            kind: ExecErrorKind::Other,
            code: None,
            message: format!("failed to build statement: {err}"),
            source: None,
        }
    }

    #[must_use]
    pub fn is_duplicate_key(&self) -> bool {
        self.kind == ExecErrorKind::DuplicateKey
    }
}

impl From<DbErr> for ExecError {
    fn from(err: DbErr) -> Self {
        let (kind, code) = classify(&err);
        Self {
            kind,
            code,
            message: err.to_string(),
            source: Some(err),
        }
    }
}

fn classify(err: &DbErr) -> (ExecErrorKind, Option<String>) {
    match err {
        DbErr::ConnectionAcquire(sea_orm::ConnAcquireErr::Timeout) => {
            (ExecErrorKind::Timeout, None)
        }
        DbErr::ConnectionAcquire(_) | DbErr::Conn(_) => (ExecErrorKind::Connectivity, None),
        #[cfg(any(feature = "pg", feature = "mysql", feature = "sqlite"))]
        DbErr::Exec(sea_orm::RuntimeErr::SqlxError(e))
        | DbErr::Query(sea_orm::RuntimeErr::SqlxError(e)) => classify_sqlx(e),
        _ => (ExecErrorKind::Other, None),
    }
}

#[cfg(any(feature = "pg", feature = "mysql", feature = "sqlite"))]
fn classify_sqlx(err: &sea_orm::sqlx::Error) -> (ExecErrorKind, Option<String>) {
    use sea_orm::sqlx::Error as SqlxError;
    use sea_orm::sqlx::error::ErrorKind as SqlxKind;

    match err {
        SqlxError::Database(db) => {
            let code = db.code().map(std::borrow::Cow::into_owned);
            let duplicate = matches!(db.kind(), SqlxKind::UniqueViolation)
                || code
                    .as_deref()
                    .is_some_and(|c| DUPLICATE_KEY_CODES.contains(&c));
            let kind = if duplicate {
                ExecErrorKind::DuplicateKey
            } else {
                ExecErrorKind::Other
            };
            (kind, code)
        }
        SqlxError::PoolTimedOut => (ExecErrorKind::Timeout, None),
        SqlxError::Io(_) | SqlxError::PoolClosed | SqlxError::WorkerCrashed | SqlxError::Tls(_) => {
            (ExecErrorKind::Connectivity, None)
        }
        _ => (ExecErrorKind::Other, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_timeout_is_timeout() {
        let e = ExecError::from(DbErr::ConnectionAcquire(sea_orm::ConnAcquireErr::Timeout));
        assert_eq!(e.kind, ExecErrorKind::Timeout);
    }

    #[test]
    fn custom_error_is_other() {
        let e = DatasourceError::from(DbErr::Custom("boom".to_owned()));
        assert_eq!(e.exec_kind(), Some(ExecErrorKind::Other));
        assert!(e.to_string().contains("boom"));
    }

    #[test]
    fn timeout_message_names_operation() {
        let e = ExecError::timeout("query", Duration::from_millis(5));
        assert_eq!(e.kind, ExecErrorKind::Timeout);
        assert!(e.to_string().contains("query exceeded 5ms"));
    }
}
