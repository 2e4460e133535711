//! Datasource configuration documents.
//!
//! A datasource is described by a common document shared by every datasource
//! plus a per-id document. Both are JSON objects; the per-id document is laid
//! over the common one key by key before the result is decoded.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DatasourceError, Result};
use crate::handle::DbEngine;

/// Used when `acquireTimeout` is not configured.
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Free-form extension value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExpandValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<String>),
}

/// Effective configuration of one datasource.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatasourceConfig {
    /// `sqlite3`, `mysql` or `postgres`; inferred from the DSN scheme when empty.
    pub dialect: String,
    pub dsn: String,
    /// Log every statement at info level.
    pub debug: bool,
    /// Log statements at debug level and slow statements at warn level.
    pub enable_log: bool,
    /// Physical table name prefix, e.g. `os_1000_`.
    pub prefix: String,
    pub min_pool_size: u32,
    /// `0` keeps the driver default.
    pub max_pool_size: u32,
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub query_timeout: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub exec_timeout: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub tran_timeout: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub acquire_timeout: Option<Duration>,
    pub expand: HashMap<String, ExpandValue>,
}

impl DatasourceConfig {
    /// Decode a datasource document on its own.
    ///
    /// # Errors
    /// Returns [`DatasourceError::ConfigDocumentUnparseable`] if the text is not a valid document.
    pub fn from_document(document: &str, text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|source| unparseable(document, source))
    }

    /// Engine selected by `dialect`, falling back to the DSN scheme.
    #[must_use]
    pub fn engine(&self) -> Option<DbEngine> {
        if self.dialect.trim().is_empty() {
            DbEngine::detect(&self.dsn)
        } else {
            DbEngine::from_dialect(&self.dialect)
        }
    }

    #[must_use]
    pub fn acquire_timeout(&self) -> Duration {
        self.acquire_timeout.unwrap_or(DEFAULT_ACQUIRE_TIMEOUT)
    }

    /// Check the fields a connection cannot be built without.
    ///
    /// # Errors
    /// Returns [`DatasourceError::DatasourceMisconfigured`] naming `datasource`.
    pub fn validate(&self, datasource: &str) -> Result<()> {
        if self.dsn.trim().is_empty() {
            return Err(DatasourceError::misconfigured(datasource, "dsn is empty"));
        }
        if self.engine().is_none() {
            return Err(DatasourceError::misconfigured(
                datasource,
                format!("unsupported dialect '{}'", self.dialect),
            ));
        }
        if self.max_pool_size > 0 && self.min_pool_size > self.max_pool_size {
            return Err(DatasourceError::misconfigured(
                datasource,
                format!(
                    "minPoolSize {} exceeds maxPoolSize {}",
                    self.min_pool_size, self.max_pool_size
                ),
            ));
        }
        Ok(())
    }
}

fn unparseable(document: &str, source: serde_json::Error) -> DatasourceError {
    DatasourceError::ConfigDocumentUnparseable {
        document: document.to_owned(),
        source,
    }
}

fn parse_object(document: &str, text: &str) -> Result<serde_json::Map<String, serde_json::Value>> {
    serde_json::from_str(text).map_err(|source| unparseable(document, source))
}

/// Lay the per-id document over the common one and decode the result.
///
/// Keys present in `specific` replace the common value wholesale; `null`
/// values in `specific` leave the common value in place.
///
/// # Errors
/// Returns [`DatasourceError::ConfigDocumentUnparseable`] naming the offending
/// document when either is not a JSON object or the merge does not decode.
pub fn merge_documents(
    common: (&str, &str),
    specific: (&str, &str),
) -> Result<DatasourceConfig> {
    let (common_name, common_text) = common;
    let (specific_name, specific_text) = specific;

    let mut merged = parse_object(common_name, common_text)?;
    for (key, value) in parse_object(specific_name, specific_text)? {
        if !value.is_null() {
            merged.insert(key, value);
        }
    }
    serde_json::from_value(serde_json::Value::Object(merged))
        .map_err(|source| unparseable(specific_name, source))
}
