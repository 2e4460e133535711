//! Centralized configuration store seam.
//!
//! Documents are JSON text addressed by slash-separated keys, e.g.
//! `base/datasource/common`. Subscribers receive every subsequent value
//! written under a key.

use std::collections::HashMap;

use async_trait::async_trait;
use figment::Figment;
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio::sync::broadcast;

/// Buffered pushes per key before slow subscribers start lagging.
const CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Error)]
pub enum ConfigStoreError {
    #[error("config store unavailable: {0}")]
    Unavailable(String),

    #[error("config source error: {0}")]
    Source(#[from] Box<figment::Error>),
}

/// Read access plus push notifications for configuration documents.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Current document text under `key`, `None` when absent.
    async fn get(&self, key: &str) -> Result<Option<String>, ConfigStoreError>;

    /// Subscribe to future writes of `key`.
    fn subscribe(&self, key: &str) -> broadcast::Receiver<String>;
}

/// In-process store, used by tests and single-node deployments.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    docs: RwLock<HashMap<String, String>>,
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
}

impl MemoryConfigStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store from the `table` section of a figment.
    ///
    /// Every entry of the section becomes one document under
    /// `<table with '.' replaced by '/'>/<entry>`. String entries are taken as
    /// JSON text verbatim; other values are serialized.
    ///
    /// # Errors
    /// Returns [`ConfigStoreError::Source`] when the section is missing or is not a map.
    pub fn from_figment(figment: &Figment, table: &str) -> Result<Self, ConfigStoreError> {
        let entries: HashMap<String, serde_json::Value> =
            figment.extract_inner(table).map_err(Box::new)?;
        let prefix = table.replace('.', "/");
        let store = Self::new();
        for (name, value) in entries {
            let text = match value {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            store.put(format!("{prefix}/{name}"), text);
        }
        tracing::debug!(table, documents = store.len(), "Seeded configuration store");
        Ok(store)
    }

    /// Write a document and notify subscribers of `key`.
    pub fn put(&self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        self.docs.write().insert(key.clone(), value.clone());
        if let Some(tx) = self.channels.lock().get(&key) {
            // No receivers is fine; the value is still stored.
            let _ = tx.send(value);
        }
    }

    /// Remove a document. Subscribers are not notified.
    pub fn remove(&self, key: &str) -> Option<String> {
        self.docs.write().remove(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.docs.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.docs.read().is_empty()
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn get(&self, key: &str) -> Result<Option<String>, ConfigStoreError> {
        Ok(self.docs.read().get(key).cloned())
    }

    fn subscribe(&self, key: &str) -> broadcast::Receiver<String> {
        self.channels
            .lock()
            .entry(key.to_owned())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::providers::Serialized;

    #[tokio::test]
    async fn put_then_get() {
        let store = MemoryConfigStore::new();
        assert_eq!(store.get("a/b").await.unwrap(), None);
        store.put("a/b", "{}");
        assert_eq!(store.get("a/b").await.unwrap().as_deref(), Some("{}"));
        assert_eq!(store.remove("a/b").as_deref(), Some("{}"));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn subscribers_see_later_writes() {
        let store = MemoryConfigStore::new();
        store.put("k", "v0");
        let mut rx = store.subscribe("k");
        store.put("k", "v1");
        store.put("other", "x");
        assert_eq!(rx.recv().await.unwrap(), "v1");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn seeds_from_figment_section() {
        let figment = Figment::new().merge(Serialized::defaults(serde_json::json!({
            "base": {
                "datasource": {
                    "common": { "dialect": "sqlite3", "maxPoolSize": 4 },
                    "privileges": "{\"1000\":[\"1200\"]}"
                }
            }
        })));
        let store = MemoryConfigStore::from_figment(&figment, "base.datasource").unwrap();
        assert_eq!(store.len(), 2);

        let common = store.get("base/datasource/common").await.unwrap().unwrap();
        let v: serde_json::Value = serde_json::from_str(&common).unwrap();
        assert_eq!(v["maxPoolSize"], 4);
        assert_eq!(
            store.get("base/datasource/privileges").await.unwrap().as_deref(),
            Some("{\"1000\":[\"1200\"]}")
        );
    }

    #[test]
    fn missing_section_is_an_error() {
        let figment = Figment::new();
        assert!(matches!(
            MemoryConfigStore::from_figment(&figment, "base.datasource"),
            Err(ConfigStoreError::Source(_))
        ));
    }
}
