//! Tenant to accessible datasource ids.
//!
//! The table is read on every resolution and replaced wholesale on each
//! configuration push. Readers load one immutable snapshot per call, so a
//! resolution that started before a push finishes under the old view.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::error::{DatasourceError, Result};

/// Immutable view of the privileges document.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PrivilegeSnapshot {
    grants: HashMap<String, HashSet<String>>,
}

impl PrivilegeSnapshot {
    /// Parse `{"<tenant>": ["<datasource>", ...], ...}`.
    ///
    /// Tenants with an empty list are dropped, which makes them
    /// indistinguishable from tenants that are not listed.
    ///
    /// # Errors
    /// Returns the decode error when the text does not have that shape.
    pub fn from_json(text: &str) -> std::result::Result<Self, serde_json::Error> {
        let raw: HashMap<String, Vec<String>> = serde_json::from_str(text)?;
        Ok(raw.into_iter().collect())
    }

    /// Whether `tenant` may use `datasource`.
    #[must_use]
    pub fn allows(&self, tenant: &str, datasource: &str) -> bool {
        self.grants
            .get(tenant)
            .is_some_and(|ids| ids.contains(datasource))
    }

    /// Datasources granted to `tenant`.
    #[must_use]
    pub fn grants(&self, tenant: &str) -> Option<&HashSet<String>> {
        self.grants.get(tenant)
    }

    /// Number of tenants with at least one grant.
    #[must_use]
    pub fn len(&self) -> usize {
        self.grants.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }
}

impl<T, I, D> FromIterator<(T, I)> for PrivilegeSnapshot
where
    T: Into<String>,
    I: IntoIterator<Item = D>,
    D: Into<String>,
{
    fn from_iter<It: IntoIterator<Item = (T, I)>>(iter: It) -> Self {
        let grants = iter
            .into_iter()
            .map(|(tenant, ids)| {
                (
                    tenant.into(),
                    ids.into_iter().map(Into::into).collect::<HashSet<_>>(),
                )
            })
            .filter(|(_, ids)| !ids.is_empty())
            .collect();
        Self { grants }
    }
}

/// Atomically swappable privilege table.
#[derive(Debug, Default)]
pub struct PrivilegeTable {
    current: ArcSwap<PrivilegeSnapshot>,
}

/// Document name used in errors raised by [`PrivilegeTable::apply_document`].
pub const PRIVILEGES_DOCUMENT: &str = "privileges";

impl PrivilegeTable {
    #[must_use]
    pub fn new(snapshot: PrivilegeSnapshot) -> Self {
        Self {
            current: ArcSwap::from_pointee(snapshot),
        }
    }

    /// Current snapshot. Hold it for the duration of one decision.
    #[must_use]
    pub fn snapshot(&self) -> Arc<PrivilegeSnapshot> {
        self.current.load_full()
    }

    /// Install `next` and return the snapshot it replaced.
    pub fn replace(&self, next: PrivilegeSnapshot) -> Arc<PrivilegeSnapshot> {
        self.current.swap(Arc::new(next))
    }

    /// Parse and install a pushed privileges document.
    ///
    /// On failure the previous snapshot stays in effect.
    ///
    /// # Errors
    /// Returns [`DatasourceError::ConfigDocumentUnparseable`] for malformed text.
    pub fn apply_document(&self, text: &str) -> Result<()> {
        let next = PrivilegeSnapshot::from_json(text).map_err(|source| {
            DatasourceError::ConfigDocumentUnparseable {
                document: PRIVILEGES_DOCUMENT.to_owned(),
                source,
            }
        })?;
        let tenants = next.len();
        self.replace(next);
        tracing::info!(tenants, "Installed datasource privileges");
        Ok(())
    }

    #[must_use]
    pub fn is_allowed(&self, tenant: &str, datasource: &str) -> bool {
        self.current.load().allows(tenant, datasource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_grants_and_drops_empty_lists() {
        let s = PrivilegeSnapshot::from_json(r#"{"1000":["1200","1300"],"2000":[]}"#).unwrap();
        assert!(s.allows("1000", "1200"));
        assert!(s.allows("1000", "1300"));
        assert!(!s.allows("1000", "1400"));
        assert!(!s.allows("2000", "1200"));
        assert!(s.grants("2000").is_none());
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn rejects_other_shapes() {
        assert!(PrivilegeSnapshot::from_json(r#"{"1000":"1200"}"#).is_err());
        assert!(PrivilegeSnapshot::from_json("[]").is_err());
    }

    #[test]
    fn held_snapshot_survives_replace() {
        let table = PrivilegeTable::new([("1000", ["1200"])].into_iter().collect());
        let before = table.snapshot();

        let old = table.replace(PrivilegeSnapshot::default());
        assert!(before.allows("1000", "1200"));
        assert!(old.allows("1000", "1200"));
        assert!(!table.is_allowed("1000", "1200"));
    }

    #[test]
    fn bad_document_keeps_previous_snapshot() {
        let table = PrivilegeTable::default();
        table.apply_document(r#"{"1000":["1200"]}"#).unwrap();
        let err = table.apply_document("{broken").unwrap_err();
        assert!(matches!(
            err,
            DatasourceError::ConfigDocumentUnparseable { ref document, .. } if document == PRIVILEGES_DOCUMENT
        ));
        assert!(table.is_allowed("1000", "1200"));
    }
}
