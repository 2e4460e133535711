//! Tenant-aware datasource resolution.
//!
//! A service instance is bound to one tenant id, which is also the id of its
//! default datasource. Any other datasource is reachable only when the
//! privileges document grants it to the requesting tenant.

use std::sync::Arc;

use modkit_query::FilterRegistry;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{DatasourceConfig, merge_documents};
use crate::error::{DatasourceError, Result};
use crate::factory::ConnectionFactory;
use crate::handle::DbHandle;
use crate::privileges::{PRIVILEGES_DOCUMENT, PrivilegeSnapshot, PrivilegeTable};
use crate::repository::{EntitySchema, Repository};
use crate::router::ReplicaSet;
use crate::store::ConfigStore;

/// Key prefix of datasource documents in the config store.
pub const DEFAULT_NAMESPACE: &str = "base/datasource";
/// Name of the document shared by every datasource.
pub const COMMON_DOCUMENT: &str = "common";

pub struct DatasourceResolver {
    tenant_id: String,
    namespace: String,
    store: Arc<dyn ConfigStore>,
    privileges: Arc<PrivilegeTable>,
    factory: ConnectionFactory,
}

impl DatasourceResolver {
    /// Resolver for the service bound to `tenant_id`.
    ///
    /// Privileges start empty; call [`DatasourceResolver::start`] to load and
    /// follow them.
    pub fn new(store: Arc<dyn ConfigStore>, tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            namespace: DEFAULT_NAMESPACE.to_owned(),
            store,
            privileges: Arc::new(PrivilegeTable::default()),
            factory: ConnectionFactory::new(),
        }
    }

    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    #[must_use]
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    #[must_use]
    pub fn privileges(&self) -> &PrivilegeTable {
        &self.privileges
    }

    #[must_use]
    pub fn factory(&self) -> &ConnectionFactory {
        &self.factory
    }

    fn key(&self, document: &str) -> String {
        format!("{}/{document}", self.namespace)
    }

    /// Load the privileges document and follow its pushes until `cancel` fires.
    ///
    /// The subscription is taken before the initial load, so a push racing
    /// with startup is applied after it.
    ///
    /// # Errors
    /// - [`DatasourceError::ConfigStore`] if the store cannot be read
    /// - [`DatasourceError::ConfigDocumentUnparseable`] if the current document is malformed
    pub async fn start(&self, cancel: CancellationToken) -> Result<JoinHandle<()>> {
        let rx = self.store.subscribe(&self.key(PRIVILEGES_DOCUMENT));
        self.load_privileges().await?;
        Ok(tokio::spawn(watch_privileges(
            rx,
            Arc::clone(&self.privileges),
            cancel,
        )))
    }

    /// Pull the privileges document once. A missing document means no grants.
    ///
    /// # Errors
    /// See [`DatasourceResolver::start`].
    pub async fn load_privileges(&self) -> Result<()> {
        match self.store.get(&self.key(PRIVILEGES_DOCUMENT)).await? {
            Some(text) => self.privileges.apply_document(&text),
            None => {
                tracing::warn!(
                    namespace = %self.namespace,
                    "No datasource privileges document, only default datasources are reachable"
                );
                self.privileges.replace(PrivilegeSnapshot::default());
                Ok(())
            }
        }
    }

    /// Datasource id `tenant_id` ends up on for `requested_id`.
    ///
    /// Empty and self ids are the tenant's own datasource and need no grant.
    fn authorize(&self, tenant_id: &str, requested_id: &str) -> Result<String> {
        if requested_id.is_empty() || requested_id == tenant_id {
            return Ok(tenant_id.to_owned());
        }
        let snapshot = self.privileges.snapshot();
        if snapshot.allows(tenant_id, requested_id) {
            Ok(requested_id.to_owned())
        } else {
            Err(DatasourceError::AccessDenied {
                tenant: tenant_id.to_owned(),
                datasource: requested_id.to_owned(),
            })
        }
    }

    /// Effective configuration of a datasource id, without access checks.
    ///
    /// # Errors
    /// - [`DatasourceError::DatasourceMisconfigured`] if a document is missing or the DSN is empty
    /// - [`DatasourceError::ConfigDocumentUnparseable`] if a document is malformed
    /// - [`DatasourceError::ConfigStore`] if the store cannot be read
    pub async fn load_config(&self, datasource_id: &str) -> Result<DatasourceConfig> {
        let Some(common) = self.store.get(&self.key(COMMON_DOCUMENT)).await? else {
            return Err(DatasourceError::misconfigured(
                datasource_id,
                "common configuration document is missing",
            ));
        };
        let Some(specific) = self.store.get(&self.key(datasource_id)).await? else {
            return Err(DatasourceError::misconfigured(
                datasource_id,
                "configuration document is missing",
            ));
        };

        let cfg = merge_documents((COMMON_DOCUMENT, &common), (datasource_id, &specific))?;
        cfg.validate(datasource_id)?;
        Ok(cfg)
    }

    /// Access-checked configuration of `requested_id` for `tenant_id`.
    ///
    /// # Errors
    /// - [`DatasourceError::AccessDenied`] if `tenant_id` has no grant for `requested_id`
    /// - see [`DatasourceResolver::load_config`]
    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn resolve(&self, tenant_id: &str, requested_id: &str) -> Result<DatasourceConfig> {
        let effective = self.authorize(tenant_id, requested_id)?;
        self.load_config(&effective).await
    }

    /// [`DatasourceResolver::resolve`] for the bound tenant.
    ///
    /// # Errors
    /// See [`DatasourceResolver::resolve`].
    pub async fn config(&self, requested_id: &str) -> Result<DatasourceConfig> {
        self.resolve(&self.tenant_id, requested_id).await
    }

    /// Cached connection handle of `requested_id` for the bound tenant.
    ///
    /// # Errors
    /// See [`DatasourceResolver::resolve`] and [`crate::build_db_handle`].
    #[tracing::instrument(skip(self), fields(tenant = %self.tenant_id), level = "debug")]
    pub async fn handle(&self, requested_id: &str) -> Result<DbHandle> {
        let effective = self.authorize(&self.tenant_id, requested_id)?;
        let cfg = self.load_config(&effective).await?;
        self.factory.get_or_build(&effective, &cfg).await
    }

    /// Master plus read replicas, each access-checked for the bound tenant.
    ///
    /// # Errors
    /// See [`DatasourceResolver::handle`].
    pub async fn replica_set(&self, master_id: &str, replica_ids: &[&str]) -> Result<ReplicaSet> {
        let master = self.handle(master_id).await?;
        let mut replicas = Vec::with_capacity(replica_ids.len());
        for id in replica_ids {
            replicas.push(self.handle(id).await?);
        }
        Ok(ReplicaSet::new(master, replicas))
    }

    /// Repository of `E` on `requested_id`.
    ///
    /// # Errors
    /// See [`DatasourceResolver::handle`].
    pub async fn repository<E: EntitySchema>(
        &self,
        requested_id: &str,
        filters: FilterRegistry,
    ) -> Result<Repository<E>> {
        Ok(Repository::new(self.handle(requested_id).await?, filters))
    }
}

async fn watch_privileges(
    mut rx: broadcast::Receiver<String>,
    table: Arc<PrivilegeTable>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            msg = rx.recv() => match msg {
                Ok(text) => {
                    if let Err(e) = table.apply_document(&text) {
                        tracing::error!(error = %e, "Rejected privileges push, keeping previous grants");
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Privileges watcher lagged behind pushes");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
    tracing::debug!("Privileges watcher stopped");
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::store::MemoryConfigStore;
    use tracing_test::traced_test;

    #[tokio::test]
    #[traced_test]
    async fn missing_privileges_document_grants_nothing() {
        let store = Arc::new(MemoryConfigStore::new());
        let resolver = DatasourceResolver::new(store, "1000");
        resolver.privileges().replace([("1000", ["1200"])].into_iter().collect());

        resolver.load_privileges().await.unwrap();

        assert!(logs_contain("No datasource privileges document"));
        assert!(resolver.privileges().snapshot().is_empty());
        assert!(matches!(
            resolver.authorize("1000", "1200"),
            Err(DatasourceError::AccessDenied { .. })
        ));
        assert_eq!(resolver.authorize("1000", "").unwrap(), "1000");
    }

    #[test]
    fn documents_live_under_the_namespace() {
        let resolver = DatasourceResolver::new(Arc::new(MemoryConfigStore::new()), "1000")
            .with_namespace("tenants/acme/datasource");
        assert_eq!(resolver.key("1200"), "tenants/acme/datasource/1200");
        assert_eq!(resolver.tenant_id(), "1000");
    }
}
