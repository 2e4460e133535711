//! Read/write routing over a master and its replicas.

use rand::seq::IndexedRandom;

use crate::handle::DbHandle;

/// Uniform random pick among `replicas`; `master` when there are none.
///
/// Stateless: every call draws independently.
#[must_use]
pub fn pick_read<'a, T>(master: &'a T, replicas: &'a [T]) -> &'a T {
    replicas.choose(&mut rand::rng()).unwrap_or(master)
}

/// One master handle plus zero or more read replicas.
#[derive(Debug, Clone)]
pub struct ReplicaSet {
    master: DbHandle,
    replicas: Vec<DbHandle>,
}

impl ReplicaSet {
    #[must_use]
    pub fn new(master: DbHandle, replicas: Vec<DbHandle>) -> Self {
        Self { master, replicas }
    }

    /// Master only; reads go to the master.
    #[must_use]
    pub fn single(master: DbHandle) -> Self {
        Self::new(master, Vec::new())
    }

    /// Handle for a read.
    #[must_use]
    pub fn pick_read(&self) -> &DbHandle {
        pick_read(&self.master, &self.replicas)
    }

    /// Handle for a write; always the master.
    #[must_use]
    pub fn pick_write(&self) -> &DbHandle {
        &self.master
    }

    #[must_use]
    pub fn master(&self) -> &DbHandle {
        &self.master
    }

    #[must_use]
    pub fn replicas(&self) -> &[DbHandle] {
        &self.replicas
    }
}
