//! Thread-safe handle around a [`Hypergraph`].

use crate::error::{Error, Result};
use crate::graph::store::Hypergraph;
use std::sync::{Arc, RwLock};

/// A cloneable, lock-guarded hypergraph.
///
/// Every closure runs inside a single critical section, so a concept insert
/// and its name registration, or an event and its back-links, are never
/// observed half-applied.
#[derive(Clone, Default)]
pub struct SharedHypergraph {
    inner: Arc<RwLock<Hypergraph>>,
}

impl SharedHypergraph {
    pub fn new(graph: Hypergraph) -> Self {
        Self {
            inner: Arc::new(RwLock::new(graph)),
        }
    }

    /// Run a read-only operation under the shared lock.
    pub fn read<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Hypergraph) -> T,
    {
        let graph = self
            .inner
            .read()
            .map_err(|e| Error::Internal(format!("Failed to lock hypergraph: {}", e)))?;
        Ok(f(&graph))
    }

    /// Run a mutation under the exclusive lock.
    pub fn write<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Hypergraph) -> Result<T>,
    {
        let mut graph = self
            .inner
            .write()
            .map_err(|e| Error::Internal(format!("Failed to lock hypergraph: {}", e)))?;
        f(&mut graph)
    }
}

impl From<Hypergraph> for SharedHypergraph {
    fn from(graph: Hypergraph) -> Self {
        Self::new(graph)
    }
}
