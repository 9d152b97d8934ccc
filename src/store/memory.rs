//! In-Memory Store
//!
//! DashMap-backed shared store. Handles created with [`MemoryStore::handle`]
//! share the same data but carry their own node id, which lets several
//! "processes" cooperate inside one test.

use crate::error::{Error, Result};
use crate::registry::NodeId;
use crate::store::SharedStore;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct MemoryInner {
    /// Hash keys to field maps
    hashes: DashMap<String, HashMap<String, String>>,
    /// Cleared to simulate an unreachable store
    unavailable: AtomicBool,
}

/// In-memory shared store
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
    node_id: NodeId,
}

impl MemoryStore {
    /// Create an empty store bound to `node_id`
    pub fn new(node_id: impl Into<NodeId>) -> Self {
        Self {
            inner: Arc::new(MemoryInner::default()),
            node_id: node_id.into(),
        }
    }

    /// Another client over the same data with a different node id
    pub fn handle(&self, node_id: impl Into<NodeId>) -> Self {
        Self {
            inner: self.inner.clone(),
            node_id: node_id.into(),
        }
    }

    /// Make every subsequent operation succeed or fail as unreachable
    pub fn set_available(&self, available: bool) {
        self.inner.unavailable.store(!available, Ordering::Release);
    }

    /// Number of keys currently held
    pub fn key_count(&self) -> usize {
        self.inner.hashes.len()
    }

    /// Drop all data, like FLUSHDB
    pub fn flush(&self) {
        self.inner.hashes.clear();
    }

    fn check_available(&self) -> Result<()> {
        if self.inner.unavailable.load(Ordering::Acquire) {
            return Err(Error::StoreUnavailable("memory store marked unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()> {
        self.check_available()?;
        self.inner
            .hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        self.check_available()?;
        Ok(self
            .inner
            .hashes
            .get(key)
            .and_then(|hash| hash.value().get(field).cloned()))
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        self.check_available()?;
        Ok(self
            .inner
            .hashes
            .get(key)
            .map(|hash| hash.value().clone())
            .unwrap_or_default())
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<bool> {
        self.check_available()?;
        let removed = match self.inner.hashes.get_mut(key) {
            Some(mut hash) => hash.remove(field).is_some(),
            None => false,
        };
        // Empty hashes cease to exist, as in Redis
        self.inner.hashes.remove_if(key, |_, hash| hash.is_empty());
        Ok(removed)
    }

    async fn del(&self, key: &str) -> Result<bool> {
        self.check_available()?;
        Ok(self.inner.hashes.remove(key).is_some())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(!self.inner.unavailable.load(Ordering::Acquire))
    }
}
