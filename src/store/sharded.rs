//! Sharded Store
//!
//! Spreads keys over several stores by CRC-32 of the key. Every field of a
//! registry lives under one key, so per-field atomicity is preserved on
//! whichever shard owns it.

use crate::error::{Error, Result};
use crate::registry::NodeId;
use crate::store::{SharedStore, SharedStoreRef};
use async_trait::async_trait;
use crc::{Crc, CRC_32_ISO_HDLC};
use std::collections::HashMap;

/// zlib-compatible CRC-32
const KEY_HASHER: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Store that routes each key to one of several shards
pub struct ShardedStore {
    node_id: NodeId,
    /// Shards ordered by host name
    shards: Vec<(String, SharedStoreRef)>,
}

impl std::fmt::Debug for ShardedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardedStore")
            .field("node_id", &self.node_id)
            .field("hosts", &self.hosts())
            .finish()
    }
}

impl ShardedStore {
    /// Build from `(host, store)` pairs.
    ///
    /// Shards are sorted by host so processes given the same host list in any
    /// order agree on where each key lives.
    pub fn new(node_id: NodeId, mut shards: Vec<(String, SharedStoreRef)>) -> Result<Self> {
        if shards.is_empty() {
            return Err(Error::Configuration("sharded store needs at least one shard".into()));
        }
        shards.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(Self { node_id, shards })
    }

    /// Index of the shard owning `key`
    #[inline]
    pub fn shard_index(&self, key: &str) -> usize {
        KEY_HASHER.checksum(key.as_bytes()) as usize % self.shards.len()
    }

    /// Host owning `key`
    pub fn host_for(&self, key: &str) -> &str {
        &self.shards[self.shard_index(key)].0
    }

    /// Hosts in routing order
    pub fn hosts(&self) -> Vec<&str> {
        self.shards.iter().map(|(host, _)| host.as_str()).collect()
    }

    fn route(&self, key: &str) -> &SharedStoreRef {
        &self.shards[self.shard_index(key)].1
    }
}

#[async_trait]
impl SharedStore for ShardedStore {
    fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()> {
        self.route(key).hset(key, field, value).await
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        self.route(key).hget(key, field).await
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        self.route(key).hgetall(key).await
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<bool> {
        self.route(key).hdel(key, field).await
    }

    async fn del(&self, key: &str) -> Result<bool> {
        self.route(key).del(key).await
    }

    async fn health_check(&self) -> Result<bool> {
        let checks =
            futures::future::join_all(self.shards.iter().map(|(_, store)| store.health_check()))
                .await;
        for check in checks {
            if !check? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
