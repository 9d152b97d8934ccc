//! Shared Store
//!
//! The hash-map store every participating process shares, plus its adapters.
//! Correctness of the registry rests on per-field atomicity of these
//! operations; nothing in this crate adds locking on top.

pub mod identity;
mod memory;
mod redis;
mod sharded;

pub use identity::resolve_node_id;
pub use memory::MemoryStore;
pub use redis::{connect_store, RedisStore};
pub use sharded::ShardedStore;

use crate::error::Result;
use crate::registry::NodeId;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

// =============================================================================
// SharedStore Trait
// =============================================================================

/// Hash-field operations on a shared key-value store
///
/// Every call is a single round trip. A missing key behaves like an empty
/// hash; only an unreachable store is an error.
#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Identifier of the process this client belongs to
    fn node_id(&self) -> &NodeId;

    /// Set one field of a hash
    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()>;

    /// Get one field of a hash
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>>;

    /// Get every field of a hash
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>>;

    /// Delete one field of a hash
    ///
    /// Returns whether the field existed.
    async fn hdel(&self, key: &str, field: &str) -> Result<bool>;

    /// Delete a whole key
    ///
    /// Returns whether the key existed.
    async fn del(&self, key: &str) -> Result<bool>;

    /// Check if the store is reachable
    async fn health_check(&self) -> Result<bool>;
}

/// Shared handle to a store
pub type SharedStoreRef = Arc<dyn SharedStore>;
