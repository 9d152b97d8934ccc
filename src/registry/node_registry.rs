//! Node Registry
//!
//! Heartbeat registry for one logical resource key. Each participating node
//! writes its last heartbeat (Unix millis) into a hash stored under a derived
//! registry key; any participant can detect and sweep peers that stopped
//! heartbeating.
//!
//! Staleness is computed from time, never stored: a node whose heartbeat is
//! older than `now - 2 * TTL` is expired, and a late heartbeat revives it as
//! long as no sweep has deleted it yet. Sweeps re-read every candidate right
//! before deleting it, so a refresh that lands between detection and removal
//! always wins.

use crate::config::LivenessConfig;
use crate::error::{Error, Result};
use crate::registry::{RegistryEvent, RegistryStats, RegistryStatsSnapshot};
use crate::store::SharedStoreRef;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

// =============================================================================
// Node ID
// =============================================================================

/// Unique identifier for a node
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::borrow::Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<&String> for NodeId {
    fn from(s: &String) -> Self {
        Self(s.clone())
    }
}

impl From<&NodeId> for NodeId {
    fn from(id: &NodeId) -> Self {
        id.clone()
    }
}

// =============================================================================
// Time and Key Helpers
// =============================================================================

/// Current wall-clock time in Unix milliseconds
#[inline]
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Derive the registry key for a logical resource key
pub fn registry_key(prefix: &str, key: &str, suffix: &str) -> String {
    format!("{prefix}{key}{suffix}")
}

/// Oldest heartbeat still considered live at `now`
#[inline]
pub fn expiry_threshold(now: i64, ttl_ms: i64) -> i64 {
    now.saturating_sub(ttl_ms.saturating_mul(2))
}

/// A heartbeat expires only when strictly older than the threshold
#[inline]
pub fn is_expired(heartbeat_ms: i64, threshold: i64) -> bool {
    heartbeat_ms < threshold
}

fn parse_heartbeat(node_id: &str, raw: &str) -> Result<i64> {
    raw.trim().parse().map_err(|_| Error::InvalidHeartbeat {
        node_id: node_id.to_string(),
        value: raw.to_string(),
    })
}

// =============================================================================
// Snapshot
// =============================================================================

/// One registry entry as seen at a point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub node_id: NodeId,
    /// Parsed heartbeat, absent if the stored value is not a timestamp
    pub last_heartbeat_ms: Option<i64>,
    /// Milliseconds since the heartbeat
    pub age_ms: Option<i64>,
    /// Whether the entry is past the expiry threshold
    pub expired: bool,
}

/// Read a registry without joining it.
///
/// Unlike [`NodeRegistry::new`] this writes nothing, so inspecting tools do
/// not show up as participants. Entries are sorted by node id.
pub async fn read_snapshot(
    store: &SharedStoreRef,
    key: &str,
    config: &LivenessConfig,
) -> Result<Vec<NodeStatus>> {
    let registry_key = registry_key(&config.key_prefix, key, &config.key_suffix);
    let raw = store.hgetall(&registry_key).await?;
    Ok(statuses(raw, config.ttl_ms()))
}

fn statuses(raw: HashMap<String, String>, ttl_ms: i64) -> Vec<NodeStatus> {
    let now = now_ms();
    let threshold = expiry_threshold(now, ttl_ms);
    let mut entries: Vec<NodeStatus> = raw
        .into_iter()
        .map(|(node_id, value)| {
            let last = parse_heartbeat(&node_id, &value).ok();
            NodeStatus {
                node_id: NodeId(node_id),
                last_heartbeat_ms: last,
                age_ms: last.map(|ts| now.saturating_sub(ts)),
                expired: last.map_or(true, |ts| is_expired(ts, threshold)),
            }
        })
        .collect();
    entries.sort_by(|a, b| a.node_id.cmp(&b.node_id));
    entries
}

// =============================================================================
// Node Registry
// =============================================================================

/// Liveness registry for one logical resource key
pub struct NodeRegistry {
    /// Shared store client; also supplies this process's node id
    store: SharedStoreRef,
    /// Logical resource key
    key: String,
    /// Derived hash key holding node id -> heartbeat
    registry_key: String,
    /// Liveness window
    config: LivenessConfig,
    /// Operation counters
    stats: RegistryStats,
    /// Event broadcaster
    event_sender: broadcast::Sender<RegistryEvent>,
}

impl std::fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("registry_key", &self.registry_key)
            .field("self_id", self.self_id())
            .field("ttl_secs", &self.config.ttl_secs)
            .finish()
    }
}

impl NodeRegistry {
    /// Join the registry for `key`.
    ///
    /// Writes this node's heartbeat before returning so a freshly created
    /// registry is never empty.
    pub async fn new(
        store: SharedStoreRef,
        key: impl Into<String>,
        config: LivenessConfig,
    ) -> Result<Arc<Self>> {
        config.validate()?;

        let key = key.into();
        let registry_key = registry_key(&config.key_prefix, &key, &config.key_suffix);
        let (event_sender, _) = broadcast::channel(1024);

        let registry = Arc::new(Self {
            store,
            key,
            registry_key,
            config,
            stats: RegistryStats::default(),
            event_sender,
        });

        registry.refresh_session().await?;
        info!(
            registry = %registry.registry_key,
            node_id = %registry.self_id(),
            ttl_secs = registry.config.ttl_secs,
            "joined node registry"
        );

        Ok(registry)
    }

    /// Get an event receiver
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.event_sender.subscribe()
    }

    /// Identifier this process heartbeats as
    pub fn self_id(&self) -> &NodeId {
        self.store.node_id()
    }

    /// Logical resource key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Derived registry key in the shared store
    pub fn registry_key(&self) -> &str {
        &self.registry_key
    }

    /// Nominal heartbeat interval
    pub fn ttl(&self) -> Duration {
        self.config.ttl()
    }

    /// Heartbeats older than this are expired
    pub fn expiry_threshold_ms(&self) -> i64 {
        expiry_threshold(now_ms(), self.config.ttl_ms())
    }

    /// Get operation counters
    pub fn stats(&self) -> RegistryStatsSnapshot {
        self.stats.snapshot()
    }

    fn observe<T>(&self, result: Result<T>) -> Result<T> {
        if result.is_err() {
            RegistryStats::incr(&self.stats.store_errors);
        }
        result
    }

    fn emit(&self, event: RegistryEvent) {
        // No subscribers is fine
        let _ = self.event_sender.send(event);
    }

    // -------------------------------------------------------------------------
    // Heartbeats
    // -------------------------------------------------------------------------

    /// Record a heartbeat for this node
    pub async fn refresh_session(&self) -> Result<i64> {
        let node_id = self.self_id().clone();
        self.refresh_session_for(node_id).await
    }

    /// Record a heartbeat for `node_id`.
    ///
    /// Overwrites any previous heartbeat; returns the timestamp written.
    pub async fn refresh_session_for(&self, node_id: impl Into<NodeId>) -> Result<i64> {
        let node_id = node_id.into();
        let now = now_ms();

        self.observe(
            self.store
                .hset(&self.registry_key, node_id.as_str(), &now.to_string())
                .await,
        )?;

        RegistryStats::incr(&self.stats.refreshes);
        trace!(registry = %self.registry_key, %node_id, heartbeat_ms = now, "session refreshed");
        self.emit(RegistryEvent::NodeRefreshed {
            registry: self.registry_key.clone(),
            node_id: node_id.to_string(),
            heartbeat_ms: now,
        });

        Ok(now)
    }

    /// Last heartbeat of `node_id`, or `None` if it has no entry
    pub async fn get_last_updated(&self, node_id: impl Into<NodeId>) -> Result<Option<i64>> {
        let node_id = node_id.into();
        let raw = self.observe(self.store.hget(&self.registry_key, node_id.as_str()).await)?;
        raw.map(|value| parse_heartbeat(node_id.as_str(), &value))
            .transpose()
    }

    /// All entries with a readable heartbeat.
    ///
    /// A registry that does not exist yet is an empty map. Entries whose value
    /// is not a timestamp are left out and logged.
    pub async fn get_all_nodes(&self) -> Result<HashMap<NodeId, i64>> {
        let raw = self.observe(self.store.hgetall(&self.registry_key).await)?;
        let mut nodes = HashMap::with_capacity(raw.len());
        for (node_id, value) in raw {
            match parse_heartbeat(&node_id, &value) {
                Ok(ts) => {
                    nodes.insert(NodeId(node_id), ts);
                }
                Err(e) => warn!(registry = %self.registry_key, error = %e, "skipping unreadable entry"),
            }
        }
        Ok(nodes)
    }

    /// Number of entries, readable or not
    pub async fn count(&self) -> Result<usize> {
        Ok(self.observe(self.store.hgetall(&self.registry_key).await)?.len())
    }

    /// Entries with a heartbeat inside the liveness window
    pub async fn live_nodes(&self) -> Result<HashMap<NodeId, i64>> {
        let threshold = self.expiry_threshold_ms();
        let mut nodes = self.get_all_nodes().await?;
        nodes.retain(|_, ts| *ts >= threshold);
        Ok(nodes)
    }

    /// Current entries with expiry flags, sorted by node id
    pub async fn snapshot(&self) -> Result<Vec<NodeStatus>> {
        let raw = self.observe(self.store.hgetall(&self.registry_key).await)?;
        Ok(statuses(raw, self.config.ttl_ms()))
    }

    // -------------------------------------------------------------------------
    // Expiry
    // -------------------------------------------------------------------------

    /// Node ids whose heartbeat is strictly older than `now - 2 * TTL`.
    ///
    /// Read-only. Entries that do not hold a timestamp count as expired since
    /// they can never prove liveness.
    pub async fn find_expired_nodes(&self) -> Result<HashSet<NodeId>> {
        let raw = self.observe(self.store.hgetall(&self.registry_key).await)?;
        let threshold = self.expiry_threshold_ms();

        let expired: HashSet<_> = raw
            .into_iter()
            .filter(|(node_id, value)| match parse_heartbeat(node_id, value) {
                Ok(ts) => is_expired(ts, threshold),
                Err(_) => true,
            })
            .map(|(node_id, _)| NodeId(node_id))
            .collect();

        debug!(
            registry = %self.registry_key,
            expired = expired.len(),
            threshold_ms = threshold,
            "found expired nodes"
        );
        Ok(expired)
    }

    /// Delete expired nodes; returns the ids actually deleted.
    ///
    /// `candidates` may have been computed at any earlier time. Each one is
    /// read again immediately before its delete and kept if its heartbeat is
    /// now inside the window. Candidates already gone are skipped. Without
    /// candidates the current expired set is used, with the same re-check.
    pub async fn remove_expired_nodes(
        &self,
        candidates: Option<HashSet<NodeId>>,
    ) -> Result<HashSet<NodeId>> {
        let candidates = match candidates {
            Some(candidates) => candidates,
            None => self.find_expired_nodes().await?,
        };
        RegistryStats::incr(&self.stats.sweeps);

        let mut removed = HashSet::new();
        for node_id in candidates {
            let current = self.observe(self.store.hget(&self.registry_key, node_id.as_str()).await)?;
            let Some(value) = current else {
                trace!(registry = %self.registry_key, %node_id, "candidate already gone");
                continue;
            };

            let last_heartbeat = parse_heartbeat(node_id.as_str(), &value).ok();
            if let Some(ts) = last_heartbeat {
                if !is_expired(ts, self.expiry_threshold_ms()) {
                    RegistryStats::incr(&self.stats.revived);
                    debug!(registry = %self.registry_key, %node_id, heartbeat_ms = ts, "candidate refreshed, keeping");
                    self.emit(RegistryEvent::NodeRevived {
                        registry: self.registry_key.clone(),
                        node_id: node_id.to_string(),
                        heartbeat_ms: ts,
                    });
                    continue;
                }
            }

            if self.observe(self.store.hdel(&self.registry_key, node_id.as_str()).await)? {
                RegistryStats::incr(&self.stats.expired_removed);
                warn!(
                    registry = %self.registry_key,
                    %node_id,
                    last_heartbeat_ms = ?last_heartbeat,
                    "node failure: removed expired node"
                );
                self.emit(RegistryEvent::NodeExpired {
                    registry: self.registry_key.clone(),
                    node_id: node_id.to_string(),
                    last_heartbeat_ms: last_heartbeat,
                });
                removed.insert(node_id);
            }
        }

        debug!(registry = %self.registry_key, removed = removed.len(), "expiry sweep done");
        Ok(removed)
    }

    /// Heartbeat, sweep expired peers, then check whether any other node
    /// remains.
    ///
    /// True means this node is the last participant, so the resource behind
    /// the key has no other owners. The heartbeat comes first so a caller
    /// that went quiet for a while never sweeps out its own entry.
    pub async fn is_sole_survivor(&self) -> Result<bool> {
        self.refresh_session().await?;
        self.remove_expired_nodes(None).await?;
        let raw = self.observe(self.store.hgetall(&self.registry_key).await)?;
        let self_id = self.self_id().as_str();
        Ok(raw.keys().all(|node_id| node_id == self_id))
    }

    // -------------------------------------------------------------------------
    // Removal
    // -------------------------------------------------------------------------

    /// Delete `node_id` regardless of its heartbeat.
    ///
    /// Returns whether it was present; removing an absent node is not an error.
    pub async fn remove_node(&self, node_id: impl Into<NodeId>) -> Result<bool> {
        let node_id = node_id.into();
        let removed = self.observe(self.store.hdel(&self.registry_key, node_id.as_str()).await)?;
        if removed {
            RegistryStats::incr(&self.stats.nodes_removed);
            debug!(registry = %self.registry_key, %node_id, "node removed");
            self.emit(RegistryEvent::NodeRemoved {
                registry: self.registry_key.clone(),
                node_id: node_id.to_string(),
            });
        }
        Ok(removed)
    }

    /// Delete the whole registry.
    ///
    /// Returns whether it existed; clearing an absent registry is not an error.
    pub async fn clear_nodelist(&self) -> Result<bool> {
        let existed = self.observe(self.store.del(&self.registry_key).await)?;
        RegistryStats::incr(&self.stats.clears);
        info!(registry = %self.registry_key, existed, "registry cleared");
        self.emit(RegistryEvent::RegistryCleared {
            registry: self.registry_key.clone(),
        });
        Ok(existed)
    }
}
