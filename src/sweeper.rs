//! Heartbeat Sweeper
//!
//! Drives a set of registries on a fixed interval: refresh this node's
//! session in each, then sweep expired peers. The registry itself never
//! schedules anything; this is the caller-side loop that does.

use crate::registry::{NodeId, NodeRegistry, RegistryStatsSnapshot};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

// =============================================================================
// Sweeper Configuration
// =============================================================================

/// Configuration for the sweeper
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// Time between ticks
    pub interval: Duration,
    /// Remove this node from every registry when stopping
    pub deregister_on_shutdown: bool,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30 * 60),
            deregister_on_shutdown: true,
        }
    }
}

// =============================================================================
// Tick Report
// =============================================================================

/// Outcome of one tick across all registries
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    /// Registries whose heartbeat was written
    pub refreshed: usize,
    /// Nodes deleted, per registry key
    pub expired: Vec<(String, HashSet<NodeId>)>,
    /// Registries where the tick failed
    pub failures: usize,
}

impl TickReport {
    /// Total nodes removed this tick
    pub fn expired_count(&self) -> usize {
        self.expired.iter().map(|(_, nodes)| nodes.len()).sum()
    }
}

// =============================================================================
// Sweeper
// =============================================================================

/// Periodic heartbeat and expiry sweep over several registries
pub struct Sweeper {
    config: SweeperConfig,
    registries: RwLock<Vec<Arc<NodeRegistry>>>,
    ticks: AtomicU64,
}

impl Sweeper {
    /// Create a sweeper with no registries
    pub fn new(config: SweeperConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            registries: RwLock::new(Vec::new()),
            ticks: AtomicU64::new(0),
        })
    }

    /// Start driving `registry`; a registry key already tracked is ignored
    pub fn track(&self, registry: Arc<NodeRegistry>) {
        let mut registries = self.registries.write();
        if registries
            .iter()
            .any(|r| r.registry_key() == registry.registry_key())
        {
            return;
        }
        info!(registry = %registry.registry_key(), "tracking registry");
        registries.push(registry);
    }

    /// Stop driving the registry for `registry_key`
    pub fn untrack(&self, registry_key: &str) -> Option<Arc<NodeRegistry>> {
        let mut registries = self.registries.write();
        let idx = registries
            .iter()
            .position(|r| r.registry_key() == registry_key)?;
        Some(registries.remove(idx))
    }

    /// Registries currently tracked
    pub fn registries(&self) -> Vec<Arc<NodeRegistry>> {
        self.registries.read().clone()
    }

    /// Ticks completed so far
    pub fn tick_count(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Counters summed over all tracked registries
    pub fn stats(&self) -> RegistryStatsSnapshot {
        self.registries
            .read()
            .iter()
            .map(|r| r.stats())
            .fold(RegistryStatsSnapshot::default(), |acc, s| acc + s)
    }

    /// Heartbeat and sweep every registry once.
    ///
    /// A failing registry is logged and skipped; the rest still run.
    pub async fn tick(&self) -> TickReport {
        let registries = self.registries();
        let mut report = TickReport::default();

        for registry in registries {
            if let Err(e) = registry.refresh_session().await {
                error!(registry = %registry.registry_key(), error = %e, "heartbeat failed");
                report.failures += 1;
                continue;
            }
            report.refreshed += 1;

            match registry.remove_expired_nodes(None).await {
                Ok(removed) if !removed.is_empty() => {
                    report
                        .expired
                        .push((registry.registry_key().to_string(), removed));
                }
                Ok(_) => {}
                Err(e) => {
                    error!(registry = %registry.registry_key(), error = %e, "expiry sweep failed");
                    report.failures += 1;
                }
            }
        }

        self.ticks.fetch_add(1, Ordering::Relaxed);
        debug!(
            refreshed = report.refreshed,
            expired = report.expired_count(),
            failures = report.failures,
            "sweeper tick"
        );
        report
    }

    /// Tick on the configured interval until `shutdown` is cancelled
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!(interval = ?self.config.interval, "sweeper started");
        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    self.tick().await;
                }
            }
        }

        if self.config.deregister_on_shutdown {
            self.deregister_all().await;
        }
        info!("sweeper stopped");
    }

    /// Remove this node from every tracked registry
    pub async fn deregister_all(&self) {
        for registry in self.registries() {
            let self_id = registry.self_id().clone();
            match registry.remove_node(self_id.clone()).await {
                Ok(_) => info!(registry = %registry.registry_key(), node_id = %self_id, "deregistered"),
                Err(e) => warn!(registry = %registry.registry_key(), error = %e, "deregister failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LivenessConfig;
    use crate::registry::now_ms;
    use crate::store::{MemoryStore, SharedStore};

    async fn join(store: &MemoryStore, key: &str) -> Arc<NodeRegistry> {
        NodeRegistry::new(Arc::new(store.clone()), key, LivenessConfig::with_ttl_secs(10))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_tick_refreshes_and_sweeps() {
        let store = MemoryStore::new("self");
        let sweeper = Sweeper::new(SweeperConfig::default());
        let a = join(&store, "a").await;
        sweeper.track(a.clone());
        sweeper.track(join(&store, "b").await);

        let stale = (now_ms() - 25_000).to_string();
        store.hset("phonon_a.nodelist", "dead", &stale).await.unwrap();

        let report = sweeper.tick().await;
        assert_eq!(report.refreshed, 2);
        assert_eq!(report.failures, 0);
        assert_eq!(report.expired_count(), 1);
        assert_eq!(report.expired[0].0, "phonon_a.nodelist");
        assert_eq!(a.get_last_updated("dead").await.unwrap(), None);
        assert_eq!(sweeper.tick_count(), 1);
        assert_eq!(sweeper.stats().expired_removed, 1);
    }

    #[test]
    fn test_track_is_idempotent() {
        let store = MemoryStore::new("self");
        let sweeper = Sweeper::new(SweeperConfig::default());
        let a = tokio_test::block_on(join(&store, "a"));

        sweeper.track(a.clone());
        sweeper.track(a);
        assert_eq!(sweeper.registries().len(), 1);

        assert!(sweeper.untrack("phonon_a.nodelist").is_some());
        assert!(sweeper.untrack("phonon_a.nodelist").is_none());
    }

    #[tokio::test]
    async fn test_tick_reports_failures() {
        let store = MemoryStore::new("self");
        let sweeper = Sweeper::new(SweeperConfig::default());
        sweeper.track(join(&store, "a").await);

        store.set_available(false);
        let report = sweeper.tick().await;
        assert_eq!(report.refreshed, 0);
        assert_eq!(report.failures, 1);
    }

    #[tokio::test]
    async fn test_run_deregisters_on_shutdown() {
        let store = MemoryStore::new("self");
        let sweeper = Sweeper::new(SweeperConfig {
            interval: Duration::from_millis(10),
            deregister_on_shutdown: true,
        });
        let a = join(&store, "a").await;
        sweeper.track(a.clone());

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(sweeper.clone().run(shutdown.clone()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();
        handle.await.unwrap();

        assert!(sweeper.tick_count() >= 1);
        assert_eq!(a.get_last_updated("self").await.unwrap(), None);
    }
}
