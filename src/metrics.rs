//! Prometheus Metrics
//!
//! Exposes registry counters in the Prometheus text format. Counters are
//! sourced from registry snapshots, so `observe` can be called on every
//! scrape.

use crate::error::{Error, Result};
use crate::registry::RegistryStatsSnapshot;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

/// Liveness metrics collected into a private Prometheus registry
pub struct LivenessMetrics {
    registry: Registry,
    refreshes: IntCounter,
    sweeps: IntCounter,
    expired_removed: IntCounter,
    revived: IntCounter,
    nodes_removed: IntCounter,
    clears: IntCounter,
    store_errors: IntCounter,
    registries_tracked: IntGauge,
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter> {
    let counter = IntCounter::new(name, help).map_err(metrics_error)?;
    registry
        .register(Box::new(counter.clone()))
        .map_err(metrics_error)?;
    Ok(counter)
}

fn metrics_error(e: prometheus::Error) -> Error {
    Error::Internal(format!("metrics: {e}"))
}

/// Advance `counter` to `value`; counters never go backwards
fn advance(counter: &IntCounter, value: u64) {
    let current = counter.get();
    if value > current {
        counter.inc_by(value - current);
    }
}

impl LivenessMetrics {
    /// Create and register all metrics
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let registries_tracked =
            IntGauge::new("liveness_registries_tracked", "Registries this node participates in")
                .map_err(metrics_error)?;
        registry
            .register(Box::new(registries_tracked.clone()))
            .map_err(metrics_error)?;

        Ok(Self {
            refreshes: counter(&registry, "liveness_heartbeats_total", "Heartbeats written")?,
            sweeps: counter(&registry, "liveness_sweeps_total", "Expiry sweeps run")?,
            expired_removed: counter(
                &registry,
                "liveness_expired_nodes_removed_total",
                "Nodes deleted by expiry sweeps",
            )?,
            revived: counter(
                &registry,
                "liveness_sweep_candidates_revived_total",
                "Sweep candidates found live again before deletion",
            )?,
            nodes_removed: counter(
                &registry,
                "liveness_nodes_removed_total",
                "Nodes removed explicitly",
            )?,
            clears: counter(&registry, "liveness_registry_clears_total", "Registries cleared")?,
            store_errors: counter(
                &registry,
                "liveness_store_errors_total",
                "Shared store operations that failed",
            )?,
            registries_tracked,
            registry,
        })
    }

    /// Update from the latest counters
    pub fn observe(&self, stats: RegistryStatsSnapshot, tracked: usize) {
        advance(&self.refreshes, stats.refreshes);
        advance(&self.sweeps, stats.sweeps);
        advance(&self.expired_removed, stats.expired_removed);
        advance(&self.revived, stats.revived);
        advance(&self.nodes_removed, stats.nodes_removed);
        advance(&self.clears, stats.clears);
        advance(&self.store_errors, stats.store_errors);
        self.registries_tracked.set(tracked as i64);
    }

    /// Encode everything in the Prometheus text format
    pub fn render(&self) -> Result<(String, Vec<u8>)> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metrics_error)?;
        Ok((encoder.format_type().to_string(), buffer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observe_and_render() {
        let metrics = LivenessMetrics::new().unwrap();
        let stats = RegistryStatsSnapshot {
            refreshes: 5,
            expired_removed: 2,
            ..Default::default()
        };

        metrics.observe(stats, 3);
        metrics.observe(stats, 3);

        let (content_type, body) = metrics.render().unwrap();
        let body = String::from_utf8(body).unwrap();
        assert!(content_type.starts_with("text/plain"));
        assert!(body.contains("liveness_heartbeats_total 5"));
        assert!(body.contains("liveness_expired_nodes_removed_total 2"));
        assert!(body.contains("liveness_registries_tracked 3"));
    }

    #[test]
    fn test_counters_never_decrease() {
        let metrics = LivenessMetrics::new().unwrap();
        metrics.observe(
            RegistryStatsSnapshot {
                sweeps: 4,
                ..Default::default()
            },
            1,
        );
        metrics.observe(RegistryStatsSnapshot::default(), 0);

        let body = String::from_utf8(metrics.render().unwrap().1).unwrap();
        assert!(body.contains("liveness_sweeps_total 4"));
        assert!(body.contains("liveness_registries_tracked 0"));
    }
}
