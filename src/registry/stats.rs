//! Registry Statistics
//!
//! Cache-line aligned counters updated on every registry operation.

use std::sync::atomic::{AtomicU64, Ordering};

/// Cache line size for alignment
pub const CACHE_LINE_SIZE: usize = 64;

/// Operation counters for one registry
#[repr(C, align(64))]
#[derive(Debug, Default)]
pub struct RegistryStats {
    /// Heartbeats written
    pub refreshes: AtomicU64,
    /// Expiry sweeps run
    pub sweeps: AtomicU64,
    /// Nodes deleted by a sweep
    pub expired_removed: AtomicU64,
    /// Sweep candidates found live again at removal time
    pub revived: AtomicU64,
    /// Nodes deleted explicitly
    pub nodes_removed: AtomicU64,
    /// Whole-registry clears
    pub clears: AtomicU64,
    /// Store operations that failed
    pub store_errors: AtomicU64,
}

const _: () = assert!(std::mem::size_of::<RegistryStats>() <= CACHE_LINE_SIZE);

impl RegistryStats {
    #[inline]
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Create a snapshot of current counters
    pub fn snapshot(&self) -> RegistryStatsSnapshot {
        RegistryStatsSnapshot {
            refreshes: self.refreshes.load(Ordering::Relaxed),
            sweeps: self.sweeps.load(Ordering::Relaxed),
            expired_removed: self.expired_removed.load(Ordering::Relaxed),
            revived: self.revived.load(Ordering::Relaxed),
            nodes_removed: self.nodes_removed.load(Ordering::Relaxed),
            clears: self.clears.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of registry counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStatsSnapshot {
    pub refreshes: u64,
    pub sweeps: u64,
    pub expired_removed: u64,
    pub revived: u64,
    pub nodes_removed: u64,
    pub clears: u64,
    pub store_errors: u64,
}

impl std::ops::Add for RegistryStatsSnapshot {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            refreshes: self.refreshes + other.refreshes,
            sweeps: self.sweeps + other.sweeps,
            expired_removed: self.expired_removed + other.expired_removed,
            revived: self.revived + other.revived,
            nodes_removed: self.nodes_removed + other.nodes_removed,
            clears: self.clears + other.clears,
            store_errors: self.store_errors + other.store_errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_cache_line_alignment() {
        assert_eq!(std::mem::align_of::<RegistryStats>(), CACHE_LINE_SIZE);
    }

    #[test]
    fn test_snapshot_and_sum() {
        let stats = RegistryStats::default();
        RegistryStats::incr(&stats.refreshes);
        RegistryStats::incr(&stats.refreshes);
        RegistryStats::incr(&stats.sweeps);

        let snap = stats.snapshot();
        assert_eq!(snap.refreshes, 2);
        assert_eq!(snap.sweeps, 1);

        let total = snap + snap;
        assert_eq!(total.refreshes, 4);
        assert_eq!(total.expired_removed, 0);
    }
}
