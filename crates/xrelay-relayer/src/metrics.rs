//! Relayer counters

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

#[derive(Debug, Default)]
pub struct RelayerMetrics {
    /// `Initiated` notifications observed on a monitored source
    pub notifications_seen: AtomicU64,
    /// Attempts that reached execution on the destination
    pub relayed: AtomicU64,
    /// Executions that spawned a follow-on action
    pub chained: AtomicU64,
    /// Attempts abandoned with an error
    pub failed: AtomicU64,
    pub proof_timeouts: AtomicU64,
    /// Attempts that lost the validation race
    pub replay_rejections: AtomicU64,
}

impl RelayerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_seen(&self) {
        self.notifications_seen.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_relayed(&self, chained: bool) {
        self.relayed.fetch_add(1, Ordering::Relaxed);
        if chained {
            self.chained.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.proof_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_replay(&self) {
        self.replay_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RelayerMetricsSnapshot {
        RelayerMetricsSnapshot {
            notifications_seen: self.notifications_seen.load(Ordering::Relaxed),
            relayed: self.relayed.load(Ordering::Relaxed),
            chained: self.chained.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            proof_timeouts: self.proof_timeouts.load(Ordering::Relaxed),
            replay_rejections: self.replay_rejections.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayerMetricsSnapshot {
    pub notifications_seen: u64,
    pub relayed: u64,
    pub chained: u64,
    pub failed: u64,
    pub proof_timeouts: u64,
    pub replay_rejections: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let metrics = RelayerMetrics::new();
        metrics.record_seen();
        metrics.record_seen();
        metrics.record_relayed(true);
        metrics.record_relayed(false);
        metrics.record_failed();
        metrics.record_replay();

        let snapshot = metrics.snapshot();

        assert_eq!(snapshot.notifications_seen, 2);
        assert_eq!(snapshot.relayed, 2);
        assert_eq!(snapshot.chained, 1);
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.replay_rejections, 1);
        assert_eq!(snapshot.proof_timeouts, 0);
    }
}
