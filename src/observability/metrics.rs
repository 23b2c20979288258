//! Metrics registry for shardrelay
//!
//! - Counters only
//! - Monotonic increase
//! - Reset only on process start

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Operational counters shared by every subsystem of a node.
///
/// Relaxed ordering throughout; counters are informational.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    statements_executed: AtomicU64,
    statements_failed: AtomicU64,
    statements_rejected: AtomicU64,
    broadcasts: AtomicU64,
    deliveries: AtomicU64,
    delivery_failures: AtomicU64,
    evictions: AtomicU64,
    forwards: AtomicU64,
    sessions_opened: AtomicU64,
    sessions_closed: AtomicU64,
    full_syncs_served: AtomicU64,
    sync_statements_applied: AtomicU64,
    sync_statements_failed: AtomicU64,
    shard_assignments: AtomicU64,
}

impl MetricsRegistry {
    /// Create a new metrics registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    // Statements

    pub fn increment_statements_executed(&self) {
        self.statements_executed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_statements_failed(&self) {
        self.statements_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_statements_rejected(&self) {
        self.statements_rejected.fetch_add(1, Ordering::Relaxed);
    }

    // Replication

    pub fn increment_broadcasts(&self) {
        self.broadcasts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_deliveries(&self, count: u64) {
        self.deliveries.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_delivery_failures(&self, count: u64) {
        self.delivery_failures.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_evictions(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_forwards(&self) {
        self.forwards.fetch_add(1, Ordering::Relaxed);
    }

    // Sessions

    pub fn increment_sessions_opened(&self) {
        self.sessions_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_sessions_closed(&self) {
        self.sessions_closed.fetch_add(1, Ordering::Relaxed);
    }

    // Full sync

    pub fn increment_full_syncs_served(&self) {
        self.full_syncs_served.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_sync_statements_applied(&self, count: u64) {
        self.sync_statements_applied
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_sync_statements_failed(&self, count: u64) {
        self.sync_statements_failed.fetch_add(count, Ordering::Relaxed);
    }

    // Sharding

    pub fn increment_shard_assignments(&self) {
        self.shard_assignments.fetch_add(1, Ordering::Relaxed);
    }

    /// Get all metrics as a snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            statements_executed: self.statements_executed.load(Ordering::Relaxed),
            statements_failed: self.statements_failed.load(Ordering::Relaxed),
            statements_rejected: self.statements_rejected.load(Ordering::Relaxed),
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            forwards: self.forwards.load(Ordering::Relaxed),
            sessions_opened: self.sessions_opened.load(Ordering::Relaxed),
            sessions_closed: self.sessions_closed.load(Ordering::Relaxed),
            full_syncs_served: self.full_syncs_served.load(Ordering::Relaxed),
            sync_statements_applied: self.sync_statements_applied.load(Ordering::Relaxed),
            sync_statements_failed: self.sync_statements_failed.load(Ordering::Relaxed),
            shard_assignments: self.shard_assignments.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of all metrics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub statements_executed: u64,
    pub statements_failed: u64,
    pub statements_rejected: u64,
    pub broadcasts: u64,
    pub deliveries: u64,
    pub delivery_failures: u64,
    pub evictions: u64,
    pub forwards: u64,
    pub sessions_opened: u64,
    pub sessions_closed: u64,
    pub full_syncs_served: u64,
    pub sync_statements_applied: u64,
    pub sync_statements_failed: u64,
    pub shard_assignments: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_registry_has_zero_values() {
        let snapshot = MetricsRegistry::new().snapshot();
        assert_eq!(snapshot.statements_executed, 0);
        assert_eq!(snapshot.broadcasts, 0);
        assert_eq!(snapshot.sessions_opened, 0);
    }

    #[test]
    fn test_increment_counters() {
        let registry = MetricsRegistry::new();

        registry.increment_statements_executed();
        registry.increment_statements_executed();
        registry.increment_statements_rejected();
        registry.increment_broadcasts();
        registry.add_deliveries(3);
        registry.add_delivery_failures(1);
        registry.add_sync_statements_applied(10);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.statements_executed, 2);
        assert_eq!(snapshot.statements_rejected, 1);
        assert_eq!(snapshot.broadcasts, 1);
        assert_eq!(snapshot.deliveries, 3);
        assert_eq!(snapshot.delivery_failures, 1);
        assert_eq!(snapshot.sync_statements_applied, 10);
    }

    #[test]
    fn test_snapshot_serializes() {
        let registry = MetricsRegistry::new();
        registry.increment_full_syncs_served();

        let json = serde_json::to_value(registry.snapshot()).unwrap();
        assert_eq!(json["full_syncs_served"], 1);
    }

    #[test]
    fn test_thread_safety() {
        use std::sync::Arc;
        use std::thread;

        let registry = Arc::new(MetricsRegistry::new());
        let mut handles = vec![];

        for _ in 0..10 {
            let reg = Arc::clone(&registry);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    reg.increment_statements_executed();
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.snapshot().statements_executed, 1000);
    }
}
