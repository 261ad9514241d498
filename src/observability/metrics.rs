//! Operational counters
//!
//! - Counters only, monotonic
//! - Reset only on process start
//! - Relaxed ordering; exact totals, no cross-counter consistency

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Metrics registry shared by the fan-out engine and the field registry
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// Cross-partition operations started
    fanout_calls: AtomicU64,
    /// Individual partition calls issued by fan-out
    partition_probes: AtomicU64,
    /// Cross-partition operations aborted by a partition failure
    fanout_failures: AtomicU64,
    /// Alias lookups that probed partitions
    alias_lookups: AtomicU64,
    /// Documents changed by member updates and schema evolution
    documents_mutated: AtomicU64,
    /// Metadata writes that hit a uniqueness conflict
    metadata_conflicts: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_fanout_calls(&self) {
        self.fanout_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_partition_probes(&self) {
        self.partition_probes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_fanout_failures(&self) {
        self.fanout_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_alias_lookups(&self) {
        self.alias_lookups.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_documents_mutated(&self, count: u64) {
        self.documents_mutated.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_metadata_conflicts(&self) {
        self.metadata_conflicts.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            fanout_calls: self.fanout_calls.load(Ordering::Relaxed),
            partition_probes: self.partition_probes.load(Ordering::Relaxed),
            fanout_failures: self.fanout_failures.load(Ordering::Relaxed),
            alias_lookups: self.alias_lookups.load(Ordering::Relaxed),
            documents_mutated: self.documents_mutated.load(Ordering::Relaxed),
            metadata_conflicts: self.metadata_conflicts.load(Ordering::Relaxed),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.snapshot()).unwrap_or_else(|_| "{}".to_string())
    }
}

/// A point-in-time snapshot of all metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub fanout_calls: u64,
    pub partition_probes: u64,
    pub fanout_failures: u64,
    pub alias_lookups: u64,
    pub documents_mutated: u64,
    pub metadata_conflicts: u64,
}
