use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Per-worker counters of the write path.
///
/// A sustained overflow retry rate means `value_max_size` is too small for
/// the worker population and checker latency.
#[derive(Debug, Default)]
pub struct LogicStats {
    completed: AtomicU64,
    slots_written: AtomicU64,
    precondition_retries: AtomicU64,
    overflow_retries: AtomicU64,
    abandoned: AtomicU64,
    cleanups: AtomicU64,
    cleanup_failures: AtomicU64,
    quorum_queries: AtomicU64,
    partial_queries: AtomicU64,
}

/// Point-in-time copy of [`LogicStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LogicStatsSnapshot {
    /// Operations known to be durable.
    pub completed: u64,
    /// Successful conditional writes, including writes buffered in
    /// transactions that were later rolled back.
    pub slots_written: u64,
    pub precondition_retries: u64,
    pub overflow_retries: u64,
    pub abandoned: u64,
    pub cleanups: u64,
    pub cleanup_failures: u64,
    pub quorum_queries: u64,
    pub partial_queries: u64,
}

impl LogicStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_slot_written(&self) {
        self.slots_written.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_precondition_retry(&self) {
        self.precondition_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_overflow_retry(&self) {
        self.overflow_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_abandoned(&self) {
        self.abandoned.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cleanup(&self, removed: bool) {
        if removed {
            self.cleanups.fetch_add(1, Ordering::Relaxed);
        } else {
            self.cleanup_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_quorum_query(&self, partial: bool) {
        self.quorum_queries.fetch_add(1, Ordering::Relaxed);
        if partial {
            self.partial_queries.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> LogicStatsSnapshot {
        LogicStatsSnapshot {
            completed: self.completed.load(Ordering::Relaxed),
            slots_written: self.slots_written.load(Ordering::Relaxed),
            precondition_retries: self.precondition_retries.load(Ordering::Relaxed),
            overflow_retries: self.overflow_retries.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
            cleanups: self.cleanups.load(Ordering::Relaxed),
            cleanup_failures: self.cleanup_failures.load(Ordering::Relaxed),
            quorum_queries: self.quorum_queries.load(Ordering::Relaxed),
            partial_queries: self.partial_queries.load(Ordering::Relaxed),
        }
    }
}

impl LogicStatsSnapshot {
    /// Retries of either kind per durable operation.
    pub fn retry_rate(&self) -> f64 {
        if self.completed == 0 {
            return 0.0;
        }
        (self.precondition_retries + self.overflow_retries) as f64 / self.completed as f64
    }

    pub fn merge(&mut self, other: &LogicStatsSnapshot) {
        self.completed += other.completed;
        self.slots_written += other.slots_written;
        self.precondition_retries += other.precondition_retries;
        self.overflow_retries += other.overflow_retries;
        self.abandoned += other.abandoned;
        self.cleanups += other.cleanups;
        self.cleanup_failures += other.cleanup_failures;
        self.quorum_queries += other.quorum_queries;
        self.partial_queries += other.partial_queries;
    }
}
