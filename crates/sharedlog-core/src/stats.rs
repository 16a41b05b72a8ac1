use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;

use crate::operation::Operation;
use crate::traits::OperationRecorder;

const OPERATION_KINDS: usize = Operation::ALL.len();
const DEFAULT_MAX_SAMPLES: usize = 1000;

#[derive(Debug, Default)]
struct Counters {
    requests: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
}

/// Bounded window of recent latencies for one operation kind.
#[derive(Debug, Default)]
struct LatencyWindow {
    samples: VecDeque<Duration>,
}

impl LatencyWindow {
    fn record(&mut self, duration: Duration, max_samples: usize) {
        if self.samples.len() >= max_samples {
            self.samples.pop_front();
        }
        self.samples.push_back(duration);
    }

    fn avg(&self) -> Option<Duration> {
        if self.samples.is_empty() {
            None
        } else {
            let total: Duration = self.samples.iter().sum();
            Some(total / self.samples.len() as u32)
        }
    }

    fn percentile(&self, p: usize) -> Option<Duration> {
        if self.samples.is_empty() {
            return None;
        }
        let mut sorted: Vec<_> = self.samples.iter().copied().collect();
        sorted.sort();
        let idx = (sorted.len() * p / 100).min(sorted.len() - 1);
        Some(sorted[idx])
    }
}

/// Per-operation request statistics of one stressor (or a whole node).
#[derive(Debug)]
pub struct OperationStats {
    counters: [Counters; OPERATION_KINDS],
    latencies: Mutex<[LatencyWindow; OPERATION_KINDS]>,
    max_samples: usize,
}

impl Default for OperationStats {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationStats {
    pub fn new() -> Self {
        Self::with_max_samples(DEFAULT_MAX_SAMPLES)
    }

    pub fn with_max_samples(max_samples: usize) -> Self {
        OperationStats {
            counters: Default::default(),
            latencies: Mutex::new(Default::default()),
            max_samples: max_samples.max(1),
        }
    }

    fn record_latency(&self, operation: Operation, elapsed: Duration) {
        self.latencies.lock()[operation.index()].record(elapsed, self.max_samples);
    }

    /// Get a snapshot of the current statistics, one row per operation kind
    /// that saw at least one request.
    pub fn snapshot(&self) -> StatsSnapshot {
        let latencies = self.latencies.lock();
        let operations = Operation::ALL
            .iter()
            .filter_map(|op| {
                let counters = &self.counters[op.index()];
                let requests = counters.requests.load(Ordering::Relaxed);
                if requests == 0 {
                    return None;
                }
                let window = &latencies[op.index()];
                Some(OperationCounters {
                    operation: *op,
                    requests,
                    hits: counters.hits.load(Ordering::Relaxed),
                    misses: counters.misses.load(Ordering::Relaxed),
                    errors: counters.errors.load(Ordering::Relaxed),
                    latency_avg_us: window.avg().map(|d| d.as_micros() as f64),
                    latency_p99_us: window.percentile(99).map(|d| d.as_micros() as f64),
                })
            })
            .collect();
        StatsSnapshot { operations }
    }

    /// Reset all statistics to zero.
    pub fn reset(&self) {
        for counters in &self.counters {
            counters.requests.store(0, Ordering::Relaxed);
            counters.hits.store(0, Ordering::Relaxed);
            counters.misses.store(0, Ordering::Relaxed);
            counters.errors.store(0, Ordering::Relaxed);
        }
        for window in self.latencies.lock().iter_mut() {
            window.samples.clear();
        }
    }
}

impl OperationRecorder for OperationStats {
    fn record_success(&self, elapsed: Duration, operation: Operation, hit: bool) {
        let counters = &self.counters[operation.index()];
        counters.requests.fetch_add(1, Ordering::Relaxed);
        if hit {
            counters.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            counters.misses.fetch_add(1, Ordering::Relaxed);
        }
        self.record_latency(operation, elapsed);
    }

    fn record_error(&self, elapsed: Duration, operation: Operation) {
        let counters = &self.counters[operation.index()];
        counters.requests.fetch_add(1, Ordering::Relaxed);
        counters.errors.fetch_add(1, Ordering::Relaxed);
        self.record_latency(operation, elapsed);
    }
}

/// Counters of a single operation kind.
#[derive(Debug, Clone, Serialize)]
pub struct OperationCounters {
    pub operation: Operation,
    pub requests: u64,
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
    pub latency_avg_us: Option<f64>,
    pub latency_p99_us: Option<f64>,
}

impl OperationCounters {
    /// Share of successful requests that found a value or matched the
    /// precondition, as a percentage.
    pub fn hit_ratio(&self) -> f64 {
        let answered = self.hits + self.misses;
        if answered == 0 {
            0.0
        } else {
            (self.hits as f64 / answered as f64) * 100.0
        }
    }

    /// Error rate as a percentage of all requests.
    pub fn error_rate(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            (self.errors as f64 / self.requests as f64) * 100.0
        }
    }
}

/// A point-in-time snapshot of operation statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatsSnapshot {
    pub operations: Vec<OperationCounters>,
}

impl StatsSnapshot {
    pub fn get(&self, operation: Operation) -> Option<&OperationCounters> {
        self.operations.iter().find(|c| c.operation == operation)
    }

    /// Get total requests across all kinds.
    pub fn total_requests(&self) -> u64 {
        self.operations.iter().map(|c| c.requests).sum()
    }

    /// Get total errors across all kinds.
    pub fn total_errors(&self) -> u64 {
        self.operations.iter().map(|c| c.errors).sum()
    }

    /// Fold another snapshot into this one. Latencies of merged rows keep the
    /// worse of both values.
    pub fn merge(&mut self, other: &StatsSnapshot) {
        for row in &other.operations {
            match self
                .operations
                .iter_mut()
                .find(|c| c.operation == row.operation)
            {
                Some(existing) => {
                    existing.requests += row.requests;
                    existing.hits += row.hits;
                    existing.misses += row.misses;
                    existing.errors += row.errors;
                    existing.latency_avg_us = max_opt(existing.latency_avg_us, row.latency_avg_us);
                    existing.latency_p99_us = max_opt(existing.latency_p99_us, row.latency_p99_us);
                }
                None => self.operations.push(row.clone()),
            }
        }
        self.operations.sort_by_key(|c| c.operation);
    }
}

fn max_opt(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

/// Shared statistics instance.
pub type SharedStats = Arc<OperationStats>;

/// Create a new shared statistics instance.
pub fn create_stats() -> SharedStats {
    Arc::new(OperationStats::new())
}
