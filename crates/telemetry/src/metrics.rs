//! Internal metrics collection.
//!
//! Counters are updated on the hot path with relaxed atomics and read as a
//! point-in-time snapshot for logging.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A monotonically increasing counter.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A gauge metric (can go up or down).
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn set(&self, val: u64) {
        self.0.store(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Saturates at zero.
    pub fn dec(&self) {
        let _ = self
            .0
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| Some(v.saturating_sub(1)));
    }
}

/// Latency histogram with fixed millisecond buckets.
#[derive(Debug)]
pub struct Histogram {
    /// Buckets: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 5s, 10s
    buckets: [AtomicU64; 11],
    sum: AtomicU64,
    count: AtomicU64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    const BUCKET_BOUNDS: [u64; 11] = [1, 5, 10, 25, 50, 100, 250, 500, 1000, 5000, 10000];

    pub fn new() -> Self {
        Self {
            buckets: Default::default(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Records a value in milliseconds.
    pub fn observe(&self, ms: u64) {
        self.sum.fetch_add(ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        let idx = Self::BUCKET_BOUNDS
            .iter()
            .position(|&bound| ms <= bound)
            .unwrap_or(Self::BUCKET_BOUNDS.len() - 1);
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn mean(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            0.0
        } else {
            self.sum.load(Ordering::Relaxed) as f64 / count as f64
        }
    }

    /// Returns (upper bound, count) per bucket.
    pub fn buckets(&self) -> Vec<(u64, u64)> {
        Self::BUCKET_BOUNDS
            .iter()
            .zip(self.buckets.iter())
            .map(|(&bound, count)| (bound, count.load(Ordering::Relaxed)))
            .collect()
    }
}

/// Collected metrics for the flow indexer.
#[derive(Debug, Default)]
pub struct Metrics {
    // Partition workers
    pub messages_consumed: Counter,
    pub messages_delivered: Counter,
    pub worker_errors: Counter,
    pub partitions_active: Gauge,

    // Offset checkpoints
    pub offsets_committed: Counter,
    pub offset_commit_errors: Counter,

    // Indexer stage
    pub records_decoded: Counter,
    pub decode_errors: Counter,
    pub enrich_errors: Counter,
    pub records_indexed: Counter,
    pub index_errors: Counter,
    pub index_latency_ms: Histogram,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            messages_consumed: self.messages_consumed.get(),
            messages_delivered: self.messages_delivered.get(),
            worker_errors: self.worker_errors.get(),
            partitions_active: self.partitions_active.get(),
            offsets_committed: self.offsets_committed.get(),
            offset_commit_errors: self.offset_commit_errors.get(),
            records_decoded: self.records_decoded.get(),
            decode_errors: self.decode_errors.get(),
            enrich_errors: self.enrich_errors.get(),
            records_indexed: self.records_indexed.get(),
            index_errors: self.index_errors.get(),
            index_latency_mean_ms: self.index_latency_ms.mean(),
        }
    }
}

/// A snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub messages_consumed: u64,
    pub messages_delivered: u64,
    pub worker_errors: u64,
    pub partitions_active: u64,
    pub offsets_committed: u64,
    pub offset_commit_errors: u64,
    pub records_decoded: u64,
    pub decode_errors: u64,
    pub enrich_errors: u64,
    pub records_indexed: u64,
    pub index_errors: u64,
    pub index_latency_mean_ms: f64,
}

impl MetricsSnapshot {
    /// Logs the snapshot as one structured event.
    pub fn log(&self) {
        tracing::info!(
            messages_consumed = self.messages_consumed,
            messages_delivered = self.messages_delivered,
            worker_errors = self.worker_errors,
            partitions_active = self.partitions_active,
            offsets_committed = self.offsets_committed,
            offset_commit_errors = self.offset_commit_errors,
            records_decoded = self.records_decoded,
            decode_errors = self.decode_errors,
            enrich_errors = self.enrich_errors,
            records_indexed = self.records_indexed,
            index_errors = self.index_errors,
            index_latency_mean_ms = self.index_latency_mean_ms,
            "Metrics snapshot"
        );
    }
}

/// Global metrics registry.
pub static METRICS: std::sync::LazyLock<Metrics> = std::sync::LazyLock::new(Metrics::new);

/// Get the global metrics instance.
pub fn metrics() -> &'static Metrics {
    &METRICS
}
