//! Counters for cache activity.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Hook for counting cache activity.
///
/// Implementations must be cheap; they run on every read and write.
pub trait CacheMetrics: Send + Sync {
    /// Records a write; `admitted` is `false` for operations that do not
    /// participate in caching.
    fn write(&self, admitted: bool);

    /// Records a read; `cached` is `true` when a retained result was reused.
    fn read(&self, cached: bool);

    /// Records a read that reported missing fields.
    fn read_partial(&self);

    /// Records operations dropped by an LRU rotation or explicit eviction.
    fn operations_evicted(&self, count: usize);

    /// Records a garbage collection and the number of node keys it reclaimed.
    fn gc(&self, reclaimed: usize);
}

/// A [`CacheMetrics`] implementation that discards everything.
#[derive(Default)]
pub struct NoopMetrics;

impl CacheMetrics for NoopMetrics {
    fn write(&self, _admitted: bool) {}
    fn read(&self, _cached: bool) {}
    fn read_partial(&self) {}
    fn operations_evicted(&self, _count: usize) {}
    fn gc(&self, _reclaimed: usize) {}
}

/// Atomic counters for every [`CacheMetrics`] event.
#[derive(Default)]
pub struct CounterMetrics {
    /// Writes admitted to the forest.
    pub writes_admitted: AtomicU64,

    /// Writes for operations that are not cached.
    pub writes_skipped: AtomicU64,

    /// Reads served from a retained result.
    pub read_hits: AtomicU64,

    /// Reads that walked the forest.
    pub read_misses: AtomicU64,

    /// Reads with at least one missing field.
    pub partial_reads: AtomicU64,

    /// Operations evicted.
    pub operations_evicted: AtomicU64,

    /// Garbage collections run.
    pub gc_runs: AtomicU64,

    /// Node keys reclaimed by garbage collection.
    pub nodes_reclaimed: AtomicU64,
}

impl CacheMetrics for CounterMetrics {
    fn write(&self, admitted: bool) {
        if admitted {
            self.writes_admitted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.writes_skipped.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn read(&self, cached: bool) {
        if cached {
            self.read_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.read_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn read_partial(&self) {
        self.partial_reads.fetch_add(1, Ordering::Relaxed);
    }

    fn operations_evicted(&self, count: usize) {
        self.operations_evicted
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    fn gc(&self, reclaimed: usize) {
        self.gc_runs.fetch_add(1, Ordering::Relaxed);
        self.nodes_reclaimed
            .fetch_add(reclaimed as u64, Ordering::Relaxed);
    }
}

/// Returns the default metrics implementation, [`NoopMetrics`].
pub fn default_metrics() -> Arc<dyn CacheMetrics> {
    Arc::new(NoopMetrics)
}
