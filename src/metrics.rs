//! Explicit metrics object.
//!
//! Replaces the static global counters the original implementation favoured
//! (see `DESIGN.md`) with a plain struct that owners construct and pass into
//! the components that need it. Nothing here is process-wide or `static`.

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters shared by a buffer pool, index, or streamer.
///
/// Cheap to clone (it is typically wrapped in an `Arc` by the owner) and safe
/// to update from multiple threads concurrently.
#[derive(Debug, Default)]
pub struct Metrics {
    blocks_loaded: AtomicU64,
    blocks_evicted: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    queries_served: AtomicU64,
    candidates_visited: AtomicU64,
    refinements_performed: AtomicU64,
}

impl Metrics {
    /// Creates a fresh, zeroed metrics object.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a block materialised from disk into the buffer pool.
    pub fn record_block_loaded(&self) {
        self.blocks_loaded.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a block evicted from the buffer pool.
    pub fn record_block_evicted(&self) {
        self.blocks_evicted.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a buffer-pool cache hit.
    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a buffer-pool cache miss.
    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one completed query (flat brute-force or HNSW search).
    pub fn record_query(&self) {
        self.queries_served.fetch_add(1, Ordering::Relaxed);
    }

    /// Adds to the running count of graph/candidate visits during search.
    pub fn add_candidates_visited(&self, n: u64) {
        self.candidates_visited.fetch_add(n, Ordering::Relaxed);
    }

    /// Records a RaBitQ full-distance refinement.
    pub fn record_refinement(&self) {
        self.refinements_performed.fetch_add(1, Ordering::Relaxed);
    }

    /// Takes a point-in-time, plain-data snapshot of all counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            blocks_loaded: self.blocks_loaded.load(Ordering::Relaxed),
            blocks_evicted: self.blocks_evicted.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            queries_served: self.queries_served.load(Ordering::Relaxed),
            candidates_visited: self.candidates_visited.load(Ordering::Relaxed),
            refinements_performed: self.refinements_performed.load(Ordering::Relaxed),
        }
    }
}

/// Plain-data snapshot of [`Metrics`], suitable for export by the host
/// application (this crate does not itself wire up Prometheus/OTel).
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Blocks newly materialised from disk.
    pub blocks_loaded: u64,
    /// Blocks evicted to make room for new ones.
    pub blocks_evicted: u64,
    /// Buffer-pool acquire calls that hit an already-resident block.
    pub cache_hits: u64,
    /// Buffer-pool acquire calls that required a read.
    pub cache_misses: u64,
    /// Completed top-k queries.
    pub queries_served: u64,
    /// Cumulative candidates visited across all queries.
    pub candidates_visited: u64,
    /// RaBitQ full-distance refinements performed.
    pub refinements_performed: u64,
}

impl MetricsSnapshot {
    /// Cache hit rate in `[0.0, 1.0]`; `0.0` when no acquires have happened yet.
    #[must_use]
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }
}
