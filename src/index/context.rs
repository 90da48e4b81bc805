//! `IndexContext`: per-query scratch state for HNSW/flat search (spec §5-§6).
//!
//! One context is reused across many queries from the same thread; `reset`
//! clears the visited bitmap and heaps between calls instead of
//! reallocating them, matching the teacher's `SearchContext` in
//! `index/hnsw/native/search_context.rs`.

use crate::containers::{Bitset, BoundedHeap};
use crate::index::scored::Scored;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Counters a single search accumulates, surfaced for diagnostics/tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextStats {
    /// Candidate nodes popped off the frontier.
    pub nodes_visited: u64,
    /// Distance evaluations performed (cheap + full, for RaBitQ two-shot search).
    pub distance_evals: u64,
    /// Full-precision re-scores triggered by a RaBitQ refine step.
    pub refines: u64,
}

/// Per-thread scratch used by a single flat or HNSW search call.
///
/// `candidates` is a min-heap of the search frontier (best-first expansion);
/// `results` is a [`BoundedHeap`] capped at `topk`, evicting its current
/// worst (greatest-distance) member as better candidates arrive.
pub struct IndexContext {
    /// Candidate list size / beam width for graph search.
    pub ef: usize,
    /// Number of results requested.
    pub topk: usize,
    /// Per-query visited-node bitmap. Reset on every call to [`Self::reset`].
    pub visited: Bitset,
    candidates: BinaryHeap<Reverse<Scored<u32>>>,
    results: BoundedHeap<Scored<u32>>,
    /// Counters accumulated by the current/last search.
    pub stats: ContextStats,
    /// Optional per-id admissibility filter; rejected ids are never placed
    /// into `results` but may still be expanded as graph hops.
    pub filter: Option<Box<dyn Fn(u64) -> bool + Send>>,
    /// Optional id -> group-key mapping for grouped top-k (spec §5 "group-by").
    pub group_by: Option<Box<dyn Fn(u64) -> u64 + Send>>,
    /// Maximum number of distinct groups to retain, when `group_by` is set.
    pub group_num: Option<usize>,
    /// Maximum results retained per group, when `group_by` is set.
    pub group_topk: Option<usize>,
    /// Enables extra bookkeeping (e.g. visit order) for test/debug builds.
    pub debug: bool,
    /// Caller-configured cap on visited candidates (spec §5 cancellation);
    /// `None` means unbounded.
    pub scan_limit: Option<usize>,
}

impl IndexContext {
    /// Builds a context sized for `ef`-wide beams and `topk` results.
    #[must_use]
    pub fn new(ef: usize, topk: usize) -> Self {
        Self {
            ef,
            topk,
            visited: Bitset::new(),
            candidates: BinaryHeap::new(),
            results: BoundedHeap::new(topk.max(ef)),
            stats: ContextStats::default(),
            filter: None,
            group_by: None,
            group_num: None,
            group_topk: None,
            debug: false,
            scan_limit: None,
        }
    }

    /// Whether this query has visited at least `scan_limit` candidates and
    /// should stop expanding the frontier, returning a partial heap.
    #[must_use]
    pub fn reach_scan_limit(&self) -> bool {
        self.scan_limit.is_some_and(|limit| self.stats.nodes_visited as usize >= limit)
    }

    /// Records one frontier expansion against `stats.nodes_visited`.
    pub fn record_visit(&mut self) {
        self.stats.nodes_visited += 1;
    }

    /// Clears all per-query state, keeping allocated capacity for reuse.
    pub fn reset(&mut self) {
        self.visited.clear();
        self.candidates.clear();
        self.results = BoundedHeap::new(self.topk.max(self.ef));
        self.stats = ContextStats::default();
    }

    /// Pushes a frontier candidate to expand next.
    pub fn push_candidate(&mut self, dist: f32, id: u32) {
        self.candidates.push(Reverse(Scored::new(dist, id)));
    }

    /// Pops the closest unexpanded candidate.
    pub fn pop_candidate(&mut self) -> Option<Scored<u32>> {
        self.candidates.pop().map(|Reverse(s)| s)
    }

    /// The closest unexpanded candidate's distance, without popping it.
    #[must_use]
    pub fn peek_candidate_dist(&self) -> Option<f32> {
        self.candidates.peek().map(|Reverse(s)| s.dist)
    }

    /// Whether the frontier has been fully drained.
    #[must_use]
    pub fn candidates_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Offers `id` at `dist` as a result. Runs `filter` first if set (a
    /// rejected id is never retained, though it may still have been expanded
    /// as a graph hop before reaching here). Returns whether it was kept.
    pub fn offer_result(&mut self, dist: f32, id: u32, external_id: u64) -> bool {
        if let Some(filter) = &self.filter {
            if !filter(external_id) {
                return false;
            }
        }
        self.results.push(Scored::new(dist, id))
    }

    /// The current worst (greatest) distance retained in `results`, used to
    /// prune the frontier once `results` is full: once the closest remaining
    /// candidate can't beat this, search can stop (spec §5 termination rule).
    #[must_use]
    pub fn worst_result_dist(&self) -> Option<f32> {
        self.results.peek_worst().map(|s| s.dist)
    }

    /// Whether `results` is at its configured capacity.
    #[must_use]
    pub fn results_full(&self) -> bool {
        self.results.is_full()
    }

    /// Drains `results` into ascending (best-first) order.
    pub fn take_results(&mut self) -> Vec<Scored<u32>> {
        std::mem::replace(&mut self.results, BoundedHeap::new(self.topk.max(self.ef))).into_sorted_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidates_pop_in_ascending_distance_order() {
        let mut ctx = IndexContext::new(10, 5);
        ctx.push_candidate(3.0, 1);
        ctx.push_candidate(1.0, 2);
        ctx.push_candidate(2.0, 3);
        assert_eq!(ctx.pop_candidate().unwrap().id, 2);
        assert_eq!(ctx.pop_candidate().unwrap().id, 3);
        assert_eq!(ctx.pop_candidate().unwrap().id, 1);
        assert!(ctx.candidates_empty());
    }

    #[test]
    fn results_cap_at_topk_and_evict_worst() {
        let mut ctx = IndexContext::new(10, 2);
        assert!(ctx.offer_result(5.0, 1, 100));
        assert!(ctx.offer_result(1.0, 2, 101));
        assert!(ctx.offer_result(3.0, 3, 102));
        assert!(ctx.results_full());
        let results = ctx.take_results();
        assert_eq!(results.iter().map(|s| s.id).collect::<Vec<_>>(), vec![2, 3]);
    }

    #[test]
    fn filter_rejects_before_insertion() {
        let mut ctx = IndexContext::new(10, 5);
        ctx.filter = Some(Box::new(|id| id % 2 == 0));
        assert!(!ctx.offer_result(1.0, 1, 101));
        assert!(ctx.offer_result(1.0, 2, 102));
        assert_eq!(ctx.take_results().len(), 1);
    }

    #[test]
    fn reset_clears_visited_and_results() {
        let mut ctx = IndexContext::new(10, 5);
        ctx.visited.set(7);
        ctx.offer_result(1.0, 1, 101);
        ctx.push_candidate(1.0, 1);
        ctx.reset();
        assert!(!ctx.visited.test(7));
        assert!(ctx.candidates_empty());
        assert_eq!(ctx.take_results().len(), 0);
    }

    #[test]
    fn worst_result_dist_tracks_current_cap() {
        let mut ctx = IndexContext::new(10, 1);
        assert!(ctx.worst_result_dist().is_none());
        ctx.offer_result(5.0, 1, 101);
        assert_eq!(ctx.worst_result_dist(), Some(5.0));
        ctx.offer_result(2.0, 2, 102);
        assert_eq!(ctx.worst_result_dist(), Some(2.0));
    }
}
