//! The HNSW graph algorithm (spec §4.8): insert and search over
//! [`NodeStore`], grounded on the teacher's `index/hnsw/native/graph.rs`
//! (`NativeHnsw::insert`/`search`/`search_layer`/`select_neighbors`).
//!
//! Two deliberate departures from the teacher, recorded in `DESIGN.md`:
//! - Vectors are raw bytes under a [`crate::distance::IndexMetric`] rather
//!   than `Vec<f32>`, so the graph is generic over every registered dtype.
//! - `select_neighbors` drops the teacher's VAMANA `alpha` diversification
//!   knob (fixed at `1.0`), since spec only describes the plain Malkov
//!   RNG-pruning heuristic.

use super::node_store::{NodeId, NodeStore, INVALID_NODE_ID};
use super::{ADJACENCY_SEG_ID, BODY_SEG_ID, HEADER_SEG_ID, KEYS_SEG_ID, LEVELS_SEG_ID, META_SEG_ID};
use crate::containers::Bitset;
use crate::distance::IndexMetric;
use crate::error::{Error, Result};
use crate::index::context::IndexContext;
use crate::index::meta::IndexMeta;
use crate::index::scored::Scored;
use crate::rng::Rng;
use crate::storage::dumper::IndexDumper;
use crate::storage::traits::Storage;
use parking_lot::Mutex;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Construction/search parameters for one graph (spec §4.8 `M`/`efConstruction`).
#[derive(Debug, Clone, Copy)]
pub struct HnswParams {
    /// Max neighbours per node at level 0.
    pub m: usize,
    /// Construction-time beam width.
    pub ef_construction: usize,
    /// Optional cap on total vector + adjacency bytes held by the graph.
    pub memory_budget_bytes: Option<usize>,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self { m: 16, ef_construction: 100, memory_budget_bytes: None }
    }
}

impl From<&crate::config::HnswConfig> for HnswParams {
    /// `upper_neighbor_count`/`scaling_factor` aren't carried: both are
    /// already derived from `m` by [`HnswGraph::max_conn`]/`level_mult`, and
    /// `ef` is a per-query beam width supplied through [`IndexContext`], not
    /// a construction parameter.
    fn from(cfg: &crate::config::HnswConfig) -> Self {
        Self { m: cfg.max_neighbor_count, ef_construction: cfg.ef_construction, memory_budget_bytes: None }
    }
}

/// A multi-level proximity graph over vectors of one [`IndexMeta`].
pub struct HnswGraph {
    meta: IndexMeta,
    metric: IndexMetric,
    nodes: NodeStore,
    params: HnswParams,
    level_mult: f64,
    rng: Mutex<Rng>,
    memory_used: AtomicUsize,
}

fn estimated_node_bytes(vector_len: usize, level: usize, m: usize) -> usize {
    vector_len + (level + 1) * m * std::mem::size_of::<NodeId>()
}

/// Fixed-width header written before the serialised [`IndexMeta`], mirroring
/// `flat::builder::Header` (spec §6: "Flat and HNSW segments follow the same
/// `append(id, …)` framing with their own ids").
struct Header {
    count: u64,
    dim: u64,
    element_size: u64,
    m: u64,
    ef_construction: u64,
    /// `u64::MAX` stands for `None`.
    memory_budget_bytes: u64,
}

impl Header {
    const ENCODED_LEN: usize = 48;

    fn encode(&self) -> [u8; Self::ENCODED_LEN] {
        let mut out = [0u8; Self::ENCODED_LEN];
        out[0..8].copy_from_slice(&self.count.to_le_bytes());
        out[8..16].copy_from_slice(&self.dim.to_le_bytes());
        out[16..24].copy_from_slice(&self.element_size.to_le_bytes());
        out[24..32].copy_from_slice(&self.m.to_le_bytes());
        out[32..40].copy_from_slice(&self.ef_construction.to_le_bytes());
        out[40..48].copy_from_slice(&self.memory_budget_bytes.to_le_bytes());
        out
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::ENCODED_LEN {
            return Err(Error::InvalidFormat(format!("hnsw header must be {} bytes", Self::ENCODED_LEN)));
        }
        let field = |range: std::ops::Range<usize>| u64::from_le_bytes(bytes[range].try_into().unwrap());
        Ok(Self {
            count: field(0..8),
            dim: field(8..16),
            element_size: field(16..24),
            m: field(24..32),
            ef_construction: field(32..40),
            memory_budget_bytes: field(40..48),
        })
    }
}

impl HnswGraph {
    /// Builds an empty graph. `seed` drives both level assignment and
    /// anything else this graph needs a PRNG for.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `params.m == 0` or no kernel is
    /// registered for `meta.data_type`/`meta.metric`.
    pub fn new(meta: IndexMeta, params: HnswParams, seed: u64) -> Result<Self> {
        if params.m == 0 {
            return Err(Error::InvalidArgument("HNSW M must be >= 1".into()));
        }
        let metric = IndexMetric::new(meta.data_type, meta.metric)?;
        let level_mult = 1.0 / (params.m as f64).ln();
        Ok(Self {
            meta,
            metric,
            nodes: NodeStore::new(),
            params,
            level_mult,
            rng: Mutex::new(Rng::new(seed)),
            memory_used: AtomicUsize::new(0),
        })
    }

    /// As [`Self::new`], taking `m`/`ef_construction` from a loaded
    /// [`crate::config::HnswConfig`] rather than a literal [`HnswParams`].
    ///
    /// # Errors
    ///
    /// See [`Self::new`].
    pub fn from_config(meta: IndexMeta, cfg: &crate::config::HnswConfig, seed: u64) -> Result<Self> {
        Self::new(meta, HnswParams::from(cfg), seed)
    }

    /// Number of nodes in the graph.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Draws `lvl ~ floor(-ln(U(0,1)) / ln(M))` (spec §4.8).
    fn random_level(&self) -> usize {
        let u = self.rng.lock().next_f64().max(f64::MIN_POSITIVE);
        (-u.ln() * self.level_mult).floor() as usize
    }

    fn max_conn(&self, level: usize) -> usize {
        if level == 0 {
            self.params.m
        } else {
            (self.params.m / 2).max(1)
        }
    }

    fn distance_to(&self, query: &[u8], node: NodeId) -> f32 {
        self.nodes
            .with_vector(node, |v| self.metric.distance(query, v, self.meta.dim))
            .unwrap_or(f32::INFINITY)
    }

    /// Inserts `vector` (raw bytes, `meta.element_size()` long) under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoMemory`] if `params.memory_budget_bytes` would be
    /// exceeded by this node (checked before the node is stored).
    pub fn insert(&self, key: u64, vector: Box<[u8]>) -> Result<NodeId> {
        let level = self.random_level();
        let added = estimated_node_bytes(vector.len(), level, self.params.m);
        if let Some(budget) = self.params.memory_budget_bytes {
            let projected = self.memory_used.load(Ordering::Relaxed) + added;
            if projected > budget {
                tracing::warn!(key, projected, budget, "insert rejected, memory budget exceeded");
                return Err(Error::NoMemory(format!(
                    "HNSW graph would exceed memory budget ({projected} > {budget} bytes)"
                )));
            }
        }

        let (ep, ep_level) = self.nodes.entry_point();
        let id = self.nodes.insert(key, vector, level);
        self.memory_used.fetch_add(added, Ordering::Relaxed);

        if ep == INVALID_NODE_ID {
            self.nodes.maybe_update_entry_point(id, level);
            return Ok(id);
        }

        let mut current_ep = ep;
        for lvl in (level + 1..=ep_level).rev() {
            current_ep = self.search_layer_single(id, current_ep, lvl);
        }

        for lvl in (0..=level).rev() {
            let candidates = self.beam_search(id, &[current_ep], self.params.ef_construction, lvl);
            let max_conn = self.max_conn(lvl);
            let selected = self.select_neighbors(&candidates, max_conn);
            self.nodes.set_neighbors(id, lvl, selected.clone());
            for &neighbor in &selected {
                self.add_bidirectional_connection(id, neighbor, lvl, max_conn);
            }
            if let Some(closest) = candidates.first() {
                current_ep = closest.id;
            }
        }

        self.nodes.maybe_update_entry_point(id, level);
        Ok(id)
    }

    /// Writes `(header, meta, keys, levels, body, adjacency)` segments to
    /// `writer` and returns it once every segment is closed (spec §6).
    ///
    /// # Errors
    ///
    /// Returns [`Error::WriteData`] on an underlying I/O failure, or
    /// [`Error::Internal`] if `meta` can't be serialised.
    pub fn dump<W: Write>(&self, writer: W) -> Result<W> {
        let count = self.nodes.len();
        let stride = self.meta.element_size();
        let mut dumper = IndexDumper::new(writer);

        dumper.write(
            &Header {
                count: count as u64,
                dim: self.meta.dim as u64,
                element_size: stride as u64,
                m: self.params.m as u64,
                ef_construction: self.params.ef_construction as u64,
                memory_budget_bytes: self.params.memory_budget_bytes.map_or(u64::MAX, |b| b as u64),
            }
            .encode(),
        );
        dumper.append(HEADER_SEG_ID)?;

        let meta_bytes = bincode::serialize(&self.meta).map_err(|e| Error::Internal(e.to_string()))?;
        dumper.write(&meta_bytes);
        dumper.append(META_SEG_ID)?;

        for id in 0..count as NodeId {
            let key = self.nodes.key_of(id).unwrap_or(0);
            dumper.write(&key.to_le_bytes());
        }
        dumper.append(KEYS_SEG_ID)?;

        for id in 0..count as NodeId {
            let level = self.nodes.level_of(id).unwrap_or(0) as u32;
            dumper.write(&level.to_le_bytes());
        }
        dumper.append(LEVELS_SEG_ID)?;

        for id in 0..count as NodeId {
            self.nodes.with_vector(id, |v| dumper.write(v));
        }
        dumper.append(BODY_SEG_ID)?;

        for id in 0..count as NodeId {
            let level = self.nodes.level_of(id).unwrap_or(0);
            for lvl in 0..=level {
                let neighbors = self.nodes.neighbors(id, lvl);
                dumper.write(&(neighbors.len() as u32).to_le_bytes());
                for &n in neighbors.iter() {
                    dumper.write(&n.to_le_bytes());
                }
            }
        }
        dumper.append(ADJACENCY_SEG_ID)?;

        dumper.finish()
    }

    /// Reconstructs a graph from a dumped segment file by replaying every
    /// node through [`NodeStore::insert`]/[`NodeStore::set_neighbors`] in
    /// original id order, then recomputing the entry point the same way
    /// [`Self::insert`] does (spec §6). `seed` drives the reopened graph's
    /// PRNG for any inserts after open; it is not itself persisted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFormat`] if the header, `meta`, or a fixed-
    /// width segment's length disagrees with the header's `count`, or
    /// [`Error::NoExist`] if a required segment is missing.
    pub fn open(storage: Arc<dyn Storage>, seed: u64) -> Result<Self> {
        let header = Header::decode(storage.segment(HEADER_SEG_ID)?)?;
        let meta: IndexMeta = bincode::deserialize(storage.segment(META_SEG_ID)?)
            .map_err(|e| Error::InvalidFormat(e.to_string()))?;

        let memory_budget_bytes =
            if header.memory_budget_bytes == u64::MAX { None } else { Some(header.memory_budget_bytes as usize) };
        let params = HnswParams {
            m: header.m as usize,
            ef_construction: header.ef_construction as usize,
            memory_budget_bytes,
        };
        let graph = Self::new(meta, params, seed)?;

        let count = header.count as usize;
        let stride = header.element_size as usize;
        let keys = storage.segment(KEYS_SEG_ID)?;
        let levels = storage.segment(LEVELS_SEG_ID)?;
        let body = storage.segment(BODY_SEG_ID)?;
        let adjacency = storage.segment(ADJACENCY_SEG_ID)?;

        if keys.len() != count * 8 || levels.len() != count * 4 || body.len() != count * stride {
            return Err(Error::InvalidFormat("hnsw segment lengths don't match header count".into()));
        }

        let mut node_levels = Vec::with_capacity(count);
        for id in 0..count {
            let key = u64::from_le_bytes(keys[id * 8..id * 8 + 8].try_into().unwrap());
            let level = u32::from_le_bytes(levels[id * 4..id * 4 + 4].try_into().unwrap()) as usize;
            let vector: Box<[u8]> = body[id * stride..(id + 1) * stride].into();
            let assigned = graph.nodes.insert(key, vector, level);
            debug_assert_eq!(assigned as usize, id, "open must replay nodes in original id order");
            node_levels.push(level);
        }

        let mut cursor = 0usize;
        let read_u32 = |adjacency: &[u8], cursor: &mut usize| -> Result<u32> {
            if *cursor + 4 > adjacency.len() {
                return Err(Error::InvalidFormat("truncated hnsw adjacency segment".into()));
            }
            let v = u32::from_le_bytes(adjacency[*cursor..*cursor + 4].try_into().unwrap());
            *cursor += 4;
            Ok(v)
        };

        for (id, &level) in node_levels.iter().enumerate() {
            for lvl in 0..=level {
                let n = read_u32(adjacency, &mut cursor)?;
                let mut neighbors = Vec::with_capacity(n as usize);
                for _ in 0..n {
                    neighbors.push(read_u32(adjacency, &mut cursor)?);
                }
                graph.nodes.set_neighbors(id as NodeId, lvl, neighbors);
            }
        }

        for (id, &level) in node_levels.iter().enumerate() {
            graph.nodes.maybe_update_entry_point(id as NodeId, level);
        }

        Ok(graph)
    }

    /// Greedy single-best descent on one layer, used both for multi-level
    /// descent above the insert/query's own level and in `search`'s
    /// width-1 phase.
    fn search_layer_single(&self, query_node: NodeId, entry: NodeId, level: usize) -> NodeId {
        let query = match self.node_vector_owned(query_node) {
            Some(v) => v,
            None => return entry,
        };
        self.search_layer_single_by_vector(&query, entry, level)
    }

    fn search_layer_single_by_vector(&self, query: &[u8], entry: NodeId, level: usize) -> NodeId {
        let mut best = entry;
        let mut best_dist = self.distance_to(query, entry);
        loop {
            let neighbors = self.nodes.neighbors(best, level);
            let mut improved = None;
            for &n in neighbors.iter() {
                let d = self.distance_to(query, n);
                if d < best_dist {
                    best_dist = d;
                    improved = Some(n);
                }
            }
            match improved {
                Some(n) => best = n,
                None => break,
            }
        }
        best
    }

    fn node_vector_owned(&self, id: NodeId) -> Option<Vec<u8>> {
        self.nodes.with_vector(id, <[u8]>::to_vec)
    }

    /// Construction-time beam search over one layer: visited bitmap plus a
    /// min-heap frontier and an `ef`-capped max-heap of results, returned
    /// sorted ascending by distance.
    fn beam_search(&self, query_node: NodeId, entry_points: &[NodeId], ef: usize, level: usize) -> Vec<Scored<NodeId>> {
        let Some(query) = self.node_vector_owned(query_node) else {
            return Vec::new();
        };
        self.beam_search_by_vector(&query, entry_points, ef, level, None)
    }

    fn beam_search_by_vector(
        &self,
        query: &[u8],
        entry_points: &[NodeId],
        ef: usize,
        level: usize,
        mut ctx: Option<&mut IndexContext>,
    ) -> Vec<Scored<NodeId>> {
        let mut visited = Bitset::new();
        let mut candidates: BinaryHeap<Reverse<Scored<NodeId>>> = BinaryHeap::new();
        let mut results: BinaryHeap<Scored<NodeId>> = BinaryHeap::new();

        for &ep in entry_points {
            if visited.test(ep) {
                continue;
            }
            visited.set(ep);
            let d = self.distance_to(query, ep);
            candidates.push(Reverse(Scored::new(d, ep)));
            results.push(Scored::new(d, ep));
        }

        while let Some(Reverse(current)) = candidates.pop() {
            if let Some(ctx) = ctx.as_deref_mut() {
                ctx.record_visit();
                if ctx.reach_scan_limit() {
                    break;
                }
            }
            let worst = results.peek().map_or(f32::MAX, |r| r.dist);
            if current.dist > worst && results.len() >= ef {
                break;
            }
            for &neighbor in self.nodes.neighbors(current.id, level).iter() {
                if visited.test(neighbor) {
                    continue;
                }
                visited.set(neighbor);
                let d = self.distance_to(query, neighbor);
                let worst = results.peek().map_or(f32::MAX, |r| r.dist);
                if d < worst || results.len() < ef {
                    candidates.push(Reverse(Scored::new(d, neighbor)));
                    results.push(Scored::new(d, neighbor));
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        let mut out: Vec<_> = results.into_vec();
        out.sort_by(|a, b| a.dist.total_cmp(&b.dist));
        out
    }

    /// Malkov's RNG-pruning heuristic (VAMANA with `alpha` fixed at `1.0`):
    /// keep a candidate only if it is closer to the query than to every
    /// neighbour already selected.
    fn select_neighbors(&self, candidates: &[Scored<NodeId>], max_neighbors: usize) -> Vec<NodeId> {
        if candidates.len() <= max_neighbors {
            return candidates.iter().map(|c| c.id).collect();
        }
        let mut selected: Vec<NodeId> = Vec::with_capacity(max_neighbors);
        for candidate in candidates {
            if selected.len() >= max_neighbors {
                break;
            }
            let candidate_vec = self.node_vector_owned(candidate.id);
            let is_diverse = candidate_vec.as_ref().is_none_or(|cv| {
                selected.iter().all(|&s| self.distance_to(cv, s) >= candidate.dist)
            });
            if is_diverse || selected.is_empty() {
                selected.push(candidate.id);
            }
        }
        if selected.len() < max_neighbors {
            for candidate in candidates {
                if selected.len() >= max_neighbors {
                    break;
                }
                if !selected.contains(&candidate.id) {
                    selected.push(candidate.id);
                }
            }
        }
        selected
    }

    /// Adds `new_node` to `neighbor`'s adjacency at `level`, re-pruning with
    /// [`Self::select_neighbors`] if the cap overflows (spec §4.8 step 3).
    ///
    /// Grounded on the teacher's own fix for lock-ordering deadlocks in this
    /// exact method (`BUG-CORE-001`): the current list and every vector this
    /// needs are fetched via the lock-free [`NodeStore::neighbors`]/
    /// [`NodeStore::with_vector`] reads and all distances computed *before*
    /// [`NodeStore::set_neighbors`] takes the write shard, so no node-store
    /// access happens while that lock is held.
    fn add_bidirectional_connection(&self, new_node: NodeId, neighbor: NodeId, level: usize, max_conn: usize) {
        let current = self.nodes.neighbors(neighbor, level);
        let next = if current.len() < max_conn {
            let mut next = (*current).clone();
            next.push(new_node);
            next
        } else {
            let Some(neighbor_vec) = self.node_vector_owned(neighbor) else {
                return;
            };
            let mut all: Vec<NodeId> = (*current).clone();
            all.push(new_node);
            let mut scored: Vec<Scored<NodeId>> = all
                .into_iter()
                .map(|n| Scored::new(self.distance_to(&neighbor_vec, n), n))
                .collect();
            scored.sort_by(|a, b| a.dist.total_cmp(&b.dist));
            self.select_neighbors(&scored, max_conn)
        };
        self.nodes.set_neighbors(neighbor, level, next);
    }

    /// Searches for `ctx.topk` nearest neighbours of `query`, honouring
    /// `ctx.ef`, `ctx.filter`, `ctx.scan_limit`, and the group-by cap if
    /// configured. Returns `(key, distance)` pairs sorted ascending.
    ///
    /// Returns an empty result immediately if the graph has no entry point
    /// (spec §4.8 "Failure": empty index).
    pub fn search(&self, ctx: &mut IndexContext, query: &[u8]) -> Vec<(u64, f32)> {
        ctx.reset();
        let (ep, ep_level) = self.nodes.entry_point();
        if ep == INVALID_NODE_ID {
            return Vec::new();
        }

        let mut current = ep;
        for level in (1..=ep_level).rev() {
            current = self.search_layer_single_by_vector(query, current, level);
        }

        let width = ctx.ef.max(ctx.topk);
        let candidates = self.beam_search_by_vector(query, &[current], width, 0, Some(ctx));

        let mut group_counts: std::collections::HashMap<u64, usize> = std::collections::HashMap::new();
        let group_num = ctx.group_num;
        let group_topk = ctx.group_topk.unwrap_or(usize::MAX);
        let has_group_by = ctx.group_by.is_some();

        for scored in candidates {
            let Some(key) = self.nodes.key_of(scored.id) else { continue };
            if has_group_by {
                let group = (ctx.group_by.as_ref().unwrap())(key);
                let count = group_counts.entry(group).or_insert(0);
                if *count >= group_topk {
                    continue;
                }
                if let Some(cap) = group_num {
                    let distinct = group_counts.len();
                    if distinct >= cap && !group_counts.contains_key(&group) {
                        continue;
                    }
                }
                *count += 1;
            }
            ctx.offer_result(scored.dist, scored.id, key);
        }

        ctx.take_results()
            .into_iter()
            .filter_map(|s| self.nodes.key_of(s.id).map(|key| (key, s.dist)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::{DataType, MetricKind};

    fn vecf(values: &[f32]) -> Box<[u8]> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect::<Vec<u8>>().into_boxed_slice()
    }

    fn graph(dim: usize) -> HnswGraph {
        let meta = IndexMeta::new(DataType::Fp32, dim, MetricKind::SquaredEuclidean);
        HnswGraph::new(meta, HnswParams { m: 8, ef_construction: 32, memory_budget_bytes: None }, 42).unwrap()
    }

    #[test]
    fn empty_graph_search_returns_nothing() {
        let g = graph(4);
        let mut ctx = IndexContext::new(10, 5);
        assert!(g.search(&mut ctx, &vecf(&[0.0, 0.0, 0.0, 0.0])).is_empty());
    }

    #[test]
    fn from_config_carries_max_neighbor_count_and_ef_construction() {
        let cfg = crate::config::HnswConfig::default();
        let meta = IndexMeta::new(DataType::Fp32, 4, MetricKind::SquaredEuclidean);
        let g = HnswGraph::from_config(meta, &cfg, 7).unwrap();
        assert_eq!(g.params.m, cfg.max_neighbor_count);
        assert_eq!(g.params.ef_construction, cfg.ef_construction);
    }

    #[test]
    fn first_insert_becomes_entry_point() {
        let g = graph(4);
        let id = g.insert(100, vecf(&[1.0, 0.0, 0.0, 0.0])).unwrap();
        assert_eq!(g.nodes.entry_point().0, id);
    }

    #[test]
    fn search_finds_the_exact_match_among_a_ramp() {
        let g = graph(4);
        for i in 0..200u64 {
            let v = i as f32;
            g.insert(i, vecf(&[v, v, v, v])).unwrap();
        }
        let mut ctx = IndexContext::new(50, 5);
        let results = g.search(&mut ctx, &vecf(&[100.0, 100.0, 100.0, 100.0]));
        assert!(!results.is_empty());
        assert_eq!(results[0].0, 100);
    }

    #[test]
    fn bidirectional_edges_hold_after_construction() {
        let g = graph(4);
        let a = g.insert(1, vecf(&[0.0, 0.0, 0.0, 0.0])).unwrap();
        let b = g.insert(2, vecf(&[0.01, 0.0, 0.0, 0.0])).unwrap();
        let a_neighbors = g.nodes.neighbors(a, 0);
        let b_neighbors = g.nodes.neighbors(b, 0);
        assert!(a_neighbors.contains(&b) || b_neighbors.contains(&a));
    }

    #[test]
    fn memory_budget_rejects_once_exceeded() {
        let meta = IndexMeta::new(DataType::Fp32, 4, MetricKind::SquaredEuclidean);
        let g = HnswGraph::new(meta, HnswParams { m: 8, ef_construction: 32, memory_budget_bytes: Some(8) }, 1).unwrap();
        let err = g.insert(1, vecf(&[1.0, 2.0, 3.0, 4.0])).unwrap_err();
        assert_eq!(err.code(), "VEC-004");
    }

    #[test]
    fn group_by_caps_results_per_group() {
        let g = graph(4);
        for i in 0..20u64 {
            g.insert(i, vecf(&[i as f32, 0.0, 0.0, 0.0])).unwrap();
        }
        let mut ctx = IndexContext::new(50, 10);
        ctx.group_by = Some(Box::new(|key| key % 2));
        ctx.group_topk = Some(2);
        let results = g.search(&mut ctx, &vecf(&[0.0, 0.0, 0.0, 0.0]));
        let mut per_group = std::collections::HashMap::new();
        for (key, _) in &results {
            *per_group.entry(key % 2).or_insert(0) += 1;
        }
        assert!(per_group.values().all(|&c| c <= 2));
    }

    #[test]
    fn dump_writes_every_segment() {
        let g = graph(4);
        for i in 0..50u64 {
            let v = i as f32;
            g.insert(i, vecf(&[v, v, v, v])).unwrap();
        }
        let bytes = g.dump(Vec::new()).unwrap();
        let storage = crate::storage::memory::MemoryStorage::open(bytes).unwrap();
        for id in [HEADER_SEG_ID, META_SEG_ID, KEYS_SEG_ID, LEVELS_SEG_ID, BODY_SEG_ID, ADJACENCY_SEG_ID] {
            assert!(storage.segment(id).is_ok(), "missing segment {id}");
        }
    }

    #[test]
    fn open_reproduces_search_results() {
        let g = graph(4);
        for i in 0..200u64 {
            let v = i as f32;
            g.insert(i, vecf(&[v, v, v, v])).unwrap();
        }
        let bytes = g.dump(Vec::new()).unwrap();
        let storage: std::sync::Arc<dyn crate::storage::traits::Storage> =
            std::sync::Arc::new(crate::storage::memory::MemoryStorage::open(bytes).unwrap());
        let reopened = HnswGraph::open(storage, 99).unwrap();

        assert_eq!(reopened.len(), g.len());
        let query = vecf(&[100.0, 100.0, 100.0, 100.0]);
        let mut ctx_a = IndexContext::new(50, 5);
        let mut ctx_b = IndexContext::new(50, 5);
        assert_eq!(g.search(&mut ctx_a, &query), reopened.search(&mut ctx_b, &query));
    }

    #[test]
    fn open_rejects_truncated_header() {
        let storage: std::sync::Arc<dyn crate::storage::traits::Storage> = {
            let mut dumper = crate::storage::dumper::IndexDumper::new(Vec::new());
            dumper.write(&[0u8; 4]);
            dumper.append(HEADER_SEG_ID).unwrap();
            std::sync::Arc::new(crate::storage::memory::MemoryStorage::open(dumper.finish().unwrap()).unwrap())
        };
        let err = HnswGraph::open(storage, 1).unwrap_err();
        assert_eq!(err.code(), "VEC-007");
    }
}
