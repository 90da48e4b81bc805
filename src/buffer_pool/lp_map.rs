//! `LPMap`: the per-block ref-count state machine (spec §4.6).
//!
//! Grounded on `src/ailego/buffer/buffer_pool.cc`'s `LPMap`/`Entry`. The
//! original increments `ref_count` unconditionally in `acquire_block` and
//! lets a losing racer's stray increment be silently discarded by the
//! winner's plain `store(1)` in `set_block_acquired`; here the same three
//! states (`EMPTY`, cached, in-use) are reached through `compare_exchange`
//! loops instead, so a losing racer never leaves the counter in a state
//! that doesn't correspond to a real outstanding reference.
//!
//! `ArcSwapOption` (not a raw `char*`) holds the block bytes: the buffer
//! pointer itself only ever changes under `set_acquired`/`evict`, and
//! `arc_swap` gives lock-free reads of it on the `acquire` hot path.

use arc_swap::ArcSwapOption;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::sync::Arc;

/// Identifies a fixed-size block within the file a buffer pool is paging.
pub type BlockId = u32;

/// Sentinel `ref_count` meaning "no buffer installed for this block".
pub const EMPTY: i32 = i32::MIN;

struct Entry {
    ref_count: AtomicI32,
    load_count: AtomicU64,
    buffer: ArcSwapOption<[u8]>,
}

impl Entry {
    fn empty() -> Self {
        Self {
            ref_count: AtomicI32::new(EMPTY),
            load_count: AtomicU64::new(0),
            buffer: ArcSwapOption::const_empty(),
        }
    }
}

/// Fixed-size table of per-block ref-count/buffer state.
pub struct LpMap {
    entries: Vec<Entry>,
}

impl LpMap {
    /// Allocates `entry_count` empty slots.
    #[must_use]
    pub fn new(entry_count: usize) -> Self {
        let mut entries = Vec::with_capacity(entry_count);
        entries.resize_with(entry_count, Entry::empty);
        Self { entries }
    }

    /// Number of block slots this map can address.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Lock-free hit path: bumps `ref_count` if the slot is cached or
    /// already in use. Returns `None` if the slot is empty, in which case
    /// the caller takes the miss path (free-list / recycle / read / install).
    pub fn acquire(&self, id: BlockId) -> Option<Arc<[u8]>> {
        let entry = &self.entries[id as usize];
        loop {
            let current = entry.ref_count.load(Ordering::Acquire);
            if current < 0 {
                return None;
            }
            let next = current + 1;
            if entry
                .ref_count
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return entry.buffer.load_full();
            }
        }
    }

    /// Installs a freshly read block, racing any other thread that missed
    /// concurrently on the same `id`. Returns the buffer actually installed
    /// (the caller's own, or another racer's if it won) and whether this
    /// caller's buffer is the one that got installed.
    pub fn set_acquired(&self, id: BlockId, buffer: Arc<[u8]>) -> (Arc<[u8]>, bool) {
        let entry = &self.entries[id as usize];
        if entry
            .ref_count
            .compare_exchange(EMPTY, 1, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            entry.buffer.store(Some(buffer.clone()));
            entry.load_count.fetch_add(1, Ordering::Relaxed);
            return (buffer, true);
        }
        loop {
            if let Some(existing) = self.acquire(id) {
                return (existing, false);
            }
            std::hint::spin_loop();
        }
    }

    /// Decrements `ref_count`. Returns `Some((id, load_count))` — an
    /// eviction candidate — if this was the last outstanding reference.
    pub fn release(&self, id: BlockId) -> Option<(BlockId, u64)> {
        let entry = &self.entries[id as usize];
        let prev = entry.ref_count.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "release() on a block with no outstanding reference");
        if prev == 1 {
            Some((id, entry.load_count.load(Ordering::Relaxed)))
        } else {
            None
        }
    }

    /// CASes `ref_count` from `0` to [`EMPTY`] and takes ownership of the
    /// buffer. Returns `None` if the block is no longer evictable (back in
    /// use, or already evicted).
    pub fn evict(&self, id: BlockId) -> Option<Arc<[u8]>> {
        let entry = &self.entries[id as usize];
        if entry
            .ref_count
            .compare_exchange(0, EMPTY, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            entry.buffer.swap(None)
        } else {
            None
        }
    }

    /// Checks whether an eviction-queue entry recorded for `load_count` is
    /// stale: the block has since been re-materialised (or evicted and
    /// re-fetched) and its current `load_count` has moved on.
    #[must_use]
    pub fn is_stale(&self, id: BlockId, load_count: u64) -> bool {
        self.entries[id as usize].load_count.load(Ordering::Relaxed) != load_count
    }

    #[must_use]
    pub(crate) fn ref_count(&self, id: BlockId) -> i32 {
        self.entries[id as usize].ref_count.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_slot_misses() {
        let map = LpMap::new(4);
        assert!(map.acquire(0).is_none());
    }

    #[test]
    fn install_then_hit() {
        let map = LpMap::new(4);
        let (buf, won) = map.set_acquired(0, Arc::from(vec![1u8, 2, 3]));
        assert!(won);
        assert_eq!(&*buf, &[1, 2, 3]);
        assert_eq!(map.ref_count(0), 1);

        let hit = map.acquire(0).unwrap();
        assert_eq!(&*hit, &[1, 2, 3]);
        assert_eq!(map.ref_count(0), 2);
    }

    #[test]
    fn release_to_zero_yields_eviction_candidate() {
        let map = LpMap::new(4);
        map.set_acquired(0, Arc::from(vec![9u8]));
        assert!(map.release(0).is_some());
        assert_eq!(map.ref_count(0), 0);
    }

    #[test]
    fn release_while_still_referenced_is_not_a_candidate() {
        let map = LpMap::new(4);
        map.set_acquired(0, Arc::from(vec![9u8]));
        map.acquire(0).unwrap(); // ref_count now 2
        assert!(map.release(0).is_none());
        assert_eq!(map.ref_count(0), 1);
    }

    #[test]
    fn evict_reclaims_a_cached_block() {
        let map = LpMap::new(4);
        map.set_acquired(0, Arc::from(vec![5u8, 6]));
        map.release(0).unwrap();
        let buf = map.evict(0).unwrap();
        assert_eq!(&*buf, &[5, 6]);
        assert_eq!(map.ref_count(0), EMPTY);
        assert!(map.acquire(0).is_none());
    }

    #[test]
    fn evict_refuses_an_in_use_block() {
        let map = LpMap::new(4);
        map.set_acquired(0, Arc::from(vec![5u8]));
        assert!(map.evict(0).is_none());
    }

    #[test]
    fn staleness_tracks_load_count() {
        let map = LpMap::new(4);
        map.set_acquired(0, Arc::from(vec![1u8]));
        let (_, load_count) = map.release(0).unwrap();
        assert!(!map.is_stale(0, load_count));

        map.evict(0);
        map.set_acquired(0, Arc::from(vec![2u8]));
        assert!(map.is_stale(0, load_count));
    }
}
