//! Bloom filter: probabilistic existence check with no false negatives.
//!
//! Bit array sized from `(capacity, false_positive_rate)` via the standard
//! formulas, with `K` independent hash functions derived by re-seeding a
//! single hasher rather than allocating `K` distinct hasher instances.

use parking_lot::RwLock;
use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};

/// Bloom filter for probabilistic existence checks.
///
/// `contains` may return a false positive; it never returns a false negative.
pub struct BloomFilter {
    bits: RwLock<Vec<u64>>,
    num_bits: usize,
    num_hashes: u32,
    count: RwLock<usize>,
}

impl BloomFilter {
    /// Sizes a filter for `capacity` items at a target `false_positive_rate`
    /// (e.g. `0.01` for 1%).
    #[must_use]
    pub fn new(capacity: usize, false_positive_rate: f64) -> Self {
        let num_bits = Self::optimal_bits(capacity.max(1), false_positive_rate);
        let num_hashes = Self::optimal_hashes(num_bits, capacity.max(1));
        Self::with_params(num_bits, num_hashes)
    }

    /// Builds a filter with explicit bit/hash counts.
    #[must_use]
    pub fn with_params(num_bits: usize, num_hashes: u32) -> Self {
        let num_bits = num_bits.max(1);
        let num_words = num_bits.div_ceil(64);
        Self {
            bits: RwLock::new(vec![0u64; num_words]),
            num_bits,
            num_hashes: num_hashes.max(1),
            count: RwLock::new(0),
        }
    }

    /// Inserts an item.
    pub fn insert<T: Hash>(&self, item: &T) {
        let mut bits = self.bits.write();
        for i in 0..self.num_hashes {
            let bit_index = self.bit_index(item, i);
            bits[bit_index / 64] |= 1u64 << (bit_index % 64);
        }
        *self.count.write() += 1;
    }

    /// Returns `true` if the item might be present (possible false positive).
    #[must_use]
    pub fn contains<T: Hash>(&self, item: &T) -> bool {
        let bits = self.bits.read();
        (0..self.num_hashes).all(|i| {
            let bit_index = self.bit_index(item, i);
            bits[bit_index / 64] & (1u64 << (bit_index % 64)) != 0
        })
    }

    /// Number of items inserted (not the number of distinct items).
    #[must_use]
    pub fn count(&self) -> usize {
        *self.count.read()
    }

    /// Clears every bit.
    pub fn clear(&self) {
        let mut bits = self.bits.write();
        bits.iter_mut().for_each(|w| *w = 0);
        *self.count.write() = 0;
    }

    /// Estimated current false-positive rate given the observed fill ratio.
    #[must_use]
    pub fn estimated_fpr(&self) -> f64 {
        let bits = self.bits.read();
        let set_bits: usize = bits.iter().map(|w| w.count_ones() as usize).sum();
        let fill_ratio = set_bits as f64 / self.num_bits as f64;
        fill_ratio.powi(self.num_hashes as i32)
    }

    fn optimal_bits(capacity: usize, fpr: f64) -> usize {
        let ln2_sq = std::f64::consts::LN_2 * std::f64::consts::LN_2;
        (-(capacity as f64) * fpr.ln() / ln2_sq).ceil().max(1.0) as usize
    }

    fn optimal_hashes(num_bits: usize, capacity: usize) -> u32 {
        let k = (num_bits as f64 / capacity as f64) * std::f64::consts::LN_2;
        (k.ceil() as u32).max(1)
    }

    fn bit_index<T: Hash>(&self, item: &T, seed: u32) -> usize {
        let mut hasher = FxHasher::default();
        seed.hash(&mut hasher);
        item.hash(&mut hasher);
        (hasher.finish() as usize) % self.num_bits
    }
}

impl Default for BloomFilter {
    fn default() -> Self {
        Self::new(10_000, 0.01)
    }
}
