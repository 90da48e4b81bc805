//! RaBitQ reformer (spec §4.4): two-stage quantisation of normalised
//! vectors into a coarse one-bit-per-dimension code (`bin_data`) plus an
//! optional multi-bit residual refinement (`ex_data`).
//!
//! The "fixed random matrix" the bin stage rotates against is implemented as
//! a randomised fast Hadamard transform (random sign flip + Walsh-Hadamard
//! butterfly) rather than a dense random-orthogonal matrix multiply: this is
//! the standard practical substitute for a true random rotation in
//! RaBitQ-style encoders (`O(d log d)` instead of `O(d^2)`), seeded through
//! [`crate::rng::Rng`].
//!
//! Distances are computed in the rotated, unit-sphere domain; recovering an
//! absolute distance from a per-vector norm is the caller's job via
//! [`crate::distance::scalar::recover_unnormalized_score`], the same split
//! already used for the plain Cosine metric.

use crate::error::{Error, Result};
use crate::rng::Rng;

/// Which similarity the reformer's distance functions approximate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RabitqMetric {
    InnerProduct,
    L2,
}

const MAX_CLUSTERS: usize = 32;

fn next_pow2(n: usize) -> usize {
    if n <= 1 {
        1
    } else {
        1usize << (usize::BITS - (n - 1).leading_zeros())
    }
}

fn fast_hadamard_transform(v: &mut [f32]) {
    let n = v.len();
    let mut h = 1;
    while h < n {
        let mut i = 0;
        while i < n {
            for j in i..i + h {
                let a = v[j];
                let b = v[j + h];
                v[j] = a + b;
                v[j + h] = a - b;
            }
            i += h * 2;
        }
        h *= 2;
    }
}

/// The fixed random rotation applied before bit extraction: a random sign
/// flip followed by a Hadamard butterfly, normalised to preserve norm.
#[derive(Debug, Clone)]
pub struct RotationMatrix {
    padded_dim: usize,
    signs: Vec<f32>,
}

impl RotationMatrix {
    /// Builds a rotation for vectors padded to `padded_dim` (must be a power
    /// of two), deterministic from `seed`.
    #[must_use]
    pub fn new(padded_dim: usize, seed: u64) -> Self {
        assert_eq!(padded_dim & (padded_dim - 1), 0, "padded_dim must be a power of two");
        let mut rng = Rng::new(seed);
        let signs = (0..padded_dim).map(|_| rng.next_sign()).collect();
        Self { padded_dim, signs }
    }

    /// Pads, sign-flips, Hadamard-transforms, and norm-normalises `x`.
    ///
    /// # Panics
    ///
    /// Panics if `x.len() > self.padded_dim`.
    #[must_use]
    pub fn rotate(&self, x: &[f32]) -> Vec<f32> {
        assert!(x.len() <= self.padded_dim);
        let mut v = vec![0.0f32; self.padded_dim];
        v[..x.len()].copy_from_slice(x);
        for (e, s) in v.iter_mut().zip(self.signs.iter()) {
            *e *= s;
        }
        fast_hadamard_transform(&mut v);
        let inv_norm = 1.0 / (self.padded_dim as f32).sqrt();
        for e in &mut v {
            *e *= inv_norm;
        }
        v
    }

    /// The padded dimension this rotation operates on.
    #[must_use]
    pub const fn padded_dim(&self) -> usize {
        self.padded_dim
    }
}

/// Per-cluster lookup entry: `norm` recovers the un-normalised vector
/// length; `aux` is an `error` bound (IP) or a second `norm` slot (L2), per
/// spec §3's codeword description.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClusterEntry {
    pub norm: f32,
    pub aux: f32,
}

/// A RaBitQ-encoded vector: a cluster reference plus its two-stage code.
#[derive(Debug, Clone)]
pub struct RabitqCode {
    pub cluster_id: u32,
    pub bin_data: Vec<u32>,
    pub ex_data: Vec<u8>,
}

fn pack_bits(bits: &[bool]) -> Vec<u32> {
    let mut words = vec![0u32; bits.len().div_ceil(32)];
    for (i, &b) in bits.iter().enumerate() {
        if b {
            words[i / 32] |= 1 << (i % 32);
        }
    }
    words
}

fn unpack_bits(words: &[u32], len: usize) -> Vec<bool> {
    (0..len).map(|i| words[i / 32] & (1 << (i % 32)) != 0).collect()
}

/// Packs `len` values of `bits`-wide unsigned codes, LSB-first.
fn pack_wide(values: &[u32], bits: u8) -> Vec<u8> {
    let mut out = Vec::with_capacity((values.len() * bits as usize).div_ceil(8));
    let mut acc: u32 = 0;
    let mut acc_bits: u32 = 0;
    for &v in values {
        acc |= v << acc_bits;
        acc_bits += u32::from(bits);
        while acc_bits >= 8 {
            out.push((acc & 0xFF) as u8);
            acc >>= 8;
            acc_bits -= 8;
        }
    }
    if acc_bits > 0 {
        out.push((acc & 0xFF) as u8);
    }
    out
}

fn unpack_wide(data: &[u8], bits: u8, len: usize) -> Vec<u32> {
    let mask = (1u32 << bits) - 1;
    let mut out = Vec::with_capacity(len);
    let mut acc: u32 = 0;
    let mut acc_bits: u32 = 0;
    let mut byte_idx = 0;
    while out.len() < len {
        while acc_bits < u32::from(bits) && byte_idx < data.len() {
            acc |= u32::from(data[byte_idx]) << acc_bits;
            acc_bits += 8;
            byte_idx += 1;
        }
        out.push(acc & mask);
        acc >>= bits;
        acc_bits = acc_bits.saturating_sub(u32::from(bits));
    }
    out
}

/// A trained RaBitQ reformer for vectors of a fixed dimension.
#[derive(Debug, Clone)]
pub struct RabitqReformer {
    dim: usize,
    ex_bits: u8,
    metric: RabitqMetric,
    rotation: RotationMatrix,
    clusters: Vec<ClusterEntry>,
}

impl RabitqReformer {
    /// Builds a reformer for `dim`-dimensional vectors with `ex_bits` of
    /// residual refinement (`0` disables stage 2 entirely).
    #[must_use]
    pub fn new(dim: usize, ex_bits: u8, metric: RabitqMetric, seed: u64) -> Self {
        let padded_dim = next_pow2(dim.max(1));
        Self {
            dim,
            ex_bits,
            metric,
            rotation: RotationMatrix::new(padded_dim, seed),
            clusters: Vec::new(),
        }
    }

    /// Padded dimension (next power of two `>= dim`) the rotation operates on.
    #[must_use]
    pub const fn padded_dim(&self) -> usize {
        self.rotation.padded_dim
    }

    /// Registers a cluster's `{norm, aux}` lookup entry, returning its id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoMemory`] once 32 clusters are registered (spec §3:
    /// "a 32-float table").
    pub fn add_cluster(&mut self, norm: f32, aux: f32) -> Result<u32> {
        if self.clusters.len() >= MAX_CLUSTERS {
            return Err(Error::NoMemory("rabitq cluster table is full (32 clusters)".into()));
        }
        self.clusters.push(ClusterEntry { norm, aux });
        Ok(self.clusters.len() as u32 - 1)
    }

    fn cluster(&self, id: u32) -> Result<ClusterEntry> {
        self.clusters
            .get(id as usize)
            .copied()
            .ok_or_else(|| Error::NoExist(format!("rabitq cluster {id} not registered")))
    }

    /// Rotates a raw `dim`-length vector into the padded, unit-sphere domain.
    /// Callers rotate both stored vectors (before `encode`) and queries
    /// (before `get_bin_est`/`get_full_est`) with this same function.
    #[must_use]
    pub fn rotate(&self, x: &[f32]) -> Vec<f32> {
        self.rotation.rotate(x)
    }

    /// Encodes an already-rotated unit vector into a two-stage RaBitQ code.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoExist`] if `cluster_id` was never registered.
    pub fn encode(&self, rotated: &[f32], cluster_id: u32) -> Result<RabitqCode> {
        self.cluster(cluster_id)?;
        let bits: Vec<bool> = rotated.iter().map(|&v| v >= 0.0).collect();
        let bin_data = pack_bits(&bits);

        let ex_data = if self.ex_bits == 0 {
            Vec::new()
        } else {
            let c = self.unit_magnitude();
            let levels = (1u32 << self.ex_bits) as f32;
            let codes: Vec<u32> = rotated
                .iter()
                .map(|&v| {
                    let sign_recon = if v >= 0.0 { c } else { -c };
                    let residual = (v - sign_recon) / (2.0 * c); // in [-1, 1]
                    let normalised = ((residual + 1.0) / 2.0).clamp(0.0, 1.0);
                    (normalised * (levels - 1.0)).round() as u32
                })
                .collect();
            pack_wide(&codes, self.ex_bits)
        };

        Ok(RabitqCode {
            cluster_id,
            bin_data,
            ex_data,
        })
    }

    fn unit_magnitude(&self) -> f32 {
        1.0 / (self.padded_dim() as f32).sqrt()
    }

    fn bin_reconstruction(&self, code: &RabitqCode) -> Vec<f32> {
        let c = self.unit_magnitude();
        unpack_bits(&code.bin_data, self.padded_dim())
            .into_iter()
            .map(|bit| if bit { c } else { -c })
            .collect()
    }

    fn scored_distance(&self, query_rotated: &[f32], recon: &[f32], aux: f32) -> (f32, f32) {
        match self.metric {
            RabitqMetric::L2 => {
                let est: f32 = query_rotated
                    .iter()
                    .zip(recon.iter())
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum();
                (est, (est - aux).max(0.0))
            }
            RabitqMetric::InnerProduct => {
                let dot: f32 = query_rotated.iter().zip(recon.iter()).map(|(a, b)| a * b).sum();
                let est = -dot;
                (est, est - aux)
            }
        }
    }

    /// Coarse distance from the bit estimate alone: `(est_dist, low_dist)`
    /// with `low_dist <= est_dist` always.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoExist`] if `code.cluster_id` was never registered.
    pub fn split_single_estdist(&self, query_rotated: &[f32], code: &RabitqCode) -> Result<(f32, f32)> {
        let cluster = self.cluster(code.cluster_id)?;
        let recon = self.bin_reconstruction(code);
        Ok(self.scored_distance(query_rotated, &recon, cluster.aux))
    }

    /// Refined distance using both the bit estimate and the residual stage.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoExist`] if `code.cluster_id` was never registered,
    /// or [`Error::Logic`] if this reformer was built with `ex_bits == 0`.
    pub fn split_single_fulldist(&self, query_rotated: &[f32], code: &RabitqCode) -> Result<f32> {
        if self.ex_bits == 0 {
            return Err(Error::Logic("split_single_fulldist requires ex_bits > 0".into()));
        }
        let cluster = self.cluster(code.cluster_id)?;
        let c = self.unit_magnitude();
        let levels = (1u32 << self.ex_bits) as f32;
        let codes = unpack_wide(&code.ex_data, self.ex_bits, self.padded_dim());
        let bits = unpack_bits(&code.bin_data, self.padded_dim());

        let recon: Vec<f32> = bits
            .iter()
            .zip(codes.iter())
            .map(|(&bit, &raw)| {
                let sign_recon = if bit { c } else { -c };
                let normalised = raw as f32 / (levels - 1.0);
                let residual = normalised * 2.0 - 1.0;
                sign_recon + residual * 2.0 * c
            })
            .collect();
        let (est, _low) = self.scored_distance(query_rotated, &recon, cluster.aux);
        Ok(est)
    }

    /// Declared (unpadded) dimension.
    #[must_use]
    pub const fn dim(&self) -> usize {
        self.dim
    }

    /// Whether this reformer was built with `ex_bits > 0`, i.e. whether
    /// [`Self::split_single_fulldist`] can refine a bin estimate at all.
    #[must_use]
    pub const fn has_residual(&self) -> bool {
        self.ex_bits > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(v: &[f32]) -> Vec<f32> {
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        v.iter().map(|x| x / norm).collect()
    }

    #[test]
    fn next_pow2_rounds_up() {
        assert_eq!(next_pow2(1), 1);
        assert_eq!(next_pow2(5), 8);
        assert_eq!(next_pow2(8), 8);
    }

    #[test]
    fn rotation_preserves_norm() {
        let rot = RotationMatrix::new(8, 7);
        let x = unit(&[1.0, 2.0, 3.0, 4.0, 0.0, 0.0, 0.0, 0.0]);
        let r = rot.rotate(&x);
        let norm: f32 = r.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4, "norm={norm}");
    }

    #[test]
    fn bin_estimate_respects_low_bound_invariant() {
        let mut reformer = RabitqReformer::new(4, 0, RabitqMetric::L2, 42);
        let cluster = reformer.add_cluster(1.0, 0.1).unwrap();
        let x = unit(&[1.0, 0.5, -0.3, 0.2]);
        let rotated = reformer.rotate(&x);
        let code = reformer.encode(&rotated, cluster).unwrap();

        let q = unit(&[0.9, 0.4, -0.2, 0.1]);
        let query_rotated = reformer.rotate(&q);
        let (est, low) = reformer.split_single_estdist(&query_rotated, &code).unwrap();
        assert!(low <= est);
    }

    #[test]
    fn full_dist_requires_ex_bits() {
        let mut reformer = RabitqReformer::new(4, 0, RabitqMetric::L2, 1);
        let cluster = reformer.add_cluster(1.0, 0.0).unwrap();
        let x = unit(&[1.0, 1.0, 1.0, 1.0]);
        let rotated = reformer.rotate(&x);
        let code = reformer.encode(&rotated, cluster).unwrap();
        let err = reformer.split_single_fulldist(&rotated, &code).unwrap_err();
        assert_eq!(err.code(), "VEC-008");
    }

    #[test]
    fn full_dist_is_no_worse_than_bin_estimate_on_exact_match() {
        let mut reformer = RabitqReformer::new(8, 4, RabitqMetric::L2, 99);
        let cluster = reformer.add_cluster(1.0, 0.2).unwrap();
        let x = unit(&[0.1, -0.4, 0.3, 0.2, -0.1, 0.05, 0.6, -0.2]);
        let rotated = reformer.rotate(&x);
        let code = reformer.encode(&rotated, cluster).unwrap();

        let (est, _low) = reformer.split_single_estdist(&rotated, &code).unwrap();
        let full = reformer.split_single_fulldist(&rotated, &code).unwrap();
        assert!(full <= est + 1e-4, "full={full} est={est}");
    }

    #[test]
    fn unknown_cluster_is_no_exist() {
        let reformer = RabitqReformer::new(4, 0, RabitqMetric::L2, 1);
        let code = RabitqCode {
            cluster_id: 3,
            bin_data: vec![0],
            ex_data: vec![],
        };
        let err = reformer.split_single_estdist(&[0.0; 4], &code).unwrap_err();
        assert_eq!(err.code(), "VEC-003");
    }

    #[test]
    fn cluster_table_caps_at_32() {
        let mut reformer = RabitqReformer::new(4, 0, RabitqMetric::L2, 1);
        for _ in 0..32 {
            reformer.add_cluster(1.0, 0.0).unwrap();
        }
        assert!(reformer.add_cluster(1.0, 0.0).is_err());
    }

    #[test]
    fn pack_unpack_wide_roundtrips() {
        let values = vec![0u32, 3, 7, 15, 1, 9];
        let packed = pack_wide(&values, 4);
        let unpacked = unpack_wide(&packed, 4, values.len());
        assert_eq!(values, unpacked);
    }
}
