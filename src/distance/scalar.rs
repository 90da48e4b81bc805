//! Scalar (1x1) distance kernels.
//!
//! Each function takes two raw, little-endian-encoded vectors and the
//! element count, and returns one `f32` distance. These are the fallback
//! kernels used when no vectorised path is available, and also the building
//! block the batched kernels in [`super::batch`] fall back to for any tail
//! elements that don't fill a whole lane.

use crate::numeric::binary::hamming_popcount as binary_hamming_popcount;
use crate::numeric::half_vec::bytes_to_f32;
use crate::numeric::int4::unpack_byte;

/// Decodes a raw FP32 byte buffer into an owned `f32` vector.
#[must_use]
pub fn decode_fp32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Decodes a raw FP16 byte buffer into an owned `f32` vector.
#[must_use]
pub fn decode_fp16(bytes: &[u8]) -> Vec<f32> {
    bytes_to_f32(bytes)
}

/// Decodes a raw INT8 byte buffer into an owned `f32` vector.
#[must_use]
pub fn decode_int8(bytes: &[u8]) -> Vec<f32> {
    bytes.iter().map(|&b| f32::from(b as i8)).collect()
}

/// Decodes a packed INT4 byte buffer into `dim` signed `f32` elements.
#[must_use]
pub fn decode_int4(bytes: &[u8], dim: usize) -> Vec<f32> {
    let mut out = Vec::with_capacity(dim);
    for &byte in bytes {
        let (even, odd) = unpack_byte(byte);
        out.push(f32::from(even));
        if out.len() < dim {
            out.push(f32::from(odd));
        }
    }
    out.truncate(dim);
    out
}

/// Decodes a packed BINARY byte buffer into `u32` words.
#[must_use]
pub fn decode_binary(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// `sum((a_i - b_i)^2)` over two equal-length `f32` slices.
///
/// # Panics
///
/// Panics if `a.len() != b.len()`.
#[inline]
#[must_use]
pub fn squared_euclidean_f32(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// `sqrt(squared_euclidean_f32(a, b))`.
#[inline]
#[must_use]
pub fn euclidean_f32(a: &[f32], b: &[f32]) -> f32 {
    squared_euclidean_f32(a, b).sqrt()
}

/// `sum(a_i * b_i)` over two equal-length `f32` slices.
///
/// # Panics
///
/// Panics if `a.len() != b.len()`.
#[inline]
#[must_use]
pub fn inner_product_f32(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// `1 - cosine_similarity(a, b)`, the "cosine distance".
///
/// Returns `1.0` (maximal distance) if either vector has zero norm.
#[inline]
#[must_use]
pub fn cosine_distance_f32(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(a.len(), b.len());
    let dot = inner_product_f32(a, b);
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a * norm_b)
}

/// Splits a stored vector buffer into its core, dtype-encoded bytes
/// (`core_len` of them) and the trailing L2-norm slot appended for
/// cosine-normalised vectors (spec §3), if `bytes` is long enough to carry
/// one. Bytes beyond the slot (there should be none) are ignored.
#[must_use]
pub fn split_cosine_norm(bytes: &[u8], core_len: usize) -> (&[u8], Option<f32>) {
    if bytes.len() >= core_len + 4 {
        let norm = f32::from_le_bytes(bytes[core_len..core_len + 4].try_into().unwrap());
        (&bytes[..core_len], Some(norm))
    } else {
        (bytes, None)
    }
}

/// Recovers the un-normalised inner product from a cosine distance computed
/// over normalised vectors, given the two vectors' original (pre-normalisation)
/// L2 norms (spec §3: "cosine-normalised vectors carry their pre-normalisation
/// L2 norm in a trailing slot so that re-ranking can recover un-normalised
/// scores").
#[inline]
#[must_use]
pub fn recover_unnormalized_score(cosine_distance: f32, norm_a: f32, norm_b: f32) -> f32 {
    (1.0 - cosine_distance) * norm_a * norm_b
}

/// Augments a vector with the quadratic-injection coordinate used to reduce
/// MIPS to squared-Euclidean: appends `sqrt(max(0, max_norm^2 - ||x||^2))`.
#[must_use]
pub fn augment_quadratic(x: &[f32], max_norm: f32) -> Vec<f32> {
    let norm_sq: f32 = x.iter().map(|v| v * v).sum();
    let extra = (max_norm * max_norm - norm_sq).max(0.0).sqrt();
    let mut out = Vec::with_capacity(x.len() + 1);
    out.extend_from_slice(x);
    out.push(extra);
    out
}

/// Augments a vector with the spherical-injection coordinates used to reduce
/// MIPS to squared-Euclidean: rescales `x` onto a sphere of radius
/// `max_norm` and appends the residual coordinate making up the difference.
#[must_use]
pub fn augment_spherical(x: &[f32], max_norm: f32) -> Vec<f32> {
    let norm: f32 = x.iter().map(|v| v * v).sum::<f32>().sqrt();
    let scale = if norm > 0.0 { max_norm / norm } else { 1.0 };
    let mut out: Vec<f32> = x.iter().map(|v| v * scale).collect();
    let residual = (max_norm * max_norm - norm * norm).max(0.0).sqrt();
    out.push(residual);
    out
}

/// Hamming distance between two packed BINARY vectors.
#[inline]
#[must_use]
pub fn hamming(a: &[u32], b: &[u32]) -> f32 {
    binary_hamming_popcount(a, b) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn squared_euclidean_matches_definition() {
        let a = [1.0, 2.0, 3.0];
        let b = [4.0, 5.0, 6.0];
        let expected: f32 = (1.0 - 4.0f32).powi(2) + (2.0 - 5.0f32).powi(2) + (3.0 - 6.0f32).powi(2);
        assert!((squared_euclidean_f32(&a, &b) - expected).abs() < 1e-6);
    }

    #[test]
    fn euclidean_is_sqrt_of_squared() {
        let a = [0.0, 0.0];
        let b = [3.0, 4.0];
        assert!((euclidean_f32(&a, &b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_distance_identical_vectors_is_zero() {
        let a = [1.0, 2.0, 3.0];
        assert!(cosine_distance_f32(&a, &a).abs() < 1e-6);
    }

    #[test]
    fn cosine_distance_orthogonal_vectors_is_one() {
        let a = [1.0, 0.0];
        let b = [0.0, 1.0];
        assert!((cosine_distance_f32(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_distance_zero_vector_is_maximal() {
        let a = [0.0, 0.0];
        let b = [1.0, 1.0];
        assert_eq!(cosine_distance_f32(&a, &b), 1.0);
    }

    #[test]
    fn split_cosine_norm_extracts_trailing_slot() {
        let mut bytes = Vec::new();
        for v in [1.0f32, 2.0, 3.0] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        bytes.extend_from_slice(&7.5f32.to_le_bytes());
        let (core, norm) = split_cosine_norm(&bytes, 12);
        assert_eq!(decode_fp32(core), vec![1.0, 2.0, 3.0]);
        assert_eq!(norm, Some(7.5));
    }

    #[test]
    fn split_cosine_norm_absent_returns_whole_slice() {
        let bytes = [0u8; 12];
        let (core, norm) = split_cosine_norm(&bytes, 12);
        assert_eq!(core.len(), 12);
        assert_eq!(norm, None);
    }

    #[test]
    fn decode_int4_roundtrips_packed_bytes() {
        let packed = crate::numeric::int4::pack_byte(3, -4);
        let decoded = decode_int4(&[packed], 2);
        assert_eq!(decoded, vec![3.0, -4.0]);
    }

    #[test]
    fn decode_fp32_roundtrips() {
        let original = [1.5f32, -2.25, 100.0];
        let mut bytes = Vec::new();
        for v in original {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        assert_eq!(decode_fp32(&bytes), original);
    }

    #[test]
    fn hamming_counts_differing_words() {
        let a = decode_binary(&0u32.to_le_bytes());
        let b = decode_binary(&0xFFu32.to_le_bytes());
        assert_eq!(hamming(&a, &b), 8.0);
    }

    #[test]
    fn augment_quadratic_makes_norms_equal() {
        let x = [3.0, 4.0]; // norm 5
        let augmented = augment_quadratic(&x, 10.0);
        let norm_sq: f32 = augmented.iter().map(|v| v * v).sum();
        assert!((norm_sq - 100.0).abs() < 1e-3);
    }

    #[test]
    fn augment_spherical_projects_onto_sphere() {
        let x = [3.0, 4.0]; // norm 5
        let augmented = augment_spherical(&x, 10.0);
        let first_two_norm: f32 = augmented[..2].iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((first_two_norm - 10.0).abs() < 1e-3);
    }
}
