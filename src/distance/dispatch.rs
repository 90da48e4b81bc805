//! Zero-overhead dispatch: CPU features are probed once per process and the
//! selected function pointer is cached behind an `OnceLock`, mirroring the
//! teacher's `simd_dispatch.rs`. Construction of an [`super::IndexMetric`]
//! resolves straight to one of the `fn` items below; there is no per-call
//! feature check in the hot path.

use super::scalar::{
    cosine_distance_f32, decode_binary, decode_fp16, decode_fp32, decode_int8, hamming,
    inner_product_f32, split_cosine_norm, squared_euclidean_f32,
};
use super::{DataType, MetricKind};
use crate::numeric::int4::{unpack_byte, Int4MulTable, Int4SquaredDiffTable};
use std::sync::OnceLock;
use wide::f32x8;

/// Signature shared by every registered 1x1 kernel: `(lhs_bytes, rhs_bytes,
/// dim) -> distance`.
pub type OneToOneFn = fn(&[u8], &[u8], usize) -> f32;

/// Signature for the decoded-`f32` elementwise reduction a kernel performs
/// once bytes have been brought into a common representation.
type F32ReduceFn = fn(&[f32], &[f32]) -> f32;

static SQUARED_EUCLIDEAN_F32_FN: OnceLock<F32ReduceFn> = OnceLock::new();
static INNER_PRODUCT_F32_FN: OnceLock<F32ReduceFn> = OnceLock::new();

fn squared_euclidean_scalar(a: &[f32], b: &[f32]) -> f32 {
    squared_euclidean_f32(a, b)
}

fn squared_euclidean_wide(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(a.len(), b.len());
    let chunks = a.len() / 8;
    let mut acc = f32x8::ZERO;
    for i in 0..chunks {
        let off = i * 8;
        let va = f32x8::from(&a[off..off + 8]);
        let vb = f32x8::from(&b[off..off + 8]);
        let d = va - vb;
        acc += d * d;
    }
    let mut result = acc.reduce_add();
    for i in (chunks * 8)..a.len() {
        let d = a[i] - b[i];
        result += d * d;
    }
    result
}

fn inner_product_scalar(a: &[f32], b: &[f32]) -> f32 {
    inner_product_f32(a, b)
}

fn inner_product_wide(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(a.len(), b.len());
    let chunks = a.len() / 8;
    let mut acc = f32x8::ZERO;
    for i in 0..chunks {
        let off = i * 8;
        let va = f32x8::from(&a[off..off + 8]);
        let vb = f32x8::from(&b[off..off + 8]);
        acc = va.mul_add(vb, acc);
    }
    let mut result = acc.reduce_add();
    for i in (chunks * 8)..a.len() {
        result += a[i] * b[i];
    }
    result
}

/// Detected CPU feature tiers, reported for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimdFeatures {
    /// AVX2 available (x86_64 only; always `false` elsewhere).
    pub avx2: bool,
    /// NEON available (guaranteed on aarch64; always `false` elsewhere).
    pub neon: bool,
}

impl SimdFeatures {
    /// Probes the current process's CPU features.
    #[must_use]
    pub fn detect() -> Self {
        #[cfg(target_arch = "x86_64")]
        {
            Self {
                avx2: is_x86_feature_detected!("avx2"),
                neon: false,
            }
        }
        #[cfg(target_arch = "aarch64")]
        {
            Self {
                avx2: false,
                neon: true,
            }
        }
        #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
        {
            Self {
                avx2: false,
                neon: false,
            }
        }
    }

    /// Whether a vectorised (lane-parallel) kernel is available at all.
    #[must_use]
    pub const fn has_vector_unit(self) -> bool {
        self.avx2 || self.neon
    }
}

fn select_squared_euclidean_f32() -> F32ReduceFn {
    if SimdFeatures::detect().has_vector_unit() {
        squared_euclidean_wide
    } else {
        squared_euclidean_scalar
    }
}

fn select_inner_product_f32() -> F32ReduceFn {
    if SimdFeatures::detect().has_vector_unit() {
        inner_product_wide
    } else {
        inner_product_scalar
    }
}

fn squared_euclidean_f32_dispatched(a: &[f32], b: &[f32]) -> f32 {
    let f = SQUARED_EUCLIDEAN_F32_FN.get_or_init(select_squared_euclidean_f32);
    f(a, b)
}

fn inner_product_f32_dispatched(a: &[f32], b: &[f32]) -> f32 {
    let f = INNER_PRODUCT_F32_FN.get_or_init(select_inner_product_f32);
    f(a, b)
}

// ---------------------------------------------------------------------
// Per-(dtype, metric) byte-level kernels.
// ---------------------------------------------------------------------

fn fp32_squared_euclidean(lhs: &[u8], rhs: &[u8], _dim: usize) -> f32 {
    squared_euclidean_f32_dispatched(&decode_fp32(lhs), &decode_fp32(rhs))
}
fn fp32_euclidean(lhs: &[u8], rhs: &[u8], dim: usize) -> f32 {
    fp32_squared_euclidean(lhs, rhs, dim).sqrt()
}
fn fp32_inner_product(lhs: &[u8], rhs: &[u8], _dim: usize) -> f32 {
    inner_product_f32_dispatched(&decode_fp32(lhs), &decode_fp32(rhs))
}
fn fp32_minus_inner_product(lhs: &[u8], rhs: &[u8], dim: usize) -> f32 {
    -fp32_inner_product(lhs, rhs, dim)
}
fn fp32_cosine(lhs: &[u8], rhs: &[u8], dim: usize) -> f32 {
    let (lhs_core, _) = split_cosine_norm(lhs, dim * 4);
    let (rhs_core, _) = split_cosine_norm(rhs, dim * 4);
    cosine_distance_f32(&decode_fp32(lhs_core), &decode_fp32(rhs_core))
}

fn fp16_squared_euclidean(lhs: &[u8], rhs: &[u8], _dim: usize) -> f32 {
    squared_euclidean_f32_dispatched(&decode_fp16(lhs), &decode_fp16(rhs))
}
fn fp16_euclidean(lhs: &[u8], rhs: &[u8], dim: usize) -> f32 {
    fp16_squared_euclidean(lhs, rhs, dim).sqrt()
}
fn fp16_inner_product(lhs: &[u8], rhs: &[u8], _dim: usize) -> f32 {
    inner_product_f32_dispatched(&decode_fp16(lhs), &decode_fp16(rhs))
}
fn fp16_minus_inner_product(lhs: &[u8], rhs: &[u8], dim: usize) -> f32 {
    -fp16_inner_product(lhs, rhs, dim)
}
fn fp16_cosine(lhs: &[u8], rhs: &[u8], dim: usize) -> f32 {
    let (lhs_core, _) = split_cosine_norm(lhs, dim * 2);
    let (rhs_core, _) = split_cosine_norm(rhs, dim * 2);
    cosine_distance_f32(&decode_fp16(lhs_core), &decode_fp16(rhs_core))
}

fn int8_squared_euclidean(lhs: &[u8], rhs: &[u8], _dim: usize) -> f32 {
    squared_euclidean_f32_dispatched(&decode_int8(lhs), &decode_int8(rhs))
}
fn int8_euclidean(lhs: &[u8], rhs: &[u8], dim: usize) -> f32 {
    int8_squared_euclidean(lhs, rhs, dim).sqrt()
}
fn int8_inner_product(lhs: &[u8], rhs: &[u8], _dim: usize) -> f32 {
    inner_product_f32_dispatched(&decode_int8(lhs), &decode_int8(rhs))
}
fn int8_minus_inner_product(lhs: &[u8], rhs: &[u8], dim: usize) -> f32 {
    -int8_inner_product(lhs, rhs, dim)
}
fn int8_cosine(lhs: &[u8], rhs: &[u8], dim: usize) -> f32 {
    let (lhs_core, _) = split_cosine_norm(lhs, dim);
    let (rhs_core, _) = split_cosine_norm(rhs, dim);
    cosine_distance_f32(&decode_int8(lhs_core), &decode_int8(rhs_core))
}

/// Exact INT4 squared Euclidean via the precomputed squared-difference table
/// (spec testable property 1: exact for INT4).
fn int4_squared_euclidean(lhs: &[u8], rhs: &[u8], _dim: usize) -> f32 {
    let table = Int4SquaredDiffTable::get();
    let mut acc: i32 = 0;
    for (&l, &r) in lhs.iter().zip(rhs.iter()) {
        let (even, odd) = table.lookup(l, r);
        acc += i32::from(even) + i32::from(odd);
    }
    acc as f32
}
fn int4_euclidean(lhs: &[u8], rhs: &[u8], dim: usize) -> f32 {
    int4_squared_euclidean(lhs, rhs, dim).sqrt()
}
fn int4_inner_product(lhs: &[u8], rhs: &[u8], _dim: usize) -> f32 {
    let table = Int4MulTable::get();
    let mut acc: i32 = 0;
    for (&l, &r) in lhs.iter().zip(rhs.iter()) {
        let (even, odd) = table.lookup(l, r);
        acc += i32::from(even) + i32::from(odd);
    }
    acc as f32
}
fn int4_minus_inner_product(lhs: &[u8], rhs: &[u8], dim: usize) -> f32 {
    -int4_inner_product(lhs, rhs, dim)
}

fn binary_hamming(lhs: &[u8], rhs: &[u8], _dim: usize) -> f32 {
    hamming(&decode_binary(lhs), &decode_binary(rhs))
}

/// Resolves the 1x1 kernel for `(dtype, metric)`, or `None` if the
/// combination has no registered kernel (spec §4.2 failure semantics).
#[must_use]
pub fn resolve_one_to_one(dtype: DataType, metric: MetricKind) -> Option<OneToOneFn> {
    use DataType::{Binary, Fp16, Fp32, Int4, Int8};
    use MetricKind::{
        Cosine, Euclidean, Hamming, InnerProduct, MinusInnerProduct, MipsSquaredEuclidean,
        SquaredEuclidean,
    };
    match (dtype, metric) {
        (Binary, Hamming) => Some(binary_hamming),
        (Fp32, SquaredEuclidean | MipsSquaredEuclidean(_)) => Some(fp32_squared_euclidean),
        (Fp32, Euclidean) => Some(fp32_euclidean),
        (Fp32, InnerProduct) => Some(fp32_inner_product),
        (Fp32, MinusInnerProduct) => Some(fp32_minus_inner_product),
        (Fp32, Cosine) => Some(fp32_cosine),
        (Fp16, SquaredEuclidean | MipsSquaredEuclidean(_)) => Some(fp16_squared_euclidean),
        (Fp16, Euclidean) => Some(fp16_euclidean),
        (Fp16, InnerProduct) => Some(fp16_inner_product),
        (Fp16, MinusInnerProduct) => Some(fp16_minus_inner_product),
        (Fp16, Cosine) => Some(fp16_cosine),
        (Int8, SquaredEuclidean | MipsSquaredEuclidean(_)) => Some(int8_squared_euclidean),
        (Int8, Euclidean) => Some(int8_euclidean),
        (Int8, InnerProduct) => Some(int8_inner_product),
        (Int8, MinusInnerProduct) => Some(int8_minus_inner_product),
        (Int8, Cosine) => Some(int8_cosine),
        (Int4, SquaredEuclidean) => Some(int4_squared_euclidean),
        (Int4, Euclidean) => Some(int4_euclidean),
        (Int4, InnerProduct) => Some(int4_inner_product),
        (Int4, MinusInnerProduct) => Some(int4_minus_inner_product),
        _ => None,
    }
}

fn unpack_int4_to_f32(bytes: &[u8], dim: usize) -> Vec<f32> {
    let mut out = Vec::with_capacity(dim);
    for &b in bytes {
        let (e, o) = unpack_byte(b);
        out.push(f32::from(e));
        if out.len() < dim {
            out.push(f32::from(o));
        }
    }
    out.truncate(dim);
    out
}
