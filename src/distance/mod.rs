//! Distance kernels (C2): one-to-one, one-to-many, and matrix-to-matrix
//! similarity computation over multiple numeric encodings under four
//! metrics, with runtime CPU-feature dispatch.
//!
//! The dispatch table lives in [`dispatch`]; scalar 1x1 kernels live in
//! [`scalar`]; column-major batched kernels live in [`batch`]. [`IndexMetric`]
//! is the handle callers hold: it is constructed once for a `(dtype, metric)`
//! pair and caches the selected function, matching the teacher's
//! `OnceLock`-backed dispatch cache (see `DESIGN.md`).

pub mod batch;
pub mod dispatch;
pub mod scalar;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Numeric encoding of a stored vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    /// 32-bit IEEE-754 float.
    Fp32,
    /// 16-bit IEEE-754 half float.
    Fp16,
    /// 8-bit signed integer.
    Int8,
    /// Packed 4-bit two's-complement integer, two elements per byte.
    Int4,
    /// Packed bits, 32-bit word granularity.
    Binary,
}

impl DataType {
    /// Bytes needed to store `dim` elements of this encoding.
    ///
    /// # Panics
    ///
    /// Panics if `dim` violates the encoding's alignment invariant (INT4:
    /// even `dim`; BINARY: `dim` multiple of 32).
    #[must_use]
    pub fn element_size(self, dim: usize) -> usize {
        match self {
            Self::Fp32 => dim * 4,
            Self::Fp16 => dim * 2,
            Self::Int8 => dim,
            Self::Int4 => crate::numeric::int4::packed_len(dim),
            Self::Binary => crate::numeric::binary::word_len(dim) * 4,
        }
    }
}

/// How MIPS (maximum inner product search) is reduced to an L2 problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MipsInjection {
    /// Appends a coordinate derived from `max_norm^2 - ||x||^2`.
    Quadratic,
    /// Projects onto a sphere of fixed radius before the L2 reduction.
    Spherical,
}

/// Distance/similarity metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MetricKind {
    /// Bit-difference count; BINARY dtype only.
    Hamming,
    /// `sum((a_i - b_i)^2)`.
    SquaredEuclidean,
    /// `sqrt(SquaredEuclidean)`.
    Euclidean,
    /// `sum(a_i * b_i)`.
    InnerProduct,
    /// `-InnerProduct`, so that max-IP becomes a min problem.
    MinusInnerProduct,
    /// `1 - InnerProduct` over L2-normalised inputs; expects a trailing norm
    /// slot in the stored vector for lossless recovery of un-normalised scores.
    Cosine,
    /// MIPS reduced to an L2 problem via quadratic or spherical injection.
    MipsSquaredEuclidean(MipsInjection),
}

impl MetricKind {
    /// Whether a larger raw score means "more similar" for this metric.
    #[must_use]
    pub const fn higher_is_better(self) -> bool {
        matches!(self, Self::InnerProduct)
    }

    /// Whether this metric requires BINARY-encoded input.
    #[must_use]
    pub const fn requires_binary(self) -> bool {
        matches!(self, Self::Hamming)
    }
}

/// The registered batch widths for column-major kernels (spec §4.2).
pub const BATCH_WIDTHS: [usize; 8] = [1, 2, 4, 8, 16, 32, 64, 128];

/// Returns `true` if `m` is a registered batch width.
#[must_use]
pub fn is_registered_batch_width(m: usize) -> bool {
    BATCH_WIDTHS.contains(&m)
}

/// A resolved, reusable distance handle for one `(dtype, metric)` pair.
///
/// Constructing an `IndexMetric` performs CPU-feature dispatch once; the
/// resolved function pointer is cached for the handle's lifetime. Switching
/// metric or dtype requires building a new handle (spec §4.2).
#[derive(Clone)]
pub struct IndexMetric {
    dtype: DataType,
    metric: MetricKind,
    kernel: dispatch::OneToOneFn,
}

impl IndexMetric {
    /// Resolves a metric handle for `(dtype, metric)`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoExist`] if no kernel is registered for this
    /// `(dtype, metric)` combination on the current CPU/target (spec §4.2:
    /// "a metric with no kernel ... returns null; the caller must report
    /// `NoExist`").
    pub fn new(dtype: DataType, metric: MetricKind) -> Result<Self> {
        if metric.requires_binary() && dtype != DataType::Binary {
            return Err(Error::InvalidArgument(format!(
                "{metric:?} requires Binary dtype, got {dtype:?}"
            )));
        }
        let kernel = dispatch::resolve_one_to_one(dtype, metric)
            .ok_or_else(|| Error::NoExist(format!("no kernel for {dtype:?}/{metric:?}")))?;
        Ok(Self {
            dtype,
            metric,
            kernel,
        })
    }

    /// The dtype this handle was built for.
    #[must_use]
    pub const fn data_type(self) -> DataType {
        self.dtype
    }

    /// The metric this handle was built for.
    #[must_use]
    pub const fn metric(self) -> MetricKind {
        self.metric
    }

    /// Scalar 1x1 distance between two raw byte buffers of `dim` elements.
    ///
    /// # Panics
    ///
    /// Panics if `lhs`/`rhs` are not sized per `dtype.element_size(dim)`.
    #[must_use]
    pub fn distance(&self, lhs: &[u8], rhs: &[u8], dim: usize) -> f32 {
        (self.kernel)(lhs, rhs, dim)
    }

    /// Recovers the un-normalised inner product behind a [`Self::distance`]
    /// call made under [`MetricKind::Cosine`], using the trailing L2-norm
    /// slot each side's stored vector carries (spec §3). Returns `None` for
    /// any other metric, or if either side carries no slot (exactly `dim`
    /// elements, nothing trailing).
    #[must_use]
    pub fn recover_unnormalized(&self, lhs: &[u8], rhs: &[u8], dim: usize, distance: f32) -> Option<f32> {
        if self.metric != MetricKind::Cosine {
            return None;
        }
        let core_len = self.dtype.element_size(dim);
        let (_, norm_a) = scalar::split_cosine_norm(lhs, core_len);
        let (_, norm_b) = scalar::split_cosine_norm(rhs, core_len);
        Some(scalar::recover_unnormalized_score(distance, norm_a?, norm_b?))
    }

    /// Bytes one stored element occupies under this handle's `(dtype,
    /// metric)`, matching [`crate::index::meta::IndexMeta::element_size`]'s
    /// trailing norm slot for [`MetricKind::Cosine`].
    fn stride(&self, dim: usize) -> usize {
        let core = self.dtype.element_size(dim);
        if self.metric == MetricKind::Cosine {
            core + std::mem::size_of::<f32>()
        } else {
            core
        }
    }

    /// One query against `n` candidates packed contiguously in `candidates`
    /// (row-major, `n * self.stride(dim)` bytes), writing `n` outputs.
    pub fn distance_one_to_many(
        &self,
        query: &[u8],
        candidates: &[u8],
        dim: usize,
        n: usize,
        out: &mut [f32],
    ) {
        assert_eq!(out.len(), n);
        let stride = self.stride(dim);
        for i in 0..n {
            let c = &candidates[i * stride..(i + 1) * stride];
            out[i] = (self.kernel)(query, c, dim);
        }
    }
}
