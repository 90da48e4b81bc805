//! Column-major batched distance kernels (spec §4.2).
//!
//! `M` candidate vectors are interleaved so that the `j`-th lane of each
//! block belongs to the `j`-th vector: element `d` of all `M` vectors is
//! stored contiguously before element `d+1` of any of them. A single pass
//! over `dim` then produces `M` partial sums directly, with no gather.
//!
//! Only the widths in [`super::BATCH_WIDTHS`] are valid; anything else is a
//! caller error (`InvalidArgument`), not a silently wrong answer — there is
//! no partial-batch fallback (spec §4.2: "callers align inputs to the batch
//! width and handle the tail with scalar calls").

use super::scalar::{decode_fp32, squared_euclidean_f32, inner_product_f32, cosine_distance_f32};
use super::{is_registered_batch_width, DataType, MetricKind};
use crate::error::{Error, Result};

/// A set of `m` FP32 vectors of dimension `dim`, stored column-major
/// (interleaved): `data[d * m + j]` is element `d` of vector `j`.
pub struct ColumnMajorBatch<'a> {
    data: &'a [f32],
    m: usize,
    dim: usize,
}

impl<'a> ColumnMajorBatch<'a> {
    /// Wraps an existing column-major buffer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `m` is not a registered batch
    /// width or `data.len() != m * dim`.
    pub fn new(data: &'a [f32], m: usize, dim: usize) -> Result<Self> {
        if !is_registered_batch_width(m) {
            return Err(Error::InvalidArgument(format!(
                "batch width {m} is not a registered power-of-two width"
            )));
        }
        if data.len() != m * dim {
            return Err(Error::InvalidArgument(format!(
                "column-major batch data length {} does not match m*dim = {}",
                data.len(),
                m * dim
            )));
        }
        Ok(Self { data, m, dim })
    }

    /// Builds a column-major batch from `m` row-major FP32 vectors.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `m` is not a registered batch
    /// width or any row has the wrong length.
    pub fn from_rows(rows: &[&[f32]], dim: usize) -> Result<Vec<f32>> {
        let m = rows.len();
        if !is_registered_batch_width(m) {
            return Err(Error::InvalidArgument(format!(
                "batch width {m} is not a registered power-of-two width"
            )));
        }
        let mut data = vec![0.0f32; m * dim];
        for (j, row) in rows.iter().enumerate() {
            if row.len() != dim {
                return Err(Error::InvalidArgument(format!(
                    "row {j} has length {} but dim is {dim}",
                    row.len()
                )));
            }
            for d in 0..dim {
                data[d * m + j] = row[d];
            }
        }
        Ok(data)
    }

    /// Number of vectors in the batch.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.m
    }

    /// Extracts vector `j` as an owned row-major `f32` vector.
    ///
    /// # Panics
    ///
    /// Panics if `j >= self.width()`.
    #[must_use]
    pub fn extract_row(&self, j: usize) -> Vec<f32> {
        assert!(j < self.m);
        (0..self.dim).map(|d| self.data[d * self.m + j]).collect()
    }
}

/// Computes `query` against every vector in `batch` for the given metric,
/// writing `batch.width()` distances into `out`.
///
/// This is the FP32 specialisation of spec §4.2's `FlatDistanceMatrix<K>`
/// recursion: rather than hand-writing one kernel per power-of-two `K`, a
/// single column-major accumulation loop produces all `M` partial sums in
/// one pass over `dim`, and the metric-specific finishing step (sqrt, 1-x,
/// negation) is applied once per lane at the end.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] if `out.len() != batch.width()`, or
/// [`Error::NoExist`] if the metric has no 1xN matrix kernel (spec's Cosine
/// placeholder for non-`(1,1)` shapes is treated as unimplemented rather than
/// silently returning zero — see `DESIGN.md`).
pub fn distance_one_to_batch_fp32(
    query: &[f32],
    batch: &ColumnMajorBatch<'_>,
    metric: MetricKind,
    out: &mut [f32],
) -> Result<()> {
    if out.len() != batch.width() {
        return Err(Error::InvalidArgument(format!(
            "out length {} does not match batch width {}",
            out.len(),
            batch.width()
        )));
    }
    let dim = batch.dim;
    let m = batch.m;
    assert_eq!(query.len(), dim);

    match metric {
        MetricKind::SquaredEuclidean | MetricKind::MipsSquaredEuclidean(_) => {
            accumulate_squared_euclidean(query, batch, out);
        }
        MetricKind::Euclidean => {
            accumulate_squared_euclidean(query, batch, out);
            for v in out.iter_mut() {
                *v = v.sqrt();
            }
        }
        MetricKind::InnerProduct => {
            accumulate_inner_product(query, batch, out);
        }
        MetricKind::MinusInnerProduct => {
            accumulate_inner_product(query, batch, out);
            for v in out.iter_mut() {
                *v = -*v;
            }
        }
        MetricKind::Cosine => {
            // Spec §9 open question: the original's matrix-shaped Cosine
            // kernel was a stub returning 0.0. Rather than port the bug, we
            // implement it directly (row extraction + the verified 1x1
            // kernel), at the cost of `m` extractions instead of one fused
            // pass (see `DESIGN.md`).
            for j in 0..m {
                let row = batch.extract_row(j);
                out[j] = cosine_distance_f32(query, &row);
            }
        }
        MetricKind::Hamming => {
            return Err(Error::NoExist(
                "Hamming has no FP32 batch kernel; BINARY dtype only".into(),
            ));
        }
    }
    Ok(())
}

fn accumulate_squared_euclidean(query: &[f32], batch: &ColumnMajorBatch<'_>, out: &mut [f32]) {
    let m = batch.m;
    out.fill(0.0);
    for d in 0..batch.dim {
        let q = query[d];
        let lane = &batch.data[d * m..(d + 1) * m];
        for j in 0..m {
            let diff = q - lane[j];
            out[j] += diff * diff;
        }
    }
}

fn accumulate_inner_product(query: &[f32], batch: &ColumnMajorBatch<'_>, out: &mut [f32]) {
    let m = batch.m;
    out.fill(0.0);
    for d in 0..batch.dim {
        let q = query[d];
        let lane = &batch.data[d * m..(d + 1) * m];
        for j in 0..m {
            out[j] += q * lane[j];
        }
    }
}

/// Reference (non-batched) computation: applies the 1x1 scalar kernel `N`
/// times. Used by tests to verify property 2 (spec §8): the batched kernel's
/// output equals the N-fold application of the 1x1 kernel.
#[must_use]
pub fn reference_one_to_many(query: &[f32], rows: &[&[f32]], metric: MetricKind) -> Vec<f32> {
    rows.iter()
        .map(|row| match metric {
            MetricKind::SquaredEuclidean | MetricKind::MipsSquaredEuclidean(_) => {
                squared_euclidean_f32(query, row)
            }
            MetricKind::Euclidean => squared_euclidean_f32(query, row).sqrt(),
            MetricKind::InnerProduct => inner_product_f32(query, row),
            MetricKind::MinusInnerProduct => -inner_product_f32(query, row),
            MetricKind::Cosine => cosine_distance_f32(query, row),
            MetricKind::Hamming => unreachable!("Hamming is BINARY-only"),
        })
        .collect()
}

/// Decodes `m` row-major FP32 candidate vectors from a contiguous byte
/// buffer into a column-major batch buffer ready for
/// [`distance_one_to_batch_fp32`].
#[must_use]
pub fn column_major_from_bytes(candidates: &[u8], m: usize, dim: usize) -> Vec<f32> {
    let stride = DataType::Fp32.element_size(dim);
    let rows: Vec<Vec<f32>> = (0..m)
        .map(|j| decode_fp32(&candidates[j * stride..(j + 1) * stride]))
        .collect();
    let row_refs: Vec<&[f32]> = rows.iter().map(Vec::as_slice).collect();
    ColumnMajorBatch::from_rows(&row_refs, dim).expect("caller guarantees valid batch width")
}
