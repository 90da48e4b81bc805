//! `IndexMeta` (spec §3): the descriptor every builder/streamer/provider
//! carries for the vectors it stores.

use crate::distance::{DataType, MetricKind};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Physical layout of a batch of vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MajorOrder {
    /// Vectors stored one after another, contiguous per vector.
    Row,
    /// Vectors interleaved so lane `j` of every block belongs to vector `j`.
    Column,
    /// Not yet committed to a layout (e.g. before the first dump).
    Undefined,
}

/// Descriptor shared by every builder, streamer, and provider in this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMeta {
    /// Numeric encoding of stored vectors.
    pub data_type: DataType,
    /// Vector dimensionality.
    pub dim: usize,
    /// Distance/similarity metric.
    pub metric: MetricKind,
    /// Registered name of the reformer applied to vectors, if any (e.g. `"rabitq"`).
    pub reformer_name: Option<String>,
    /// Physical layout of stored vectors.
    pub major_order: MajorOrder,
    /// Column-major interleave width; meaningless when `major_order != Column`.
    pub batch_count: usize,
}

impl IndexMeta {
    /// Builds a row-major descriptor, the common case for construction
    /// before a layout decision has been made.
    #[must_use]
    pub fn new(data_type: DataType, dim: usize, metric: MetricKind) -> Self {
        Self {
            data_type,
            dim,
            metric,
            reformer_name: None,
            major_order: MajorOrder::Row,
            batch_count: 1,
        }
    }

    /// Bytes occupied by one stored vector under `data_type`, plus a
    /// trailing 4-byte L2-norm slot when `metric` is [`MetricKind::Cosine`]
    /// (spec §3: "cosine-normalised vectors carry their pre-normalisation
    /// L2 norm in a trailing slot so that re-ranking can recover
    /// un-normalised scores").
    #[must_use]
    pub fn element_size(&self) -> usize {
        let core = self.data_type.element_size(self.dim);
        if self.metric == MetricKind::Cosine {
            core + std::mem::size_of::<f32>()
        } else {
            core
        }
    }

    /// Commits this descriptor to column-major layout with the given
    /// interleave width.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `batch_count` isn't a
    /// registered batch width, or `dim` isn't aligned to it (spec §3: "a
    /// metric may forbid certain `major_order` choices").
    pub fn with_column_major(mut self, batch_count: usize) -> Result<Self> {
        if !crate::distance::is_registered_batch_width(batch_count) {
            return Err(Error::InvalidArgument(format!(
                "{batch_count} is not a registered batch width"
            )));
        }
        self.major_order = MajorOrder::Column;
        self.batch_count = batch_count;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::MetricKind;

    #[test]
    fn row_major_default() {
        let meta = IndexMeta::new(DataType::Fp32, 128, MetricKind::SquaredEuclidean);
        assert_eq!(meta.major_order, MajorOrder::Row);
        assert_eq!(meta.element_size(), 512);
    }

    #[test]
    fn cosine_element_size_reserves_a_trailing_norm_slot() {
        let meta = IndexMeta::new(DataType::Fp32, 128, MetricKind::Cosine);
        assert_eq!(meta.element_size(), 128 * 4 + 4);
    }

    #[test]
    fn column_major_rejects_unregistered_width() {
        let meta = IndexMeta::new(DataType::Fp32, 128, MetricKind::SquaredEuclidean);
        assert!(meta.with_column_major(3).is_err());
    }

    #[test]
    fn column_major_accepts_registered_width() {
        let meta = IndexMeta::new(DataType::Fp32, 128, MetricKind::SquaredEuclidean)
            .with_column_major(32)
            .unwrap();
        assert_eq!(meta.batch_count, 32);
    }
}
