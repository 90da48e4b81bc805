//! `FlatStreamer`: the incremental variant of the flat index (spec §4.7).
//! Appends go to an in-memory overlay; `search_impl` and `search_bf_impl` are
//! the same brute-force scan (a flat index has no approximate path) over the
//! overlay plus an optional immutable base opened from a prior dump.

use super::provider::FlatProvider;
use crate::distance::IndexMetric;
use crate::error::{Error, Result};
use crate::index::context::IndexContext;
use crate::index::meta::IndexMeta;
use crate::index::provider::{IndexHolder, IndexProvider};
use parking_lot::RwLock;
use std::sync::Arc;

/// Incremental brute-force index: single-writer `add`, concurrent `search`
/// (spec §5: "`add` may be concurrent with `search` but not with another
/// `add` on the same streamer").
pub struct FlatStreamer {
    meta: IndexMeta,
    metric: IndexMetric,
    base: Option<Arc<FlatProvider>>,
    overlay: RwLock<Vec<(u64, Box<[u8]>)>>,
}

impl FlatStreamer {
    /// A fresh streamer with no base (nothing has been dumped yet).
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoExist`] if `meta`'s `(data_type, metric)` has no
    /// registered kernel.
    pub fn new(meta: IndexMeta) -> Result<Self> {
        let metric = IndexMetric::new(meta.data_type, meta.metric)?;
        Ok(Self { meta, metric, base: None, overlay: RwLock::new(Vec::new()) })
    }

    /// Resumes a streamer over a previously dumped base: searches and
    /// iteration see both `base`'s rows and anything added since.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoExist`] if `base`'s `(data_type, metric)` has no
    /// registered kernel.
    pub fn resume(base: Arc<FlatProvider>) -> Result<Self> {
        let meta = base.meta().clone();
        let metric = IndexMetric::new(meta.data_type, meta.metric)?;
        Ok(Self { meta, metric, base: Some(base), overlay: RwLock::new(Vec::new()) })
    }

    /// Number of vectors visible to search (base + overlay).
    #[must_use]
    pub fn len(&self) -> usize {
        self.base.as_ref().map_or(0, |b| b.count()) + self.overlay.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends `(key, vector)` to the overlay (`add_impl`, spec §4.7).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] on a dimension mismatch.
    pub fn add(&self, key: u64, vector: &[u8]) -> Result<()> {
        self.emplace(key, vector)
    }

    fn rows(&self) -> Vec<(u64, Box<[u8]>)> {
        let mut all: Vec<(u64, Box<[u8]>)> = self
            .base
            .as_ref()
            .map(|b| b.create_iterator().map(|(k, v)| (k, v.into_boxed_slice())).collect())
            .unwrap_or_default();
        all.extend(self.overlay.read().iter().cloned());
        all
    }

    /// Exhaustive scan against every row, honouring `ctx`'s filter,
    /// group-by, and scan-limit settings (`search_impl`/`search_bf_impl`:
    /// a flat index has no other search path, so both spec operations
    /// resolve to this one scan).
    pub fn search(&self, ctx: &mut IndexContext, query: &[u8]) -> Vec<(u64, f32)> {
        ctx.reset();
        let rows = self.rows();
        let mut group_counts: std::collections::HashMap<u64, usize> = std::collections::HashMap::new();

        for (dense_id, (key, vector)) in rows.iter().enumerate() {
            if ctx.reach_scan_limit() {
                break;
            }
            ctx.record_visit();
            let dist = self.metric.distance(query, vector, self.meta.dim);

            if let (Some(group_by), Some(group_num), Some(group_topk)) =
                (ctx.group_by.as_ref(), ctx.group_num, ctx.group_topk)
            {
                let group = group_by(*key);
                if !group_counts.contains_key(&group) && group_counts.len() >= group_num {
                    continue;
                }
                let count = group_counts.entry(group).or_insert(0);
                if *count >= group_topk {
                    continue;
                }
                if ctx.offer_result(dist, dense_id as u32, *key) {
                    *count += 1;
                }
                continue;
            }
            ctx.offer_result(dist, dense_id as u32, *key);
        }

        ctx.take_results()
            .into_iter()
            .map(|scored| (rows[scored.id as usize].0, scored.dist))
            .collect()
    }
}

impl IndexHolder for FlatStreamer {
    fn emplace(&self, key: u64, vector: &[u8]) -> Result<()> {
        if vector.len() != self.meta.element_size() {
            return Err(Error::InvalidArgument(format!(
                "expected {} bytes per vector, got {}",
                self.meta.element_size(),
                vector.len()
            )));
        }
        self.overlay.write().push((key, Box::from(vector)));
        Ok(())
    }

    fn create_iterator(&self) -> Box<dyn Iterator<Item = (u64, Vec<u8>)> + '_> {
        let rows = self.rows();
        Box::new(rows.into_iter().map(|(k, v)| (k, v.into_vec())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::{DataType, MetricKind};

    fn meta() -> IndexMeta {
        IndexMeta::new(DataType::Fp32, 2, MetricKind::SquaredEuclidean)
    }

    fn vec2(x: f32, y: f32) -> Vec<u8> {
        let mut out = x.to_le_bytes().to_vec();
        out.extend_from_slice(&y.to_le_bytes());
        out
    }

    #[test]
    fn search_finds_the_closest_added_vector() {
        let streamer = FlatStreamer::new(meta()).unwrap();
        streamer.add(1, &vec2(0.0, 0.0)).unwrap();
        streamer.add(2, &vec2(10.0, 10.0)).unwrap();
        streamer.add(3, &vec2(0.1, 0.1)).unwrap();

        let mut ctx = IndexContext::new(10, 1);
        let results = streamer.search(&mut ctx, &vec2(0.0, 0.0));
        assert_eq!(results[0].0, 1);
    }

    #[test]
    fn add_rejects_wrong_dimension() {
        let streamer = FlatStreamer::new(meta()).unwrap();
        assert!(streamer.add(1, &[0u8; 4]).is_err());
    }

    #[test]
    fn scan_limit_returns_a_partial_result() {
        let streamer = FlatStreamer::new(meta()).unwrap();
        for i in 0..20u64 {
            streamer.add(i, &vec2(i as f32, 0.0)).unwrap();
        }
        let mut ctx = IndexContext::new(20, 5);
        ctx.scan_limit = Some(3);
        let results = streamer.search(&mut ctx, &vec2(0.0, 0.0));
        assert_eq!(ctx.stats.nodes_visited, 3);
        assert!(results.len() <= 3);
    }

    #[test]
    fn len_counts_overlay_only_without_a_base() {
        let streamer = FlatStreamer::new(meta()).unwrap();
        assert!(streamer.is_empty());
        streamer.add(1, &vec2(0.0, 0.0)).unwrap();
        assert_eq!(streamer.len(), 1);
    }
}
