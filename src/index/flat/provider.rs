//! `FlatProvider`: read-only view over a dumped flat index (spec §4.7).
//! `get_vector` binary-searches the sorted `mapping` segment for O(log N)
//! lookup; the iterator walks `body` in insertion order.

use super::{BODY_SEG_ID, KEYS_SEG_ID, MAPPING_SEG_ID, META_SEG_ID};
use crate::distance::DataType;
use crate::error::{Error, Result};
use crate::index::meta::IndexMeta;
use crate::index::provider::IndexProvider;
use crate::storage::traits::Storage;
use std::sync::Arc;

/// Opens a dumped flat index for lookup and iteration.
pub struct FlatProvider {
    meta: IndexMeta,
    storage: Arc<dyn Storage>,
    count: usize,
}

impl FlatProvider {
    /// Parses `storage`'s `meta`/`body`/`keys`/`mapping` segments.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFormat`] if `meta` can't be deserialised, or
    /// [`Error::NoExist`] if a required segment is missing.
    pub fn open(storage: Arc<dyn Storage>) -> Result<Self> {
        let meta_bytes = storage.segment(META_SEG_ID)?;
        let meta: IndexMeta =
            bincode::deserialize(meta_bytes).map_err(|e| Error::InvalidFormat(e.to_string()))?;
        let keys_bytes = storage.segment(KEYS_SEG_ID)?;
        let count = keys_bytes.len() / 8;
        Ok(Self { meta, storage, count })
    }

    /// The descriptor this provider was opened with.
    #[must_use]
    pub fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    fn keys(&self) -> Result<&[u8]> {
        self.storage.segment(KEYS_SEG_ID)
    }

    fn mapping(&self) -> Result<&[u8]> {
        self.storage.segment(MAPPING_SEG_ID)
    }

    fn key_at(&self, dense_index: usize) -> Result<u64> {
        let keys = self.keys()?;
        let start = dense_index * 8;
        Ok(u64::from_le_bytes(keys[start..start + 8].try_into().unwrap()))
    }

    /// Row index (insertion order) of `key`, via binary search over `mapping`.
    fn dense_index_of(&self, key: u64) -> Result<usize> {
        let mapping = self.mapping()?;
        let mut lo = 0usize;
        let mut hi = self.count;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let row = u32::from_le_bytes(mapping[mid * 4..mid * 4 + 4].try_into().unwrap()) as usize;
            let candidate = self.key_at(row)?;
            match candidate.cmp(&key) {
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
                std::cmp::Ordering::Equal => return Ok(row),
            }
        }
        Err(Error::NoExist(format!("key {key}")))
    }
}

impl IndexProvider for FlatProvider {
    fn count(&self) -> usize {
        self.count
    }

    fn dimension(&self) -> usize {
        self.meta.dim
    }

    fn data_type(&self) -> DataType {
        self.meta.data_type
    }

    fn element_size(&self) -> usize {
        self.meta.element_size()
    }

    fn get_vector(&self, key: u64) -> Result<Vec<u8>> {
        let row = self.dense_index_of(key)?;
        let stride = self.element_size();
        let body = self.storage.segment(BODY_SEG_ID)?;
        let start = row * stride;
        Ok(body[start..start + stride].to_vec())
    }

    fn create_iterator(&self) -> Box<dyn Iterator<Item = (u64, Vec<u8>)> + '_> {
        let stride = self.element_size();
        let body = self.storage.segment(BODY_SEG_ID).unwrap_or(&[]);
        let keys = self.storage.segment(KEYS_SEG_ID).unwrap_or(&[]);
        let count = self.count;
        Box::new((0..count).map(move |i| {
            let key = u64::from_le_bytes(keys[i * 8..i * 8 + 8].try_into().unwrap());
            let vector = body[i * stride..i * stride + stride].to_vec();
            (key, vector)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::MetricKind;
    use crate::index::flat::FlatBuilder;
    use crate::storage::memory::MemoryStorage;

    fn built_storage() -> Arc<dyn Storage> {
        let meta = IndexMeta::new(DataType::Fp32, 2, MetricKind::SquaredEuclidean);
        let builder = FlatBuilder::new(meta);
        builder.emplace(30, &[0u8; 8]).unwrap();
        builder.emplace(10, &1f32.to_le_bytes().repeat(2)).unwrap();
        builder.emplace(20, &2f32.to_le_bytes().repeat(2)).unwrap();
        let bytes = builder.dump(Vec::new()).unwrap();
        Arc::new(MemoryStorage::open(bytes).unwrap())
    }

    #[test]
    fn get_vector_finds_each_inserted_key() {
        let provider = FlatProvider::open(built_storage()).unwrap();
        assert_eq!(provider.get_vector(10).unwrap(), 1f32.to_le_bytes().repeat(2));
        assert_eq!(provider.get_vector(20).unwrap(), 2f32.to_le_bytes().repeat(2));
        assert_eq!(provider.get_vector(30).unwrap(), vec![0u8; 8]);
    }

    #[test]
    fn get_vector_missing_key_is_no_exist() {
        let provider = FlatProvider::open(built_storage()).unwrap();
        let err = provider.get_vector(999).unwrap_err();
        assert_eq!(err.code(), "VEC-003");
    }

    #[test]
    fn create_iterator_yields_insertion_order() {
        let provider = FlatProvider::open(built_storage()).unwrap();
        let keys: Vec<u64> = provider.create_iterator().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![30, 10, 20]);
    }

    #[test]
    fn count_and_dimension_match_meta() {
        let provider = FlatProvider::open(built_storage()).unwrap();
        assert_eq!(provider.count(), 3);
        assert_eq!(provider.dimension(), 2);
        assert_eq!(provider.element_size(), 8);
    }
}
