//! `FlatBuilder`: accumulates vectors in insertion order and dumps them as a
//! segment file (spec §4.7). Grounded on `storage/dumper.rs`'s
//! `write`/`append`/`finish` sequence.

use super::{BODY_SEG_ID, HEADER_SEG_ID, KEYS_SEG_ID, MAPPING_SEG_ID, META_SEG_ID, OFFSETS_SEG_ID};
use crate::error::{Error, Result};
use crate::index::meta::IndexMeta;
use crate::index::provider::IndexHolder;
use crate::storage::dumper::IndexDumper;
use parking_lot::RwLock;
use std::io::Write;

/// Fixed-width header written before the serialised [`IndexMeta`]: lets a
/// reader size its allocations without deserialising `meta` first.
struct Header {
    count: u64,
    element_size: u64,
}

impl Header {
    fn encode(&self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[0..8].copy_from_slice(&self.count.to_le_bytes());
        out[8..16].copy_from_slice(&self.element_size.to_le_bytes());
        out
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 16 {
            return Err(Error::InvalidFormat("flat header must be 16 bytes".into()));
        }
        Ok(Self {
            count: u64::from_le_bytes(bytes[0..8].try_into().unwrap()),
            element_size: u64::from_le_bytes(bytes[8..16].try_into().unwrap()),
        })
    }
}

/// Batch builder for a flat index: the write side of the build control flow
/// in spec §2 ("an `IndexBuilder` consumes holder+reformer and writes a dump
/// through an `IndexDumper`").
pub struct FlatBuilder {
    meta: IndexMeta,
    rows: RwLock<Vec<(u64, Box<[u8]>)>>,
}

impl FlatBuilder {
    /// An empty builder for vectors matching `meta`.
    #[must_use]
    pub fn new(meta: IndexMeta) -> Self {
        Self { meta, rows: RwLock::new(Vec::new()) }
    }

    /// Number of vectors accumulated so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes `(header, meta, body, keys, mapping, offsets)` segments to
    /// `writer` and returns it once every segment is closed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WriteData`] on an underlying I/O failure, or
    /// [`Error::Internal`] if `meta` can't be serialised.
    pub fn dump<W: Write>(&self, writer: W) -> Result<W> {
        let rows = self.rows.read();
        let stride = self.meta.element_size();
        let mut dumper = IndexDumper::new(writer);

        dumper.write(&Header { count: rows.len() as u64, element_size: stride as u64 }.encode());
        dumper.append(HEADER_SEG_ID)?;

        let meta_bytes =
            bincode::serialize(&self.meta).map_err(|e| Error::Internal(e.to_string()))?;
        dumper.write(&meta_bytes);
        dumper.append(META_SEG_ID)?;

        for (_, vector) in rows.iter() {
            dumper.write(vector);
        }
        dumper.append(BODY_SEG_ID)?;

        for (key, _) in rows.iter() {
            dumper.write(&key.to_le_bytes());
        }
        dumper.append(KEYS_SEG_ID)?;

        let mut order: Vec<u32> = (0..rows.len() as u32).collect();
        order.sort_by_key(|&i| rows[i as usize].0);
        for index in &order {
            dumper.write(&index.to_le_bytes());
        }
        dumper.append(MAPPING_SEG_ID)?;

        for i in 0..rows.len() {
            dumper.write(&((i * stride) as u64).to_le_bytes());
        }
        dumper.append(OFFSETS_SEG_ID)?;

        dumper.finish()
    }
}

impl IndexHolder for FlatBuilder {
    fn emplace(&self, key: u64, vector: &[u8]) -> Result<()> {
        if vector.len() != self.meta.element_size() {
            return Err(Error::InvalidArgument(format!(
                "expected {} bytes per vector, got {}",
                self.meta.element_size(),
                vector.len()
            )));
        }
        self.rows.write().push((key, Box::from(vector)));
        Ok(())
    }

    fn create_iterator(&self) -> Box<dyn Iterator<Item = (u64, Vec<u8>)> + '_> {
        let rows = self.rows.read().clone();
        Box::new(rows.into_iter().map(|(k, v)| (k, v.into_vec())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::{DataType, MetricKind};
    use crate::storage::memory::MemoryStorage;
    use crate::storage::traits::Storage;

    fn meta() -> IndexMeta {
        IndexMeta::new(DataType::Fp32, 2, MetricKind::SquaredEuclidean)
    }

    #[test]
    fn emplace_rejects_wrong_dimension() {
        let builder = FlatBuilder::new(meta());
        assert!(builder.emplace(1, &[0u8; 4]).is_err());
    }

    #[test]
    fn dump_writes_every_segment() {
        let builder = FlatBuilder::new(meta());
        builder.emplace(10, &0f32.to_le_bytes().repeat(2)).unwrap();
        builder.emplace(5, &1f32.to_le_bytes().repeat(2)).unwrap();
        let bytes = builder.dump(Vec::new()).unwrap();
        let storage = MemoryStorage::open(bytes).unwrap();
        for id in [HEADER_SEG_ID, META_SEG_ID, BODY_SEG_ID, KEYS_SEG_ID, MAPPING_SEG_ID, OFFSETS_SEG_ID] {
            assert!(storage.segment(id).is_ok(), "missing segment {id}");
        }
        let header = Header::decode(storage.segment(HEADER_SEG_ID).unwrap()).unwrap();
        assert_eq!(header.count, 2);
        assert_eq!(header.element_size, 8);
    }

    #[test]
    fn mapping_sorts_keys_ascending() {
        let builder = FlatBuilder::new(meta());
        builder.emplace(30, &0f32.to_le_bytes().repeat(2)).unwrap();
        builder.emplace(10, &1f32.to_le_bytes().repeat(2)).unwrap();
        builder.emplace(20, &2f32.to_le_bytes().repeat(2)).unwrap();
        let bytes = builder.dump(Vec::new()).unwrap();
        let storage = MemoryStorage::open(bytes).unwrap();
        let keys_seg = storage.segment(KEYS_SEG_ID).unwrap();
        let mapping_seg = storage.segment(MAPPING_SEG_ID).unwrap();
        let mut sorted_keys = Vec::new();
        for chunk in mapping_seg.chunks(4) {
            let row = u32::from_le_bytes(chunk.try_into().unwrap()) as usize;
            let key_bytes = &keys_seg[row * 8..row * 8 + 8];
            sorted_keys.push(u64::from_le_bytes(key_bytes.try_into().unwrap()));
        }
        assert_eq!(sorted_keys, vec![10, 20, 30]);
    }
}
