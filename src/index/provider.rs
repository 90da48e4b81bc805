//! Opaque read/write views over a built index (C10, spec §4.9).
//!
//! `IndexProvider` is the read-only surface handed to a search path;
//! `IndexHolder` is the producer side a builder/streamer exposes while still
//! accepting inserts. Both are implemented by the flat and HNSW index types
//! over their own storage rather than duplicating iteration/lookup logic —
//! grounded on the teacher's split between `Storage` (read side) and
//! `StorageBuilder`/mutable storage (write side) in `storage/mod.rs`.

use crate::distance::DataType;
use crate::error::Result;

/// Read-only view of a built index's vectors.
pub trait IndexProvider: Send + Sync {
    /// Number of vectors currently stored.
    fn count(&self) -> usize;

    /// Vector dimensionality.
    fn dimension(&self) -> usize;

    /// Numeric encoding of stored vectors.
    fn data_type(&self) -> DataType;

    /// Bytes occupied by one stored vector.
    fn element_size(&self) -> usize;

    /// Fetches the raw bytes of the vector stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::NoExist`] if `key` isn't present.
    fn get_vector(&self, key: u64) -> Result<Vec<u8>>;

    /// Fetches several vectors at once, writing each one's bytes
    /// contiguously into `out` (`out.len()` must be `keys.len() *
    /// element_size()`).
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::InvalidArgument`] if `out` is
    /// mis-sized, or [`crate::error::Error::NoExist`] on the first missing key.
    fn get_vectors(&self, keys: &[u64], out: &mut [u8]) -> Result<()> {
        let stride = self.element_size();
        if out.len() != keys.len() * stride {
            return Err(crate::error::Error::InvalidArgument(format!(
                "expected output buffer of {} bytes, got {}",
                keys.len() * stride,
                out.len()
            )));
        }
        for (key, chunk) in keys.iter().zip(out.chunks_mut(stride)) {
            chunk.copy_from_slice(&self.get_vector(*key)?);
        }
        Ok(())
    }

    /// Iterates every `(key, vector bytes)` pair in storage order.
    fn create_iterator(&self) -> Box<dyn Iterator<Item = (u64, Vec<u8>)> + '_>;
}

/// Producer side of an index still accepting inserts.
pub trait IndexHolder: Send + Sync {
    /// Inserts (or overwrites) the vector stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::InvalidArgument`] on a dimension
    /// mismatch, or [`crate::error::Error::NoMemory`] if storage capacity is
    /// exhausted.
    fn emplace(&self, key: u64, vector: &[u8]) -> Result<()>;

    /// Iterates every `(key, vector bytes)` pair inserted so far.
    fn create_iterator(&self) -> Box<dyn Iterator<Item = (u64, Vec<u8>)> + '_>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct ToyProvider {
        dim: usize,
        rows: Vec<(u64, Vec<u8>)>,
    }

    impl IndexProvider for ToyProvider {
        fn count(&self) -> usize {
            self.rows.len()
        }

        fn dimension(&self) -> usize {
            self.dim
        }

        fn data_type(&self) -> DataType {
            DataType::Fp32
        }

        fn element_size(&self) -> usize {
            self.dim * 4
        }

        fn get_vector(&self, key: u64) -> Result<Vec<u8>> {
            self.rows
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.clone())
                .ok_or_else(|| crate::error::Error::NoExist(key.to_string()))
        }

        fn create_iterator(&self) -> Box<dyn Iterator<Item = (u64, Vec<u8>)> + '_> {
            Box::new(self.rows.iter().cloned())
        }
    }

    #[test]
    fn get_vectors_batches_the_default_impl() {
        let provider =
            ToyProvider { dim: 2, rows: vec![(1, vec![0, 0, 0, 0, 0, 0, 128, 63]), (2, vec![1; 8])] };
        let mut out = vec![0u8; 16];
        provider.get_vectors(&[1, 2], &mut out).unwrap();
        assert_eq!(&out[0..8], provider.rows[0].1.as_slice());
        assert_eq!(&out[8..16], provider.rows[1].1.as_slice());
    }

    #[test]
    fn get_vectors_rejects_mis_sized_output() {
        let provider = ToyProvider { dim: 2, rows: vec![] };
        let mut out = vec![0u8; 3];
        assert!(provider.get_vectors(&[1], &mut out).is_err());
    }

    struct ToyHolder {
        rows: Mutex<Vec<(u64, Vec<u8>)>>,
    }

    impl IndexHolder for ToyHolder {
        fn emplace(&self, key: u64, vector: &[u8]) -> Result<()> {
            self.rows.lock().unwrap().push((key, vector.to_vec()));
            Ok(())
        }

        fn create_iterator(&self) -> Box<dyn Iterator<Item = (u64, Vec<u8>)> + '_> {
            Box::new(self.rows.lock().unwrap().clone().into_iter())
        }
    }

    #[test]
    fn emplace_then_iterate_round_trips() {
        let holder = ToyHolder { rows: Mutex::new(Vec::new()) };
        holder.emplace(7, &[1, 2, 3]).unwrap();
        let collected: Vec<_> = holder.create_iterator().collect();
        assert_eq!(collected, vec![(7, vec![1, 2, 3])]);
    }
}
