//! In-memory [`Storage`]: the whole segment file lives in one owned buffer.
//! Used for freshly-built indexes before they're flushed to disk, and in
//! tests.

use super::checksum::crc32c;
use super::format::{decode_directory, Directory, SegmentEntry};
use super::traits::Storage;
use crate::error::{Error, Result};

/// Owns a complete segment file buffer and its parsed directory.
pub struct MemoryStorage {
    buf: Vec<u8>,
    directory: Directory,
}

impl MemoryStorage {
    /// Parses `buf` as a complete segment file (trailing directory + footer).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFormat`] if the trailer can't be parsed.
    pub fn open(buf: Vec<u8>) -> Result<Self> {
        let directory = decode_directory(&buf)?;
        Ok(Self { buf, directory })
    }

    /// Wraps an already-decoded directory over `buf` without re-parsing it.
    #[must_use]
    pub fn from_parts(buf: Vec<u8>, directory: Directory) -> Self {
        Self { buf, directory }
    }

    /// Returns the full underlying buffer, directory and padding included.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }
}

impl Storage for MemoryStorage {
    fn entry(&self, id: &str) -> Option<SegmentEntry> {
        self.directory.get(id).copied()
    }

    fn segment(&self, id: &str) -> Result<&[u8]> {
        let entry = self
            .directory
            .get(id)
            .ok_or_else(|| Error::NoExist(format!("segment '{id}'")))?;
        let start = entry.offset as usize;
        let end = start + entry.data_size as usize;
        if end > self.buf.len() {
            return Err(Error::ReadData(format!("segment '{id}' extends past end of file")));
        }
        let data = &self.buf[start..end];
        if crc32c(data) != entry.crc32c {
            return Err(Error::ReadData(format!("segment '{id}' failed crc32c check")));
        }
        Ok(data)
    }

    fn segment_ids(&self) -> Vec<String> {
        self.directory.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::dumper::IndexDumper;

    #[test]
    fn reads_back_written_segments() {
        let mut dumper = IndexDumper::new(Vec::new());
        dumper.write(b"vector-data");
        dumper.append("BODY").unwrap();
        let bytes = dumper.finish().unwrap();

        let storage = MemoryStorage::open(bytes).unwrap();
        assert_eq!(storage.segment("BODY").unwrap(), b"vector-data");
        assert_eq!(storage.len(), 1);
    }

    #[test]
    fn missing_segment_is_no_exist() {
        let mut dumper = IndexDumper::new(Vec::new());
        dumper.write(b"x");
        dumper.append("A").unwrap();
        let bytes = dumper.finish().unwrap();
        let storage = MemoryStorage::open(bytes).unwrap();
        let err = storage.segment("MISSING").unwrap_err();
        assert_eq!(err.code(), "VEC-003");
    }

    #[test]
    fn corrupted_segment_fails_crc_check() {
        let mut dumper = IndexDumper::new(Vec::new());
        dumper.write(b"vector-data");
        dumper.append("BODY").unwrap();
        let mut bytes = dumper.finish().unwrap();
        bytes[0] ^= 0xFF;

        let storage = MemoryStorage::open(bytes).unwrap();
        let err = storage.segment("BODY").unwrap_err();
        assert_eq!(err.code(), "VEC-005");
    }
}
