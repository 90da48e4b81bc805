//! Memory-mapped [`Storage`]: backs a segment file by `mmap`ing the whole
//! file read-only instead of copying it into the process heap. Segment
//! bytes returned from here are borrowed for the lifetime of the mapping,
//! matching how the teacher's own mmap-backed storage exposes zero-copy
//! reads.

use super::checksum::crc32c;
use super::format::{decode_directory, Directory, SegmentEntry};
use super::traits::Storage;
use crate::error::{Error, Result};
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;
use tracing::error;

/// Read-only `mmap`-backed segment storage.
pub struct MmapStorage {
    mmap: Mmap,
    directory: Directory,
}

impl MmapStorage {
    /// Opens `path` and maps it read-only.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file can't be opened or mapped, or
    /// [`Error::InvalidFormat`] if its trailer can't be parsed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        // SAFETY: the file is not expected to be mutated out from under us
        // for the lifetime of this mapping; the directory/segment API only
        // ever exposes shared slices into it, never a mutable one.
        let mmap = unsafe { Mmap::map(&file)? };
        let directory = decode_directory(&mmap)?;
        Ok(Self { mmap, directory })
    }
}

impl Storage for MmapStorage {
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
        if end > self.mmap.len() {
            return Err(Error::ReadData(format!("segment '{id}' extends past end of file")));
        }
        let data = &self.mmap[start..end];
        if crc32c(data) != entry.crc32c {
            error!(segment = id, "crc32c mismatch, file is truncated or corrupted");
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
    use std::io::Write as _;

    #[test]
    fn reads_back_written_segments() {
        let mut dumper = IndexDumper::new(Vec::new());
        dumper.write(b"vector-data");
        dumper.append("BODY").unwrap();
        let bytes = dumper.finish().unwrap();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&bytes).unwrap();
        file.flush().unwrap();

        let storage = MmapStorage::open(file.path()).unwrap();
        assert_eq!(storage.segment("BODY").unwrap(), b"vector-data");
        assert_eq!(storage.len(), 1);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = MmapStorage::open("/nonexistent/path/to/segment.bin").unwrap_err();
        assert_eq!(err.code(), "VEC-009");
    }
}
