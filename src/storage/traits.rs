//! `Storage` (spec §4.5): read-side access to a segment file, abstracting
//! over in-memory buffers and memory-mapped files.

use super::format::SegmentEntry;
use crate::error::Result;

/// Read-only access to a closed segment file's contents.
///
/// Implementors own (or borrow, for the mmap case) the full byte range
/// covered by the directory; [`Storage::segment`] returns the raw,
/// still-padded bytes for one segment, verified against its recorded
/// [`SegmentEntry::crc32c`].
pub trait Storage: Send + Sync {
    /// Returns the directory entry for `id`, if present.
    fn entry(&self, id: &str) -> Option<SegmentEntry>;

    /// Returns the segment's data bytes (padding excluded), or
    /// [`Error::NoExist`] if `id` isn't in the directory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReadData`] if the stored CRC-32C doesn't match the
    /// bytes at the recorded offset (truncated or corrupted file).
    fn segment(&self, id: &str) -> Result<&[u8]>;

    /// Returns every segment id known to this storage, in directory order.
    fn segment_ids(&self) -> Vec<String>;

    /// Number of segments in the directory.
    fn len(&self) -> usize {
        self.segment_ids().len()
    }

    /// Returns `true` if the directory has no segments.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
