//! `IndexDumper` (spec §4.5): the write side of the segment format.
//! `write` appends raw bytes to the segment currently being assembled;
//! `append` closes it under a segment id, padding to 32-byte alignment and
//! recording its CRC-32C.

use super::checksum::crc32c;
use super::format::{encode_directory, padded_len, Directory, SegmentEntry};
use crate::error::Result;
use std::io::Write;

/// Sequential segment writer over any [`Write`] sink.
pub struct IndexDumper<W: Write> {
    writer: W,
    position: u64,
    pending: Vec<u8>,
    directory: Directory,
}

impl<W: Write> IndexDumper<W> {
    /// Wraps `writer`. Nothing is written until the first [`Self::append`].
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            position: 0,
            pending: Vec::new(),
            directory: Directory::new(),
        }
    }

    /// Appends raw bytes to the segment currently being assembled.
    pub fn write(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Closes the current segment under `id`: flushes the buffered bytes
    /// plus zero-padding to [`SEGMENT_ALIGN`], and records its directory entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WriteData`] if the underlying writer fails.
    ///
    /// # Panics
    ///
    /// Panics if `id` was already used by an earlier segment in this dump.
    pub fn append(&mut self, id: impl Into<String>) -> Result<()> {
        let id = id.into();
        let data_size = self.pending.len();
        let padding_size = padded_len(data_size) - data_size;
        let crc = crc32c(&self.pending);

        self.writer
            .write_all(&self.pending)
            .map_err(|e| crate::error::Error::WriteData(e.to_string()))?;
        if padding_size > 0 {
            let padding = vec![0u8; padding_size];
            self.writer
                .write_all(&padding)
                .map_err(|e| crate::error::Error::WriteData(e.to_string()))?;
        }

        let entry = SegmentEntry {
            offset: self.position,
            data_size: data_size as u64,
            padding_size: padding_size as u64,
            crc32c: crc,
        };
        self.position += (data_size + padding_size) as u64;
        assert!(
            self.directory.insert(id, entry).is_none(),
            "duplicate segment id in a single dump"
        );
        self.pending.clear();
        Ok(())
    }

    /// Writes the trailing directory and returns the underlying writer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WriteData`] if the underlying writer fails, or
    /// [`Error::Logic`] if bytes were buffered via [`Self::write`] without a
    /// matching [`Self::append`].
    pub fn finish(mut self) -> Result<W> {
        if !self.pending.is_empty() {
            return Err(crate::error::Error::Logic(
                "IndexDumper::finish called with an unclosed segment".into(),
            ));
        }
        let directory_bytes = encode_directory(&self.directory);
        self.writer
            .write_all(&directory_bytes)
            .map_err(|e| crate::error::Error::WriteData(e.to_string()))?;
        Ok(self.writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::format::decode_directory;

    #[test]
    fn single_segment_roundtrips() {
        let mut dumper = IndexDumper::new(Vec::new());
        dumper.write(b"hello");
        dumper.write(b" world");
        dumper.append("GREETING_SEG_ID").unwrap();
        let bytes = dumper.finish().unwrap();

        let dir = decode_directory(&bytes).unwrap();
        let entry = dir["GREETING_SEG_ID"];
        assert_eq!(entry.data_size, 11);
        assert_eq!(entry.offset, 0);
        assert_eq!(&bytes[0..11], b"hello world");
    }

    #[test]
    fn multiple_segments_are_aligned() {
        let mut dumper = IndexDumper::new(Vec::new());
        dumper.write(b"abc");
        dumper.append("A").unwrap();
        dumper.write(&[7u8; 5]);
        dumper.append("B").unwrap();
        let bytes = dumper.finish().unwrap();

        let dir = decode_directory(&bytes).unwrap();
        assert_eq!(dir["A"].offset, 0);
        assert_eq!(dir["A"].padding_size, 29);
        assert_eq!(dir["B"].offset, 32);
        assert_eq!(dir["B"].padding_size, 27);
    }

    #[test]
    fn unclosed_segment_fails_finish() {
        let mut dumper = IndexDumper::new(Vec::new());
        dumper.write(b"dangling");
        let err = dumper.finish().unwrap_err();
        assert_eq!(err.code(), "VEC-008");
    }

    #[test]
    #[should_panic(expected = "duplicate segment id")]
    fn duplicate_id_panics() {
        let mut dumper = IndexDumper::new(Vec::new());
        dumper.append("A").unwrap();
        dumper.append("A").unwrap();
    }
}
