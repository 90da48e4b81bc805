//! On-disk segment framing (spec §4.5, §6): a storage is an ordered
//! `segment_id -> {offset, data_size, padding_size, crc32c}` map. Segments
//! are written back-to-back, each followed by zero padding to 32-byte
//! alignment; a trailing directory (itself just another sequence of
//! fixed-width records) lets a reader enumerate segments without a
//! pre-declared schema.
//!
//! All integers are little-endian, matching spec §6's on-disk format note.

use crate::error::{Error, Result};
use indexmap::IndexMap;

/// Segment alignment, in bytes.
pub const SEGMENT_ALIGN: usize = 32;

/// Magic trailing the directory, identifying this as a `vectorcore` segment file.
pub const MAGIC: &[u8; 8] = b"VCSEG001";

/// Rounds `n` up to the next multiple of [`SEGMENT_ALIGN`].
#[must_use]
pub const fn padded_len(n: usize) -> usize {
    n.div_ceil(SEGMENT_ALIGN) * SEGMENT_ALIGN
}

/// One segment's directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentEntry {
    pub offset: u64,
    pub data_size: u64,
    pub padding_size: u64,
    pub crc32c: u32,
}

/// The segment directory: insertion-ordered so iteration matches dump order.
pub type Directory = IndexMap<String, SegmentEntry>;

/// Serialises the directory plus its footer (`directory_len` + [`MAGIC`]).
#[must_use]
pub fn encode_directory(directory: &Directory) -> Vec<u8> {
    let mut out = Vec::new();
    for (id, entry) in directory {
        let id_bytes = id.as_bytes();
        out.extend_from_slice(&(id_bytes.len() as u16).to_le_bytes());
        out.extend_from_slice(id_bytes);
        out.extend_from_slice(&entry.offset.to_le_bytes());
        out.extend_from_slice(&entry.data_size.to_le_bytes());
        out.extend_from_slice(&entry.padding_size.to_le_bytes());
        out.extend_from_slice(&entry.crc32c.to_le_bytes());
    }
    let directory_len = out.len() as u64;
    out.extend_from_slice(&directory_len.to_le_bytes());
    out.extend_from_slice(MAGIC);
    out
}

/// Parses the trailing directory out of a complete segment file buffer.
///
/// # Errors
///
/// Returns [`Error::InvalidFormat`] if the buffer is too short, the magic
/// doesn't match, or a record is truncated.
pub fn decode_directory(buf: &[u8]) -> Result<Directory> {
    if buf.len() < 16 {
        return Err(Error::InvalidFormat("segment file shorter than footer".into()));
    }
    let footer_start = buf.len() - 16;
    let magic = &buf[footer_start + 8..];
    if magic != MAGIC {
        return Err(Error::InvalidFormat("segment file magic mismatch".into()));
    }
    let directory_len = u64::from_le_bytes(buf[footer_start..footer_start + 8].try_into().unwrap()) as usize;
    if directory_len > footer_start {
        return Err(Error::InvalidFormat("directory length exceeds file size".into()));
    }
    let dir_start = footer_start - directory_len;
    let mut cursor = &buf[dir_start..footer_start];
    let mut directory = Directory::new();

    while !cursor.is_empty() {
        let id_len = read_u16(&mut cursor)? as usize;
        if cursor.len() < id_len {
            return Err(Error::InvalidFormat("truncated segment id".into()));
        }
        let id = String::from_utf8(cursor[..id_len].to_vec())
            .map_err(|_| Error::InvalidFormat("segment id is not valid utf-8".into()))?;
        cursor = &cursor[id_len..];
        let offset = read_u64(&mut cursor)?;
        let data_size = read_u64(&mut cursor)?;
        let padding_size = read_u64(&mut cursor)?;
        let crc32c = read_u32(&mut cursor)?;
        directory.insert(
            id,
            SegmentEntry {
                offset,
                data_size,
                padding_size,
                crc32c,
            },
        );
    }
    Ok(directory)
}

fn read_u16(cursor: &mut &[u8]) -> Result<u16> {
    if cursor.len() < 2 {
        return Err(Error::InvalidFormat("truncated directory record".into()));
    }
    let (head, tail) = cursor.split_at(2);
    *cursor = tail;
    Ok(u16::from_le_bytes(head.try_into().unwrap()))
}

fn read_u32(cursor: &mut &[u8]) -> Result<u32> {
    if cursor.len() < 4 {
        return Err(Error::InvalidFormat("truncated directory record".into()));
    }
    let (head, tail) = cursor.split_at(4);
    *cursor = tail;
    Ok(u32::from_le_bytes(head.try_into().unwrap()))
}

fn read_u64(cursor: &mut &[u8]) -> Result<u64> {
    if cursor.len() < 8 {
        return Err(Error::InvalidFormat("truncated directory record".into()));
    }
    let (head, tail) = cursor.split_at(8);
    *cursor = tail;
    Ok(u64::from_le_bytes(head.try_into().unwrap()))
}
