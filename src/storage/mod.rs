//! Block storage (C5): segment framing, the sequential dumper, CRC-32C
//! checksums, and two [`Storage`] backends — an owned in-memory buffer and a
//! read-only `mmap`.

pub mod checksum;
pub mod dumper;
pub mod format;
pub mod memory;
pub mod mmap;
pub mod traits;

pub use checksum::crc32c;
pub use dumper::IndexDumper;
pub use format::{decode_directory, encode_directory, Directory, SegmentEntry, MAGIC, SEGMENT_ALIGN};
pub use memory::MemoryStorage;
pub use mmap::MmapStorage;
pub use traits::Storage;
