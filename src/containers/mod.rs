//! Containers (C3): bitset/bitmap, bloom filter, bounded max-heap, and the
//! dynamic param bag used for per-call configuration (spec §4.3, §6).

pub mod bitmap;
pub mod bloom;
pub mod heap;
pub mod params;

pub use bitmap::{Bitmap, Bitset};
pub use bloom::BloomFilter;
pub use heap::BoundedHeap;
pub use params::{ParamValue, Params};
