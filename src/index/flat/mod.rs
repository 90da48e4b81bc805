//! Brute-force flat index (C7, spec §4.7): `FlatBuilder` (batch construction
//! + dump), `FlatProvider` (read-only view over a dumped [`Storage`]), and
//! `FlatStreamer` (incremental add + search).
//!
//! All three agree on one on-disk layout: `(header, meta, body, keys,
//! mapping, offsets)` segments, grounded on the teacher's
//! `storage/dumper.rs`/`storage/format.rs` segment framing and spec §6's
//! Flat/IVF segment-id table.

mod builder;
mod provider;
mod streamer;

pub use builder::FlatBuilder;
pub use provider::FlatProvider;
pub use streamer::FlatStreamer;

pub(crate) const HEADER_SEG_ID: &str = "FLAT_HEADER_SEG_ID";
pub(crate) const META_SEG_ID: &str = "FLAT_META_SEG_ID";
pub(crate) const BODY_SEG_ID: &str = "FLAT_BODY_SEG_ID";
pub(crate) const KEYS_SEG_ID: &str = "FLAT_KEYS_SEG_ID";
pub(crate) const MAPPING_SEG_ID: &str = "FLAT_MAPPING_SEG_ID";
pub(crate) const OFFSETS_SEG_ID: &str = "FLAT_OFFSETS_SEG_ID";
