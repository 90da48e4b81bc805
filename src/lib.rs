//! # `vectorcore`
//!
//! Core engine for approximate nearest-neighbour search: SIMD distance
//! kernels over multiple numeric encodings, flat and HNSW(+RaBitQ) vector
//! indexes, block storage with a buffer pool, and linear-fit scalar/RaBitQ
//! quantisers.
//!
//! This crate covers the engine internals only — wire protocol, query
//! planning, and persistence-format migration are out of scope (see
//! `SPEC_FULL.md`).
//!
//! ## Layout
//!
//! - [`numeric`] — packed numeric encodings and lookup tables (C1)
//! - [`distance`] — distance kernels and runtime dispatch (C2)
//! - [`containers`] — bitsets, bloom filter, bounded heap, params bag (C3)
//! - [`quantize`] — scalar and RaBitQ quantisers (C4)
//! - [`storage`] — segment framing and storage backends (C5)
//! - [`buffer_pool`] — ref-counted block cache (C6)
//! - [`index`] — flat and HNSW(+RaBitQ) index algorithms (C7–C10)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod buffer_pool;
pub mod config;
pub mod containers;
pub mod distance;
pub mod error;
pub mod index;
pub mod metrics;
pub mod numeric;
pub mod quantize;
pub mod rng;
pub mod storage;

pub use config::VectorCoreConfig;
pub use error::{Error, Result};
pub use metrics::Metrics;
