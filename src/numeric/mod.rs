//! Numeric primitives shared by the distance kernels and quantisers (C1).
//!
//! `f16` round-trips through `f32` for arithmetic (via the [`half`] crate);
//! packed INT4 uses precomputed 256-entry lookup tables so a nibble-pair
//! multiply or squared-difference becomes one indexed load; binary vectors
//! are counted via portable popcount.

pub mod binary;
pub mod half_vec;
pub mod int4;

pub use binary::hamming_popcount;
pub use int4::{Int4MulTable, Int4SquaredDiffTable};
