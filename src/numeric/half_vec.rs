//! FP16 (IEEE-754 half) vector conversion.
//!
//! Arithmetic on half-precision values round-trips through `f32`: kernels
//! decode a whole vector once per call rather than converting element by
//! element inside the hot loop.

use half::f16;

/// Converts an `f32` slice to packed `f16` values.
#[must_use]
pub fn from_f32(values: &[f32]) -> Vec<f16> {
    values.iter().map(|&x| f16::from_f32(x)).collect()
}

/// Converts packed `f16` values back to `f32`.
#[must_use]
pub fn to_f32(values: &[f16]) -> Vec<f32> {
    values.iter().map(|&x| x.to_f32()).collect()
}

/// Reinterprets a raw little-endian `f16` byte buffer as `f32`, one element
/// at a time, without an intermediate `Vec<f16>` allocation.
#[must_use]
pub fn bytes_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|c| f16::from_bits(u16::from_le_bytes([c[0], c[1]])).to_f32())
        .collect()
}

/// Encodes an `f32` slice directly to little-endian `f16` bytes.
#[must_use]
pub fn f32_to_bytes(values: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * 2);
    for &v in values {
        out.extend_from_slice(&f16::from_f32(v).to_bits().to_le_bytes());
    }
    out
}
