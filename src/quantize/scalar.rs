//! Linear-fit scalar quantisers (spec §4.4): `{8-bit, 4-bit} x {signed,
//! unsigned} x {with bias, without bias}`.
//!
//! Grounded on `original_source/tests/ailego/algorithm/
//! integer_quantizer_test.cc`'s `EntropyInt8Quantizer`/`EntropyInt4Quantizer`
//! API shape (`set_max`/`set_min`/`feed`/`train`/`encode`/`decode`/`bias`).
//! Despite that name, the original's own training pass is a one-pass linear
//! fit over the observed `{min, max}` range, not a KL-divergence/entropy
//! calibration — this port matches that: optimal for uniform inputs and a
//! close approximation for Gaussian-ish ones, matching the test file's
//! loosely-bounded reconstruction-error expectations (a non-uniform
//! Lloyd-Max or entropy-minimising fit is out of scope at anything beyond
//! the contract level). The running histogram isn't read back by `train` —
//! it's exposed via [`ScalarQuantizer::histogram`] for callers that want to
//! inspect the observed distribution (e.g. to decide whether a non-uniform
//! quantiser would be worth reaching for instead).

use crate::error::{Error, Result};

const HISTOGRAM_BUCKETS: usize = 256;

/// Bit width and signedness of a scalar quantiser's codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantKind {
    Int8,
    Uint8,
    Int4,
    Uint4,
}

impl QuantKind {
    const fn code_range(self) -> (i32, i32) {
        match self {
            Self::Int8 => (-127, 127),
            Self::Uint8 => (0, 255),
            Self::Int4 => (-7, 7),
            Self::Uint4 => (0, 15),
        }
    }

    const fn is_signed(self) -> bool {
        matches!(self, Self::Int8 | Self::Int4)
    }

    const fn bits(self) -> u8 {
        match self {
            Self::Int8 | Self::Uint8 => 8,
            Self::Int4 | Self::Uint4 => 4,
        }
    }
}

/// A trainable scalar quantiser: accumulates statistics over `feed`, solves
/// `(scale, bias)` in `train`, then `encode`/`decode` losslessly round-trip
/// through the resulting fixed-point code.
#[derive(Debug, Clone)]
pub struct ScalarQuantizer {
    kind: QuantKind,
    use_bias: bool,
    min: f32,
    max: f32,
    sum: f64,
    sum_sq: f64,
    count: u64,
    histogram: [u64; HISTOGRAM_BUCKETS],
    scale: f32,
    bias: f32,
    trained: bool,
}

impl ScalarQuantizer {
    /// A fresh, untrained quantiser. `use_bias = false` forces a
    /// zero-centred (symmetric) code range and only makes sense for the
    /// signed kinds.
    #[must_use]
    pub fn new(kind: QuantKind, use_bias: bool) -> Self {
        Self {
            kind,
            use_bias,
            min: f32::MAX,
            max: f32::MIN,
            sum: 0.0,
            sum_sq: 0.0,
            count: 0,
            histogram: [0; HISTOGRAM_BUCKETS],
            scale: 1.0,
            bias: 0.0,
            trained: false,
        }
    }

    /// Overrides the observed min/max ahead of `feed`, matching the
    /// original's `set_min`/`set_max` (useful when the caller already knows
    /// the domain and wants to skip a full pre-scan).
    pub fn set_range(&mut self, min: f32, max: f32) {
        self.min = min;
        self.max = max;
    }

    /// Folds `data` into the running statistics. Can be called multiple
    /// times before `train`.
    pub fn feed(&mut self, data: &[f32]) {
        for &v in data {
            self.min = self.min.min(v);
            self.max = self.max.max(v);
            self.sum += f64::from(v);
            self.sum_sq += f64::from(v) * f64::from(v);
            self.count += 1;
        }
        if self.count > 0 {
            self.rebuild_histogram(data);
        }
    }

    fn rebuild_histogram(&mut self, data: &[f32]) {
        let span = (self.max - self.min).max(f32::EPSILON);
        for &v in data {
            let frac = (v - self.min) / span;
            let bucket = ((frac * HISTOGRAM_BUCKETS as f32) as usize).min(HISTOGRAM_BUCKETS - 1);
            self.histogram[bucket] += 1;
        }
    }

    /// Solves `(scale, bias)` from the accumulated range.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Logic`] if `feed` was never called.
    pub fn train(&mut self) -> Result<()> {
        if self.count == 0 {
            return Err(Error::Logic("train called before feed".into()));
        }
        let (min_code, max_code) = self.kind.code_range();
        let degenerate = (self.max - self.min).abs() < f32::EPSILON;

        if self.use_bias {
            let span = if degenerate { 1.0 } else { self.max - self.min };
            self.scale = span / (max_code - min_code) as f32;
            self.bias = self.min;
        } else {
            assert!(
                self.kind.is_signed(),
                "non-bias (symmetric) mode requires a signed code range"
            );
            let amax = self.min.abs().max(self.max.abs()).max(f32::EPSILON);
            self.scale = amax / max_code as f32;
            self.bias = 0.0;
        }
        self.trained = true;
        Ok(())
    }

    /// The fitted scale. Valid only after [`Self::train`].
    #[must_use]
    pub const fn scale(&self) -> f32 {
        self.scale
    }

    /// The fitted bias (`0.0` in non-bias mode). Valid only after [`Self::train`].
    #[must_use]
    pub const fn bias(&self) -> f32 {
        self.bias
    }

    /// The observed histogram, 256 buckets spanning `[min, max]`.
    #[must_use]
    pub const fn histogram(&self) -> &[u64; HISTOGRAM_BUCKETS] {
        &self.histogram
    }

    fn code_of(&self, v: f32) -> i32 {
        let (min_code, max_code) = self.kind.code_range();
        let raw = ((v - self.bias) / self.scale).round() as i32;
        raw.clamp(min_code, max_code)
    }

    /// Encodes `data` into packed codes (two elements per byte for the
    /// 4-bit kinds).
    ///
    /// # Panics
    ///
    /// Panics if `train` has not been called yet.
    #[must_use]
    pub fn encode(&self, data: &[f32]) -> Vec<u8> {
        assert!(self.trained, "encode called before train");
        match self.kind.bits() {
            8 => data.iter().map(|&v| self.code_of(v) as u8).collect(),
            4 => {
                let mut out = Vec::with_capacity(data.len().div_ceil(2));
                for pair in data.chunks(2) {
                    let even = self.code_of(pair[0]) as u8 & 0x0F;
                    let odd = pair.get(1).map_or(0, |&v| self.code_of(v) as u8 & 0x0F);
                    out.push(even | (odd << 4));
                }
                out
            }
            _ => unreachable!("QuantKind only defines 4 or 8 bit widths"),
        }
    }

    /// Decodes `dim` elements back out of `codes`.
    ///
    /// # Panics
    ///
    /// Panics if `train` has not been called yet.
    #[must_use]
    pub fn decode(&self, codes: &[u8], dim: usize) -> Vec<f32> {
        assert!(self.trained, "decode called before train");
        match self.kind.bits() {
            8 => codes[..dim]
                .iter()
                .map(|&c| self.decode_code(self.raw_code_8(c)))
                .collect(),
            4 => {
                let mut out = Vec::with_capacity(dim);
                for &byte in codes {
                    let even = self.raw_code_4(byte & 0x0F);
                    out.push(self.decode_code(even));
                    if out.len() < dim {
                        let odd = self.raw_code_4((byte >> 4) & 0x0F);
                        out.push(self.decode_code(odd));
                    }
                }
                out.truncate(dim);
                out
            }
            _ => unreachable!("QuantKind only defines 4 or 8 bit widths"),
        }
    }

    fn raw_code_8(&self, byte: u8) -> i32 {
        if self.kind.is_signed() {
            i32::from(byte as i8)
        } else {
            i32::from(byte)
        }
    }

    fn raw_code_4(&self, nibble: u8) -> i32 {
        if self.kind.is_signed() {
            // Two's-complement over 4 bits.
            if nibble & 0x8 != 0 {
                i32::from(nibble) - 16
            } else {
                i32::from(nibble)
            }
        } else {
            i32::from(nibble)
        }
    }

    fn decode_code(&self, code: i32) -> f32 {
        code as f32 * self.scale + self.bias
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip_error(kind: QuantKind, use_bias: bool, data: &[f32]) -> f32 {
        let mut q = ScalarQuantizer::new(kind, use_bias);
        q.feed(data);
        q.train().unwrap();
        let codes = q.encode(data);
        let decoded = q.decode(&codes, data.len());
        data.iter()
            .zip(decoded.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f32>()
            / data.len() as f32
    }

    #[test]
    fn int8_uniform_distribution_reconstructs_closely() {
        let data: Vec<f32> = (0..1000).map(|i| 1.0 + (i as f32 / 1000.0)).collect();
        let mse = roundtrip_error(QuantKind::Int8, true, &data);
        assert!(mse < 0.01, "mse={mse}");
    }

    #[test]
    fn uint8_roundtrip() {
        let data: Vec<f32> = (0..500).map(|i| (i as f32) * 0.01).collect();
        let mse = roundtrip_error(QuantKind::Uint8, true, &data);
        assert!(mse < 0.01, "mse={mse}");
    }

    #[test]
    fn int4_roundtrip_has_bounded_error() {
        let data: Vec<f32> = (0..200).map(|i| 1.0 + (i as f32 / 200.0)).collect();
        let mse = roundtrip_error(QuantKind::Int4, true, &data);
        assert!(mse < 0.05, "mse={mse}");
    }

    #[test]
    fn uint4_roundtrip_has_bounded_error() {
        let data: Vec<f32> = (0..200).map(|i| (i as f32) * 0.02).collect();
        let mse = roundtrip_error(QuantKind::Uint4, true, &data);
        assert!(mse < 0.05, "mse={mse}");
    }

    #[test]
    fn non_bias_mode_keeps_zero_bias() {
        let data = [-2.0, -1.0, 0.0, 1.0, 2.0];
        let mut q = ScalarQuantizer::new(QuantKind::Int8, false);
        q.feed(&data);
        q.train().unwrap();
        assert_eq!(q.bias(), 0.0);
    }

    #[test]
    fn degenerate_all_equal_input_does_not_divide_by_zero() {
        let data = [5.0; 100];
        let mut q = ScalarQuantizer::new(QuantKind::Int8, true);
        q.feed(&data);
        q.train().unwrap();
        let codes = q.encode(&data);
        let decoded = q.decode(&codes, data.len());
        for v in decoded {
            assert!((v - 5.0).abs() < 1e-3);
        }
    }

    #[test]
    fn histogram_reflects_fed_distribution_not_the_fit() {
        let data: Vec<f32> = (0..1000).map(|i| 1.0 + (i as f32 / 1000.0)).collect();
        let mut q = ScalarQuantizer::new(QuantKind::Int8, true);
        q.feed(&data);
        q.train().unwrap();
        let total: u64 = q.histogram().iter().sum();
        assert_eq!(total, 1000, "every fed sample should land in exactly one bucket");
        assert!(q.histogram().iter().all(|&c| c > 0), "uniform data should touch every bucket");
    }

    #[test]
    fn train_before_feed_is_logic_error() {
        let mut q = ScalarQuantizer::new(QuantKind::Int8, true);
        let err = q.train().unwrap_err();
        assert_eq!(err.code(), "VEC-008");
    }
}
