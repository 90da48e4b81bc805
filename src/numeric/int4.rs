//! Packed INT4 helpers.
//!
//! Two elements are packed per byte: the high nibble holds element `2*i+1`,
//! the low nibble holds element `2*i`, both two's-complement 4-bit values in
//! `[-8, 7]`. [`Int4MulTable`] and [`Int4SquaredDiffTable`] precompute, for
//! every pair of packed bytes, the pair of per-element products (or squared
//! differences) so a kernel loop becomes a single indexed load instead of
//! four nibble-unpack-and-multiply steps.

use std::sync::OnceLock;

/// Decodes a 4-bit two's-complement nibble (`0..=15`) to its signed value (`-8..=7`).
#[inline]
#[must_use]
pub const fn decode_nibble(nibble: u8) -> i8 {
    let n = (nibble & 0x0F) as i8;
    if n >= 8 {
        n - 16
    } else {
        n
    }
}

/// Unpacks one INT4 byte into its two signed elements `(even, odd)`.
#[inline]
#[must_use]
pub const fn unpack_byte(byte: u8) -> (i8, i8) {
    (decode_nibble(byte), decode_nibble(byte >> 4))
}

/// Packs two signed nibble values (each must fit in `-8..=7`) into one byte.
#[inline]
#[must_use]
pub fn pack_byte(even: i8, odd: i8) -> u8 {
    debug_assert!((-8..=7).contains(&even));
    debug_assert!((-8..=7).contains(&odd));
    ((even as u8) & 0x0F) | (((odd as u8) & 0x0F) << 4)
}

/// 256x256 lookup table of per-nibble-pair products, indexed by `(lhs_byte,
/// rhs_byte)`, yielding `(even_product, odd_product)` as `i16`.
pub struct Int4MulTable {
    table: Vec<(i16, i16)>,
}

impl Int4MulTable {
    fn build() -> Self {
        let mut table = vec![(0i16, 0i16); 256 * 256];
        for lhs in 0u16..256 {
            let (le, lo) = unpack_byte(lhs as u8);
            for rhs in 0u16..256 {
                let (re, ro) = unpack_byte(rhs as u8);
                let idx = (lhs as usize) * 256 + rhs as usize;
                table[idx] = (i16::from(le) * i16::from(re), i16::from(lo) * i16::from(ro));
            }
        }
        Self { table }
    }

    /// Returns the shared, lazily-built table.
    #[must_use]
    pub fn get() -> &'static Self {
        static TABLE: OnceLock<Int4MulTable> = OnceLock::new();
        TABLE.get_or_init(Int4MulTable::build)
    }

    /// Looks up `(even_product, odd_product)` for a pair of packed bytes.
    #[inline]
    #[must_use]
    pub fn lookup(&self, lhs_byte: u8, rhs_byte: u8) -> (i16, i16) {
        self.table[(lhs_byte as usize) * 256 + rhs_byte as usize]
    }
}

/// 256x256 lookup table of per-nibble-pair squared differences.
pub struct Int4SquaredDiffTable {
    table: Vec<(i16, i16)>,
}

impl Int4SquaredDiffTable {
    fn build() -> Self {
        let mut table = vec![(0i16, 0i16); 256 * 256];
        for lhs in 0u16..256 {
            let (le, lo) = unpack_byte(lhs as u8);
            for rhs in 0u16..256 {
                let (re, ro) = unpack_byte(rhs as u8);
                let de = i16::from(le) - i16::from(re);
                let d_o = i16::from(lo) - i16::from(ro);
                let idx = (lhs as usize) * 256 + rhs as usize;
                table[idx] = (de * de, d_o * d_o);
            }
        }
        Self { table }
    }

    /// Returns the shared, lazily-built table.
    #[must_use]
    pub fn get() -> &'static Self {
        static TABLE: OnceLock<Int4SquaredDiffTable> = OnceLock::new();
        TABLE.get_or_init(Int4SquaredDiffTable::build)
    }

    /// Looks up `(even_sqdiff, odd_sqdiff)` for a pair of packed bytes.
    #[inline]
    #[must_use]
    pub fn lookup(&self, lhs_byte: u8, rhs_byte: u8) -> (i16, i16) {
        self.table[(lhs_byte as usize) * 256 + rhs_byte as usize]
    }
}

/// Number of packed bytes required to store `dim` INT4 elements.
///
/// # Panics
///
/// Panics if `dim` is odd (spec: INT4 vectors have even `dim`).
#[must_use]
pub fn packed_len(dim: usize) -> usize {
    assert_eq!(dim % 2, 0, "INT4 vectors must have even dim");
    dim / 2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_nibbles() {
        for v in -8i8..=7 {
            let packed = pack_byte(v, -v.min(7).max(-8));
            let (even, _odd) = unpack_byte(packed);
            assert_eq!(even, v);
        }
    }

    #[test]
    fn mul_table_matches_direct_computation() {
        let table = Int4MulTable::get();
        let lhs = pack_byte(3, -4);
        let rhs = pack_byte(-2, 5);
        let (even, odd) = table.lookup(lhs, rhs);
        assert_eq!(even, 3 * -2);
        assert_eq!(odd, -4 * 5);
    }

    #[test]
    fn squared_diff_table_matches_direct_computation() {
        let table = Int4SquaredDiffTable::get();
        let lhs = pack_byte(7, -8);
        let rhs = pack_byte(-1, 2);
        let (even, odd) = table.lookup(lhs, rhs);
        assert_eq!(even, (7 - -1) * (7 - -1));
        assert_eq!(odd, (-8 - 2) * (-8 - 2));
    }

    #[test]
    fn packed_len_requires_even_dim() {
        assert_eq!(packed_len(16), 8);
    }

    #[test]
    #[should_panic(expected = "even dim")]
    fn packed_len_rejects_odd_dim() {
        packed_len(15);
    }
}
