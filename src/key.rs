// src/key.rs

use std::fmt;
use std::hash::{BuildHasher, Hash, Hasher};
use std::ops::{Index, IndexMut};

use crate::error::{Error, Result};

pub const KEY_LEN: usize = 9;

/// Fixed ahash seeds. Tables built by one run hash identically in the next.
const SEEDS: [u64; 4] = [
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
];

/// Canonical 9-byte signature of one symbol.
///
/// Equality is component-wise. The hash only sees the nine components:
/// bytes 0..8 as one little-endian `u64`, then byte 8.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct CompositeKey([u8; KEY_LEN]);

impl CompositeKey {
    #[inline]
    pub const fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Narrow quantum-number components into key bytes, zero padding the tail.
    /// Anything outside `0..=255` is rejected rather than truncated.
    pub fn from_components(components: &[i32]) -> Result<Self> {
        if components.len() > KEY_LEN {
            return Err(Error::KeyRange {
                index: KEY_LEN,
                value: components.len() as i64,
            });
        }
        let mut key = Self::default();
        for (i, &c) in components.iter().enumerate() {
            key.0[i] = u8::try_from(c).map_err(|_| Error::KeyRange {
                index: i,
                value: c as i64,
            })?;
        }
        Ok(key)
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    #[inline]
    pub fn get(&self, idx: usize) -> u8 {
        self.0[idx]
    }

    #[inline]
    pub fn set(&mut self, idx: usize, value: u8) {
        self.0[idx] = value;
    }

    #[inline]
    fn packed(&self) -> (u64, u8) {
        let mut lo = [0u8; 8];
        lo.copy_from_slice(&self.0[..8]);
        (u64::from_le_bytes(lo), self.0[8])
    }

    /// Hash under the crate's fixed seeds.
    pub fn hash64(&self) -> u64 {
        KeyHasher::default().hash_one(self)
    }
}

impl Hash for CompositeKey {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        let (lo, hi) = self.packed();
        state.write_u64(lo);
        state.write_u8(hi);
    }
}

impl Index<usize> for CompositeKey {
    type Output = u8;
    #[inline]
    fn index(&self, idx: usize) -> &u8 {
        &self.0[idx]
    }
}

impl IndexMut<usize> for CompositeKey {
    #[inline]
    fn index_mut(&mut self, idx: usize) -> &mut u8 {
        &mut self.0[idx]
    }
}

impl fmt::Debug for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CompositeKey({self})")
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{b}")?;
        }
        write!(f, "]")
    }
}

/// `BuildHasher` for key maps: ahash with constant seeds, no per-process randomness.
#[derive(Clone)]
pub struct KeyHasher(ahash::RandomState);

impl Default for KeyHasher {
    fn default() -> Self {
        Self(ahash::RandomState::with_seeds(
            SEEDS[0], SEEDS[1], SEEDS[2], SEEDS[3],
        ))
    }
}

impl BuildHasher for KeyHasher {
    type Hasher = ahash::AHasher;

    #[inline]
    fn build_hasher(&self) -> ahash::AHasher {
        self.0.build_hasher()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_keys_hash_equal_regardless_of_construction() {
        let a = CompositeKey::from_bytes([1, 2, 3, 4, 5, 6, 7, 8, 9]);
        let b = CompositeKey::from_components(&[1, 2, 3, 4, 5, 6, 7, 8, 9]).unwrap();
        let mut c = CompositeKey::default();
        for i in 0..KEY_LEN {
            c[i] = (i + 1) as u8;
        }
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(a.hash64(), b.hash64());
        assert_eq!(a.hash64(), c.hash64());
    }

    #[test]
    fn any_differing_component_breaks_equality() {
        let base = CompositeKey::from_bytes([4; KEY_LEN]);
        for i in 0..KEY_LEN {
            let mut other = base;
            other[i] = 5;
            assert_ne!(base, other, "component {i}");
        }
    }

    #[test]
    fn ninth_byte_feeds_the_hash() {
        let a = CompositeKey::from_bytes([0, 0, 0, 0, 0, 0, 0, 0, 1]);
        let b = CompositeKey::from_bytes([0, 0, 0, 0, 0, 0, 0, 0, 2]);
        assert_ne!(a.hash64(), b.hash64());
    }

    #[test]
    fn hash_is_stable_across_hasher_instances() {
        let k = CompositeKey::from_bytes([8, 6, 4, 2, 0, 2, 4, 6, 8]);
        let h1 = KeyHasher::default().hash_one(k);
        let h2 = KeyHasher::default().hash_one(k);
        assert_eq!(h1, h2);
    }

    #[test]
    fn short_tuples_are_zero_padded() {
        let k = CompositeKey::from_components(&[2, 4, 6]).unwrap();
        assert_eq!(k.as_bytes(), &[2, 4, 6, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn out_of_range_components_are_rejected() {
        assert!(matches!(
            CompositeKey::from_components(&[0, 256]),
            Err(Error::KeyRange { index: 1, value: 256 })
        ));
        assert!(matches!(
            CompositeKey::from_components(&[-2]),
            Err(Error::KeyRange { index: 0, value: -2 })
        ));
        assert!(CompositeKey::from_components(&[0; 10]).is_err());
    }

    #[test]
    fn display_lists_components() {
        let k = CompositeKey::from_bytes([1, 0, 0, 0, 0, 0, 0, 0, 9]);
        assert_eq!(k.to_string(), "[1 0 0 0 0 0 0 0 9]");
    }
}
