// src/family.rs

use itertools::Itertools;
use smallvec::SmallVec;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::key::{CompositeKey, KEY_LEN};

/// Quantum numbers of one symbol in doubled units (`2j`, `2m`).
pub type Tuple = SmallVec<[i32; KEY_LEN]>;

/// Symbol family descriptor: arity, selection rules, symmetry group and key encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SymbolFamily {
    /// `(j1 j2 j3; m1 m2 m3)`
    ThreeJ,
    /// `{j1 j2 j3; j4 j5 j6}`
    SixJ,
    /// Row-major 3x3. 21j-class symbols reduce to these 9-component signatures.
    NineJ,
}

/// Representative of a tuple's symmetry class.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Canonical {
    pub key: CompositeKey,
    pub tuple: Tuple,
    /// Multiplies the representative's value into the queried tuple's value.
    pub phase: i8,
}

#[inline]
pub fn triad(a: i32, b: i32, c: i32) -> bool {
    a >= 0 && b >= 0 && c >= 0 && (a + b + c) % 2 == 0 && c >= (a - b).abs() && c <= a + b
}

fn perm_is_odd(p: &[usize]) -> bool {
    let mut inv = 0;
    for i in 0..p.len() {
        for j in i + 1..p.len() {
            if p[i] > p[j] {
                inv += 1;
            }
        }
    }
    inv % 2 == 1
}

fn permutations3() -> Vec<(Vec<usize>, bool)> {
    (0..3)
        .permutations(3)
        .map(|p| {
            let odd = perm_is_odd(&p);
            (p, odd)
        })
        .collect()
}

// upper/lower exchange is allowed in exactly zero or two columns
const SIXJ_SWAPS: [[bool; 3]; 4] = [
    [false, false, false],
    [true, true, false],
    [true, false, true],
    [false, true, true],
];

impl SymbolFamily {
    pub const ALL: [SymbolFamily; 3] = [Self::ThreeJ, Self::SixJ, Self::NineJ];

    #[inline]
    pub fn index(self) -> usize {
        match self {
            Self::ThreeJ => 0,
            Self::SixJ => 1,
            Self::NineJ => 2,
        }
    }

    #[inline]
    pub fn arity(self) -> usize {
        match self {
            Self::ThreeJ | Self::SixJ => 6,
            Self::NineJ => 9,
        }
    }

    /// Byte stored in table headers.
    #[inline]
    pub fn tag(self) -> u8 {
        match self {
            Self::ThreeJ => 3,
            Self::SixJ => 6,
            Self::NineJ => 9,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            3 => Some(Self::ThreeJ),
            6 => Some(Self::SixJ),
            9 => Some(Self::NineJ),
            _ => None,
        }
    }

    fn check_arity(self, t: &[i32]) -> Result<()> {
        if t.len() != self.arity() {
            return Err(Error::Arity {
                family: self,
                expected: self.arity(),
                got: t.len(),
            });
        }
        Ok(())
    }

    /// Selection rules. Tuples of the wrong arity are simply not admissible.
    pub fn is_admissible(self, t: &[i32]) -> bool {
        if t.len() != self.arity() {
            return false;
        }
        match self {
            Self::ThreeJ => {
                triad(t[0], t[1], t[2])
                    && t[3] + t[4] + t[5] == 0
                    && (0..3).all(|i| t[3 + i].abs() <= t[i] && (t[i] + t[3 + i]) % 2 == 0)
            }
            Self::SixJ => {
                triad(t[0], t[1], t[2])
                    && triad(t[0], t[4], t[5])
                    && triad(t[3], t[1], t[5])
                    && triad(t[3], t[4], t[2])
            }
            Self::NineJ => (0..3).all(|i| {
                triad(t[3 * i], t[3 * i + 1], t[3 * i + 2]) && triad(t[i], t[i + 3], t[i + 6])
            }),
        }
    }

    /// Sign picked up by an odd symmetry operation.
    fn odd_phase(self, t: &[i32]) -> i8 {
        let twice_sum: i32 = match self {
            Self::ThreeJ => t[..3].iter().sum(),
            Self::SixJ => return 1,
            Self::NineJ => t.iter().sum(),
        };
        if (twice_sum / 2).rem_euclid(2) == 1 { -1 } else { 1 }
    }

    /// Every image of `t` under the symmetry group, flagged when the operation is odd.
    pub fn images(self, t: &[i32]) -> Result<Vec<(Tuple, bool)>> {
        self.check_arity(t)?;
        let perms = permutations3();
        let mut out = Vec::new();
        match self {
            Self::ThreeJ => {
                for (p, odd) in &perms {
                    for flip in [false, true] {
                        let s = if flip { -1 } else { 1 };
                        let img: Tuple = p
                            .iter()
                            .map(|&c| t[c])
                            .chain(p.iter().map(|&c| s * t[3 + c]))
                            .collect();
                        out.push((img, *odd ^ flip));
                    }
                }
            }
            Self::SixJ => {
                for (p, _) in &perms {
                    for swap in &SIXJ_SWAPS {
                        let mut img: Tuple = SmallVec::from_elem(0, 6);
                        for (i, &c) in p.iter().enumerate() {
                            let (up, lo) = (t[c], t[3 + c]);
                            let (up, lo) = if swap[i] { (lo, up) } else { (up, lo) };
                            img[i] = up;
                            img[3 + i] = lo;
                        }
                        out.push((img, false));
                    }
                }
            }
            Self::NineJ => {
                for (pr, odd_r) in &perms {
                    for (pc, odd_c) in &perms {
                        for transpose in [false, true] {
                            let mut img: Tuple = SmallVec::from_elem(0, 9);
                            for r in 0..3 {
                                for c in 0..3 {
                                    let v = t[3 * pr[r] + pc[c]];
                                    if transpose {
                                        img[3 * c + r] = v;
                                    } else {
                                        img[3 * r + c] = v;
                                    }
                                }
                            }
                            out.push((img, odd_r ^ odd_c));
                        }
                    }
                }
            }
        }
        Ok(out)
    }

    /// Key of a single tuple, no symmetry applied. 3j stores `(j+m)/2` for the m's.
    pub fn encode(self, t: &[i32]) -> Result<CompositeKey> {
        self.check_arity(t)?;
        match self {
            Self::ThreeJ => {
                let mut enc: SmallVec<[i32; 6]> = SmallVec::from_slice(&t[..3]);
                for i in 0..3 {
                    let v = t[i] + t[3 + i];
                    if v < 0 || v % 2 != 0 || v > 2 * t[i] {
                        return Err(Error::KeyRange {
                            index: 3 + i,
                            value: t[3 + i] as i64,
                        });
                    }
                    enc.push(v / 2);
                }
                CompositeKey::from_components(&enc)
            }
            Self::SixJ | Self::NineJ => CompositeKey::from_components(t),
        }
    }

    /// Inverse of [`encode`](Self::encode).
    pub fn decode(self, key: &CompositeKey) -> Tuple {
        let b = key.as_bytes();
        match self {
            Self::ThreeJ => {
                let j = [b[0] as i32, b[1] as i32, b[2] as i32];
                let mut t: Tuple = SmallVec::from_slice(&j);
                for i in 0..3 {
                    t.push(2 * b[3 + i] as i32 - j[i]);
                }
                t
            }
            Self::SixJ | Self::NineJ => b[..self.arity()].iter().map(|&v| v as i32).collect(),
        }
    }

    /// True when `key` is exactly what canonicalization produces for its own tuple.
    pub fn is_canonical(self, key: &CompositeKey) -> bool {
        let t = self.decode(key);
        matches!(self.canonicalize(&t), Ok(c) if c.key == *key)
    }

    /// Map `t` to the lexicographically greatest key among its symmetry images.
    pub fn canonicalize(self, t: &[i32]) -> Result<Canonical> {
        self.check_arity(t)?;
        let mut best = (self.encode(t)?, false);
        for (img, odd) in self.images(t)? {
            let key = self.encode(&img)?;
            if key > best.0 {
                best = (key, odd);
            }
        }
        let phase = if best.1 { self.odd_phase(t) } else { 1 };
        Ok(Canonical {
            key: best.0,
            tuple: self.decode(&best.0),
            phase,
        })
    }
}

impl fmt::Display for SymbolFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}j", self.tag())
    }
}

impl FromStr for SymbolFamily {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "3j" | "3" => Ok(Self::ThreeJ),
            "6j" | "6" => Ok(Self::SixJ),
            "9j" | "9" | "21j" => Ok(Self::NineJ),
            other => Err(format!("unknown symbol family {other:?} (expected 3j, 6j or 9j)")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const THREE_J: [i32; 6] = [1, 3, 2, 1, -3, 2];
    const SIX_J: [i32; 6] = [2, 4, 6, 4, 2, 4];
    const NINE_J: [i32; 9] = [1, 3, 4, 5, 7, 12, 6, 10, 14];

    #[test]
    fn fixtures_are_admissible() {
        assert!(SymbolFamily::ThreeJ.is_admissible(&THREE_J));
        assert!(SymbolFamily::SixJ.is_admissible(&SIX_J));
        assert!(SymbolFamily::NineJ.is_admissible(&NINE_J));
    }

    #[test]
    fn selection_rules_reject_broken_triads() {
        assert!(!SymbolFamily::ThreeJ.is_admissible(&[2, 2, 2, 2, 2, 0]));
        assert!(!SymbolFamily::ThreeJ.is_admissible(&[2, 2, 8, 0, 0, 0]));
        assert!(!SymbolFamily::SixJ.is_admissible(&[2, 2, 2, 2, 2, 10]));
        assert!(!SymbolFamily::NineJ.is_admissible(&[0, 0, 0, 0, 0, 0, 0, 0, 2]));
        assert!(!SymbolFamily::NineJ.is_admissible(&[0; 6]));
    }

    #[test]
    fn group_sizes() {
        assert_eq!(SymbolFamily::ThreeJ.images(&THREE_J).unwrap().len(), 12);
        assert_eq!(SymbolFamily::SixJ.images(&SIX_J).unwrap().len(), 24);
        assert_eq!(SymbolFamily::NineJ.images(&NINE_J).unwrap().len(), 72);
        assert!(matches!(
            SymbolFamily::SixJ.images(&[1, 2]),
            Err(Error::Arity { expected: 6, got: 2, .. })
        ));
    }

    #[test]
    fn canonical_key_is_symmetry_invariant() {
        for (family, t) in [
            (SymbolFamily::ThreeJ, &THREE_J[..]),
            (SymbolFamily::SixJ, &SIX_J[..]),
            (SymbolFamily::NineJ, &NINE_J[..]),
        ] {
            let base = family.canonicalize(t).unwrap();
            for (img, _) in family.images(t).unwrap() {
                let c = family.canonicalize(&img).unwrap();
                assert_eq!(c.key, base.key, "{family} image {img:?}");
                assert_eq!(c.tuple, base.tuple);
            }
        }
    }

    #[test]
    fn phase_follows_odd_operations() {
        // both fixtures have distinct entries and an odd half-sum
        for (family, t) in [
            (SymbolFamily::ThreeJ, &THREE_J[..]),
            (SymbolFamily::NineJ, &NINE_J[..]),
        ] {
            let base = family.canonicalize(t).unwrap();
            for (img, odd) in family.images(t).unwrap() {
                let c = family.canonicalize(&img).unwrap();
                let expected = if odd { -base.phase } else { base.phase };
                assert_eq!(c.phase, expected, "{family} image {img:?}");
            }
        }
    }

    #[test]
    fn six_j_has_no_phase() {
        for (img, _) in SymbolFamily::SixJ.images(&SIX_J).unwrap() {
            assert_eq!(SymbolFamily::SixJ.canonicalize(&img).unwrap().phase, 1);
        }
    }

    #[test]
    fn three_j_round_trips_through_key() {
        let key = SymbolFamily::ThreeJ.encode(&THREE_J).unwrap();
        assert_eq!(key.as_bytes(), &[1, 3, 2, 1, 0, 2, 0, 0, 0]);
        assert_eq!(SymbolFamily::ThreeJ.decode(&key).as_slice(), &THREE_J);
    }

    #[test]
    fn canonical_representative_is_its_own_canonical_form() {
        let c = SymbolFamily::NineJ.canonicalize(&NINE_J).unwrap();
        let again = SymbolFamily::NineJ.canonicalize(&c.tuple).unwrap();
        assert_eq!(again.key, c.key);
        assert_eq!(again.phase, 1);
    }

    #[test]
    fn range_errors() {
        assert!(matches!(
            SymbolFamily::NineJ.canonicalize(&[300, 0, 0, 0, 0, 0, 0, 0, 0]),
            Err(Error::KeyRange { .. })
        ));
        assert!(matches!(
            SymbolFamily::ThreeJ.canonicalize(&[2, 2, 0, 4, -4, 0]),
            Err(Error::KeyRange { .. })
        ));
        assert!(matches!(
            SymbolFamily::SixJ.canonicalize(&[1, 2, 3]),
            Err(Error::Arity { expected: 6, got: 3, .. })
        ));
    }

    #[test]
    fn family_names_parse() {
        assert_eq!("9j".parse::<SymbolFamily>(), Ok(SymbolFamily::NineJ));
        assert_eq!("6J".parse::<SymbolFamily>(), Ok(SymbolFamily::SixJ));
        assert!("12j".parse::<SymbolFamily>().is_err());
        for f in SymbolFamily::ALL {
            assert_eq!(SymbolFamily::from_tag(f.tag()), Some(f));
            assert_eq!(f.to_string().parse::<SymbolFamily>(), Ok(f));
        }
    }
}
