// src/format/fastwig.rs
//
// Layout (little-endian):
//   0..8    magic "FWXJTBL1"
//   8..12   u32 version
//   12      u8 symbol tag (3, 6, 9)
//   13..16  zero
//   16..24  u64 record count
//   24..    records: 9 key bytes + f64 value

use memmap2::Mmap;
use rayon::prelude::*;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use super::extension_symbol;
use crate::error::{Error, Result};
use crate::family::SymbolFamily;
use crate::key::{CompositeKey, KEY_LEN};

pub const MAGIC: &[u8; 8] = b"FWXJTBL1";
pub const VERSION: u32 = 1;
pub const HEADER_LEN: usize = 24;
pub const RECORD_LEN: usize = KEY_LEN + 8;

#[inline]
fn record_offset(slot: usize) -> usize {
    HEADER_LEN + slot * RECORD_LEN
}

/// Key stored at `slot` of a validated region.
#[inline]
pub fn record_key(region: &[u8], slot: usize) -> Option<CompositeKey> {
    let off = record_offset(slot);
    let bytes: [u8; KEY_LEN] = region.get(off..off + KEY_LEN)?.try_into().ok()?;
    Some(CompositeKey::from_bytes(bytes))
}

/// Value stored at `slot` of a validated region.
#[inline]
pub fn record_value(region: &[u8], slot: usize) -> Option<f64> {
    let off = record_offset(slot) + KEY_LEN;
    let bytes: [u8; 8] = region.get(off..off + 8)?.try_into().ok()?;
    Some(f64::from_le_bytes(bytes))
}

/// A mapped and header-checked fastwig table.
pub struct FastwigTable {
    path: PathBuf,
    symbol: SymbolFamily,
    count: usize,
    map: Mmap,
}

impl FastwigTable {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len() as usize;
        if len < HEADER_LEN {
            return Err(Error::format(path, format!("truncated header ({len} bytes)")));
        }
        // SAFETY: mapped read-only; table files must not change while loaded.
        let map = unsafe { Mmap::map(&file)? };

        if &map[..8] != MAGIC {
            return Err(Error::format(path, "bad magic"));
        }
        let version = u32::from_le_bytes([map[8], map[9], map[10], map[11]]);
        if version != VERSION {
            return Err(Error::format(path, format!("unsupported version {version}")));
        }
        let symbol = SymbolFamily::from_tag(map[12])
            .ok_or_else(|| Error::format(path, format!("unknown symbol tag {}", map[12])))?;
        if let Some(ext) = extension_symbol(path) {
            if ext != symbol {
                return Err(Error::format(
                    path,
                    format!("header holds {symbol} symbols but extension says {ext}"),
                ));
            }
        }
        if map[13..16] != [0, 0, 0] {
            return Err(Error::format(path, "reserved header bytes are not zero"));
        }
        let mut count_bytes = [0u8; 8];
        count_bytes.copy_from_slice(&map[16..24]);
        let count = u64::from_le_bytes(count_bytes);

        let expected = usize::try_from(count)
            .ok()
            .and_then(|c| c.checked_mul(RECORD_LEN))
            .and_then(|b| b.checked_add(HEADER_LEN));
        if expected != Some(len) {
            return Err(Error::format(
                path,
                format!("{count} records need {expected:?} bytes, file has {len}"),
            ));
        }
        if count > u32::MAX as u64 {
            return Err(Error::format(path, format!("{count} records exceed slot range")));
        }

        Ok(Self {
            path: path.to_path_buf(),
            symbol,
            count: count as usize,
            map,
        })
    }

    #[inline]
    pub fn symbol(&self) -> SymbolFamily {
        self.symbol
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn key(&self, slot: usize) -> Option<CompositeKey> {
        if slot >= self.count {
            return None;
        }
        record_key(&self.map, slot)
    }

    pub fn value(&self, slot: usize) -> Option<f64> {
        if slot >= self.count {
            return None;
        }
        record_value(&self.map, slot)
    }

    /// Reject tables whose keys were built with a different canonical encoding.
    pub fn check_canonical(&self) -> Result<()> {
        let bad = (0..self.count).into_par_iter().find_first(|&slot| {
            record_key(&self.map, slot).is_none_or(|k| !self.symbol.is_canonical(&k))
        });
        match bad {
            Some(slot) => Err(Error::format(
                &self.path,
                format!("record {slot} holds a non-canonical {} key", self.symbol),
            )),
            None => Ok(()),
        }
    }

    pub fn into_map(self) -> Mmap {
        self.map
    }
}

pub fn write(path: &Path, symbol: SymbolFamily, entries: &[(CompositeKey, f64)]) -> Result<()> {
    if let Some(ext) = extension_symbol(path) {
        if ext != symbol {
            return Err(Error::format(
                path,
                format!("cannot write {symbol} symbols to a .{}j file", ext.tag()),
            ));
        }
    }
    let f = File::create(path)?;
    let mut w = BufWriter::new(f);
    w.write_all(MAGIC)?;
    w.write_all(&VERSION.to_le_bytes())?;
    w.write_all(&[symbol.tag(), 0, 0, 0])?;
    w.write_all(&(entries.len() as u64).to_le_bytes())?;
    for (key, value) in entries {
        w.write_all(key.as_bytes())?;
        w.write_all(&value.to_le_bytes())?;
    }
    w.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> Vec<(CompositeKey, f64)> {
        let family = SymbolFamily::SixJ;
        [[2, 2, 2, 2, 2, 2], [4, 4, 4, 4, 4, 4], [2, 4, 6, 4, 2, 4]]
            .iter()
            .map(|t| (family.canonicalize(t).unwrap().key, t[2] as f64 * 0.125))
            .collect()
    }

    #[test]
    fn write_then_map() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("table.6j");
        let entries = sample();
        write(&path, SymbolFamily::SixJ, &entries).unwrap();

        let table = FastwigTable::open(&path).unwrap();
        assert_eq!(table.symbol(), SymbolFamily::SixJ);
        assert_eq!(table.len(), 3);
        for (slot, (k, v)) in entries.iter().enumerate() {
            assert_eq!(table.key(slot), Some(*k));
            assert_eq!(table.value(slot), Some(*v));
        }
        assert_eq!(table.key(3), None);
        table.check_canonical().unwrap();
    }

    #[test]
    fn truncated_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("table.6j");
        write(&path, SymbolFamily::SixJ, &sample()).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();
        assert!(matches!(FastwigTable::open(&path), Err(Error::Format { .. })));

        std::fs::write(&path, &bytes[..10]).unwrap();
        assert!(matches!(FastwigTable::open(&path), Err(Error::Format { .. })));
    }

    #[test]
    fn bad_magic_and_tag_are_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("table.6j");
        write(&path, SymbolFamily::SixJ, &sample()).unwrap();
        let mut bytes = std::fs::read(&path).unwrap();

        bytes[0] = b'X';
        std::fs::write(&path, &bytes).unwrap();
        assert!(matches!(FastwigTable::open(&path), Err(Error::Format { .. })));

        bytes[0] = MAGIC[0];
        bytes[12] = 9;
        std::fs::write(&path, &bytes).unwrap();
        assert!(matches!(FastwigTable::open(&path), Err(Error::Format { .. })));
    }

    #[test]
    fn non_canonical_keys_are_flagged() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("table.9j");
        // canonical form of this tuple is a different permutation
        let key = SymbolFamily::NineJ
            .encode(&[0, 2, 2, 2, 0, 2, 2, 2, 0])
            .unwrap();
        assert!(!SymbolFamily::NineJ.is_canonical(&key));
        write(&path, SymbolFamily::NineJ, &[(key, 1.0)]).unwrap();
        let table = FastwigTable::open(&path).unwrap();
        assert!(matches!(table.check_canonical(), Err(Error::Format { .. })));
    }

    #[test]
    fn extension_must_match_symbol() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("table.3j");
        assert!(write(&path, SymbolFamily::SixJ, &sample()).is_err());
    }
}
