// src/format/wigxjpf.rs
//
// meta_family.npy  u8[1]     symbol tag
// keys.npy         u8[N, 9]  canonical keys
// values.npy       f64[N]

use ndarray::{Array1, Array2};
use ndarray_npy::{NpzReader, NpzWriter};
use rayon::prelude::*;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::family::SymbolFamily;
use crate::key::{CompositeKey, KEY_LEN};

/// A fully parsed wigxjpf table.
#[derive(Debug)]
pub struct WigxjpfTable {
    pub path: PathBuf,
    pub symbol: SymbolFamily,
    pub keys: Vec<CompositeKey>,
    pub values: Vec<f64>,
}

fn read_u8<R: Read + Seek>(npz: &mut NpzReader<R>, path: &Path, name: &str) -> Result<Array1<u8>> {
    npz.by_name(name)
        .map_err(|e| Error::format(path, format!("{name}: {e}")))
}
fn read_u8_2d<R: Read + Seek>(
    npz: &mut NpzReader<R>,
    path: &Path,
    name: &str,
) -> Result<Array2<u8>> {
    npz.by_name(name)
        .map_err(|e| Error::format(path, format!("{name}: {e}")))
}
fn read_f64<R: Read + Seek>(npz: &mut NpzReader<R>, path: &Path, name: &str) -> Result<Array1<f64>> {
    npz.by_name(name)
        .map_err(|e| Error::format(path, format!("{name}: {e}")))
}

impl WigxjpfTable {
    pub fn read(path: &Path) -> Result<Self> {
        let f = File::open(path)?;
        let mut npz = NpzReader::new(f).map_err(|e| Error::format(path, e.to_string()))?;

        let tag = read_u8(&mut npz, path, "meta_family.npy")?;
        let symbol = tag
            .iter()
            .next()
            .copied()
            .and_then(SymbolFamily::from_tag)
            .ok_or_else(|| Error::format(path, format!("bad symbol tag {tag:?}")))?;

        let keys_arr = read_u8_2d(&mut npz, path, "keys.npy")?;
        let values_arr = read_f64(&mut npz, path, "values.npy")?;

        // --- shape checks ---
        let shape = keys_arr.shape();
        if shape[1] != KEY_LEN {
            return Err(Error::format(
                path,
                format!("keys.npy has shape {shape:?} (expected N x {KEY_LEN})"),
            ));
        }
        if values_arr.len() != shape[0] {
            return Err(Error::format(
                path,
                format!(
                    "keys.npy has {} rows but values.npy has {} entries",
                    shape[0],
                    values_arr.len()
                ),
            ));
        }

        let keys: Vec<CompositeKey> = keys_arr
            .outer_iter()
            .map(|row| {
                let mut k = CompositeKey::default();
                for (i, &b) in row.iter().enumerate() {
                    k[i] = b;
                }
                k
            })
            .collect();

        Ok(Self {
            path: path.to_path_buf(),
            symbol,
            keys,
            values: values_arr.to_vec(),
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn check_canonical(&self) -> Result<()> {
        let bad = self
            .keys
            .par_iter()
            .position_first(|k| !self.symbol.is_canonical(k));
        match bad {
            Some(row) => Err(Error::format(
                &self.path,
                format!("row {row} holds a non-canonical {} key", self.symbol),
            )),
            None => Ok(()),
        }
    }
}

pub fn write(path: &Path, symbol: SymbolFamily, entries: &[(CompositeKey, f64)]) -> Result<()> {
    let f = File::create(path)?;
    let mut npz = NpzWriter::new(f);

    let flat: Vec<u8> = entries
        .iter()
        .flat_map(|(k, _)| k.as_bytes().iter().copied())
        .collect();
    let keys = Array2::from_shape_vec((entries.len(), KEY_LEN), flat)
        .map_err(|e| Error::format(path, e.to_string()))?;
    let values: Array1<f64> = entries.iter().map(|(_, v)| *v).collect();

    npz.add_array("meta_family.npy", &Array1::from_vec(vec![symbol.tag()]))
        .map_err(std::io::Error::other)?;
    npz.add_array("keys.npy", &keys)
        .map_err(std::io::Error::other)?;
    npz.add_array("values.npy", &values)
        .map_err(std::io::Error::other)?;
    npz.finish().map_err(std::io::Error::other)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn write_then_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wigxjpf_9j.npz");
        let family = SymbolFamily::NineJ;
        let entries: Vec<(CompositeKey, f64)> = [
            [0, 0, 0, 0, 0, 0, 0, 0, 0],
            [2, 2, 0, 2, 2, 0, 0, 0, 0],
            [2, 2, 2, 2, 2, 2, 2, 2, 2],
        ]
        .iter()
        .enumerate()
        .map(|(i, t)| (family.canonicalize(t).unwrap().key, 0.5 - i as f64))
        .collect();
        write(&path, family, &entries).unwrap();

        let table = WigxjpfTable::read(&path).unwrap();
        assert_eq!(table.symbol, family);
        assert_eq!(table.len(), 3);
        for (i, (k, v)) in entries.iter().enumerate() {
            assert_eq!(table.keys[i], *k);
            assert_eq!(table.values[i], *v);
        }
        table.check_canonical().unwrap();
    }

    #[test]
    fn empty_table_reads_back_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.npz");
        write(&path, SymbolFamily::ThreeJ, &[]).unwrap();
        let table = WigxjpfTable::read(&path).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.symbol, SymbolFamily::ThreeJ);
    }

    #[test]
    fn missing_arrays_are_format_errors() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("partial.npz");
        {
            let mut npz = NpzWriter::new(File::create(&path).unwrap());
            npz.add_array("meta_family.npy", &Array1::from_vec(vec![9u8]))
                .unwrap();
            npz.finish().unwrap();
        }
        assert!(matches!(
            WigxjpfTable::read(&path),
            Err(Error::Format { .. })
        ));
    }

    #[test]
    fn garbage_is_a_format_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("junk.npz");
        std::fs::write(&path, b"definitely not a zip archive").unwrap();
        assert!(matches!(
            WigxjpfTable::read(&path),
            Err(Error::Format { .. })
        ));
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("skew.npz");
        {
            let mut npz = NpzWriter::new(File::create(&path).unwrap());
            npz.add_array("meta_family.npy", &Array1::from_vec(vec![6u8]))
                .unwrap();
            npz.add_array("keys.npy", &Array2::<u8>::zeros((2, KEY_LEN)))
                .unwrap();
            npz.add_array("values.npy", &Array1::from_vec(vec![1.0f64]))
                .unwrap();
            npz.finish().unwrap();
        }
        assert!(matches!(
            WigxjpfTable::read(&path),
            Err(Error::Format { .. })
        ));
    }
}
