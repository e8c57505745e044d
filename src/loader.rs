// src/loader.rs

use ahash::AHashSet;
use memmap2::Mmap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::LoadOptions;
use crate::error::{Error, Result};
use crate::family::SymbolFamily;
use crate::format::TableFamily;
use crate::format::fastwig::{self, FastwigTable};
use crate::format::wigxjpf::WigxjpfTable;
use crate::key::CompositeKey;
use crate::runtime::peak_rss_bytes;
use crate::store::{DuplicatePolicy, TableEntry, TableStore};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadedFile {
    pub path: PathBuf,
    pub table_family: TableFamily,
    pub symbol: SymbolFamily,
    pub records: usize,
}

/// What `init` found and loaded.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub root: PathBuf,
    pub files: Vec<LoadedFile>,
}

impl LoadReport {
    pub fn is_loaded(&self, family: TableFamily) -> bool {
        self.files.iter().any(|f| f.table_family == family)
    }

    pub fn families(&self) -> Vec<TableFamily> {
        TableFamily::ALL
            .into_iter()
            .filter(|&f| self.is_loaded(f))
            .collect()
    }

    pub fn records(&self) -> usize {
        self.files.iter().map(|f| f.records).sum()
    }
}

pub(crate) struct Loaded {
    pub stores: [TableStore; 3],
    pub regions: Vec<Mmap>,
    pub report: LoadReport,
}

/// Value behind `entry`, if its region is still mapped.
pub(crate) fn resolve(regions: &[Mmap], entry: TableEntry) -> Option<f64> {
    match entry {
        TableEntry::Inline(v) => Some(v),
        TableEntry::Mapped { region, slot } => {
            fastwig::record_value(regions.get(region as usize)?, slot as usize)
        }
    }
}

// Same value under the same key is not a conflict, whichever file it came from.
fn insert_checked(
    store: &TableStore,
    regions: &[Mmap],
    key: CompositeKey,
    entry: TableEntry,
) -> Result<()> {
    if let Some(existing) = store.lookup(&key) {
        let old = resolve(regions, existing).map(f64::to_bits);
        let new = resolve(regions, entry).map(f64::to_bits);
        if old.is_some() && old == new {
            return Ok(());
        }
        if store.policy() == DuplicatePolicy::Overwrite {
            debug!(%key, "overwriting earlier entry");
        }
    }
    store.insert(key, entry)
}

fn walk(
    dir: &Path,
    depth: usize,
    max_depth: usize,
    visited: &mut AHashSet<PathBuf>,
    out: &mut Vec<(PathBuf, TableFamily)>,
) -> io::Result<()> {
    // symlinked directories are followed once
    if !visited.insert(fs::canonicalize(dir)?) {
        return Ok(());
    }
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)?
        .map(|e| e.map(|e| e.path()))
        .collect::<io::Result<_>>()?;
    entries.sort();
    for path in entries {
        let meta = match fs::metadata(&path) {
            Ok(m) => m,
            // dangling symlink
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };
        if meta.is_dir() {
            if depth < max_depth {
                walk(&path, depth + 1, max_depth, visited, out)?;
            }
        } else if meta.is_file() {
            if let Some(family) = TableFamily::recognize(&path) {
                out.push((path, family));
            }
        }
    }
    Ok(())
}

/// Recognized table files below `root`, in path order.
pub fn discover(root: &Path, max_depth: usize) -> Result<Vec<(PathBuf, TableFamily)>> {
    if !root.is_dir() {
        return Err(Error::Path(root.to_path_buf()));
    }
    let mut out = Vec::new();
    walk(root, 0, max_depth, &mut AHashSet::new(), &mut out)?;
    Ok(out)
}

fn load_fastwig(
    path: &Path,
    opts: &LoadOptions,
    stores: &[TableStore; 3],
    regions: &mut Vec<Mmap>,
) -> Result<LoadedFile> {
    let table = FastwigTable::open(path)?;
    if opts.validate_keys {
        table.check_canonical()?;
    }
    let region = u32::try_from(regions.len())
        .map_err(|_| Error::format(path, "too many mapped regions"))?;
    let symbol = table.symbol();
    let records = table.len();
    let path = table.path().to_path_buf();
    regions.push(table.into_map());
    let regions: &[Mmap] = regions;

    let store = &stores[symbol.index()];
    let map = &regions[region as usize];
    for slot in 0..records {
        let key = fastwig::record_key(map, slot)
            .ok_or_else(|| Error::format(&path, format!("record {slot} out of bounds")))?;
        let entry = TableEntry::Mapped {
            region,
            slot: slot as u32,
        };
        insert_checked(store, regions, key, entry)?;
    }

    Ok(LoadedFile {
        path,
        table_family: TableFamily::Fastwig,
        symbol,
        records,
    })
}

fn load_wigxjpf(
    path: &Path,
    opts: &LoadOptions,
    stores: &[TableStore; 3],
    regions: &[Mmap],
) -> Result<LoadedFile> {
    let table = WigxjpfTable::read(path)?;
    if opts.validate_keys {
        table.check_canonical()?;
    }
    let store = &stores[table.symbol.index()];
    for (&key, &value) in table.keys.iter().zip(table.values.iter()) {
        insert_checked(store, regions, key, TableEntry::Inline(value))?;
    }
    Ok(LoadedFile {
        path: path.to_path_buf(),
        table_family: TableFamily::Wigxjpf,
        symbol: table.symbol,
        records: table.len(),
    })
}

/// Discover, validate and load every table below `opts.root`.
///
/// Anything acquired before an error is dropped on the way out, so a failed
/// load leaves nothing mapped.
pub(crate) fn load(opts: &LoadOptions) -> Result<Loaded> {
    let files = discover(&opts.root, opts.max_depth)?;

    let stores: [TableStore; 3] =
        std::array::from_fn(|_| TableStore::with_shards(opts.duplicates, opts.shards));
    let mut regions: Vec<Mmap> = Vec::new();
    let mut report = LoadReport {
        root: opts.root.clone(),
        files: Vec::with_capacity(files.len()),
    };

    for (path, family) in files {
        let loaded = match family {
            TableFamily::Fastwig => load_fastwig(&path, opts, &stores, &mut regions),
            TableFamily::Wigxjpf => load_wigxjpf(&path, opts, &stores, &regions),
        };
        let loaded = match loaded {
            Ok(l) => l,
            Err(e) => {
                if opts.verbosity > 0 {
                    warn!(path = %path.display(), %family, error = %e, "table rejected");
                }
                return Err(e);
            }
        };
        if opts.verbosity > 0 {
            info!(
                path = %loaded.path.display(),
                family = %loaded.table_family,
                symbol = %loaded.symbol,
                records = loaded.records,
                "loaded table"
            );
        }
        report.files.push(loaded);
    }

    if report.files.is_empty() {
        return Err(Error::Load(opts.root.clone()));
    }

    if opts.verbosity > 0 {
        for family in TableFamily::ALL {
            if !report.is_loaded(family) {
                warn!(%family, root = %opts.root.display(), "no tables found; lookups for it will miss");
            }
        }
    }
    if opts.verbosity > 1 {
        let mapped: usize = regions.iter().map(|m| m.len()).sum();
        debug!(
            records = report.records(),
            mapped_regions = regions.len(),
            mapped_mib = mapped >> 20,
            peak_rss_mib = peak_rss_bytes().map(|b| b >> 20),
            "tables resident"
        );
    }

    Ok(Loaded {
        stores,
        regions,
        report,
    })
}
