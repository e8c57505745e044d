// src/lifecycle.rs

use memmap2::Mmap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

use crate::config::LoadOptions;
use crate::error::{Error, Result};
use crate::evaluator::Evaluator;
use crate::family::SymbolFamily;
use crate::format::TableFamily;
use crate::key::CompositeKey;
use crate::loader::{self, LoadReport};
use crate::runtime;
use crate::store::{TableEntry, TableStore};

/// One live table set per process.
static LOADED: AtomicBool = AtomicBool::new(false);

/// True while some `Tables` handle holds a successful load.
pub fn is_initialized() -> bool {
    LOADED.load(Ordering::Acquire)
}

struct Claim {
    armed: bool,
}

impl Claim {
    fn acquire() -> Result<Self> {
        LOADED
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| Claim { armed: true })
            .map_err(|_| Error::AlreadyInitialized)
    }

    fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for Claim {
    fn drop(&mut self) {
        if self.armed {
            LOADED.store(false, Ordering::Release);
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadState {
    Uninitialized,
    Ready {
        root: PathBuf,
        families: Vec<TableFamily>,
    },
}

/// Handle to the loaded tables. Lookups take `&self` and may run from any
/// number of threads; `release` takes `&mut self`, so it cannot overlap them.
pub struct Tables {
    state: LoadState,
    stores: [TableStore; 3],
    regions: Vec<Mmap>,
    report: LoadReport,
    verbosity: u8,
}

/// Load every table below `opts.root`.
///
/// Fails with `Path` for a bad root (nothing changes), `AlreadyInitialized`
/// while another handle is live, and otherwise with whatever the load hit; a
/// failed load leaves the process uninitialized with nothing mapped.
pub fn init(opts: &LoadOptions) -> Result<Tables> {
    if !opts.root.is_dir() {
        return Err(Error::Path(opts.root.clone()));
    }
    let claim = Claim::acquire()?;
    let loaded = runtime::run_on(opts.threads, || loader::load(opts))??;
    claim.keep();

    let families = loaded.report.families();
    if opts.verbosity > 0 {
        info!(
            root = %opts.root.display(),
            files = loaded.report.files.len(),
            records = loaded.report.records(),
            "tables ready"
        );
    }
    Ok(Tables {
        state: LoadState::Ready {
            root: opts.root.clone(),
            families,
        },
        stores: loaded.stores,
        regions: loaded.regions,
        report: loaded.report,
        verbosity: opts.verbosity,
    })
}

/// Same as [`Tables::release`].
pub fn release(tables: &mut Tables) {
    tables.release();
}

impl Tables {
    fn ready(&self) -> Result<()> {
        match self.state {
            LoadState::Ready { .. } => Ok(()),
            LoadState::Uninitialized => Err(Error::NotInitialized),
        }
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }

    pub fn is_loaded(&self) -> bool {
        self.ready().is_ok()
    }

    pub fn report(&self) -> &LoadReport {
        &self.report
    }

    /// Entries held for `family` (0 once released).
    pub fn len(&self, family: SymbolFamily) -> usize {
        self.stores[family.index()].len()
    }

    pub fn store(&self, family: SymbolFamily) -> Result<&TableStore> {
        self.ready()?;
        Ok(&self.stores[family.index()])
    }

    /// A miss is `Ok(None)`.
    pub fn lookup(&self, family: SymbolFamily, key: &CompositeKey) -> Result<Option<TableEntry>> {
        self.ready()?;
        Ok(self.stores[family.index()].lookup(key))
    }

    pub fn value_of(&self, entry: TableEntry) -> Result<f64> {
        self.ready()?;
        loader::resolve(&self.regions, entry).ok_or(Error::NotInitialized)
    }

    /// Stored value for a canonical key.
    pub fn get(&self, family: SymbolFamily, key: &CompositeKey) -> Result<Option<f64>> {
        match self.lookup(family, key)? {
            Some(entry) => self.value_of(entry).map(Some),
            None => Ok(None),
        }
    }

    /// Value of any tuple in a loaded symmetry class, phase applied.
    pub fn symbol(&self, family: SymbolFamily, tuple: &[i32]) -> Result<Option<f64>> {
        self.ready()?;
        let canon = family.canonicalize(tuple)?;
        Ok(self
            .get(family, &canon.key)?
            .map(|v| v * f64::from(canon.phase)))
    }

    /// Table value, or `eval` on a miss. Tuples too large for a key always miss.
    pub fn symbol_or_compute(
        &self,
        family: SymbolFamily,
        tuple: &[i32],
        eval: &dyn Evaluator,
    ) -> Result<f64> {
        match self.symbol(family, tuple) {
            Ok(Some(v)) => Ok(v),
            Ok(None) | Err(Error::KeyRange { .. }) => eval.compute(family, tuple),
            Err(e) => Err(e),
        }
    }

    /// Unmap and free everything `init` acquired. Idempotent.
    pub fn release(&mut self) {
        if self.state == LoadState::Uninitialized {
            return;
        }
        for store in &self.stores {
            store.clear();
        }
        self.regions = Vec::new();
        self.report = LoadReport::default();
        self.state = LoadState::Uninitialized;
        LOADED.store(false, Ordering::Release);
        if self.verbosity > 0 {
            info!("tables released");
        }
    }
}

impl Drop for Tables {
    fn drop(&mut self) {
        self.release();
    }
}
