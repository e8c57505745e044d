//! Numeric collaborator used on cache misses and for verification.
//!
//! The crate never evaluates symbols itself. [`Evaluator`] is the seam; closures
//! implement it for tests and in-process builders, [`WigxjpfLibrary`] binds an
//! installed `libwigxjpf` shared object.

use libloading::Library;
use std::cell::Cell;
use std::ffi::c_int;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::error::{Error, Result};
use crate::family::SymbolFamily;

pub trait Evaluator: Sync {
    /// Value of the symbol `tuple` (doubled quantum numbers). Fails when the
    /// selection rules are violated.
    fn compute(&self, family: SymbolFamily, tuple: &[i32]) -> Result<f64>;
}

impl<F> Evaluator for F
where
    F: Fn(SymbolFamily, &[i32]) -> Result<f64> + Sync,
{
    fn compute(&self, family: SymbolFamily, tuple: &[i32]) -> Result<f64> {
        self(family, tuple)
    }
}

type TableInitFn = unsafe extern "C" fn(c_int, c_int);
type TempInitFn = unsafe extern "C" fn(c_int);
type FreeFn = unsafe extern "C" fn();
type Wig3Fn = unsafe extern "C" fn(c_int, c_int, c_int, c_int, c_int, c_int) -> f64;
type Wig6Fn = unsafe extern "C" fn(c_int, c_int, c_int, c_int, c_int, c_int) -> f64;
type Wig9Fn =
    unsafe extern "C" fn(c_int, c_int, c_int, c_int, c_int, c_int, c_int, c_int, c_int) -> f64;

// wigxjpf's factorial tables are global to the library, so one instance at a time.
static OPEN: AtomicBool = AtomicBool::new(false);
static GENERATION: AtomicU64 = AtomicU64::new(1);

thread_local! {
    // (generation, max_two_j) this thread's wigxjpf scratch space was sized for
    static TEMP_FOR: Cell<(u64, c_int)> = const { Cell::new((0, 0)) };
}

/// Run `init` unless this thread is already set up for `(generation, max_two_j)`.
fn ensure_thread_scratch(generation: u64, max_two_j: c_int, init: impl FnOnce()) {
    TEMP_FOR.with(|current| {
        if current.get() != (generation, max_two_j) {
            init();
            current.set((generation, max_two_j));
        }
    });
}

/// `wigxjpf` loaded at runtime. At most one instance is open per process.
pub struct WigxjpfLibrary {
    generation: u64,
    max_two_j: c_int,
    temp_init: TempInitFn,
    table_free: FreeFn,
    wig3jj: Wig3Fn,
    wig6jj: Wig6Fn,
    wig9jj: Wig9Fn,
    // keeps the function pointers above valid
    _lib: Library,
}

impl WigxjpfLibrary {
    /// Open the shared object and build its factorial tables for `2j <= max_two_j`.
    pub fn open(path: &Path, max_two_j: u32) -> Result<Self> {
        if OPEN
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::Library(
                "another wigxjpf instance is open in this process".into(),
            ));
        }
        let lib = Self::bind(path, max_two_j);
        if lib.is_err() {
            OPEN.store(false, Ordering::Release);
        }
        lib
    }

    fn bind(path: &Path, max_two_j: u32) -> Result<Self> {
        let max_two_j = c_int::try_from(max_two_j)
            .map_err(|_| Error::Library(format!("max_two_j {max_two_j} out of range")))?;
        // SAFETY: loading runs the library's initializers; the caller names a
        // trusted wigxjpf build.
        let lib = unsafe { Library::new(path) }
            .map_err(|e| Error::Library(format!("{}: {e}", path.display())))?;

        // SAFETY: signatures follow wigxjpf.h.
        unsafe {
            let table_init = *lib
                .get::<TableInitFn>(b"wig_table_init\0")
                .map_err(|e| Error::Library(e.to_string()))?;
            let temp_init = *lib
                .get::<TempInitFn>(b"wig_thread_temp_init\0")
                .map_err(|e| Error::Library(e.to_string()))?;
            let table_free = *lib
                .get::<FreeFn>(b"wig_table_free\0")
                .map_err(|e| Error::Library(e.to_string()))?;
            let wig3jj = *lib
                .get::<Wig3Fn>(b"wig3jj\0")
                .map_err(|e| Error::Library(e.to_string()))?;
            let wig6jj = *lib
                .get::<Wig6Fn>(b"wig6jj\0")
                .map_err(|e| Error::Library(e.to_string()))?;
            let wig9jj = *lib
                .get::<Wig9Fn>(b"wig9jj\0")
                .map_err(|e| Error::Library(e.to_string()))?;

            table_init(max_two_j, 9);

            Ok(Self {
                generation: GENERATION.fetch_add(1, Ordering::Relaxed),
                max_two_j,
                temp_init,
                table_free,
                wig3jj,
                wig6jj,
                wig9jj,
                _lib: lib,
            })
        }
    }

    fn ensure_temp(&self) {
        // SAFETY: tables were initialized in `open`.
        ensure_thread_scratch(self.generation, self.max_two_j, || unsafe {
            (self.temp_init)(self.max_two_j)
        });
    }
}

impl Evaluator for WigxjpfLibrary {
    fn compute(&self, family: SymbolFamily, t: &[i32]) -> Result<f64> {
        if !family.is_admissible(t) {
            return Err(Error::Evaluation(format!(
                "{family} symbol {t:?} violates the selection rules"
            )));
        }
        if t.iter().any(|&v| v.abs() > self.max_two_j) {
            return Err(Error::Evaluation(format!(
                "{family} symbol {t:?} exceeds max 2j = {}",
                self.max_two_j
            )));
        }
        self.ensure_temp();
        // SAFETY: arguments are admissible and within the initialized range.
        let v = unsafe {
            match family {
                SymbolFamily::ThreeJ => (self.wig3jj)(t[0], t[1], t[2], t[3], t[4], t[5]),
                SymbolFamily::SixJ => (self.wig6jj)(t[0], t[1], t[2], t[3], t[4], t[5]),
                SymbolFamily::NineJ => {
                    (self.wig9jj)(t[0], t[1], t[2], t[3], t[4], t[5], t[6], t[7], t[8])
                }
            }
        };
        Ok(v)
    }
}

impl Drop for WigxjpfLibrary {
    fn drop(&mut self) {
        // SAFETY: no computation can be in flight while we are dropped, and
        // no other instance shares the tables.
        unsafe { (self.table_free)() };
        OPEN.store(false, Ordering::Release);
    }
}
