//! Precomputed Wigner 3j/6j/9j symbol tables behind a concurrent hash lookup.
//!
//! [`init`] walks a folder for `fastwigxj` (`*.3j`, `*.6j`, `*.9j`, memory
//! mapped) and `wigxjpf` (`*.npz`) tables and merges them into one sharded
//! store per symbol family. Lookups go through [`Tables`]; misses can fall
//! back to an [`Evaluator`].

pub mod config;
pub mod error;
pub mod evaluator;
pub mod family;
pub mod format;
pub mod generator;
pub mod key;
pub mod lifecycle;
pub mod loader;
pub mod runtime;
pub mod store;
pub mod verify;

pub use config::LoadOptions;
pub use error::{Error, Result};
pub use evaluator::{Evaluator, WigxjpfLibrary};
pub use family::{Canonical, SymbolFamily};
pub use format::{TableFamily, write_table};
pub use generator::{KeyGenerator, hash_21j_symbols};
pub use key::{CompositeKey, KeyHasher};
pub use lifecycle::{LoadState, Tables, init, is_initialized, release};
pub use store::{DuplicatePolicy, TableEntry, TableStore};
pub use verify::{VerifyOptions, VerifyReport, test_fastwig};
