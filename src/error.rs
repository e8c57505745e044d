use std::path::PathBuf;

use thiserror::Error;

use crate::family::SymbolFamily;
use crate::key::CompositeKey;

#[derive(Error, Debug)]
pub enum Error {
    #[error("table root {0:?} does not exist or is not a directory")]
    Path(PathBuf),

    #[error("no table family could be loaded from {0:?}")]
    Load(PathBuf),

    #[error("invalid table file {path:?}: {reason}")]
    Format { path: PathBuf, reason: String },

    #[error("tables are already loaded in this process")]
    AlreadyInitialized,

    #[error("tables are not loaded (init not called or already released)")]
    NotInitialized,

    #[error("component {index} = {value} does not fit in a key byte")]
    KeyRange { index: usize, value: i64 },

    #[error("{family} symbol takes {expected} quantum numbers, got {got}")]
    Arity {
        family: SymbolFamily,
        expected: usize,
        got: usize,
    },

    #[error("conflicting entry for key {0}")]
    DuplicateKey(CompositeKey),

    #[error("evaluation failed: {0}")]
    Evaluation(String),

    #[error("wigxjpf library: {0}")]
    Library(String),

    #[error("worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn format(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::Format {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
