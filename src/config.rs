use std::path::{Path, PathBuf};

use crate::store::{DEFAULT_SHARDS, DuplicatePolicy};

pub const DEFAULT_MAX_DEPTH: usize = 16;

/// How `init` discovers and loads tables.
#[derive(Clone, Debug)]
pub struct LoadOptions {
    pub root: PathBuf,
    /// 0 = silent, 1 = per-file and partial-load messages, 2+ = memory figures.
    pub verbosity: u8,
    pub max_depth: usize,
    pub duplicates: DuplicatePolicy,
    /// Recompute the canonical form of every loaded key.
    pub validate_keys: bool,
    pub shards: usize,
    /// Workers for key validation; `None` uses rayon's global pool.
    pub threads: Option<usize>,
}

impl LoadOptions {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            verbosity: 0,
            max_depth: DEFAULT_MAX_DEPTH,
            duplicates: DuplicatePolicy::Reject,
            validate_keys: true,
            shards: DEFAULT_SHARDS,
            threads: None,
        }
    }

    /// Defaults overridden by `FASTWIG_MAX_DEPTH`, `FASTWIG_DUPLICATES`,
    /// `FASTWIG_VALIDATE_KEYS`, `FASTWIG_SHARDS` and `FASTWIG_THREADS`.
    /// Unparsable values are ignored.
    pub fn from_env(root: impl Into<PathBuf>) -> Self {
        let mut opts = Self::new(root);
        if let Some(d) = env_parse::<usize>("FASTWIG_MAX_DEPTH") {
            opts.max_depth = d;
        }
        if let Some(p) = env_parse::<DuplicatePolicy>("FASTWIG_DUPLICATES") {
            opts.duplicates = p;
        }
        match std::env::var("FASTWIG_VALIDATE_KEYS").ok().as_deref() {
            Some("0") | Some("false") => opts.validate_keys = false,
            Some("1") | Some("true") => opts.validate_keys = true,
            _ => {}
        }
        if let Some(s) = env_parse::<usize>("FASTWIG_SHARDS") {
            opts.shards = s;
        }
        opts.threads = env_threads();
        opts
    }

    pub fn verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn duplicates(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicates = policy;
        self
    }

    pub fn validate_keys(mut self, on: bool) -> Self {
        self.validate_keys = on;
        self
    }

    pub fn shards(mut self, shards: usize) -> Self {
        self.shards = shards;
        self
    }

    pub fn threads(mut self, threads: Option<usize>) -> Self {
        self.threads = threads;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// `FASTWIG_THREADS`, when set to a positive count.
fn env_threads() -> Option<usize> {
    env_parse::<usize>("FASTWIG_THREADS").filter(|&n| n > 0)
}

fn env_parse<T: std::str::FromStr>(var: &str) -> Option<T> {
    let raw = std::env::var(var).ok()?;
    if raw.trim().is_empty() {
        return None;
    }
    raw.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let opts = LoadOptions::new("/tables")
            .verbosity(2)
            .max_depth(1)
            .duplicates(DuplicatePolicy::Overwrite)
            .validate_keys(false)
            .shards(8)
            .threads(Some(2));
        assert_eq!(opts.root(), Path::new("/tables"));
        assert_eq!(opts.verbosity, 2);
        assert_eq!(opts.max_depth, 1);
        assert_eq!(opts.duplicates, DuplicatePolicy::Overwrite);
        assert!(!opts.validate_keys);
        assert_eq!(opts.shards, 8);
        assert_eq!(opts.threads, Some(2));
    }

    #[test]
    fn defaults_are_strict() {
        let opts = LoadOptions::new("x");
        assert_eq!(opts.verbosity, 0);
        assert_eq!(opts.duplicates, DuplicatePolicy::Reject);
        assert!(opts.validate_keys);
        assert_eq!(opts.max_depth, DEFAULT_MAX_DEPTH);
        assert_eq!(opts.threads, None);
    }
}
