// src/verify.rs

use rayon::prelude::*;
use std::path::Path;
use tracing::{info, warn};

use crate::config::LoadOptions;
use crate::error::Result;
use crate::evaluator::Evaluator;
use crate::family::{SymbolFamily, Tuple};
use crate::generator::KeyGenerator;
use crate::lifecycle::{self, Tables};
use crate::runtime;

pub const DEFAULT_TJ: u32 = 4;
pub const DEFAULT_TOLERANCE: f64 = 1e-12;

#[derive(Clone, Debug)]
pub struct VerifyOptions {
    pub tj: u32,
    /// Empty = every family that has entries after loading.
    pub families: Vec<SymbolFamily>,
    pub tolerance: f64,
    pub verbosity: u8,
    /// Workers for loading and checking; `None` uses `FASTWIG_THREADS` or
    /// rayon's global pool.
    pub threads: Option<usize>,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            tj: DEFAULT_TJ,
            families: Vec::new(),
            tolerance: DEFAULT_TOLERANCE,
            verbosity: 0,
            threads: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum FailureKind {
    Missing,
    Mismatch { expected: f64, got: f64 },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Failure {
    pub family: SymbolFamily,
    pub tuple: Tuple,
    pub kind: FailureKind,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct VerifyReport {
    pub families: Vec<SymbolFamily>,
    pub generated: usize,
    pub found: usize,
    pub missing: usize,
    pub mismatched: usize,
    pub failures: Vec<Failure>,
}

impl VerifyReport {
    pub fn failures(&self) -> usize {
        self.missing + self.mismatched
    }

    /// Process exit status: 0 on a clean run, else the failure count capped at 254.
    pub fn exit_code(&self) -> u8 {
        self.failures().min(254) as u8
    }
}

fn agrees(expected: f64, got: f64, tolerance: f64) -> bool {
    let scale = expected.abs().max(got.abs()).max(1.0);
    (expected - got).abs() <= tolerance * scale
}

fn check_family(
    tables: &Tables,
    family: SymbolFamily,
    eval: &dyn Evaluator,
    opts: &VerifyOptions,
) -> Result<(usize, Vec<Failure>)> {
    let tuples = KeyGenerator::new(family, opts.tj)?.tuples();
    let outcomes = tuples
        .par_iter()
        .map(|t| -> Result<Option<Failure>> {
            let kind = match tables.symbol(family, t)? {
                None => FailureKind::Missing,
                Some(got) => {
                    let expected = eval.compute(family, t)?;
                    if agrees(expected, got, opts.tolerance) {
                        return Ok(None);
                    }
                    FailureKind::Mismatch { expected, got }
                }
            };
            Ok(Some(Failure {
                family,
                tuple: t.clone(),
                kind,
            }))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok((tuples.len(), outcomes.into_iter().flatten().collect()))
}

fn run(tables: &Tables, eval: &dyn Evaluator, opts: &VerifyOptions) -> Result<VerifyReport> {
    let families: Vec<SymbolFamily> = if opts.families.is_empty() {
        SymbolFamily::ALL
            .into_iter()
            .filter(|&f| tables.len(f) > 0)
            .collect()
    } else {
        opts.families.clone()
    };

    let mut report = VerifyReport {
        families: families.clone(),
        ..Default::default()
    };
    for family in families {
        let (generated, failures) = check_family(tables, family, eval, opts)?;
        let missing = failures
            .iter()
            .filter(|f| f.kind == FailureKind::Missing)
            .count();
        report.generated += generated;
        report.missing += missing;
        report.mismatched += failures.len() - missing;
        report.found += generated - missing;
        if opts.verbosity > 0 {
            info!(%family, tj = opts.tj, generated, failures = failures.len(), "checked");
            for f in &failures {
                match f.kind {
                    FailureKind::Missing => {
                        warn!(%family, tuple = ?f.tuple.as_slice(), "missing from tables")
                    }
                    FailureKind::Mismatch { expected, got } => {
                        warn!(%family, tuple = ?f.tuple.as_slice(), expected, got, "value mismatch")
                    }
                }
            }
        }
        report.failures.extend(failures);
    }
    Ok(report)
}

/// Load the tables under `folder`, check every generated symbol up to
/// `opts.tj` against `eval`, and release the tables again.
pub fn test_fastwig(
    folder: &Path,
    eval: &dyn Evaluator,
    opts: &VerifyOptions,
) -> Result<VerifyReport> {
    let load = LoadOptions::from_env(folder).verbosity(opts.verbosity);
    let threads = opts.threads.or(load.threads);
    let mut tables = lifecycle::init(&load.threads(threads))?;
    let report = runtime::run_on(threads, || run(&tables, eval, opts));
    tables.release();
    report?
}
