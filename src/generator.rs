// src/generator.rs

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use smallvec::SmallVec;

use crate::error::{Error, Result};
use crate::evaluator::Evaluator;
use crate::family::{SymbolFamily, Tuple, triad};
use crate::key::CompositeKey;
use crate::lifecycle::Tables;
use crate::store::{TableEntry, TableStore};

/// All triads with components in `0..=tj`, lexicographic.
fn triads(tj: i32) -> Vec<[i32; 3]> {
    let mut out = Vec::new();
    for a in 0..=tj {
        for b in 0..=tj {
            for c in 0..=tj {
                if triad(a, b, c) {
                    out.push([a, b, c]);
                }
            }
        }
    }
    out
}

pub(crate) fn progress_bar(len: usize, show: bool, what: &str) -> ProgressBar {
    if !show {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::with_template(&format!(
        "[{{elapsed_precise}}] {{bar:40}} {{pos}}/{{len}} {what}"
    )) {
        pb.set_style(style.progress_chars("=>-"));
    }
    pb
}

/// Lookup coverage of one generator run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeyCheck {
    pub generated: usize,
    pub found: usize,
    pub missing: Vec<CompositeKey>,
}

/// Enumerates one representative per symmetry class of `family` with every
/// doubled angular momentum in `0..=tj`, in lexicographic tuple order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyGenerator {
    family: SymbolFamily,
    tj: i32,
}

impl KeyGenerator {
    pub fn new(family: SymbolFamily, tj: u32) -> Result<Self> {
        if tj > u8::MAX as u32 {
            return Err(Error::KeyRange {
                index: 0,
                value: tj as i64,
            });
        }
        Ok(Self {
            family,
            tj: tj as i32,
        })
    }

    pub fn family(&self) -> SymbolFamily {
        self.family
    }

    pub fn tj(&self) -> u32 {
        self.tj as u32
    }

    fn is_representative(&self, t: &[i32]) -> bool {
        matches!(self.family.canonicalize(t), Ok(c) if c.tuple.as_slice() == t)
    }

    // admissible tuples sharing the first triad `head`, in order
    fn expand(&self, head: [i32; 3], rows: &[[i32; 3]]) -> Vec<Tuple> {
        let tj = self.tj;
        let mut out = Vec::new();
        let mut push = |t: Tuple| {
            if self.family.is_admissible(&t) && self.is_representative(&t) {
                out.push(t);
            }
        };
        match self.family {
            SymbolFamily::ThreeJ => {
                let [j1, j2, j3] = head;
                for m1 in (-j1..=j1).step_by(2) {
                    for m2 in (-j2..=j2).step_by(2) {
                        let m3 = -m1 - m2;
                        if m3.abs() <= j3 && (j3 + m3) % 2 == 0 {
                            push(SmallVec::from_slice(&[j1, j2, j3, m1, m2, m3]));
                        }
                    }
                }
            }
            SymbolFamily::SixJ => {
                for j4 in 0..=tj {
                    for j5 in 0..=tj {
                        for j6 in 0..=tj {
                            push(SmallVec::from_slice(&[head[0], head[1], head[2], j4, j5, j6]));
                        }
                    }
                }
            }
            SymbolFamily::NineJ => {
                for r2 in rows {
                    for r3 in rows {
                        let mut t: Tuple = SmallVec::from_slice(&head);
                        t.extend_from_slice(r2);
                        t.extend_from_slice(r3);
                        push(t);
                    }
                }
            }
        }
        out
    }

    /// Canonical representatives. `tj = 0` gives the all-zero tuple only.
    pub fn tuples(&self) -> Vec<Tuple> {
        let rows = triads(self.tj);
        rows.par_iter()
            .flat_map_iter(|&head| self.expand(head, &rows))
            .collect()
    }

    pub fn keys(&self) -> Result<Vec<CompositeKey>> {
        self.tuples()
            .iter()
            .map(|t| self.family.encode(t))
            .collect()
    }

    /// Evaluate every representative with `eval`, in generator order.
    pub fn compute_entries(
        &self,
        eval: &dyn Evaluator,
        show_progress: bool,
    ) -> Result<Vec<(CompositeKey, f64)>> {
        let tuples = self.tuples();
        let pb = progress_bar(tuples.len(), show_progress, "symbols");
        let entries = tuples
            .par_iter()
            .map(|t| {
                let key = self.family.encode(t)?;
                let value = eval.compute(self.family, t)?;
                pb.inc(1);
                Ok((key, value))
            })
            .collect::<Result<Vec<_>>>();
        pb.finish_and_clear();
        entries
    }

    /// Bulk population: compute in parallel, insert from this thread.
    pub fn populate(&self, store: &TableStore, eval: &dyn Evaluator) -> Result<usize> {
        let entries = self.compute_entries(eval, false)?;
        for &(key, value) in &entries {
            store.insert(key, TableEntry::Inline(value))?;
        }
        Ok(entries.len())
    }

    /// Which generated keys resolve in `tables`.
    pub fn verify(&self, tables: &Tables) -> Result<KeyCheck> {
        let keys = self.keys()?;
        let hits = keys
            .par_iter()
            .map(|k| tables.lookup(self.family, k).map(|e| e.is_some()))
            .collect::<Result<Vec<bool>>>()?;
        let missing: Vec<CompositeKey> = keys
            .iter()
            .zip(&hits)
            .filter(|&(_, &hit)| !hit)
            .map(|(k, _)| *k)
            .collect();
        Ok(KeyCheck {
            generated: keys.len(),
            found: keys.len() - missing.len(),
            missing,
        })
    }
}

/// Keys of the 9-component recoupling signatures that 21j-class symbols are
/// assembled from, for every doubled angular momentum up to `tj`.
pub fn hash_21j_symbols(tj: u32) -> Result<Vec<CompositeKey>> {
    KeyGenerator::new(SymbolFamily::NineJ, tj)?.keys()
}
