// src/store.rs

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::key::{CompositeKey, KeyHasher};

/// Where a key's value lives.
#[derive(Clone, Copy, Debug)]
pub enum TableEntry {
    /// Record `slot` of mapped region `region`.
    Mapped { region: u32, slot: u32 },
    /// Value held directly in the store.
    Inline(f64),
}

impl PartialEq for TableEntry {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::Mapped { region, slot },
                Self::Mapped {
                    region: r2,
                    slot: s2,
                },
            ) => region == r2 && slot == s2,
            (Self::Inline(a), Self::Inline(b)) => a.to_bits() == b.to_bits(),
            _ => false,
        }
    }
}

/// What a second insert of an existing key with a different entry does.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DuplicatePolicy {
    #[default]
    Reject,
    Overwrite,
}

impl FromStr for DuplicatePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "overwrite" => Ok(Self::Overwrite),
            other => Err(format!("unknown duplicate policy {other:?}")),
        }
    }
}

pub const DEFAULT_SHARDS: usize = 64;

/// Sharded concurrent map `CompositeKey -> TableEntry`.
///
/// Filled from one thread while loading, then read from any number of threads.
pub struct TableStore {
    map: DashMap<CompositeKey, TableEntry, KeyHasher>,
    policy: DuplicatePolicy,
}

impl TableStore {
    pub fn new(policy: DuplicatePolicy) -> Self {
        Self::with_shards(policy, DEFAULT_SHARDS)
    }

    /// `shards` is rounded up to a power of two, minimum 2.
    pub fn with_shards(policy: DuplicatePolicy, shards: usize) -> Self {
        let shards = shards.max(2).next_power_of_two();
        Self {
            map: DashMap::with_capacity_and_hasher_and_shard_amount(
                0,
                KeyHasher::default(),
                shards,
            ),
            policy,
        }
    }

    #[inline]
    pub fn policy(&self) -> DuplicatePolicy {
        self.policy
    }

    /// Re-inserting an identical entry is a no-op; a conflicting one obeys the policy.
    pub fn insert(&self, key: CompositeKey, entry: TableEntry) -> Result<()> {
        match self.map.entry(key) {
            Entry::Vacant(v) => {
                v.insert(entry);
                Ok(())
            }
            Entry::Occupied(mut o) => {
                if *o.get() == entry {
                    return Ok(());
                }
                match self.policy {
                    DuplicatePolicy::Overwrite => {
                        o.insert(entry);
                        Ok(())
                    }
                    DuplicatePolicy::Reject => Err(Error::DuplicateKey(key)),
                }
            }
        }
    }

    #[inline]
    pub fn lookup(&self, key: &CompositeKey) -> Option<TableEntry> {
        self.map.get(key).map(|r| *r.value())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&self) {
        self.map.clear();
        self.map.shrink_to_fit();
    }
}

impl Default for TableStore {
    fn default() -> Self {
        Self::new(DuplicatePolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn key(b: u8) -> CompositeKey {
        CompositeKey::from_bytes([b, 1, 2, 3, 4, 5, 6, 7, 8])
    }

    #[test]
    fn insert_then_lookup_returns_entry() {
        let store = TableStore::default();
        store.insert(key(1), TableEntry::Inline(0.25)).unwrap();
        store
            .insert(key(2), TableEntry::Mapped { region: 0, slot: 7 })
            .unwrap();
        assert_eq!(store.lookup(&key(1)), Some(TableEntry::Inline(0.25)));
        assert_eq!(
            store.lookup(&key(2)),
            Some(TableEntry::Mapped { region: 0, slot: 7 })
        );
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn miss_is_none_and_lookups_are_repeatable() {
        let store = TableStore::default();
        store.insert(key(1), TableEntry::Inline(-1.0)).unwrap();
        assert_eq!(store.lookup(&key(9)), None);
        assert_eq!(store.lookup(&key(1)), store.lookup(&key(1)));
        assert_eq!(store.lookup(&key(9)), store.lookup(&key(9)));
    }

    #[test]
    fn identical_reinsert_is_noop_conflict_is_rejected() {
        let store = TableStore::new(DuplicatePolicy::Reject);
        store.insert(key(1), TableEntry::Inline(0.5)).unwrap();
        store.insert(key(1), TableEntry::Inline(0.5)).unwrap();
        assert!(matches!(
            store.insert(key(1), TableEntry::Inline(0.75)),
            Err(Error::DuplicateKey(k)) if k == key(1)
        ));
        assert_eq!(store.lookup(&key(1)), Some(TableEntry::Inline(0.5)));
    }

    #[test]
    fn overwrite_policy_replaces() {
        let store = TableStore::new(DuplicatePolicy::Overwrite);
        assert_eq!(store.policy(), DuplicatePolicy::Overwrite);
        store.insert(key(1), TableEntry::Inline(0.5)).unwrap();
        store.insert(key(1), TableEntry::Inline(0.75)).unwrap();
        assert_eq!(store.lookup(&key(1)), Some(TableEntry::Inline(0.75)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn clear_empties() {
        let store = TableStore::with_shards(DuplicatePolicy::Reject, 3);
        for b in 0..100 {
            store.insert(key(b), TableEntry::Inline(b as f64)).unwrap();
        }
        assert_eq!(store.len(), 100);
        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.lookup(&key(5)), None);
    }

    #[test]
    fn concurrent_readers_see_every_entry() {
        let store = Arc::new(TableStore::default());
        for b in 0..=255u8 {
            store.insert(key(b), TableEntry::Inline(b as f64)).unwrap();
        }
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    (0..=255u8)
                        .filter(|&b| store.lookup(&key(b)) == Some(TableEntry::Inline(b as f64)))
                        .count()
                })
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), 256);
        }
    }

    #[test]
    fn policy_parses() {
        assert_eq!("Overwrite".parse::<DuplicatePolicy>(), Ok(DuplicatePolicy::Overwrite));
        assert_eq!("reject".parse::<DuplicatePolicy>(), Ok(DuplicatePolicy::Reject));
        assert!("maybe".parse::<DuplicatePolicy>().is_err());
    }
}
