//! Entry index - concurrent two-level lookup
//!
//! Maps `(ledger_id, entry_id)` to a byte-range location and tracks the
//! greatest entry id inserted per ledger, so last-entry queries from
//! recovery and replication paths stay cheap.
//!
//! # Design
//!
//! - N-way sharded hashmap, each shard behind its own `RwLock`, so
//!   concurrent puts and gets from many threads never contend on a single
//!   global lock
//! - Power-of-2 shard count enables fast modulo via bitwise AND
//! - The per-ledger maximum tracker updates through a compare-and-retry
//!   loop that only replaces the tracked value when the incoming entry id
//!   is at least the current one, so out-of-order completions cannot
//!   regress it

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use dashmap::DashMap;
use parking_lot::RwLock;

use super::entry::{EntryKey, EntryLocation};

/// Shard count for the entry index. Power of 2 for fast modulo.
pub const INDEX_SHARD_COUNT: usize = 64;

/// Single index shard.
#[derive(Default)]
struct IndexShard {
    map: RwLock<HashMap<EntryKey, EntryLocation>>,
}

/// Concurrent mapping from entry key to byte-range location, plus a
/// per-ledger maximum-entry-id tracker.
///
/// There is no per-key removal; entries leave the index only through
/// [`EntryIndex::clear`].
pub struct EntryIndex {
    shards: Box<[IndexShard; INDEX_SHARD_COUNT]>,
    /// ledger id -> greatest entry id successfully inserted since last clear
    last_entry: DashMap<i64, AtomicI64>,
}

impl Default for EntryIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl EntryIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        let shards: Vec<IndexShard> = (0..INDEX_SHARD_COUNT).map(|_| IndexShard::default()).collect();
        let shards: Box<[IndexShard; INDEX_SHARD_COUNT]> =
            shards.into_boxed_slice().try_into().ok().unwrap();
        Self {
            shards,
            last_entry: DashMap::new(),
        }
    }

    #[inline]
    fn shard(&self, key: &EntryKey) -> &IndexShard {
        &self.shards[key.shard_index(INDEX_SHARD_COUNT)]
    }

    /// Unconditional upsert; last write for a given key wins.
    ///
    /// Returns the previous location if the key was already present.
    pub fn put(&self, key: EntryKey, location: EntryLocation) -> Option<EntryLocation> {
        let mut guard = self.shard(&key).map.write();
        guard.insert(key, location)
    }

    /// Look up the location recorded for `key`.
    pub fn get(&self, key: &EntryKey) -> Option<EntryLocation> {
        let guard = self.shard(key).map.read();
        guard.get(key).copied()
    }

    /// Check if a key is present.
    pub fn contains_key(&self, key: &EntryKey) -> bool {
        let guard = self.shard(key).map.read();
        guard.contains_key(key)
    }

    /// Record `entry_id` as seen for `ledger_id`.
    ///
    /// The tracked maximum is only replaced when `entry_id` is greater than
    /// or equal to it (`fetch_max` compare-and-retry), so concurrent
    /// out-of-order completions never move it backwards.
    pub fn track_last(&self, ledger_id: i64, entry_id: i64) {
        let slot = self
            .last_entry
            .entry(ledger_id)
            .or_insert_with(|| AtomicI64::new(entry_id));
        slot.fetch_max(entry_id, Ordering::AcqRel);
    }

    /// Greatest entry id inserted for `ledger_id`, or `None` if the ledger
    /// has no entries.
    pub fn last_entry_id(&self, ledger_id: i64) -> Option<i64> {
        self.last_entry
            .get(&ledger_id)
            .map(|slot| slot.load(Ordering::Acquire))
    }

    /// Snapshot every `(key, location)` pair, sorted by ledger id and then
    /// entry id. Feeds the flush path's ordered traversal.
    pub fn sorted_snapshot(&self) -> Vec<(EntryKey, EntryLocation)> {
        let mut pairs: Vec<(EntryKey, EntryLocation)> = self
            .shards
            .iter()
            .flat_map(|shard| {
                let guard = shard.map.read();
                guard.iter().map(|(k, v)| (*k, *v)).collect::<Vec<_>>()
            })
            .collect();
        pairs.sort_unstable_by_key(|(key, _)| *key);
        pairs
    }

    /// Remove every entry and forget every tracked maximum.
    pub fn clear(&self) {
        for shard in self.shards.iter() {
            shard.map.write().clear();
        }
        self.last_entry.clear();
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(segment: u32, offset: u32, len: u32) -> EntryLocation {
        EntryLocation {
            segment,
            offset,
            len,
        }
    }

    #[test]
    fn test_put_get() {
        let index = EntryIndex::new();
        let key = EntryKey::new(1, 5);

        assert!(index.put(key, loc(0, 0, 64)).is_none());
        assert_eq!(index.get(&key), Some(loc(0, 0, 64)));
        assert_eq!(index.get(&EntryKey::new(1, 6)), None);
    }

    #[test]
    fn test_upsert_last_write_wins() {
        let index = EntryIndex::new();
        let key = EntryKey::new(0, 1);

        index.put(key, loc(0, 0, 13));
        let old = index.put(key, loc(0, 64, 1024));

        assert_eq!(old, Some(loc(0, 0, 13)));
        assert_eq!(index.get(&key), Some(loc(0, 64, 1024)));
    }

    #[test]
    fn test_tracker_monotonic() {
        let index = EntryIndex::new();

        index.track_last(7, 5);
        index.track_last(7, 10);
        assert_eq!(index.last_entry_id(7), Some(10));

        // Out-of-order completion must not regress the tracker
        index.track_last(7, 3);
        assert_eq!(index.last_entry_id(7), Some(10));
    }

    #[test]
    fn test_tracker_negative_entry_ids() {
        let index = EntryIndex::new();

        index.track_last(0, i64::MIN);
        assert_eq!(index.last_entry_id(0), Some(i64::MIN));

        index.track_last(0, -1);
        assert_eq!(index.last_entry_id(0), Some(-1));
    }

    #[test]
    fn test_tracker_unknown_ledger() {
        let index = EntryIndex::new();
        assert_eq!(index.last_entry_id(42), None);
    }

    #[test]
    fn test_sorted_snapshot_groups_by_ledger() {
        let index = EntryIndex::new();
        index.put(EntryKey::new(2, 1), loc(0, 0, 1));
        index.put(EntryKey::new(1, 9), loc(0, 1, 1));
        index.put(EntryKey::new(1, 2), loc(0, 2, 1));
        index.put(EntryKey::new(0, 5), loc(0, 3, 1));

        let keys: Vec<EntryKey> = index
            .sorted_snapshot()
            .into_iter()
            .map(|(k, _)| k)
            .collect();

        assert_eq!(
            keys,
            vec![
                EntryKey::new(0, 5),
                EntryKey::new(1, 2),
                EntryKey::new(1, 9),
                EntryKey::new(2, 1),
            ]
        );
    }

    #[test]
    fn test_clear() {
        let index = EntryIndex::new();
        index.put(EntryKey::new(1, 1), loc(0, 0, 8));
        index.track_last(1, 1);

        index.clear();

        assert_eq!(index.get(&EntryKey::new(1, 1)), None);
        assert_eq!(index.last_entry_id(1), None);
        assert!(index.sorted_snapshot().is_empty());
    }

    #[test]
    fn test_concurrent_put_get() {
        use std::sync::Arc;
        use std::thread;

        let index = Arc::new(EntryIndex::new());

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let index = Arc::clone(&index);
                thread::spawn(move || {
                    for i in 0..1000 {
                        let key = EntryKey::new(t, i);
                        index.put(key, loc(0, i as u32, 8));
                        index.track_last(t, i);
                        assert!(index.contains_key(&key));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(index.sorted_snapshot().len(), 8000);
        for ledger in 0..8 {
            assert_eq!(index.last_entry_id(ledger), Some(999));
        }
    }
}
