//! Entry key and location types

use std::hash::{Hash, Hasher};

/// Composite key identifying a cached entry: a ledger and a position in it.
///
/// Keys are not unique over the cache's lifetime: a later put with an
/// identical key overwrites the logical value, and the old bytes become
/// unreachable garbage until the cache is cleared.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryKey {
    /// Ledger (log) identifier; non-negative at the public API
    pub ledger_id: i64,
    /// Position within the ledger; sign unconstrained
    pub entry_id: i64,
}

impl EntryKey {
    /// Create a new entry key.
    #[inline]
    pub fn new(ledger_id: i64, entry_id: i64) -> Self {
        Self {
            ledger_id,
            entry_id,
        }
    }

    /// Get the shard index for this key (0..shard_count).
    ///
    /// `shard_count` must be a power of two so the modulo reduces to a
    /// bitwise AND.
    #[inline]
    pub fn shard_index(&self, shard_count: usize) -> usize {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.hash(&mut hasher);
        (hasher.finish() as usize) & (shard_count - 1)
    }
}

/// Location of an entry's bytes inside the segment list.
///
/// Points into a segment that has not yet been released; the index never
/// hands out a location past `clear`/`close`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntryLocation {
    /// Index of the segment holding the bytes
    pub segment: u32,
    /// Byte offset within that segment
    pub offset: u32,
    /// Entry length in bytes
    pub len: u32,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_equality() {
        assert_eq!(EntryKey::new(1, 2), EntryKey::new(1, 2));
        assert_ne!(EntryKey::new(1, 2), EntryKey::new(2, 1));
    }

    #[test]
    fn test_key_ordering_groups_by_ledger() {
        let mut keys = vec![
            EntryKey::new(2, 0),
            EntryKey::new(1, 10),
            EntryKey::new(1, -5),
            EntryKey::new(0, 3),
        ];
        keys.sort();

        assert_eq!(
            keys,
            vec![
                EntryKey::new(0, 3),
                EntryKey::new(1, -5),
                EntryKey::new(1, 10),
                EntryKey::new(2, 0),
            ]
        );
    }

    #[test]
    fn test_shard_index_in_range() {
        for i in 0..1000 {
            let key = EntryKey::new(i, i * 7);
            assert!(key.shard_index(64) < 64);
        }
    }
}
