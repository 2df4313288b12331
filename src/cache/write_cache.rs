//! Write cache facade
//!
//! Validates inputs, enforces the aggregate byte budget, and orchestrates
//! the segment allocator and the entry index. This is the surface the
//! ingest path writes through and the flush path drains.
//!
//! # Capacity semantics
//!
//! Capacity exhaustion is a routine outcome, not an error: `put` returns
//! `Ok(false)` and mutates nothing. The aggregate byte counter never
//! observably exceeds the configured maximum, even under concurrent puts;
//! the budget is reserved with an atomic reserve-or-fail step whose
//! reservation is rolled back whenever the allocator rejects the entry.
//!
//! # Read semantics
//!
//! `get`/`get_last_entry` return owned copies ([`Bytes`]), valid beyond any
//! later `clear`/`close`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use tracing::debug;

use super::entry::EntryKey;
use super::index::EntryIndex;
use super::segment::SegmentList;
use super::{DEFAULT_CACHE_CAPACITY, MAX_SEGMENT_CAPACITY};
use crate::error::{CacheError, Result};
use crate::memory::MemoryAllocator;

/// Write cache configuration
#[derive(Debug, Clone)]
pub struct WriteCacheConfig {
    /// Maximum total bytes the cache may hold across all segments
    pub max_cache_size: u64,
    /// Maximum capacity of a single segment; defaults to `max_cache_size`
    /// (effectively one segment)
    pub max_segment_size: Option<u64>,
}

impl Default for WriteCacheConfig {
    fn default() -> Self {
        Self {
            max_cache_size: DEFAULT_CACHE_CAPACITY,
            max_segment_size: None,
        }
    }
}

/// Bounded, segmented write-back cache staging recently written log entries
/// before a flush path durably persists them.
///
/// Thread-safe: many ingest threads may `put` while replication and
/// recovery threads read. `clear`/`close` are mutually exclusive with every
/// in-flight operation, so a reset never exposes a partially released
/// segment.
pub struct WriteCache {
    config: WriteCacheConfig,
    segments: SegmentList,
    index: EntryIndex,
    /// Guards clear/close (write side) against in-flight puts/gets (read side)
    lifecycle: RwLock<()>,
    closed: AtomicBool,
    /// Bytes written since the last clear
    cache_size: AtomicU64,
    /// Entries currently stored
    cache_count: AtomicU64,
    /// Accepted puts
    puts: AtomicU64,
    /// Capacity rejections (budget or segment size)
    rejections: AtomicU64,
}

impl WriteCache {
    /// Create a cache with the given aggregate byte budget and no segment
    /// limit (a single segment spanning the whole budget).
    pub fn new(allocator: Arc<dyn MemoryAllocator>, max_cache_size: u64) -> Self {
        Self::with_config(
            allocator,
            WriteCacheConfig {
                max_cache_size,
                max_segment_size: None,
            },
        )
    }

    /// Create a cache with an explicit per-segment capacity.
    pub fn with_segment_size(
        allocator: Arc<dyn MemoryAllocator>,
        max_cache_size: u64,
        max_segment_size: u64,
    ) -> Self {
        Self::with_config(
            allocator,
            WriteCacheConfig {
                max_cache_size,
                max_segment_size: Some(max_segment_size),
            },
        )
    }

    /// Create a cache from a full configuration.
    ///
    /// The effective segment size is clamped to the aggregate budget and to
    /// [`MAX_SEGMENT_CAPACITY`](super::MAX_SEGMENT_CAPACITY), keeping every
    /// in-segment offset within `u32` range. Segment growth is capped so the
    /// resident segment memory never exceeds the budget.
    pub fn with_config(allocator: Arc<dyn MemoryAllocator>, config: WriteCacheConfig) -> Self {
        let segment_size = config
            .max_segment_size
            .unwrap_or(config.max_cache_size)
            .min(config.max_cache_size)
            .min(MAX_SEGMENT_CAPACITY);
        let max_segments = if segment_size == 0 {
            0
        } else {
            (config.max_cache_size / segment_size) as usize
        };
        debug!(
            max_cache_size = config.max_cache_size,
            max_segment_size = segment_size,
            max_segments,
            "creating write cache"
        );
        Self {
            segments: SegmentList::new(allocator, segment_size as usize, max_segments),
            index: EntryIndex::new(),
            lifecycle: RwLock::new(()),
            closed: AtomicBool::new(false),
            cache_size: AtomicU64::new(0),
            cache_count: AtomicU64::new(0),
            puts: AtomicU64::new(0),
            rejections: AtomicU64::new(0),
            config,
        }
    }

    #[inline]
    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CacheError::Closed);
        }
        Ok(())
    }

    #[inline]
    fn check_ledger(ledger_id: i64) -> Result<()> {
        if ledger_id < 0 {
            return Err(CacheError::NegativeLedgerId { ledger_id });
        }
        Ok(())
    }

    /// Stage an entry.
    ///
    /// Returns `Ok(true)` if stored, `Ok(false)` if the entry was
    /// capacity-rejected (larger than the remaining budget or than a
    /// segment). A rejected put mutates nothing.
    ///
    /// A put with a key that is already present overwrites the logical
    /// value; the old bytes become unreachable until the next `clear` and
    /// keep their share of the budget. The entry id's sign is never
    /// validated.
    ///
    /// # Errors
    ///
    /// - `NegativeLedgerId` if `ledger_id < 0`
    /// - `Closed` after `close()`
    /// - `AllocationFailed` if the memory capability fails
    pub fn put(&self, ledger_id: i64, entry_id: i64, entry: &[u8]) -> Result<bool> {
        self.put_opt(ledger_id, entry_id, Some(entry))
    }

    /// [`put`](Self::put) over an optional payload.
    ///
    /// An absent payload fails with `AbsentEntry` for any ledger/entry id.
    pub fn put_opt(&self, ledger_id: i64, entry_id: i64, entry: Option<&[u8]>) -> Result<bool> {
        let _guard = self.lifecycle.read();
        self.check_open()?;
        // An absent payload fails first, for any ledger or entry id
        let entry = entry.ok_or(CacheError::AbsentEntry)?;
        Self::check_ledger(ledger_id)?;

        let len = entry.len() as u64;
        if len > self.config.max_cache_size {
            self.rejections.fetch_add(1, Ordering::Relaxed);
            debug!(ledger_id, entry_id, len, "entry exceeds cache capacity");
            return Ok(false);
        }

        // Budget reservation through a compare-and-retry loop, so the
        // counter never observably exceeds the maximum. The reservation is
        // rolled back if the allocator rejects the entry below.
        if !self.try_reserve_budget(len) {
            self.rejections.fetch_add(1, Ordering::Relaxed);
            debug!(ledger_id, entry_id, len, "cache budget exhausted");
            return Ok(false);
        }

        let (segment, location) = match self.segments.reserve(entry.len()) {
            Ok(Some(reserved)) => reserved,
            Ok(None) => {
                self.cache_size.fetch_sub(len, Ordering::AcqRel);
                self.rejections.fetch_add(1, Ordering::Relaxed);
                debug!(ledger_id, entry_id, len, "segment reservation rejected");
                return Ok(false);
            }
            Err(e) => {
                self.cache_size.fetch_sub(len, Ordering::AcqRel);
                return Err(e);
            }
        };

        segment.write(location.offset as usize, entry);

        let previous = self.index.put(EntryKey::new(ledger_id, entry_id), location);
        if previous.is_none() {
            self.cache_count.fetch_add(1, Ordering::AcqRel);
        }
        self.index.track_last(ledger_id, entry_id);
        self.puts.fetch_add(1, Ordering::Relaxed);

        Ok(true)
    }

    /// Atomically reserve `len` bytes of the aggregate budget.
    fn try_reserve_budget(&self, len: u64) -> bool {
        let mut current = self.cache_size.load(Ordering::Acquire);
        loop {
            // checked_add keeps the comparison meaningful even with a budget
            // near u64::MAX
            let Some(new_size) = current.checked_add(len) else {
                return false;
            };
            if new_size > self.config.max_cache_size {
                return false;
            }
            match self.cache_size.compare_exchange_weak(
                current,
                new_size,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    /// Fetch the bytes stored for `(ledger_id, entry_id)`.
    ///
    /// # Errors
    ///
    /// `NegativeLedgerId` if `ledger_id < 0`; `Closed` after `close()`.
    pub fn get(&self, ledger_id: i64, entry_id: i64) -> Result<Option<Bytes>> {
        let _guard = self.lifecycle.read();
        self.check_open()?;
        Self::check_ledger(ledger_id)?;
        Ok(self.read_entry(EntryKey::new(ledger_id, entry_id)))
    }

    /// Check whether `(ledger_id, entry_id)` is present.
    ///
    /// # Errors
    ///
    /// `NegativeLedgerId` if `ledger_id < 0`; `Closed` after `close()`.
    pub fn has_entry(&self, ledger_id: i64, entry_id: i64) -> Result<bool> {
        let _guard = self.lifecycle.read();
        self.check_open()?;
        Self::check_ledger(ledger_id)?;
        Ok(self.index.contains_key(&EntryKey::new(ledger_id, entry_id)))
    }

    /// Fetch the entry with the greatest entry id recorded for `ledger_id`,
    /// or `None` if the ledger has no entries.
    ///
    /// # Errors
    ///
    /// `NegativeLedgerId` if `ledger_id < 0`; `Closed` after `close()`.
    pub fn get_last_entry(&self, ledger_id: i64) -> Result<Option<Bytes>> {
        let _guard = self.lifecycle.read();
        self.check_open()?;
        Self::check_ledger(ledger_id)?;

        let Some(last_id) = self.index.last_entry_id(ledger_id) else {
            return Ok(None);
        };
        Ok(self.read_entry(EntryKey::new(ledger_id, last_id)))
    }

    fn read_entry(&self, key: EntryKey) -> Option<Bytes> {
        let location = self.index.get(&key)?;
        // Index locations always point into live segments while the
        // lifecycle read guard is held.
        let segment = self.segments.segment(location.segment)?;
        Some(segment.read(location.offset as usize, location.len as usize))
    }

    /// Traverse every cached entry, grouped by ledger and ordered by entry
    /// id within a ledger. This is the surface the flush path drains before
    /// calling [`clear`](Self::clear).
    ///
    /// # Errors
    ///
    /// `Closed` after `close()`.
    pub fn for_each<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(i64, i64, Bytes),
    {
        let _guard = self.lifecycle.read();
        self.check_open()?;

        for (key, location) in self.index.sorted_snapshot() {
            let Some(segment) = self.segments.segment(location.segment) else {
                continue;
            };
            f(
                key.ledger_id,
                key.entry_id,
                segment.read(location.offset as usize, location.len as usize),
            );
        }
        Ok(())
    }

    /// Number of currently stored entries.
    pub fn count(&self) -> u64 {
        self.cache_count.load(Ordering::Acquire)
    }

    /// Bytes written since the last clear.
    pub fn size(&self) -> u64 {
        self.cache_size.load(Ordering::Acquire)
    }

    /// True when no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Configured aggregate byte budget.
    pub fn capacity(&self) -> u64 {
        self.config.max_cache_size
    }

    /// Remove every entry, release every segment, and reset the counters.
    /// Configuration is preserved and the cache stays usable.
    pub fn clear(&self) {
        let _guard = self.lifecycle.write();
        self.reset_locked();
        debug!("write cache cleared");
    }

    /// `clear()` plus release of the backing memory; idempotent. After
    /// close every accessor fails fast with [`CacheError::Closed`].
    pub fn close(&self) {
        let _guard = self.lifecycle.write();
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.reset_locked();
        debug!("write cache closed");
    }

    /// Must hold the lifecycle write lock.
    fn reset_locked(&self) {
        self.index.clear();
        self.segments.release_all();
        self.cache_size.store(0, Ordering::Release);
        self.cache_count.store(0, Ordering::Release);
    }

    /// Snapshot of cache statistics.
    pub fn stats(&self) -> WriteCacheStats {
        WriteCacheStats {
            entries: self.count(),
            size_bytes: self.size(),
            capacity: self.capacity(),
            max_segment_size: self.segments.max_segment_size() as u64,
            segments: self.segments.segment_count(),
            puts: self.puts.load(Ordering::Relaxed),
            capacity_rejections: self.rejections.load(Ordering::Relaxed),
        }
    }
}

/// Write cache statistics
#[derive(Debug, Clone)]
pub struct WriteCacheStats {
    /// Entries currently stored
    pub entries: u64,
    /// Bytes written since the last clear
    pub size_bytes: u64,
    /// Configured aggregate byte budget
    pub capacity: u64,
    /// Configured per-segment capacity
    pub max_segment_size: u64,
    /// Live segments
    pub segments: usize,
    /// Accepted puts
    pub puts: u64,
    /// Capacity rejections
    pub capacity_rejections: u64,
}

// =============================================================================
// Tests
// =============================================================================
