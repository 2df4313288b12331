//! Segmented Write-Back Cache
//!
//! Stages recently written log entries, keyed by `(ledger_id, entry_id)`,
//! until the flush path drains them to durable storage.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Write Cache Facade                       │
//! │         validation · byte budget · counters · lifecycle       │
//! ├──────────────────────────────┬───────────────────────────────┤
//! │       Entry Index            │       Segment Allocator        │
//! │  ┌────────────────────────┐  │  ┌─────────────────────────┐  │
//! │  │ 64-way sharded hashmap │  │  │ growable segment list   │  │
//! │  │ (ledger, entry) → loc  │  │  │ + append cursor         │  │
//! │  │ per-ledger max tracker │  │  │ zero-init regions from  │  │
//! │  └────────────────────────┘  │  │ the memory capability   │  │
//! │                              │  └─────────────────────────┘  │
//! └──────────────────────────────┴───────────────────────────────┘
//! ```
//!
//! # Design Principles
//!
//! - Hard capacity rejection only: no eviction policy, no backpressure,
//!   no queuing. A put that does not fit returns `Ok(false)` immediately.
//! - No entry ever straddles a segment boundary.
//! - Reads return owned copies, safe beyond any later `clear`/`close`.
//! - Lock-free reads of the counters; sharded locking on the index; one
//!   short critical section around the segment cursor.

mod entry;
mod index;
mod segment;
mod write_cache;

pub use entry::{EntryKey, EntryLocation};
pub use index::{EntryIndex, INDEX_SHARD_COUNT};
pub use segment::{Segment, SegmentList};
pub use write_cache::{WriteCache, WriteCacheConfig, WriteCacheStats};

/// Default aggregate byte budget (64MB)
pub const DEFAULT_CACHE_CAPACITY: u64 = 64 * 1024 * 1024;

/// Hard ceiling on a single segment's capacity (1GB).
///
/// Keeps every in-segment offset and entry length comfortably within `u32`
/// range; a configured segment size above the ceiling is clamped at
/// construction, and the effective value is reported by
/// [`WriteCache::stats`].
pub const MAX_SEGMENT_CAPACITY: u64 = 1024 * 1024 * 1024;

// =============================================================================
// Tests
// =============================================================================
