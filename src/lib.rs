//! WriteStage - Bounded Segmented Write-Back Cache
//!
//! A write-back cache for distributed log-storage nodes ("bookies"). Recently
//! written log entries are staged in memory, keyed by a ledger id and a
//! monotonically assigned entry id, until a flush path drains them to durable
//! storage.
//!
//! The cache rejects writes once a hard byte budget is exhausted, never lets
//! an entry straddle an internal segment boundary, and answers "most recent
//! entry for this ledger" queries cheaply for recovery and replication paths.
//!
//! ```
//! use std::sync::Arc;
//! use writestage::{HeapAllocator, WriteCache};
//!
//! let cache = WriteCache::new(Arc::new(HeapAllocator), 4096);
//!
//! assert!(cache.put(0, 1, b"initial-entry").unwrap());
//! let entry = cache.get(0, 1).unwrap().unwrap();
//! assert_eq!(&entry[..], b"initial-entry");
//!
//! cache.clear();
//! cache.close();
//! ```
//!
//! # Modules
//!
//! - [`cache`] - Segment allocator, entry index, and the write cache facade
//! - [`error`] - Error types
//! - [`memory`] - Memory allocation capability backing the segments

pub mod cache;
pub mod error;
pub mod memory;

// Re-export commonly used types
pub use cache::{WriteCache, WriteCacheConfig, WriteCacheStats};
pub use error::{CacheError, Result};
pub use memory::{HeapAllocator, MemoryAllocator, Region};
