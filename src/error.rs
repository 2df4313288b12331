//! Error types for the write-stage cache

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors surfaced by the write cache.
///
/// Capacity rejection is deliberately *not* represented here: an entry that
/// does not fit the aggregate budget or the segment size is a routine outcome
/// and is reported as `Ok(false)` from [`WriteCache::put`].
///
/// [`WriteCache::put`]: crate::cache::WriteCache::put
#[derive(Error, Debug)]
pub enum CacheError {
    /// Negative ledger id passed to any accessor
    #[error("invalid ledger id: {ledger_id} (must be non-negative)")]
    NegativeLedgerId { ledger_id: i64 },

    /// Absent entry payload passed to a put
    #[error("entry payload is absent")]
    AbsentEntry,

    /// Operation attempted after `close()`
    #[error("write cache is closed")]
    Closed,

    /// Backing memory allocation failed
    #[error("segment allocation failed for size {size}: {reason}")]
    AllocationFailed { size: usize, reason: String },
}
