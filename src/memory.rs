//! Memory allocation capability for cache segments
//!
//! The write cache does not allocate its backing memory directly. It is
//! constructed with a [`MemoryAllocator`], a capability that hands out
//! zero-initialized, contiguous, explicitly-releasable byte regions. The
//! cache exclusively owns every region it obtains and releases them all on
//! `clear`/`close`.
//!
//! [`HeapAllocator`] is the default implementation, backed by the global
//! allocator. Deployments with pinned or hugepage memory plug in their own
//! implementation.

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ptr::NonNull;
use std::slice;

use crate::error::{CacheError, Result};

/// A contiguous, zero-initialized byte region owned by the cache.
///
/// The region is released back to its allocator when dropped. The pointer is
/// non-null and the size is fixed at allocation time.
///
/// # Memory Safety
///
/// - The region is automatically freed when dropped
/// - Raw-pointer reads and writes are only performed by [`Segment`], which
///   guarantees that concurrently accessed byte ranges are disjoint
///
/// [`Segment`]: crate::cache::Segment
#[derive(Debug)]
pub struct Region {
    /// Non-null pointer to the region
    ptr: NonNull<u8>,
    /// Size of the region in bytes
    size: usize,
    /// Allocation layout, kept for deallocation
    layout: Layout,
}

// SAFETY: Region owns its memory exclusively. Concurrent access goes through
// Segment, which only touches disjoint byte ranges from different threads.
unsafe impl Send for Region {}
unsafe impl Sync for Region {}

impl Region {
    /// Allocate a new zero-initialized region of `size` bytes.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::AllocationFailed` if `size` is 0 or the global
    /// allocator is out of memory.
    pub fn new_zeroed(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(CacheError::AllocationFailed {
                size,
                reason: "size must be greater than 0".into(),
            });
        }

        let layout = Layout::array::<u8>(size).map_err(|e| CacheError::AllocationFailed {
            size,
            reason: e.to_string(),
        })?;

        // SAFETY: layout has non-zero size, checked above.
        let ptr = unsafe { alloc_zeroed(layout) };

        NonNull::new(ptr).map_or_else(
            || {
                Err(CacheError::AllocationFailed {
                    size,
                    reason: "global allocator returned null".into(),
                })
            },
            |ptr| Ok(Self { ptr, size, layout }),
        )
    }

    /// Returns the size of the region in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.size
    }

    /// Returns true if the region has zero length.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Raw pointer to the start of the region.
    ///
    /// Callers must keep concurrently accessed ranges disjoint; the region
    /// itself performs no synchronization.
    #[inline]
    pub(crate) fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// View a sub-range of the region as a slice.
    ///
    /// Caller must guarantee no concurrent writer touches `offset..offset+len`.
    #[inline]
    pub(crate) unsafe fn slice(&self, offset: usize, len: usize) -> &[u8] {
        debug_assert!(offset + len <= self.size);
        slice::from_raw_parts(self.ptr.as_ptr().add(offset), len)
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        // SAFETY: ptr was produced by alloc_zeroed with this exact layout.
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

/// Capability to obtain zero-initialized, explicitly-releasable byte regions.
///
/// The write cache is constructed with one of these and routes every segment
/// allocation through it. Release happens by dropping the returned [`Region`].
pub trait MemoryAllocator: Send + Sync + 'static {
    /// Allocate a zero-initialized region of `size` bytes.
    fn allocate(&self, size: usize) -> Result<Region>;
}

/// Default allocator backed by the global heap.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapAllocator;

impl MemoryAllocator for HeapAllocator {
    fn allocate(&self, size: usize) -> Result<Region> {
        Region::new_zeroed(size)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_region_zeroed() {
        let region = Region::new_zeroed(4096).unwrap();
        assert_eq!(region.len(), 4096);
        assert!(!region.is_empty());

        // Every byte starts at zero
        let bytes = unsafe { region.slice(0, 4096) };
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_region_zero_size_rejected() {
        assert_matches!(
            Region::new_zeroed(0),
            Err(CacheError::AllocationFailed { size: 0, .. })
        );
    }

    #[test]
    fn test_heap_allocator() {
        let allocator = HeapAllocator;
        let region = allocator.allocate(1024).unwrap();
        assert_eq!(region.len(), 1024);
    }

    #[test]
    fn test_region_subrange() {
        let region = Region::new_zeroed(64).unwrap();
        let tail = unsafe { region.slice(32, 32) };
        assert_eq!(tail.len(), 32);
    }
}
