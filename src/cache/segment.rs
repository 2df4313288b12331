//! Segment allocator - slab-style space reservation
//!
//! Entry bytes live in fixed-capacity, append-only memory segments. A
//! [`SegmentList`] owns a growable list of segments plus a cursor into the
//! current one and hands out contiguous byte ranges:
//!
//! ```text
//! segment 0 (full)      segment 1 (current)
//! +-----------------+   +-----------------+
//! | e1 | e2 | e3    |   | e4 | [unused]   |
//! +-----------------+   +--------^--------+
//!                                cursor
//! ```
//!
//! The allocator never enforces the aggregate cache budget; that spans all
//! segments and belongs to the facade. It only guarantees that no reserved
//! range straddles a segment boundary and that reserved ranges are disjoint.

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::debug;

use super::entry::EntryLocation;
use crate::error::Result;
use crate::memory::{MemoryAllocator, Region};

/// A fixed-capacity, append-only byte region.
///
/// Once allocated a segment is immutable except for writes into ranges the
/// owning [`SegmentList`] reserved; it is never compacted or shrunk, only
/// released wholesale when the list is cleared.
pub struct Segment {
    region: Region,
}

impl Segment {
    fn new(allocator: &dyn MemoryAllocator, capacity: usize) -> Result<Self> {
        let region = allocator.allocate(capacity)?;
        Ok(Self { region })
    }

    /// Segment capacity in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.region.len()
    }

    /// Copy `data` into the segment at `offset`.
    ///
    /// Only called for a freshly reserved range, which no other thread can
    /// read until the index publishes its location, so the raw-pointer copy
    /// cannot race with a reader of the same range.
    pub(crate) fn write(&self, offset: usize, data: &[u8]) {
        debug_assert!(offset + data.len() <= self.capacity());
        if data.is_empty() {
            return;
        }
        // SAFETY: the range fits the region and is exclusive to this writer
        // until published (reserved ranges are disjoint).
        unsafe {
            std::ptr::copy_nonoverlapping(
                data.as_ptr(),
                self.region.as_ptr().add(offset),
                data.len(),
            );
        }
    }

    /// Copy `len` bytes starting at `offset` out of the segment.
    ///
    /// Returns an owned copy, valid beyond any later clear or close.
    pub(crate) fn read(&self, offset: usize, len: usize) -> Bytes {
        debug_assert!(offset + len <= self.capacity());
        // SAFETY: published locations only cover fully written ranges, and a
        // written range is never mutated again before the segment is released.
        let slice = unsafe { self.region.slice(offset, len) };
        Bytes::copy_from_slice(slice)
    }
}

/// Cursor state guarded by the list's mutex.
struct SegmentCursor {
    segments: Vec<Arc<Segment>>,
    /// Index of the segment currently being filled
    current: usize,
    /// Next write position within the current segment
    offset: usize,
}

/// Growable list of segments with an append cursor.
///
/// Growth is capped at `max_segments`, so the total resident memory the
/// list holds never exceeds `max_segments * max_segment_size`.
pub struct SegmentList {
    allocator: Arc<dyn MemoryAllocator>,
    max_segment_size: usize,
    max_segments: usize,
    cursor: Mutex<SegmentCursor>,
}

impl SegmentList {
    /// Create an empty list. No segment is allocated until the first reserve,
    /// and at most `max_segments` segments are ever live at once.
    pub fn new(
        allocator: Arc<dyn MemoryAllocator>,
        max_segment_size: usize,
        max_segments: usize,
    ) -> Self {
        Self {
            allocator,
            max_segment_size,
            max_segments,
            cursor: Mutex::new(SegmentCursor {
                segments: Vec::new(),
                current: 0,
                offset: 0,
            }),
        }
    }

    /// Maximum capacity of a single segment.
    #[inline]
    pub fn max_segment_size(&self) -> usize {
        self.max_segment_size
    }

    /// Number of live segments.
    pub fn segment_count(&self) -> usize {
        self.cursor.lock().segments.len()
    }

    /// Reserve a contiguous `len`-byte range.
    ///
    /// Returns the segment holding the range together with its location, or
    /// `Ok(None)` if `len` exceeds the maximum segment size (no segment,
    /// current or future, could ever hold it) or the segment cap would be
    /// exceeded.
    ///
    /// If the current segment's remainder is insufficient but `len` fits a
    /// fresh segment and the cap allows one, a new segment is allocated and
    /// the cursor resets to 0.
    ///
    /// # Errors
    ///
    /// Propagates allocation failures from the memory capability.
    pub fn reserve(&self, len: usize) -> Result<Option<(Arc<Segment>, EntryLocation)>> {
        if len > self.max_segment_size {
            return Ok(None);
        }

        let mut cursor = self.cursor.lock();

        let needs_fresh_segment = cursor.segments.is_empty()
            || self.max_segment_size - cursor.offset < len;

        if needs_fresh_segment {
            // The cap keeps resident memory within the aggregate budget
            if cursor.segments.len() >= self.max_segments {
                debug!(
                    segments = cursor.segments.len(),
                    "segment cap reached, rejecting reservation"
                );
                return Ok(None);
            }
            let segment = Arc::new(Segment::new(&*self.allocator, self.max_segment_size)?);
            cursor.segments.push(segment);
            cursor.current = cursor.segments.len() - 1;
            cursor.offset = 0;
            debug!(
                segment = cursor.current,
                capacity = self.max_segment_size,
                "allocated cache segment"
            );
        }

        let location = EntryLocation {
            segment: cursor.current as u32,
            offset: cursor.offset as u32,
            len: len as u32,
        };
        cursor.offset += len;

        let segment = Arc::clone(&cursor.segments[cursor.current]);
        Ok(Some((segment, location)))
    }

    /// Look up a segment by index.
    pub fn segment(&self, index: u32) -> Option<Arc<Segment>> {
        self.cursor.lock().segments.get(index as usize).cloned()
    }

    /// Release every segment and reset the cursor.
    pub fn release_all(&self) {
        let mut cursor = self.cursor.lock();
        let released = cursor.segments.len();
        cursor.segments.clear();
        cursor.current = 0;
        cursor.offset = 0;
        if released > 0 {
            debug!(segments = released, "released cache segments");
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::HeapAllocator;

    fn list(max_segment_size: usize) -> SegmentList {
        SegmentList::new(Arc::new(HeapAllocator), max_segment_size, 64)
    }

    #[test]
    fn test_reserve_lazy_allocation() {
        let list = list(1024);
        assert_eq!(list.segment_count(), 0);

        let (_, loc) = list.reserve(100).unwrap().unwrap();
        assert_eq!(list.segment_count(), 1);
        assert_eq!(loc.segment, 0);
        assert_eq!(loc.offset, 0);
        assert_eq!(loc.len, 100);
    }

    #[test]
    fn test_reserve_advances_cursor() {
        let list = list(1024);

        let (_, first) = list.reserve(100).unwrap().unwrap();
        let (_, second) = list.reserve(200).unwrap().unwrap();

        assert_eq!(first.offset, 0);
        assert_eq!(second.offset, 100);
        assert_eq!(second.segment, 0);
        assert_eq!(list.segment_count(), 1);
    }

    #[test]
    fn test_reserve_oversized_rejected() {
        let list = list(1024);
        assert!(list.reserve(1025).unwrap().is_none());
        // Rejection allocates nothing
        assert_eq!(list.segment_count(), 0);
    }

    #[test]
    fn test_reserve_exact_segment_size() {
        let list = list(1024);
        let (_, loc) = list.reserve(1024).unwrap().unwrap();
        assert_eq!(loc.offset, 0);
        assert_eq!(loc.len, 1024);
    }

    #[test]
    fn test_rollover_to_fresh_segment() {
        let list = list(1024);

        list.reserve(1000).unwrap().unwrap();
        // 24 bytes left in segment 0; a 100-byte reserve rolls over
        let (_, loc) = list.reserve(100).unwrap().unwrap();

        assert_eq!(loc.segment, 1);
        assert_eq!(loc.offset, 0);
        assert_eq!(list.segment_count(), 2);
    }

    #[test]
    fn test_no_range_straddles_boundary() {
        let list = list(256);

        for _ in 0..100 {
            let (_, loc) = list.reserve(96).unwrap().unwrap();
            assert!(loc.offset as usize + loc.len as usize <= 256);
        }
    }

    #[test]
    fn test_write_then_read_roundtrip() {
        let list = list(1024);
        let (segment, loc) = list.reserve(13).unwrap().unwrap();

        segment.write(loc.offset as usize, b"initial-entry");
        let bytes = segment.read(loc.offset as usize, loc.len as usize);
        assert_eq!(&bytes[..], b"initial-entry");
    }

    #[test]
    fn test_release_all_resets_cursor() {
        let list = list(1024);
        list.reserve(1000).unwrap().unwrap();
        list.reserve(500).unwrap().unwrap();
        assert_eq!(list.segment_count(), 2);

        list.release_all();
        assert_eq!(list.segment_count(), 0);

        let (_, loc) = list.reserve(10).unwrap().unwrap();
        assert_eq!(loc.segment, 0);
        assert_eq!(loc.offset, 0);
    }

    #[test]
    fn test_segment_cap_rejects_growth() {
        let list = SegmentList::new(Arc::new(HeapAllocator), 1024, 2);

        list.reserve(1000).unwrap().unwrap();
        let (_, loc) = list.reserve(1000).unwrap().unwrap();
        assert_eq!(loc.segment, 1);
        assert_eq!(list.segment_count(), 2);

        // A third segment would exceed the cap
        assert!(list.reserve(1000).unwrap().is_none());
        assert_eq!(list.segment_count(), 2);

        // The current segment's remainder is still usable
        assert!(list.reserve(24).unwrap().is_some());

        // Releasing everything frees the cap again
        list.release_all();
        assert!(list.reserve(1000).unwrap().is_some());
    }

    #[test]
    fn test_zero_length_reserve() {
        let list = list(1024);
        let (_, loc) = list.reserve(0).unwrap().unwrap();
        assert_eq!(loc.len, 0);
    }
}
