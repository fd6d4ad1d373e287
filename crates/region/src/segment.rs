//! Fixed-capacity segment serving bump allocations
//!
//! # Safety
//!
//! - Buffers are allocated via `std::alloc::alloc` with a [`POOL_ALIGNMENT`] layout
//! - `cursor` is an offset from the buffer start and never exceeds `limit`
//! - Carving only moves `cursor` forward; only [`Segment::rewind`] moves it back
//! - Buffers are deallocated exactly once, in `Drop`
//!
//! Segments are held in chain order by the pool; the successor of a segment is
//! the next entry of that vector.

use std::alloc::{Layout, alloc, alloc_zeroed, dealloc};
use std::ptr::NonNull;

use crate::config::POOL_ALIGNMENT;
use crate::error::{RegionError, RegionResult};
use crate::utils::checked_align_up;

/// Read-only view of a segment's bump state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentUsage {
    /// Offset of the next free byte
    pub cursor: usize,
    /// End-of-buffer offset
    pub limit: usize,
    /// Consecutive growth passes this segment failed to serve
    pub fail_count: u32,
}

impl SegmentUsage {
    /// Bytes still available past the cursor
    pub fn remaining(&self) -> usize {
        self.limit - self.cursor
    }
}

/// Memory segment managed by the pool
pub(crate) struct Segment {
    ptr: NonNull<u8>,
    cursor: usize,
    limit: usize,
    fail_count: u32,
}

impl Segment {
    /// Allocates a segment of `capacity` bytes whose first `header` bytes are reserved
    pub(crate) fn new(capacity: usize, header: usize, zeroed: bool) -> RegionResult<Self> {
        debug_assert!(header <= capacity);

        let layout = Layout::from_size_align(capacity, POOL_ALIGNMENT)
            .map_err(|_| RegionError::size_overflow("segment layout"))?;

        // SAFETY: layout has non-zero size (capacity >= MIN_POOL_SIZE, checked
        // by PoolConfig::validate) and a power-of-two alignment.
        let ptr = unsafe {
            if zeroed {
                alloc_zeroed(layout)
            } else {
                alloc(layout)
            }
        };
        let ptr = NonNull::new(ptr)
            .ok_or_else(|| RegionError::allocation_failed_with_layout(layout))?;

        Ok(Self {
            ptr,
            cursor: header,
            limit: capacity,
            fail_count: 0,
        })
    }

    /// Carves `size` bytes aligned to `align`, or returns `None` when they do not fit
    ///
    /// `align` must be a power of two no larger than [`POOL_ALIGNMENT`]; the
    /// buffer start satisfies that alignment, so aligning the offset aligns the address.
    pub(crate) fn try_carve(&mut self, size: usize, align: usize) -> Option<NonNull<u8>> {
        debug_assert!(align <= POOL_ALIGNMENT);

        let start = checked_align_up(self.cursor, align)?;
        if start > self.limit || self.limit - start < size {
            return None;
        }

        self.cursor = start + size;

        // SAFETY: start <= limit == capacity, so the offset stays within the
        // allocation (or one past its end for a zero-size carve at the limit).
        Some(unsafe { NonNull::new_unchecked(self.ptr.as_ptr().add(start)) })
    }

    /// Moves the cursor back to `header` and clears the failure counter
    pub(crate) fn rewind(&mut self, header: usize, zero: bool) {
        if zero {
            // SAFETY: [header, cursor) lies inside the buffer, and the caller
            // holds the pool mutably so nothing borrows that range.
            unsafe {
                std::ptr::write_bytes(self.ptr.as_ptr().add(header), 0, self.cursor - header);
            }
        }
        self.cursor = header;
        self.fail_count = 0;
    }

    /// Records one failed growth pass, returning the count before the increment
    pub(crate) fn record_failure(&mut self) -> u32 {
        let previous = self.fail_count;
        self.fail_count = self.fail_count.saturating_add(1);
        previous
    }

    /// Whether `ptr` lies inside this segment's buffer
    pub(crate) fn contains(&self, ptr: *const u8) -> bool {
        let start = self.ptr.as_ptr() as usize;
        let addr = ptr as usize;
        addr >= start && addr < start + self.limit
    }

    pub(crate) fn usage(&self) -> SegmentUsage {
        SegmentUsage {
            cursor: self.cursor,
            limit: self.limit,
            fail_count: self.fail_count,
        }
    }
}

impl Drop for Segment {
    fn drop(&mut self) {
        // SAFETY: ptr was allocated in new() with exactly this layout, which was
        // validated there; Drop runs once.
        unsafe {
            dealloc(
                self.ptr.as_ptr(),
                Layout::from_size_align_unchecked(self.limit, POOL_ALIGNMENT),
            );
        }
    }
}
