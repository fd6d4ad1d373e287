//! Large allocations tracked outside the segment chain
//!
//! Records are kept newest-first in iteration order: the record pushed last is
//! the head of the list. A record whose block has been released stays in the
//! list as a free slot that a later large allocation may take over.

use std::alloc::{Layout, alloc, dealloc};
use std::ptr::NonNull;

use crate::error::{RegionError, RegionResult};

/// Heap block owned by the pool until released
pub(crate) struct LargeBlock {
    ptr: NonNull<u8>,
    layout: Layout,
}

impl LargeBlock {
    /// Obtains a block straight from the system allocator
    pub(crate) fn allocate(layout: Layout) -> RegionResult<Self> {
        debug_assert!(layout.size() > 0);

        // SAFETY: layout has non-zero size (callers never route empty requests here)
        let ptr = unsafe { alloc(layout) };
        let ptr = NonNull::new(ptr)
            .ok_or_else(|| RegionError::allocation_failed_with_layout(layout))?;

        Ok(Self { ptr, layout })
    }

    #[inline]
    pub(crate) fn as_ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    #[inline]
    pub(crate) fn size(&self) -> usize {
        self.layout.size()
    }
}

impl Drop for LargeBlock {
    fn drop(&mut self) {
        // SAFETY: ptr came from alloc() with this exact layout and is freed once.
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

/// Slot in the large-allocation list; `None` marks a reusable slot
struct LargeRecord {
    block: Option<LargeBlock>,
}

/// List of large-allocation records
#[derive(Default)]
pub(crate) struct LargeList {
    records: Vec<LargeRecord>,
}

impl LargeList {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Records visited from the head (newest) to the tail
    fn iter_from_head(&self) -> impl Iterator<Item = (usize, &LargeRecord)> {
        self.records.iter().enumerate().rev()
    }

    /// Places `block` into a free slot among the first `scan_limit` records
    ///
    /// Gives the block back when no free slot was found within the limit.
    pub(crate) fn try_reuse(
        &mut self,
        block: LargeBlock,
        scan_limit: usize,
    ) -> Result<(), LargeBlock> {
        let slot = self
            .iter_from_head()
            .take(scan_limit)
            .find(|(_, record)| record.block.is_none())
            .map(|(index, _)| index);

        match slot {
            Some(index) => {
                self.records[index].block = Some(block);
                Ok(())
            }
            None => Err(block),
        }
    }

    /// Pushes a new record at the head of the list
    pub(crate) fn push(&mut self, block: LargeBlock) {
        self.records.push(LargeRecord { block: Some(block) });
    }

    /// Frees the block starting at `ptr`; `false` when no live record matches
    pub(crate) fn release(&mut self, ptr: NonNull<u8>) -> bool {
        let found = self
            .records
            .iter_mut()
            .rev()
            .find(|record| record.block.as_ref().is_some_and(|b| b.as_ptr() == ptr));

        match found {
            Some(record) => {
                record.block = None;
                true
            }
            None => false,
        }
    }

    /// Whether `ptr` is the start of a live large block
    pub(crate) fn contains(&self, ptr: NonNull<u8>) -> bool {
        self.records
            .iter()
            .any(|record| record.block.as_ref().is_some_and(|b| b.as_ptr() == ptr))
    }

    /// Frees every live block and discards all records, returning the number freed
    pub(crate) fn clear(&mut self) -> usize {
        let live = self.live();
        self.records.clear();
        live
    }

    /// Number of records, free slots included
    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    /// Number of records holding a live block
    pub(crate) fn live(&self) -> usize {
        self.records.iter().filter(|r| r.block.is_some()).count()
    }

    /// Total bytes held by live blocks
    pub(crate) fn live_bytes(&self) -> usize {
        self.records
            .iter()
            .filter_map(|r| r.block.as_ref())
            .map(LargeBlock::size)
            .sum()
    }
}
