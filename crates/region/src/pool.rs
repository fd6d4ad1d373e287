//! Region pool: segment chain, large allocations and cleanup chain under one root
//!
//! # Allocation routing
//!
//! - Requests up to [`Pool::small_threshold`] are bump-allocated from segments,
//!   starting the search at the current segment
//! - When no segment fits, a new segment of the first segment's capacity is
//!   appended; segments that keep failing are skipped by later searches
//! - Larger (or over-aligned) requests go straight to the system allocator and
//!   are tracked so they can be released early with [`Pool::release_large`]
//!
//! # Lifecycle
//!
//! `reset` frees large allocations and rewinds only the first segment; grown
//! segments keep their cursors. `destroy` (or dropping the pool) runs cleanup
//! handlers newest-first, then frees large allocations, then segments in
//! chain order.
//!
//! # Not Thread-Safe
//!
//! `Pool` is neither `Send` nor `Sync`. Use one pool per worker.

use std::alloc::Layout;
use std::cell::{RefCell, RefMut};
use std::fmt;
use std::ptr::{self, NonNull};

#[cfg(feature = "logging")]
use tracing::{debug, trace};

use crate::cleanup::{CleanupChain, CleanupSlot};
use crate::config::{
    CLEANUP_RECORD_SIZE, LARGE_RECORD_SIZE, POOL_ALIGNMENT, POOL_HEADER_SIZE, PoolConfig,
    SEGMENT_HEADER_SIZE,
};
use crate::error::{RegionError, RegionResult};
use crate::large::{LargeBlock, LargeList};
use crate::segment::{Segment, SegmentUsage};
use crate::stats::PoolStats;
use crate::utils::check_alignment;

struct PoolInner {
    /// Segments in chain order; index 0 is the root segment
    segments: Vec<Segment>,
    /// Segment where the small-allocation search starts
    current: usize,
    large: LargeList,
    cleanups: CleanupChain,
}

/// Region-based memory pool
///
/// Allocations borrow the pool, so [`reset`](Pool::reset) (which takes
/// `&mut self`) and [`destroy`](Pool::destroy) (which takes `self`) cannot run
/// while any of them is still in use.
///
/// # Examples
///
/// ```
/// use nebula_region::Pool;
///
/// let pool = Pool::new()?;
/// let header = pool.alloc([0u64; 4])?;
/// let name = pool.alloc_str("hello world")?;
/// header[0] = name.len() as u64;
/// assert_eq!(header[0], 11);
/// pool.destroy();
/// # Ok::<(), nebula_region::RegionError>(())
/// ```
pub struct Pool {
    inner: RefCell<PoolInner>,
    config: PoolConfig,
    small_threshold: usize,
    stats: PoolStats,
}

impl Pool {
    /// Creates a pool with the default 16 KiB segment capacity
    pub fn new() -> RegionResult<Self> {
        Self::with_config(PoolConfig::default())
    }

    /// Creates a pool whose segments hold `capacity` bytes, header included
    pub fn with_capacity(capacity: usize) -> RegionResult<Self> {
        Self::with_config(PoolConfig::default().with_capacity(capacity))
    }

    /// Creates a pool from an explicit configuration
    pub fn with_config(config: PoolConfig) -> RegionResult<Self> {
        config.validate()?;

        let root = Segment::new(config.capacity, POOL_HEADER_SIZE, config.zero_segments)?;
        let small_threshold = config.small_threshold();

        #[cfg(feature = "logging")]
        debug!(
            capacity = config.capacity,
            small_threshold, "region pool created"
        );

        Ok(Self {
            inner: RefCell::new(PoolInner {
                segments: vec![root],
                current: 0,
                large: LargeList::new(),
                cleanups: CleanupChain::new(),
            }),
            config,
            small_threshold,
            stats: PoolStats::new(),
        })
    }

    // ------------------------------------------------------------------------
    // Byte allocation
    // ------------------------------------------------------------------------

    /// Allocates `size` bytes aligned to the pool alignment unit
    #[must_use = "allocated memory must be used"]
    pub fn alloc_bytes(&self, size: usize) -> RegionResult<NonNull<u8>> {
        self.allocate(size, self.config.alignment)
    }

    /// Allocates `size` bytes with no alignment, for byte and string buffers
    #[must_use = "allocated memory must be used"]
    pub fn alloc_bytes_unaligned(&self, size: usize) -> RegionResult<NonNull<u8>> {
        self.allocate(size, 1)
    }

    /// Allocates `size` aligned bytes, all set to zero
    #[must_use = "allocated memory must be used"]
    pub fn alloc_bytes_zeroed(&self, size: usize) -> RegionResult<NonNull<u8>> {
        let ptr = self.alloc_bytes(size)?;
        // SAFETY: ptr is valid for `size` bytes of writes (just allocated).
        unsafe { ptr::write_bytes(ptr.as_ptr(), 0, size) };
        Ok(ptr)
    }

    /// Allocates memory for `layout`, aligned to at least the pool alignment unit
    #[must_use = "allocated memory must be used"]
    pub fn alloc_layout(&self, layout: Layout) -> RegionResult<NonNull<u8>> {
        self.allocate(layout.size(), layout.align().max(self.config.alignment))
    }

    fn allocate(&self, size: usize, align: usize) -> RegionResult<NonNull<u8>> {
        check_alignment(align)?;
        let mut inner = self.inner.borrow_mut();
        self.route(&mut inner, size, align)
    }

    fn route(&self, inner: &mut PoolInner, size: usize, align: usize) -> RegionResult<NonNull<u8>> {
        if size <= self.small_threshold && align <= POOL_ALIGNMENT {
            let ptr = self.allocate_small(inner, size, align)?;
            self.stats.record_small(size);
            Ok(ptr)
        } else {
            self.allocate_large(inner, size, align)
        }
    }

    fn allocate_small(
        &self,
        inner: &mut PoolInner,
        size: usize,
        align: usize,
    ) -> RegionResult<NonNull<u8>> {
        let start = inner.current;
        for segment in &mut inner.segments[start..] {
            if let Some(ptr) = segment.try_carve(size, align) {
                return Ok(ptr);
            }
        }

        self.allocate_block(inner, size, align)
    }

    /// Appends a segment and carves the request from it
    fn allocate_block(
        &self,
        inner: &mut PoolInner,
        size: usize,
        align: usize,
    ) -> RegionResult<NonNull<u8>> {
        let mut segment = Segment::new(
            self.config.capacity,
            SEGMENT_HEADER_SIZE,
            self.config.zero_segments,
        )?;
        let ptr = segment
            .try_carve(size, align)
            .ok_or_else(|| RegionError::allocation_failed(size, align))?;

        // Every segment from `current` that already has a successor failed this
        // request; past the budget it is dropped from the search.
        let tail = inner.segments.len() - 1;
        for index in inner.current..tail {
            if inner.segments[index].record_failure() > self.config.fail_budget {
                inner.current = index + 1;
            }
        }

        inner.segments.push(segment);
        self.stats.record_growth();

        #[cfg(feature = "logging")]
        debug!(
            segments = inner.segments.len(),
            current = inner.current,
            "region pool grew"
        );

        Ok(ptr)
    }

    fn allocate_large(
        &self,
        inner: &mut PoolInner,
        size: usize,
        align: usize,
    ) -> RegionResult<NonNull<u8>> {
        let layout = Layout::from_size_align(size.max(1), align)
            .map_err(|_| RegionError::size_overflow("large allocation layout"))?;
        let block = LargeBlock::allocate(layout)?;
        let ptr = block.as_ptr();

        let reused = match inner.large.try_reuse(block, self.config.large_scan_limit) {
            Ok(()) => true,
            Err(block) => {
                // The record itself is charged to the segment chain; on failure
                // the block is dropped, which frees it.
                self.allocate_small(inner, LARGE_RECORD_SIZE, self.config.alignment)?;
                inner.large.push(block);
                false
            }
        };
        self.stats.record_large(size, reused);

        #[cfg(feature = "logging")]
        trace!(size, reused, records = inner.large.len(), "large allocation");

        Ok(ptr)
    }

    /// Releases a large allocation before the pool is reset or destroyed
    ///
    /// Returns `false`, and does nothing, when `ptr` is not the start of a live
    /// large allocation, including a second release of the same pointer.
    ///
    /// # Safety
    ///
    /// No reference into the allocation may be used after this call. This
    /// includes the pool buffer of a cleanup registered with an `extra_size`
    /// above the small threshold.
    pub unsafe fn release_large(&self, ptr: NonNull<u8>) -> bool {
        let released = self.inner.borrow_mut().large.release(ptr);
        if released {
            self.stats.record_release();

            #[cfg(feature = "logging")]
            trace!(ptr = ?ptr, "large allocation released");
        }
        released
    }

    // ------------------------------------------------------------------------
    // Typed allocation
    // ------------------------------------------------------------------------

    /// Moves `value` into the pool
    ///
    /// The pool never runs `Drop` for values it holds; register a cleanup for
    /// anything that needs finalizing.
    #[allow(clippy::mut_from_ref)]
    #[must_use = "allocated memory must be used"]
    pub fn alloc<T>(&self, value: T) -> RegionResult<&mut T> {
        let ptr = self.alloc_layout(Layout::new::<T>())?.cast::<T>();

        // SAFETY: ptr is valid, aligned and sized for T, and not aliased; the
        // reference cannot outlive the borrow of the pool.
        unsafe {
            ptr.as_ptr().write(value);
            Ok(&mut *ptr.as_ptr())
        }
    }

    /// Copies a slice into the pool
    #[allow(clippy::mut_from_ref)]
    #[must_use = "allocated memory must be used"]
    pub fn alloc_slice_copy<T: Copy>(&self, src: &[T]) -> RegionResult<&mut [T]> {
        if src.is_empty() {
            return Ok(&mut []);
        }

        let ptr = self.alloc_layout(Layout::for_value(src))?.cast::<T>();

        // SAFETY: destination is a fresh allocation of size_of_val(src) bytes
        // aligned for T, so it cannot overlap src.
        unsafe {
            ptr::copy_nonoverlapping(src.as_ptr(), ptr.as_ptr(), src.len());
            Ok(std::slice::from_raw_parts_mut(ptr.as_ptr(), src.len()))
        }
    }

    /// Copies a string into the pool without alignment padding
    #[allow(clippy::mut_from_ref)]
    #[must_use = "allocated memory must be used"]
    pub fn alloc_str(&self, s: &str) -> RegionResult<&mut str> {
        let ptr = self.alloc_bytes_unaligned(s.len())?;

        // SAFETY: fresh allocation of s.len() bytes; the copied bytes are valid UTF-8.
        unsafe {
            ptr::copy_nonoverlapping(s.as_ptr(), ptr.as_ptr(), s.len());
            let bytes = std::slice::from_raw_parts_mut(ptr.as_ptr(), s.len());
            Ok(std::str::from_utf8_unchecked_mut(bytes))
        }
    }

    /// Allocates a zero-filled byte buffer
    #[allow(clippy::mut_from_ref)]
    #[must_use = "allocated memory must be used"]
    pub fn alloc_zeroed_slice(&self, len: usize) -> RegionResult<&mut [u8]> {
        let ptr = self.alloc_bytes_zeroed(len)?;
        // SAFETY: len initialized bytes, exclusively owned by the caller.
        Ok(unsafe { std::slice::from_raw_parts_mut(ptr.as_ptr(), len) })
    }

    // ------------------------------------------------------------------------
    // Cleanups
    // ------------------------------------------------------------------------

    /// Registers a cleanup, reserving a zeroed `extra_size`-byte buffer for its data
    ///
    /// With `extra_size == 0` the record starts without data; attach some with
    /// [`CleanupSlot::set_data`].
    pub fn add_cleanup(&self, extra_size: usize) -> RegionResult<CleanupSlot<'_>> {
        let index = {
            let mut inner = self.inner.borrow_mut();
            self.allocate_small(&mut inner, CLEANUP_RECORD_SIZE, self.config.alignment)?;

            let buffer = if extra_size > 0 {
                let ptr = self.route(&mut inner, extra_size, self.config.alignment)?;
                // SAFETY: fresh allocation of extra_size bytes.
                unsafe { ptr::write_bytes(ptr.as_ptr(), 0, extra_size) };
                Some((ptr, extra_size))
            } else {
                None
            };

            inner.cleanups.push(buffer)
        };
        self.stats.record_cleanup();

        Ok(CleanupSlot::new(self, index))
    }

    pub(crate) fn cleanups_mut(&self) -> RefMut<'_, CleanupChain> {
        RefMut::map(self.inner.borrow_mut(), |inner| &mut inner.cleanups)
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Returns the pool to a reusable state
    ///
    /// Frees every large allocation and discards the large records, rewinds
    /// the first segment and restarts allocation search there. Segments added
    /// by growth keep their cursors and failure counts, so their used space is
    /// not reclaimed. Cleanups stay registered, but pool buffers attached to
    /// them are detached because their bytes may be handed out again.
    #[cfg_attr(not(feature = "logging"), allow(unused_variables))]
    pub fn reset(&mut self) {
        let zero = self.config.zero_segments;
        let inner = self.inner.get_mut();

        let released = inner.large.clear();
        let detached = inner.cleanups.detach_buffers();
        if let Some(root) = inner.segments.first_mut() {
            root.rewind(POOL_HEADER_SIZE, zero);
        }
        inner.current = 0;
        self.stats.record_reset();

        #[cfg(feature = "logging")]
        debug!(
            released,
            detached,
            segments = inner.segments.len(),
            "region pool reset"
        );
    }

    /// Tears the pool down, returning how many cleanup handlers ran
    ///
    /// Handlers run newest-first with their data, then large allocations are
    /// freed, then segments in chain order. Dropping a pool does the same.
    pub fn destroy(mut self) -> usize {
        self.teardown()
    }

    #[cfg_attr(not(feature = "logging"), allow(unused_variables))]
    fn teardown(&mut self) -> usize {
        let inner = self.inner.get_mut();
        if inner.segments.is_empty() {
            return 0;
        }

        // SAFETY: segments and large blocks are still alive, and `&mut self`
        // rules out any outstanding borrow of pool memory.
        let ran = unsafe { inner.cleanups.run_all() };
        self.stats.record_cleanups_run(ran);
        let released = inner.large.clear();
        let segments = inner.segments.len();
        inner.segments.clear();

        #[cfg(feature = "logging")]
        debug!(
            cleanups = ran,
            released, segments, "region pool destroyed"
        );

        ran
    }

    // ------------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------------

    /// Pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Largest request served from segments
    pub fn small_threshold(&self) -> usize {
        self.small_threshold
    }

    /// Capacity of every segment, header included
    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Allocation statistics
    pub fn stats(&self) -> &PoolStats {
        &self.stats
    }

    /// Number of segments in the chain
    pub fn segment_count(&self) -> usize {
        self.inner.borrow().segments.len()
    }

    /// Index of the segment where small-allocation search starts
    pub fn current_segment(&self) -> usize {
        self.inner.borrow().current
    }

    /// Bump state of the segment at `index`
    pub fn segment_usage(&self, index: usize) -> Option<SegmentUsage> {
        self.inner.borrow().segments.get(index).map(Segment::usage)
    }

    /// Index of the segment whose buffer contains `ptr`
    pub fn segment_index_of(&self, ptr: *const u8) -> Option<usize> {
        self.inner
            .borrow()
            .segments
            .iter()
            .position(|segment| segment.contains(ptr))
    }

    /// Whether `ptr` starts a live large allocation
    pub fn is_large(&self, ptr: NonNull<u8>) -> bool {
        self.inner.borrow().large.contains(ptr)
    }

    /// Number of large records, free slots included
    pub fn large_count(&self) -> usize {
        self.inner.borrow().large.len()
    }

    /// Number of live large allocations
    pub fn live_large_count(&self) -> usize {
        self.inner.borrow().large.live()
    }

    /// Bytes held by live large allocations
    pub fn live_large_bytes(&self) -> usize {
        self.inner.borrow().large.live_bytes()
    }

    /// Number of registered cleanups
    pub fn cleanup_count(&self) -> usize {
        self.inner.borrow().cleanups.len()
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Pool")
            .field("capacity", &self.config.capacity)
            .field("small_threshold", &self.small_threshold)
            .field("segments", &inner.segments.len())
            .field("current", &inner.current)
            .field("large", &inner.large.len())
            .field("cleanups", &inner.cleanups.len())
            .finish()
    }
}
