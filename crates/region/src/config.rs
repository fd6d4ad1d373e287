//! Pool configuration and layout constants
//!
//! Segments are fixed-size: every segment added after the first has the same
//! total capacity as the first one. Capacity includes a per-segment header
//! reservation, as in the classic in-band pool layout, so the usable space of
//! a segment is `capacity - header`.

use core::mem::size_of;

use crate::error::{RegionError, RegionResult};
use crate::utils::align_up;

/// Page size assumed for the small-allocation hard cap
pub const PAGE_SIZE: usize = 4096;

/// Largest request ever served from a segment
pub const MAX_ALLOC_FROM_POOL: usize = PAGE_SIZE - 1;

/// Default segment capacity (16 KiB)
pub const DEFAULT_POOL_SIZE: usize = 16 * 1024;

/// Alignment of every segment buffer
///
/// Requests aligned more strictly than this bypass the segments and are served
/// as large allocations.
pub const POOL_ALIGNMENT: usize = 16;

/// Default alignment unit for aligned small allocations
pub const DEFAULT_ALIGNMENT: usize = size_of::<usize>();

/// Bytes reserved at the start of every grown segment (cursor, limit, link, fail count)
pub const SEGMENT_HEADER_SIZE: usize = 4 * size_of::<usize>();

/// Bytes reserved at the start of the first segment (segment header plus pool root)
pub const POOL_HEADER_SIZE: usize = SEGMENT_HEADER_SIZE + 4 * size_of::<usize>();

/// Segment bytes charged for each large-allocation record
pub const LARGE_RECORD_SIZE: usize = 2 * size_of::<usize>();

/// Segment bytes charged for each cleanup record
pub const CLEANUP_RECORD_SIZE: usize = 3 * size_of::<usize>();

/// Smallest accepted segment capacity
pub const MIN_POOL_SIZE: usize = align_up(POOL_HEADER_SIZE + 2 * LARGE_RECORD_SIZE, POOL_ALIGNMENT);

/// Default number of large records inspected for a reusable slot
pub const DEFAULT_LARGE_SCAN_LIMIT: usize = 4;

/// Default number of failed fits tolerated before a segment is skipped
pub const DEFAULT_FAIL_BUDGET: u32 = 4;

/// Region pool configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Total capacity of each segment, header included
    pub capacity: usize,
    /// Alignment unit for aligned allocations (power of two, at most [`POOL_ALIGNMENT`])
    pub alignment: usize,
    /// Hard cap on the small-allocation threshold
    pub max_small_size: usize,
    /// How many large records are scanned for a free slot before pushing a new one
    pub large_scan_limit: usize,
    /// Failed fits a segment may accumulate before allocation search skips it
    pub fail_budget: u32,
    /// Whether new segment buffers are zero-filled
    pub zero_segments: bool,
}

impl PoolConfig {
    /// Creates new config with default values
    pub fn new() -> Self {
        Self {
            capacity: DEFAULT_POOL_SIZE,
            alignment: DEFAULT_ALIGNMENT,
            max_small_size: MAX_ALLOC_FROM_POOL,
            large_scan_limit: DEFAULT_LARGE_SCAN_LIMIT,
            fail_budget: DEFAULT_FAIL_BUDGET,
            zero_segments: false,
        }
    }

    /// Small configuration - 1 KiB segments for short-lived scopes
    pub fn small() -> Self {
        Self {
            capacity: 1024,
            ..Self::new()
        }
    }

    /// Debug configuration - zeroed segments make stale reads obvious
    pub fn debug() -> Self {
        Self {
            zero_segments: true,
            ..Self::new()
        }
    }

    /// Sets segment capacity
    #[must_use = "builder methods must be chained or built"]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets alignment unit
    #[must_use = "builder methods must be chained or built"]
    pub fn with_alignment(mut self, alignment: usize) -> Self {
        self.alignment = alignment;
        self
    }

    /// Sets the hard cap on small allocations
    #[must_use = "builder methods must be chained or built"]
    pub fn with_max_small_size(mut self, max_small_size: usize) -> Self {
        self.max_small_size = max_small_size;
        self
    }

    /// Sets how many large records are scanned for reuse
    #[must_use = "builder methods must be chained or built"]
    pub fn with_large_scan_limit(mut self, limit: usize) -> Self {
        self.large_scan_limit = limit;
        self
    }

    /// Sets the per-segment failure budget
    #[must_use = "builder methods must be chained or built"]
    pub fn with_fail_budget(mut self, budget: u32) -> Self {
        self.fail_budget = budget;
        self
    }

    /// Enables or disables zero-filling of segments
    #[must_use = "builder methods must be chained or built"]
    pub fn with_zero_segments(mut self, zero: bool) -> Self {
        self.zero_segments = zero;
        self
    }

    /// Threshold at or below which requests are carved from segments
    pub fn small_threshold(&self) -> usize {
        self.capacity.saturating_sub(POOL_HEADER_SIZE).min(self.max_small_size)
    }

    /// Validates the configuration
    pub fn validate(&self) -> RegionResult<()> {
        if !self.alignment.is_power_of_two() {
            return Err(RegionError::invalid_alignment(self.alignment));
        }
        if self.alignment > POOL_ALIGNMENT {
            return Err(RegionError::invalid_config(&format!(
                "alignment {} exceeds segment alignment {POOL_ALIGNMENT}",
                self.alignment
            )));
        }
        if self.capacity < MIN_POOL_SIZE {
            return Err(RegionError::invalid_config(&format!(
                "capacity {} is below minimum {MIN_POOL_SIZE}",
                self.capacity
            )));
        }
        if isize::try_from(self.capacity).is_err() {
            return Err(RegionError::size_overflow("segment capacity"));
        }
        if self.large_scan_limit == 0 {
            return Err(RegionError::invalid_config("large_scan_limit must be non-zero"));
        }
        Ok(())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new()
    }
}
