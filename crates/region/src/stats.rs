//! Statistics tracking for region pools
//!
//! Counters use `Cell` because a pool is confined to one thread.

use std::cell::Cell;

/// Statistics for a region pool
#[derive(Debug, Default)]
pub struct PoolStats {
    small_allocations: Cell<u64>,
    large_allocations: Cell<u64>,
    bytes_requested: Cell<u64>,
    segments_grown: Cell<u64>,
    large_reused: Cell<u64>,
    large_released: Cell<u64>,
    resets: Cell<u64>,
    cleanups_registered: Cell<u64>,
    cleanups_run: Cell<u64>,
}

#[inline]
fn bump(cell: &Cell<u64>, by: u64) {
    cell.set(cell.get().saturating_add(by));
}

impl PoolStats {
    /// Creates a new PoolStats instance
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_small(&self, size: usize) {
        bump(&self.small_allocations, 1);
        bump(&self.bytes_requested, size as u64);
    }

    pub(crate) fn record_large(&self, size: usize, reused: bool) {
        bump(&self.large_allocations, 1);
        bump(&self.bytes_requested, size as u64);
        if reused {
            bump(&self.large_reused, 1);
        }
    }

    pub(crate) fn record_growth(&self) {
        bump(&self.segments_grown, 1);
    }

    pub(crate) fn record_release(&self) {
        bump(&self.large_released, 1);
    }

    pub(crate) fn record_reset(&self) {
        bump(&self.resets, 1);
    }

    pub(crate) fn record_cleanup(&self) {
        bump(&self.cleanups_registered, 1);
    }

    pub(crate) fn record_cleanups_run(&self, count: usize) {
        bump(&self.cleanups_run, count as u64);
    }

    // Getters
    pub fn small_allocations(&self) -> u64 {
        self.small_allocations.get()
    }

    pub fn large_allocations(&self) -> u64 {
        self.large_allocations.get()
    }

    pub fn bytes_requested(&self) -> u64 {
        self.bytes_requested.get()
    }

    pub fn segments_grown(&self) -> u64 {
        self.segments_grown.get()
    }

    pub fn large_reused(&self) -> u64 {
        self.large_reused.get()
    }

    pub fn large_released(&self) -> u64 {
        self.large_released.get()
    }

    pub fn resets(&self) -> u64 {
        self.resets.get()
    }

    pub fn cleanups_registered(&self) -> u64 {
        self.cleanups_registered.get()
    }

    pub fn cleanups_run(&self) -> u64 {
        self.cleanups_run.get()
    }

    /// Share of large allocations that landed in a recycled slot (0..1)
    pub fn large_reuse_ratio(&self) -> f64 {
        let large = self.large_allocations() as f64;
        if large == 0.0 {
            0.0
        } else {
            self.large_reused() as f64 / large
        }
    }

    /// Copies the current counters
    pub fn snapshot(&self) -> PoolStatsSnapshot {
        PoolStatsSnapshot {
            small_allocations: self.small_allocations(),
            large_allocations: self.large_allocations(),
            bytes_requested: self.bytes_requested(),
            segments_grown: self.segments_grown(),
            large_reused: self.large_reused(),
            large_released: self.large_released(),
            resets: self.resets(),
            cleanups_registered: self.cleanups_registered(),
            cleanups_run: self.cleanups_run(),
        }
    }
}

/// Point-in-time copy of [`PoolStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStatsSnapshot {
    pub small_allocations: u64,
    pub large_allocations: u64,
    pub bytes_requested: u64,
    pub segments_grown: u64,
    pub large_reused: u64,
    pub large_released: u64,
    pub resets: u64,
    pub cleanups_registered: u64,
    pub cleanups_run: u64,
}

impl PoolStatsSnapshot {
    /// Total allocations served by either path
    pub fn total_allocations(&self) -> u64 {
        self.small_allocations + self.large_allocations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = PoolStats::new();
        stats.record_small(16);
        stats.record_large(8192, false);
        stats.record_large(8192, true);
        stats.record_growth();
        stats.record_release();
        stats.record_cleanup();
        stats.record_cleanups_run(1);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total_allocations(), 3);
        assert_eq!(snapshot.bytes_requested, 16 + 2 * 8192);
        assert_eq!(snapshot.segments_grown, 1);
        assert_eq!(snapshot.large_released, 1);
        assert_eq!(snapshot.cleanups_registered, snapshot.cleanups_run);
        assert!((stats.large_reuse_ratio() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_ratio_is_zero() {
        assert_eq!(PoolStats::new().large_reuse_ratio(), 0.0);
    }
}
