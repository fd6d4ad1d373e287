//! RAII helper for scoped pool usage
//!
//! A [`PoolScope`] borrows a pool for one unit of work (a request, a
//! connection) and resets it when the scope ends, so the next unit starts
//! from a rewound root segment.

use std::ops::Deref;

use crate::pool::Pool;

/// Borrowed pool that is reset on drop
///
/// # Examples
///
/// ```
/// use nebula_region::{Pool, PoolScope};
///
/// let mut pool = Pool::new()?;
/// for request in ["GET /a", "GET /b"] {
///     let scope = PoolScope::new(&mut pool);
///     let line = scope.alloc_str(request)?;
///     assert!(line.starts_with("GET"));
/// }
/// assert_eq!(pool.stats().resets(), 2);
/// # Ok::<(), nebula_region::RegionError>(())
/// ```
pub struct PoolScope<'p> {
    pool: &'p mut Pool,
}

impl<'p> PoolScope<'p> {
    /// Starts a scope over `pool`
    pub fn new(pool: &'p mut Pool) -> Self {
        Self { pool }
    }

    /// Get immutable reference to the underlying pool
    pub fn pool(&self) -> &Pool {
        self.pool
    }

    /// Manually reset the pool (will also happen on drop)
    pub fn reset(&mut self) {
        self.pool.reset();
    }
}

impl Deref for PoolScope<'_> {
    type Target = Pool;

    fn deref(&self) -> &Self::Target {
        self.pool
    }
}

impl Drop for PoolScope<'_> {
    fn drop(&mut self) {
        self.pool.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_resets_on_drop() {
        let mut pool = Pool::new().unwrap();
        {
            let scope = PoolScope::new(&mut pool);
            let _value = scope.alloc(42u32).unwrap();
            let _large = scope.alloc_bytes(scope.small_threshold() + 1).unwrap();
        }

        assert_eq!(pool.stats().resets(), 1);
        assert_eq!(pool.live_large_count(), 0);
        assert_eq!(pool.large_count(), 0);
    }

    #[test]
    fn manual_reset_inside_scope() {
        let mut pool = Pool::new().unwrap();
        let mut scope = PoolScope::new(&mut pool);
        let first = scope.alloc(1u64).unwrap() as *mut u64;
        scope.reset();
        let second = scope.alloc(2u64).unwrap() as *mut u64;

        assert_eq!(first, second);
        drop(scope);
        assert_eq!(pool.stats().resets(), 2);
    }
}
