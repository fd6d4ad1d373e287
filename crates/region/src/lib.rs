//! # nebula-region
//!
//! Region-based memory pool for scope-bound workloads such as per-request or
//! per-connection processing. Many short-lived allocations are served cheaply
//! from one [`Pool`] and released all at once, instead of being freed
//! individually.
//!
//! The pool owns three structures:
//! - a chain of fixed-capacity segments serving bump allocations up to the
//!   pool's small threshold
//! - a list of large allocations taken from the system allocator, which can be
//!   released early
//! - a chain of cleanup handlers that run once, newest-first, at destroy
//!
//! ## Quick Start
//!
//! ```rust
//! use nebula_region::prelude::*;
//!
//! let pool = Pool::new()?;
//!
//! let buf = pool.alloc_zeroed_slice(128)?;
//! buf[0] = 1;
//!
//! let owned = String::from("hello world");
//! let mut cleanup = pool.add_cleanup(0)?;
//! cleanup.set_data(owned).set_handler(|data| {
//!     let owned = data.downcast::<String>().expect("string data");
//!     assert_eq!(owned.as_str(), "hello world");
//! });
//!
//! assert_eq!(pool.destroy(), 1);
//! # Ok::<(), RegionError>(())
//! ```
//!
//! ## Features
//!
//! - `logging` (default): structured events through `tracing`
//!
//! ## Thread Safety
//!
//! A pool is confined to the thread that created it: it is neither `Send` nor
//! `Sync` and holds no lock. Use one pool per worker.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(clippy::all)]
#![warn(clippy::perf)]
#![warn(clippy::pedantic)]
#![warn(rust_2018_idioms)]
// The allocator is built on raw buffers; every unsafe block carries a SAFETY note
#![allow(unsafe_code)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
// Cast truncation in byte counters is reviewed per-site
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
// inline(always) on small alignment helpers is intentional for hot paths
#![allow(clippy::inline_always)]

// Error types
pub mod error;

// Core modules
pub mod cleanup;
pub mod config;
mod large;
pub mod pool;
pub mod scope;
mod segment;
pub mod stats;
pub mod utils;

// Re-export core types for convenience
pub use crate::cleanup::{CleanupData, CleanupSlot};
pub use crate::config::PoolConfig;
pub use crate::error::{RegionError, RegionResult, Result};
pub use crate::pool::Pool;
pub use crate::scope::PoolScope;
pub use crate::segment::SegmentUsage;
pub use crate::stats::{PoolStats, PoolStatsSnapshot};

// Public API exports
pub mod prelude {
    //! Convenient re-exports of commonly used types.

    pub use crate::cleanup::{CleanupData, CleanupSlot};
    pub use crate::config::PoolConfig;
    pub use crate::error::{RegionError, RegionResult};
    pub use crate::pool::Pool;
    pub use crate::scope::PoolScope;
    pub use crate::stats::{PoolStats, PoolStatsSnapshot};
}
