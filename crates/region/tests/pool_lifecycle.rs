//! Integration tests for the pool lifecycle
//!
//! Covers allocation routing, growth, large-slot reuse, cleanup ordering and
//! reset behavior through the public API only.

use std::cell::RefCell;
use std::rc::Rc;

use nebula_region::config::{MIN_POOL_SIZE, POOL_HEADER_SIZE};
use nebula_region::prelude::*;
use pretty_assertions::assert_eq;
use rstest::rstest;

#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(C)]
struct Record {
    id: u64,
    flags: u32,
    payload: [u8; 500],
}

fn pool_with_capacity(capacity: usize) -> Pool {
    Pool::with_capacity(capacity).expect("pool creation")
}

#[test]
fn small_and_structured_allocations_do_not_overlap() {
    let pool = Pool::new().unwrap();

    let bytes = pool.alloc_bytes(128).unwrap();
    assert_eq!(pool.segment_index_of(bytes.as_ptr()), Some(0));

    let record = pool
        .alloc(Record {
            id: 7,
            flags: 0b101,
            payload: [0xAB; 500],
        })
        .unwrap();
    record.payload[499] = 0xCD;

    // SAFETY: 128 bytes were allocated above and are not borrowed elsewhere.
    unsafe { std::ptr::write_bytes(bytes.as_ptr(), 0x11, 128) };

    let bytes_start = bytes.as_ptr() as usize;
    let record_start = std::ptr::addr_of!(*record) as usize;
    assert!(bytes_start + 128 <= record_start);
    assert_eq!(record.id, 7);
    assert_eq!(record.flags, 0b101);
    assert_eq!(record.payload[0], 0xAB);
    assert_eq!(record.payload[499], 0xCD);
    // SAFETY: first byte of the 128-byte buffer written above.
    assert_eq!(unsafe { *bytes.as_ptr() }, 0x11);
}

#[test]
fn large_allocation_is_released_exactly_once() {
    let pool = Pool::new().unwrap();
    let size = pool.small_threshold() + 1;

    let ptr = pool.alloc_bytes(size).unwrap();
    assert!(pool.is_large(ptr));
    assert_eq!(pool.large_count(), 1);
    assert_eq!(pool.live_large_bytes(), size);

    // SAFETY: nothing references the allocation.
    assert!(unsafe { pool.release_large(ptr) });
    // SAFETY: second release of the same pointer is a checked no-op.
    assert!(!unsafe { pool.release_large(ptr) });

    assert!(!pool.is_large(ptr));
    assert_eq!(pool.large_count(), 1);
    assert_eq!(pool.live_large_count(), 0);
    assert_eq!(pool.stats().large_released(), 1);
}

#[test]
fn release_ignores_small_pointers() {
    let pool = Pool::new().unwrap();
    let small = pool.alloc_bytes(32).unwrap();
    // SAFETY: a non-large pointer is rejected without freeing anything.
    assert!(!unsafe { pool.release_large(small) });
}

#[test]
fn cleanups_run_in_reverse_registration_order() {
    let fired = Rc::new(RefCell::new(Vec::new()));
    let pool = Pool::new().unwrap();

    for marker in ["first", "second"] {
        let fired = Rc::clone(&fired);
        pool.add_cleanup(0)
            .unwrap()
            .set_handler(move |_| fired.borrow_mut().push(marker));
    }

    assert_eq!(pool.cleanup_count(), 2);
    assert_eq!(pool.destroy(), 2);
    assert_eq!(*fired.borrow(), vec!["second", "first"]);
}

#[test]
fn dropping_the_pool_runs_cleanups() {
    let fired = Rc::new(RefCell::new(0));
    {
        let pool = Pool::new().unwrap();
        let fired = Rc::clone(&fired);
        pool.add_cleanup(0)
            .unwrap()
            .set_handler(move |_| *fired.borrow_mut() += 1);
    }
    assert_eq!(*fired.borrow(), 1);
}

#[test]
fn cleanup_receives_its_pool_buffer() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let pool = Pool::new().unwrap();

    let mut slot = pool.add_cleanup(4).unwrap();
    let buffer = slot.data_mut().expect("buffer reserved");
    assert_eq!(buffer, &[0, 0, 0, 0]);
    buffer.copy_from_slice(b"done");

    let sink = Rc::clone(&seen);
    slot.set_handler(move |data| {
        if let CleanupData::Buffer(bytes) = data {
            sink.borrow_mut().extend_from_slice(bytes);
        }
    });

    assert_eq!(pool.destroy(), 1);
    assert_eq!(seen.borrow().as_slice(), b"done");
}

#[test]
fn cleanup_receives_external_data() {
    let seen = Rc::new(RefCell::new(String::new()));
    let pool = Pool::new().unwrap();

    let sink = Rc::clone(&seen);
    pool.add_cleanup(0)
        .unwrap()
        .set_data(String::from("conn-42"))
        .set_handler(move |data| {
            if let Some(name) = data.downcast::<String>() {
                sink.borrow_mut().push_str(&name);
            }
        });

    pool.destroy();
    assert_eq!(seen.borrow().as_str(), "conn-42");
}

#[test]
fn growth_keeps_earlier_allocations_valid() {
    let pool = pool_with_capacity(512);
    let mut blocks = Vec::new();

    for i in 0..64u8 {
        let ptr = pool.alloc_bytes(48).unwrap();
        // SAFETY: 48 fresh bytes owned by this test.
        unsafe { std::ptr::write_bytes(ptr.as_ptr(), i, 48) };
        blocks.push((i, ptr));
    }
    assert!(pool.segment_count() > 1);

    for (i, ptr) in &blocks {
        // SAFETY: every block stays alive until the pool is dropped.
        let bytes = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), 48) };
        assert!(bytes.iter().all(|b| b == i), "block {i} was overwritten");
    }

    let mut starts: Vec<usize> = blocks.iter().map(|(_, p)| p.as_ptr() as usize).collect();
    starts.sort_unstable();
    for pair in starts.windows(2) {
        assert!(pair[0] + 48 <= pair[1]);
    }
}

#[test]
fn reset_releases_large_and_reuses_first_segment() {
    let mut pool = Pool::new().unwrap();
    let large_size = pool.small_threshold() * 2;

    let mut first_small = 0;
    for round in 0..2 {
        let large = pool.alloc_bytes(large_size).unwrap();
        let small = pool.alloc_bytes(64).unwrap();
        assert!(pool.is_large(large));
        assert_eq!(pool.live_large_count(), 1);

        if round == 0 {
            first_small = small.as_ptr() as usize;
        } else {
            // The root segment was rewound, so the same layout lands in the same place.
            assert_eq!(small.as_ptr() as usize, first_small);
        }

        pool.reset();
        assert_eq!(pool.live_large_count(), 0);
        assert_eq!(pool.large_count(), 0);
    }

    assert_eq!(pool.stats().resets(), 2);
}

#[test]
fn reset_only_rewinds_first_segment() {
    let mut pool = pool_with_capacity(MIN_POOL_SIZE * 4);
    let threshold = pool.small_threshold();
    for _ in 0..4 {
        pool.alloc_bytes(threshold).unwrap();
    }
    let segments = pool.segment_count();
    assert!(segments > 1);
    let grown_before = pool.segment_usage(1).unwrap();

    pool.reset();

    assert_eq!(pool.segment_count(), segments);
    assert_eq!(pool.current_segment(), 0);
    assert_eq!(pool.small_threshold(), threshold);
    assert_eq!(pool.segment_usage(0).unwrap().cursor, POOL_HEADER_SIZE);
    assert_eq!(pool.segment_usage(1).unwrap(), grown_before);
}

#[test]
fn reset_detaches_cleanup_buffers() {
    let seen = Rc::new(RefCell::new(None));
    let mut pool = Pool::new().unwrap();

    let sink = Rc::clone(&seen);
    pool.add_cleanup(8)
        .unwrap()
        .set_handler(move |data| *sink.borrow_mut() = Some(data.is_none()));

    pool.reset();
    assert_eq!(pool.cleanup_count(), 1);
    assert_eq!(pool.destroy(), 1);
    assert_eq!(*seen.borrow(), Some(true));
}

#[test]
fn released_large_slot_is_reused() {
    let pool = Pool::new().unwrap();
    let size = pool.small_threshold() + 100;

    let first = pool.alloc_bytes(size).unwrap();
    let _second = pool.alloc_bytes(size).unwrap();
    assert_eq!(pool.large_count(), 2);

    // SAFETY: nothing references `first`.
    assert!(unsafe { pool.release_large(first) });
    let third = pool.alloc_bytes(size - 50).unwrap();

    assert!(pool.is_large(third));
    assert_eq!(pool.large_count(), 2);
    assert_eq!(pool.live_large_count(), 2);
    assert_eq!(pool.stats().large_reused(), 1);
}

#[test]
fn free_slot_beyond_scan_limit_is_not_reused() {
    let pool = Pool::new().unwrap();
    let size = pool.small_threshold() + 1;

    let oldest = pool.alloc_bytes(size).unwrap();
    for _ in 0..pool.config().large_scan_limit {
        pool.alloc_bytes(size).unwrap();
    }
    // SAFETY: nothing references `oldest`.
    assert!(unsafe { pool.release_large(oldest) });

    let records = pool.large_count();
    pool.alloc_bytes(size).unwrap();
    assert_eq!(pool.large_count(), records + 1);
    assert_eq!(pool.stats().large_reused(), 0);
}

#[rstest]
#[case::tiny(1, false)]
#[case::typical(512, false)]
#[case::at_threshold(4095, false)]
#[case::just_over(4096, true)]
#[case::page_multiple(64 * 1024, true)]
fn requests_route_by_threshold(#[case] size: usize, #[case] large: bool) {
    let pool = Pool::new().unwrap();
    let ptr = pool.alloc_bytes(size).unwrap();
    assert_eq!(pool.is_large(ptr), large);
    assert_eq!(pool.segment_index_of(ptr.as_ptr()).is_some(), !large);
}

#[rstest]
#[case(PoolConfig::new().with_capacity(64))]
#[case(PoolConfig::new().with_alignment(3))]
#[case(PoolConfig::new().with_alignment(64))]
#[case(PoolConfig::new().with_large_scan_limit(0))]
fn invalid_configs_are_rejected(#[case] config: PoolConfig) {
    let err = Pool::with_config(config).unwrap_err();
    assert!(err.code().starts_with("REGION:"));
}

#[test]
fn impossible_large_request_reports_allocation_failure() {
    let pool = Pool::new().unwrap();
    let err = pool.alloc_bytes(usize::MAX / 4).unwrap_err();
    assert!(err.is_allocation_failure(), "unexpected error: {err}");
    assert_eq!(pool.large_count(), 0);
}

#[test]
fn stats_track_both_paths() {
    let pool = Pool::new().unwrap();
    pool.alloc_bytes(16).unwrap();
    pool.alloc_bytes(32).unwrap();
    pool.alloc_bytes(8192).unwrap();
    pool.add_cleanup(0).unwrap();

    let snapshot = pool.stats().snapshot();
    assert_eq!(
        snapshot,
        PoolStatsSnapshot {
            // bookkeeping records are charged to segments but not counted
            small_allocations: 2,
            large_allocations: 1,
            bytes_requested: 16 + 32 + 8192,
            segments_grown: 0,
            large_reused: 0,
            large_released: 0,
            resets: 0,
            cleanups_registered: 1,
            cleanups_run: 0,
        }
    );
}
