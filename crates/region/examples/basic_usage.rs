//! Basic usage of nebula-region pools
//!
//! Walks through one request lifetime: small and structured allocations, a
//! cleanup that finalizes an externally owned value, early release of a large
//! buffer, scoped reuse and destroy.
//!
//! Run with `RUST_LOG=nebula_region=trace` to see the pool's events.

use nebula_region::prelude::*;
use tracing_subscriber::EnvFilter;

struct Connection {
    id: u64,
    bytes_in: u64,
}

fn main() -> Result<(), RegionError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== nebula-region Basic Usage ===\n");

    request_lifetime()?;
    scoped_reuse()?;

    Ok(())
}

fn request_lifetime() -> Result<(), RegionError> {
    println!("## Request lifetime");

    let pool = Pool::new()?;
    println!("  small threshold: {} bytes", pool.small_threshold());

    let scratch = pool.alloc_zeroed_slice(128)?;
    scratch[..5].copy_from_slice(b"HELLO");
    println!("  scratch buffer starts with {:?}", &scratch[..5]);

    let conn = pool.alloc(Connection {
        id: 42,
        bytes_in: 0,
    })?;
    conn.bytes_in += 512;
    println!("  connection {} received {} bytes", conn.id, conn.bytes_in);

    // The pool never drops what it holds, so an owned value is handed to a cleanup.
    let log_line = format!("connection {} closed", conn.id);
    pool.add_cleanup(0)?
        .set_data(log_line)
        .set_handler(|data| {
            if let Some(line) = data.downcast::<String>() {
                println!("  cleanup: {line}");
            }
        });

    let body = pool.alloc_bytes(64 * 1024)?;
    println!("  large body buffer tracked: {}", pool.is_large(body));
    // SAFETY: nothing references the body buffer any more.
    let released = unsafe { pool.release_large(body) };
    println!("  released early: {released}");

    println!("  stats: {:?}", pool.stats().snapshot());
    let ran = pool.destroy();
    println!("  destroyed, {ran} cleanup(s) ran\n");

    Ok(())
}

fn scoped_reuse() -> Result<(), RegionError> {
    println!("## Scoped reuse");

    let mut pool = Pool::with_config(PoolConfig::small())?;
    for path in ["/index.html", "/style.css", "/app.js"] {
        let scope = PoolScope::new(&mut pool);
        let line = scope.alloc_str(path)?;
        println!("  handled {line} in segment {:?}", scope.segment_index_of(line.as_ptr()));
    }
    println!("  resets: {}", pool.stats().resets());

    Ok(())
}
