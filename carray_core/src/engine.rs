//! Process-wide engine settings: worker thread count and version probe.
//!
//! The thread count is global mutable state with explicit accessors. It is
//! lazily initialised to the detected core count on first use and needs no
//! teardown. Chunk compression and chunk-wise evaluation run on a shared
//! `rayon` pool sized to this count; with one thread everything runs inline.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{info, warn};

use crate::codec::Codec;
use crate::error::{Error, Result};

/// 0 means "not initialised yet".
static NTHREADS: AtomicUsize = AtomicUsize::new(0);

static POOL: OnceLock<Mutex<Option<(usize, Arc<ThreadPool>)>>> = OnceLock::new();

/// Number of logical cores, falling back to 1 when it cannot be determined.
pub fn detect_number_of_cores() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Current worker thread count.
pub fn nthreads() -> usize {
    let n = NTHREADS.load(Ordering::Relaxed);
    if n != 0 {
        return n;
    }
    let detected = detect_number_of_cores();
    match NTHREADS.compare_exchange(0, detected, Ordering::Relaxed, Ordering::Relaxed) {
        Ok(_) => detected,
        Err(current) => current,
    }
}

/// Set the worker thread count used for compression and evaluation.
///
/// Returns the previous setting.
pub fn set_nthreads(n: usize) -> Result<usize> {
    if n == 0 {
        return Err(Error::invalid("thread count must be at least 1"));
    }
    let previous = nthreads();
    NTHREADS.store(n, Ordering::Relaxed);
    if previous != n {
        info!(previous, nthreads = n, "engine thread count changed");
    }
    Ok(previous)
}

/// Shared worker pool, or `None` when running single-threaded.
pub(crate) fn pool() -> Option<Arc<ThreadPool>> {
    let n = nthreads();
    if n <= 1 {
        return None;
    }
    let slot = POOL.get_or_init(|| Mutex::new(None));
    let mut guard = slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some((size, pool)) = guard.as_ref() {
        if *size == n {
            return Some(Arc::clone(pool));
        }
    }
    match ThreadPoolBuilder::new()
        .num_threads(n)
        .thread_name(|i| format!("carray-worker-{i}"))
        .build()
    {
        Ok(pool) => {
            let pool = Arc::new(pool);
            *guard = Some((n, Arc::clone(&pool)));
            Some(pool)
        }
        Err(e) => {
            warn!(error = %e, "failed to build worker pool; running single-threaded");
            None
        }
    }
}

/// Version string naming this crate and the given codec backend.
pub fn version(codec: &dyn Codec) -> String {
    format!(
        "carray {} ({} {})",
        env!("CARGO_PKG_VERSION"),
        codec.name(),
        codec.version()
    )
}
