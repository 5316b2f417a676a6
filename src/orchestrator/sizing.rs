//! Worker pool sizing.

use std::num::NonZeroUsize;
use std::thread;

/// Number of workers to spawn.
///
/// A positive override wins. Anything else falls back to the host's available
/// parallelism.
pub fn decide_worker_count(override_count: Option<i64>) -> usize {
    match override_count {
        Some(n) if n > 0 => usize::try_from(n).unwrap_or_else(|_| host_parallelism()),
        Some(n) => {
            tracing::warn!(requested = n, "Non-positive worker override ignored");
            host_parallelism()
        }
        None => host_parallelism(),
    }
}

/// Logical CPUs available to this process, at least 1.
pub fn host_parallelism() -> usize {
    thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}
