//! Functions to work with time.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::time::Instant;

/// Number of seconds that have elapsed since the Unix epoch.
pub fn unix_time(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// Returns an `Instant` corresponding to "now". Should be used instead of
/// `tokio::time::Instant::now()` so that tests can mock time.
pub fn clock_now() -> Instant {
    Instant::now()
}

/// Returns the amount of time elapsed since `time`. Should be used instead of
/// `Instant::elapsed` so that tests can mock time.
pub fn clock_elapsed(time: Instant) -> Duration {
    clock_now() - time
}
