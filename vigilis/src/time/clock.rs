use std::sync::OnceLock;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Reference point for the monotonic clock, fixed on first use.
static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Returns the current wall-clock time in milliseconds since the Unix epoch.
///
/// A system clock set before 1970 reads as zero.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Returns monotonic time in milliseconds.
///
/// The value only grows and is unaffected by wall-clock adjustments. Its
/// origin is the first call made by this process, so it is only meaningful
/// when compared with other readings of the same clock.
pub fn monotonic_ms() -> u64 {
    EPOCH.get_or_init(Instant::now).elapsed().as_millis() as u64
}
