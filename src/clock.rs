//! Monotonic timestamps for report arrival.
//!
//! Gyro integration needs ~1 ms resolution between consecutive reports, so
//! report times come from `Instant` (steady clock) rather than wall time.

use std::time::Instant;

/// Arrival time of a report.
pub type Timestamp = Instant;

/// Current monotonic time.
pub fn now() -> Timestamp {
    Instant::now()
}

/// Milliseconds from `earlier` to `later` with sub-millisecond precision.
/// Returns 0 if `later` precedes `earlier`.
pub fn elapsed_ms(earlier: Timestamp, later: Timestamp) -> f64 {
    later.saturating_duration_since(earlier).as_secs_f64() * 1000.0
}
