//! Wall-clock helpers.
//!
//! Monotonic timing uses `std::time::Instant` directly; only the wall clock
//! (exchange timestamps, order-id minting) goes through here.

use chrono::Utc;

/// Milliseconds since the Unix epoch.
pub fn wall_clock_ms() -> i64 {
    Utc::now().timestamp_millis()
}
