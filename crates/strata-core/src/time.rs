//! Millisecond timestamps and relationship intervals.

use chrono::Utc;

/// "End of time": the `to` of every relationship that is still current.
pub const EOT: i64 = i64::MAX;

/// Current wall clock time in milliseconds since the epoch.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Whether the interval `[from, to)` contains `t`.
pub fn valid_at(from: i64, to: i64, t: i64) -> bool {
    from <= t && t < to
}
