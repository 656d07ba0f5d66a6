// src/ticks.rs
//! Conversion between `DateTime<Utc>` instants and 64-bit tick counts.
//!
//! A tick is a 100-nanosecond interval counted from the calendar-epoch
//! anchor `0001-01-01T00:00:00Z` — the same anchor spec.md's period
//! arithmetic floors `Years`/`Months` boundaries against.

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};

pub const TICKS_PER_SECOND: i64 = 10_000_000;

fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(1, 1, 1, 0, 0, 0).unwrap()
}

/// Converts an instant to its tick count since the calendar epoch.
pub fn to_ticks(at: DateTime<Utc>) -> i64 {
    let delta = at.signed_duration_since(epoch());
    let secs = delta.num_seconds();
    let sub = delta - ChronoDuration::seconds(secs);
    let sub_nanos = sub.num_nanoseconds().unwrap_or(0);
    secs * TICKS_PER_SECOND + sub_nanos / 100
}

/// Converts a tick count back to an instant.
pub fn from_ticks(ticks: i64) -> DateTime<Utc> {
    let secs = ticks.div_euclid(TICKS_PER_SECOND);
    let rem_ticks = ticks.rem_euclid(TICKS_PER_SECOND);
    epoch() + ChronoDuration::seconds(secs) + ChronoDuration::nanoseconds(rem_ticks * 100)
}
