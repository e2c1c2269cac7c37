//! Minute slots counted from a per-series epoch date.

use std::time::Duration;

use chrono::{DateTime, NaiveDate, Timelike, Utc};

/// Minutes per day.
pub const SLOTS_PER_DAY: i64 = 24 * 60;

/// Period of the recurring recorder tick.
pub const SLOT_PERIOD: Duration = Duration::from_secs(60);

/// Slot of `now` for a series whose slot 0 starts at 00:00 UTC on `epoch`.
///
/// Negative when `now` is earlier than the epoch date.
pub fn slot_index(epoch: NaiveDate, now: DateTime<Utc>) -> i64 {
    let days = now.date_naive().signed_duration_since(epoch).num_days();
    days * SLOTS_PER_DAY + i64::from(now.hour()) * 60 + i64::from(now.minute())
}

/// Milliseconds from the start of the current second to the next minute boundary.
pub fn ms_until_next_minute_boundary(now: DateTime<Utc>) -> u64 {
    1000 * (60 - u64::from(now.second()))
}

/// Delay before the first recorder tick: none when already on a minute boundary.
pub fn first_tick_delay(now: DateTime<Utc>) -> Duration {
    if now.second() == 0 {
        Duration::ZERO
    } else {
        Duration::from_millis(ms_until_next_minute_boundary(now))
    }
}
