//! Calendar-month arithmetic for vesting dates.
//!
//! Adding months clamps to the last day of the target month (Jan 31 + 1 month
//! is Feb 28/29), and `whole_months_between` counts with the same rule so
//! that `add_months(a, whole_months_between(a, b)) <= b` always holds.

use chrono::{DateTime, Datelike, Months, Utc};

#[must_use]
pub fn add_months(at: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    at.checked_add_months(Months::new(months))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Number of complete calendar months from `start` to `end` (0 if `end` is
/// not after `start`).
#[must_use]
pub fn whole_months_between(start: DateTime<Utc>, end: DateTime<Utc>) -> u32 {
    if end <= start {
        return 0;
    }
    let raw = (end.year() - start.year()) * 12 + end.month() as i32 - start.month() as i32;
    let mut months = raw.max(0) as u32;
    while months > 0 && add_months(start, months) > end {
        months -= 1;
    }
    months
}
