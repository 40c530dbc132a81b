//! # Reporting Periods
//!
//! Half-open time windows `[start, end)` built from calendar dates.
//!
//! ## Date Boundaries
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  User picks 2024-03-01 .. 2024-03-03 (inclusive, local +08:00)          │
//! │                                                                         │
//! │  start = 2024-03-01 00:00 +08:00 = 2024-02-29 16:00 UTC                │
//! │  end   = 2024-03-04 00:00 +08:00 = 2024-03-03 16:00 UTC  (exclusive)   │
//! │                                                                         │
//! │  2024-03-03 23:59:59.999 local  → included                             │
//! │  2024-03-04 00:00:00.000 local  → excluded                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The exclusive end is the start of the day after the chosen end date, so
//! the whole last day counts without any "23:59:59" arithmetic.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ValidationError;

/// A half-open UTC window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Period {
    #[ts(as = "String")]
    pub start: DateTime<Utc>,
    #[ts(as = "String")]
    pub end: DateTime<Utc>,
}

impl Period {
    /// Creates a window from explicit instants. Inverted bounds are swapped.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        if end < start {
            Period { start: end, end: start }
        } else {
            Period { start, end }
        }
    }

    /// Builds the window for an inclusive calendar range in `offset`.
    ///
    /// An inverted range (`from` after `to`) is silently swapped to match
    /// how the report pages have always behaved. Callers that need to
    /// reject it must compare the dates before calling.
    pub fn from_dates(from: NaiveDate, to: NaiveDate, offset: FixedOffset) -> Self {
        let (from, to) = if from > to { (to, from) } else { (from, to) };
        let after_end = to.succ_opt().unwrap_or(NaiveDate::MAX);
        Period {
            start: local_midnight(from, offset),
            end: local_midnight(after_end, offset),
        }
    }

    /// The last `days` calendar days ending with `today`, inclusive.
    pub fn last_days(today: NaiveDate, days: u32, offset: FixedOffset) -> Self {
        let span = i64::from(days.max(1)) - 1;
        let from = today
            .checked_sub_signed(Duration::days(span))
            .unwrap_or(NaiveDate::MIN);
        Period::from_dates(from, today, offset)
    }

    /// Every instant; used for all-time arrears.
    pub fn all_time() -> Self {
        Period {
            start: DateTime::<Utc>::MIN_UTC,
            end: DateTime::<Utc>::MAX_UTC,
        }
    }

    /// Membership test: `start <= ts < end`.
    #[inline]
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts < self.end
    }
}

/// Converts a UTC offset in minutes to a chrono offset.
pub fn fixed_offset(minutes: i32) -> Result<FixedOffset, ValidationError> {
    minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .ok_or_else(|| ValidationError::OutOfRange {
            field: "utc_offset_minutes".to_string(),
            min: -1439,
            max: 1439,
        })
}

/// Today's calendar date as seen in `offset`.
pub fn today_in(offset: FixedOffset, now: DateTime<Utc>) -> NaiveDate {
    offset.from_utc_datetime(&now.naive_utc()).date_naive()
}

fn local_midnight(date: NaiveDate, offset: FixedOffset) -> DateTime<Utc> {
    let local = date.and_time(NaiveTime::MIN);
    let utc = local
        .checked_sub_signed(Duration::seconds(i64::from(offset.local_minus_utc())))
        .unwrap_or(local);
    Utc.from_utc_datetime(&utc)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn makassar() -> FixedOffset {
        fixed_offset(480).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn local(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32, ms: u32) -> DateTime<Utc> {
        makassar()
            .with_ymd_and_hms(y, m, d, h, min, s)
            .unwrap()
            .with_timezone(&Utc)
            + Duration::milliseconds(i64::from(ms))
    }

    #[test]
    fn test_end_of_last_day_is_included() {
        let period = Period::from_dates(date(2024, 3, 1), date(2024, 3, 3), makassar());
        assert!(period.contains(local(2024, 3, 3, 23, 59, 59, 999)));
        assert!(!period.contains(local(2024, 3, 4, 0, 0, 0, 0)));
    }

    #[test]
    fn test_start_of_first_day_is_included() {
        let period = Period::from_dates(date(2024, 3, 1), date(2024, 3, 3), makassar());
        assert!(period.contains(local(2024, 3, 1, 0, 0, 0, 0)));
        assert!(!period.contains(local(2024, 3, 1, 0, 0, 0, 0) - Duration::milliseconds(1)));
    }

    #[test]
    fn test_boundaries_are_local_midnight_in_utc() {
        let period = Period::from_dates(date(2024, 3, 1), date(2024, 3, 1), makassar());
        assert_eq!(period.start, Utc.with_ymd_and_hms(2024, 2, 29, 16, 0, 0).unwrap());
        assert_eq!(period.end, Utc.with_ymd_and_hms(2024, 3, 1, 16, 0, 0).unwrap());
    }

    #[test]
    fn test_inverted_range_is_swapped() {
        let forward = Period::from_dates(date(2024, 3, 1), date(2024, 3, 3), makassar());
        let inverted = Period::from_dates(date(2024, 3, 3), date(2024, 3, 1), makassar());
        assert_eq!(forward, inverted);
    }

    #[test]
    fn test_last_days_covers_today() {
        let period = Period::last_days(date(2024, 3, 7), 7, makassar());
        assert_eq!(
            period,
            Period::from_dates(date(2024, 3, 1), date(2024, 3, 7), makassar())
        );
    }

    #[test]
    fn test_all_time_contains_everything() {
        let period = Period::all_time();
        assert!(period.contains(Utc::now()));
        assert!(period.contains(local(1999, 1, 1, 0, 0, 0, 0)));
    }

    #[test]
    fn test_fixed_offset_rejects_out_of_range() {
        assert!(fixed_offset(480).is_ok());
        assert!(fixed_offset(-300).is_ok());
        assert!(fixed_offset(24 * 60).is_err());
    }

    #[test]
    fn test_today_in_offset() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 17, 0, 0).unwrap();
        assert_eq!(today_in(makassar(), now), date(2024, 3, 2));
        assert_eq!(today_in(fixed_offset(0).unwrap(), now), date(2024, 3, 1));
    }
}
