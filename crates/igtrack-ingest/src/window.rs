//! Plausibility window for timestamps found in exports.
//!
//! Anything before 2010-01-01 UTC or more than a day past the ingestion clock
//! is treated as missing.

use chrono::{DateTime, Duration, Utc};

/// 2010-01-01T00:00:00Z in milliseconds.
pub const EARLIEST_PLAUSIBLE_MS: i64 = 1_262_304_000_000;

/// How far past `now` a timestamp may lie and still be trusted.
pub const FUTURE_TOLERANCE_HOURS: i64 = 24;

#[must_use]
pub fn is_plausible(ts: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    ts.timestamp_millis() >= EARLIEST_PLAUSIBLE_MS
        && ts <= now + Duration::hours(FUTURE_TOLERANCE_HOURS)
}

/// Converts epoch milliseconds to a timestamp if it falls inside the window.
#[must_use]
pub fn plausible_millis(ms: i64, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms).filter(|ts| is_plausible(*ts, now))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 14, 12, 0, 0).unwrap()
    }

    #[test]
    fn lower_bound_is_inclusive() {
        assert!(plausible_millis(EARLIEST_PLAUSIBLE_MS, now()).is_some());
        assert!(plausible_millis(EARLIEST_PLAUSIBLE_MS - 1, now()).is_none());
    }

    #[test]
    fn accepts_up_to_one_day_ahead() {
        let limit = now() + Duration::hours(24);
        assert!(is_plausible(limit, now()));
        assert!(!is_plausible(limit + Duration::seconds(1), now()));
    }

    #[test]
    fn zero_and_negative_are_rejected() {
        assert!(plausible_millis(0, now()).is_none());
        assert!(plausible_millis(-5_000, now()).is_none());
    }

    #[test]
    fn converts_valid_millis() {
        let ts = plausible_millis(1_700_000_000_000, now()).unwrap();
        assert_eq!(ts.timestamp(), 1_700_000_000);
    }
}
