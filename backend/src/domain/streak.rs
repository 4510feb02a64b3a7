//! Streak day arithmetic.
//!
//! This is the single authoritative implementation of the streak algorithm.
//! The state manager applies it to its cached counters and both storage
//! backends apply it in `update_streak`, so the rules live in exactly one
//! place.

use chrono::{DateTime, Local, NaiveDate, Utc};

/// Calendar day (local time) a timestamp falls on.
pub fn local_day(at: DateTime<Utc>) -> NaiveDate {
    at.with_timezone(&Local).date_naive()
}

/// Advance a streak for a check-in happening at `now`.
///
/// Rules, at day granularity:
/// - no prior check-in: streak starts at 1
/// - last check-in today: unchanged
/// - last check-in yesterday: streak + 1
/// - last check-in before yesterday: reset to 1
///
/// A last check-in on a *future* day (clock skew) returns `None`: the
/// caller must treat the check-in as a no-op and leave both the streak and
/// `last_check_in` untouched.
pub fn advance(
    last_check_in: Option<DateTime<Utc>>,
    current: u32,
    now: DateTime<Utc>,
) -> Option<u32> {
    let today = local_day(now);
    let last_day = match last_check_in {
        Some(last) => local_day(last),
        None => return Some(1),
    };

    if last_day == today {
        Some(current)
    } else if last_day == today.pred_opt()? {
        Some(current + 1)
    } else if last_day < today {
        Some(1)
    } else {
        None
    }
}

/// Whole calendar days from today until `end` (local days), never negative.
pub fn days_remaining(now: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    (local_day(end) - local_day(now)).num_days().max(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at_noon(year: i32, month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_first_check_in_starts_streak() {
        assert_eq!(advance(None, 0, at_noon(2024, 6, 10)), Some(1));
    }

    #[test]
    fn test_same_day_leaves_streak_unchanged() {
        let morning = at_noon(2024, 6, 10) - Duration::hours(3);
        assert_eq!(advance(Some(morning), 4, at_noon(2024, 6, 10)), Some(4));
    }

    #[test]
    fn test_consecutive_day_extends_streak() {
        let yesterday = at_noon(2024, 6, 9);
        assert_eq!(advance(Some(yesterday), 4, at_noon(2024, 6, 10)), Some(5));
    }

    #[test]
    fn test_skipped_day_resets_streak() {
        let two_days_ago = at_noon(2024, 6, 8);
        assert_eq!(advance(Some(two_days_ago), 9, at_noon(2024, 6, 10)), Some(1));
    }

    #[test]
    fn test_future_check_in_is_a_no_op() {
        let tomorrow = at_noon(2024, 6, 11);
        assert_eq!(advance(Some(tomorrow), 4, at_noon(2024, 6, 10)), None);
    }

    #[test]
    fn test_streak_is_non_decreasing_without_skips() {
        let mut streak = 0;
        let mut last = None;
        for day in 1..=14 {
            let now = at_noon(2024, 6, day);
            let next = advance(last, streak, now).unwrap();
            assert!(next >= streak.min(1));
            assert_eq!(next, if last.is_none() { 1 } else { streak + 1 });
            streak = next;
            last = Some(now);
        }
        assert_eq!(streak, 14);
    }

    #[test]
    fn test_days_remaining_never_negative() {
        let now = at_noon(2024, 6, 10);
        assert_eq!(days_remaining(now, now + Duration::days(3)), 3);
        assert_eq!(days_remaining(now, now), 0);
        assert_eq!(days_remaining(now, now - Duration::days(2)), 0);
    }
}
