pub mod ai;
pub mod attendance;
pub mod leave_request;
pub mod notification;
pub mod report;
pub mod schedule;
pub mod setting;
pub mod user;

#[cfg(test)]
mod tests;

use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::error::{ApiError, ApiResult};

/// Wall-clock time used for attendance; work hours are local.
pub fn local_now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

/// Resolves an optional inclusive date range. A missing end is `today`, a
/// missing start is `default_days` before the end (inclusive).
pub fn date_range(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    default_days: i64,
    today: NaiveDate,
) -> ApiResult<(NaiveDate, NaiveDate)> {
    let end = end.unwrap_or(today);
    let start = match start {
        Some(start) => start,
        None => end
            .checked_sub_signed(Duration::days(default_days.max(1) - 1))
            .ok_or_else(|| ApiError::bad_request("Date range is out of bounds"))?,
    };
    if start > end {
        return Err(ApiError::bad_request("start_date cannot be after end_date"));
    }
    Ok((start, end))
}

#[cfg(test)]
mod range_tests {
    use super::*;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, m, day).unwrap()
    }

    #[test]
    fn defaults_to_trailing_window() {
        assert_eq!(date_range(None, None, 30, d(3, 31)).unwrap(), (d(3, 2), d(3, 31)));
        assert_eq!(date_range(None, Some(d(2, 10)), 10, d(3, 31)).unwrap(), (d(2, 1), d(2, 10)));
    }

    #[test]
    fn explicit_range_is_kept() {
        assert_eq!(
            date_range(Some(d(1, 1)), Some(d(1, 1)), 30, d(3, 31)).unwrap(),
            (d(1, 1), d(1, 1))
        );
    }

    #[test]
    fn inverted_range_is_rejected() {
        assert!(matches!(
            date_range(Some(d(3, 5)), Some(d(3, 1)), 30, d(3, 31)),
            Err(ApiError::BadRequest(_))
        ));
    }

    #[test]
    fn window_before_the_earliest_date_is_rejected() {
        assert!(matches!(
            date_range(None, Some(NaiveDate::MIN), 30, d(3, 31)),
            Err(ApiError::BadRequest(_))
        ));
        assert_eq!(
            date_range(Some(NaiveDate::MIN), Some(NaiveDate::MIN), 30, d(3, 31)).unwrap(),
            (NaiveDate::MIN, NaiveDate::MIN)
        );
    }
}
