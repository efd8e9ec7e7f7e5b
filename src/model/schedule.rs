use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Schedule {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = 7)]
    pub user_id: u64,
    #[schema(example = "Morning shift")]
    pub title: String,
    #[schema(example = "2026-01-05", format = "date", value_type = String)]
    pub date: NaiveDate,
    #[schema(example = "09:00:00", value_type = String)]
    pub start_time: NaiveTime,
    #[schema(example = "13:00:00", value_type = String)]
    pub end_time: NaiveTime,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub created_by: u64,
    #[schema(format = "date-time", value_type = String)]
    pub created_at: NaiveDateTime,
}

pub const SCHEDULE_COLUMNS: &str =
    "id, user_id, title, date, start_time, end_time, location, notes, created_by, created_at";

/// Half-open interval overlap: [a_start, a_end) vs [b_start, b_end)
pub fn times_overlap(a_start: NaiveTime, a_end: NaiveTime, b_start: NaiveTime, b_end: NaiveTime) -> bool {
    a_start < b_end && b_start < a_end
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn back_to_back_shifts_do_not_overlap() {
        assert!(!times_overlap(t(9, 0), t(13, 0), t(13, 0), t(17, 0)));
    }

    #[test]
    fn nested_and_partial_shifts_overlap() {
        assert!(times_overlap(t(9, 0), t(17, 0), t(10, 0), t(11, 0)));
        assert!(times_overlap(t(9, 0), t(12, 0), t(11, 30), t(14, 0)));
    }
}
