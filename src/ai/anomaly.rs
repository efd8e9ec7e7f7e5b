//! Threshold checks over a user's attendance window.

use chrono::{Datelike, NaiveDate, Weekday};
use serde::Serialize;
use strum_macros::{AsRefStr, Display};
use utoipa::ToSchema;

use crate::model::attendance::{AttendanceRecord, AttendanceStatus};

pub const LATE_COUNT_THRESHOLD: usize = 3;
pub const LONG_SHIFT_MINUTES: i64 = 12 * 60;
pub const LOCATION_OUTLIER_FACTOR: f64 = 2.0;
pub const LOW_ATTENDANCE_RATE: f64 = 0.8;
pub const MIN_WORKING_DAYS_FOR_RATE: usize = 5;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Display, AsRefStr, ToSchema)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AnomalyKind {
    FrequentLateness,
    MissingClockOut,
    LongShift,
    LocationOutlier,
    LowAttendance,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, PartialOrd, Ord, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Anomaly {
    pub kind: AnomalyKind,
    pub severity: Severity,
    pub message: String,
    #[schema(value_type = Option<String>, format = "date")]
    pub date: Option<NaiveDate>,
}

/// Inputs that do not come from the records themselves.
#[derive(Debug, Clone, Copy)]
pub struct AnomalyContext {
    pub today: NaiveDate,
    pub window_start: NaiveDate,
    pub geofence_radius_m: f64,
}

/// Monday to Friday in `[start, end]`.
pub fn working_days(start: NaiveDate, end: NaiveDate) -> usize {
    if end < start {
        return 0;
    }
    start
        .iter_days()
        .take_while(|d| *d <= end)
        .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
        .count()
}

pub fn detect(records: &[AttendanceRecord], ctx: &AnomalyContext) -> Vec<Anomaly> {
    let mut found = Vec::new();

    let late = records
        .iter()
        .filter(|r| r.status() == Some(AttendanceStatus::Late))
        .count();
    if late >= LATE_COUNT_THRESHOLD {
        found.push(Anomaly {
            kind: AnomalyKind::FrequentLateness,
            severity: if late >= LATE_COUNT_THRESHOLD * 2 {
                Severity::High
            } else {
                Severity::Medium
            },
            message: format!("Late {late} times since {}", ctx.window_start),
            date: None,
        });
    }

    for r in records {
        if r.clock_out.is_none() && r.date < ctx.today {
            found.push(Anomaly {
                kind: AnomalyKind::MissingClockOut,
                severity: Severity::Medium,
                message: format!("No clock-out recorded on {}", r.date),
                date: Some(r.date),
            });
        }

        if let Some(minutes) = r.work_minutes.filter(|m| *m > LONG_SHIFT_MINUTES) {
            found.push(Anomaly {
                kind: AnomalyKind::LongShift,
                severity: Severity::Low,
                message: format!(
                    "Worked {}h{:02} on {}",
                    minutes / 60,
                    minutes % 60,
                    r.date
                ),
                date: Some(r.date),
            });
        }

        if r.clock_in_distance_m > ctx.geofence_radius_m * LOCATION_OUTLIER_FACTOR {
            found.push(Anomaly {
                kind: AnomalyKind::LocationOutlier,
                severity: Severity::High,
                message: format!(
                    "Clocked in {:.0} m from the office on {}",
                    r.clock_in_distance_m, r.date
                ),
                date: Some(r.date),
            });
        }
    }

    // today is still in progress
    let elapsed_end = ctx.today.pred_opt().unwrap_or(ctx.today);
    let expected = working_days(ctx.window_start, elapsed_end);
    if expected >= MIN_WORKING_DAYS_FOR_RATE {
        let attended = records
            .iter()
            .filter(|r| r.date >= ctx.window_start && r.date <= elapsed_end)
            .filter(|r| r.status() != Some(AttendanceStatus::Absent))
            .count();
        let rate = attended as f64 / expected as f64;
        if rate < LOW_ATTENDANCE_RATE {
            found.push(Anomaly {
                kind: AnomalyKind::LowAttendance,
                severity: if rate < LOW_ATTENDANCE_RATE / 2.0 {
                    Severity::High
                } else {
                    Severity::Medium
                },
                message: format!(
                    "Attended {attended} of {expected} working days ({:.0}%)",
                    rate * 100.0
                ),
                date: None,
            });
        }
    }

    found.sort_by(|a, b| b.severity.cmp(&a.severity));
    found
}
