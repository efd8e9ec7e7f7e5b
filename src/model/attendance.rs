use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

use crate::{
    model::setting::SettingsSnapshot,
    utils::geo::{Geofence, GeofenceCheck},
};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AttendanceStatus {
    Present,
    Late,
    HalfDay,
    Absent,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct AttendanceRecord {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = 7)]
    pub user_id: u64,
    #[schema(example = "2026-01-05", format = "date", value_type = String)]
    pub date: NaiveDate,
    #[schema(example = "2026-01-05T08:58:00", format = "date-time", value_type = String)]
    pub clock_in: NaiveDateTime,
    #[schema(example = "2026-01-05T17:02:00", format = "date-time", value_type = Option<String>)]
    pub clock_out: Option<NaiveDateTime>,
    pub clock_in_latitude: f64,
    pub clock_in_longitude: f64,
    pub clock_out_latitude: Option<f64>,
    pub clock_out_longitude: Option<f64>,
    pub clock_in_distance_m: f64,
    #[schema(example = "present")]
    pub status: String,
    pub work_minutes: Option<i64>,
    pub notes: Option<String>,
}

pub const ATTENDANCE_COLUMNS: &str = "id, user_id, date, clock_in, clock_out, clock_in_latitude, \
     clock_in_longitude, clock_out_latitude, clock_out_longitude, clock_in_distance_m, status, \
     work_minutes, notes";

impl AttendanceRecord {
    pub fn status(&self) -> Option<AttendanceStatus> {
        self.status.parse().ok()
    }
}

/// Status assigned when the user clocks in.
pub fn clock_in_status(clock_in: NaiveDateTime, settings: &SettingsSnapshot) -> AttendanceStatus {
    let deadline = clock_in.date().and_time(settings.work_start_time)
        + Duration::minutes(settings.late_threshold_minutes as i64);
    if clock_in > deadline {
        AttendanceStatus::Late
    } else {
        AttendanceStatus::Present
    }
}

/// Worked minutes and final status once the user clocks out.
pub fn clock_out_status(
    clock_in: NaiveDateTime,
    clock_out: NaiveDateTime,
    current: AttendanceStatus,
    settings: &SettingsSnapshot,
) -> (i64, AttendanceStatus) {
    let minutes = (clock_out - clock_in).num_minutes().max(0);
    if minutes < settings.half_day_hours as i64 * 60 {
        (minutes, AttendanceStatus::HalfDay)
    } else {
        (minutes, current)
    }
}

/// Why a clock-in or clock-out was refused.
#[derive(Debug, Clone, PartialEq)]
pub enum ClockRejection {
    OutsideGeofence { distance_m: f64, radius_m: f64 },
    AlreadyClockedIn,
    NoOpenClockIn,
}

pub fn ensure_inside(fence: &Geofence, check: GeofenceCheck) -> Result<(), ClockRejection> {
    if check.inside {
        Ok(())
    } else {
        Err(ClockRejection::OutsideGeofence {
            distance_m: check.distance_m,
            radius_m: fence.radius_m,
        })
    }
}

/// One clock-in per user and day.
pub fn ensure_not_clocked_in(today: Option<&AttendanceRecord>) -> Result<(), ClockRejection> {
    match today {
        Some(_) => Err(ClockRejection::AlreadyClockedIn),
        None => Ok(()),
    }
}

/// Today's record, if it is still waiting for a clock-out.
pub fn open_clock_in(today: Option<AttendanceRecord>) -> Result<AttendanceRecord, ClockRejection> {
    today
        .filter(|r| r.clock_out.is_none())
        .ok_or(ClockRejection::NoOpenClockIn)
}

/// Aggregate over a set of attendance records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct AttendanceSummary {
    pub total_days: usize,
    pub present: usize,
    pub late: usize,
    pub half_day: usize,
    pub absent: usize,
    pub total_work_minutes: i64,
    pub average_work_minutes: Option<i64>,
    /// Share of recorded days that were not absences, 0.0 ..= 1.0
    pub attendance_rate: Option<f64>,
    /// Share of attended days that closed as `present`
    pub punctuality_rate: Option<f64>,
}

pub fn summarize(records: &[AttendanceRecord]) -> AttendanceSummary {
    let mut s = AttendanceSummary {
        total_days: records.len(),
        ..Default::default()
    };
    let mut completed = 0i64;

    for r in records {
        match r.status() {
            Some(AttendanceStatus::Present) => s.present += 1,
            Some(AttendanceStatus::Late) => s.late += 1,
            Some(AttendanceStatus::HalfDay) => s.half_day += 1,
            Some(AttendanceStatus::Absent) => s.absent += 1,
            None => {}
        }
        if let Some(m) = r.work_minutes {
            s.total_work_minutes += m;
            completed += 1;
        }
    }

    if completed > 0 {
        s.average_work_minutes = Some(s.total_work_minutes / completed);
    }
    if s.total_days > 0 {
        s.attendance_rate = Some((s.total_days - s.absent) as f64 / s.total_days as f64);
    }
    let attended = s.present + s.late + s.half_day;
    if attended > 0 {
        s.punctuality_rate = Some(s.present as f64 / attended as f64);
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn on_time_and_within_grace_is_present() {
        let s = SettingsSnapshot::default(); // 09:00 + 15 min
        assert_eq!(clock_in_status(at(8, 45), &s), AttendanceStatus::Present);
        assert_eq!(clock_in_status(at(9, 15), &s), AttendanceStatus::Present);
    }

    #[test]
    fn after_grace_is_late() {
        let s = SettingsSnapshot::default();
        assert_eq!(clock_in_status(at(9, 16), &s), AttendanceStatus::Late);
    }

    #[test]
    fn short_day_becomes_half_day() {
        let s = SettingsSnapshot::default(); // 4h
        let (mins, status) = clock_out_status(at(9, 0), at(12, 30), AttendanceStatus::Present, &s);
        assert_eq!(mins, 210);
        assert_eq!(status, AttendanceStatus::HalfDay);
    }

    #[test]
    fn full_day_keeps_clock_in_status() {
        let s = SettingsSnapshot::default();
        let (mins, status) = clock_out_status(at(9, 30), at(17, 30), AttendanceStatus::Late, &s);
        assert_eq!(mins, 480);
        assert_eq!(status, AttendanceStatus::Late);
    }

    fn record(status: AttendanceStatus, minutes: Option<i64>) -> AttendanceRecord {
        AttendanceRecord {
            id: 1,
            user_id: 1,
            date: at(9, 0).date(),
            clock_in: at(9, 0),
            clock_out: None,
            clock_in_latitude: 0.0,
            clock_in_longitude: 0.0,
            clock_out_latitude: None,
            clock_out_longitude: None,
            clock_in_distance_m: 0.0,
            status: status.to_string(),
            work_minutes: minutes,
            notes: None,
        }
    }

    #[test]
    fn summary_counts_and_rates() {
        let recs = vec![
            record(AttendanceStatus::Present, Some(480)),
            record(AttendanceStatus::Late, Some(420)),
            record(AttendanceStatus::Present, None),
            record(AttendanceStatus::Absent, None),
        ];
        let s = summarize(&recs);
        assert_eq!(s.total_days, 4);
        assert_eq!((s.present, s.late, s.half_day, s.absent), (2, 1, 0, 1));
        assert_eq!(s.total_work_minutes, 900);
        assert_eq!(s.average_work_minutes, Some(450));
        assert_eq!(s.attendance_rate, Some(0.75));
        assert!((s.punctuality_rate.unwrap() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn half_days_are_not_punctual() {
        let recs = vec![
            record(AttendanceStatus::Present, Some(480)),
            record(AttendanceStatus::HalfDay, Some(180)),
            record(AttendanceStatus::HalfDay, Some(200)),
            record(AttendanceStatus::Late, Some(450)),
        ];
        let s = summarize(&recs);
        assert_eq!(s.half_day, 2);
        assert_eq!(s.punctuality_rate, Some(0.25));
    }

    fn inside(inside: bool) -> (Geofence, GeofenceCheck) {
        let fence = Geofence {
            center: crate::utils::geo::Coordinates::new(23.8103, 90.4125).unwrap(),
            radius_m: 100.0,
            enabled: true,
        };
        let distance_m = if inside { 40.0 } else { 412.0 };
        (fence, GeofenceCheck { distance_m, inside })
    }

    #[test]
    fn clock_in_outside_the_fence_is_rejected() {
        let (fence, check) = inside(true);
        assert!(ensure_inside(&fence, check).is_ok());

        let (fence, check) = inside(false);
        assert_eq!(
            ensure_inside(&fence, check),
            Err(ClockRejection::OutsideGeofence { distance_m: 412.0, radius_m: 100.0 })
        );
    }

    #[test]
    fn second_clock_in_on_the_same_day_is_rejected() {
        assert!(ensure_not_clocked_in(None).is_ok());
        let existing = record(AttendanceStatus::Present, None);
        assert_eq!(ensure_not_clocked_in(Some(&existing)), Err(ClockRejection::AlreadyClockedIn));

        let finished = AttendanceRecord {
            clock_out: Some(at(17, 0)),
            ..record(AttendanceStatus::Present, Some(480))
        };
        assert_eq!(ensure_not_clocked_in(Some(&finished)), Err(ClockRejection::AlreadyClockedIn));
    }

    #[test]
    fn clock_out_needs_an_open_clock_in() {
        assert_eq!(open_clock_in(None).unwrap_err(), ClockRejection::NoOpenClockIn);

        let open = record(AttendanceStatus::Late, None);
        assert_eq!(open_clock_in(Some(open)).unwrap().id, 1);

        let closed = AttendanceRecord {
            clock_out: Some(at(17, 0)),
            ..record(AttendanceStatus::Present, Some(480))
        };
        assert_eq!(open_clock_in(Some(closed)).unwrap_err(), ClockRejection::NoOpenClockIn);
    }

    #[test]
    fn empty_summary_has_no_rates() {
        let s = summarize(&[]);
        assert_eq!(s, AttendanceSummary::default());
    }

    #[test]
    fn status_strings_are_snake_case() {
        assert_eq!(AttendanceStatus::HalfDay.to_string(), "half_day");
        assert_eq!("half_day".parse::<AttendanceStatus>().unwrap(), AttendanceStatus::HalfDay);
    }
}
