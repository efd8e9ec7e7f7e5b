use chrono::{NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use utoipa::ToSchema;

use crate::{
    ai::face::DEFAULT_MATCH_THRESHOLD,
    utils::geo::{Coordinates, Geofence},
};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Setting {
    #[schema(example = "geofence_radius_meters")]
    pub key: String,
    #[schema(example = "100")]
    pub value: String,
    pub description: Option<String>,
    #[schema(format = "date-time", value_type = String)]
    pub updated_at: NaiveDateTime,
}

/// Every key the application understands; anything else is rejected on update.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Display, EnumString, AsRefStr, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum SettingKey {
    CompanyName,
    OfficeLatitude,
    OfficeLongitude,
    GeofenceRadiusMeters,
    GeofenceEnabled,
    WorkStartTime,
    WorkEndTime,
    LateThresholdMinutes,
    HalfDayHours,
    AnnualLeaveDays,
    SickLeaveDays,
    FaceMatchThreshold,
}

impl SettingKey {
    /// Normalises a raw value for storage, or explains why it is not acceptable.
    pub fn validate(self, raw: &str) -> Result<String, String> {
        let raw = raw.trim();
        match self {
            SettingKey::CompanyName => {
                if raw.is_empty() || raw.len() > 255 {
                    Err("company_name must be 1-255 characters".to_string())
                } else {
                    Ok(raw.to_string())
                }
            }
            SettingKey::OfficeLatitude => parse_ranged_f64(raw, -90.0, 90.0, self),
            SettingKey::OfficeLongitude => parse_ranged_f64(raw, -180.0, 180.0, self),
            SettingKey::GeofenceRadiusMeters => parse_ranged_f64(raw, 1.0, 100_000.0, self),
            SettingKey::FaceMatchThreshold => parse_ranged_f64(raw, 0.01, 2.0, self),
            SettingKey::GeofenceEnabled => raw
                .parse::<bool>()
                .map(|b| b.to_string())
                .map_err(|_| format!("{self} must be true or false")),
            SettingKey::WorkStartTime | SettingKey::WorkEndTime => parse_hhmm(raw)
                .map(|t| t.format("%H:%M").to_string())
                .ok_or_else(|| format!("{self} must be HH:MM")),
            SettingKey::LateThresholdMinutes => parse_ranged_u32(raw, 0, 720, self),
            SettingKey::HalfDayHours => parse_ranged_u32(raw, 1, 24, self),
            SettingKey::AnnualLeaveDays | SettingKey::SickLeaveDays => {
                parse_ranged_u32(raw, 0, 366, self)
            }
        }
    }
}

fn parse_ranged_f64(raw: &str, min: f64, max: f64, key: SettingKey) -> Result<String, String> {
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() && (min..=max).contains(&v) => Ok(v.to_string()),
        _ => Err(format!("{key} must be a number between {min} and {max}")),
    }
}

fn parse_ranged_u32(raw: &str, min: u32, max: u32, key: SettingKey) -> Result<String, String> {
    match raw.parse::<u32>() {
        Ok(v) if (min..=max).contains(&v) => Ok(v.to_string()),
        _ => Err(format!("{key} must be a whole number between {min} and {max}")),
    }
}

pub fn parse_hhmm(raw: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .ok()
}

/// Typed view over the settings table. Absent or malformed rows fall back to defaults.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettingsSnapshot {
    pub company_name: String,
    pub office_latitude: f64,
    pub office_longitude: f64,
    pub geofence_radius_meters: f64,
    pub geofence_enabled: bool,
    pub work_start_time: NaiveTime,
    pub work_end_time: NaiveTime,
    pub late_threshold_minutes: u32,
    pub half_day_hours: u32,
    pub annual_leave_days: u32,
    pub sick_leave_days: u32,
    pub face_match_threshold: f32,
}

impl Default for SettingsSnapshot {
    fn default() -> Self {
        Self {
            company_name: "Attendance Hub".to_string(),
            office_latitude: 0.0,
            office_longitude: 0.0,
            geofence_radius_meters: 100.0,
            geofence_enabled: true,
            work_start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default(),
            work_end_time: NaiveTime::from_hms_opt(17, 0, 0).unwrap_or_default(),
            late_threshold_minutes: 15,
            half_day_hours: 4,
            annual_leave_days: 20,
            sick_leave_days: 10,
            face_match_threshold: DEFAULT_MATCH_THRESHOLD,
        }
    }
}

impl SettingsSnapshot {
    pub fn from_rows<'a, I>(rows: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut s = Self::default();

        for (key, value) in rows {
            let Ok(key) = key.parse::<SettingKey>() else {
                continue;
            };
            let Ok(value) = key.validate(value) else {
                tracing::warn!(key = %key, value, "Ignoring malformed setting");
                continue;
            };

            match key {
                SettingKey::CompanyName => s.company_name = value,
                SettingKey::OfficeLatitude => set_parsed(&mut s.office_latitude, &value),
                SettingKey::OfficeLongitude => set_parsed(&mut s.office_longitude, &value),
                SettingKey::GeofenceRadiusMeters => {
                    set_parsed(&mut s.geofence_radius_meters, &value)
                }
                SettingKey::GeofenceEnabled => set_parsed(&mut s.geofence_enabled, &value),
                SettingKey::WorkStartTime => {
                    if let Some(t) = parse_hhmm(&value) {
                        s.work_start_time = t;
                    }
                }
                SettingKey::WorkEndTime => {
                    if let Some(t) = parse_hhmm(&value) {
                        s.work_end_time = t;
                    }
                }
                SettingKey::LateThresholdMinutes => {
                    set_parsed(&mut s.late_threshold_minutes, &value)
                }
                SettingKey::HalfDayHours => set_parsed(&mut s.half_day_hours, &value),
                SettingKey::AnnualLeaveDays => set_parsed(&mut s.annual_leave_days, &value),
                SettingKey::SickLeaveDays => set_parsed(&mut s.sick_leave_days, &value),
                SettingKey::FaceMatchThreshold => set_parsed(&mut s.face_match_threshold, &value),
            }
        }

        s
    }

    pub fn geofence(&self) -> Geofence {
        Geofence {
            center: Coordinates {
                latitude: self.office_latitude,
                longitude: self.office_longitude,
            },
            radius_m: self.geofence_radius_meters,
            enabled: self.geofence_enabled,
        }
    }
}

fn set_parsed<T: std::str::FromStr>(slot: &mut T, value: &str) {
    if let Ok(v) = value.parse() {
        *slot = v;
    }
}
