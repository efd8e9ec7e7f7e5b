use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use utoipa::ToSchema;

use crate::model::setting::SettingsSnapshot;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr, EnumIter, ToSchema)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LeaveType {
    Annual,
    Sick,
    Personal,
    Unpaid,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LeaveStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct LeaveRequest {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = 7)]
    pub user_id: u64,
    #[schema(example = "sick")]
    pub leave_type: String,
    #[schema(example = "2026-01-01", format = "date", value_type = String)]
    pub start_date: NaiveDate,
    #[schema(example = "2026-01-03", format = "date", value_type = String)]
    pub end_date: NaiveDate,
    #[schema(example = "Flu")]
    pub reason: String,
    #[schema(example = "pending")]
    pub status: String,
    pub reviewed_by: Option<u64>,
    pub review_comment: Option<String>,
    #[schema(format = "date-time", value_type = Option<String>)]
    pub reviewed_at: Option<NaiveDateTime>,
    #[schema(example = "2026-01-01T00:00:00", format = "date-time", value_type = String)]
    pub created_at: NaiveDateTime,
}

pub const LEAVE_COLUMNS: &str = "id, user_id, leave_type, start_date, end_date, reason, status, \
     reviewed_by, review_comment, reviewed_at, created_at";

/// Inclusive number of calendar days covered by a leave range
pub fn leave_days(start: NaiveDate, end: NaiveDate) -> i64 {
    if end < start {
        return 0;
    }
    (end - start).num_days() + 1
}

impl LeaveRequest {
    pub fn days(&self) -> i64 {
        leave_days(self.start_date, self.end_date)
    }

    /// Number of this request's days that fall inside `year`
    pub fn days_in_year(&self, year: i32) -> i64 {
        let (Some(first), Some(last)) = (
            NaiveDate::from_ymd_opt(year, 1, 1),
            NaiveDate::from_ymd_opt(year, 12, 31),
        ) else {
            return 0;
        };
        leave_days(self.start_date.max(first), self.end_date.min(last))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct LeaveBalance {
    #[schema(value_type = String, example = "annual")]
    pub leave_type: LeaveType,
    /// `None` for leave types without a yearly cap
    pub allowance: Option<i64>,
    pub used: i64,
    pub pending: i64,
    pub remaining: Option<i64>,
}

pub fn allowance_for(leave_type: LeaveType, settings: &SettingsSnapshot) -> Option<i64> {
    match leave_type {
        LeaveType::Annual => Some(settings.annual_leave_days as i64),
        LeaveType::Sick => Some(settings.sick_leave_days as i64),
        LeaveType::Personal | LeaveType::Unpaid => None,
    }
}

/// Per-type balance for `year` from a user's requests (any status; only
/// approved days count as used, pending days are reported separately).
pub fn compute_balances(requests: &[LeaveRequest], year: i32, settings: &SettingsSnapshot) -> Vec<LeaveBalance> {
    LeaveType::iter()
        .map(|leave_type| {
            let of_type = requests
                .iter()
                .filter(|r| r.leave_type == leave_type.as_ref());
            let (mut used, mut pending) = (0, 0);
            for r in of_type {
                match r.status.parse::<LeaveStatus>() {
                    Ok(LeaveStatus::Approved) => used += r.days_in_year(year),
                    Ok(LeaveStatus::Pending) => pending += r.days_in_year(year),
                    _ => {}
                }
            }
            let allowance = allowance_for(leave_type, settings);
            LeaveBalance {
                leave_type,
                allowance,
                used,
                pending,
                remaining: allowance.map(|a| (a - used).max(0)),
            }
        })
        .collect()
}

/// Longest range a single request may cover.
pub const MAX_LEAVE_DAYS: i64 = 366;

impl LeaveStatus {
    /// Pending and approved requests hold their dates against new ones.
    pub fn holds_dates(self) -> bool {
        matches!(self, LeaveStatus::Pending | LeaveStatus::Approved)
    }
}

/// A leave workflow step refused before touching the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaveRuleError {
    Invalid(String),
    Forbidden(String),
    Overlap,
}

pub fn validate_range(start: NaiveDate, end: NaiveDate) -> Result<(), LeaveRuleError> {
    if start > end {
        return Err(LeaveRuleError::Invalid("start_date cannot be after end_date".into()));
    }
    if leave_days(start, end) > MAX_LEAVE_DAYS {
        return Err(LeaveRuleError::Invalid(format!(
            "A leave request may cover at most {MAX_LEAVE_DAYS} days"
        )));
    }
    Ok(())
}

/// First pending or approved request sharing a day with `[start, end]`.
pub fn find_overlap(existing: &[LeaveRequest], start: NaiveDate, end: NaiveDate) -> Option<&LeaveRequest> {
    existing.iter().find(|r| {
        r.status.parse::<LeaveStatus>().is_ok_and(LeaveStatus::holds_dates)
            && r.start_date <= end
            && r.end_date >= start
    })
}

/// Only pending requests can be decided, and never by their owner.
pub fn check_review(leave: &LeaveRequest, reviewer_id: u64, decision: LeaveStatus) -> Result<(), LeaveRuleError> {
    if !matches!(decision, LeaveStatus::Approved | LeaveStatus::Rejected) {
        return Err(LeaveRuleError::Invalid(format!("{decision} is not a review decision")));
    }
    if leave.user_id == reviewer_id {
        return Err(LeaveRuleError::Forbidden("You cannot review your own leave request".into()));
    }
    if leave.status != LeaveStatus::Pending.as_ref() {
        return Err(LeaveRuleError::Invalid(format!("Leave request is already {}", leave.status)));
    }
    Ok(())
}

/// Only the requester can cancel, and only while the request is pending.
pub fn check_cancel(leave: &LeaveRequest, caller_id: u64) -> Result<(), LeaveRuleError> {
    if leave.user_id != caller_id {
        return Err(LeaveRuleError::Forbidden(
            "Only the requester can cancel a leave request".into(),
        ));
    }
    if leave.status != LeaveStatus::Pending.as_ref() {
        return Err(LeaveRuleError::Invalid("Only pending requests can be cancelled".into()));
    }
    Ok(())
}
