use actix_web::{HttpResponse, web};
use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;
use serde_json::Value;
use sqlx::MySqlPool;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use crate::{
    api::notification::notify_user,
    auth::auth::AuthUser,
    error::{ApiError, ApiResult},
    model::{
        notification::NotificationKind,
        schedule::{SCHEDULE_COLUMNS, Schedule, times_overlap},
    },
    utils::db_utils::{Column, build_update_sql, date, execute_update, optional_text, required_text, time},
};

#[derive(Deserialize, IntoParams)]
pub struct ScheduleQuery {
    /// Another user's schedule; admin/manager only
    pub user_id: Option<u64>,
    #[param(value_type = Option<String>, format = "date")]
    pub start_date: Option<NaiveDate>,
    #[param(value_type = Option<String>, format = "date")]
    pub end_date: Option<NaiveDate>,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateSchedule {
    #[schema(example = 7)]
    pub user_id: u64,
    #[schema(example = "Morning shift")]
    pub title: String,
    #[schema(example = "2026-01-05", format = "date", value_type = String)]
    pub date: NaiveDate,
    #[schema(example = "09:00", value_type = String)]
    pub start_time: String,
    #[schema(example = "13:00", value_type = String)]
    pub end_time: String,
    pub location: Option<String>,
    pub notes: Option<String>,
}

const EDITABLE: &[Column] = &[
    Column { field: "title", column: "title", convert: required_text },
    Column { field: "date", column: "date", convert: date },
    Column { field: "start_time", column: "start_time", convert: time },
    Column { field: "end_time", column: "end_time", convert: time },
    Column { field: "location", column: "location", convert: optional_text },
    Column { field: "notes", column: "notes", convert: optional_text },
];

fn parse_time(field: &str, raw: &str) -> ApiResult<NaiveTime> {
    crate::model::setting::parse_hhmm(raw.trim())
        .ok_or_else(|| ApiError::bad_request(format!("{field} must be a HH:MM time")))
}

fn ensure_ordered(start: NaiveTime, end: NaiveTime) -> ApiResult<()> {
    if start >= end {
        return Err(ApiError::bad_request("start_time must be before end_time"));
    }
    Ok(())
}

pub async fn fetch_schedule(pool: &MySqlPool, id: u64) -> ApiResult<Option<Schedule>> {
    Ok(sqlx::query_as::<_, Schedule>(&format!(
        "SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?)
}

/// A user's entries in `[start, end]`, in calendar order.
pub async fn schedules_between(
    pool: &MySqlPool,
    user_id: u64,
    start: NaiveDate,
    end: NaiveDate,
) -> ApiResult<Vec<Schedule>> {
    Ok(sqlx::query_as::<_, Schedule>(&format!(
        "SELECT {SCHEDULE_COLUMNS} FROM schedules \
         WHERE user_id = ? AND date BETWEEN ? AND ? ORDER BY date, start_time"
    ))
    .bind(user_id)
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await?)
}

/// Fails with 409 when the slot collides with another entry of the same user.
async fn ensure_free(
    pool: &MySqlPool,
    user_id: u64,
    day: NaiveDate,
    start: NaiveTime,
    end: NaiveTime,
    ignore_id: Option<u64>,
) -> ApiResult<()> {
    let clash = schedules_between(pool, user_id, day, day)
        .await?
        .into_iter()
        .filter(|s| Some(s.id) != ignore_id)
        .find(|s| times_overlap(start, end, s.start_time, s.end_time));
    match clash {
        Some(s) => Err(ApiError::conflict(format!(
            "Overlaps '{}' ({}-{})",
            s.title,
            s.start_time.format("%H:%M"),
            s.end_time.format("%H:%M")
        ))),
        None => Ok(()),
    }
}

/// Defaults to the four weeks starting at `start` (or today).
fn schedule_window(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    today: NaiveDate,
) -> ApiResult<(NaiveDate, NaiveDate)> {
    let start = start.unwrap_or(today);
    let end = match end {
        Some(end) => end,
        None => start
            .checked_add_signed(chrono::Duration::days(27))
            .ok_or_else(|| ApiError::bad_request("Date range is out of bounds"))?,
    };
    if start > end {
        return Err(ApiError::bad_request("start_date cannot be after end_date"));
    }
    Ok((start, end))
}

/// List schedule entries
#[utoipa::path(
    get,
    path = "/api/schedules",
    params(ScheduleQuery),
    responses(
        (status = 200, description = "Entries in range", body = [Schedule]),
        (status = 400, description = "start_date after end_date"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Another user's schedule without admin/manager role")
    ),
    security(("bearer_auth" = [])),
    tag = "Schedules"
)]
pub async fn list_schedules(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<ScheduleQuery>,
) -> ApiResult<HttpResponse> {
    let user_id = auth.target_user(query.user_id)?;
    let (start, end) = schedule_window(query.start_date, query.end_date, super::local_now().date())?;
    let entries = schedules_between(pool.get_ref(), user_id, start, end).await?;
    Ok(HttpResponse::Ok().json(entries))
}

/// Create a schedule entry (admin/manager)
#[utoipa::path(
    post,
    path = "/api/schedules",
    request_body = CreateSchedule,
    responses(
        (status = 201, description = "Entry created", body = Schedule),
        (status = 400, description = "Invalid times"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "User not found"),
        (status = 409, description = "Overlaps another entry")
    ),
    security(("bearer_auth" = [])),
    tag = "Schedules"
)]
pub async fn create_schedule(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateSchedule>,
) -> ApiResult<HttpResponse> {
    auth.require_staff()?;

    let title = payload.title.trim();
    if title.is_empty() {
        return Err(ApiError::bad_request("title is required"));
    }
    let start = parse_time("start_time", &payload.start_time)?;
    let end = parse_time("end_time", &payload.end_time)?;
    ensure_ordered(start, end)?;

    let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE id = ?")
        .bind(payload.user_id)
        .fetch_one(pool.get_ref())
        .await?;
    if exists == 0 {
        return Err(ApiError::not_found("User not found"));
    }

    ensure_free(pool.get_ref(), payload.user_id, payload.date, start, end, None).await?;

    let result = sqlx::query(
        r#"
        INSERT INTO schedules (user_id, title, date, start_time, end_time, location, notes, created_by)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.user_id)
    .bind(title)
    .bind(payload.date)
    .bind(start)
    .bind(end)
    .bind(payload.location.as_deref().map(str::trim).filter(|s| !s.is_empty()))
    .bind(payload.notes.as_deref().map(str::trim).filter(|s| !s.is_empty()))
    .bind(auth.user_id)
    .execute(pool.get_ref())
    .await?;

    let entry = fetch_schedule(pool.get_ref(), result.last_insert_id())
        .await?
        .ok_or(ApiError::Internal)?;

    notify_user(
        pool.get_ref(),
        entry.user_id,
        NotificationKind::Schedule,
        "New schedule entry",
        &format!(
            "{} on {} from {} to {}.",
            entry.title,
            entry.date,
            entry.start_time.format("%H:%M"),
            entry.end_time.format("%H:%M")
        ),
    )
    .await;

    info!(creator = auth.user_id, schedule_id = entry.id, user_id = entry.user_id, "Schedule created");
    Ok(HttpResponse::Created().json(entry))
}

/// Update a schedule entry (admin/manager)
#[utoipa::path(
    put,
    path = "/api/schedules/{id}",
    params(("id" = u64, Path, description = "Schedule entry id")),
    request_body(
        content = Object,
        description = "Any of title, date, start_time, end_time, location, notes",
        example = json!({"start_time": "10:00", "end_time": "14:00"})
    ),
    responses(
        (status = 200, description = "Updated entry", body = Schedule),
        (status = 400, description = "Unknown field or invalid value"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Entry not found"),
        (status = 409, description = "Overlaps another entry")
    ),
    security(("bearer_auth" = [])),
    tag = "Schedules"
)]
pub async fn update_schedule(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> ApiResult<HttpResponse> {
    auth.require_staff()?;
    let id = path.into_inner();

    let update = build_update_sql("schedules", &body, EDITABLE, "id", id)?;
    let existing = fetch_schedule(pool.get_ref(), id)
        .await?
        .ok_or_else(|| ApiError::not_found("Schedule entry not found"))?;

    // validate the merged result before writing
    let field_time = |field: &str, fallback: NaiveTime| -> ApiResult<NaiveTime> {
        match body.get(field).and_then(Value::as_str) {
            Some(raw) => parse_time(field, raw),
            None => Ok(fallback),
        }
    };
    let start = field_time("start_time", existing.start_time)?;
    let end = field_time("end_time", existing.end_time)?;
    ensure_ordered(start, end)?;
    let day = match body.get("date").and_then(Value::as_str) {
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map_err(|_| ApiError::bad_request("date must be a YYYY-MM-DD date"))?,
        None => existing.date,
    };
    ensure_free(pool.get_ref(), existing.user_id, day, start, end, Some(id)).await?;

    execute_update(pool.get_ref(), update).await?;

    let entry = fetch_schedule(pool.get_ref(), id).await?.ok_or(ApiError::Internal)?;
    notify_user(
        pool.get_ref(),
        entry.user_id,
        NotificationKind::Schedule,
        "Schedule updated",
        &format!(
            "{} is now on {} from {} to {}.",
            entry.title,
            entry.date,
            entry.start_time.format("%H:%M"),
            entry.end_time.format("%H:%M")
        ),
    )
    .await;

    info!(editor = auth.user_id, schedule_id = id, "Schedule updated");
    Ok(HttpResponse::Ok().json(entry))
}

/// Delete a schedule entry (admin/manager)
#[utoipa::path(
    delete,
    path = "/api/schedules/{id}",
    params(("id" = u64, Path, description = "Schedule entry id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Entry not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Schedules"
)]
pub async fn delete_schedule(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_staff()?;
    let result = sqlx::query("DELETE FROM schedules WHERE id = ?")
        .bind(path.into_inner())
        .execute(pool.get_ref())
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Schedule entry not found"));
    }
    Ok(HttpResponse::NoContent().finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn times_must_be_ordered() {
        let nine = parse_time("start_time", "09:00").unwrap();
        let five = parse_time("end_time", "17:00").unwrap();
        assert!(ensure_ordered(nine, five).is_ok());
        assert!(ensure_ordered(five, nine).is_err());
        assert!(ensure_ordered(nine, nine).is_err());
    }

    #[test]
    fn unparsable_time_names_the_field() {
        let err = parse_time("end_time", "5pm").unwrap_err();
        assert_eq!(err.to_string(), "end_time must be a HH:MM time");
    }

    #[test]
    fn window_defaults_to_four_weeks() {
        let today = NaiveDate::from_ymd_opt(2026, 2, 1).unwrap();
        let (start, end) = schedule_window(None, None, today).unwrap();
        assert_eq!(start, today);
        assert_eq!(end, NaiveDate::from_ymd_opt(2026, 2, 28).unwrap());
    }

    #[test]
    fn window_past_the_latest_date_is_rejected() {
        let today = NaiveDate::from_ymd_opt(2026, 2, 1).unwrap();
        assert!(matches!(
            schedule_window(Some(NaiveDate::MAX), None, today),
            Err(ApiError::BadRequest(_))
        ));
        assert!(schedule_window(Some(NaiveDate::MAX), Some(NaiveDate::MAX), today).is_ok());
    }
}
