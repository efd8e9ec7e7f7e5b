use actix_web::{HttpResponse, ResponseError, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::MySqlPool;
use tracing::{info, warn};
use utoipa::{IntoParams, ToSchema};

use crate::{
    api::{date_range, local_now, setting::load_snapshot},
    auth::auth::AuthUser,
    error::{ApiError, ApiResult},
    model::attendance::{
        ATTENDANCE_COLUMNS, AttendanceRecord, AttendanceStatus, AttendanceSummary, ClockRejection,
        clock_in_status, clock_out_status, ensure_inside, ensure_not_clocked_in, open_clock_in,
        summarize,
    },
    models::{AttendancePage, Paging},
    utils::geo::Coordinates,
};

#[derive(Deserialize, ToSchema)]
pub struct ClockReq {
    #[schema(example = 23.8103)]
    pub latitude: f64,
    #[schema(example = 90.4125)]
    pub longitude: f64,
}

#[derive(Deserialize, IntoParams)]
pub struct RangeQuery {
    /// Inclusive, YYYY-MM-DD; defaults to 30 days before `end_date`
    #[param(value_type = Option<String>, format = "date")]
    pub start_date: Option<NaiveDate>,
    /// Inclusive, YYYY-MM-DD; defaults to today
    #[param(value_type = Option<String>, format = "date")]
    pub end_date: Option<NaiveDate>,
}

#[derive(Deserialize, IntoParams)]
pub struct AttendanceFilter {
    pub user_id: Option<u64>,
    #[param(value_type = Option<String>, example = "late")]
    pub status: Option<AttendanceStatus>,
    #[param(value_type = Option<String>, format = "date")]
    pub start_date: Option<NaiveDate>,
    #[param(value_type = Option<String>, format = "date")]
    pub end_date: Option<NaiveDate>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Deserialize, IntoParams)]
pub struct StatsQuery {
    /// Another user's stats; admin/manager only
    pub user_id: Option<u64>,
    #[param(value_type = Option<String>, format = "date")]
    pub start_date: Option<NaiveDate>,
    #[param(value_type = Option<String>, format = "date")]
    pub end_date: Option<NaiveDate>,
}

#[derive(Serialize, ToSchema)]
pub struct AttendanceStats {
    pub user_id: u64,
    #[schema(value_type = String, format = "date")]
    pub start_date: NaiveDate,
    #[schema(value_type = String, format = "date")]
    pub end_date: NaiveDate,
    pub summary: AttendanceSummary,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateAttendance {
    #[schema(value_type = Option<String>, example = "present")]
    pub status: Option<AttendanceStatus>,
    #[schema(example = "Forgot to clock out, confirmed by manager")]
    pub notes: Option<String>,
}

/// Days shown when no range is given.
const DEFAULT_RANGE_DAYS: i64 = 30;

// Helper enum for typed SQLx binding
enum FilterValue {
    U64(u64),
    Str(String),
    Date(NaiveDate),
}

pub async fn fetch_record(pool: &MySqlPool, id: u64) -> ApiResult<Option<AttendanceRecord>> {
    Ok(sqlx::query_as::<_, AttendanceRecord>(&format!(
        "SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?)
}

pub async fn record_for_day(pool: &MySqlPool, user_id: u64, date: NaiveDate) -> ApiResult<Option<AttendanceRecord>> {
    Ok(sqlx::query_as::<_, AttendanceRecord>(&format!(
        "SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE user_id = ? AND date = ?"
    ))
    .bind(user_id)
    .bind(date)
    .fetch_optional(pool)
    .await?)
}

/// A user's records in `[start, end]`, oldest first.
pub async fn records_between(
    pool: &MySqlPool,
    user_id: u64,
    start: NaiveDate,
    end: NaiveDate,
) -> ApiResult<Vec<AttendanceRecord>> {
    Ok(sqlx::query_as::<_, AttendanceRecord>(&format!(
        "SELECT {ATTENDANCE_COLUMNS} FROM attendance \
         WHERE user_id = ? AND date BETWEEN ? AND ? ORDER BY date"
    ))
    .bind(user_id)
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await?)
}

fn parse_position(req: &ClockReq) -> ApiResult<Coordinates> {
    Coordinates::new(req.latitude, req.longitude).map_err(ApiError::BadRequest)
}

/// Geofence refusals carry the measured distance; the rest are plain errors.
fn rejected(rejection: ClockRejection) -> HttpResponse {
    match rejection {
        ClockRejection::OutsideGeofence { distance_m, radius_m } => HttpResponse::Forbidden().json(json!({
            "error": "You are outside the allowed area",
            "distance_m": distance_m.round(),
            "radius_m": radius_m,
        })),
        other => ApiError::from(other).error_response(),
    }
}

/// Clock-in endpoint
#[utoipa::path(
    post,
    path = "/api/attendance/clock-in",
    request_body = ClockReq,
    responses(
        (status = 201, description = "Clocked in", body = AttendanceRecord),
        (status = 400, description = "Invalid coordinates"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Outside the geofence", body = Object, example = json!({
            "error": "You are outside the allowed area", "distance_m": 412.0, "radius_m": 100.0
        })),
        (status = 409, description = "Already clocked in today")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn clock_in(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<ClockReq>,
) -> ApiResult<HttpResponse> {
    let position = parse_position(&payload)?;
    let settings = load_snapshot(pool.get_ref()).await?;

    let fence = settings.geofence();
    let check = fence.check(position);
    if let Err(rejection) = ensure_inside(&fence, check) {
        warn!(user_id = auth.user_id, distance_m = check.distance_m, "Clock-in outside geofence");
        return Ok(rejected(rejection));
    }

    let now = local_now();
    let today = now.date();
    ensure_not_clocked_in(record_for_day(pool.get_ref(), auth.user_id, today).await?.as_ref())?;

    let status = clock_in_status(now, &settings);
    let result = sqlx::query(
        r#"
        INSERT INTO attendance
            (user_id, date, clock_in, clock_in_latitude, clock_in_longitude, clock_in_distance_m, status)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(auth.user_id)
    .bind(today)
    .bind(now)
    .bind(position.latitude)
    .bind(position.longitude)
    .bind(check.distance_m)
    .bind(status.as_ref())
    .execute(pool.get_ref())
    .await
    .map_err(|e| match ApiError::from(e) {
        // lost a race with a concurrent clock-in
        ApiError::Conflict(_) => ClockRejection::AlreadyClockedIn.into(),
        other => other,
    })?;

    let record = fetch_record(pool.get_ref(), result.last_insert_id())
        .await?
        .ok_or(ApiError::Internal)?;
    info!(user_id = auth.user_id, %status, "Clocked in");
    Ok(HttpResponse::Created().json(record))
}

/// Clock-out endpoint
#[utoipa::path(
    post,
    path = "/api/attendance/clock-out",
    request_body = ClockReq,
    responses(
        (status = 200, description = "Clocked out", body = AttendanceRecord),
        (status = 400, description = "Invalid coordinates or no open clock-in today"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Outside the geofence")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn clock_out(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<ClockReq>,
) -> ApiResult<HttpResponse> {
    let position = parse_position(&payload)?;
    let settings = load_snapshot(pool.get_ref()).await?;

    let fence = settings.geofence();
    let check = fence.check(position);
    if let Err(rejection) = ensure_inside(&fence, check) {
        warn!(user_id = auth.user_id, distance_m = check.distance_m, "Clock-out outside geofence");
        return Ok(rejected(rejection));
    }

    let now = local_now();
    let record = open_clock_in(record_for_day(pool.get_ref(), auth.user_id, now.date()).await?)?;

    let current = record.status().unwrap_or(AttendanceStatus::Present);
    let (work_minutes, status) = clock_out_status(record.clock_in, now, current, &settings);

    let result = sqlx::query(
        r#"
        UPDATE attendance
        SET clock_out = ?, clock_out_latitude = ?, clock_out_longitude = ?, work_minutes = ?, status = ?
        WHERE id = ? AND clock_out IS NULL
        "#,
    )
    .bind(now)
    .bind(position.latitude)
    .bind(position.longitude)
    .bind(work_minutes)
    .bind(status.as_ref())
    .bind(record.id)
    .execute(pool.get_ref())
    .await?;

    if result.rows_affected() == 0 {
        return Err(ClockRejection::NoOpenClockIn.into());
    }

    let record = fetch_record(pool.get_ref(), record.id)
        .await?
        .ok_or(ApiError::Internal)?;
    info!(user_id = auth.user_id, work_minutes, %status, "Clocked out");
    Ok(HttpResponse::Ok().json(record))
}

/// Today's attendance record for the caller
#[utoipa::path(
    get,
    path = "/api/attendance/today",
    responses(
        (status = 200, description = "Today's record, or null before clock-in", body = AttendanceRecord),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn today(auth: AuthUser, pool: web::Data<MySqlPool>) -> ApiResult<HttpResponse> {
    let record = record_for_day(pool.get_ref(), auth.user_id, local_now().date()).await?;
    Ok(HttpResponse::Ok().json(record))
}

/// Caller's own attendance history
#[utoipa::path(
    get,
    path = "/api/attendance/me",
    params(RangeQuery),
    responses(
        (status = 200, description = "Records in range, oldest first", body = [AttendanceRecord]),
        (status = 400, description = "start_date after end_date"),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn my_attendance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<RangeQuery>,
) -> ApiResult<HttpResponse> {
    let (start, end) = date_range(query.start_date, query.end_date, DEFAULT_RANGE_DAYS, local_now().date())?;
    let records = records_between(pool.get_ref(), auth.user_id, start, end).await?;
    Ok(HttpResponse::Ok().json(records))
}

/// All attendance records (admin/manager)
#[utoipa::path(
    get,
    path = "/api/attendance",
    params(AttendanceFilter),
    responses(
        (status = 200, description = "Paginated attendance list", body = AttendancePage),
        (status = 400, description = "start_date after end_date"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn list_attendance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<AttendanceFilter>,
) -> ApiResult<HttpResponse> {
    auth.require_staff()?;

    if let (Some(start), Some(end)) = (query.start_date, query.end_date) {
        if start > end {
            return Err(ApiError::bad_request("start_date cannot be after end_date"));
        }
    }
    let paging = Paging::new(query.page, query.per_page);

    // -------------------------
    // WHERE clause
    // -------------------------
    let mut where_sql = String::from(" WHERE 1=1");
    let mut args: Vec<FilterValue> = Vec::new();

    if let Some(user_id) = query.user_id {
        where_sql.push_str(" AND user_id = ?");
        args.push(FilterValue::U64(user_id));
    }
    if let Some(status) = query.status {
        where_sql.push_str(" AND status = ?");
        args.push(FilterValue::Str(status.to_string()));
    }
    if let Some(start) = query.start_date {
        where_sql.push_str(" AND date >= ?");
        args.push(FilterValue::Date(start));
    }
    if let Some(end) = query.end_date {
        where_sql.push_str(" AND date <= ?");
        args.push(FilterValue::Date(end));
    }

    // -------------------------
    // COUNT query
    // -------------------------
    let count_sql = format!("SELECT COUNT(*) FROM attendance{where_sql}");
    let mut count_q = sqlx::query_scalar::<_, i64>(&count_sql);
    for arg in &args {
        count_q = match arg {
            FilterValue::U64(v) => count_q.bind(*v),
            FilterValue::Str(s) => count_q.bind(s.as_str()),
            FilterValue::Date(d) => count_q.bind(*d),
        };
    }
    let total = count_q.fetch_one(pool.get_ref()).await?;

    // -------------------------
    // DATA query
    // -------------------------
    let data_sql = format!(
        "SELECT {ATTENDANCE_COLUMNS} FROM attendance{where_sql} \
         ORDER BY date DESC, id DESC LIMIT ? OFFSET ?"
    );
    let mut data_q = sqlx::query_as::<_, AttendanceRecord>(&data_sql);
    for arg in args {
        data_q = match arg {
            FilterValue::U64(v) => data_q.bind(v),
            FilterValue::Str(s) => data_q.bind(s),
            FilterValue::Date(d) => data_q.bind(d),
        };
    }
    let data = data_q
        .bind(paging.per_page)
        .bind(paging.offset())
        .fetch_all(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(paging.wrap(data, total)))
}

/// Attendance statistics
#[utoipa::path(
    get,
    path = "/api/attendance/stats",
    params(StatsQuery),
    responses(
        (status = 200, description = "Counts per status, work minutes and rates", body = AttendanceStats),
        (status = 400, description = "start_date after end_date"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Another user's stats without admin/manager role")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn attendance_stats(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<StatsQuery>,
) -> ApiResult<HttpResponse> {
    let user_id = auth.target_user(query.user_id)?;
    let (start, end) = date_range(query.start_date, query.end_date, DEFAULT_RANGE_DAYS, local_now().date())?;
    let records = records_between(pool.get_ref(), user_id, start, end).await?;

    Ok(HttpResponse::Ok().json(AttendanceStats {
        user_id,
        start_date: start,
        end_date: end,
        summary: summarize(&records),
    }))
}

/// Correct an attendance record (admin/manager)
#[utoipa::path(
    put,
    path = "/api/attendance/{id}",
    params(("id" = u64, Path, description = "Attendance record id")),
    request_body = UpdateAttendance,
    responses(
        (status = 200, description = "Updated record", body = AttendanceRecord),
        (status = 400, description = "Nothing to update"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Record not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn update_attendance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<UpdateAttendance>,
) -> ApiResult<HttpResponse> {
    auth.require_staff()?;
    if payload.status.is_none() && payload.notes.is_none() {
        return Err(ApiError::bad_request("Provide status and/or notes"));
    }

    let id = path.into_inner();
    let existing = fetch_record(pool.get_ref(), id)
        .await?
        .ok_or_else(|| ApiError::not_found("Attendance record not found"))?;

    let status = payload
        .status
        .map(|s| s.to_string())
        .unwrap_or(existing.status);
    let notes = match payload.notes.as_deref().map(str::trim) {
        Some("") => None,
        Some(n) => Some(n.to_string()),
        None => existing.notes,
    };

    sqlx::query("UPDATE attendance SET status = ?, notes = ? WHERE id = ?")
        .bind(&status)
        .bind(&notes)
        .bind(id)
        .execute(pool.get_ref())
        .await?;

    let record = fetch_record(pool.get_ref(), id).await?.ok_or(ApiError::Internal)?;
    info!(editor = auth.user_id, record_id = id, %status, "Attendance corrected");
    Ok(HttpResponse::Ok().json(record))
}
