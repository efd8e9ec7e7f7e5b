use actix_web::{HttpResponse, web};
use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use tracing::debug;
use utoipa::{IntoParams, ToSchema};

use crate::{
    ai::{
        anomaly::{self, Anomaly, AnomalyContext},
        history::{ChatEntry, ChatHistory},
        intent::{Intent, classify},
        responder::{ChatContext, respond},
    },
    api::{
        attendance::{record_for_day, records_between},
        leave_request::requests_in_year,
        local_now,
        notification::count_unread,
        schedule::schedules_between,
        setting::load_snapshot,
    },
    auth::auth::AuthUser,
    error::{ApiError, ApiResult},
    model::{
        attendance::{AttendanceRecord, summarize},
        leave_request::compute_balances,
    },
};

pub const MAX_MESSAGE_CHARS: usize = 1000;
const DEFAULT_WINDOW_DAYS: i64 = 30;
const MAX_WINDOW_DAYS: i64 = 365;
const UPCOMING_DAYS: i64 = 7;
const UPCOMING_LIMIT: usize = 5;
const LATEST_NOTIFICATIONS: u32 = 3;

#[derive(Deserialize, ToSchema)]
pub struct ChatReq {
    #[schema(example = "What's my leave balance?")]
    pub message: String,
}

#[derive(Serialize, ToSchema)]
pub struct ChatReply {
    pub reply: String,
    #[schema(value_type = String, example = "leave_balance")]
    pub intent: Intent,
    pub score: u32,
}

#[derive(Deserialize, IntoParams)]
pub struct AnomalyQuery {
    /// Another user's anomalies; admin/manager only
    pub user_id: Option<u64>,
    /// Look-back window in days, 1..=365 (default 30)
    pub days: Option<i64>,
}

#[derive(Deserialize, IntoParams)]
pub struct InsightQuery {
    /// Look-back window in days, 1..=365 (default 30)
    pub days: Option<i64>,
}

#[derive(Serialize, ToSchema)]
pub struct AnomalyReport {
    pub user_id: u64,
    #[schema(value_type = String, format = "date")]
    pub start_date: NaiveDate,
    #[schema(value_type = String, format = "date")]
    pub end_date: NaiveDate,
    pub anomalies: Vec<Anomaly>,
}

#[derive(Serialize, ToSchema)]
pub struct Insights {
    #[schema(value_type = String, format = "date")]
    pub start_date: NaiveDate,
    #[schema(value_type = String, format = "date")]
    pub end_date: NaiveDate,
    pub days_recorded: usize,
    /// Share of attended days that were on time
    pub punctuality_rate: Option<f64>,
    /// Mean clock-in time, HH:MM
    #[schema(example = "09:07")]
    pub average_clock_in: Option<String>,
    pub average_work_minutes: Option<i64>,
    pub anomalies: Vec<Anomaly>,
}

fn validate_message(raw: &str) -> ApiResult<&str> {
    let message = raw.trim();
    if message.is_empty() {
        return Err(ApiError::bad_request("message is required"));
    }
    if message.chars().count() > MAX_MESSAGE_CHARS {
        return Err(ApiError::bad_request(format!(
            "message must be at most {MAX_MESSAGE_CHARS} characters"
        )));
    }
    Ok(message)
}

fn window_days(days: Option<i64>) -> i64 {
    days.unwrap_or(DEFAULT_WINDOW_DAYS).clamp(1, MAX_WINDOW_DAYS)
}

/// Mean of the clock-in times of day.
fn average_clock_in(records: &[AttendanceRecord]) -> Option<NaiveTime> {
    if records.is_empty() {
        return None;
    }
    let total: u64 = records
        .iter()
        .map(|r| u64::from(r.clock_in.time().num_seconds_from_midnight()))
        .sum();
    let mean = total / records.len() as u64;
    NaiveTime::from_num_seconds_from_midnight_opt(u32::try_from(mean).ok()?, 0)
}

fn first_name(full_name: &str) -> String {
    full_name.split_whitespace().next().unwrap_or_default().to_string()
}

/// Loads only what `intent` needs to answer.
async fn build_context(pool: &MySqlPool, user_id: u64, intent: Intent) -> ApiResult<ChatContext> {
    let today = local_now().date();
    let full_name = sqlx::query_scalar::<_, String>("SELECT full_name FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .unwrap_or_default();

    let mut ctx = ChatContext {
        first_name: first_name(&full_name),
        recent_days: DEFAULT_WINDOW_DAYS,
        ..Default::default()
    };

    match intent {
        Intent::ClockStatus => {
            ctx.today_record = record_for_day(pool, user_id, today).await?;
        }
        Intent::AttendanceHistory => {
            let start = today - Duration::days(DEFAULT_WINDOW_DAYS - 1);
            let records = records_between(pool, user_id, start, today).await?;
            ctx.recent_summary = Some(summarize(&records));
        }
        Intent::LeaveBalance => {
            let settings = load_snapshot(pool).await?;
            let requests = requests_in_year(pool, user_id, today.year()).await?;
            ctx.leave_balances = compute_balances(&requests, today.year(), &settings);
        }
        Intent::Schedule => {
            let mut upcoming =
                schedules_between(pool, user_id, today, today + Duration::days(UPCOMING_DAYS)).await?;
            upcoming.truncate(UPCOMING_LIMIT);
            ctx.upcoming = upcoming;
        }
        Intent::Notifications => {
            ctx.unread_notifications = count_unread(pool, user_id).await?;
            ctx.latest_notification_titles = sqlx::query_scalar::<_, String>(
                "SELECT title FROM notifications WHERE user_id = ? AND is_read = 0 \
                 ORDER BY created_at DESC, id DESC LIMIT ?",
            )
            .bind(user_id)
            .bind(LATEST_NOTIFICATIONS)
            .fetch_all(pool)
            .await?;
        }
        _ => {}
    }
    Ok(ctx)
}

/// (window start, today, records in the window, anomalies found)
type Window = (NaiveDate, NaiveDate, Vec<AttendanceRecord>, Vec<Anomaly>);

async fn detect_for(pool: &MySqlPool, user_id: u64, days: i64) -> ApiResult<Window> {
    let today = local_now().date();
    let start = today - Duration::days(days - 1);
    let settings = load_snapshot(pool).await?;
    let records = records_between(pool, user_id, start, today).await?;
    let found = anomaly::detect(
        &records,
        &AnomalyContext {
            today,
            window_start: start,
            geofence_radius_m: settings.geofence_radius_meters,
        },
    );
    Ok((start, today, records, found))
}

/// Chat with the attendance assistant
#[utoipa::path(
    post,
    path = "/api/ai/chat",
    request_body = ChatReq,
    responses(
        (status = 200, description = "Assistant reply", body = ChatReply),
        (status = 400, description = "Empty or overlong message"),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "AI"
)]
pub async fn chat(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    history: web::Data<ChatHistory>,
    payload: web::Json<ChatReq>,
) -> ApiResult<HttpResponse> {
    let message = validate_message(&payload.message)?;
    let classification = classify(message);
    debug!(
        user_id = auth.user_id,
        intent = %classification.intent,
        score = classification.score,
        matched = classification.matched_patterns,
        "Chat intent"
    );

    let ctx = build_context(pool.get_ref(), auth.user_id, classification.intent).await?;
    let reply = respond(classification.intent, &ctx);

    history
        .push(
            auth.user_id,
            [
                ChatEntry::user(message),
                ChatEntry::assistant(reply.clone(), classification.intent),
            ],
        )
        .await;

    Ok(HttpResponse::Ok().json(ChatReply {
        reply,
        intent: classification.intent,
        score: classification.score,
    }))
}

/// Own chat history, oldest first
#[utoipa::path(
    get,
    path = "/api/ai/history",
    responses(
        (status = 200, description = "Recent chat turns", body = [ChatEntry]),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "AI"
)]
pub async fn get_history(auth: AuthUser, history: web::Data<ChatHistory>) -> ApiResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(history.get(auth.user_id).await))
}

/// Clear own chat history
#[utoipa::path(
    delete,
    path = "/api/ai/history",
    responses(
        (status = 204, description = "Cleared"),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "AI"
)]
pub async fn clear_history(auth: AuthUser, history: web::Data<ChatHistory>) -> ApiResult<HttpResponse> {
    history.clear(auth.user_id).await;
    Ok(HttpResponse::NoContent().finish())
}

/// Attendance anomalies for a user
#[utoipa::path(
    get,
    path = "/api/ai/anomalies",
    params(AnomalyQuery),
    responses(
        (status = 200, description = "Detected anomalies, most severe first", body = AnomalyReport),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Another user's anomalies without admin/manager role")
    ),
    security(("bearer_auth" = [])),
    tag = "AI"
)]
pub async fn anomalies(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<AnomalyQuery>,
) -> ApiResult<HttpResponse> {
    let user_id = auth.target_user(query.user_id)?;
    let (start_date, end_date, _, anomalies) =
        detect_for(pool.get_ref(), user_id, window_days(query.days)).await?;

    Ok(HttpResponse::Ok().json(AnomalyReport {
        user_id,
        start_date,
        end_date,
        anomalies,
    }))
}

/// Own attendance insights
#[utoipa::path(
    get,
    path = "/api/ai/insights",
    params(InsightQuery),
    responses(
        (status = 200, description = "Punctuality, averages and anomalies", body = Insights),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "AI"
)]
pub async fn insights(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<InsightQuery>,
) -> ApiResult<HttpResponse> {
    let (start_date, end_date, records, anomalies) =
        detect_for(pool.get_ref(), auth.user_id, window_days(query.days)).await?;
    let summary = summarize(&records);

    Ok(HttpResponse::Ok().json(Insights {
        start_date,
        end_date,
        days_recorded: summary.total_days,
        punctuality_rate: summary.punctuality_rate,
        average_clock_in: average_clock_in(&records).map(|t| t.format("%H:%M").to_string()),
        average_work_minutes: summary.average_work_minutes,
        anomalies,
    }))
}
