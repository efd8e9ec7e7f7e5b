use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use tracing::{error, info};
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::auth::AuthUser,
    error::{ApiError, ApiResult},
    model::{
        notification::{NOTIFICATION_COLUMNS, Notification, NotificationKind},
        role::Role,
    },
    models::{MessageResponse, NotificationPage, Paging},
};

#[derive(Deserialize, IntoParams)]
pub struct NotificationQuery {
    /// Only unread notifications
    pub unread_only: Option<bool>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateNotification {
    /// Recipient; omit to broadcast to every active user
    pub user_id: Option<u64>,
    #[schema(example = "Office closed Friday")]
    pub title: String,
    #[schema(example = "The office is closed for maintenance.")]
    pub message: String,
    #[schema(value_type = Option<String>, example = "info")]
    pub kind: Option<NotificationKind>,
}

#[derive(Serialize, ToSchema)]
pub struct UnreadCount {
    pub unread: i64,
}

/// Stores a notification for one user. Failures are logged, never returned:
/// a notification must not fail the request that triggered it.
pub async fn notify_user(pool: &MySqlPool, user_id: u64, kind: NotificationKind, title: &str, message: &str) {
    if let Err(e) = sqlx::query(
        "INSERT INTO notifications (user_id, kind, title, message) VALUES (?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(kind.as_ref())
    .bind(title)
    .bind(message)
    .execute(pool)
    .await
    {
        error!(error = %e, user_id, "Failed to store notification");
    }
}

/// Notifies every active admin and manager.
pub async fn notify_staff(pool: &MySqlPool, kind: NotificationKind, title: &str, message: &str) {
    if let Err(e) = sqlx::query(
        r#"
        INSERT INTO notifications (user_id, kind, title, message)
        SELECT id, ?, ?, ? FROM users WHERE role_id IN (?, ?) AND status = 'active'
        "#,
    )
    .bind(kind.as_ref())
    .bind(title)
    .bind(message)
    .bind(Role::Admin.id())
    .bind(Role::Manager.id())
    .execute(pool)
    .await
    {
        error!(error = %e, "Failed to notify staff");
    }
}

/// List own notifications
#[utoipa::path(
    get,
    path = "/api/notifications",
    params(NotificationQuery),
    responses(
        (status = 200, description = "Paginated notifications, newest first", body = NotificationPage),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Notifications"
)]
pub async fn list_notifications(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<NotificationQuery>,
) -> ApiResult<HttpResponse> {
    let paging = Paging::new(query.page, query.per_page);
    let where_sql = if query.unread_only.unwrap_or(false) {
        "WHERE user_id = ? AND is_read = 0"
    } else {
        "WHERE user_id = ?"
    };

    let total = sqlx::query_scalar::<_, i64>(&format!(
        "SELECT COUNT(*) FROM notifications {where_sql}"
    ))
    .bind(auth.user_id)
    .fetch_one(pool.get_ref())
    .await?;

    let data = sqlx::query_as::<_, Notification>(&format!(
        "SELECT {NOTIFICATION_COLUMNS} FROM notifications {where_sql} \
         ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?"
    ))
    .bind(auth.user_id)
    .bind(paging.per_page)
    .bind(paging.offset())
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(paging.wrap(data, total)))
}

/// Count unread notifications
#[utoipa::path(
    get,
    path = "/api/notifications/unread-count",
    responses(
        (status = 200, description = "Unread count", body = UnreadCount),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Notifications"
)]
pub async fn unread_count(auth: AuthUser, pool: web::Data<MySqlPool>) -> ApiResult<HttpResponse> {
    let unread = count_unread(pool.get_ref(), auth.user_id).await?;
    Ok(HttpResponse::Ok().json(UnreadCount { unread }))
}

pub async fn count_unread(pool: &MySqlPool, user_id: u64) -> ApiResult<i64> {
    Ok(sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM notifications WHERE user_id = ? AND is_read = 0",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?)
}

/// Mark one notification as read
#[utoipa::path(
    put,
    path = "/api/notifications/{id}/read",
    params(("id" = u64, Path, description = "Notification id")),
    responses(
        (status = 200, description = "Marked as read", body = MessageResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Notifications"
)]
pub async fn mark_read(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let id = path.into_inner();
    let exists = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM notifications WHERE id = ? AND user_id = ?",
    )
    .bind(id)
    .bind(auth.user_id)
    .fetch_one(pool.get_ref())
    .await?;
    if exists == 0 {
        return Err(ApiError::not_found("Notification not found"));
    }

    sqlx::query("UPDATE notifications SET is_read = 1 WHERE id = ? AND user_id = ?")
        .bind(id)
        .bind(auth.user_id)
        .execute(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(MessageResponse::new("Notification marked as read")))
}

/// Mark all own notifications as read
#[utoipa::path(
    put,
    path = "/api/notifications/read-all",
    responses(
        (status = 200, description = "Number of notifications updated", body = Object,
         example = json!({"updated": 3})),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Notifications"
)]
pub async fn mark_all_read(auth: AuthUser, pool: web::Data<MySqlPool>) -> ApiResult<HttpResponse> {
    let result = sqlx::query("UPDATE notifications SET is_read = 1 WHERE user_id = ? AND is_read = 0")
        .bind(auth.user_id)
        .execute(pool.get_ref())
        .await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "updated": result.rows_affected() })))
}

/// Delete an own notification
#[utoipa::path(
    delete,
    path = "/api/notifications/{id}",
    params(("id" = u64, Path, description = "Notification id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Notifications"
)]
pub async fn delete_notification(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let result = sqlx::query("DELETE FROM notifications WHERE id = ? AND user_id = ?")
        .bind(path.into_inner())
        .bind(auth.user_id)
        .execute(pool.get_ref())
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Notification not found"));
    }
    Ok(HttpResponse::NoContent().finish())
}

/// Send a notification (admin/manager)
#[utoipa::path(
    post,
    path = "/api/notifications",
    request_body = CreateNotification,
    responses(
        (status = 201, description = "Number of notifications created", body = Object,
         example = json!({"created": 12})),
        (status = 400, description = "Empty title or message"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Recipient not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Notifications"
)]
pub async fn create_notification(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateNotification>,
) -> ApiResult<HttpResponse> {
    auth.require_staff()?;

    let title = payload.title.trim();
    let message = payload.message.trim();
    if title.is_empty() || message.is_empty() {
        return Err(ApiError::bad_request("title and message are required"));
    }
    let kind = payload.kind.unwrap_or(NotificationKind::Info);

    let created = match payload.user_id {
        Some(user_id) => {
            let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE id = ?")
                .bind(user_id)
                .fetch_one(pool.get_ref())
                .await?;
            if exists == 0 {
                return Err(ApiError::not_found("User not found"));
            }
            sqlx::query("INSERT INTO notifications (user_id, kind, title, message) VALUES (?, ?, ?, ?)")
                .bind(user_id)
                .bind(kind.as_ref())
                .bind(title)
                .bind(message)
                .execute(pool.get_ref())
                .await?
                .rows_affected()
        }
        None => sqlx::query(
            r#"
            INSERT INTO notifications (user_id, kind, title, message)
            SELECT id, ?, ?, ? FROM users WHERE status = 'active'
            "#,
        )
        .bind(kind.as_ref())
        .bind(title)
        .bind(message)
        .execute(pool.get_ref())
        .await?
        .rows_affected(),
    };

    info!(sender = auth.user_id, created, broadcast = payload.user_id.is_none(), "Notification sent");
    Ok(HttpResponse::Created().json(serde_json::json!({ "created": created })))
}
