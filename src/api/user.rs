use actix_web::{HttpResponse, web};
use serde::Deserialize;
use serde_json::Value;
use sqlx::MySqlPool;
use tracing::{debug, info};
use utoipa::{IntoParams, ToSchema};

use crate::{
    ai::face::FaceDescriptor,
    auth::{
        auth::AuthUser,
        handlers::{is_email_available, validate_email},
        password::{hash_password, validate_new_password, verify_password},
    },
    error::{ApiError, ApiResult},
    model::{
        role::Role,
        user::{USER_COLUMNS, User, UserResponse, UserStatus},
    },
    models::{MessageResponse, Paging, UserPage},
    utils::{
        db_utils::{Column, SqlValue, build_update_sql, execute_update, optional_text, required_text},
        email_cache, email_filter,
    },
};

#[derive(Deserialize, IntoParams)]
pub struct UserQuery {
    #[param(value_type = Option<String>, example = "student")]
    pub role: Option<Role>,
    #[param(value_type = Option<String>, example = "active")]
    pub status: Option<UserStatus>,
    /// Matches name or email
    pub search: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateUser {
    #[schema(example = "john@example.com", format = "email")]
    pub email: String,
    #[schema(example = "initial-pass")]
    pub password: String,
    #[schema(example = "John Doe")]
    pub full_name: String,
    #[schema(value_type = String, example = "manager")]
    pub role: Role,
    pub phone: Option<String>,
    pub department: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct ChangePassword {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct EnrollFace {
    /// 128 values produced by the browser-side face model
    pub descriptor: Vec<f32>,
}

fn role_id(value: &Value) -> Result<SqlValue, String> {
    value
        .as_str()
        .and_then(|s| s.parse::<Role>().ok())
        .map(|r| SqlValue::U64(r.id() as u64))
        .ok_or_else(|| "must be one of admin, manager, employee, student".to_string())
}

fn user_status(value: &Value) -> Result<SqlValue, String> {
    value
        .as_str()
        .and_then(|s| s.parse::<UserStatus>().ok())
        .map(|s| SqlValue::String(s.to_string()))
        .ok_or_else(|| "must be one of active, inactive, suspended".to_string())
}

/// Fields an admin may change on any account.
const ADMIN_EDITABLE: &[Column] = &[
    Column { field: "full_name", column: "full_name", convert: required_text },
    Column { field: "phone", column: "phone", convert: optional_text },
    Column { field: "department", column: "department", convert: optional_text },
    Column { field: "role", column: "role_id", convert: role_id },
    Column { field: "status", column: "status", convert: user_status },
];

/// Fields a user may change on their own profile.
const SELF_EDITABLE: &[Column] = &[
    Column { field: "full_name", column: "full_name", convert: required_text },
    Column { field: "phone", column: "phone", convert: optional_text },
    Column { field: "department", column: "department", convert: optional_text },
];

pub async fn fetch_user(pool: &MySqlPool, id: u64) -> ApiResult<Option<User>> {
    Ok(
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
            .bind(id)
            .fetch_optional(pool)
            .await?,
    )
}

async fn require_user(pool: &MySqlPool, id: u64) -> ApiResult<User> {
    fetch_user(pool, id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))
}

/// List users (admin/manager)
#[utoipa::path(
    get,
    path = "/api/users",
    params(UserQuery),
    responses(
        (status = 200, description = "Paginated user list", body = UserPage),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    tag = "Users",
    security(("bearer_auth" = []))
)]
pub async fn list_users(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<UserQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_staff()?;
    let paging = Paging::new(query.page, query.per_page);

    // ---------- build WHERE clause dynamically ----------
    let mut conditions = Vec::new();
    let mut bindings: Vec<String> = Vec::new();

    if let Some(role) = query.role {
        conditions.push("role_id = ?");
        bindings.push(role.id().to_string());
    }
    if let Some(status) = query.status {
        conditions.push("status = ?");
        bindings.push(status.to_string());
    }
    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        conditions.push("(full_name LIKE ? OR email LIKE ?)");
        let like = format!("%{}%", search.replace('%', "\\%").replace('_', "\\_"));
        bindings.push(like.clone());
        bindings.push(like);
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    // ---------- total count ----------
    let count_sql = format!("SELECT COUNT(*) FROM users {where_clause}");
    debug!(sql = %count_sql, bindings = ?bindings, "Counting users");

    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    for b in &bindings {
        count_query = count_query.bind(b);
    }
    let total = count_query.fetch_one(pool.get_ref()).await?;

    // ---------- data query ----------
    let data_sql = format!("SELECT {USER_COLUMNS} FROM users {where_clause} ORDER BY id DESC LIMIT ? OFFSET ?");
    debug!(sql = %data_sql, page = paging.page, per_page = paging.per_page, "Fetching users");

    let mut data_query = sqlx::query_as::<_, User>(&data_sql);
    for b in &bindings {
        data_query = data_query.bind(b);
    }
    let users = data_query
        .bind(paging.per_page)
        .bind(paging.offset())
        .fetch_all(pool.get_ref())
        .await?;

    let data: Vec<UserResponse> = users.into_iter().map(UserResponse::from).collect();
    Ok(HttpResponse::Ok().json(paging.wrap(data, total)))
}

/// Get user by ID
#[utoipa::path(
    get,
    path = "/api/users/{user_id}",
    params(("user_id" = u64, Path, description = "User ID")),
    responses(
        (status = 200, description = "User found", body = UserResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "User not found")
    ),
    tag = "Users",
    security(("bearer_auth" = []))
)]
pub async fn get_user(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let user_id = path.into_inner();
    auth.ensure_self_or_staff(user_id)?;
    let user = require_user(pool.get_ref(), user_id).await?;
    Ok(HttpResponse::Ok().json(UserResponse::from(user)))
}

/// Create a user with any role (admin)
#[utoipa::path(
    post,
    path = "/api/users",
    request_body = CreateUser,
    responses(
        (status = 201, description = "User created", body = UserResponse),
        (status = 400, description = "Invalid email, password or name"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 409, description = "Email already registered")
    ),
    tag = "Users",
    security(("bearer_auth" = []))
)]
pub async fn create_user(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateUser>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;

    let email = validate_email(&payload.email)?;
    validate_new_password(&payload.password).map_err(ApiError::BadRequest)?;
    let full_name = payload.full_name.trim();
    if full_name.is_empty() {
        return Err(ApiError::bad_request("full_name is required"));
    }
    if !is_email_available(&email, pool.get_ref()).await {
        return Err(ApiError::conflict("Email already registered"));
    }

    let password = payload.password.clone();
    let hashed = web::block(move || hash_password(&password))
        .await?
        .map_err(|e| {
            tracing::error!(error = %e, "Password hashing failed");
            ApiError::Internal
        })?;

    let result = sqlx::query(
        r#"
        INSERT INTO users (email, password_hash, full_name, role_id, phone, department)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&email)
    .bind(&hashed)
    .bind(full_name)
    .bind(payload.role.id())
    .bind(payload.phone.as_deref().map(str::trim).filter(|s| !s.is_empty()))
    .bind(payload.department.as_deref().map(str::trim).filter(|s| !s.is_empty()))
    .execute(pool.get_ref())
    .await
    .map_err(|e| match ApiError::from(e) {
        ApiError::Conflict(_) => ApiError::conflict("Email already registered"),
        other => other,
    })?;

    email_filter::insert(&email);
    email_cache::mark_taken(&email).await;

    let user = require_user(pool.get_ref(), result.last_insert_id()).await?;
    info!(admin = auth.user_id, user_id = user.id, role = %payload.role, "User created");
    Ok(HttpResponse::Created().json(UserResponse::from(user)))
}

/// Update a user (admin)
#[utoipa::path(
    put,
    path = "/api/users/{user_id}",
    params(("user_id" = u64, Path, description = "User ID")),
    request_body(
        content = Object,
        description = "Any of full_name, phone, department, role, status",
        example = json!({"role": "manager", "department": "Physics"})
    ),
    responses(
        (status = 200, description = "Updated user", body = UserResponse),
        (status = 400, description = "Unknown field or invalid value"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "User not found")
    ),
    tag = "Users",
    security(("bearer_auth" = []))
)]
pub async fn update_user(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;
    let user_id = path.into_inner();

    let update = build_update_sql("users", &body, ADMIN_EDITABLE, "id", user_id)?;
    require_user(pool.get_ref(), user_id).await?;
    execute_update(pool.get_ref(), update).await?;

    let user = require_user(pool.get_ref(), user_id).await?;
    info!(admin = auth.user_id, user_id, "User updated");
    Ok(HttpResponse::Ok().json(UserResponse::from(user)))
}

/// Delete a user (admin)
#[utoipa::path(
    delete,
    path = "/api/users/{user_id}",
    params(("user_id" = u64, Path, description = "User ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 400, description = "Cannot delete yourself"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "User not found")
    ),
    tag = "Users",
    security(("bearer_auth" = []))
)]
pub async fn delete_user(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;
    let user_id = path.into_inner();
    if user_id == auth.user_id {
        return Err(ApiError::bad_request("You cannot delete your own account"));
    }

    let user = require_user(pool.get_ref(), user_id).await?;
    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(user_id)
        .execute(pool.get_ref())
        .await?;

    email_filter::remove(&user.email);
    email_cache::forget(&user.email).await;

    info!(admin = auth.user_id, user_id, "User deleted");
    Ok(HttpResponse::NoContent().finish())
}

/// Update own profile
#[utoipa::path(
    put,
    path = "/api/users/me",
    request_body(
        content = Object,
        description = "Any of full_name, phone, department",
        example = json!({"phone": "+8801712345678"})
    ),
    responses(
        (status = 200, description = "Updated profile", body = UserResponse),
        (status = 400, description = "Unknown field or invalid value"),
        (status = 401, description = "Unauthorized")
    ),
    tag = "Users",
    security(("bearer_auth" = []))
)]
pub async fn update_me(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    body: web::Json<Value>,
) -> ApiResult<HttpResponse> {
    let update = build_update_sql("users", &body, SELF_EDITABLE, "id", auth.user_id)?;
    execute_update(pool.get_ref(), update).await?;
    let user = require_user(pool.get_ref(), auth.user_id).await?;
    Ok(HttpResponse::Ok().json(UserResponse::from(user)))
}

/// Change own password
#[utoipa::path(
    put,
    path = "/api/users/me/password",
    request_body = ChangePassword,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "New password too short"),
        (status = 401, description = "Current password is wrong")
    ),
    tag = "Users",
    security(("bearer_auth" = []))
)]
pub async fn change_password(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<ChangePassword>,
) -> ApiResult<HttpResponse> {
    validate_new_password(&payload.new_password).map_err(ApiError::BadRequest)?;
    let user = require_user(pool.get_ref(), auth.user_id).await?;

    let payload = payload.into_inner();
    let hashed = web::block(move || {
        verify_password(&payload.current_password, &user.password_hash)
            .map_err(|_| ApiError::unauthorized("Current password is incorrect"))?;
        hash_password(&payload.new_password).map_err(|e| {
            tracing::error!(error = %e, "Password hashing failed");
            ApiError::Internal
        })
    })
    .await??;

    sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
        .bind(&hashed)
        .bind(auth.user_id)
        .execute(pool.get_ref())
        .await?;

    // existing sessions must log in again
    sqlx::query("UPDATE refresh_tokens SET revoked = 1 WHERE user_id = ?")
        .bind(auth.user_id)
        .execute(pool.get_ref())
        .await?;

    info!(user_id = auth.user_id, "Password changed");
    Ok(HttpResponse::Ok().json(MessageResponse::new("Password changed")))
}

/// Enroll or replace own face descriptor
#[utoipa::path(
    put,
    path = "/api/users/me/face",
    request_body = EnrollFace,
    responses(
        (status = 200, description = "Descriptor stored", body = UserResponse),
        (status = 400, description = "Descriptor is not 128 finite values"),
        (status = 401, description = "Unauthorized")
    ),
    tag = "Users",
    security(("bearer_auth" = []))
)]
pub async fn enroll_face(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<EnrollFace>,
) -> ApiResult<HttpResponse> {
    let descriptor = FaceDescriptor::new(payload.into_inner().descriptor).map_err(ApiError::BadRequest)?;

    sqlx::query("UPDATE users SET face_descriptor = ? WHERE id = ?")
        .bind(descriptor.to_json())
        .bind(auth.user_id)
        .execute(pool.get_ref())
        .await?;

    let user = require_user(pool.get_ref(), auth.user_id).await?;
    info!(user_id = auth.user_id, "Face descriptor enrolled");
    Ok(HttpResponse::Ok().json(UserResponse::from(user)))
}

/// Remove own face descriptor
#[utoipa::path(
    delete,
    path = "/api/users/me/face",
    responses(
        (status = 204, description = "Descriptor removed"),
        (status = 401, description = "Unauthorized")
    ),
    tag = "Users",
    security(("bearer_auth" = []))
)]
pub async fn clear_face(auth: AuthUser, pool: web::Data<MySqlPool>) -> ApiResult<HttpResponse> {
    sqlx::query("UPDATE users SET face_descriptor = NULL WHERE id = ?")
        .bind(auth.user_id)
        .execute(pool.get_ref())
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn role_names_map_to_ids() {
        assert_eq!(role_id(&json!("manager")).unwrap(), SqlValue::U64(2));
        assert!(role_id(&json!("hr")).is_err());
        assert!(role_id(&json!(2)).is_err());
    }

    #[test]
    fn status_is_validated() {
        assert_eq!(user_status(&json!("suspended")).unwrap(), SqlValue::String("suspended".into()));
        assert!(user_status(&json!("banned")).is_err());
    }

    #[test]
    fn self_edit_cannot_touch_role_or_status() {
        assert!(build_update_sql("users", &json!({"role": "admin"}), SELF_EDITABLE, "id", 1).is_err());
        assert!(build_update_sql("users", &json!({"status": "active"}), SELF_EDITABLE, "id", 1).is_err());
        assert!(build_update_sql("users", &json!({"phone": null}), SELF_EDITABLE, "id", 1).is_ok());
    }

    #[test]
    fn admin_role_update_targets_role_id_column() {
        let update = build_update_sql("users", &json!({"role": "student"}), ADMIN_EDITABLE, "id", 9).unwrap();
        assert_eq!(update.sql, "UPDATE users SET role_id = ? WHERE id = ?");
        assert_eq!(update.values, vec![SqlValue::U64(4), SqlValue::U64(9)]);
    }
}
