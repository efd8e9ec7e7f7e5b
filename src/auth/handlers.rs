use actix_web::{HttpRequest, HttpResponse, web};
use sqlx::MySqlPool;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    ai::face::{EnrolledFace, FaceDescriptor, best_match},
    api::setting::load_snapshot,
    auth::{
        auth::{AuthUser, bearer_token},
        jwt::{generate_access_token, generate_refresh_token, verify_token},
        password::{hash_password, validate_new_password, verify_password},
    },
    config::Config,
    error::{ApiError, ApiResult},
    model::{
        role::Role,
        user::{USER_COLUMNS, User, UserResponse},
    },
    models::{FaceLoginReq, LoginReqDto, RegisterReq, TokenResponse, TokenType},
    utils::{email_cache, email_filter},
};

/// Canonical form of a well-shaped address, as stored in `users.email`.
pub fn validate_email(raw: &str) -> ApiResult<String> {
    email_filter::canonicalize(raw)
        .filter(|email| email.len() <= 255)
        .ok_or_else(|| ApiError::bad_request("A valid email address is required"))
}

/// Role requested at self-registration; only employee and student are allowed.
pub fn registration_role(requested: Option<&str>) -> ApiResult<Role> {
    match requested.map(str::trim).filter(|r| !r.is_empty()) {
        None => Ok(Role::Employee),
        Some(name) => name
            .to_lowercase()
            .parse::<Role>()
            .ok()
            .filter(|r| r.is_self_assignable())
            .ok_or_else(|| ApiError::bad_request("role must be 'employee' or 'student'")),
    }
}

/// true  => email AVAILABLE
/// false => email TAKEN
pub async fn is_email_available(email: &str, pool: &MySqlPool) -> bool {
    let email = email_filter::normalize(email);

    // 1️⃣ Cuckoo filter: fast negative
    if !email_filter::might_exist(&email) {
        return true;
    }

    // 2️⃣ Moka cache: fast positive
    if email_cache::is_taken(&email) {
        return false;
    }

    // 3️⃣ Database fallback
    let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE email = ?")
        .bind(&email)
        .fetch_one(pool)
        .await
        .map(|n| n > 0)
        .unwrap_or(true); // fail-safe

    if exists {
        email_cache::mark_taken(&email).await;
    }
    !exists
}

async fn fetch_by_email(pool: &MySqlPool, email: &str) -> ApiResult<Option<User>> {
    Ok(
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?"))
            .bind(email)
            .fetch_optional(pool)
            .await?,
    )
}

async fn fetch_by_id(pool: &MySqlPool, id: u64) -> ApiResult<Option<User>> {
    Ok(
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
            .bind(id)
            .fetch_optional(pool)
            .await?,
    )
}

/// Issues an access/refresh pair, stores the refresh jti and stamps the login.
async fn start_session(pool: &MySqlPool, config: &Config, user: User, distance: Option<f32>) -> ApiResult<TokenResponse> {
    let role = user.role().ok_or_else(|| {
        error!(user_id = user.id, role_id = user.role_id, "User has unknown role");
        ApiError::Internal
    })?;

    debug!("Generating tokens");
    let access_token =
        generate_access_token(user.id, &user.email, role, &config.jwt_secret, config.access_token_ttl)?;
    let (refresh_token, refresh_claims) =
        generate_refresh_token(user.id, &user.email, role, &config.jwt_secret, config.refresh_token_ttl)?;

    debug!(user_id = user.id, jti = %refresh_claims.jti, "Storing refresh token");
    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (user_id, jti, expires_at)
        VALUES (?, ?, FROM_UNIXTIME(?))
        "#,
    )
    .bind(user.id)
    .bind(&refresh_claims.jti)
    .bind(refresh_claims.exp as i64)
    .execute(pool)
    .await?;

    if let Err(e) = sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = ?")
        .bind(user.id)
        .execute(pool)
        .await
    {
        // not fatal for the login
        error!(error = %e, "Failed to update last_login_at");
    }

    email_cache::mark_taken(&user.email).await;

    Ok(TokenResponse {
        access_token,
        refresh_token,
        token_type: "Bearer",
        user: UserResponse::from(user),
        distance,
    })
}

fn ensure_active(user: &User) -> ApiResult<()> {
    if user.is_active() {
        Ok(())
    } else {
        info!(user_id = user.id, status = %user.status, "Login refused: account not active");
        Err(ApiError::forbidden(format!("Account is {}", user.status)))
    }
}

/// User registration handler
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterReq,
    responses(
        (status = 201, description = "Registered", body = UserResponse),
        (status = 400, description = "Invalid email, password, name or role"),
        (status = 409, description = "Email already registered")
    ),
    tag = "Auth"
)]
#[instrument(name = "auth_register", skip(pool, user), fields(email = %user.email))]
pub async fn register(user: web::Json<RegisterReq>, pool: web::Data<MySqlPool>) -> ApiResult<HttpResponse> {
    let role = registration_role(user.role.as_deref())?;
    let email = validate_email(&user.email)?;
    validate_new_password(&user.password).map_err(ApiError::BadRequest)?;
    let full_name = user.full_name.trim();
    if full_name.is_empty() {
        return Err(ApiError::bad_request("full_name is required"));
    }

    if !is_email_available(&email, pool.get_ref()).await {
        info!("Registration refused: email taken");
        return Err(ApiError::conflict("Email already registered"));
    }

    let password = user.password.clone();
    let hashed = web::block(move || hash_password(&password))
        .await?
        .map_err(|e| {
            error!(error = %e, "Password hashing failed");
            ApiError::Internal
        })?;

    let result = sqlx::query(
        "INSERT INTO users (email, password_hash, full_name, role_id) VALUES (?, ?, ?, ?)",
    )
    .bind(&email)
    .bind(&hashed)
    .bind(full_name)
    .bind(role.id())
    .execute(pool.get_ref())
    .await
    .map_err(|e| match ApiError::from(e) {
        ApiError::Conflict(_) => ApiError::conflict("Email already registered"),
        other => other,
    })?;

    // keep filter and cache in step with the table
    email_filter::insert(&email);
    email_cache::mark_taken(&email).await;

    let created = fetch_by_id(pool.get_ref(), result.last_insert_id())
        .await?
        .ok_or(ApiError::Internal)?;
    info!(user_id = created.id, %role, "User registered");
    Ok(HttpResponse::Created().json(UserResponse::from(created)))
}

/// Password login
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginReqDto,
    responses(
        (status = 200, description = "Token pair and profile", body = TokenResponse),
        (status = 400, description = "Email or password missing"),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Account not active")
    ),
    tag = "Auth"
)]
#[instrument(name = "auth_login", skip(pool, config, user), fields(email = %user.email))]
pub async fn login(
    user: web::Json<LoginReqDto>,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> ApiResult<HttpResponse> {
    info!("Login request received");

    // 1️⃣ Basic validation
    if user.email.trim().is_empty() || user.password.is_empty() {
        info!("Validation failed: empty email or password");
        return Err(ApiError::bad_request("Email and password are required"));
    }

    // 2️⃣ Fetch user
    let email = email_filter::normalize(&user.email);
    let Some(db_user) = fetch_by_email(pool.get_ref(), &email).await? else {
        info!("Invalid credentials: user not found");
        return Err(ApiError::unauthorized("Invalid credentials"));
    };

    // 3️⃣ Verify password
    let password = user.password.clone();
    let hash = db_user.password_hash.clone();
    if let Err(e) = web::block(move || verify_password(&password, &hash)).await? {
        info!(error = %e, "Invalid credentials: password mismatch");
        return Err(ApiError::unauthorized("Invalid credentials"));
    }

    ensure_active(&db_user)?;

    // 4️⃣ Tokens
    let session = start_session(pool.get_ref(), &config, db_user, None).await?;
    info!("Login successful");
    Ok(HttpResponse::Ok().json(session))
}

/// Face login
#[utoipa::path(
    post,
    path = "/auth/face-login",
    request_body = FaceLoginReq,
    responses(
        (status = 200, description = "Token pair, profile and match distance", body = TokenResponse),
        (status = 400, description = "Descriptor is not 128 finite values"),
        (status = 401, description = "No enrolled face close enough")
    ),
    tag = "Auth"
)]
#[instrument(name = "auth_face_login", skip_all)]
pub async fn face_login(
    payload: web::Json<FaceLoginReq>,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> ApiResult<HttpResponse> {
    let probe = FaceDescriptor::new(payload.into_inner().descriptor).map_err(ApiError::BadRequest)?;
    let settings = load_snapshot(pool.get_ref()).await?;

    let rows = sqlx::query_as::<_, (u64, String)>(
        "SELECT id, face_descriptor FROM users WHERE status = 'active' AND face_descriptor IS NOT NULL",
    )
    .fetch_all(pool.get_ref())
    .await?;

    let gallery: Vec<EnrolledFace> = rows
        .into_iter()
        .filter_map(|(user_id, raw)| match FaceDescriptor::from_json(&raw) {
            Ok(descriptor) => Some(EnrolledFace { user_id, descriptor }),
            Err(e) => {
                warn!(user_id, error = %e, "Skipping unreadable face descriptor");
                None
            }
        })
        .collect();
    debug!(candidates = gallery.len(), "Matching face");

    let Some(found) = best_match(&probe, &gallery, settings.face_match_threshold) else {
        info!(candidates = gallery.len(), "Face login: no match");
        return Err(ApiError::unauthorized("Face not recognized"));
    };

    let db_user = fetch_by_id(pool.get_ref(), found.user_id)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Face not recognized"))?;
    ensure_active(&db_user)?;

    let session = start_session(pool.get_ref(), &config, db_user, Some(found.distance)).await?;
    info!(user_id = found.user_id, distance = found.distance, "Face login successful");
    Ok(HttpResponse::Ok().json(session))
}

/// Rotate a refresh token
#[utoipa::path(
    post,
    path = "/auth/refresh",
    responses(
        (status = 200, description = "New token pair", body = TokenResponse),
        (status = 401, description = "Missing, invalid, revoked or non-refresh token")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn refresh_token(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> ApiResult<HttpResponse> {
    let claims = verify_token(bearer_token(&req)?, &config.jwt_secret)?;
    if claims.token_type != TokenType::Refresh {
        return Err(ApiError::unauthorized("Refresh token required"));
    }

    // 🔍 find refresh token in DB
    let record = sqlx::query_as::<_, (u64, bool)>(
        "SELECT id, revoked FROM refresh_tokens WHERE jti = ?",
    )
    .bind(&claims.jti)
    .fetch_optional(pool.get_ref())
    .await?;

    let record_id = match record {
        Some((id, false)) => id,
        Some((_, true)) => {
            warn!(user_id = claims.user_id, "Revoked refresh token presented");
            return Err(ApiError::unauthorized("Refresh token revoked"));
        }
        None => return Err(ApiError::unauthorized("Unknown refresh token")),
    };

    // 🔥 revoke old refresh token
    let revoked = sqlx::query("UPDATE refresh_tokens SET revoked = 1 WHERE id = ? AND revoked = 0")
        .bind(record_id)
        .execute(pool.get_ref())
        .await?;
    if revoked.rows_affected() == 0 {
        // rotated concurrently
        return Err(ApiError::unauthorized("Refresh token revoked"));
    }

    let user = fetch_by_id(pool.get_ref(), claims.user_id)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Account no longer exists"))?;
    ensure_active(&user)?;

    // 🔄 issue new pair with current role and email
    let session = start_session(pool.get_ref(), &config, user, None).await?;
    Ok(HttpResponse::Ok().json(session))
}

/// Revoke a refresh token
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses((status = 204, description = "Logged out (idempotent)")),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn logout(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> ApiResult<HttpResponse> {
    // anything but a valid refresh token is a no-op
    let Ok(token) = bearer_token(&req) else {
        return Ok(HttpResponse::NoContent().finish());
    };
    let Ok(claims) = verify_token(token, &config.jwt_secret) else {
        return Ok(HttpResponse::NoContent().finish());
    };
    if claims.token_type != TokenType::Refresh {
        return Ok(HttpResponse::NoContent().finish());
    }

    sqlx::query("UPDATE refresh_tokens SET revoked = 1 WHERE jti = ?")
        .bind(&claims.jti)
        .execute(pool.get_ref())
        .await?;

    Ok(HttpResponse::NoContent().finish())
}

/// Current user's profile
#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses(
        (status = 200, description = "Profile", body = UserResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Account no longer exists")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn me(auth: AuthUser, pool: web::Data<MySqlPool>) -> ApiResult<HttpResponse> {
    let user = fetch_by_id(pool.get_ref(), auth.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(HttpResponse::Ok().json(UserResponse::from(user)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emails_are_normalised_and_checked() {
        assert_eq!(validate_email("  Jane@Example.COM ").unwrap(), "jane@example.com");
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("jane@").is_err());
        assert!(validate_email("ja ne@example.com").is_err());
        assert_eq!(validate_email("Jane@GoogleMail.com.").unwrap(), "jane@gmail.com");
    }

    #[test]
    fn only_employee_and_student_can_self_register() {
        assert_eq!(registration_role(None).unwrap(), Role::Employee);
        assert_eq!(registration_role(Some("")).unwrap(), Role::Employee);
        assert_eq!(registration_role(Some("Student")).unwrap(), Role::Student);
        assert!(registration_role(Some("admin")).is_err());
        assert!(registration_role(Some("manager")).is_err());
        assert!(registration_role(Some("wizard")).is_err());
    }
}
