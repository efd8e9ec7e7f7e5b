use actix_web::{HttpResponse, web};
use serde_json::Value;
use sqlx::MySqlPool;
use std::collections::HashMap;
use strum::IntoEnumIterator;
use tracing::info;

use crate::{
    auth::auth::AuthUser,
    error::{ApiError, ApiResult},
    model::setting::{Setting, SettingKey, SettingsSnapshot},
};

/// Typed settings with defaults for anything missing from the table.
pub async fn load_snapshot(pool: &MySqlPool) -> ApiResult<SettingsSnapshot> {
    let rows = sqlx::query_as::<_, (String, String)>("SELECT `key`, value FROM settings")
        .fetch_all(pool)
        .await?;
    Ok(SettingsSnapshot::from_rows(
        rows.iter().map(|(k, v)| (k.as_str(), v.as_str())),
    ))
}

/// Validates every entry before anything is written.
pub fn validate_updates(payload: &Value) -> ApiResult<Vec<(SettingKey, String)>> {
    let obj = payload
        .as_object()
        .ok_or_else(|| ApiError::bad_request("Payload must be a JSON object of key/value pairs"))?;
    if obj.is_empty() {
        return Err(ApiError::bad_request("No settings provided"));
    }

    let mut updates = Vec::with_capacity(obj.len());
    for (raw_key, raw_value) in obj {
        let key = raw_key.parse::<SettingKey>().map_err(|_| {
            let known: Vec<String> = SettingKey::iter().map(|k| k.to_string()).collect();
            ApiError::bad_request(format!(
                "Unknown setting '{raw_key}'. Known: {}",
                known.join(", ")
            ))
        })?;
        let as_text = match raw_value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => return Err(ApiError::bad_request(format!("{key} must be a scalar value"))),
        };
        let value = key.validate(&as_text).map_err(ApiError::BadRequest)?;
        updates.push((key, value));
    }
    Ok(updates)
}

/// List all settings
#[utoipa::path(
    get,
    path = "/api/settings",
    responses(
        (status = 200, description = "All settings rows", body = [Setting]),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Settings"
)]
pub async fn list_settings(_auth: AuthUser, pool: web::Data<MySqlPool>) -> ApiResult<HttpResponse> {
    let rows = sqlx::query_as::<_, Setting>(
        "SELECT `key`, value, description, updated_at FROM settings ORDER BY `key`",
    )
    .fetch_all(pool.get_ref())
    .await?;
    Ok(HttpResponse::Ok().json(rows))
}

/// Get a single setting
#[utoipa::path(
    get,
    path = "/api/settings/{key}",
    params(("key" = String, Path, description = "Setting key, e.g. geofence_radius_meters")),
    responses(
        (status = 200, description = "Setting found", body = Setting),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Setting not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Settings"
)]
pub async fn get_setting(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let key = path.into_inner();
    let row = sqlx::query_as::<_, Setting>(
        "SELECT `key`, value, description, updated_at FROM settings WHERE `key` = ?",
    )
    .bind(&key)
    .fetch_optional(pool.get_ref())
    .await?
    .ok_or_else(|| ApiError::not_found(format!("Setting '{key}' not found")))?;
    Ok(HttpResponse::Ok().json(row))
}

/// Update settings (admin)
#[utoipa::path(
    put,
    path = "/api/settings",
    request_body(
        content = Object,
        description = "Map of setting key to new value",
        example = json!({"geofence_radius_meters": 150, "work_start_time": "08:30"})
    ),
    responses(
        (status = 200, description = "Settings updated; returns the typed snapshot", body = Object),
        (status = 400, description = "Unknown key or invalid value"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Settings"
)]
pub async fn update_settings(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<Value>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;
    let updates = validate_updates(&payload)?;

    let mut tx = pool.begin().await?;
    for (key, value) in &updates {
        sqlx::query(
            r#"
            INSERT INTO settings (`key`, value) VALUES (?, ?)
            ON DUPLICATE KEY UPDATE value = VALUES(value)
            "#,
        )
        .bind(key.as_ref())
        .bind(value)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    let changed: HashMap<&str, &str> = updates
        .iter()
        .map(|(k, v)| (k.as_ref(), v.as_str()))
        .collect();
    info!(user_id = auth.user_id, ?changed, "Settings updated");

    let snapshot = load_snapshot(pool.get_ref()).await?;
    Ok(HttpResponse::Ok().json(snapshot))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numbers_and_bools_are_accepted_as_values() {
        let updates = validate_updates(&json!({
            "geofence_radius_meters": 150,
            "geofence_enabled": false,
            "work_start_time": "8:30"
        }))
        .unwrap();
        assert_eq!(updates.len(), 3);
        assert!(updates.contains(&(SettingKey::GeofenceRadiusMeters, "150".to_string())));
        assert!(updates.contains(&(SettingKey::GeofenceEnabled, "false".to_string())));
        assert!(updates.contains(&(SettingKey::WorkStartTime, "08:30".to_string())));
    }

    #[test]
    fn unknown_keys_and_bad_values_are_rejected() {
        assert!(matches!(
            validate_updates(&json!({"theme": "dark"})),
            Err(ApiError::BadRequest(_))
        ));
        assert!(validate_updates(&json!({"late_threshold_minutes": -1})).is_err());
        assert!(validate_updates(&json!({"company_name": ["a"]})).is_err());
        assert!(validate_updates(&json!({})).is_err());
        assert!(validate_updates(&json!("x")).is_err());
    }
}
