use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use derive_more::Display;
use serde_json::json;

use crate::model::{attendance::ClockRejection, leave_request::LeaveRuleError};

/// Error returned by every handler; rendered as `{"error": "..."}`.
#[derive(Debug, Display)]
pub enum ApiError {
    #[display(fmt = "{}", _0)]
    BadRequest(String),
    #[display(fmt = "{}", _0)]
    Unauthorized(String),
    #[display(fmt = "{}", _0)]
    Forbidden(String),
    #[display(fmt = "{}", _0)]
    NotFound(String),
    #[display(fmt = "{}", _0)]
    Conflict(String),
    #[display(fmt = "Internal Server Error")]
    Internal,
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        ApiError::BadRequest(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        ApiError::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        ApiError::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        ApiError::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        ApiError::Conflict(msg.into())
    }
}

impl std::error::Error for ApiError {}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "error": self.to_string() }))
    }
}

/// true when the database rejected a row because of a unique/foreign key
pub fn is_constraint_violation(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some("23000"),
        _ => false,
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        if is_constraint_violation(&e) {
            return ApiError::Conflict("Record already exists".to_string());
        }
        tracing::error!(error = %e, "Database error");
        ApiError::Internal
    }
}

impl From<jsonwebtoken::errors::Error> for ApiError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        tracing::debug!(error = %e, "Token rejected");
        ApiError::Unauthorized("Invalid or expired token".to_string())
    }
}

impl From<std::io::Error> for ApiError {
    fn from(e: std::io::Error) -> Self {
        tracing::error!(error = %e, "I/O error");
        ApiError::Internal
    }
}

impl From<actix_web::error::BlockingError> for ApiError {
    fn from(e: actix_web::error::BlockingError) -> Self {
        tracing::error!(error = %e, "Blocking task failed");
        ApiError::Internal
    }
}

impl From<LeaveRuleError> for ApiError {
    fn from(e: LeaveRuleError) -> Self {
        match e {
            LeaveRuleError::Invalid(msg) => ApiError::BadRequest(msg),
            LeaveRuleError::Forbidden(msg) => ApiError::Forbidden(msg),
            LeaveRuleError::Overlap => ApiError::conflict(
                "Leave request overlaps an existing pending or approved request",
            ),
        }
    }
}

impl From<ClockRejection> for ApiError {
    fn from(e: ClockRejection) -> Self {
        match e {
            ClockRejection::OutsideGeofence { .. } => ApiError::forbidden("You are outside the allowed area"),
            ClockRejection::AlreadyClockedIn => ApiError::conflict("Already clocked in today"),
            ClockRejection::NoOpenClockIn => ApiError::bad_request("No open clock-in found for today"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[actix_web::test]
    async fn renders_json_error_body() {
        let resp = ApiError::not_found("Leave request not found").error_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let body = to_bytes(resp.into_body()).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["error"], "Leave request not found");
    }

    #[test]
    fn status_codes_follow_variant() {
        assert_eq!(ApiError::bad_request("x").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::unauthorized("x").status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::forbidden("x").status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::conflict("x").status_code(), StatusCode::CONFLICT);
        assert_eq!(ApiError::Internal.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn workflow_rules_map_to_statuses() {
        let overlap: ApiError = LeaveRuleError::Overlap.into();
        assert_eq!(overlap.status_code(), StatusCode::CONFLICT);
        let own: ApiError = LeaveRuleError::Forbidden("x".into()).into();
        assert_eq!(own.status_code(), StatusCode::FORBIDDEN);
        let done: ApiError = LeaveRuleError::Invalid("x".into()).into();
        assert_eq!(done.status_code(), StatusCode::BAD_REQUEST);

        let again: ApiError = ClockRejection::AlreadyClockedIn.into();
        assert_eq!(again.status_code(), StatusCode::CONFLICT);
        let outside: ApiError = ClockRejection::OutsideGeofence { distance_m: 1.0, radius_m: 0.5 }.into();
        assert_eq!(outside.status_code(), StatusCode::FORBIDDEN);
        let closed: ApiError = ClockRejection::NoOpenClockIn.into();
        assert_eq!(closed.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn internal_error_hides_details() {
        let err: ApiError = sqlx::Error::RowNotFound.into();
        assert_eq!(err.to_string(), "Internal Server Error");
    }
}
