use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::model::attendance::AttendanceRecord;
use crate::model::leave_request::LeaveRequest;
use crate::model::notification::Notification;
use crate::model::report::Report;
use crate::model::user::UserResponse;

#[derive(Deserialize, ToSchema)]
pub struct RegisterReq {
    #[schema(example = "jane@example.com", format = "email")]
    pub email: String,
    #[schema(example = "s3cret-pass")]
    pub password: String,
    #[schema(example = "Jane Doe")]
    pub full_name: String,
    /// `employee` (default) or `student`
    #[schema(example = "student")]
    pub role: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginReqDto {
    #[schema(example = "jane@example.com", format = "email")]
    pub email: String,
    #[schema(example = "s3cret-pass")]
    pub password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct FaceLoginReq {
    /// 128 values produced by the browser-side face model
    pub descriptor: Vec<f32>,
}

#[derive(Serialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[schema(example = "Bearer")]
    pub token_type: &'static str,
    pub user: UserResponse,
    /// Descriptor distance, only on face login
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: u64,
    /// email
    pub sub: String,
    pub role: u8, // role id
    pub exp: usize,
    pub jti: String,
    pub token_type: TokenType,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TokenType {
    Access,
    Refresh,
}

/// Paginated list envelope shared by every list endpoint.
#[derive(Serialize, ToSchema)]
#[aliases(
    UserPage = Page<UserResponse>,
    AttendancePage = Page<AttendanceRecord>,
    LeavePage = Page<LeaveRequest>,
    NotificationPage = Page<Notification>,
    ReportPage = Page<Report>
)]
pub struct Page<T> {
    pub data: Vec<T>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 20)]
    pub per_page: u32,
    #[schema(example = 1)]
    pub total: i64,
}

pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    pub page: u32,
    pub per_page: u32,
}

impl Paging {
    pub fn new(page: Option<u32>, per_page: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE),
        }
    }

    pub fn offset(&self) -> u64 {
        (self.page as u64 - 1) * self.per_page as u64
    }

    pub fn wrap<T>(self, data: Vec<T>, total: i64) -> Page<T> {
        Page {
            data,
            page: self.page,
            per_page: self.per_page,
            total,
        }
    }
}

/// Message-only response body.
#[derive(Serialize, ToSchema)]
pub struct MessageResponse {
    #[schema(example = "Done")]
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paging_defaults_and_clamps() {
        assert_eq!(Paging::new(None, None), Paging { page: 1, per_page: 20 });
        assert_eq!(Paging::new(Some(0), Some(0)), Paging { page: 1, per_page: 1 });
        assert_eq!(Paging::new(Some(3), Some(500)).per_page, 100);
        assert_eq!(Paging::new(Some(3), Some(25)).offset(), 50);
    }

    #[test]
    fn page_envelope_shape() {
        let page = Paging::new(Some(2), Some(10)).wrap(vec![1, 2], 12);
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json, serde_json::json!({"data": [1, 2], "page": 2, "per_page": 10, "total": 12}));
    }

    #[test]
    fn token_type_serializes_by_name() {
        assert_eq!(serde_json::to_string(&TokenType::Refresh).unwrap(), "\"Refresh\"");
    }
}
