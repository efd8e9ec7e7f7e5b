use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

use crate::model::role::Role;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum UserStatus {
    Active,
    Inactive,
    Suspended,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: u64, // BIGINT UNSIGNED
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub role_id: u8,
    pub status: String,
    pub phone: Option<String>,
    pub department: Option<String>,
    pub face_descriptor: Option<String>,
    pub last_login_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

pub const USER_COLUMNS: &str = "id, email, password_hash, full_name, role_id, status, phone, \
     department, face_descriptor, last_login_at, created_at, updated_at";

impl User {
    pub fn role(&self) -> Option<Role> {
        Role::from_id(self.role_id)
    }

    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active.as_ref()
    }
}

/// Public view of a user; never carries the password hash or the descriptor itself
#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    #[schema(example = 7)]
    pub id: u64,
    #[schema(example = "jane@example.com")]
    pub email: String,
    #[schema(example = "Jane Doe")]
    pub full_name: String,
    #[schema(example = "employee", value_type = String)]
    pub role: Role,
    #[schema(example = "active")]
    pub status: String,
    pub phone: Option<String>,
    pub department: Option<String>,
    pub has_face_descriptor: bool,
    #[schema(example = "2026-01-01T09:00:00", format = "date-time", value_type = Option<String>)]
    pub last_login_at: Option<NaiveDateTime>,
    #[schema(example = "2026-01-01T09:00:00", format = "date-time", value_type = String)]
    pub created_at: NaiveDateTime,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            role: u.role().unwrap_or(Role::Employee),
            has_face_descriptor: u.face_descriptor.is_some(),
            email: u.email,
            full_name: u.full_name,
            status: u.status,
            phone: u.phone,
            department: u.department,
            last_login_at: u.last_login_at,
            created_at: u.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> User {
        let ts = chrono::NaiveDate::from_ymd_opt(2026, 1, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        User {
            id: 1,
            email: "a@b.c".into(),
            password_hash: "$argon2id$...".into(),
            full_name: "A".into(),
            role_id: 4,
            status: "active".into(),
            phone: None,
            department: None,
            face_descriptor: Some("[0.1]".into()),
            last_login_at: None,
            created_at: ts,
            updated_at: ts,
        }
    }

    #[test]
    fn response_hides_secrets() {
        let resp = UserResponse::from(sample());
        let json = serde_json::to_value(&resp).unwrap();
        assert!(json.get("password_hash").is_none());
        assert!(json.get("face_descriptor").is_none());
        assert_eq!(json["has_face_descriptor"], true);
        assert_eq!(json["role"], "student");
    }

    #[test]
    fn inactive_user_is_not_active() {
        let mut u = sample();
        assert!(u.is_active());
        u.status = UserStatus::Suspended.to_string();
        assert!(!u.is_active());
    }
}
