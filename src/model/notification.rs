use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum NotificationKind {
    Info,
    Leave,
    Schedule,
    Attendance,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Notification {
    #[schema(example = 1)]
    pub id: u64,
    pub user_id: u64,
    #[schema(example = "leave")]
    pub kind: String,
    #[schema(example = "Leave approved")]
    pub title: String,
    pub message: String,
    pub is_read: bool,
    #[schema(format = "date-time", value_type = String)]
    pub created_at: NaiveDateTime,
}

pub const NOTIFICATION_COLUMNS: &str = "id, user_id, kind, title, message, is_read, created_at";
