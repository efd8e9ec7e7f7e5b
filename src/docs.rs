use crate::ai::anomaly::{Anomaly, AnomalyKind, Severity};
use crate::ai::history::{ChatEntry, ChatRole};
use crate::api::ai::{AnomalyReport, ChatReply, ChatReq, Insights};
use crate::api::attendance::{AttendanceStats, ClockReq, UpdateAttendance};
use crate::api::leave_request::{BalanceResponse, CreateLeave, ReviewLeave};
use crate::api::notification::{CreateNotification, UnreadCount};
use crate::api::report::GenerateReport;
use crate::api::schedule::CreateSchedule;
use crate::api::user::{ChangePassword, CreateUser, EnrollFace};
use crate::model::attendance::{AttendanceRecord, AttendanceSummary};
use crate::model::leave_request::{LeaveBalance, LeaveRequest};
use crate::model::notification::Notification;
use crate::model::report::Report;
use crate::model::schedule::Schedule;
use crate::model::setting::Setting;
use crate::model::user::UserResponse;
use crate::models::{
    AttendancePage, FaceLoginReq, LeavePage, LoginReqDto, MessageResponse, NotificationPage,
    RegisterReq, ReportPage, TokenResponse, UserPage,
};
use utoipa::Modify;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Attendance Hub API",
        version = "1.0.0",
        description = r#"
## Attendance Hub

Location-aware attendance tracking for small organisations.

### Key Features
- **Attendance**: geofenced clock-in/clock-out with late, half-day and work-time tracking
- **Leave**: requests with per-type yearly allowances and an approval workflow
- **Schedules**: shifts per user and day, overlap checked
- **Reports**: attendance and leave exports as PDF or CSV
- **Assistant**: rule-based chat, face login and attendance anomaly checks

### Security
Endpoints under `/api` require a **JWT Bearer** access token.
Administration is limited to the **admin** and **manager** roles.

### Response Format
- JSON responses, errors as `{"error": "..."}`
- `page` / `per_page` pagination on list endpoints
"#,
    ),
    paths(
        crate::auth::handlers::register,
        crate::auth::handlers::login,
        crate::auth::handlers::face_login,
        crate::auth::handlers::refresh_token,
        crate::auth::handlers::logout,
        crate::auth::handlers::me,

        crate::api::user::list_users,
        crate::api::user::get_user,
        crate::api::user::create_user,
        crate::api::user::update_user,
        crate::api::user::delete_user,
        crate::api::user::update_me,
        crate::api::user::change_password,
        crate::api::user::enroll_face,
        crate::api::user::clear_face,

        crate::api::attendance::clock_in,
        crate::api::attendance::clock_out,
        crate::api::attendance::today,
        crate::api::attendance::my_attendance,
        crate::api::attendance::list_attendance,
        crate::api::attendance::attendance_stats,
        crate::api::attendance::update_attendance,

        crate::api::leave_request::leave_list,
        crate::api::leave_request::get_leave,
        crate::api::leave_request::create_leave,
        crate::api::leave_request::approve_leave,
        crate::api::leave_request::reject_leave,
        crate::api::leave_request::cancel_leave,
        crate::api::leave_request::leave_balance,

        crate::api::schedule::list_schedules,
        crate::api::schedule::create_schedule,
        crate::api::schedule::update_schedule,
        crate::api::schedule::delete_schedule,

        crate::api::setting::list_settings,
        crate::api::setting::get_setting,
        crate::api::setting::update_settings,

        crate::api::notification::list_notifications,
        crate::api::notification::unread_count,
        crate::api::notification::mark_read,
        crate::api::notification::mark_all_read,
        crate::api::notification::delete_notification,
        crate::api::notification::create_notification,

        crate::api::report::create_report,
        crate::api::report::list_reports,
        crate::api::report::download_report,
        crate::api::report::delete_report,

        crate::api::ai::chat,
        crate::api::ai::get_history,
        crate::api::ai::clear_history,
        crate::api::ai::anomalies,
        crate::api::ai::insights
    ),
    components(
        schemas(
            RegisterReq,
            LoginReqDto,
            FaceLoginReq,
            TokenResponse,
            MessageResponse,
            UserResponse,
            UserPage,
            CreateUser,
            ChangePassword,
            EnrollFace,
            AttendanceRecord,
            AttendanceSummary,
            AttendancePage,
            AttendanceStats,
            ClockReq,
            UpdateAttendance,
            LeaveRequest,
            LeaveBalance,
            LeavePage,
            CreateLeave,
            ReviewLeave,
            BalanceResponse,
            Schedule,
            CreateSchedule,
            Setting,
            Notification,
            NotificationPage,
            CreateNotification,
            UnreadCount,
            Report,
            ReportPage,
            GenerateReport,
            ChatReq,
            ChatReply,
            ChatEntry,
            ChatRole,
            Anomaly,
            AnomalyKind,
            Severity,
            AnomalyReport,
            Insights
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Registration, login and token APIs"),
        (name = "Users", description = "User management APIs"),
        (name = "Attendance", description = "Attendance management APIs"),
        (name = "Leave", description = "Leave management APIs"),
        (name = "Schedules", description = "Schedule management APIs"),
        (name = "Settings", description = "Organisation settings APIs"),
        (name = "Notifications", description = "In-app notification APIs"),
        (name = "Reports", description = "Report generation APIs"),
        (name = "AI", description = "Assistant and analytics APIs"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_every_scope_and_bearer_scheme() {
        let doc = ApiDoc::openapi();
        let json = serde_json::to_value(&doc).unwrap();
        for path in [
            "/auth/face-login",
            "/api/users/me/face",
            "/api/attendance/clock-in",
            "/api/leave/balance",
            "/api/schedules/{id}",
            "/api/settings/{key}",
            "/api/notifications/read-all",
            "/api/reports/download/{file_name}",
            "/api/ai/insights",
        ] {
            assert!(json["paths"].get(path).is_some(), "missing {path}");
        }
        assert_eq!(
            json["components"]["securitySchemes"]["bearer_auth"]["scheme"],
            "bearer"
        );
    }
}
