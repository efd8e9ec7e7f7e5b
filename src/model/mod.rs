pub mod attendance;
pub mod leave_request;
pub mod notification;
pub mod report;
pub mod role;
pub mod schedule;
pub mod setting;
pub mod user;
