use crate::ai::intent::Intent;
use crate::model::attendance::{AttendanceRecord, AttendanceSummary};
use crate::model::leave_request::LeaveBalance;
use crate::model::schedule::Schedule;

/// Data the assistant may quote back to the user. Handlers only load what the
/// detected intent needs, so most fields are usually empty.
#[derive(Debug, Default)]
pub struct ChatContext {
    pub first_name: String,
    pub today_record: Option<AttendanceRecord>,
    pub recent_summary: Option<AttendanceSummary>,
    pub recent_days: i64,
    pub leave_balances: Vec<LeaveBalance>,
    pub upcoming: Vec<Schedule>,
    pub unread_notifications: i64,
    pub latest_notification_titles: Vec<String>,
}

pub const HELP_TEXT: &str = "I can tell you whether you've clocked in today, summarise your recent \
attendance, show your leave balance, list your upcoming shifts and check your notifications. \
Try \"What's my leave balance?\" or \"Show my schedule for this week\".";

pub fn respond(intent: Intent, ctx: &ChatContext) -> String {
    let name = if ctx.first_name.is_empty() {
        "there"
    } else {
        ctx.first_name.as_str()
    };

    match intent {
        Intent::Greeting => format!("Hello {name}! How can I help with your attendance today?"),
        Intent::ClockStatus => clock_status(ctx),
        Intent::AttendanceHistory => attendance_history(ctx),
        Intent::LeaveBalance => leave_balance(ctx),
        Intent::LeaveRequest => "To request leave, open Leave > New request, pick the leave type \
and dates, and add a short reason. Your manager will be notified and you'll get a notification \
once it's reviewed."
            .to_string(),
        Intent::Schedule => schedule(ctx),
        Intent::Notifications => notifications(ctx),
        Intent::Help => HELP_TEXT.to_string(),
        Intent::Thanks => format!("You're welcome, {name}!"),
        Intent::Goodbye => format!("Goodbye {name}, have a great day!"),
        Intent::Unknown => format!("Sorry, I didn't quite get that. {HELP_TEXT}"),
    }
}

fn clock_status(ctx: &ChatContext) -> String {
    match &ctx.today_record {
        None => "You haven't clocked in today yet.".to_string(),
        Some(r) => match r.clock_out {
            None => format!(
                "You clocked in at {} ({}) and haven't clocked out yet.",
                r.clock_in.format("%H:%M"),
                r.status.replace('_', " ")
            ),
            Some(out) => format!(
                "You clocked in at {} and out at {} today, {}h{:02} worked.",
                r.clock_in.format("%H:%M"),
                out.format("%H:%M"),
                r.work_minutes.unwrap_or(0) / 60,
                r.work_minutes.unwrap_or(0) % 60
            ),
        },
    }
}

fn attendance_history(ctx: &ChatContext) -> String {
    match &ctx.recent_summary {
        Some(s) if s.total_days > 0 => {
            let mut reply = format!(
                "In the last {} days you have {} attendance records: {} on time, {} late, {} half days and {} absences.",
                ctx.recent_days, s.total_days, s.present, s.late, s.half_day, s.absent
            );
            if let Some(avg) = s.average_work_minutes {
                reply.push_str(&format!(" Average day: {}h{:02}.", avg / 60, avg % 60));
            }
            reply
        }
        _ => format!("I couldn't find any attendance records in the last {} days.", ctx.recent_days),
    }
}

fn leave_balance(ctx: &ChatContext) -> String {
    if ctx.leave_balances.is_empty() {
        return "I couldn't load your leave balance right now.".to_string();
    }
    let parts: Vec<String> = ctx
        .leave_balances
        .iter()
        .filter_map(|b| {
            b.remaining.map(|remaining| {
                format!("{} {remaining} of {} days left", b.leave_type, b.allowance.unwrap_or(0))
            })
        })
        .collect();
    format!("Your leave balance: {}.", parts.join(", "))
}

fn schedule(ctx: &ChatContext) -> String {
    if ctx.upcoming.is_empty() {
        return "You have no upcoming shifts scheduled.".to_string();
    }
    let lines: Vec<String> = ctx
        .upcoming
        .iter()
        .map(|s| {
            format!(
                "{} {} {}-{}",
                s.date.format("%a %d %b"),
                s.title,
                s.start_time.format("%H:%M"),
                s.end_time.format("%H:%M")
            )
        })
        .collect();
    format!("Your upcoming schedule: {}.", lines.join("; "))
}

fn notifications(ctx: &ChatContext) -> String {
    match ctx.unread_notifications {
        0 => "You're all caught up, no unread notifications.".to_string(),
        n => {
            let mut reply = format!(
                "You have {n} unread notification{}.",
                if n == 1 { "" } else { "s" }
            );
            if !ctx.latest_notification_titles.is_empty() {
                reply.push_str(&format!(" Latest: {}.", ctx.latest_notification_titles.join(", ")));
            }
            reply
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::leave_request::LeaveType;
    use chrono::{NaiveDate, NaiveTime};

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    fn open_record() -> AttendanceRecord {
        AttendanceRecord {
            id: 1,
            user_id: 1,
            date: day(),
            clock_in: day().and_hms_opt(9, 20, 0).unwrap(),
            clock_out: None,
            clock_in_latitude: 0.0,
            clock_in_longitude: 0.0,
            clock_out_latitude: None,
            clock_out_longitude: None,
            clock_in_distance_m: 5.0,
            status: "late".into(),
            work_minutes: None,
            notes: None,
        }
    }

    #[test]
    fn greeting_uses_first_name() {
        let ctx = ChatContext {
            first_name: "Jane".into(),
            ..Default::default()
        };
        assert!(respond(Intent::Greeting, &ctx).starts_with("Hello Jane!"));
        assert!(respond(Intent::Thanks, &ChatContext::default()).contains("there"));
    }

    #[test]
    fn clock_status_reflects_todays_record() {
        let mut ctx = ChatContext::default();
        assert_eq!(respond(Intent::ClockStatus, &ctx), "You haven't clocked in today yet.");

        ctx.today_record = Some(open_record());
        let reply = respond(Intent::ClockStatus, &ctx);
        assert!(reply.contains("09:20"));
        assert!(reply.contains("late"));

        let mut closed = open_record();
        closed.clock_out = Some(day().and_hms_opt(17, 50, 0).unwrap());
        closed.work_minutes = Some(510);
        ctx.today_record = Some(closed);
        assert!(respond(Intent::ClockStatus, &ctx).contains("8h30 worked"));
    }

    #[test]
    fn leave_balance_lists_capped_types_only() {
        let ctx = ChatContext {
            leave_balances: vec![
                LeaveBalance {
                    leave_type: LeaveType::Annual,
                    allowance: Some(20),
                    used: 5,
                    pending: 0,
                    remaining: Some(15),
                },
                LeaveBalance {
                    leave_type: LeaveType::Unpaid,
                    allowance: None,
                    used: 2,
                    pending: 0,
                    remaining: None,
                },
            ],
            ..Default::default()
        };
        assert_eq!(
            respond(Intent::LeaveBalance, &ctx),
            "Your leave balance: annual 15 of 20 days left."
        );
    }

    #[test]
    fn schedule_lists_upcoming_shifts() {
        let ctx = ChatContext {
            upcoming: vec![Schedule {
                id: 1,
                user_id: 1,
                title: "Lab".into(),
                date: day(),
                start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                end_time: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
                location: None,
                notes: None,
                created_by: 2,
                created_at: day().and_hms_opt(0, 0, 0).unwrap(),
            }],
            ..Default::default()
        };
        assert_eq!(
            respond(Intent::Schedule, &ctx),
            "Your upcoming schedule: Mon 02 Mar Lab 09:00-12:00."
        );
    }

    #[test]
    fn notification_count_is_pluralised() {
        let mut ctx = ChatContext {
            unread_notifications: 1,
            ..Default::default()
        };
        assert_eq!(respond(Intent::Notifications, &ctx), "You have 1 unread notification.");
        ctx.unread_notifications = 3;
        ctx.latest_notification_titles = vec!["Leave approved".into()];
        assert_eq!(
            respond(Intent::Notifications, &ctx),
            "You have 3 unread notifications. Latest: Leave approved."
        );
    }

    #[test]
    fn unknown_falls_back_to_help() {
        assert!(respond(Intent::Unknown, &ChatContext::default()).contains(HELP_TEXT));
    }
}
