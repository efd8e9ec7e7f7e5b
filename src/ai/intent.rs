//! Intent detection for the assistant.
//!
//! A fixed table of weighted regular expressions. Every pattern that matches
//! adds its weight to its intent; the highest total wins, ties go to the
//! intent listed first.

use regex::Regex;
use serde::Serialize;
use once_cell::sync::Lazy;
use strum_macros::{AsRefStr, Display, EnumIter};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Display, AsRefStr, EnumIter)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Intent {
    Greeting,
    ClockStatus,
    AttendanceHistory,
    LeaveBalance,
    LeaveRequest,
    Schedule,
    Notifications,
    Help,
    Thanks,
    Goodbye,
    Unknown,
}

struct Pattern {
    intent: Intent,
    regex: Regex,
    weight: u32,
}

fn pattern(intent: Intent, re: &str, weight: u32) -> Pattern {
    Pattern {
        intent,
        // patterns are literals in this file; a typo fails every test
        regex: Regex::new(re).expect("invalid intent pattern"),
        weight,
    }
}

/// Ordered by priority for tie-breaking.
static PATTERNS: Lazy<Vec<Pattern>> = Lazy::new(|| {
    use Intent::*;
    vec![
        pattern(Greeting, r"^\s*(hi|hello|hey|good (morning|afternoon|evening)|salam)\b", 3),
        pattern(Greeting, r"\bhow are you\b", 2),
        pattern(ClockStatus, r"\b(clock(ed)?|check(ed)?|punch(ed)?)[\s-]?(in|out)\b", 3),
        pattern(ClockStatus, r"\b(am i|did i|have i)\b.*\b(in|out|late|present)\b", 2),
        pattern(ClockStatus, r"\btoday'?s? (attendance|status)\b", 3),
        pattern(ClockStatus, r"\b(status|today)\b", 1),
        pattern(AttendanceHistory, r"\battendance\b", 2),
        pattern(AttendanceHistory, r"\b(history|record|records|summary|last (week|month))\b", 2),
        pattern(AttendanceHistory, r"\bhow many (days|times)\b.*\b(late|present|absent)\b", 3),
        pattern(AttendanceHistory, r"\b(late|absent|absences|punctual)\b", 1),
        pattern(LeaveBalance, r"\b(leave|vacation|holiday)s? (balance|left|remaining)\b", 4),
        pattern(LeaveBalance, r"\bhow many (leave|vacation|holiday|sick) days\b", 4),
        pattern(LeaveBalance, r"\b(balance|remaining|left)\b", 1),
        pattern(LeaveRequest, r"\b(apply|request|take|book)\b.*\b(leave|day off|time off|vacation)\b", 4),
        pattern(LeaveRequest, r"\b(leave|day off|time off|vacation)\b", 1),
        pattern(LeaveRequest, r"\bsick\b", 1),
        pattern(Schedule, r"\b(schedule|shift|shifts|roster|timetable)\b", 3),
        pattern(Schedule, r"\b(when|what time) (do|should) i (work|start)\b", 3),
        pattern(Schedule, r"\b(tomorrow|next week|upcoming)\b", 1),
        pattern(Notifications, r"\b(notification|notifications|alerts?|messages?|inbox)\b", 3),
        pattern(Notifications, r"\b(unread|new)\b", 1),
        pattern(Help, r"\b(help|what can you do|commands|options|how do i)\b", 3),
        pattern(Thanks, r"\b(thanks|thank you|thx|cheers|appreciate)\b", 3),
        pattern(Goodbye, r"\b(bye|goodbye|see you|later|good night)\b", 3),
    ]
});

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub intent: Intent,
    pub score: u32,
    pub matched_patterns: usize,
}

pub fn classify(text: &str) -> Classification {
    let text = text.to_lowercase();

    // (intent, score, matches) in first-seen order
    let mut totals: Vec<(Intent, u32, usize)> = Vec::new();

    for p in PATTERNS.iter() {
        if !p.regex.is_match(&text) {
            continue;
        }
        match totals.iter_mut().find(|(intent, _, _)| *intent == p.intent) {
            Some(entry) => {
                entry.1 += p.weight;
                entry.2 += 1;
            }
            None => totals.push((p.intent, p.weight, 1)),
        }
    }

    let mut best = Classification {
        intent: Intent::Unknown,
        score: 0,
        matched_patterns: 0,
    };
    for (intent, score, matched_patterns) in totals {
        if score > best.score {
            best = Classification {
                intent,
                score,
                matched_patterns,
            };
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intent_of(text: &str) -> Intent {
        classify(text).intent
    }

    #[test]
    fn greetings() {
        assert_eq!(intent_of("Hello there"), Intent::Greeting);
        assert_eq!(intent_of("good morning!"), Intent::Greeting);
    }

    #[test]
    fn clock_status() {
        assert_eq!(intent_of("Did I clock in today?"), Intent::ClockStatus);
        assert_eq!(intent_of("have I checked out"), Intent::ClockStatus);
    }

    #[test]
    fn attendance_history() {
        assert_eq!(intent_of("show my attendance history"), Intent::AttendanceHistory);
        assert_eq!(intent_of("how many days was I late last month"), Intent::AttendanceHistory);
    }

    #[test]
    fn leave_balance_beats_leave_request() {
        assert_eq!(intent_of("What is my leave balance?"), Intent::LeaveBalance);
        assert_eq!(intent_of("how many sick days do I have"), Intent::LeaveBalance);
    }

    #[test]
    fn leave_request() {
        assert_eq!(intent_of("I want to apply for leave next friday"), Intent::LeaveRequest);
    }

    #[test]
    fn schedule_and_notifications() {
        assert_eq!(intent_of("what is my schedule tomorrow"), Intent::Schedule);
        assert_eq!(intent_of("any unread notifications?"), Intent::Notifications);
    }

    #[test]
    fn small_talk() {
        assert_eq!(intent_of("what can you do"), Intent::Help);
        assert_eq!(intent_of("thanks a lot"), Intent::Thanks);
        assert_eq!(intent_of("bye"), Intent::Goodbye);
    }

    #[test]
    fn gibberish_is_unknown_with_zero_score() {
        let c = classify("qwerty asdf");
        assert_eq!(c.intent, Intent::Unknown);
        assert_eq!(c.score, 0);
        assert_eq!(c.matched_patterns, 0);
    }

    #[test]
    fn scores_are_summed_across_patterns() {
        // "attendance" (2) + "history" (2)
        let c = classify("attendance history");
        assert_eq!(c.intent, Intent::AttendanceHistory);
        assert_eq!(c.score, 4);
        assert_eq!(c.matched_patterns, 2);
    }

    #[test]
    fn ties_go_to_the_earlier_intent() {
        // "today" -> ClockStatus 1, "upcoming" -> Schedule 1
        let c = classify("today upcoming");
        assert_eq!(c.intent, Intent::ClockStatus);
        assert_eq!(c.score, 1);
    }
}
