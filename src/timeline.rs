//! Timeline shown in the detail panel.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{Case, CaseStatus, Message, Sender};

/// Only the opening messages of a conversation appear on the timeline.
pub const TIMELINE_MESSAGE_LIMIT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineEventKind {
    CaseCreated,
    ConsentGranted,
    VolunteerAccepted,
    Message,
    CaseCompleted,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineEvent {
    pub kind: TimelineEventKind,
    pub at: DateTime<Utc>,
    pub title: String,
    pub description: Option<String>,
}

impl TimelineEvent {
    fn new(kind: TimelineEventKind, at: DateTime<Utc>, title: &str, description: Option<String>) -> Self {
        Self {
            kind,
            at,
            title: title.to_string(),
            description,
        }
    }
}

fn sender_label(sender: Sender) -> &'static str {
    match sender {
        Sender::Volunteer => "Volunteer",
        Sender::Family => "Family",
        Sender::System => "System",
    }
}

/// Builds the chronologically sorted timeline for one case.
///
/// Acceptance uses `accepted_at` and falls back to the creation time.
/// Completion uses `completed_at` and falls back to `now`.
pub fn build_timeline(case: &Case, messages: &[Message], now: DateTime<Utc>) -> Vec<TimelineEvent> {
    let mut events = Vec::new();

    let created_desc = match case.city.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        Some(city) => format!("{}, {}", case.student_name, city),
        None => case.student_name.clone(),
    };
    events.push(TimelineEvent::new(
        TimelineEventKind::CaseCreated,
        case.created_at,
        "Case created",
        Some(created_desc),
    ));

    if let Some(at) = case.consent_timestamp() {
        events.push(TimelineEvent::new(
            TimelineEventKind::ConsentGranted,
            at,
            "Consent granted",
            Some("Guardian authorized contact.".to_string()),
        ));
    }

    if case.status >= CaseStatus::InProgress {
        if let Some(ref volunteer) = case.assigned_volunteer_name {
            events.push(TimelineEvent::new(
                TimelineEventKind::VolunteerAccepted,
                case.accepted_at.unwrap_or(case.created_at),
                "Volunteer accepted",
                Some(volunteer.clone()),
            ));
        }
    }

    for message in messages.iter().take(TIMELINE_MESSAGE_LIMIT) {
        events.push(TimelineEvent::new(
            TimelineEventKind::Message,
            message.created_at,
            &format!("Message from {}", sender_label(message.sender)),
            Some(message.content.clone()),
        ));
    }

    if case.status == CaseStatus::Completed {
        events.push(TimelineEvent::new(
            TimelineEventKind::CaseCompleted,
            case.completed_at.unwrap_or(now),
            "Case completed",
            None,
        ));
    }

    events.sort_by(|a, b| a.at.cmp(&b.at));
    events
}
