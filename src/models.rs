use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::geo::Coordinates;

// ============ Backend Records ============

/// Lifecycle state of a case. Declaration order is lifecycle order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CaseStatus {
    /// Waiting for a volunteer to accept.
    #[serde(rename = "aguardando_voluntario")]
    AwaitingVolunteer,
    /// A volunteer accepted and is working the case.
    #[serde(rename = "em_progresso")]
    InProgress,
    /// Case closed.
    #[serde(rename = "concluida")]
    Completed,
}

impl CaseStatus {
    /// Whether a volunteer must be assigned in this state.
    pub fn requires_volunteer(self) -> bool {
        self >= CaseStatus::InProgress
    }
}

/// Suggested support category attached to a case by triage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SuggestedCategory {
    #[serde(rename = "transporte")]
    Transport,
    #[serde(rename = "terapia_emocional")]
    EmotionalTherapy,
    #[serde(rename = "fisioterapia")]
    Physiotherapy,
    #[serde(rename = "inseguranca_alimentar")]
    FoodInsecurity,
    #[serde(rename = "apoio_financeiro")]
    FinancialSupport,
    #[serde(rename = "reforco_escolar")]
    Tutoring,
    #[serde(rename = "outro")]
    Other,
}

/// How the guardian prefers to be contacted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PreferredChannel {
    #[serde(rename = "whatsapp")]
    WhatsApp,
    #[serde(rename = "ligacao")]
    PhoneCall,
    #[serde(rename = "sms")]
    Sms,
}

/// A public-health visit recorded for the student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthVisit {
    /// Visit date as stored (ISO timestamp or plain date).
    pub date: String,
    /// Visit type (e.g. "psicologia", "ortopedia").
    #[serde(rename = "type")]
    pub visit_type: String,
    /// Optional free-text notes.
    #[serde(default)]
    pub notes: Option<String>,
}

impl HealthVisit {
    /// Parsed visit time, if the stored date is readable.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        parse_loose_timestamp(&self.date)
    }
}

/// A student support request ("demand") as stored in the `demands` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    /// Opaque unique identifier.
    pub id: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,

    // Subject
    pub student_name: String,
    pub student_age: i32,
    pub guardian_name: String,
    pub contact_phone: String,
    pub preferred_channel: PreferredChannel,

    // Location
    #[serde(default)]
    pub address_street: Option<String>,
    #[serde(default)]
    pub address_neighborhood: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub zip: Option<String>,
    #[serde(default)]
    pub geo_lat: Option<f64>,
    #[serde(default)]
    pub geo_lng: Option<f64>,

    // School
    #[serde(default)]
    pub school_name: Option<String>,
    #[serde(default)]
    pub attendance_days_present_30d: Option<i32>,
    #[serde(default)]
    pub attendance_days_absent_30d: Option<i32>,
    #[serde(default)]
    pub grades_last_term: Option<BTreeMap<String, f64>>,
    #[serde(default)]
    pub behavior_notes: Option<String>,

    // Health
    #[serde(default)]
    pub sus_visits: Option<Vec<HealthVisit>>,

    // Case metadata
    #[serde(default)]
    pub suggested_problem: Option<SuggestedCategory>,
    #[serde(default)]
    pub risk_score: Option<f64>,
    #[serde(default)]
    pub consent_granted_at: Option<NaiveDate>,
    pub status: CaseStatus,
    #[serde(default)]
    pub assigned_volunteer_name: Option<String>,
    /// When a volunteer accepted the case. Older rows do not carry it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepted_at: Option<DateTime<Utc>>,
    /// When the case was completed. Older rows do not carry it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Case {
    /// Both coordinates, or nothing.
    pub fn coordinates(&self) -> Option<Coordinates> {
        match (self.geo_lat, self.geo_lng) {
            (Some(lat), Some(lng)) => Some(Coordinates::new(lat, lng)),
            _ => None,
        }
    }

    /// Risk score clamped to 0..=100; missing counts as 0.
    pub fn display_risk(&self) -> f64 {
        clamp_risk(self.risk_score)
    }

    /// Health visits sorted newest first. Unreadable dates go last.
    pub fn visits_newest_first(&self) -> Vec<HealthVisit> {
        let mut visits = self.sus_visits.clone().unwrap_or_default();
        visits.sort_by(|a, b| match (a.timestamp(), b.timestamp()) {
            (Some(x), Some(y)) => y.cmp(&x),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        visits
    }

    /// Consent date as a UTC timestamp at midnight.
    pub fn consent_timestamp(&self) -> Option<DateTime<Utc>> {
        self.consent_granted_at
            .map(|d| d.and_time(NaiveTime::MIN).and_utc())
    }

    /// Whether the stored assignment is consistent with the lifecycle state.
    pub fn assignment_is_consistent(&self) -> bool {
        self.status.requires_volunteer() == self.assigned_volunteer_name.is_some()
    }
}

/// Clamps a stored risk score for display.
pub fn clamp_risk(score: Option<f64>) -> f64 {
    match score {
        Some(s) if s.is_nan() => 0.0,
        Some(s) => s.clamp(0.0, 100.0),
        None => 0.0,
    }
}

/// Parses RFC 3339 timestamps and plain `YYYY-MM-DD` dates.
pub fn parse_loose_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN).and_utc())
}

/// Who wrote a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sender {
    #[serde(rename = "voluntario")]
    Volunteer,
    #[serde(rename = "familia")]
    Family,
    #[serde(rename = "sistema")]
    System,
}

/// A chat message attached to a case. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub created_at: DateTime<Utc>,
    /// Owning case identifier.
    pub demand_id: String,
    pub sender: Sender,
    pub content: String,
}

/// Insert payload for the `messages` table.
#[derive(Debug, Clone, Serialize)]
pub struct NewMessage {
    pub demand_id: String,
    pub sender: Sender,
    pub content: String,
}

/// Point update for the `demands` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseUpdate {
    pub status: CaseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_volunteer_name: Option<String>,
}

impl CaseUpdate {
    pub fn accept(volunteer_name: &str) -> Self {
        Self {
            status: CaseStatus::InProgress,
            assigned_volunteer_name: Some(volunteer_name.to_string()),
        }
    }

    pub fn complete() -> Self {
        Self {
            status: CaseStatus::Completed,
            assigned_volunteer_name: None,
        }
    }
}

// ============ API Request/Response Models ============

/// Body for accepting a case.
#[derive(Debug, Deserialize)]
pub struct AcceptRequest {
    pub volunteer_name: String,
}

/// Body for sending a chat message.
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

/// Which tab of the detail panel is showing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailTab {
    #[default]
    Details,
    Chat,
    Timeline,
}

/// Body for opening the detail panel.
#[derive(Debug, Default, Deserialize)]
pub struct OpenCaseRequest {
    #[serde(default)]
    pub tab: DetailTab,
}

/// One row of the rendered feed.
#[derive(Debug, Clone, Serialize)]
pub struct FeedItem {
    #[serde(flatten)]
    pub case: Case,
    /// Distance from the viewer, when both locations are known.
    pub distance_km: Option<f64>,
    /// Risk clamped for display.
    pub risk_display: f64,
}

/// Snapshot of the feed as the UI should render it.
#[derive(Debug, Clone, Serialize)]
pub struct FeedResponse {
    pub items: Vec<FeedItem>,
    /// Records held in the session before filtering.
    pub loaded: usize,
    /// Last successfully loaded page index.
    pub page: u32,
    pub has_more: bool,
    /// Dismissable inline fetch error.
    pub error: Option<String>,
    pub offline: bool,
}

/// Snapshot of the open detail panel.
#[derive(Debug, Clone, Serialize)]
pub struct DetailResponse {
    pub case: Case,
    pub tab: DetailTab,
    pub distance_km: Option<f64>,
    pub risk_display: f64,
    pub health_visits: Vec<HealthVisit>,
    pub messages: Vec<Message>,
    pub timeline: Vec<crate::timeline::TimelineEvent>,
    /// New messages are still being pushed into `messages`.
    pub live: bool,
}

/// Service mode and pending notices.
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub mode: &'static str,
    pub notice: Option<String>,
    pub error: Option<String>,
}
