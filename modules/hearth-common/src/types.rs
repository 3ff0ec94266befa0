use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Geo / venue types ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Location {
    pub address: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

impl Location {
    pub fn has_coords(&self) -> bool {
        self.lat.is_some() && self.lng.is_some()
    }
}

/// Haversine great-circle distance between two lat/lng points in kilometers.
pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();
    let lat1_r = lat1.to_radians();
    let lat2_r = lat2.to_radians();

    let a = (d_lat / 2.0).sin().powi(2) + lat1_r.cos() * lat2_r.cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();
    EARTH_RADIUS_KM * c
}

// --- Age / capacity ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeRange {
    pub min_years: u8,
    pub max_years: u8,
}

impl AgeRange {
    pub fn contains(&self, age: u8) -> bool {
        age >= self.min_years && age <= self.max_years
    }

    pub fn span(&self) -> u8 {
        self.max_years.saturating_sub(self.min_years)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Capacity {
    pub available: Option<u32>,
    pub total: Option<u32>,
}

impl Capacity {
    /// Fraction of spots still open, when both sides are known.
    pub fn remaining_ratio(&self) -> Option<f64> {
        match (self.available, self.total) {
            (Some(a), Some(t)) if t > 0 => Some(a as f64 / t as f64),
            _ => None,
        }
    }

    /// True only when capacity is known and explicitly exhausted.
    pub fn known_full(&self) -> bool {
        self.available == Some(0)
    }
}

// --- Candidate events (scraper output, immutable) ---

/// A single source's sighting of an event. Produced by a scraper collaborator,
/// validated at the ingest boundary, consumed by the merge engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateEvent {
    pub source: String,
    pub title: String,
    pub starts_at: DateTime<Utc>,
    /// True when the source gave a date but no time of day.
    pub all_day: bool,
    pub location: Location,
    pub age_range: Option<AgeRange>,
    pub cost_cents: u32,
    pub registration_url: String,
    pub registration_opens_at: Option<DateTime<Utc>>,
    pub capacity: Option<Capacity>,
    pub description: String,
    pub raw_content: String,
}

// --- Event lifecycle ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Discovered,
    Proposed,
    Approved,
    Registering,
    Registered,
    Rejected,
    RegistrationFailed,
    Cancelled,
    ManualRegistrationSent,
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventStatus::Discovered => write!(f, "discovered"),
            EventStatus::Proposed => write!(f, "proposed"),
            EventStatus::Approved => write!(f, "approved"),
            EventStatus::Registering => write!(f, "registering"),
            EventStatus::Registered => write!(f, "registered"),
            EventStatus::Rejected => write!(f, "rejected"),
            EventStatus::RegistrationFailed => write!(f, "registration_failed"),
            EventStatus::Cancelled => write!(f, "cancelled"),
            EventStatus::ManualRegistrationSent => write!(f, "manual_registration_sent"),
        }
    }
}

impl EventStatus {
    /// Legal lifecycle transitions. Everything not listed is illegal; the
    /// store refuses to apply it.
    pub fn can_transition(self, to: EventStatus) -> bool {
        use EventStatus::*;
        matches!(
            (self, to),
            (Discovered, Proposed)
                | (Discovered, Cancelled)
                | (Proposed, Approved)
                | (Proposed, Rejected)
                | (Proposed, Cancelled)
                | (Approved, Registering)
                | (Approved, RegistrationFailed)
                | (Approved, ManualRegistrationSent)
                | (Registering, Registered)
                | (Registering, RegistrationFailed)
                | (RegistrationFailed, Registering)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            EventStatus::Registered
                | EventStatus::Rejected
                | EventStatus::Cancelled
                | EventStatus::ManualRegistrationSent
        )
    }
}

// --- Canonical events (system of record) ---

/// The deduplicated, system-of-record representation of one real-world event.
/// Exactly one exists per fingerprint; merges enrich it and never shrink
/// `sources` or `alternate_urls`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalEvent {
    pub id: Uuid,
    pub fingerprint: String,
    pub title: String,
    pub starts_at: DateTime<Utc>,
    pub all_day: bool,
    pub location: Location,
    pub age_range: Option<AgeRange>,
    pub cost_cents: u32,
    pub registration_url: String,
    pub alternate_urls: Vec<String>,
    pub registration_opens_at: Option<DateTime<Utc>>,
    pub capacity: Option<Capacity>,
    pub description: String,
    pub status: EventStatus,
    pub sources: BTreeSet<String>,
    pub merge_count: u32,
    pub first_seen: DateTime<Utc>,
    pub last_merged_at: Option<DateTime<Utc>>,
    pub filter: Option<FilterResult>,
    pub score: Option<ScoreBreakdown>,
}

impl CanonicalEvent {
    pub fn is_free(&self) -> bool {
        self.cost_cents == 0
    }

    pub fn preference_score(&self) -> Option<f32> {
        self.score.as_ref().map(|s| s.final_score)
    }

    pub fn passed_filters(&self) -> bool {
        self.filter.as_ref().map(|f| f.passed).unwrap_or(false)
    }
}

// --- Merge audit trail ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeType {
    Exact,
    Fuzzy,
}

impl std::fmt::Display for MergeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MergeType::Exact => write!(f, "exact"),
            MergeType::Fuzzy => write!(f, "fuzzy"),
        }
    }
}

/// Write-once audit entry for one merge. The snapshot preserves the
/// merged-away candidate so a false-positive merge can be undone by hand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeRecord {
    pub id: Uuid,
    pub primary_id: Uuid,
    pub merged_fingerprint: String,
    pub merged_snapshot: serde_json::Value,
    pub similarity: f64,
    pub merge_type: MergeType,
    pub merged_at: DateTime<Utc>,
}

// --- Filter results ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    Age,
    Time,
    Schedule,
    Budget,
    Capacity,
    Novelty,
    Weather,
    Calendar,
}

impl std::fmt::Display for CheckKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckKind::Age => write!(f, "age"),
            CheckKind::Time => write!(f, "time"),
            CheckKind::Schedule => write!(f, "schedule"),
            CheckKind::Budget => write!(f, "budget"),
            CheckKind::Capacity => write!(f, "capacity"),
            CheckKind::Novelty => write!(f, "novelty"),
            CheckKind::Weather => write!(f, "weather"),
            CheckKind::Calendar => write!(f, "calendar"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub check: CheckKind,
    pub passed: bool,
    pub reason: String,
}

impl CheckOutcome {
    pub fn pass(check: CheckKind, reason: impl Into<String>) -> Self {
        Self {
            check,
            passed: true,
            reason: reason.into(),
        }
    }

    pub fn fail(check: CheckKind, reason: impl Into<String>) -> Self {
        Self {
            check,
            passed: false,
            reason: reason.into(),
        }
    }
}

/// Sentinel reason attached when every check passes.
pub const PASSED_ALL_FILTERS: &str = "passed all filters";

/// Outcome of one filtering pass over one event. Every check appears in
/// `checks` whether it passed or not; `reasons` is the human-readable
/// failure list (or the sentinel).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterResult {
    pub passed: bool,
    pub reasons: Vec<String>,
    pub checks: Vec<CheckOutcome>,
    /// Overlaps the household quiet window; feeds a scoring penalty,
    /// never an exclusion.
    pub during_nap_window: bool,
    /// Advisory calendar conflict on a second household member's calendar.
    pub calendar_warning: bool,
    pub evaluated_at: DateTime<Utc>,
}

impl FilterResult {
    pub fn from_checks(
        checks: Vec<CheckOutcome>,
        during_nap_window: bool,
        calendar_warning: bool,
        evaluated_at: DateTime<Utc>,
    ) -> Self {
        let reasons: Vec<String> = checks
            .iter()
            .filter(|c| !c.passed)
            .map(|c| c.reason.clone())
            .collect();
        let passed = reasons.is_empty();
        Self {
            passed,
            reasons: if passed {
                vec![PASSED_ALL_FILTERS.to_string()]
            } else {
                reasons
            },
            checks,
            during_nap_window,
            calendar_warning,
            evaluated_at,
        }
    }
}

// --- Scoring ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// Learned preference blend, 0-100.
    pub base: f32,
    /// Quiet-window demotion already applied to `final_score`.
    pub nap_penalty: f32,
    pub final_score: f32,
    pub urgent: bool,
    /// True when the preference model was unavailable and a neutral
    /// fallback score was substituted.
    pub neutral_fallback: bool,
}

// --- Notifications ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Sms,
    Email,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Sms => write!(f, "sms"),
            Channel::Email => write!(f, "email"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Sent,
    Pending,
    Delivered,
    Approved,
    Rejected,
    Unclear,
    Cancelled,
    Failed,
}

impl std::fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationStatus::Sent => write!(f, "sent"),
            NotificationStatus::Pending => write!(f, "pending"),
            NotificationStatus::Delivered => write!(f, "delivered"),
            NotificationStatus::Approved => write!(f, "approved"),
            NotificationStatus::Rejected => write!(f, "rejected"),
            NotificationStatus::Unclear => write!(f, "unclear"),
            NotificationStatus::Cancelled => write!(f, "cancelled"),
            NotificationStatus::Failed => write!(f, "failed"),
        }
    }
}

impl NotificationStatus {
    /// Still awaiting a household response.
    pub fn is_open(self) -> bool {
        matches!(
            self,
            NotificationStatus::Sent | NotificationStatus::Pending | NotificationStatus::Delivered
        )
    }
}

/// How long a notification remains eligible to receive a response.
pub const RESPONSE_WINDOW_HOURS: i64 = 24;

/// One outbound approval request for one event to one recipient over one
/// channel. Status mutates exactly once per inbound response; the first
/// response wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub event_id: Uuid,
    pub recipient: String,
    pub channel: Channel,
    /// Email only; used by the provider to thread replies.
    pub subject: Option<String>,
    pub body: String,
    pub status: NotificationStatus,
    pub response_text: Option<String>,
    pub responded_at: Option<DateTime<Utc>>,
    pub provider_message_id: Option<String>,
    pub retry_count: u32,
    pub sent_at: DateTime<Utc>,
}

impl Notification {
    /// Whether an inbound response at `now` can still change this
    /// notification's status.
    pub fn accepts_response(&self, now: DateTime<Utc>) -> bool {
        self.status.is_open()
            && now - self.sent_at <= chrono::Duration::hours(RESPONSE_WINDOW_HOURS)
    }
}

// --- Registration attempts ---

/// Inputs to one registration attempt record. Note there is no
/// payment-completed flag here: `RegistrationAttempt` hard-codes it false.
#[derive(Debug, Clone)]
pub struct AttemptOutcome {
    pub success: bool,
    pub confirmation_number: Option<String>,
    pub error: Option<String>,
    pub payment_required: bool,
    pub payment_amount_cents: Option<u32>,
}

/// One attempt to register for one event. Never mutated after creation;
/// retries append new attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationAttempt {
    pub id: Uuid,
    pub event_id: Uuid,
    pub success: bool,
    pub confirmation_number: Option<String>,
    pub error: Option<String>,
    pub payment_required: bool,
    pub payment_amount_cents: Option<u32>,
    /// Always false. There is no constructor path or setter that produces
    /// true; automation cannot complete a payment.
    payment_completed: bool,
    pub attempted_by: String,
    pub attempted_at: DateTime<Utc>,
}

impl RegistrationAttempt {
    pub fn record(
        event_id: Uuid,
        outcome: AttemptOutcome,
        attempted_by: impl Into<String>,
        attempted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_id,
            success: outcome.success,
            confirmation_number: outcome.confirmation_number,
            error: outcome.error,
            payment_required: outcome.payment_required,
            payment_amount_cents: outcome.payment_amount_cents,
            payment_completed: false,
            attempted_by: attempted_by.into(),
            attempted_at,
        }
    }

    pub fn payment_completed(&self) -> bool {
        self.payment_completed
    }
}

// --- Payment violations ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// `register()` was invoked on an event with a nonzero declared cost.
    PaidEventAutomation,
    /// A payment keyword appeared in rendered page content.
    PaymentKeyword,
    /// A known payment-field selector appeared in rendered page content.
    PaymentFieldSelector,
    /// Visible nonzero price text appeared in rendered page content.
    VisiblePrice,
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViolationKind::PaidEventAutomation => write!(f, "paid_event_automation"),
            ViolationKind::PaymentKeyword => write!(f, "payment_keyword"),
            ViolationKind::PaymentFieldSelector => write!(f, "payment_field_selector"),
            ViolationKind::VisiblePrice => write!(f, "visible_price"),
        }
    }
}

/// Immutable audit record raised by the safety guard. Accumulation past the
/// emergency-stop threshold halts all automated registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentViolation {
    pub id: Uuid,
    pub kind: ViolationKind,
    pub event_id: Uuid,
    pub detail: String,
    pub detected_at: DateTime<Utc>,
}

impl PaymentViolation {
    pub fn new(kind: ViolationKind, event_id: Uuid, detail: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            event_id,
            detail: detail.into(),
            detected_at: Utc::now(),
        }
    }
}
