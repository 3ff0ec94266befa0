//! Preference scoring and ranking.
//!
//! The preference model blends household interaction history with novelty,
//! urgency, and social-proof signals into one 0-100 composite. Scoring is
//! pure and deterministic: identical inputs produce identical ordering. A
//! failing model degrades to neutral scores instead of failing the run.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::warn;

use hearth_common::types::{CanonicalEvent, ScoreBreakdown};

/// Fixed demotion for events overlapping the household quiet window.
/// Applied to the composite, floored at zero. Never an exclusion.
pub const NAP_WINDOW_PENALTY: f32 = 20.0;

/// Substituted base score when the preference model is unavailable. The nap
/// penalty still applies, so degraded mode keeps its distinct nap/non-nap
/// values (30 vs 50).
pub const NEUTRAL_SCORE: f32 = 50.0;

/// An event is urgent when its registration window opens within this many
/// hours...
const URGENT_REGISTRATION_WINDOW_HOURS: i64 = 24;

/// ...or its remaining capacity ratio is at or below this fraction.
const URGENT_CAPACITY_RATIO: f64 = 0.2;

// ---------------------------------------------------------------------------
// Preference model
// ---------------------------------------------------------------------------

pub trait PreferenceModel: Send + Sync {
    /// Base preference score, 0-100.
    fn base_score(&self, event: &CanonicalEvent) -> Result<f32>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionOutcome {
    Approved,
    Rejected,
    Attended,
}

/// One historical decision about a proposed event.
#[derive(Debug, Clone)]
pub struct InteractionFeedback {
    pub source: String,
    pub fingerprint: String,
    pub outcome: InteractionOutcome,
}

/// Preference model learned from approve/reject/attend history, blended
/// with novelty, urgency, and social proof.
pub struct HistoryModel {
    feedback: Vec<InteractionFeedback>,
}

const HISTORY_WEIGHT: f32 = 0.50;
const NOVELTY_WEIGHT: f32 = 0.15;
const URGENCY_WEIGHT: f32 = 0.15;
const SOCIAL_PROOF_WEIGHT: f32 = 0.20;

impl HistoryModel {
    pub fn new(feedback: Vec<InteractionFeedback>) -> Self {
        Self { feedback }
    }

    /// Approval/attendance rate across the event's sources, 0-1. No history
    /// for any source reads as neutral 0.5.
    fn source_affinity(&self, event: &CanonicalEvent) -> f32 {
        let relevant: Vec<&InteractionFeedback> = self
            .feedback
            .iter()
            .filter(|f| event.sources.contains(&f.source))
            .collect();
        if relevant.is_empty() {
            return 0.5;
        }
        let positive = relevant
            .iter()
            .filter(|f| {
                matches!(
                    f.outcome,
                    InteractionOutcome::Approved | InteractionOutcome::Attended
                )
            })
            .count();
        positive as f32 / relevant.len() as f32
    }

    /// 1.0 for sources the household has never decided on, 0.3 otherwise.
    fn novelty(&self, event: &CanonicalEvent) -> f32 {
        let seen = self
            .feedback
            .iter()
            .any(|f| event.sources.contains(&f.source));
        if seen {
            0.3
        } else {
            1.0
        }
    }

    /// Sooner events score higher, falling off over a month.
    fn urgency(&self, event: &CanonicalEvent) -> f32 {
        let days_until = (event.starts_at - Utc::now()).num_days().max(0) as f32;
        (1.0 - days_until / 30.0).max(0.0)
    }

    /// Corroboration across independent sources, saturating at four.
    fn social_proof(&self, event: &CanonicalEvent) -> f32 {
        let extra_sources = event.sources.len().saturating_sub(1) as f32;
        (extra_sources / 3.0).min(1.0)
    }
}

impl PreferenceModel for HistoryModel {
    fn base_score(&self, event: &CanonicalEvent) -> Result<f32> {
        let blend = HISTORY_WEIGHT * self.source_affinity(event)
            + NOVELTY_WEIGHT * self.novelty(event)
            + URGENCY_WEIGHT * self.urgency(event)
            + SOCIAL_PROOF_WEIGHT * self.social_proof(event);
        Ok((blend * 100.0).clamp(0.0, 100.0))
    }
}

// ---------------------------------------------------------------------------
// Scoring engine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderingMode {
    /// Score descending, date ascending on ties.
    #[default]
    Default,
    /// Urgent events first regardless of score, then the default order.
    UrgentPriority,
}

pub struct ScoringEngine {
    model: Arc<dyn PreferenceModel>,
}

impl ScoringEngine {
    pub fn new(model: Arc<dyn PreferenceModel>) -> Self {
        Self { model }
    }

    /// Annotate every event with a score breakdown and return them in final
    /// rank order.
    pub fn score(
        &self,
        mut events: Vec<CanonicalEvent>,
        mode: OrderingMode,
        now: DateTime<Utc>,
    ) -> Vec<CanonicalEvent> {
        for event in &mut events {
            let nap = event
                .filter
                .as_ref()
                .map(|f| f.during_nap_window)
                .unwrap_or(false);

            let (base, neutral_fallback) = match self.model.base_score(event) {
                Ok(score) => (score.clamp(0.0, 100.0), false),
                Err(error) => {
                    warn!(%error, title = %event.title, "Preference model unavailable, neutral score");
                    (NEUTRAL_SCORE, true)
                }
            };

            let nap_penalty = if nap { NAP_WINDOW_PENALTY } else { 0.0 };
            let final_score = (base - nap_penalty).max(0.0);

            event.score = Some(ScoreBreakdown {
                base,
                nap_penalty,
                final_score,
                urgent: is_urgent(event, now),
                neutral_fallback,
            });
        }

        match mode {
            OrderingMode::Default => {
                events.sort_by(|a, b| {
                    score_of(b)
                        .total_cmp(&score_of(a))
                        .then(a.starts_at.cmp(&b.starts_at))
                });
            }
            OrderingMode::UrgentPriority => {
                events.sort_by(|a, b| {
                    urgent_of(b)
                        .cmp(&urgent_of(a))
                        .then(score_of(b).total_cmp(&score_of(a)))
                        .then(a.starts_at.cmp(&b.starts_at))
                });
            }
        }

        events
    }
}

fn score_of(event: &CanonicalEvent) -> f32 {
    event.score.map(|s| s.final_score).unwrap_or(0.0)
}

fn urgent_of(event: &CanonicalEvent) -> bool {
    event.score.map(|s| s.urgent).unwrap_or(false)
}

/// Urgent: the registration window opens within the next 24 hours, or
/// remaining capacity is at or below 20%.
pub fn is_urgent(event: &CanonicalEvent, now: DateTime<Utc>) -> bool {
    if let Some(opens_at) = event.registration_opens_at {
        let until_open = opens_at - now;
        if until_open > chrono::Duration::zero()
            && until_open <= chrono::Duration::hours(URGENT_REGISTRATION_WINDOW_HOURS)
        {
            return true;
        }
    }
    if let Some(ratio) = event.capacity.and_then(|c| c.remaining_ratio()) {
        if ratio <= URGENT_CAPACITY_RATIO {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::make_event;
    use anyhow::anyhow;
    use chrono::Utc;
    use hearth_common::types::{Capacity, FilterResult};

    struct FixedModel(f32);

    impl PreferenceModel for FixedModel {
        fn base_score(&self, _event: &CanonicalEvent) -> Result<f32> {
            Ok(self.0)
        }
    }

    struct FailingModel;

    impl PreferenceModel for FailingModel {
        fn base_score(&self, _event: &CanonicalEvent) -> Result<f32> {
            Err(anyhow!("model offline"))
        }
    }

    fn with_nap_flag(mut event: CanonicalEvent, nap: bool) -> CanonicalEvent {
        event.filter = Some(FilterResult::from_checks(vec![], nap, false, Utc::now()));
        event
    }

    #[test]
    fn nap_penalty_demotes_but_never_below_zero() {
        let engine = ScoringEngine::new(Arc::new(FixedModel(70.0)));
        let events = vec![with_nap_flag(make_event("Nap-time event"), true)];
        let scored = engine.score(events, OrderingMode::Default, Utc::now());
        let breakdown = scored[0].score.unwrap();
        assert_eq!(breakdown.final_score, 50.0);

        let engine = ScoringEngine::new(Arc::new(FixedModel(10.0)));
        let events = vec![with_nap_flag(make_event("Low scorer"), true)];
        let scored = engine.score(events, OrderingMode::Default, Utc::now());
        assert_eq!(scored[0].score.unwrap().final_score, 0.0);
    }

    #[test]
    fn model_failure_degrades_to_neutral_scores() {
        let engine = ScoringEngine::new(Arc::new(FailingModel));
        let events = vec![
            with_nap_flag(make_event("Nap event"), true),
            with_nap_flag(make_event("Evening event"), false),
        ];
        let scored = engine.score(events, OrderingMode::Default, Utc::now());

        let evening = scored.iter().find(|e| e.title == "Evening event").unwrap();
        let nap = scored.iter().find(|e| e.title == "Nap event").unwrap();
        assert_eq!(evening.score.unwrap().final_score, 50.0);
        assert_eq!(nap.score.unwrap().final_score, 30.0);
        assert!(evening.score.unwrap().neutral_fallback);
    }

    #[test]
    fn default_order_is_score_then_date() {
        let engine = ScoringEngine::new(Arc::new(FixedModel(60.0)));
        let mut near = make_event("Near event");
        near.starts_at = Utc::now() + chrono::Duration::days(2);
        let mut far = make_event("Far event");
        far.starts_at = Utc::now() + chrono::Duration::days(20);
        let mut napped = with_nap_flag(make_event("Napped event"), true);
        napped.starts_at = Utc::now() + chrono::Duration::days(1);

        let scored = engine.score(vec![far, napped, near], OrderingMode::Default, Utc::now());
        // Equal base scores: the two unflagged events tie at 60 and order by
        // date; the nap-flagged one drops to 40 and sorts last.
        assert_eq!(scored[0].title, "Near event");
        assert_eq!(scored[1].title, "Far event");
        assert_eq!(scored[2].title, "Napped event");
    }

    #[test]
    fn urgent_priority_overrides_score() {
        let engine = ScoringEngine::new(Arc::new(FixedModel(90.0)));
        let high_scorer = make_event("High scorer");

        let mut urgent = make_event("Nearly full event");
        urgent.capacity = Some(Capacity {
            available: Some(2),
            total: Some(20),
        });

        let scored = engine.score(
            vec![high_scorer, urgent],
            OrderingMode::UrgentPriority,
            Utc::now(),
        );
        assert_eq!(scored[0].title, "Nearly full event");
    }

    #[test]
    fn registration_opening_soon_is_urgent() {
        let now = Utc::now();
        let mut event = make_event("Opens tonight");
        event.registration_opens_at = Some(now + chrono::Duration::hours(6));
        assert!(is_urgent(&event, now));

        event.registration_opens_at = Some(now + chrono::Duration::hours(48));
        assert!(!is_urgent(&event, now));
    }

    #[test]
    fn scoring_is_deterministic() {
        let feedback = vec![InteractionFeedback {
            source: "library".into(),
            fingerprint: "fp".into(),
            outcome: InteractionOutcome::Approved,
        }];
        let engine = ScoringEngine::new(Arc::new(HistoryModel::new(feedback)));

        let events: Vec<CanonicalEvent> = (0..5)
            .map(|i| {
                let mut e = make_event(&format!("Event {i}"));
                e.starts_at = Utc::now() + chrono::Duration::days(i + 1);
                e
            })
            .collect();

        let now = Utc::now();
        let first: Vec<String> = engine
            .score(events.clone(), OrderingMode::Default, now)
            .iter()
            .map(|e| e.title.clone())
            .collect();
        let second: Vec<String> = engine
            .score(events, OrderingMode::Default, now)
            .iter()
            .map(|e| e.title.clone())
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn history_model_blends_in_range() {
        let model = HistoryModel::new(vec![]);
        let score = model.base_score(&make_event("Anything")).unwrap();
        assert!((0.0..=100.0).contains(&score));
    }
}
