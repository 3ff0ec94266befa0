//! Eligibility filtering.
//!
//! Every check is an independent pass/fail decision with a human-readable
//! reason. All checks are evaluated for every event, with no short-circuiting,
//! so a rejected event carries every reason it failed, and a passing event
//! carries the full pass trail. Advisory collaborators degrade instead of
//! failing the pass: classifier -> rule-based age check, forecast -> pass,
//! calendar -> neutral.

pub mod age;
pub mod budget;
pub mod calendar;
pub mod capacity;
pub mod novelty;
pub mod schedule;
pub mod time;
pub mod weather;

use std::sync::Arc;

use chrono::{DateTime, NaiveTime, Utc};
use futures::StreamExt;
use tracing::warn;

use hearth_common::config::HouseholdSnapshot;
use hearth_common::types::{CanonicalEvent, FilterResult};

use crate::traits::{CalendarProvider, CalendarVerdict, ForecastProvider, Suitability, SuitabilityClassifier};

/// Concurrent per-event filter evaluations within a batch.
const FILTER_CONCURRENCY: usize = 4;

pub struct FilterEngine {
    forecast: Arc<dyn ForecastProvider>,
    classifier: Option<Arc<dyn SuitabilityClassifier>>,
    calendar: Option<Arc<dyn CalendarProvider>>,
}

impl FilterEngine {
    pub fn new(forecast: Arc<dyn ForecastProvider>) -> Self {
        Self {
            forecast,
            classifier: None,
            calendar: None,
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn SuitabilityClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn with_calendar(mut self, calendar: Arc<dyn CalendarProvider>) -> Self {
        self.calendar = Some(calendar);
        self
    }

    /// Filter a batch: one classifier call for the whole batch, then
    /// bounded-parallel per-event evaluation. Results are in input order.
    pub async fn filter_batch(
        &self,
        events: &[CanonicalEvent],
        household: &HouseholdSnapshot,
        now: DateTime<Utc>,
    ) -> Vec<FilterResult> {
        let suitabilities = self.classify_batch(events, household, now).await;

        futures::stream::iter(events.iter().zip(suitabilities.iter()))
            .map(|(event, suitability)| self.filter(event, household, suitability.as_ref(), now))
            .buffered(FILTER_CONCURRENCY)
            .collect()
            .await
    }

    /// Evaluate every check for one event.
    pub async fn filter(
        &self,
        event: &CanonicalEvent,
        household: &HouseholdSnapshot,
        suitability: Option<&Suitability>,
        now: DateTime<Utc>,
    ) -> FilterResult {
        let child_ages = household.child_ages(now.date_naive());

        let extracted_time = suitability
            .and_then(|s| s.extracted_time.as_deref())
            .and_then(|t| NaiveTime::parse_from_str(t, "%H:%M").ok());

        let age = age::age_check(event, suitability, &child_ages);
        let time = time::time_check(event, now, household.min_lead_hours, household.max_lead_days);
        let sched = schedule::schedule_check(event, household, extracted_time);
        let budget = budget::budget_check(event, household.budget_ceiling_cents);
        let capacity = capacity::capacity_check(event);
        let novelty = novelty::novelty_check(event, &household.attended_fingerprints);

        let outdoor = weather::is_outdoor(event);
        let (forecast, calendar_verdict) = tokio::join!(
            self.fetch_forecast(event, outdoor),
            self.fetch_calendar(event)
        );
        let weather = weather::weather_check(outdoor, forecast.as_ref());

        let mut checks = vec![age, time, sched.outcome, budget, capacity, novelty, weather];
        let mut calendar_warning = false;
        if let Some(verdict) = calendar_verdict {
            let cal = calendar::calendar_check(verdict);
            calendar_warning = cal.warning;
            checks.push(cal.outcome);
        }

        FilterResult::from_checks(checks, sched.nap_flag, calendar_warning, now)
    }

    async fn classify_batch(
        &self,
        events: &[CanonicalEvent],
        household: &HouseholdSnapshot,
        now: DateTime<Utc>,
    ) -> Vec<Option<Suitability>> {
        let Some(classifier) = &self.classifier else {
            return vec![None; events.len()];
        };
        if events.is_empty() {
            return vec![];
        }

        let child_ages = household.child_ages(now.date_naive());
        match classifier.classify(events, &child_ages).await {
            Ok(verdicts) if verdicts.len() == events.len() => {
                verdicts.into_iter().map(Some).collect()
            }
            Ok(verdicts) => {
                warn!(
                    expected = events.len(),
                    got = verdicts.len(),
                    "Classifier returned wrong batch size, using rule-based fallback"
                );
                vec![None; events.len()]
            }
            Err(error) => {
                warn!(%error, "Classifier unavailable, using rule-based fallback");
                vec![None; events.len()]
            }
        }
    }

    /// None when the event is indoor, has no coordinates, or the fetch
    /// failed. Weather is advisory; all of those pass.
    async fn fetch_forecast(
        &self,
        event: &CanonicalEvent,
        outdoor: bool,
    ) -> Option<forecast_client::Forecast> {
        if !outdoor {
            return None;
        }
        let (lat, lng) = (event.location.lat?, event.location.lng?);
        match self
            .forecast
            .forecast(event.starts_at.date_naive(), lat, lng)
            .await
        {
            Ok(forecast) => Some(forecast),
            Err(error) => {
                warn!(%error, title = %event.title, "Forecast fetch failed, passing weather check");
                None
            }
        }
    }

    /// Outer None: no calendar collaborator supplied, the check is skipped
    /// entirely. Inner None: lookup failed, neutral pass.
    async fn fetch_calendar(&self, event: &CanonicalEvent) -> Option<Option<CalendarVerdict>> {
        let provider = self.calendar.as_ref()?;
        match provider.conflicts(event.starts_at).await {
            Ok(verdict) => Some(Some(verdict)),
            Err(error) => {
                warn!(%error, title = %event.title, "Calendar lookup failed, neutral pass");
                Some(None)
            }
        }
    }
}
