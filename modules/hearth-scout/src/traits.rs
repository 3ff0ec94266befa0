// Trait abstractions for pipeline collaborators.
//
// SuitabilityClassifier / ForecastProvider / CalendarProvider: every
// advisory collaborator behind one trait, with a defined degradation path
// when it is absent or failing (classifier -> rule-based age check,
// forecast -> pass, calendar -> skipped stage).
//
// These enable deterministic testing with the mocks in `testing`:
// no network, no database.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use forecast_client::{Forecast, ForecastClient};
use hearth_common::types::CanonicalEvent;

// ---------------------------------------------------------------------------
// SuitabilityClassifier
// ---------------------------------------------------------------------------

/// Classifier verdict for one event: whether it suits the household's
/// children, and a more precise time of day when one can be read out of the
/// event's free text.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Suitability {
    pub suitable: bool,
    pub reason: String,
    /// "HH:MM" extracted from free text, when present.
    pub extracted_time: Option<String>,
}

#[async_trait]
pub trait SuitabilityClassifier: Send + Sync {
    /// Classify a batch of events against the children's current ages.
    /// Must return one verdict per event, in order.
    async fn classify(
        &self,
        events: &[CanonicalEvent],
        child_ages: &[u8],
    ) -> Result<Vec<Suitability>>;
}

// ---------------------------------------------------------------------------
// ForecastProvider
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ForecastProvider: Send + Sync {
    async fn forecast(&self, date: NaiveDate, lat: f64, lng: f64) -> Result<Forecast>;
}

#[async_trait]
impl ForecastProvider for ForecastClient {
    async fn forecast(&self, date: NaiveDate, lat: f64, lng: f64) -> Result<Forecast> {
        Ok(self.forecast(date, lat, lng).await?)
    }
}

// ---------------------------------------------------------------------------
// CalendarProvider
// ---------------------------------------------------------------------------

/// Conflict verdict across both household calendars. A hard conflict on the
/// primary calendar excludes; a warning on the second keeps but flags.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CalendarVerdict {
    pub has_conflict: bool,
    pub has_warning: bool,
}

#[async_trait]
pub trait CalendarProvider: Send + Sync {
    async fn conflicts(&self, at: DateTime<Utc>) -> Result<CalendarVerdict>;
}
