//! Deterministic test doubles for pipeline collaborators and event
//! construction helpers. No network, no database.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use forecast_client::Forecast;
use hearth_common::types::{CandidateEvent, CanonicalEvent, EventStatus, Location};

use crate::fingerprint::fingerprint;
use crate::traits::{CalendarProvider, CalendarVerdict, ForecastProvider, Suitability, SuitabilityClassifier};

/// A candidate a week out at 17:30 UTC, inside every default filter window.
pub fn make_candidate(source: &str, title: &str) -> CandidateEvent {
    let starts_at = (Utc::now() + chrono::Duration::days(7))
        .date_naive()
        .and_hms_opt(17, 30, 0)
        .expect("valid time")
        .and_utc();

    CandidateEvent {
        source: source.into(),
        title: title.into(),
        starts_at,
        all_day: false,
        location: Location {
            address: "300 Nicollet Mall".into(),
            lat: Some(44.9778),
            lng: Some(-93.2650),
        },
        age_range: None,
        cost_cents: 0,
        registration_url: "https://events.example.com/register/1".into(),
        registration_opens_at: None,
        capacity: None,
        description: "A family event".into(),
        raw_content: String::new(),
    }
}

/// A canonical event built from [`make_candidate`] with a real fingerprint.
pub fn make_event(title: &str) -> CanonicalEvent {
    let candidate = make_candidate("test", title);
    let fp = fingerprint(&candidate);
    CanonicalEvent {
        id: uuid::Uuid::new_v4(),
        fingerprint: fp,
        title: candidate.title,
        starts_at: candidate.starts_at,
        all_day: false,
        location: candidate.location,
        age_range: None,
        cost_cents: 0,
        registration_url: candidate.registration_url,
        alternate_urls: vec![],
        registration_opens_at: None,
        capacity: None,
        description: candidate.description,
        status: EventStatus::Discovered,
        sources: ["test".to_string()].into(),
        merge_count: 1,
        first_seen: Utc::now(),
        last_merged_at: None,
        filter: None,
        score: None,
    }
}

// ---------------------------------------------------------------------------
// Forecast doubles
// ---------------------------------------------------------------------------

pub struct MockForecast {
    forecast: Forecast,
}

impl MockForecast {
    pub fn friendly() -> Self {
        Self {
            forecast: Forecast {
                temperature_c: 22.0,
                condition: "clear".into(),
                precipitation_chance: 0.05,
                wind_kph: 8.0,
                is_outdoor_friendly: true,
            },
        }
    }

    pub fn stormy() -> Self {
        Self {
            forecast: Forecast {
                temperature_c: 4.0,
                condition: "thunderstorm".into(),
                precipitation_chance: 0.9,
                wind_kph: 45.0,
                is_outdoor_friendly: false,
            },
        }
    }
}

#[async_trait]
impl ForecastProvider for MockForecast {
    async fn forecast(&self, _date: NaiveDate, _lat: f64, _lng: f64) -> Result<Forecast> {
        Ok(self.forecast.clone())
    }
}

pub struct FailingForecast;

#[async_trait]
impl ForecastProvider for FailingForecast {
    async fn forecast(&self, _date: NaiveDate, _lat: f64, _lng: f64) -> Result<Forecast> {
        Err(anyhow!("forecast service unavailable"))
    }
}

// ---------------------------------------------------------------------------
// Calendar doubles
// ---------------------------------------------------------------------------

pub struct MockCalendar {
    verdict: CalendarVerdict,
}

impl MockCalendar {
    pub fn clear() -> Self {
        Self {
            verdict: CalendarVerdict {
                has_conflict: false,
                has_warning: false,
            },
        }
    }

    pub fn conflicted() -> Self {
        Self {
            verdict: CalendarVerdict {
                has_conflict: true,
                has_warning: false,
            },
        }
    }

    pub fn warned() -> Self {
        Self {
            verdict: CalendarVerdict {
                has_conflict: false,
                has_warning: true,
            },
        }
    }
}

#[async_trait]
impl CalendarProvider for MockCalendar {
    async fn conflicts(&self, _at: DateTime<Utc>) -> Result<CalendarVerdict> {
        Ok(self.verdict)
    }
}

// ---------------------------------------------------------------------------
// Classifier doubles
// ---------------------------------------------------------------------------

/// Returns one fixed verdict per event.
pub struct MockClassifier {
    pub suitable: bool,
    pub extracted_time: Option<String>,
}

impl MockClassifier {
    pub fn approving() -> Self {
        Self {
            suitable: true,
            extracted_time: None,
        }
    }
}

#[async_trait]
impl SuitabilityClassifier for MockClassifier {
    async fn classify(
        &self,
        events: &[CanonicalEvent],
        _child_ages: &[u8],
    ) -> Result<Vec<Suitability>> {
        Ok(events
            .iter()
            .map(|_| Suitability {
                suitable: self.suitable,
                reason: if self.suitable {
                    "fits the children".into()
                } else {
                    "not a fit".into()
                },
                extracted_time: self.extracted_time.clone(),
            })
            .collect())
    }
}

pub struct FailingClassifier;

#[async_trait]
impl SuitabilityClassifier for FailingClassifier {
    async fn classify(
        &self,
        _events: &[CanonicalEvent],
        _child_ages: &[u8],
    ) -> Result<Vec<Suitability>> {
        Err(anyhow!("classifier unavailable"))
    }
}
