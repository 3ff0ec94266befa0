//! Ingestion boundary for scraper payloads.
//!
//! Scrapers produce loosely-shaped records that vary by source. Everything
//! is validated and coerced here, once, so nothing downstream ever sees a
//! half-formed candidate. A candidate that cannot be fingerprinted (no
//! title, no parseable date) is dropped with a logged reason, not retried.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use hearth_common::types::{AgeRange, CandidateEvent, Capacity, Location};

/// A raw, source-shaped candidate as scrapers hand it over. Every field the
/// scraper might omit is optional; coercion happens in [`validate`].
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawCandidate {
    pub source: Option<String>,
    pub title: Option<String>,
    pub starts_at: Option<String>,
    pub address: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub age_min: Option<u8>,
    pub age_max: Option<u8>,
    pub cost_cents: Option<u32>,
    /// Dollar amount fallback for sources that report "12.50".
    pub cost: Option<f64>,
    pub registration_url: Option<String>,
    pub registration_opens_at: Option<String>,
    pub capacity_available: Option<u32>,
    pub capacity_total: Option<u32>,
    pub description: Option<String>,
    pub raw_content: Option<String>,
}

/// Why a raw candidate was dropped at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    MissingTitle,
    MissingDate,
    UnparseableDate,
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DropReason::MissingTitle => write!(f, "missing title"),
            DropReason::MissingDate => write!(f, "missing date"),
            DropReason::UnparseableDate => write!(f, "unparseable date"),
        }
    }
}

#[derive(Debug, Default)]
pub struct IngestStats {
    pub accepted: u32,
    pub dropped: u32,
}

/// Validate and coerce one raw candidate.
pub fn validate(raw: RawCandidate) -> Result<CandidateEvent, DropReason> {
    let title = raw
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(DropReason::MissingTitle)?
        .to_string();

    let date_text = raw
        .starts_at
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .ok_or(DropReason::MissingDate)?;

    let (starts_at, all_day) = parse_start(date_text).ok_or(DropReason::UnparseableDate)?;

    let registration_opens_at = raw
        .registration_opens_at
        .as_deref()
        .and_then(|d| parse_start(d.trim()))
        .map(|(at, _)| at);

    let cost_cents = raw
        .cost_cents
        .or_else(|| raw.cost.map(|dollars| (dollars.max(0.0) * 100.0).round() as u32))
        .unwrap_or(0);

    let age_range = match (raw.age_min, raw.age_max) {
        (Some(min), Some(max)) if min <= max => Some(AgeRange {
            min_years: min,
            max_years: max,
        }),
        (Some(min), None) => Some(AgeRange {
            min_years: min,
            max_years: 17,
        }),
        (None, Some(max)) => Some(AgeRange {
            min_years: 0,
            max_years: max,
        }),
        _ => None,
    };

    let capacity = match (raw.capacity_available, raw.capacity_total) {
        (None, None) => None,
        (available, total) => Some(Capacity { available, total }),
    };

    Ok(CandidateEvent {
        source: raw.source.unwrap_or_else(|| "unknown".to_string()),
        title,
        starts_at,
        all_day,
        location: Location {
            address: raw.address.unwrap_or_default().trim().to_string(),
            lat: raw.lat,
            lng: raw.lng,
        },
        age_range,
        cost_cents,
        registration_url: raw
            .registration_url
            .map(|u| sanitize_url(&u))
            .unwrap_or_default(),
        registration_opens_at,
        capacity,
        description: raw.description.unwrap_or_default(),
        raw_content: raw.raw_content.unwrap_or_default(),
    })
}

/// Validate a batch, logging each drop. Dropped candidates never reach the
/// merge engine.
pub fn ingest_batch(raws: Vec<RawCandidate>) -> (Vec<CandidateEvent>, IngestStats) {
    let mut stats = IngestStats::default();
    let mut accepted = Vec::with_capacity(raws.len());

    for raw in raws {
        let source = raw.source.clone().unwrap_or_else(|| "unknown".to_string());
        let title = raw.title.clone().unwrap_or_default();
        match validate(raw) {
            Ok(candidate) => {
                stats.accepted += 1;
                accepted.push(candidate);
            }
            Err(reason) => {
                stats.dropped += 1;
                debug!(%source, %title, %reason, "Dropped candidate at ingest boundary");
            }
        }
    }

    (accepted, stats)
}

/// Parse a start timestamp. Accepts RFC 3339, "YYYY-MM-DD HH:MM[:SS]", and
/// bare "YYYY-MM-DD" (treated as all-day).
fn parse_start(text: &str) -> Option<(DateTime<Utc>, bool)> {
    if let Ok(at) = DateTime::parse_from_rfc3339(text) {
        return Some((at.with_timezone(&Utc), false));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some((naive.and_utc(), false));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        let midnight = date.and_hms_opt(0, 0, 0)?;
        return Some((midnight.and_utc(), true));
    }
    None
}

/// Strip tracking parameters from registration URLs so the same form seen
/// through different campaigns deduplicates.
pub fn sanitize_url(url: &str) -> String {
    const TRACKING_PARAMS: &[&str] = &[
        "fbclid",
        "gclid",
        "utm_source",
        "utm_medium",
        "utm_campaign",
        "utm_term",
        "utm_content",
        "ref",
        "mc_cid",
        "mc_eid",
    ];

    let Ok(mut parsed) = url::Url::parse(url) else {
        return url.to_string();
    };

    if parsed.query().is_none() {
        return url.to_string();
    }

    let clean_pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(key, _)| !TRACKING_PARAMS.contains(&key.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if clean_pairs.is_empty() {
        parsed.set_query(None);
    } else {
        parsed.query_pairs_mut().clear().extend_pairs(clean_pairs);
    }

    parsed.to_string()
}
