//! Identity resolution across sources.
//!
//! Candidates whose fingerprints match an existing canonical event merge
//! exactly. Near-misses are scored on title, date, and location proximity
//! and merge when the blend clears [`FUZZY_MERGE_THRESHOLD`]. Below the
//! threshold they simply remain separate events; a false split is
//! recoverable, a false merge needs the audit trail.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use hearth_common::types::{
    haversine_km, CandidateEvent, CanonicalEvent, EventStatus, Location, MergeRecord, MergeType,
};

use crate::fingerprint::{fingerprint, normalize_title};

/// Blend threshold above which two sightings are treated as one event.
/// Tunable; validated by the no-false-merge scenarios in tests.
pub const FUZZY_MERGE_THRESHOLD: f64 = 0.82;

const TITLE_WEIGHT: f64 = 0.55;
const TEMPORAL_WEIGHT: f64 = 0.25;
const GEO_WEIGHT: f64 = 0.20;

/// Date proximity falls off linearly to zero over this window.
const TEMPORAL_WINDOW_HOURS: f64 = 48.0;

/// Location proximity falls off linearly to zero over this radius.
const GEO_RADIUS_KM: f64 = 5.0;

#[derive(Debug, Default)]
pub struct MergeStats {
    pub exact_merges: u32,
    pub fuzzy_merges: u32,
    pub created: u32,
}

pub struct MergeOutcome {
    pub canonical: Vec<CanonicalEvent>,
    pub merges: Vec<MergeRecord>,
    pub stats: MergeStats,
}

pub struct MergeEngine {
    threshold: f64,
}

impl Default for MergeEngine {
    fn default() -> Self {
        Self {
            threshold: FUZZY_MERGE_THRESHOLD,
        }
    }
}

impl MergeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_threshold(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Collapse a candidate batch into the existing canonical set. Returns
    /// the full canonical set (existing, enriched, plus newly created) and
    /// one audit record per merge performed.
    pub fn merge(
        &self,
        candidates: Vec<CandidateEvent>,
        existing: Vec<CanonicalEvent>,
        now: DateTime<Utc>,
    ) -> MergeOutcome {
        let mut canonical = existing;
        let mut index: HashMap<String, usize> = canonical
            .iter()
            .enumerate()
            .map(|(i, e)| (e.fingerprint.clone(), i))
            .collect();

        let mut merges = Vec::new();
        let mut stats = MergeStats::default();

        for candidate in candidates {
            let fp = fingerprint(&candidate);

            if let Some(&i) = index.get(&fp) {
                merges.push(merge_record(&canonical[i], &candidate, &fp, 1.0, MergeType::Exact, now));
                absorb(&mut canonical[i], &candidate, now);
                stats.exact_merges += 1;
                continue;
            }

            let best = canonical
                .iter()
                .enumerate()
                .map(|(i, event)| (i, similarity(&candidate, event)))
                .max_by(|a, b| a.1.total_cmp(&b.1));

            match best {
                Some((i, score)) if score >= self.threshold => {
                    debug!(
                        title = %candidate.title,
                        into = %canonical[i].title,
                        score,
                        "Fuzzy merge"
                    );
                    merges.push(merge_record(
                        &canonical[i],
                        &candidate,
                        &fp,
                        score,
                        MergeType::Fuzzy,
                        now,
                    ));
                    absorb(&mut canonical[i], &candidate, now);
                    // The absorbed sighting's fingerprint now resolves to the
                    // primary, so a repeat becomes an exact merge.
                    index.insert(fp, i);
                    stats.fuzzy_merges += 1;
                }
                _ => {
                    let event = new_canonical(&candidate, fp.clone(), now);
                    index.insert(fp, canonical.len());
                    canonical.push(event);
                    stats.created += 1;
                }
            }
        }

        MergeOutcome {
            canonical,
            merges,
            stats,
        }
    }
}

/// Weighted blend of title, date, and location proximity, 0.0-1.0.
pub fn similarity(candidate: &CandidateEvent, event: &CanonicalEvent) -> f64 {
    let title_sim = strsim::jaro_winkler(
        &normalize_title(&candidate.title),
        &normalize_title(&event.title),
    );
    let temporal = temporal_proximity(candidate.starts_at, event.starts_at);
    let geo = geo_proximity(&candidate.location, &event.location);

    TITLE_WEIGHT * title_sim + TEMPORAL_WEIGHT * temporal + GEO_WEIGHT * geo
}

fn temporal_proximity(a: DateTime<Utc>, b: DateTime<Utc>) -> f64 {
    let diff_hours = (a - b).num_minutes().abs() as f64 / 60.0;
    (1.0 - diff_hours / TEMPORAL_WINDOW_HOURS).max(0.0)
}

fn geo_proximity(a: &Location, b: &Location) -> f64 {
    match (a.lat, a.lng, b.lat, b.lng) {
        (Some(la1), Some(lo1), Some(la2), Some(lo2)) => {
            let km = haversine_km(la1, lo1, la2, lo2);
            (1.0 - km / GEO_RADIUS_KM).max(0.0)
        }
        _ => {
            // Fall back to address text similarity
            match (a.address.is_empty(), b.address.is_empty()) {
                (false, false) => {
                    strsim::jaro_winkler(&a.address.to_lowercase(), &b.address.to_lowercase())
                }
                (true, true) => 0.5,
                _ => 0.3,
            }
        }
    }
}

fn merge_record(
    primary: &CanonicalEvent,
    candidate: &CandidateEvent,
    candidate_fingerprint: &str,
    similarity: f64,
    merge_type: MergeType,
    now: DateTime<Utc>,
) -> MergeRecord {
    MergeRecord {
        id: Uuid::new_v4(),
        primary_id: primary.id,
        merged_fingerprint: candidate_fingerprint.to_string(),
        merged_snapshot: serde_json::to_value(candidate).unwrap_or(serde_json::Value::Null),
        similarity,
        merge_type,
        merged_at: now,
    }
}

/// Enrich the surviving event with the merged candidate's data. Additive
/// only: a present field is replaced only by a strictly more complete value.
fn absorb(event: &mut CanonicalEvent, candidate: &CandidateEvent, now: DateTime<Utc>) {
    event.sources.insert(candidate.source.clone());
    event.merge_count += 1;
    event.last_merged_at = Some(now);

    if candidate.description.len() > event.description.len() {
        event.description = candidate.description.clone();
    }

    // A timed sighting beats an all-day placeholder.
    if event.all_day && !candidate.all_day {
        event.starts_at = candidate.starts_at;
        event.all_day = false;
    }

    if event.location.lat.is_none() && candidate.location.has_coords() {
        event.location.lat = candidate.location.lat;
        event.location.lng = candidate.location.lng;
    }
    if event.location.address.is_empty() && !candidate.location.address.is_empty() {
        event.location.address = candidate.location.address.clone();
    }

    match (event.age_range, candidate.age_range) {
        (None, Some(range)) => event.age_range = Some(range),
        (Some(current), Some(incoming)) if incoming.span() < current.span() => {
            event.age_range = Some(incoming);
        }
        _ => {}
    }

    match (event.capacity, candidate.capacity) {
        (None, Some(cap)) => event.capacity = Some(cap),
        (Some(current), Some(incoming))
            if current.available.is_none() && incoming.available.is_some() =>
        {
            event.capacity = Some(incoming);
        }
        _ => {}
    }

    // Conflicting declared costs resolve upward; a paid signal must not be
    // erased by a source that omits the price.
    if candidate.cost_cents > event.cost_cents {
        event.cost_cents = candidate.cost_cents;
    }

    if event.registration_opens_at.is_none() {
        event.registration_opens_at = candidate.registration_opens_at;
    }

    let url = &candidate.registration_url;
    if !url.is_empty() {
        if event.registration_url.is_empty() {
            event.registration_url = url.clone();
        } else if event.registration_url != *url && !event.alternate_urls.contains(url) {
            event.alternate_urls.push(url.clone());
        }
    }
}

fn new_canonical(candidate: &CandidateEvent, fingerprint: String, now: DateTime<Utc>) -> CanonicalEvent {
    CanonicalEvent {
        id: Uuid::new_v4(),
        fingerprint,
        title: candidate.title.clone(),
        starts_at: candidate.starts_at,
        all_day: candidate.all_day,
        location: candidate.location.clone(),
        age_range: candidate.age_range,
        cost_cents: candidate.cost_cents,
        registration_url: candidate.registration_url.clone(),
        alternate_urls: vec![],
        registration_opens_at: candidate.registration_opens_at,
        capacity: candidate.capacity,
        description: candidate.description.clone(),
        status: EventStatus::Discovered,
        sources: [candidate.source.clone()].into(),
        merge_count: 1,
        first_seen: now,
        last_merged_at: None,
        filter: None,
        score: None,
    }
}
