//! Content fingerprints for exact-duplicate detection.
//!
//! A fingerprint hashes the normalized title, a day-level date bucket, and a
//! coarse venue token. The date bucket absorbs minor timestamp skew between
//! sources; the venue token absorbs address formatting differences.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use hearth_common::types::{CandidateEvent, Location};

/// Geohash precision for the venue token: ~5km cells, coarse enough that
/// two sources' slightly different pins for one venue land together.
const VENUE_GEOHASH_LEN: usize = 5;

/// Lower-case and collapse all whitespace runs to single spaces.
pub fn normalize_title(title: &str) -> String {
    title
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Day-level bucket; exact timestamps differ across sources for the same
/// event.
pub fn date_bucket(starts_at: DateTime<Utc>) -> String {
    starts_at.format("%Y-%m-%d").to_string()
}

/// Coarse venue token: a geohash cell when coordinates exist, otherwise the
/// first words of the normalized address.
pub fn venue_token(location: &Location) -> String {
    if let (Some(lat), Some(lng)) = (location.lat, location.lng) {
        if let Ok(hash) = geohash::encode(geohash::Coord { x: lng, y: lat }, VENUE_GEOHASH_LEN) {
            return hash;
        }
    }

    let normalized: Vec<String> = location
        .address
        .to_lowercase()
        .split_whitespace()
        .map(|w| w.chars().filter(|c| c.is_alphanumeric()).collect())
        .filter(|w: &String| !w.is_empty())
        .take(2)
        .collect();

    if normalized.is_empty() {
        "unknown".to_string()
    } else {
        normalized.join("-")
    }
}

/// Stable content fingerprint for a candidate.
pub fn fingerprint(candidate: &CandidateEvent) -> String {
    let key = format!(
        "{}|{}|{}",
        normalize_title(&candidate.title),
        date_bucket(candidate.starts_at),
        venue_token(&candidate.location)
    );
    let digest = Sha256::digest(key.as_bytes());
    format!("{digest:x}")
}
