pub mod error;

pub use error::{ForecastError, Result};

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Forecast cache freshness window.
pub const CACHE_TTL_HOURS: i64 = 6;

/// Geohash precision for cache keys: ~20km cells, one forecast per
/// neighborhood per day.
const CACHE_GEOHASH_LEN: usize = 4;

/// One day's forecast for one location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forecast {
    pub temperature_c: f64,
    pub condition: String,
    /// 0.0-1.0
    pub precipitation_chance: f64,
    pub wind_kph: f64,
    pub is_outdoor_friendly: bool,
}

#[derive(Debug, Deserialize)]
struct DailyResponse {
    temperature_c: f64,
    condition: String,
    precipitation_chance: f64,
    wind_kph: f64,
}

impl DailyResponse {
    /// Outdoor-friendly: under 50% precipitation chance, -5..35°C, wind
    /// below 40 kph.
    fn into_forecast(self) -> Forecast {
        let friendly = self.precipitation_chance < 0.5
            && (-5.0..=35.0).contains(&self.temperature_c)
            && self.wind_kph < 40.0;
        Forecast {
            temperature_c: self.temperature_c,
            condition: self.condition,
            precipitation_chance: self.precipitation_chance,
            wind_kph: self.wind_kph,
            is_outdoor_friendly: friendly,
        }
    }
}

pub struct ForecastClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    cache: tokio::sync::Mutex<HashMap<(String, NaiveDate), (Forecast, DateTime<Utc>)>>,
}

impl ForecastClient {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            cache: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Fetch the forecast for a date and location, served from the
    /// (location, date) cache when fresher than [`CACHE_TTL_HOURS`].
    pub async fn forecast(&self, date: NaiveDate, lat: f64, lng: f64) -> Result<Forecast> {
        let key = (cache_cell(lat, lng), date);

        {
            let cache = self.cache.lock().await;
            if let Some((forecast, fetched_at)) = cache.get(&key) {
                if Utc::now() - *fetched_at < chrono::Duration::hours(CACHE_TTL_HOURS) {
                    debug!(cell = %key.0, %date, "Forecast cache hit");
                    return Ok(forecast.clone());
                }
            }
        }

        let endpoint = format!("{}/daily", self.base_url);
        let resp = self
            .client
            .get(&endpoint)
            .query(&[
                ("lat", lat.to_string()),
                ("lng", lng.to_string()),
                ("date", date.to_string()),
                ("key", self.api_key.clone()),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ForecastError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let daily: DailyResponse = resp.json().await?;
        let forecast = daily.into_forecast();

        let mut cache = self.cache.lock().await;
        cache.insert(key, (forecast.clone(), Utc::now()));
        Ok(forecast)
    }
}

/// Bucket coordinates into a geohash cell for cache keying. Falls back to a
/// rounded lat/lng string for out-of-range coordinates.
fn cache_cell(lat: f64, lng: f64) -> String {
    geohash::encode(geohash::Coord { x: lng, y: lat }, CACHE_GEOHASH_LEN)
        .unwrap_or_else(|_| format!("{lat:.1},{lng:.1}"))
}
