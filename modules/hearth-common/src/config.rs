use std::collections::BTreeSet;
use std::env;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use tracing::info;
use typed_builder::TypedBuilder;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Notification channels
    pub twilio_account_sid: String,
    pub twilio_auth_token: String,
    pub twilio_from_number: String,
    pub mail_api_url: String,
    pub mail_user: String,

    // Approval recipient
    pub approval_recipient: String,
    pub approval_channel: String,

    // Collaborators
    pub anthropic_api_key: String,
    pub forecast_api_url: String,
    pub forecast_api_key: String,
    pub formrunner_url: String,
    pub formrunner_token: Option<String>,

    // Registrant identity for automated forms
    pub registrant_name: String,
    pub registrant_email: String,
    pub registrant_phone: String,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            twilio_account_sid: required_env("TWILIO_ACCOUNT_SID"),
            twilio_auth_token: required_env("TWILIO_AUTH_TOKEN"),
            twilio_from_number: required_env("TWILIO_FROM_NUMBER"),
            mail_api_url: env::var("MAIL_API_URL")
                .unwrap_or_else(|_| "https://mail.example.com/v1".to_string()),
            mail_user: env::var("MAIL_USER").unwrap_or_default(),
            approval_recipient: required_env("APPROVAL_RECIPIENT"),
            approval_channel: env::var("APPROVAL_CHANNEL").unwrap_or_else(|_| "sms".to_string()),
            anthropic_api_key: required_env("ANTHROPIC_API_KEY"),
            forecast_api_url: env::var("FORECAST_API_URL")
                .unwrap_or_else(|_| "https://api.weather.example.com/v1".to_string()),
            forecast_api_key: required_env("FORECAST_API_KEY"),
            formrunner_url: required_env("FORMRUNNER_URL"),
            formrunner_token: env::var("FORMRUNNER_TOKEN").ok(),
            registrant_name: required_env("REGISTRANT_NAME"),
            registrant_email: required_env("REGISTRANT_EMAIL"),
            registrant_phone: required_env("REGISTRANT_PHONE"),
        }
    }

    /// Log the loaded configuration with secrets redacted.
    pub fn log_redacted(&self) {
        info!(
            approval_channel = %self.approval_channel,
            formrunner_url = %self.formrunner_url,
            forecast_api_url = %self.forecast_api_url,
            twilio_from = %self.twilio_from_number,
            "Config loaded (keys redacted)"
        );
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

// --- Household configuration snapshot ---

/// Point-in-time snapshot of the household's mutable policy knobs, threaded
/// explicitly through every filtering call. Never read as a global; refreshed
/// through [`ConfigCache`] so edits take effect without restart.
#[derive(Debug, Clone, TypedBuilder)]
pub struct HouseholdSnapshot {
    /// Maximum acceptable event cost. Free events always pass budget.
    #[builder(default = 0)]
    pub budget_ceiling_cents: u32,

    /// Weekday events must start at or after this local time.
    #[builder(default = NaiveTime::from_hms_opt(16, 0, 0).unwrap())]
    pub weekday_earliest: NaiveTime,

    /// Weekend events must start at or after this local time.
    #[builder(default = NaiveTime::from_hms_opt(8, 0, 0).unwrap())]
    pub weekend_earliest: NaiveTime,

    /// Quiet/nap window. Demotes, never excludes.
    #[builder(default = NaiveTime::from_hms_opt(12, 30, 0).unwrap())]
    pub nap_start: NaiveTime,
    #[builder(default = NaiveTime::from_hms_opt(15, 0, 0).unwrap())]
    pub nap_end: NaiveTime,

    /// Minimum advance notice before an event is bookable.
    #[builder(default = 12)]
    pub min_lead_hours: i64,

    /// Maximum advance-booking horizon.
    #[builder(default = 60)]
    pub max_lead_days: i64,

    #[builder(default)]
    pub child_birthdates: Vec<NaiveDate>,

    /// Fingerprints of events the household has already attended.
    #[builder(default)]
    pub attended_fingerprints: BTreeSet<String>,

    #[builder(default = Utc::now())]
    pub fetched_at: DateTime<Utc>,
}

impl HouseholdSnapshot {
    /// Children's whole-year ages as of `on`.
    pub fn child_ages(&self, on: NaiveDate) -> Vec<u8> {
        self.child_birthdates
            .iter()
            .filter_map(|birth| {
                let mut years = on.year() - birth.year();
                if (on.month(), on.day()) < (birth.month(), birth.day()) {
                    years -= 1;
                }
                u8::try_from(years).ok()
            })
            .collect()
    }
}

/// How long a [`HouseholdSnapshot`] stays fresh before the cache refetches.
pub const CONFIG_CACHE_TTL_MINUTES: i64 = 5;

/// Source of truth for household configuration, typically backed by the
/// persistent store so dashboard edits flow through.
#[async_trait]
pub trait HouseholdConfigSource: Send + Sync {
    async fn load(&self) -> anyhow::Result<HouseholdSnapshot>;
}

/// A fixed snapshot, for tests and single-run tooling.
pub struct StaticConfigSource(pub HouseholdSnapshot);

#[async_trait]
impl HouseholdConfigSource for StaticConfigSource {
    async fn load(&self) -> anyhow::Result<HouseholdSnapshot> {
        let mut snap = self.0.clone();
        snap.fetched_at = Utc::now();
        Ok(snap)
    }
}

/// Time-bounded cache in front of a [`HouseholdConfigSource`]. Callers get a
/// snapshot at most [`CONFIG_CACHE_TTL_MINUTES`] old.
pub struct ConfigCache {
    source: Arc<dyn HouseholdConfigSource>,
    ttl_minutes: i64,
    cached: tokio::sync::Mutex<Option<HouseholdSnapshot>>,
}

impl ConfigCache {
    pub fn new(source: Arc<dyn HouseholdConfigSource>) -> Self {
        Self {
            source,
            ttl_minutes: CONFIG_CACHE_TTL_MINUTES,
            cached: tokio::sync::Mutex::new(None),
        }
    }

    pub fn with_ttl_minutes(mut self, minutes: i64) -> Self {
        self.ttl_minutes = minutes;
        self
    }

    pub async fn snapshot(&self, now: DateTime<Utc>) -> anyhow::Result<HouseholdSnapshot> {
        let mut cached = self.cached.lock().await;
        if let Some(snap) = cached.as_ref() {
            if now - snap.fetched_at < chrono::Duration::minutes(self.ttl_minutes) {
                return Ok(snap.clone());
            }
        }
        let fresh = self.source.load().await?;
        *cached = Some(fresh.clone());
        Ok(fresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_ages_respect_birthday_boundary() {
        let snap = HouseholdSnapshot::builder()
            .child_birthdates(vec![
                NaiveDate::from_ymd_opt(2021, 6, 15).unwrap(),
                NaiveDate::from_ymd_opt(2023, 1, 2).unwrap(),
            ])
            .build();

        let on = NaiveDate::from_ymd_opt(2025, 6, 14).unwrap();
        assert_eq!(snap.child_ages(on), vec![3, 2]);

        let on = NaiveDate::from_ymd_opt(2025, 6, 15).unwrap();
        assert_eq!(snap.child_ages(on), vec![4, 2]);
    }

    #[test]
    fn builder_defaults_are_sane() {
        let snap = HouseholdSnapshot::builder().build();
        assert_eq!(snap.budget_ceiling_cents, 0);
        assert!(snap.nap_start < snap.nap_end);
        assert!(snap.min_lead_hours > 0);
        assert!(snap.max_lead_days > 0);
    }

    #[tokio::test]
    async fn cache_returns_same_snapshot_within_ttl() {
        let source = Arc::new(StaticConfigSource(
            HouseholdSnapshot::builder().budget_ceiling_cents(2500).build(),
        ));
        let cache = ConfigCache::new(source);

        let now = Utc::now();
        let first = cache.snapshot(now).await.unwrap();
        let second = cache.snapshot(now).await.unwrap();
        assert_eq!(first.fetched_at, second.fetched_at);
    }

    #[tokio::test]
    async fn cache_refetches_after_ttl() {
        let source = Arc::new(StaticConfigSource(HouseholdSnapshot::builder().build()));
        let cache = ConfigCache::new(source);

        let now = Utc::now();
        let first = cache.snapshot(now).await.unwrap();
        let later = now + chrono::Duration::minutes(CONFIG_CACHE_TTL_MINUTES + 1);
        let second = cache.snapshot(later).await.unwrap();
        assert!(second.fetched_at >= first.fetched_at);
    }
}
