//! HTTP client for the household calendar collaborator. Checks a timestamp
//! against both household calendars and reports hard vs advisory conflicts.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::traits::{CalendarProvider, CalendarVerdict};

#[derive(Debug, Deserialize)]
struct ConflictResponse {
    has_conflict: bool,
    has_warning: bool,
}

pub struct CalendarClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl CalendarClient {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }
}

#[async_trait]
impl CalendarProvider for CalendarClient {
    async fn conflicts(&self, at: DateTime<Utc>) -> Result<CalendarVerdict> {
        let url = format!("{}/conflicts", self.base_url);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.api_key)
            .query(&[("at", at.to_rfc3339())])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Calendar API error ({status}): {body}"));
        }

        let conflict: ConflictResponse = response.json().await?;
        Ok(CalendarVerdict {
            has_conflict: conflict.has_conflict,
            has_warning: conflict.has_warning,
        })
    }
}
