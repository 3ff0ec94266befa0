//! Email delivery through an OAuth-authorized mail API. The channel
//! refreshes its token transparently before use and persists the refreshed
//! credential back to the store.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tracing::debug;

use hearth_common::types::{Channel, Notification};

use crate::channel::NotificationChannel;
use crate::token_store::{OAuthToken, TokenStore};

const MAIL_PROVIDER: &str = "mail";

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    /// Seconds until expiry.
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    message_id: String,
}

pub struct EmailChannel {
    http: reqwest::Client,
    base_url: String,
    user: String,
    tokens: Arc<dyn TokenStore>,
}

impl EmailChannel {
    pub fn new(base_url: &str, user: &str, tokens: Arc<dyn TokenStore>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            user: user.to_string(),
            tokens,
        }
    }

    /// Load the user's token, refreshing it when it expires within the
    /// refresh margin. The refreshed token is written back before use.
    async fn fresh_token(&self) -> Result<OAuthToken> {
        let token = self
            .tokens
            .get(&self.user, MAIL_PROVIDER)
            .await?
            .ok_or_else(|| anyhow!("no mail token stored for {}", self.user))?;

        if !token.needs_refresh(Utc::now()) {
            return Ok(token);
        }

        debug!(user = %self.user, "Mail token near expiry, refreshing");
        let resp = self
            .http
            .post(format!("{}/oauth/refresh", self.base_url))
            .json(&serde_json::json!({ "refresh_token": token.refresh_token }))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("token refresh failed ({status}): {body}"));
        }

        let refreshed: RefreshResponse = resp.json().await?;
        let new_token = OAuthToken {
            access_token: refreshed.access_token,
            refresh_token: token.refresh_token,
            expires_at: Utc::now() + chrono::Duration::seconds(refreshed.expires_in),
        };
        self.tokens
            .put(&self.user, MAIL_PROVIDER, &new_token)
            .await?;
        Ok(new_token)
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn kind(&self) -> Channel {
        Channel::Email
    }

    async fn deliver(&self, notification: &Notification) -> Result<String> {
        let token = self.fresh_token().await?;

        let body = serde_json::json!({
            "to": notification.recipient,
            "subject": notification.subject.as_deref().unwrap_or("Event approval needed"),
            "body": notification.body,
        });

        let resp = self
            .http
            .post(format!("{}/messages", self.base_url))
            .bearer_auth(&token.access_token)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("mail send failed ({status}): {text}"));
        }

        let sent: SendResponse = resp.json().await?;
        Ok(sent.message_id)
    }
}
