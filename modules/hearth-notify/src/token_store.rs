//! Credential store boundary for OAuth-backed channels.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A token is refreshed when it expires within this margin, so a send never
/// races its own credential's expiry.
pub const REFRESH_MARGIN_MINUTES: i64 = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthToken {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl OAuthToken {
    /// Whether this token needs a refresh before use at `now`.
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - now < Duration::minutes(REFRESH_MARGIN_MINUTES)
    }
}

/// Per (user, provider) token storage. Refreshed tokens are persisted back
/// so the next process start doesn't rediscover the expiry.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn get(&self, user: &str, provider: &str) -> Result<Option<OAuthToken>>;

    async fn put(&self, user: &str, provider: &str, token: &OAuthToken) -> Result<()>;
}

#[derive(Default)]
pub struct MemoryTokenStore {
    tokens: tokio::sync::Mutex<HashMap<(String, String), OAuthToken>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn get(&self, user: &str, provider: &str) -> Result<Option<OAuthToken>> {
        let tokens = self.tokens.lock().await;
        Ok(tokens.get(&(user.to_string(), provider.to_string())).cloned())
    }

    async fn put(&self, user: &str, provider: &str, token: &OAuthToken) -> Result<()> {
        let mut tokens = self.tokens.lock().await;
        tokens.insert((user.to_string(), provider.to_string()), token.clone());
        Ok(())
    }
}
