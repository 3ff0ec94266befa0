use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

const TWILIO_API_URL: &str = "https://api.twilio.com/2010-04-01";

pub type Result<T> = std::result::Result<T, TwilioError>;

#[derive(Debug, Error)]
pub enum TwilioError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },
}

impl From<reqwest::Error> for TwilioError {
    fn from(err: reqwest::Error) -> Self {
        TwilioError::Network(err.to_string())
    }
}

/// An accepted outbound message.
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub sid: String,
    pub status: String,
}

pub struct TwilioClient {
    client: reqwest::Client,
    account_sid: String,
    auth_token: String,
    base_url: String,
}

impl TwilioClient {
    pub fn new(account_sid: &str, auth_token: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            account_sid: account_sid.to_string(),
            auth_token: auth_token.to_string(),
            base_url: TWILIO_API_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    /// Send an SMS via the Messages API. Returns the provider message SID.
    pub async fn send_message(&self, from: &str, to: &str, body: &str) -> Result<Message> {
        let endpoint = format!(
            "{}/Accounts/{}/Messages.json",
            self.base_url, self.account_sid
        );

        let params = [("From", from), ("To", to), ("Body", body)];

        let resp = self
            .client
            .post(&endpoint)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&params)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(TwilioError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(resp.json().await?)
    }
}
