pub mod error;

pub use error::{FormRunnerError, Result};

use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct SessionResponse {
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct ContentResponse {
    content: String,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    confirmation: String,
}

/// Client for a FormRunner session: one rendered browser page at a time,
/// driven through navigate / fill / content / submit endpoints.
pub struct FormRunnerClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    session: tokio::sync::Mutex<Option<String>>,
}

impl FormRunnerClient {
    pub fn new(base_url: &str, token: Option<&str>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(String::from),
            session: tokio::sync::Mutex::new(None),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        let mut url = format!("{}{path}", self.base_url);
        if let Some(ref token) = self.token {
            url.push_str(&format!("?token={token}"));
        }
        url
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(FormRunnerError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(resp)
    }

    async fn session_id(&self) -> Result<String> {
        self.session
            .lock()
            .await
            .clone()
            .ok_or(FormRunnerError::NoSession)
    }

    /// Open a fresh browser session on `url`, replacing any previous one.
    pub async fn navigate(&self, url: &str) -> Result<()> {
        let body = serde_json::json!({ "url": url });
        let resp = self
            .client
            .post(self.endpoint("/session"))
            .json(&body)
            .send()
            .await?;
        let resp = Self::check(resp).await?;
        let session: SessionResponse = resp.json().await?;
        debug!(url, session_id = %session.session_id, "FormRunner session opened");
        *self.session.lock().await = Some(session.session_id);
        Ok(())
    }

    /// Type a value into the field matched by `selector`.
    pub async fn fill_field(&self, selector: &str, value: &str) -> Result<()> {
        let id = self.session_id().await?;
        let body = serde_json::json!({ "selector": selector, "value": value });
        let resp = self
            .client
            .post(self.endpoint(&format!("/session/{id}/fill")))
            .json(&body)
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    /// Fully-rendered page content for the current session.
    pub async fn rendered_content(&self) -> Result<String> {
        let id = self.session_id().await?;
        let resp = self
            .client
            .get(self.endpoint(&format!("/session/{id}/content")))
            .send()
            .await?;
        let resp = Self::check(resp).await?;
        let content: ContentResponse = resp.json().await?;
        Ok(content.content)
    }

    /// Click the submit element matched by `selector` and return the
    /// confirmation text the page settles on.
    pub async fn submit(&self, selector: &str) -> Result<String> {
        let id = self.session_id().await?;
        let body = serde_json::json!({ "selector": selector });
        let resp = self
            .client
            .post(self.endpoint(&format!("/session/{id}/submit")))
            .json(&body)
            .send()
            .await?;
        let resp = Self::check(resp).await?;
        let submit: SubmitResponse = resp.json().await?;
        Ok(submit.confirmation)
    }
}
