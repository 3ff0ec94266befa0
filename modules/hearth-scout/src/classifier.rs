//! Claude-backed suitability classifier.
//!
//! One request per batch: every event's listing text goes into a single
//! prompt and the model returns one verdict per event as strict JSON. Any
//! failure here is advisory; the filter engine falls back to the
//! rule-based age check.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::debug;

use hearth_common::types::CanonicalEvent;

use crate::traits::{Suitability, SuitabilityClassifier};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MODEL: &str = "claude-3-5-haiku-latest";
const MAX_TOKENS: u32 = 2048;

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

pub struct ClaudeClassifier {
    api_key: String,
    http: reqwest::Client,
    base_url: String,
}

impl ClaudeClassifier {
    pub fn new(api_key: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            http: reqwest::Client::new(),
            base_url: ANTHROPIC_API_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.to_string();
        self
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_str(&self.api_key)?);
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/messages", self.base_url);

        debug!(model = %request.model, "Suitability classification request");

        let response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            return Err(anyhow!("Claude API error ({}): {}", status, error_text));
        }

        Ok(response.json().await?)
    }
}

fn system_prompt(child_ages: &[u8]) -> String {
    let ages: Vec<String> = child_ages.iter().map(|a| a.to_string()).collect();
    format!(
        "You assess whether family events suit children aged {}. For each \
         numbered event, decide from the listing text whether at least one of \
         the children fits, and extract a start time of day (24h \"HH:MM\") if \
         the text states one. Respond with ONLY a JSON array, one object per \
         event in order: {{\"suitable\": bool, \"reason\": string, \
         \"extracted_time\": string or null}}.",
        ages.join(", ")
    )
}

fn batch_prompt(events: &[CanonicalEvent]) -> String {
    let mut prompt = String::new();
    for (i, event) in events.iter().enumerate() {
        let ages = match event.age_range {
            Some(range) => format!("{}-{}", range.min_years, range.max_years),
            None => "not declared".to_string(),
        };
        prompt.push_str(&format!(
            "{}. {}\nDeclared ages: {}\n{}\n\n",
            i + 1,
            event.title,
            ages,
            event.description
        ));
    }
    prompt
}

/// Strip a markdown code fence if the model wrapped its JSON in one.
fn extract_json(text: &str) -> &str {
    let trimmed = text.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed)
}

#[async_trait]
impl SuitabilityClassifier for ClaudeClassifier {
    async fn classify(
        &self,
        events: &[CanonicalEvent],
        child_ages: &[u8],
    ) -> Result<Vec<Suitability>> {
        if events.is_empty() {
            return Ok(vec![]);
        }

        let request = ChatRequest {
            model: MODEL.to_string(),
            max_tokens: MAX_TOKENS,
            system: system_prompt(child_ages),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: batch_prompt(events),
            }],
        };

        let response = self.chat(&request).await?;
        let text = response
            .content
            .first()
            .map(|block| block.text.as_str())
            .ok_or_else(|| anyhow!("empty classifier response"))?;

        let verdicts: Vec<Suitability> = serde_json::from_str(extract_json(text))?;
        if verdicts.len() != events.len() {
            return Err(anyhow!(
                "classifier returned {} verdicts for {} events",
                verdicts.len(),
                events.len()
            ));
        }
        Ok(verdicts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::make_event;

    #[test]
    fn batch_prompt_numbers_every_event() {
        let events = vec![make_event("Storytime"), make_event("Open Gym")];
        let prompt = batch_prompt(&events);
        assert!(prompt.contains("1. Storytime"));
        assert!(prompt.contains("2. Open Gym"));
    }

    #[test]
    fn extract_json_unwraps_code_fence() {
        let fenced = "```json\n[{\"suitable\": true}]\n```";
        assert_eq!(extract_json(fenced), "[{\"suitable\": true}]");
        let bare = "[{\"suitable\": true}]";
        assert_eq!(extract_json(bare), bare);
    }

    #[test]
    fn verdicts_parse_from_model_output() {
        let text = r#"[{"suitable": true, "reason": "fits", "extracted_time": "10:00"},
                       {"suitable": false, "reason": "teens only", "extracted_time": null}]"#;
        let verdicts: Vec<Suitability> = serde_json::from_str(extract_json(text)).unwrap();
        assert_eq!(verdicts.len(), 2);
        assert_eq!(verdicts[0].extracted_time.as_deref(), Some("10:00"));
        assert!(!verdicts[1].suitable);
    }
}
