use crate::config::Config;
use crate::logw;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

pub const QUOTE_PROMPT: &str = "Generate a unique, meaningful quote in 10-15 words.";

const TEMPERATURE: f64 = 1.5;
const MAX_OUTPUT_TOKENS: u32 = 50;
const REQUEST_TIMEOUT_S: u64 = 60;

/// Anything that can turn a prompt into a piece of text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// `Ok(None)` means the upstream answered but produced nothing usable.
    async fn generate(&self, prompt: &str) -> Result<Option<String>>;
}

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    endpoint: String,
}

impl GeminiClient {
    pub fn new(client: Client, cfg: &Config) -> Self {
        let endpoint = format!(
            "{}/models/{}:generateContent",
            cfg.gemini_base_url.trim_end_matches('/'),
            cfg.gemini_model
        );
        Self {
            client,
            api_key: cfg.gemini_key.clone(),
            endpoint,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

pub(crate) fn gemini_extract_text(resp_json: &str) -> Option<String> {
    let root: serde_json::Value = serde_json::from_str(resp_json).ok()?;

    if let Some(err) = root.get("error") {
        if let Some(msg) = err.get("message").and_then(|v| v.as_str()) {
            logw(format!("Gemini error message: {}", msg));
        }
        if let Some(status) = err.get("status").and_then(|v| v.as_str()) {
            logw(format!("Gemini error status: {}", status));
        }
        return None;
    }

    let text = root
        .get("candidates")?
        .as_array()?
        .first()?
        .get("content")?
        .get("parts")?
        .as_array()?
        .first()?
        .get("text")?
        .as_str()?
        .trim();

    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<Option<String>> {
        let body = json!({
            "contents": [{"parts": [{"text": prompt}]}],
            "generationConfig": {
                "temperature": TEMPERATURE,
                "maxOutputTokens": MAX_OUTPUT_TOKENS,
            },
        });

        let resp = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_S))
            .send()
            .await
            .context("Gemini request failed")?;

        let status = resp.status();
        let raw = resp.text().await.unwrap_or_default();

        if !status.is_success() {
            logw(format!("Gemini HTTP {}", status.as_u16()));
            if !raw.is_empty() {
                let snippet = raw.chars().take(400).collect::<String>();
                logw(format!("Gemini raw body: {}", snippet));
            }
            return Ok(None);
        }

        let text = gemini_extract_text(&raw);
        if text.is_none() {
            logw("Gemini response parse failed.");
        }
        Ok(text)
    }
}
