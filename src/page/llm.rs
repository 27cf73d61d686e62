//! Language-model structured extraction (Gemini `generateContent`).

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};
use wreq::Client;

const GEMINI_BASE: &str = "https://generativelanguage.googleapis.com";

/// Asks a language model to return page data as JSON.
pub struct LlmExtractor {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

impl LlmExtractor {
    /// Creates an extractor against the public Gemini endpoint.
    pub fn new(api_key: String, model: String) -> Result<Self> {
        Self::with_base_url(api_key, model, GEMINI_BASE.to_string())
    }

    /// Creates an extractor with a custom base URL (for testing).
    pub fn with_base_url(api_key: String, model: String, base_url: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self { client, api_key, model, base_url })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Sends `instruction` plus page `content`, returning the model's JSON text.
    pub async fn extract(&self, instruction: &str, content: &str) -> Result<String> {
        // Key goes in a header; transport errors echo the request URI
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(&self.model)
        );

        let body = json!({
            "contents": [{
                "parts": [{ "text": format!("{}\n\nPage content:\n{}", instruction, content) }]
            }],
            "generationConfig": { "responseMimeType": "application/json" }
        });

        info!("Requesting structured extraction from {}", self.model);

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", self.api_key.as_str())
            .body(body.to_string())
            .send()
            .await
            .context("Failed to send extraction request")?;

        let status = response.status();
        debug!("Extraction response status: {}", status);

        if !status.is_success() {
            anyhow::bail!("Extraction request failed with status: {}", status);
        }

        let text = response.text().await.context("Failed to read extraction response")?;
        let parsed: GenerateResponse =
            serde_json::from_str(&text).context("Failed to parse extraction response")?;

        parsed
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .find_map(|p| p.text)
            .filter(|t| !t.trim().is_empty())
            .context("Extraction response contained no text")
    }
}
