use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use super::{usable_key, ProviderError, TextProvider};
use crate::config::ProviderConfig;

pub const PLACEHOLDER_KEY: &str = "your_gemini_api_key_here";
const TEXT_PATH: &str = "/candidates/0/content/parts/0/text";

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
}

/// Gemini `generateContent` backend. The key travels as a query parameter.
#[derive(Clone)]
pub struct GeminiProvider {
    config: ProviderConfig,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(config: ProviderConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { config, client }
    }

    fn api_key(&self) -> Option<&str> {
        usable_key(self.config.api_key.as_deref(), PLACEHOLDER_KEY)
    }
}

#[async_trait]
impl TextProvider for GeminiProvider {
    fn name(&self) -> &'static str {
        "Gemini"
    }

    fn is_configured(&self) -> bool {
        self.api_key().is_some()
    }

    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        let api_key = self.api_key().ok_or(ProviderError::NotConfigured("GEMINI_API_KEY"))?;
        let url = format!(
            "{}/models/{}:generateContent",
            self.config.api_endpoint.trim_end_matches('/'),
            self.config.model
        );
        let payload = GenerateRequest {
            contents: [Content { parts: [Part { text: prompt }] }],
        };

        tracing::debug!(model = %self.config.model, "sending Gemini request");
        let resp = self
            .client
            .post(&url)
            .query(&[("key", api_key)])
            .json(&payload)
            .send()
            .await?;
        let bytes = resp.bytes().await?;
        let body: Value = serde_json::from_slice(&bytes)?;

        body.pointer(TEXT_PATH)
            .and_then(Value::as_str)
            .filter(|text| !text.is_empty())
            .map(str::to_string)
            .ok_or(ProviderError::EmptyResponse)
    }
}
