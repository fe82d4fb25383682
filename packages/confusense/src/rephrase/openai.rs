use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use super::{usable_key, ProviderError, RephraseRequest, TextProvider};
use crate::config::ProviderConfig;

pub const PLACEHOLDER_KEY: &str = "your_openai_api_key_here";
const SYSTEM_PROMPT: &str = "You are a helpful tutor.";
const MAX_TOKENS: u32 = 150;
const CONTENT_PATH: &str = "/choices/0/message/content";

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
}

/// OpenAI-compatible chat completions backend.
#[derive(Clone)]
pub struct OpenAiProvider {
    config: ProviderConfig,
    client: reqwest::Client,
}

impl OpenAiProvider {
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
impl TextProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "OpenAI"
    }

    fn is_configured(&self) -> bool {
        self.api_key().is_some()
    }

    /// The chat backend always asks for a plain rephrase, whatever the event.
    fn prompt_for(&self, request: &RephraseRequest) -> String {
        request.generic_prompt()
    }

    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        let api_key = self.api_key().ok_or(ProviderError::NotConfigured("OPENAI_API_KEY"))?;
        let url = format!("{}/chat/completions", self.config.api_endpoint.trim_end_matches('/'));
        let payload = ChatRequest {
            model: &self.config.model,
            messages: [
                ChatMessage { role: "system", content: SYSTEM_PROMPT },
                ChatMessage { role: "user", content: prompt },
            ],
            max_tokens: MAX_TOKENS,
        };

        // Status is not checked: error bodies simply lack the content path.
        let resp = self.client.post(&url).bearer_auth(api_key).json(&payload).send().await?;
        let bytes = resp.bytes().await?;
        let body: Value = serde_json::from_slice(&bytes)?;

        body.pointer(CONTENT_PATH)
            .and_then(Value::as_str)
            .filter(|text| !text.is_empty())
            .map(str::to_string)
            .ok_or(ProviderError::EmptyResponse)
    }
}
