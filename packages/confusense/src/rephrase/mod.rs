//! Turning a confusion event into simpler wording through a text-generation
//! backend.
//!
//! Backends are tried in priority order and the first one holding a usable
//! API key is called exactly once. Failures never surface as errors to the
//! caller: every path ends in a displayable string.

mod gemini;
mod openai;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::Config;

pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;

pub const NO_KEY_MESSAGE: &str = "No API key provided.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    FacialConfusion,
    TextSelection,
    Other(String),
}

impl EventType {
    pub fn as_str(&self) -> &str {
        match self {
            EventType::FacialConfusion => "facial-confusion",
            EventType::TextSelection => "text-selection",
            EventType::Other(other) => other,
        }
    }
}

impl From<String> for EventType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "facial-confusion" => EventType::FacialConfusion,
            "text-selection" => EventType::TextSelection,
            _ => EventType::Other(value),
        }
    }
}

impl From<EventType> for String {
    fn from(value: EventType) -> Self {
        value.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RephraseRequest {
    pub event_type: EventType,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confusion_level: Option<f64>,
}

impl RephraseRequest {
    pub fn facial_confusion(content: impl Into<String>, confusion_level: f64) -> Self {
        Self {
            event_type: EventType::FacialConfusion,
            content: content.into(),
            confusion_level: Some(confusion_level),
        }
    }

    pub fn text_selection(content: impl Into<String>) -> Self {
        Self {
            event_type: EventType::TextSelection,
            content: content.into(),
            confusion_level: None,
        }
    }

    /// Event-specific prompt.
    pub fn prompt(&self) -> String {
        match self.event_type {
            EventType::FacialConfusion => format!(
                "The user appears confused based on facial expression analysis (confusion level: {}). \
                 Please rephrase this text in simpler terms with analogies and examples: {}",
                self.confusion_level.unwrap_or(0.0),
                self.content
            ),
            EventType::TextSelection => format!(
                "The user selected this specific text, indicating they need clarification. \
                 Please explain this part in simpler terms: {}",
                self.content
            ),
            EventType::Other(_) => self.generic_prompt(),
        }
    }

    pub fn generic_prompt(&self) -> String {
        format!("Rephrase this for a confused learner: {}", self.content)
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider not configured: {0}")]
    NotConfigured(&'static str),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("JSON decode failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("response carried no text")]
    EmptyResponse,
}

/// A text-generation backend.
#[async_trait]
pub trait TextProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// True when the provider holds a key that is neither blank nor a placeholder.
    fn is_configured(&self) -> bool;

    /// Prompt this backend sends for `request`.
    fn prompt_for(&self, request: &RephraseRequest) -> String {
        request.prompt()
    }

    async fn generate(&self, prompt: &str) -> Result<String, ProviderError>;

    /// Shown when the backend answered without any text.
    fn empty_message(&self) -> String {
        format!("No response from {}.", self.name())
    }

    /// Shown when the request or its decoding failed.
    fn failure_message(&self) -> String {
        format!("Error contacting {}.", self.name())
    }
}

/// Key present, non-blank and not the template placeholder.
pub(crate) fn usable_key<'a>(key: Option<&'a str>, placeholder: &str) -> Option<&'a str> {
    key.filter(|k| !k.trim().is_empty() && *k != placeholder)
}

#[derive(Clone)]
pub struct RephraseDispatcher {
    providers: Vec<Arc<dyn TextProvider>>,
}

impl RephraseDispatcher {
    /// `providers` in priority order.
    pub fn new(providers: Vec<Arc<dyn TextProvider>>) -> Self {
        Self { providers }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(vec![
            Arc::new(OpenAiProvider::new(config.openai.clone())),
            Arc::new(GeminiProvider::new(config.gemini.clone())),
        ])
    }

    /// Name of the provider a dispatch would use right now.
    pub fn active_provider(&self) -> Option<&'static str> {
        self.providers.iter().find(|p| p.is_configured()).map(|p| p.name())
    }

    pub async fn dispatch(&self, request: &RephraseRequest) -> String {
        info!(
            event = request.event_type.as_str(),
            level = request.confusion_level.unwrap_or(0.0),
            "processing rephrase request"
        );

        let Some(provider) = self.providers.iter().find(|p| p.is_configured()) else {
            info!("no usable API key for any provider");
            return NO_KEY_MESSAGE.to_string();
        };

        let prompt = provider.prompt_for(request);
        match provider.generate(&prompt).await {
            Ok(text) => {
                info!(provider = provider.name(), chars = text.len(), "rephrase received");
                text
            }
            Err(ProviderError::EmptyResponse) => {
                warn!(provider = provider.name(), "rephrase response had no text");
                provider.empty_message()
            }
            Err(err) => {
                warn!(provider = provider.name(), error = %err, "rephrase request failed");
                provider.failure_message()
            }
        }
    }
}
