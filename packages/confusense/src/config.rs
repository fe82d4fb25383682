use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_TICK_MS: u64 = 200;
const DEFAULT_TIMEOUT_MS: u64 = 60_000;

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_OPENAI_ENDPOINT: &str = "https://api.openai.com/v1";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub api_endpoint: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub tick_interval: Duration,
    pub store_path: PathBuf,
    pub openai: ProviderConfig,
    pub gemini: ProviderConfig,
}

impl Config {
    pub fn from_env() -> Self {
        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        let tick_interval =
            Duration::from_millis(env_u64("CONFUSENSE_TICK_MS").unwrap_or(DEFAULT_TICK_MS).max(1));
        let store_path = env_string("CONFUSENSE_STORE")
            .map(PathBuf::from)
            .unwrap_or_else(default_store_path);
        let timeout = Duration::from_millis(env_u64("LLM_TIMEOUT").unwrap_or(DEFAULT_TIMEOUT_MS));

        let openai = ProviderConfig {
            api_key: env_string("OPENAI_API_KEY").or_else(|| env_string("REACT_APP_OPENAI_API_KEY")),
            model: env_string("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            api_endpoint: normalize_endpoint(
                env_string("OPENAI_API_ENDPOINT")
                    .or_else(|| env_string("OPENAI_BASE_URL"))
                    .unwrap_or_else(|| DEFAULT_OPENAI_ENDPOINT.to_string()),
            ),
            timeout,
        };

        let gemini = ProviderConfig {
            api_key: env_string("GEMINI_API_KEY").or_else(|| env_string("REACT_APP_GEMINI_API_KEY")),
            model: env_string("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            api_endpoint: env_string("GEMINI_API_ENDPOINT")
                .map(|v| v.trim().trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_GEMINI_ENDPOINT.to_string()),
            timeout,
        };

        Self {
            log_level,
            tick_interval,
            store_path,
            openai,
            gemini,
        }
    }
}

fn default_store_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("confusense")
        .join("store.json")
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_u64(key: &str) -> Option<u64> {
    env_string(key)?.parse().ok()
}

/// Appends `/v1` to OpenAI-compatible endpoints that lack a version segment.
pub fn normalize_endpoint(endpoint: String) -> String {
    let trimmed = endpoint.trim().trim_end_matches('/');
    if trimmed.ends_with("/v1") || trimmed.contains("/v1/") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/v1")
    }
}
