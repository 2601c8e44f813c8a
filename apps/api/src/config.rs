use std::time::Duration;

use anyhow::{Context, Result};

const DEFAULT_LLM_BASE_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";
const DEFAULT_LLM_MODEL: &str = "qwen-plus";

/// Application configuration loaded from environment variables.
/// Every variable is optional; malformed numeric or boolean values fail startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub rust_log: String,
    pub llm_api_key: String,
    pub llm_base_url: String,
    pub llm_model: String,
    /// Bypass the LLM and serve the fixed placeholder analysis.
    pub mock_mode: bool,
    /// Empty selects the in-process store.
    pub redis_url: String,
    pub cache_ttl: Duration,
    pub cache_timeout: Duration,
    pub cache_single_flight: bool,
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            port: parse_env("PORT", 8000)?,
            rust_log: optional_env("RUST_LOG", "info"),
            llm_api_key: optional_env("LLM_API_KEY", ""),
            llm_base_url: optional_env("LLM_BASE_URL", DEFAULT_LLM_BASE_URL),
            llm_model: optional_env("LLM_MODEL", DEFAULT_LLM_MODEL),
            mock_mode: parse_env("MOCK_MODE", false)?,
            redis_url: optional_env("REDIS_URL", ""),
            cache_ttl: Duration::from_secs(parse_env("CACHE_TTL_SECS", 3600)?),
            cache_timeout: Duration::from_millis(parse_env("CACHE_TIMEOUT_MS", 500)?),
            cache_single_flight: parse_env("CACHE_SINGLE_FLIGHT", true)?,
            max_upload_bytes: parse_env("MAX_UPLOAD_BYTES", 10 * 1024 * 1024)?,
        })
    }

    /// True when analyses must come from the placeholder instead of the LLM.
    pub fn use_mock_analyzer(&self) -> bool {
        self.mock_mode || self.llm_api_key.trim().is_empty()
    }
}

fn optional_env(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value: {raw}")),
        _ => Ok(default),
    }
}

#[cfg(test)]
impl Config {
    /// Configuration used by in-process tests: mock analyzer, memory store.
    pub fn for_tests() -> Self {
        Config {
            port: 0,
            rust_log: "debug".to_string(),
            llm_api_key: String::new(),
            llm_base_url: DEFAULT_LLM_BASE_URL.to_string(),
            llm_model: DEFAULT_LLM_MODEL.to_string(),
            mock_mode: true,
            redis_url: String::new(),
            cache_ttl: Duration::from_secs(3600),
            cache_timeout: Duration::from_millis(500),
            cache_single_flight: true,
            max_upload_bytes: 1024 * 1024,
        }
    }
}
