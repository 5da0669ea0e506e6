//! Reply backend integration.
//!
//! Any OpenAI-compatible chat-completions server can act as the backend,
//! including a local model served by Ollama. The backend is optional: when
//! it is not configured the reply generator uses templates.

pub mod openai;
pub mod provider;

pub use openai::OpenAiCompatibleProvider;
pub use provider::*;

use std::sync::Arc;
use std::time::Duration;

use crate::config::parse_env;
use crate::error::{ConfigError, LlmError};

/// Default endpoint: a local Ollama server.
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434/v1";

/// Configuration for creating a reply backend.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: Option<secrecy::SecretString>,
    pub model: String,
    pub timeout: Duration,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl LlmConfig {
    /// Config for `model` with default endpoint and sampling.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            model: model.into(),
            timeout: Duration::from_secs(60),
            max_tokens: 150,
            temperature: 0.7,
        }
    }

    /// Build config from environment variables.
    ///
    /// Returns `Ok(None)` if `LLM_MODEL` is not set (backend disabled).
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        let Ok(model) = std::env::var("LLM_MODEL") else {
            return Ok(None);
        };
        if model.trim().is_empty() {
            return Ok(None);
        }

        let mut config = Self::new(model.trim());
        if let Ok(url) = std::env::var("LLM_BASE_URL") {
            config.base_url = url;
        }
        config.api_key = std::env::var("LLM_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .map(secrecy::SecretString::from);
        if let Some(secs) = parse_env::<u64>("LLM_TIMEOUT_SECS")? {
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(max_tokens) = parse_env::<u32>("LLM_MAX_TOKENS")? {
            config.max_tokens = max_tokens;
        }
        if let Some(temperature) = parse_env::<f32>("LLM_TEMPERATURE")? {
            config.temperature = temperature;
        }
        Ok(Some(config))
    }
}

/// Create a reply backend from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let provider = OpenAiCompatibleProvider::new(
        &config.base_url,
        config.api_key.clone(),
        &config.model,
        config.timeout,
    )?;
    tracing::info!(
        "Using reply backend {} (model: {})",
        config.base_url,
        config.model
    );
    Ok(Arc::new(provider))
}
