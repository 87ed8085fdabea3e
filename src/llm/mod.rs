//! LLM providers and the ideation gateway.
//!
//! Providers are thin REST clients behind the `LlmProvider` trait. The
//! `LlmGateway` runs each ideation operation (normalize, audio extraction,
//! profile synthesis) over an ordered provider list, falling back to the next
//! provider whenever an attempt fails.

mod defaults;
mod fallback;
mod gateway;
mod gemini;
mod groq;
mod openai;
mod openai_compat;
mod prompts;

#[cfg(test)]
pub(crate) use fallback::testing;

pub use defaults::{default_llm_model_for_provider, default_transcription_model_for_provider};
pub use fallback::{attempt_in_order, GatewayError, ProviderFailure, Served};
pub use gateway::{GatewayTimeouts, LlmGateway, NormalizeOutcome, ProviderStatus};
pub use gemini::GeminiLlmProvider;
pub use groq::GroqLlmProvider;
pub use openai::OpenAiLlmProvider;
pub use prompts::{compose_instruction, find_preset, strip_code_fences, InstructionPreset, PRESETS};

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Default HTTP timeout for LLM API requests
pub const DEFAULT_LLM_TIMEOUT: Duration = Duration::from_secs(30);

/// Provider ids in their default fallback order.
pub const DEFAULT_PROVIDER_ORDER: &[&str] = &["gemini", "openai", "groq"];

/// Errors that can occur during a single provider attempt
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("API error: {0}")]
    Api(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("No API key configured for provider: {0}")]
    NoApiKey(String),

    #[error("Provider not available: {0}")]
    ProviderNotAvailable(String),
}

/// Trait for LLM providers used by the gateway
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Complete a prompt and return the raw response text (JSON mode where supported)
    async fn complete(&self, system_prompt: &str, user_message: &str) -> Result<String, LlmError>;

    /// Transcribe an audio clip verbatim
    async fn transcribe(&self, _audio: &[u8], _mime_type: &str) -> Result<String, LlmError> {
        Err(LlmError::ProviderNotAvailable(format!(
            "{} does not support audio input",
            self.name()
        )))
    }

    /// Get the provider name
    fn name(&self) -> &'static str;

    /// Get the current model being used
    fn model(&self) -> &str;

    /// Whether credentials are present. Unconfigured providers still take part in
    /// the chain and fail fast.
    fn is_configured(&self) -> bool {
        true
    }
}

/// Configuration for building the provider chain
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Provider ids in fallback order (gemini, openai, groq)
    pub provider_order: Vec<String>,
    /// API keys per provider id
    pub api_keys: HashMap<String, String>,
    /// Optional model override per provider id
    pub models: HashMap<String, String>,
    /// HTTP request timeout for each provider client
    pub timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider_order: DEFAULT_PROVIDER_ORDER.iter().map(|s| s.to_string()).collect(),
            api_keys: HashMap::new(),
            models: HashMap::new(),
            timeout: DEFAULT_LLM_TIMEOUT,
        }
    }
}

/// Build a provider by id. Unknown ids yield `None`.
pub fn create_llm_provider(id: &str, config: &LlmConfig) -> Option<Arc<dyn LlmProvider>> {
    let api_key = config.api_keys.get(id).cloned().unwrap_or_default();
    let model = config.models.get(id).cloned();

    let provider: Arc<dyn LlmProvider> = match id {
        "gemini" => {
            let provider = match model {
                Some(model) => GeminiLlmProvider::with_model(api_key, model),
                None => GeminiLlmProvider::new(api_key),
            };
            Arc::new(provider.with_timeout(config.timeout))
        }
        "openai" => {
            let provider = match model {
                Some(model) => OpenAiLlmProvider::with_model(api_key, model),
                None => OpenAiLlmProvider::new(api_key),
            };
            Arc::new(provider.with_timeout(config.timeout))
        }
        "groq" => {
            let provider = match model {
                Some(model) => GroqLlmProvider::with_model(api_key, model),
                None => GroqLlmProvider::new(api_key),
            };
            Arc::new(provider.with_timeout(config.timeout))
        }
        other => {
            log::warn!("Unknown LLM provider '{}' in provider order; skipping", other);
            return None;
        }
    };

    Some(provider)
}

/// Build the ordered provider chain described by `config`.
pub fn create_provider_chain(config: &LlmConfig) -> Vec<Arc<dyn LlmProvider>> {
    config
        .provider_order
        .iter()
        .filter_map(|id| create_llm_provider(id, config))
        .collect()
}
