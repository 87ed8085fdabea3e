//! OpenAI LLM provider.

use super::openai_compat::OpenAiCompatClient;
use super::{LlmError, LlmProvider, DEFAULT_LLM_TIMEOUT};
use async_trait::async_trait;
use std::time::Duration;

const OPENAI_API_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_TRANSCRIPTION_MODEL: &str = "whisper-1";

/// OpenAI provider using Chat Completions and Whisper transcription
pub struct OpenAiLlmProvider {
    inner: OpenAiCompatClient,
}

impl OpenAiLlmProvider {
    /// Create a new OpenAI provider with the given API key
    pub fn new(api_key: String) -> Self {
        Self::with_model(api_key, DEFAULT_MODEL.to_string())
    }

    /// Create with a specific model
    pub fn with_model(api_key: String, model: String) -> Self {
        Self {
            inner: OpenAiCompatClient::new(
                "openai",
                "OpenAI",
                OPENAI_API_URL,
                api_key,
                model,
                DEFAULT_TRANSCRIPTION_MODEL.to_string(),
                Some(DEFAULT_LLM_TIMEOUT),
            ),
        }
    }

    /// Point the provider at a different API root (proxies, tests)
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.inner.set_base_url(base_url);
        self
    }

    pub fn with_transcription_model(mut self, model: String) -> Self {
        self.inner.transcription_model = model;
        self
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.inner.timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl LlmProvider for OpenAiLlmProvider {
    async fn complete(&self, system_prompt: &str, user_message: &str) -> Result<String, LlmError> {
        self.inner.chat_json(system_prompt, user_message).await
    }

    async fn transcribe(&self, audio: &[u8], mime_type: &str) -> Result<String, LlmError> {
        self.inner.transcribe(audio, mime_type).await
    }

    fn name(&self) -> &'static str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.inner.model
    }

    fn is_configured(&self) -> bool {
        self.inner.has_api_key()
    }
}
