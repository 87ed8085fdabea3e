//! Groq LLM provider (OpenAI-compatible API).

use super::openai_compat::OpenAiCompatClient;
use super::{LlmError, LlmProvider, DEFAULT_LLM_TIMEOUT};
use async_trait::async_trait;
use std::time::Duration;

const GROQ_API_URL: &str = "https://api.groq.com/openai/v1";
const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";
const DEFAULT_TRANSCRIPTION_MODEL: &str = "whisper-large-v3";

/// Groq provider: Llama chat completions plus Whisper transcription
pub struct GroqLlmProvider {
    inner: OpenAiCompatClient,
}

impl GroqLlmProvider {
    /// Create a new Groq provider with the given API key
    pub fn new(api_key: String) -> Self {
        Self::with_model(api_key, DEFAULT_MODEL.to_string())
    }

    /// Create with a specific model
    pub fn with_model(api_key: String, model: String) -> Self {
        Self {
            inner: OpenAiCompatClient::new(
                "groq",
                "Groq",
                GROQ_API_URL,
                api_key,
                model,
                DEFAULT_TRANSCRIPTION_MODEL.to_string(),
                Some(DEFAULT_LLM_TIMEOUT),
            ),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.inner.set_base_url(base_url);
        self
    }

    pub fn with_transcription_model(mut self, model: String) -> Self {
        self.inner.transcription_model = model;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.inner.timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl LlmProvider for GroqLlmProvider {
    async fn complete(&self, system_prompt: &str, user_message: &str) -> Result<String, LlmError> {
        self.inner.chat_json(system_prompt, user_message).await
    }

    async fn transcribe(&self, audio: &[u8], mime_type: &str) -> Result<String, LlmError> {
        self.inner.transcribe(audio, mime_type).await
    }

    fn name(&self) -> &'static str {
        "groq"
    }

    fn model(&self) -> &str {
        &self.inner.model
    }

    fn is_configured(&self) -> bool {
        self.inner.has_api_key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_provider_creation() {
        let provider = GroqLlmProvider::new("test-key".to_string());
        assert_eq!(provider.name(), "groq");
        assert_eq!(provider.model(), "llama-3.3-70b-versatile");
        assert_eq!(provider.inner.transcription_model, "whisper-large-v3");
    }

    #[test]
    fn test_provider_with_custom_transcription_model() {
        let provider = GroqLlmProvider::new("test-key".to_string())
            .with_transcription_model("whisper-large-v3-turbo".to_string());
        assert_eq!(provider.inner.transcription_model, "whisper-large-v3-turbo");
    }

    #[tokio::test]
    async fn test_complete_against_mock_server() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "content": "{\"projectName\":\"Acme\"}" } }]
            })))
            .mount(&server)
            .await;

        let provider = GroqLlmProvider::new("gsk-test".to_string()).with_base_url(&server.uri());
        let out = provider.complete("system", "user").await.unwrap();
        assert_eq!(out, "{\"projectName\":\"Acme\"}");
    }
}
