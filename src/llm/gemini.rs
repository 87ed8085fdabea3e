//! Google Gemini (Gemini Developer API) LLM provider.

use super::{LlmError, LlmProvider, DEFAULT_LLM_TIMEOUT};
use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const GEMINI_API_ROOT: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.5-flash";

const TRANSCRIBE_INSTRUCTION: &str =
    "Transcribe the audio verbatim. Return only the spoken words, no commentary.";

/// Gemini LLM provider using the `models.generateContent` REST API.
pub struct GeminiLlmProvider {
    client: Client,
    api_root: String,
    api_key: String,
    model: String,
    timeout: Option<Duration>,
}

impl GeminiLlmProvider {
    pub fn new(api_key: String) -> Self {
        Self::with_model(api_key, DEFAULT_MODEL.to_string())
    }

    pub fn with_model(api_key: String, model: String) -> Self {
        Self {
            client: Client::new(),
            api_root: GEMINI_API_ROOT.to_string(),
            api_key,
            model,
            timeout: Some(DEFAULT_LLM_TIMEOUT),
        }
    }

    pub fn with_base_url(mut self, api_root: &str) -> Self {
        self.api_root = api_root.trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn normalize_model_name(model: &str) -> String {
        let trimmed = model.trim();
        if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{}", trimmed)
        }
    }

    fn extract_text(response: &GenerateContentResponse) -> Result<String, LlmError> {
        let candidate = response
            .candidates
            .as_ref()
            .and_then(|c| c.first())
            .ok_or_else(|| {
                LlmError::InvalidResponse("Gemini API returned no candidates".to_string())
            })?;

        let parts = candidate
            .content
            .as_ref()
            .map(|c| c.parts.as_slice())
            .ok_or_else(|| {
                LlmError::InvalidResponse(
                    "Gemini API returned a candidate without content.parts".to_string(),
                )
            })?;

        let combined: String = parts.iter().filter_map(|p| p.text.as_deref()).collect();

        if combined.trim().is_empty() {
            return Err(LlmError::InvalidResponse(
                "Gemini API returned empty candidate text".to_string(),
            ));
        }

        Ok(combined)
    }

    async fn generate(
        &self,
        system_prompt: &str,
        user_parts: Vec<Part>,
        response_mime_type: &str,
    ) -> Result<String, LlmError> {
        if self.api_key.trim().is_empty() {
            return Err(LlmError::NoApiKey("gemini".to_string()));
        }

        let model = Self::normalize_model_name(&self.model);
        let url = format!("{}/{model}:generateContent", self.api_root);

        let request = GenerateContentRequest {
            system_instruction: Some(Content {
                role: None,
                parts: vec![Part::text(system_prompt)],
            }),
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: user_parts,
            }],
            generation_config: Some(GenerationConfig {
                max_output_tokens: 4096,
                temperature: Some(0.3),
                response_mime_type: response_mime_type.to_string(),
            }),
        };

        let mut req = self
            .client
            .post(url)
            .header("x-goog-api-key", self.api_key.trim())
            .json(&request);

        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }

        let response = req.send().await.map_err(|e| match self.timeout {
            Some(timeout) if e.is_timeout() => LlmError::Timeout(timeout),
            _ => LlmError::Network(e),
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            if let Ok(error_response) = serde_json::from_str::<GeminiErrorResponse>(&error_text) {
                return Err(LlmError::Api(format!(
                    "Gemini API error ({}): {}",
                    status, error_response.error.message
                )));
            }
            return Err(LlmError::Api(format!(
                "Gemini API error ({}): {}",
                status, error_text
            )));
        }

        let response_json: GenerateContentResponse = response.json().await.map_err(|e| {
            LlmError::InvalidResponse(format!("Failed to parse Gemini response: {}", e))
        })?;

        Self::extract_text(&response_json)
    }
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    #[serde(skip_serializing_if = "Option::is_none", rename = "systemInstruction")]
    system_instruction: Option<Content>,
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "generationConfig")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "inlineData")]
    inline_data: Option<InlineData>,
}

impl Part {
    fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            inline_data: None,
        }
    }

    fn inline(bytes: &[u8], mime_type: &str) -> Self {
        Self {
            text: None,
            inline_data: Some(InlineData {
                mime_type: mime_type.to_string(),
                data: base64::engine::general_purpose::STANDARD.encode(bytes),
            }),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct InlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(rename = "responseMimeType")]
    response_mime_type: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorResponse {
    error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    message: String,
}

#[async_trait]
impl LlmProvider for GeminiLlmProvider {
    async fn complete(&self, system_prompt: &str, user_message: &str) -> Result<String, LlmError> {
        self.generate(system_prompt, vec![Part::text(user_message)], "application/json")
            .await
    }

    async fn transcribe(&self, audio: &[u8], mime_type: &str) -> Result<String, LlmError> {
        log::debug!("Gemini inline audio: {} bytes ({})", audio.len(), mime_type);
        let text = self
            .generate(
                TRANSCRIBE_INSTRUCTION,
                vec![Part::inline(audio, mime_type), Part::text("Transcript:")],
                "text/plain",
            )
            .await?;
        Ok(text.trim().to_string())
    }

    fn name(&self) -> &'static str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn candidate(text: &str) -> serde_json::Value {
        json!({ "candidates": [{ "content": { "parts": [{ "text": text }] } }] })
    }

    #[test]
    fn test_normalize_model_name() {
        assert_eq!(
            GeminiLlmProvider::normalize_model_name("gemini-2.5-flash"),
            "models/gemini-2.5-flash"
        );
        assert_eq!(
            GeminiLlmProvider::normalize_model_name("models/gemini-2.5-flash"),
            "models/gemini-2.5-flash"
        );
    }

    #[test]
    fn test_extract_text_rejects_empty() {
        let response: GenerateContentResponse =
            serde_json::from_value(json!({ "candidates": [] })).unwrap();
        assert!(GeminiLlmProvider::extract_text(&response).is_err());
    }

    #[tokio::test]
    async fn test_complete_uses_json_mode() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.5-flash:generateContent"))
            .and(header("x-goog-api-key", "g-key"))
            .and(body_partial_json(json!({
                "generationConfig": { "responseMimeType": "application/json" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(candidate("{\"a\":1}")))
            .expect(1)
            .mount(&server)
            .await;

        let provider = GeminiLlmProvider::new("g-key".to_string()).with_base_url(&server.uri());
        assert_eq!(provider.complete("sys", "hi").await.unwrap(), "{\"a\":1}");
    }

    #[tokio::test]
    async fn test_transcribe_sends_inline_audio() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.5-flash:generateContent"))
            .and(body_partial_json(json!({
                "contents": [{ "parts": [{ "inlineData": { "mimeType": "audio/webm", "data": "AAEC" } }] }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(candidate(" I have an idea \n")))
            .mount(&server)
            .await;

        let provider = GeminiLlmProvider::new("g-key".to_string()).with_base_url(&server.uri());
        let text = provider.transcribe(&[0, 1, 2], "audio/webm").await.unwrap();
        assert_eq!(text, "I have an idea");
    }

    #[tokio::test]
    async fn test_api_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": { "message": "API key not valid" }
            })))
            .mount(&server)
            .await;

        let provider = GeminiLlmProvider::new("bad".to_string()).with_base_url(&server.uri());
        match provider.complete("s", "u").await {
            Err(LlmError::Api(msg)) => assert!(msg.contains("API key not valid")),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
