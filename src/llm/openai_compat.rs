//! Shared client for OpenAI-compatible APIs (OpenAI itself and Groq).
//!
//! Text goes through `/chat/completions` in JSON-object mode. Audio goes through
//! the Whisper-compatible `/audio/transcriptions` multipart endpoint.

use super::LlmError;
use reqwest::{multipart, Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub(crate) struct OpenAiCompatClient {
    client: Client,
    provider: &'static str,
    label: &'static str,
    base_url: String,
    api_key: String,
    pub(crate) model: String,
    pub(crate) transcription_model: String,
    pub(crate) timeout: Option<Duration>,
}

impl OpenAiCompatClient {
    pub(crate) fn new(
        provider: &'static str,
        label: &'static str,
        base_url: &str,
        api_key: String,
        model: String,
        transcription_model: String,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            client: Client::new(),
            provider,
            label,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            transcription_model,
            timeout,
        }
    }

    pub(crate) fn set_base_url(&mut self, base_url: &str) {
        self.base_url = base_url.trim_end_matches('/').to_string();
    }

    pub(crate) fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    fn require_api_key(&self) -> Result<(), LlmError> {
        if self.has_api_key() {
            Ok(())
        } else {
            Err(LlmError::NoApiKey(self.provider.to_string()))
        }
    }

    fn with_timeout(&self, req: RequestBuilder) -> RequestBuilder {
        match self.timeout {
            Some(timeout) => req.timeout(timeout),
            None => req,
        }
    }

    fn map_send_error(&self, e: reqwest::Error) -> LlmError {
        match self.timeout {
            Some(timeout) if e.is_timeout() => LlmError::Timeout(timeout),
            _ => LlmError::Network(e),
        }
    }

    async fn api_error(&self, response: reqwest::Response) -> LlmError {
        let status = response.status();
        let error_text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorResponse>(&error_text)
            .map(|r| r.error.message)
            .unwrap_or(error_text);
        LlmError::Api(format!("{} API error ({}): {}", self.label, status, message))
    }

    pub(crate) async fn chat_json(
        &self,
        system_prompt: &str,
        user_message: &str,
    ) -> Result<String, LlmError> {
        self.require_api_key()?;

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system_prompt.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user_message.to_string(),
                },
            ],
            temperature: 0.3,
            max_tokens: 4096,
            response_format: ResponseFormat {
                format_type: "json_object".to_string(),
            },
        };

        let req = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.trim())
            .json(&request);

        let response = self
            .with_timeout(req)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if !response.status().is_success() {
            return Err(self.api_error(response).await);
        }

        let chat_response: ChatResponse = response.json().await.map_err(|e| {
            LlmError::InvalidResponse(format!("Failed to parse {} response: {}", self.label, e))
        })?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| {
                LlmError::InvalidResponse(format!("{} returned no message content", self.label))
            })
    }

    pub(crate) async fn transcribe(&self, audio: &[u8], mime_type: &str) -> Result<String, LlmError> {
        self.require_api_key()?;

        log::debug!(
            "{} transcription upload: {} bytes ({})",
            self.label,
            audio.len(),
            mime_type
        );

        let part = multipart::Part::bytes(audio.to_vec())
            .file_name(format!("audio.{}", audio_extension(mime_type)))
            .mime_str(mime_type)
            .map_err(|e| LlmError::InvalidResponse(format!("Failed to create multipart: {}", e)))?;

        let form = multipart::Form::new()
            .part("file", part)
            .text("model", self.transcription_model.clone());

        let req = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(self.api_key.trim())
            .multipart(form);

        let response = self
            .with_timeout(req)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if !response.status().is_success() {
            return Err(self.api_error(response).await);
        }

        let result: TranscriptionResponse = response.json().await.map_err(|e| {
            LlmError::InvalidResponse(format!(
                "Failed to parse {} transcription: {}",
                self.label, e
            ))
        })?;

        Ok(result.text)
    }
}

/// File extension Whisper endpoints expect for a MIME type such as
/// `audio/webm;codecs=opus`.
pub(crate) fn audio_extension(mime_type: &str) -> &'static str {
    let mime = mime_type.to_ascii_lowercase();
    if mime.contains("wav") {
        "wav"
    } else if mime.contains("mp3") || mime.contains("mpeg") {
        "mp3"
    } else if mime.contains("m4a") || mime.contains("mp4") {
        "m4a"
    } else if mime.contains("ogg") {
        "ogg"
    } else {
        "webm"
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(base_url: &str, api_key: &str) -> OpenAiCompatClient {
        OpenAiCompatClient::new(
            "openai",
            "OpenAI",
            base_url,
            api_key.to_string(),
            "gpt-4o-mini".to_string(),
            "whisper-1".to_string(),
            Some(Duration::from_secs(5)),
        )
    }

    #[test]
    fn test_audio_extension() {
        assert_eq!(audio_extension("audio/webm;codecs=opus"), "webm");
        assert_eq!(audio_extension("audio/wav"), "wav");
        assert_eq!(audio_extension("audio/mpeg"), "mp3");
        assert_eq!(audio_extension("audio/ogg"), "ogg");
        assert_eq!(audio_extension("application/octet-stream"), "webm");
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_fast() {
        let c = client("http://127.0.0.1:9", "  ");
        assert!(matches!(
            c.chat_json("s", "u").await,
            Err(LlmError::NoApiKey(p)) if p == "openai"
        ));
    }

    #[tokio::test]
    async fn test_chat_json_returns_message_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "content": "{\"project_name\":\"Acme\"}" } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let out = client(&server.uri(), "sk-test").chat_json("s", "u").await.unwrap();
        assert_eq!(out, "{\"project_name\":\"Acme\"}");
    }

    #[tokio::test]
    async fn test_api_error_message_is_extracted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": { "message": "Rate limit reached" }
            })))
            .mount(&server)
            .await;

        let err = client(&server.uri(), "sk-test").chat_json("s", "u").await.unwrap_err();
        match err {
            LlmError::Api(msg) => {
                assert!(msg.contains("429"));
                assert!(msg.contains("Rate limit reached"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_transcribe_reads_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/audio/transcriptions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "text": "hello there" })))
            .expect(1)
            .mount(&server)
            .await;

        let text = client(&server.uri(), "sk-test")
            .transcribe(b"RIFF", "audio/wav")
            .await
            .unwrap();
        assert_eq!(text, "hello there");
    }
}
