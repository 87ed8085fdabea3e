//! Ideation operations over the provider fallback chain.

use super::fallback::{attempt_in_order, GatewayError, ProviderFailure, Served};
use super::prompts;
use super::{create_provider_chain, LlmConfig, LlmError, LlmProvider};
use crate::idea::{
    IdeaFields, IdeationForm, NormalizedFields, NormalizedIdea, PersonFields, PersonProfile,
    VoiceExtraction,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_TEXT_TIMEOUT: Duration = Duration::from_secs(8);
pub const DEFAULT_AUDIO_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_HARNESS_TIMEOUT: Duration = Duration::from_secs(60);

/// Per-attempt time bounds, by operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewayTimeouts {
    pub text: Duration,
    pub audio: Duration,
    pub harness: Duration,
}

impl Default for GatewayTimeouts {
    fn default() -> Self {
        Self {
            text: DEFAULT_TEXT_TIMEOUT,
            audio: DEFAULT_AUDIO_TIMEOUT,
            harness: DEFAULT_HARNESS_TIMEOUT,
        }
    }
}

/// Which providers in the chain have credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderStatus {
    pub configured: Vec<&'static str>,
    pub total: usize,
}

impl ProviderStatus {
    /// `none`, `all`, or the configured provider names joined by `+`.
    pub fn summary(&self) -> String {
        if self.configured.is_empty() {
            "none".to_string()
        } else if self.configured.len() == self.total {
            "all".to_string()
        } else {
            self.configured.join("+")
        }
    }
}

/// Result of `normalize_or_raw`.
#[derive(Debug, Clone)]
pub struct NormalizeOutcome {
    pub idea: NormalizedIdea,
    /// Provider that served the normalization; `None` on the raw path.
    pub provider: Option<&'static str>,
    pub failures: Vec<ProviderFailure>,
}

impl NormalizeOutcome {
    pub fn is_degraded(&self) -> bool {
        self.provider.is_none()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AudioAnalysis {
    extracted_data: IdeaFields,
    extracted_person: Option<PersonFields>,
    questions: Vec<String>,
}

fn parse_json<T: DeserializeOwned>(raw: &str, what: &str) -> Result<T, LlmError> {
    let body = prompts::strip_code_fences(raw);
    serde_json::from_str(body).map_err(|e| {
        LlmError::InvalidResponse(format!("{} was not valid JSON: {} (content: {})", what, e, body))
    })
}

fn non_empty(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

fn parse_normalized(raw: &str) -> Result<NormalizedFields, LlmError> {
    let value: serde_json::Value = parse_json(raw, "Normalization")?;
    if !value.is_object() {
        return Err(LlmError::InvalidResponse(
            "Normalization response is not a JSON object".to_string(),
        ));
    }
    let fields: NormalizedFields = serde_json::from_value(value)
        .map_err(|e| LlmError::InvalidResponse(format!("Unexpected normalization shape: {}", e)))?;
    if !non_empty(&fields.project_name) {
        return Err(LlmError::InvalidResponse(
            "Normalization response is missing project_name".to_string(),
        ));
    }
    Ok(fields)
}

fn parse_generated(raw: &str) -> Result<IdeaFields, LlmError> {
    let fields: IdeaFields = parse_json(raw, "Generated idea")?;
    if !non_empty(&fields.project_name) {
        return Err(LlmError::InvalidResponse(
            "Generated idea is missing projectName".to_string(),
        ));
    }
    Ok(fields)
}

/// Runs each ideation operation over an ordered provider chain.
pub struct LlmGateway {
    providers: Vec<Arc<dyn LlmProvider>>,
    timeouts: GatewayTimeouts,
}

impl LlmGateway {
    pub fn new(providers: Vec<Arc<dyn LlmProvider>>, timeouts: GatewayTimeouts) -> Self {
        Self { providers, timeouts }
    }

    pub fn from_config(config: &LlmConfig, timeouts: GatewayTimeouts) -> Self {
        Self::new(create_provider_chain(config), timeouts)
    }

    pub fn providers(&self) -> &[Arc<dyn LlmProvider>] {
        &self.providers
    }

    pub fn timeouts(&self) -> GatewayTimeouts {
        self.timeouts
    }

    pub fn status(&self) -> ProviderStatus {
        ProviderStatus {
            configured: self
                .providers
                .iter()
                .filter(|p| p.is_configured())
                .map(|p| p.name())
                .collect(),
            total: self.providers.len(),
        }
    }

    /// Normalize a raw form into a storage-ready idea.
    pub async fn normalize(
        &self,
        form: &IdeationForm,
        created_by_email: &str,
        instruction: &str,
    ) -> Result<Served<NormalizedIdea>, GatewayError> {
        let system = prompts::normalize_system_prompt(instruction);
        let user = prompts::normalize_user_message(&IdeaFields::from(form));

        let served = attempt_in_order(&self.providers, self.timeouts.text, "normalize", |p| {
            let (system, user) = (&system, &user);
            async move { parse_normalized(&p.complete(system, user).await?) }
        })
        .await?;

        let idea = NormalizedIdea::from_llm(form, created_by_email, &served.value, served.provider);
        Ok(Served {
            value: idea,
            provider: served.provider,
            failures: served.failures,
        })
    }

    /// `normalize`, substituting the raw form when every provider fails.
    pub async fn normalize_or_raw(
        &self,
        form: &IdeationForm,
        created_by_email: &str,
        instruction: &str,
    ) -> NormalizeOutcome {
        match self.normalize(form, created_by_email, instruction).await {
            Ok(served) => NormalizeOutcome {
                idea: served.value,
                provider: Some(served.provider),
                failures: served.failures,
            },
            Err(e) => {
                log::warn!("Normalization unavailable, saving raw form data: {}", e);
                NormalizeOutcome {
                    idea: NormalizedIdea::from_raw_form(form, created_by_email),
                    provider: None,
                    failures: e.failures().to_vec(),
                }
            }
        }
    }

    /// Transcribe a voice note and extract idea or person fields from it.
    pub async fn extract_from_audio(
        &self,
        audio: &[u8],
        mime_type: &str,
        instruction: &str,
    ) -> Result<Served<VoiceExtraction>, GatewayError> {
        log::debug!("Voice extraction: {} bytes ({})", audio.len(), mime_type);
        let system = prompts::audio_extraction_system_prompt(instruction);

        attempt_in_order(&self.providers, self.timeouts.audio, "extract_from_audio", |p| {
            let system = &system;
            async move {
                let transcript = p.transcribe(audio, mime_type).await?.trim().to_string();
                if transcript.is_empty() {
                    return Err(LlmError::InvalidResponse("Empty transcript".to_string()));
                }

                let raw = p
                    .complete(system, &prompts::audio_extraction_user_message(&transcript))
                    .await?;
                let analysis: AudioAnalysis = parse_json(&raw, "Voice extraction")?;

                Ok(VoiceExtraction {
                    transcript,
                    extracted_fields: analysis.extracted_data,
                    extracted_profile: analysis.extracted_person.filter(|p| !p.is_empty()),
                    clarifying_questions: analysis
                        .questions
                        .into_iter()
                        .map(|q| q.trim().to_string())
                        .filter(|q| !q.is_empty())
                        .collect(),
                })
            }
        })
        .await
    }

    /// Synthesize form fields for an idea tailored to `profile`.
    pub async fn generate_from_profile(
        &self,
        profile: &PersonProfile,
        instruction: &str,
    ) -> Result<Served<IdeaFields>, GatewayError> {
        let system = prompts::profile_system_prompt(instruction);
        let user = prompts::profile_user_message(profile);

        attempt_in_order(&self.providers, self.timeouts.text, "generate_from_profile", |p| {
            let (system, user) = (&system, &user);
            async move { parse_generated(&p.complete(system, user).await?) }
        })
        .await
    }

    /// Raw model text for a harness feature breakdown prompt.
    pub async fn expand_harness_features(&self, prompt: &str) -> Result<Served<String>, GatewayError> {
        attempt_in_order(&self.providers, self.timeouts.harness, "expand_harness_features", |p| async move {
            let text = p.complete(prompts::HARNESS_SYSTEM_PROMPT, prompt).await?;
            Ok(prompts::strip_code_fences(&text).to_string())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idea::{STATUS_NEW, STATUS_RAW};
    use crate::llm::testing::FakeProvider;
    use pretty_assertions::assert_eq;

    fn gateway(providers: Vec<FakeProvider>) -> LlmGateway {
        LlmGateway::new(
            providers
                .into_iter()
                .map(|p| Arc::new(p) as Arc<dyn LlmProvider>)
                .collect(),
            GatewayTimeouts::default(),
        )
    }

    fn form() -> IdeationForm {
        IdeationForm {
            project_name: "Acme".to_string(),
            problem_statement: "X".to_string(),
            solution_summary: "Y".to_string(),
            ..IdeationForm::new()
        }
    }

    #[tokio::test]
    async fn test_normalize_tags_serving_provider() {
        let gw = gateway(vec![
            FakeProvider::failing("a"),
            FakeProvider::replying("b", "not json"),
            FakeProvider::replying(
                "c",
                "```json\n{\"project_name\":\"Acme Rockets\",\"priority\":\"p1\"}\n```",
            ),
        ]);

        let served = gw.normalize(&form(), "u@example.com", "be brief").await.unwrap();
        assert_eq!(served.provider, "c");
        assert_eq!(served.failures.len(), 2);
        assert_eq!(served.value.project_name, "Acme Rockets");
        assert_eq!(served.value.problem_statement, "X");
        assert_eq!(served.value.priority, "P1");
        assert_eq!(served.value.status, STATUS_NEW);
        assert_eq!(served.value.source, "ideation_app_c");
    }

    #[tokio::test]
    async fn test_normalize_keeps_p0() {
        let gw = gateway(vec![FakeProvider::replying(
            "a",
            "{\"project_name\":\"Acme\",\"priority\":\"P0\"}",
        )]);
        let served = gw.normalize(&form(), "u@example.com", "").await.unwrap();
        assert_eq!(served.value.priority, "P0");
    }

    #[tokio::test]
    async fn test_normalize_requires_project_name() {
        let gw = gateway(vec![FakeProvider::replying("a", "{\"problem_statement\":\"x\"}")]);
        assert!(gw.normalize(&form(), "u@example.com", "").await.is_err());
    }

    #[tokio::test]
    async fn test_normalize_or_raw_degrades() {
        let gw = gateway(vec![FakeProvider::failing("a"), FakeProvider::failing("b")]);
        let f = form();
        let outcome = gw.normalize_or_raw(&f, "u@example.com", "").await;

        assert!(outcome.is_degraded());
        assert_eq!(outcome.failures.len(), 2);
        assert_eq!(outcome.idea.status, STATUS_RAW);
        assert_eq!(outcome.idea.source, "ideation_app_raw");
        assert_eq!(outcome.idea.project_name, f.project_name);
        assert_eq!(outcome.idea.problem_statement, f.problem_statement);
        assert_eq!(outcome.idea.solution_summary, f.solution_summary);
        assert_eq!(outcome.idea.session_uuid, f.session_id);
    }

    #[tokio::test]
    async fn test_extract_from_audio_skips_provider_without_transcription() {
        let reply = r#"{"extracted_data":{"projectName":"Acme"},"extracted_person":{"name":""},"questions":["Who pays?"," "]}"#;
        let mut no_audio = FakeProvider::replying("a", reply);
        no_audio.transcript = None;
        let gw = gateway(vec![no_audio, FakeProvider::replying("b", reply)]);

        let served = gw.extract_from_audio(b"webm", "audio/webm", "").await.unwrap();
        assert_eq!(served.provider, "b");
        assert_eq!(served.value.transcript, "hello world");
        assert_eq!(served.value.extracted_fields.project_name.as_deref(), Some("Acme"));
        assert_eq!(served.value.extracted_profile, None);
        assert_eq!(served.value.clarifying_questions, vec!["Who pays?".to_string()]);
    }

    #[tokio::test]
    async fn test_extract_from_audio_rejects_empty_transcript() {
        let mut silent = FakeProvider::replying("a", "{}");
        silent.transcript = Some("   ".to_string());
        let gw = gateway(vec![silent]);
        assert!(gw.extract_from_audio(b"x", "audio/webm", "").await.is_err());
    }

    #[tokio::test]
    async fn test_generate_from_profile() {
        let gw = gateway(vec![
            FakeProvider::replying("a", "{\"projectName\":\"\"}"),
            FakeProvider::replying("b", "{\"projectName\":\"Trail Buddy\",\"tags\":\"outdoor\"}"),
        ]);
        let profile = PersonProfile {
            name: "Sam".to_string(),
            ..Default::default()
        };
        let served = gw.generate_from_profile(&profile, "").await.unwrap();
        assert_eq!(served.provider, "b");
        assert_eq!(served.value.project_name.as_deref(), Some("Trail Buddy"));
    }

    #[tokio::test]
    async fn test_status_summary() {
        let gw = gateway(vec![FakeProvider::failing("a")]);
        assert_eq!(gw.status().summary(), "all");

        let empty = ProviderStatus {
            configured: vec![],
            total: 3,
        };
        assert_eq!(empty.summary(), "none");

        let partial = ProviderStatus {
            configured: vec!["gemini", "groq"],
            total: 3,
        };
        assert_eq!(partial.summary(), "gemini+groq");
    }
}
