// Centralized defaults for LLM provider models.
//
// Keep these in sync with the provider implementations' DEFAULT_MODEL constants.

/// Returns the default chat model id for a given LLM provider id.
pub fn default_llm_model_for_provider(provider: &str) -> Option<&'static str> {
    match provider {
        "gemini" => Some("gemini-2.5-flash"),
        "openai" => Some("gpt-4o-mini"),
        "groq" => Some("llama-3.3-70b-versatile"),
        _ => None,
    }
}

/// Returns the default speech-to-text model id for a provider, if it transcribes
/// through a dedicated endpoint.
pub fn default_transcription_model_for_provider(provider: &str) -> Option<&'static str> {
    match provider {
        "openai" => Some("whisper-1"),
        "groq" => Some("whisper-large-v3"),
        _ => None,
    }
}
