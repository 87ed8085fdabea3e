use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::drive::FolderMap;
use crate::flow::FlowSettings;
use crate::library::DEFAULT_LIBRARY_LIMIT;
use crate::llm::{GatewayTimeouts, LlmConfig, DEFAULT_PROVIDER_ORDER};
use crate::session::UserIdentity;

// ============================================================================
// DEFAULT LLM SETTINGS
// ============================================================================

/// Default per-attempt bound for text operations (normalize, profile synthesis)
pub const DEFAULT_TEXT_TIMEOUT_MS: u64 = 8_000;

/// Default per-attempt bound for voice extraction
pub const DEFAULT_AUDIO_TIMEOUT_MS: u64 = 15_000;

/// Default per-attempt bound for harness feature expansion
pub const DEFAULT_HARNESS_TIMEOUT_MS: u64 = 60_000;

/// Default HTTP timeout of each provider client
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// DEFAULT FLOW SETTINGS
// ============================================================================

/// How long an error is shown before the wizard returns to the failing screen
pub const DEFAULT_ERROR_DISPLAY_DELAY_MS: u64 = 1_500;

/// Environment variables that override API keys, by provider id
pub const API_KEY_ENV_VARS: &[(&str, &str)] = &[
    ("gemini", "GEMINI_API_KEY"),
    ("openai", "OPENAI_API_KEY"),
    ("groq", "GROQ_API_KEY"),
];

// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Failed to read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// LLM provider chain settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmSettings {
    /// Provider ids in fallback order
    pub provider_order: Vec<String>,
    /// API key per provider id
    pub api_keys: HashMap<String, String>,
    /// Model override per provider id
    pub models: HashMap<String, String>,
    pub text_timeout_ms: u64,
    pub audio_timeout_ms: u64,
    pub harness_timeout_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider_order: DEFAULT_PROVIDER_ORDER.iter().map(|s| s.to_string()).collect(),
            api_keys: HashMap::new(),
            models: HashMap::new(),
            text_timeout_ms: DEFAULT_TEXT_TIMEOUT_MS,
            audio_timeout_ms: DEFAULT_AUDIO_TIMEOUT_MS,
            harness_timeout_ms: DEFAULT_HARNESS_TIMEOUT_MS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

/// Drive storage settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DriveSettings {
    pub folders: FolderMap,
    /// Maximum number of saved ideas listed per refresh
    pub library_limit: usize,
}

impl Default for DriveSettings {
    fn default() -> Self {
        Self {
            folders: FolderMap::default(),
            library_limit: DEFAULT_LIBRARY_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub llm: LlmSettings,
    pub drive: DriveSettings,
    pub error_display_delay_ms: u64,
    /// Where the saved-ideas cache is kept; no cache file when unset
    pub data_dir: Option<PathBuf>,
    /// Known identities and their base instructions
    pub users: Vec<UserIdentity>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            llm: LlmSettings::default(),
            drive: DriveSettings::default(),
            error_display_delay_ms: DEFAULT_ERROR_DISPLAY_DELAY_MS,
            data_dir: None,
            users: Vec::new(),
        }
    }
}

impl Settings {
    /// Load from a JSON file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No settings file at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(SettingsError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply API key overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        for (provider, var) in API_KEY_ENV_VARS {
            if let Some(key) = lookup(var).filter(|k| !k.trim().is_empty()) {
                log::debug!("Using {} from environment", var);
                self.llm.api_keys.insert(provider.to_string(), key.trim().to_string());
            }
        }
    }

    pub fn llm_config(&self) -> LlmConfig {
        LlmConfig {
            provider_order: self.llm.provider_order.clone(),
            api_keys: self.llm.api_keys.clone(),
            models: self.llm.models.clone(),
            timeout: Duration::from_secs(self.llm.request_timeout_secs),
        }
    }

    pub fn gateway_timeouts(&self) -> GatewayTimeouts {
        GatewayTimeouts {
            text: Duration::from_millis(self.llm.text_timeout_ms),
            audio: Duration::from_millis(self.llm.audio_timeout_ms),
            harness: Duration::from_millis(self.llm.harness_timeout_ms),
        }
    }

    pub fn flow_settings(&self) -> FlowSettings {
        FlowSettings {
            error_display_delay: Duration::from_millis(self.error_display_delay_ms),
        }
    }

    /// Configured identity for `email`, matched case-insensitively.
    pub fn find_user(&self, email: &str) -> Option<&UserIdentity> {
        self.users
            .iter()
            .find(|u| u.email.trim().eq_ignore_ascii_case(email.trim()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("settings.json")).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.gateway_timeouts(), GatewayTimeouts::default());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "llm": {{ "provider_order": ["groq", "gemini"], "text_timeout_ms": 2000 }},
                "drive": {{ "folders": {{ "entries": {{ "Mario@Example.com": "f-mario" }} }} }},
                "users": [{{ "email": "mario@example.com", "name": "Mario", "baseInstruction": "You are Mario." }}]
            }}"#
        )
        .unwrap();

        let settings = Settings::load(file.path()).unwrap();
        assert_eq!(settings.llm.provider_order, vec!["groq", "gemini"]);
        assert_eq!(settings.gateway_timeouts().text, Duration::from_secs(2));
        assert_eq!(settings.llm.audio_timeout_ms, DEFAULT_AUDIO_TIMEOUT_MS);
        assert_eq!(settings.drive.library_limit, DEFAULT_LIBRARY_LIMIT);
        assert_eq!(settings.drive.folders.resolve("mario@example.com").folder_id, "f-mario");
        assert_eq!(
            settings.find_user("MARIO@example.com").map(|u| u.name.as_str()),
            Some("Mario")
        );
    }

    #[test]
    fn test_invalid_file_is_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(matches!(
            Settings::load(file.path()),
            Err(SettingsError::Parse { .. })
        ));
    }

    #[test]
    fn test_env_overrides_api_keys() {
        let mut settings = Settings::default();
        settings.llm.api_keys.insert("gemini".to_string(), "from-file".to_string());
        settings.apply_overrides(|name| match name {
            "GEMINI_API_KEY" => Some("from-env".to_string()),
            "GROQ_API_KEY" => Some("  ".to_string()),
            _ => None,
        });
        assert_eq!(settings.llm.api_keys["gemini"], "from-env");
        assert!(!settings.llm.api_keys.contains_key("groq"));

        let config = settings.llm_config();
        assert_eq!(config.api_keys["gemini"], "from-env");
        assert_eq!(config.timeout, Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS));
    }
}
