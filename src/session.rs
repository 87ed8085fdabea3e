//! Explicit session context passed to the flows.

use crate::llm::{compose_instruction, find_preset};
use serde::{Deserialize, Serialize};

/// Preset used when a session has not picked one.
pub const DEFAULT_PRESET_ID: &str = "normal";

/// The signed-in person.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    pub email: String,
    pub name: String,
    /// Persona text prepended to every LLM instruction.
    #[serde(default)]
    pub base_instruction: String,
}

/// How the instruction modifier is chosen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "snake_case")]
pub enum InstructionMode {
    Preset(String),
    Custom(String),
}

impl Default for InstructionMode {
    fn default() -> Self {
        InstructionMode::Preset(DEFAULT_PRESET_ID.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub identity: UserIdentity,
    /// Drive bearer token. `None` keeps the session offline.
    pub access_token: Option<String>,
    pub instruction_mode: InstructionMode,
}

impl Session {
    pub fn new(identity: UserIdentity) -> Self {
        Self {
            identity,
            access_token: None,
            instruction_mode: InstructionMode::default(),
        }
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn with_instruction_mode(mut self, mode: InstructionMode) -> Self {
        self.instruction_mode = mode;
        self
    }

    pub fn email(&self) -> &str {
        &self.identity.email
    }

    /// Base instruction followed by the preset modifier or custom text.
    pub fn instruction(&self) -> String {
        let modifier = match &self.instruction_mode {
            InstructionMode::Custom(text) => text.clone(),
            InstructionMode::Preset(id) => match find_preset(id) {
                Some(preset) => preset.modifier.to_string(),
                None => {
                    log::warn!("Unknown instruction preset '{}', using '{}'", id, DEFAULT_PRESET_ID);
                    find_preset(DEFAULT_PRESET_ID)
                        .map(|p| p.modifier.to_string())
                        .unwrap_or_default()
                }
            },
        };
        compose_instruction(&self.identity.base_instruction, &modifier)
    }
}
