//! Instruction presets and prompt builders for the ideation operations.

use crate::idea::{IdeaFields, PersonProfile};

/// A named instruction modifier appended to the identity's base instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstructionPreset {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub modifier: &'static str,
}

pub const PRESETS: &[InstructionPreset] = &[
    InstructionPreset {
        id: "normal",
        name: "Normal",
        description: "Clear, professional documentation",
        modifier: "You are an expert in professional documentation. Focus on clarity, technical accuracy and standard business terminology. Keep a neutral tone.",
    },
    InstructionPreset {
        id: "yolo",
        name: "YOLO Mode",
        description: "Bold vision over caution",
        modifier: "You are a high-speed innovation agent. Ignore minor constraints. Use bold, disruptive language. Prioritize excitement and vision over safety and documentation. Ship fast!",
    },
    InstructionPreset {
        id: "mvp",
        name: "MVP Focus",
        description: "Cut everything but the core loop",
        modifier: "You are a minimalist product architect. Your goal is to find the absolute minimum viable product. Be ruthless. Cut every feature that is not essential to the core loop.",
    },
    InstructionPreset {
        id: "strategic",
        name: "Strategic",
        description: "Moats, positioning and scale",
        modifier: "You are a strategy consultant. Focus heavily on competitive advantage, moats, market positioning and long-term scalability.",
    },
];

pub fn find_preset(id: &str) -> Option<&'static InstructionPreset> {
    PRESETS.iter().find(|p| p.id == id)
}

/// Final instruction sent with every operation: base instruction, newline, modifier.
pub fn compose_instruction(base_instruction: &str, modifier: &str) -> String {
    format!("{}\n{}", base_instruction.trim(), modifier.trim())
}

/// Remove a surrounding markdown code fence (```json ... ```) if present.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Skip the info string (e.g. "json") on the opening fence line.
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest.trim_start_matches("json"),
    };
    body.trim_end().trim_end_matches("```").trim()
}

pub(crate) fn normalize_system_prompt(instruction: &str) -> String {
    format!(
        r#"{instruction}

Normalize the idea data the user sends. Rewrite each field into concise, well-formed prose without inventing facts.
Respond ONLY with a JSON object with these string keys:
"project_name", "problem_statement", "target_user", "solution_summary", "constraints",
"differentiation", "risks", "next_action", "tags", "priority".
"tags" is a comma-separated list. "priority" is exactly one of "P0", "P1", "P2", "P3"."#
    )
}

pub(crate) fn normalize_user_message(fields: &IdeaFields) -> String {
    let json = serde_json::to_string(fields).unwrap_or_else(|_| "{}".to_string());
    format!("Normalize this idea data: {}", json)
}

pub(crate) fn audio_extraction_system_prompt(instruction: &str) -> String {
    format!(
        r#"{instruction}

You receive the verbatim transcript of a voice note. Extract either startup idea data or data about a person.
Respond ONLY with a JSON object:
{{
  "extracted_data": {{ "projectName": "", "problemStatement": "", "solutionSummary": "", "targetUser": "",
                      "constraints": "", "differentiation": "", "risks": "", "nextAction": "", "tags": "" }},
  "extracted_person": {{ "name": "", "expertise": "", "passions": "", "challenges": "", "lifestyle": "" }},
  "questions": ["clarifying question", "..."]
}}
Leave fields you cannot fill empty. Ask questions only when essential information is missing."#
    )
}

pub(crate) fn audio_extraction_user_message(transcript: &str) -> String {
    format!("Analyze this transcript: \"{}\"", transcript)
}

pub(crate) fn profile_system_prompt(instruction: &str) -> String {
    format!(
        r#"{instruction}

Generate an innovative app idea tailored to the person described by the user. The concept must solve a real problem of this person or scale one of their strengths digitally.
Respond ONLY with a JSON object with these string keys:
"projectName", "problemStatement", "targetUser", "solutionSummary", "differentiation", "nextAction", "tags"."#
    )
}

pub(crate) fn profile_user_message(profile: &PersonProfile) -> String {
    format!(
        "Name/role: {}\nExpertise: {}\nPassions: {}\nChallenges: {}\nLifestyle: {}\nAdditional info: {}",
        profile.name,
        profile.expertise,
        profile.passions,
        profile.challenges,
        profile.lifestyle,
        profile.manual_extension
    )
}

pub(crate) const HARNESS_SYSTEM_PROMPT: &str = "You are a senior software architect. You break product ideas down into implementable, testable features. Respond ONLY with the requested JSON.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_preset() {
        assert_eq!(find_preset("mvp").map(|p| p.name), Some("MVP Focus"));
        assert!(find_preset("unknown").is_none());
        assert_eq!(PRESETS.len(), 4);
    }

    #[test]
    fn test_compose_instruction() {
        assert_eq!(compose_instruction("You are Mario. ", " Be brief."), "You are Mario.\nBe brief.");
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n[1, 2]\n```\n"), "[1, 2]");
        assert_eq!(strip_code_fences("  {\"a\":1} "), "{\"a\":1}");
        assert_eq!(strip_code_fences("```json{\"a\":1}```"), "{\"a\":1}");
    }

    #[test]
    fn test_normalize_user_message_is_camel_case_json() {
        let fields = IdeaFields {
            project_name: Some("Acme".to_string()),
            ..Default::default()
        };
        assert!(normalize_user_message(&fields).contains("\"projectName\":\"Acme\""));
    }
}
