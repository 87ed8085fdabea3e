//! Idea data model.
//!
//! `IdeationForm` is the mutable record the wizard edits; `NormalizedIdea` is the
//! flat value written to storage as CSV; `SavedIdeaRecord` pairs a stored file with
//! its parsed idea.

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::csv_codec::{self, CsvError, CsvRecord, IDEA_CSV_HEADERS};

/// Maximum number of images attached to one idea (and image slots in the CSV).
pub const MAX_IMAGES: usize = 5;

/// Status of an idea produced by a successful LLM normalization.
pub const STATUS_NEW: &str = "new";

/// Status of an idea built from the raw form because every provider failed.
pub const STATUS_RAW: &str = "raw";

pub const DEFAULT_PRIORITY: &str = "P2";

const ALLOWED_PRIORITIES: &[&str] = &["P0", "P1", "P2", "P3"];

pub const SOURCE_PREFIX: &str = "ideation_app";

pub const INITIAL_VERSION: &str = "v1";

/// Written into an image slot when that image failed to upload.
pub const UPLOAD_FAILED_MARKER: &str = "UPLOAD_FAILED";

#[derive(Debug, thiserror::Error)]
pub enum IdeaError {
    #[error("Invalid image data: {0}")]
    InvalidImage(String),

    #[error("An idea holds at most 5 images")]
    TooManyImages,

    #[error("Stored idea is missing required field '{0}'")]
    MissingField(&'static str),

    #[error(transparent)]
    Csv(#[from] CsvError),
}

/// An image attached to the form, kept as raw bytes until upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl ImageAttachment {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    /// Decode a browser data URL (`data:image/jpeg;base64,...`).
    pub fn from_data_url(data_url: &str) -> Result<Self, IdeaError> {
        let (header, payload) = data_url
            .split_once(',')
            .ok_or_else(|| IdeaError::InvalidImage("base64 content missing".to_string()))?;

        if payload.trim().is_empty() {
            return Err(IdeaError::InvalidImage("base64 content missing".to_string()));
        }

        let mime_type = header
            .strip_prefix("data:")
            .and_then(|rest| rest.split(';').next())
            .filter(|m| !m.is_empty())
            .unwrap_or("image/jpeg")
            .to_string();

        let bytes = STANDARD
            .decode(payload.trim())
            .map_err(|e| IdeaError::InvalidImage(e.to_string()))?;

        Ok(Self { bytes, mime_type })
    }
}

fn overwrite_if_present(target: &mut String, value: &Option<String>) {
    if let Some(v) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        *target = v.to_string();
    }
}

/// The wizard's in-progress form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdeationForm {
    /// Groups the idea with its uploaded images.
    pub session_id: String,
    pub project_name: String,
    pub problem_statement: String,
    pub target_user: String,
    pub solution_summary: String,
    pub constraints: String,
    pub differentiation: String,
    pub risks: String,
    pub next_action: String,
    pub tags: String,
    pub images: Vec<ImageAttachment>,
    pub audio_transcript: Option<String>,
}

impl Default for IdeationForm {
    fn default() -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            project_name: String::new(),
            problem_statement: String::new(),
            target_user: String::new(),
            solution_summary: String::new(),
            constraints: String::new(),
            differentiation: String::new(),
            risks: String::new(),
            next_action: String::new(),
            tags: String::new(),
            images: Vec::new(),
            audio_transcript: None,
        }
    }
}

impl IdeationForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_image(&mut self, image: ImageAttachment) -> Result<(), IdeaError> {
        if self.images.len() >= MAX_IMAGES {
            return Err(IdeaError::TooManyImages);
        }
        self.images.push(image);
        Ok(())
    }

    pub fn remove_image(&mut self, index: usize) -> Option<ImageAttachment> {
        (index < self.images.len()).then(|| self.images.remove(index))
    }

    /// Overwrite fields with every non-empty value from `partial`.
    pub fn merge(&mut self, partial: &IdeaFields) {
        overwrite_if_present(&mut self.project_name, &partial.project_name);
        overwrite_if_present(&mut self.problem_statement, &partial.problem_statement);
        overwrite_if_present(&mut self.target_user, &partial.target_user);
        overwrite_if_present(&mut self.solution_summary, &partial.solution_summary);
        overwrite_if_present(&mut self.constraints, &partial.constraints);
        overwrite_if_present(&mut self.differentiation, &partial.differentiation);
        overwrite_if_present(&mut self.risks, &partial.risks);
        overwrite_if_present(&mut self.next_action, &partial.next_action);
        overwrite_if_present(&mut self.tags, &partial.tags);
    }
}

/// A partial set of form fields as returned by the LLM (camelCase on the wire).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IdeaFields {
    pub project_name: Option<String>,
    pub problem_statement: Option<String>,
    pub target_user: Option<String>,
    pub solution_summary: Option<String>,
    pub constraints: Option<String>,
    pub differentiation: Option<String>,
    pub risks: Option<String>,
    pub next_action: Option<String>,
    pub tags: Option<String>,
}

impl From<&IdeationForm> for IdeaFields {
    fn from(form: &IdeationForm) -> Self {
        Self {
            project_name: Some(form.project_name.clone()),
            problem_statement: Some(form.problem_statement.clone()),
            target_user: Some(form.target_user.clone()),
            solution_summary: Some(form.solution_summary.clone()),
            constraints: Some(form.constraints.clone()),
            differentiation: Some(form.differentiation.clone()),
            risks: Some(form.risks.clone()),
            next_action: Some(form.next_action.clone()),
            tags: Some(form.tags.clone()),
        }
    }
}

/// Profile of a person an idea should be tailored to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersonProfile {
    pub name: String,
    pub expertise: String,
    pub passions: String,
    pub challenges: String,
    pub lifestyle: String,
    pub manual_extension: String,
}

impl PersonProfile {
    pub fn merge(&mut self, partial: &PersonFields) {
        overwrite_if_present(&mut self.name, &partial.name);
        overwrite_if_present(&mut self.expertise, &partial.expertise);
        overwrite_if_present(&mut self.passions, &partial.passions);
        overwrite_if_present(&mut self.challenges, &partial.challenges);
        overwrite_if_present(&mut self.lifestyle, &partial.lifestyle);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonFields {
    pub name: Option<String>,
    pub expertise: Option<String>,
    pub passions: Option<String>,
    pub challenges: Option<String>,
    pub lifestyle: Option<String>,
}

impl PersonFields {
    pub fn is_empty(&self) -> bool {
        [
            &self.name,
            &self.expertise,
            &self.passions,
            &self.challenges,
            &self.lifestyle,
        ]
        .iter()
        .all(|v| v.as_deref().map(str::trim).unwrap_or("").is_empty())
    }
}

/// Result of transcribing and analysing a voice note.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceExtraction {
    pub transcript: String,
    #[serde(default, rename = "extracted_data")]
    pub extracted_fields: IdeaFields,
    #[serde(default, rename = "extracted_person")]
    pub extracted_profile: Option<PersonFields>,
    #[serde(default, rename = "questions")]
    pub clarifying_questions: Vec<String>,
}

/// Flat, storage-ready idea. Field names match the CSV header contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedIdea {
    pub idea_id: String,
    pub session_uuid: String,
    pub created_at: String,
    pub updated_at: String,
    pub created_by_email: String,
    pub project_name: String,
    pub problem_statement: String,
    pub target_user: String,
    pub solution_summary: String,
    pub constraints: String,
    pub differentiation: String,
    pub risks: String,
    pub next_action: String,
    pub status: String,
    pub priority: String,
    pub tags: String,
    pub source: String,
    pub version: String,
    pub image_urls: [String; MAX_IMAGES],
    pub audio_transcript: String,
    pub harness_project_type: String,
    pub harness_tech_stack: String,
    pub harness_features: String,
}

/// Fields an LLM normalization returns (snake_case on the wire).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NormalizedFields {
    pub project_name: Option<String>,
    pub problem_statement: Option<String>,
    pub target_user: Option<String>,
    pub solution_summary: Option<String>,
    pub constraints: Option<String>,
    pub differentiation: Option<String>,
    pub risks: Option<String>,
    pub next_action: Option<String>,
    pub tags: Option<String>,
    pub priority: Option<String>,
}

/// Coerce an arbitrary priority string into P0..P3.
pub fn normalize_priority(raw: Option<&str>) -> String {
    let candidate = raw.map(|p| p.trim().to_ascii_uppercase()).unwrap_or_default();
    if ALLOWED_PRIORITIES.contains(&candidate.as_str()) {
        candidate
    } else {
        DEFAULT_PRIORITY.to_string()
    }
}

/// `v1` -> `v2`; anything unparseable restarts at `v2`.
pub fn bump_version(version: &str) -> String {
    let n = version
        .trim()
        .strip_prefix('v')
        .and_then(|n| n.split('.').next())
        .and_then(|n| n.parse::<u32>().ok())
        .unwrap_or(1);
    format!("v{}", n + 1)
}

impl NormalizedIdea {
    fn base(form: &IdeationForm, created_by_email: &str) -> Self {
        Self {
            idea_id: Uuid::new_v4().to_string(),
            session_uuid: form.session_id.clone(),
            created_at: Utc::now().to_rfc3339(),
            updated_at: String::new(),
            created_by_email: created_by_email.to_string(),
            project_name: form.project_name.clone(),
            problem_statement: form.problem_statement.clone(),
            target_user: form.target_user.clone(),
            solution_summary: form.solution_summary.clone(),
            constraints: form.constraints.clone(),
            differentiation: form.differentiation.clone(),
            risks: form.risks.clone(),
            next_action: form.next_action.clone(),
            status: STATUS_NEW.to_string(),
            priority: DEFAULT_PRIORITY.to_string(),
            tags: form.tags.clone(),
            source: SOURCE_PREFIX.to_string(),
            version: INITIAL_VERSION.to_string(),
            image_urls: Default::default(),
            audio_transcript: form.audio_transcript.clone().unwrap_or_default(),
            harness_project_type: String::new(),
            harness_tech_stack: String::new(),
            harness_features: String::new(),
        }
    }

    /// Build from an LLM normalization, falling back per field to the raw form.
    pub fn from_llm(
        form: &IdeationForm,
        created_by_email: &str,
        fields: &NormalizedFields,
        provider: &str,
    ) -> Self {
        fn pick(llm: &Option<String>, raw: &str) -> String {
            llm.as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| raw.to_string())
        }

        let mut idea = Self::base(form, created_by_email);
        idea.project_name = pick(&fields.project_name, &form.project_name);
        idea.problem_statement = pick(&fields.problem_statement, &form.problem_statement);
        idea.target_user = pick(&fields.target_user, &form.target_user);
        idea.solution_summary = pick(&fields.solution_summary, &form.solution_summary);
        idea.constraints = pick(&fields.constraints, &form.constraints);
        idea.differentiation = pick(&fields.differentiation, &form.differentiation);
        idea.risks = pick(&fields.risks, &form.risks);
        idea.next_action = pick(&fields.next_action, &form.next_action);
        idea.tags = pick(&fields.tags, &form.tags);
        idea.priority = normalize_priority(fields.priority.as_deref());
        idea.source = format!("{}_{}", SOURCE_PREFIX, provider);
        idea
    }

    /// Degraded path: copy the raw form unchanged.
    pub fn from_raw_form(form: &IdeationForm, created_by_email: &str) -> Self {
        let mut idea = Self::base(form, created_by_email);
        idea.status = STATUS_RAW.to_string();
        idea.source = format!("{}_raw", SOURCE_PREFIX);
        idea
    }

    /// Fill image slots in order; extra urls are ignored.
    pub fn with_image_urls(mut self, urls: &[String]) -> Self {
        for (slot, url) in self.image_urls.iter_mut().zip(urls.iter()) {
            *slot = url.clone();
        }
        self
    }

    /// First image slot holding a real URL.
    pub fn thumbnail_url(&self) -> Option<&str> {
        let first = self.image_urls[0].as_str();
        (!first.is_empty() && first != UPLOAD_FAILED_MARKER).then_some(first)
    }

    /// Next version of this idea with edited content.
    pub fn revised(&self, edit: impl FnOnce(&mut NormalizedIdea)) -> NormalizedIdea {
        let mut next = self.clone();
        edit(&mut next);
        next.idea_id = self.idea_id.clone();
        next.session_uuid = self.session_uuid.clone();
        next.created_at = self.created_at.clone();
        next.created_by_email = self.created_by_email.clone();
        next.priority = normalize_priority(Some(&next.priority));
        next.version = bump_version(&self.version);
        next.updated_at = Utc::now().to_rfc3339();
        next
    }

    pub fn to_record(&self) -> CsvRecord {
        let mut r = HashMap::with_capacity(IDEA_CSV_HEADERS.len());
        let mut put = |k: &str, v: &str| {
            r.insert(k.to_string(), v.to_string());
        };
        put("idea_id", &self.idea_id);
        put("session_uuid", &self.session_uuid);
        put("created_at", &self.created_at);
        put("updated_at", &self.updated_at);
        put("created_by_email", &self.created_by_email);
        put("project_name", &self.project_name);
        put("problem_statement", &self.problem_statement);
        put("target_user", &self.target_user);
        put("solution_summary", &self.solution_summary);
        put("constraints", &self.constraints);
        put("differentiation", &self.differentiation);
        put("risks", &self.risks);
        put("next_action", &self.next_action);
        put("status", &self.status);
        put("priority", &self.priority);
        put("tags", &self.tags);
        put("source", &self.source);
        put("version", &self.version);
        put("image_url_1", &self.image_urls[0]);
        put("image_url_2", &self.image_urls[1]);
        put("image_url_3", &self.image_urls[2]);
        put("image_url_4", &self.image_urls[3]);
        put("image_url_5", &self.image_urls[4]);
        put("audio_transcript", &self.audio_transcript);
        put("harness_project_type", &self.harness_project_type);
        put("harness_tech_stack", &self.harness_tech_stack);
        put("harness_features", &self.harness_features);
        r
    }

    pub fn from_record(record: &CsvRecord) -> Result<Self, IdeaError> {
        let get = |k: &str| record.get(k).cloned().unwrap_or_default();

        let idea_id = get("idea_id");
        if idea_id.is_empty() {
            return Err(IdeaError::MissingField("idea_id"));
        }

        Ok(Self {
            idea_id,
            session_uuid: get("session_uuid"),
            created_at: get("created_at"),
            updated_at: get("updated_at"),
            created_by_email: get("created_by_email"),
            project_name: get("project_name"),
            problem_statement: get("problem_statement"),
            target_user: get("target_user"),
            solution_summary: get("solution_summary"),
            constraints: get("constraints"),
            differentiation: get("differentiation"),
            risks: get("risks"),
            next_action: get("next_action"),
            status: get("status"),
            priority: normalize_priority(record.get("priority").map(String::as_str)),
            tags: get("tags"),
            source: get("source"),
            version: get("version"),
            image_urls: [
                get("image_url_1"),
                get("image_url_2"),
                get("image_url_3"),
                get("image_url_4"),
                get("image_url_5"),
            ],
            audio_transcript: get("audio_transcript"),
            harness_project_type: get("harness_project_type"),
            harness_tech_stack: get("harness_tech_stack"),
            harness_features: get("harness_features"),
        })
    }

    pub fn to_csv(&self) -> String {
        csv_codec::serialize(&self.to_record(), IDEA_CSV_HEADERS)
    }

    pub fn from_csv(content: &str) -> Result<Self, IdeaError> {
        let record = csv_codec::parse_record(content, Some(IDEA_CSV_HEADERS))?;
        Self::from_record(&record)
    }
}

/// A stored idea as listed from Drive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedIdeaRecord {
    pub file_id: String,
    pub file_name: String,
    pub created_time: Option<DateTime<Utc>>,
    pub data: NormalizedIdea,
    pub thumbnail_url: Option<String>,
}

impl SavedIdeaRecord {
    pub fn new(
        file_id: String,
        file_name: String,
        created_time: Option<DateTime<Utc>>,
        data: NormalizedIdea,
    ) -> Self {
        let thumbnail_url = data.thumbnail_url().map(str::to_string);
        Self {
            file_id,
            file_name,
            created_time,
            data,
            thumbnail_url,
        }
    }
}
