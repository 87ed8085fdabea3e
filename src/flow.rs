//! Save, voice, profile and edit flows.
//!
//! Each flow takes the wizard behind a `tokio::sync::Mutex`, starts processing,
//! releases the lock for the network calls and reacquires it to apply the
//! result with the processing ticket.

use crate::drive::{
    idea_file_name, image_file_name, DriveError, DriveFile, DriveStore, FolderMap,
    FolderResolution,
};
use crate::idea::{
    IdeaFields, IdeationForm, NormalizedIdea, SavedIdeaRecord, VoiceExtraction,
    UPLOAD_FAILED_MARKER,
};
use crate::library::{IdeaLibrary, LibraryError};
use crate::llm::{GatewayError, LlmGateway, ProviderFailure, Served};
use crate::session::Session;
use crate::voice::AudioClip;
use crate::wizard::{ProcessingTask, ProcessingTicket, SavedSummary, Wizard, WizardError};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// How long an error stays on the Processing screen before the wizard moves on.
pub const DEFAULT_ERROR_DISPLAY_DELAY: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowSettings {
    pub error_display_delay: Duration,
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            error_display_delay: DEFAULT_ERROR_DISPLAY_DELAY,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Drive(#[from] DriveError),

    #[error(transparent)]
    Library(#[from] LibraryError),

    #[error(transparent)]
    Wizard(#[from] WizardError),

    #[error("The recording is empty")]
    EmptyRecording,

    #[error("Not connected to Google Drive")]
    Offline,
}

impl FlowError {
    /// Message shown as the wizard's error text.
    pub fn user_message(&self) -> String {
        match self {
            FlowError::Drive(e) | FlowError::Library(LibraryError::Drive(e)) => e.user_message(),
            FlowError::Gateway(GatewayError::NoProviders(_)) => {
                "No AI provider is configured. Add an API key in Settings.".to_string()
            }
            FlowError::Gateway(e) => format!("AI processing failed: {}", e),
            other => other.to_string(),
        }
    }
}

/// Result of a completed save.
#[derive(Debug, Clone)]
pub struct SaveOutcome {
    pub idea: NormalizedIdea,
    /// Provider that normalized the idea; `None` when raw form data was saved.
    pub provider: Option<&'static str>,
    pub provider_failures: Vec<ProviderFailure>,
    /// The written CSV file; `None` when running offline.
    pub file: Option<DriveFile>,
    pub folder: Option<FolderResolution>,
    /// Indices of images whose upload failed.
    pub failed_uploads: Vec<usize>,
}

impl SaveOutcome {
    pub fn is_degraded(&self) -> bool {
        self.provider.is_none()
    }
}

/// Append non-empty clarification answers to the solution summary.
pub fn apply_clarifications(form: &IdeationForm, answers: &[String]) -> IdeationForm {
    let answers: Vec<&str> = answers
        .iter()
        .map(|a| a.trim())
        .filter(|a| !a.is_empty())
        .collect();
    let mut form = form.clone();
    if !answers.is_empty() {
        form.solution_summary = format!(
            "{} [Clarification]: {}",
            form.solution_summary.trim_end(),
            answers.join("; ")
        );
    }
    form
}

/// Orchestrates the wizard's I/O over the LLM gateway and Drive.
pub struct IdeationService {
    gateway: Arc<LlmGateway>,
    store: Option<Arc<dyn DriveStore>>,
    folders: FolderMap,
    settings: FlowSettings,
}

impl IdeationService {
    pub fn new(
        gateway: Arc<LlmGateway>,
        store: Option<Arc<dyn DriveStore>>,
        folders: FolderMap,
    ) -> Self {
        Self {
            gateway,
            store,
            folders,
            settings: FlowSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: FlowSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn gateway(&self) -> &LlmGateway {
        &self.gateway
    }

    pub fn is_offline(&self) -> bool {
        self.store.is_none()
    }

    /// The Drive store, or `FlowError::Offline` without one.
    pub fn store(&self) -> Result<&dyn DriveStore, FlowError> {
        self.store.as_deref().ok_or(FlowError::Offline)
    }

    /// Normalize, upload images in order, then write the CSV.
    ///
    /// Image upload failures are recorded per slot; a failed CSV write fails the save.
    pub async fn save(
        &self,
        form: &IdeationForm,
        session: &Session,
        clarifications: &[String],
    ) -> Result<SaveOutcome, FlowError> {
        let form = apply_clarifications(form, clarifications);
        let normalized = self
            .gateway
            .normalize_or_raw(&form, session.email(), &session.instruction())
            .await;

        let Some(store) = self.store.as_deref() else {
            log::info!("Offline: idea '{}' not written to Drive", normalized.idea.project_name);
            return Ok(SaveOutcome {
                idea: normalized.idea,
                provider: normalized.provider,
                provider_failures: normalized.failures,
                file: None,
                folder: None,
                failed_uploads: Vec::new(),
            });
        };

        let folder = self.folders.resolve(session.email());

        let mut urls = Vec::with_capacity(form.images.len());
        let mut failed_uploads = Vec::new();
        for (index, image) in form.images.iter().enumerate() {
            let name = image_file_name(&form.session_id, index, &image.mime_type);
            match store
                .upload(&image.bytes, &name, &image.mime_type, &folder.folder_id)
                .await
            {
                Ok(url) => urls.push(url),
                Err(e) => {
                    log::warn!("Image {} upload failed: {}", index + 1, e);
                    failed_uploads.push(index);
                    urls.push(UPLOAD_FAILED_MARKER.to_string());
                }
            }
        }

        let idea = normalized.idea.with_image_urls(&urls);
        let name = idea_file_name(&idea.project_name, Utc::now().date_naive());
        let file = store.write(&idea.to_csv(), &name, &folder.folder_id).await?;

        log::info!(
            "Saved idea {} ({} images, {} failed)",
            idea.idea_id,
            urls.len(),
            failed_uploads.len()
        );

        Ok(SaveOutcome {
            idea,
            provider: normalized.provider,
            provider_failures: normalized.failures,
            file: Some(file),
            folder: Some(folder),
            failed_uploads,
        })
    }

    /// Show the error on Processing, wait, then return to the task's screen.
    async fn fail(&self, wizard: &Mutex<Wizard>, ticket: ProcessingTicket, err: &FlowError) {
        if !wizard.lock().await.fail(ticket, err.user_message()) {
            return;
        }
        tokio::time::sleep(self.settings.error_display_delay).await;
        wizard.lock().await.acknowledge_error();
    }

    /// Save the wizard's form from Review.
    pub async fn submit(
        &self,
        wizard: &Mutex<Wizard>,
        session: &Session,
    ) -> Result<SaveOutcome, FlowError> {
        let (ticket, form, answers) = {
            let mut w = wizard.lock().await;
            let ticket = w.begin_processing(ProcessingTask::Save)?;
            (ticket, w.form().clone(), w.clarification_answers())
        };

        match self.save(&form, session, &answers).await {
            Ok(outcome) => {
                let summary = SavedSummary {
                    idea: outcome.idea.clone(),
                    provider: outcome.provider,
                    file_id: outcome.file.as_ref().map(|f| f.id.clone()),
                };
                if !wizard.lock().await.complete_save(ticket, summary) {
                    log::info!("Save finished after the user left Processing");
                }
                Ok(outcome)
            }
            Err(e) => {
                self.fail(wizard, ticket, &e).await;
                Err(e)
            }
        }
    }

    /// Extract form fields from a recorded voice note.
    pub async fn process_voice(
        &self,
        wizard: &Mutex<Wizard>,
        clip: AudioClip,
        session: &Session,
    ) -> Result<Served<VoiceExtraction>, FlowError> {
        let ticket = wizard.lock().await.begin_processing(ProcessingTask::Voice)?;

        let result = if clip.is_empty() {
            Err(FlowError::EmptyRecording)
        } else {
            self.gateway
                .extract_from_audio(&clip.bytes, &clip.mime_type, &session.instruction())
                .await
                .map_err(FlowError::from)
        };

        match result {
            Ok(served) => {
                wizard.lock().await.complete_voice(ticket, served.value.clone());
                Ok(served)
            }
            Err(e) => {
                self.fail(wizard, ticket, &e).await;
                Err(e)
            }
        }
    }

    /// Generate an idea tailored to the wizard's person profile.
    pub async fn synthesize_from_profile(
        &self,
        wizard: &Mutex<Wizard>,
        session: &Session,
    ) -> Result<Served<IdeaFields>, FlowError> {
        let (ticket, person) = {
            let mut w = wizard.lock().await;
            let ticket = w.begin_processing(ProcessingTask::Profile)?;
            (ticket, w.person().clone())
        };

        match self
            .gateway
            .generate_from_profile(&person, &session.instruction())
            .await
        {
            Ok(served) => {
                wizard.lock().await.complete_profile(ticket, served.value.clone());
                Ok(served)
            }
            Err(e) => {
                let e = FlowError::from(e);
                self.fail(wizard, ticket, &e).await;
                Err(e)
            }
        }
    }

    /// Saved ideas visible to the session's identity.
    pub async fn load_library(
        &self,
        library: &IdeaLibrary,
        session: &Session,
    ) -> Result<Vec<SavedIdeaRecord>, FlowError> {
        let store = self.store()?;
        let folder = self.folders.resolve(session.email());
        Ok(library
            .refresh(store, session.email(), &folder.folder_id)
            .await?)
    }

    /// Write an edited idea from IdeaEdit back to Drive.
    pub async fn save_edit(
        &self,
        wizard: &Mutex<Wizard>,
        library: &IdeaLibrary,
        session: &Session,
        edited: &NormalizedIdea,
    ) -> Result<SavedIdeaRecord, FlowError> {
        let record = wizard
            .lock()
            .await
            .selected()
            .cloned()
            .ok_or(WizardError::NothingSelected)?;

        let result = match self.store() {
            Ok(store) => library
                .update(store, session.email(), &record, edited)
                .await
                .map_err(FlowError::from),
            Err(e) => Err(e),
        };

        let mut w = wizard.lock().await;
        match result {
            Ok(updated) => {
                w.complete_edit(updated.clone())?;
                Ok(updated)
            }
            Err(e) => {
                log::error!("Edit save failed: {}", e);
                w.set_error(e.user_message());
                Err(e)
            }
        }
    }
}
