//! Wizard state: current screen, the form being filled in and the processing ticket.
//!
//! The wizard performs no I/O. Flows call `begin_processing`, run the work
//! without holding the wizard, then hand the result back with the ticket. A
//! result whose ticket is no longer current (the user cancelled) is dropped.

mod transitions;

pub use transitions::{
    can_advance, required_field, transition, ProcessingTask, Requirement, Screen, WizardEvent,
};

use crate::idea::{
    IdeaFields, IdeationForm, ImageAttachment, NormalizedIdea, PersonProfile, SavedIdeaRecord,
    VoiceExtraction,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WizardError {
    #[error("Please fill in the {} first", .0.label())]
    GuardRejected(Requirement),

    #[error("{event:?} is not available on {screen}")]
    NoTransition { screen: Screen, event: WizardEvent },

    #[error("A submission is already being processed")]
    AlreadyProcessing,

    #[error("No saved idea selected")]
    NothingSelected,
}

/// Proof that a caller started the current processing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessingTicket {
    id: u64,
    task: ProcessingTask,
}

impl ProcessingTicket {
    pub fn task(&self) -> ProcessingTask {
        self.task
    }
}

/// Editable text fields of the idea form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    ProjectName,
    ProblemStatement,
    TargetUser,
    SolutionSummary,
    Constraints,
    Differentiation,
    Risks,
    NextAction,
    Tags,
}

/// Editable fields of the person profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersonField {
    Name,
    Expertise,
    Passions,
    Challenges,
    Lifestyle,
    ManualExtension,
}

/// Outcome of the last successful save, shown on Success.
#[derive(Debug, Clone)]
pub struct SavedSummary {
    pub idea: NormalizedIdea,
    pub provider: Option<&'static str>,
    pub file_id: Option<String>,
}

#[derive(Debug)]
pub struct Wizard {
    screen: Screen,
    form: IdeationForm,
    person: PersonProfile,
    clarifying_questions: Vec<String>,
    clarification_answers: Vec<String>,
    error: Option<String>,
    active: Option<ProcessingTicket>,
    failed: Option<ProcessingTask>,
    next_ticket: u64,
    last_saved: Option<SavedSummary>,
    selected: Option<SavedIdeaRecord>,
}

impl Default for Wizard {
    fn default() -> Self {
        Self::new()
    }
}

impl Wizard {
    pub fn new() -> Self {
        Self {
            screen: Screen::Dashboard,
            form: IdeationForm::new(),
            person: PersonProfile::default(),
            clarifying_questions: Vec::new(),
            clarification_answers: Vec::new(),
            error: None,
            active: None,
            failed: None,
            next_ticket: 1,
            last_saved: None,
            selected: None,
        }
    }

    pub fn screen(&self) -> Screen {
        self.screen
    }

    pub fn form(&self) -> &IdeationForm {
        &self.form
    }

    pub fn person(&self) -> &PersonProfile {
        &self.person
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn clarifying_questions(&self) -> &[String] {
        &self.clarifying_questions
    }

    pub fn last_saved(&self) -> Option<&SavedSummary> {
        self.last_saved.as_ref()
    }

    pub fn selected(&self) -> Option<&SavedIdeaRecord> {
        self.selected.as_ref()
    }

    pub fn can_advance(&self) -> bool {
        can_advance(self.screen, &self.form, &self.person)
    }

    /// Apply a navigation event.
    pub fn dispatch(&mut self, event: WizardEvent) -> Result<Screen, WizardError> {
        if event == WizardEvent::Next && !self.can_advance() {
            if let Some(requirement) = required_field(self.screen) {
                return Err(WizardError::GuardRejected(requirement));
            }
        }

        let next = transition(self.screen, event).ok_or(WizardError::NoTransition {
            screen: self.screen,
            event,
        })?;

        let from = self.screen;
        if from == Screen::Processing {
            // Leaving Processing by any route invalidates the in-flight ticket.
            self.active = None;
            self.failed = None;
        }
        if from == Screen::Processing && next == Screen::Dashboard {
            // Cancelled runs abandon the form.
            self.reset_form();
        }
        if next == Screen::Dashboard {
            self.error = None;
        }

        log::debug!("Wizard {} -> {} on {:?}", from, next, event);
        self.screen = next;
        Ok(next)
    }

    pub fn set_field(&mut self, field: FormField, value: impl Into<String>) {
        let value = value.into();
        let slot = match field {
            FormField::ProjectName => &mut self.form.project_name,
            FormField::ProblemStatement => &mut self.form.problem_statement,
            FormField::TargetUser => &mut self.form.target_user,
            FormField::SolutionSummary => &mut self.form.solution_summary,
            FormField::Constraints => &mut self.form.constraints,
            FormField::Differentiation => &mut self.form.differentiation,
            FormField::Risks => &mut self.form.risks,
            FormField::NextAction => &mut self.form.next_action,
            FormField::Tags => &mut self.form.tags,
        };
        *slot = value;
    }

    pub fn set_person_field(&mut self, field: PersonField, value: impl Into<String>) {
        let value = value.into();
        let slot = match field {
            PersonField::Name => &mut self.person.name,
            PersonField::Expertise => &mut self.person.expertise,
            PersonField::Passions => &mut self.person.passions,
            PersonField::Challenges => &mut self.person.challenges,
            PersonField::Lifestyle => &mut self.person.lifestyle,
            PersonField::ManualExtension => &mut self.person.manual_extension,
        };
        *slot = value;
    }

    pub fn add_image(&mut self, image: ImageAttachment) -> Result<(), crate::idea::IdeaError> {
        self.form.add_image(image)
    }

    pub fn remove_image(&mut self, index: usize) -> Option<ImageAttachment> {
        self.form.remove_image(index)
    }

    pub fn answer_clarification(&mut self, index: usize, answer: impl Into<String>) {
        if index >= self.clarifying_questions.len() {
            return;
        }
        if self.clarification_answers.len() < self.clarifying_questions.len() {
            self.clarification_answers
                .resize(self.clarifying_questions.len(), String::new());
        }
        self.clarification_answers[index] = answer.into();
    }

    /// Non-empty clarification answers in question order.
    pub fn clarification_answers(&self) -> Vec<String> {
        self.clarification_answers
            .iter()
            .map(|a| a.trim())
            .filter(|a| !a.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Enter Processing for `task`. Rejected while a run is already in progress.
    pub fn begin_processing(&mut self, task: ProcessingTask) -> Result<ProcessingTicket, WizardError> {
        if self.screen == Screen::Processing {
            log::warn!("Rejected duplicate submission while processing");
            return Err(WizardError::AlreadyProcessing);
        }
        self.dispatch(task.entry_event())?;

        let ticket = ProcessingTicket {
            id: self.next_ticket,
            task,
        };
        self.next_ticket += 1;
        self.active = Some(ticket);
        self.failed = None;
        self.error = None;
        log::info!("Processing started: {:?}", task);
        Ok(ticket)
    }

    pub fn is_current(&self, ticket: ProcessingTicket) -> bool {
        self.active == Some(ticket)
    }

    fn accept(&mut self, ticket: ProcessingTicket) -> bool {
        if self.is_current(ticket) {
            self.active = None;
            true
        } else {
            log::info!("Discarding stale {:?} result", ticket.task);
            false
        }
    }

    /// Record a completed save and show Success. Returns false for stale tickets.
    pub fn complete_save(&mut self, ticket: ProcessingTicket, summary: SavedSummary) -> bool {
        if !self.accept(ticket) {
            return false;
        }
        self.last_saved = Some(summary);
        self.reset_form();
        self.screen = transition(self.screen, WizardEvent::Saved).unwrap_or(Screen::Success);
        true
    }

    /// Merge a voice extraction into the form and person profile.
    pub fn complete_voice(&mut self, ticket: ProcessingTicket, extraction: VoiceExtraction) -> bool {
        if !self.accept(ticket) {
            return false;
        }
        self.form.merge(&extraction.extracted_fields);
        if let Some(profile) = &extraction.extracted_profile {
            self.person.merge(profile);
        }
        if !extraction.transcript.trim().is_empty() {
            self.form.audio_transcript = Some(extraction.transcript.clone());
        }
        self.clarifying_questions = extraction.clarifying_questions;
        self.clarification_answers = vec![String::new(); self.clarifying_questions.len()];

        let event = WizardEvent::VoiceExtracted {
            has_questions: !self.clarifying_questions.is_empty(),
        };
        self.screen = transition(self.screen, event).unwrap_or(Screen::Review);
        true
    }

    /// Merge generated fields from a person profile and go to Review.
    pub fn complete_profile(&mut self, ticket: ProcessingTicket, fields: IdeaFields) -> bool {
        if !self.accept(ticket) {
            return false;
        }
        self.form.merge(&fields);
        self.screen = transition(self.screen, WizardEvent::ProfileGenerated).unwrap_or(Screen::Review);
        true
    }

    /// Show `message` while staying on Processing. `acknowledge_error` leaves.
    pub fn fail(&mut self, ticket: ProcessingTicket, message: impl Into<String>) -> bool {
        if !self.accept(ticket) {
            return false;
        }
        let message = message.into();
        log::error!("{:?} failed: {}", ticket.task, message);
        self.error = Some(message);
        self.failed = Some(ticket.task);
        true
    }

    /// Leave the error display for the failing task's return screen.
    pub fn acknowledge_error(&mut self) -> Option<Screen> {
        let task = self.failed.take()?;
        if self.screen != Screen::Processing {
            return None;
        }
        let next = transition(self.screen, WizardEvent::Failed(task))?;
        self.screen = next;
        Some(next)
    }

    /// Select a saved idea and open the edit screen.
    pub fn open_idea(&mut self, record: SavedIdeaRecord) -> Result<Screen, WizardError> {
        let next = self.dispatch(WizardEvent::EditIdea)?;
        self.selected = Some(record);
        Ok(next)
    }

    /// Replace the selected record after a successful edit-save and return to MyIdeas.
    pub fn complete_edit(&mut self, record: SavedIdeaRecord) -> Result<Screen, WizardError> {
        if self.selected.is_none() {
            return Err(WizardError::NothingSelected);
        }
        let next = self.dispatch(WizardEvent::EditSaved)?;
        self.selected = Some(record);
        Ok(next)
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    fn reset_form(&mut self) {
        self.form = IdeationForm::new();
        self.person = PersonProfile::default();
        self.clarifying_questions.clear();
        self.clarification_answers.clear();
    }
}
