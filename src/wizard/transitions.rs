//! Screens, events and the pure transition table.

use crate::idea::{IdeationForm, PersonProfile};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Screen {
    Dashboard,
    Context,
    Problem,
    Audience,
    Solution,
    Visuals,
    Constraints,
    Differentiation,
    Risks,
    NextAction,
    Review,
    Processing,
    Success,
    VoiceRecording,
    VoiceClarification,
    PersonProfile,
    PersonChallenges,
    Settings,
    MyIdeas,
    IdeaEdit,
    HarnessExport,
}

impl fmt::Display for Screen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Work done behind the Processing screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingTask {
    Save,
    Voice,
    Profile,
}

impl ProcessingTask {
    /// Screen shown after a failure once the error display delay has passed.
    pub fn return_screen(self) -> Screen {
        match self {
            ProcessingTask::Save => Screen::Review,
            ProcessingTask::Voice | ProcessingTask::Profile => Screen::Dashboard,
        }
    }

    /// Event that enters Processing for this task.
    pub fn entry_event(self) -> WizardEvent {
        match self {
            ProcessingTask::Save => WizardEvent::Submit,
            ProcessingTask::Voice => WizardEvent::StopRecording,
            ProcessingTask::Profile => WizardEvent::Synthesize,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardEvent {
    Next,
    Back,
    Home,
    Cancel,
    StartIdea,
    StartVoice,
    StartPerson,
    OpenLibrary,
    OpenSettings,
    EditIdea,
    ExportHarness,
    Submit,
    StopRecording,
    Synthesize,
    Saved,
    VoiceExtracted { has_questions: bool },
    ProfileGenerated,
    Failed(ProcessingTask),
    EditSaved,
}

/// Next screen for `event` on `screen`, or `None` when the event does not apply.
pub fn transition(screen: Screen, event: WizardEvent) -> Option<Screen> {
    use Screen::*;
    use WizardEvent as E;

    let next = match (screen, event) {
        (Dashboard, E::StartIdea) => Context,
        (Dashboard, E::StartVoice) => VoiceRecording,
        (Dashboard, E::StartPerson) => PersonProfile,
        (Dashboard | Success, E::OpenLibrary) => MyIdeas,
        (Dashboard, E::OpenSettings) => Settings,

        (Context, E::Next) => Problem,
        (Context, E::Back) => Dashboard,
        (Problem, E::Next) => Audience,
        (Problem, E::Back) => Context,
        (Audience, E::Next) => Solution,
        (Audience, E::Back) => Problem,
        (Solution, E::Next) => Visuals,
        (Solution, E::Back) => Audience,
        (Visuals, E::Next) => Constraints,
        (Visuals, E::Back) => Solution,
        (Constraints, E::Next) => Differentiation,
        (Constraints, E::Back) => Visuals,
        (Differentiation, E::Next) => Risks,
        (Differentiation, E::Back) => Constraints,
        (Risks, E::Next) => NextAction,
        (Risks, E::Back) => Differentiation,
        (NextAction, E::Next) => Review,
        (NextAction, E::Back) => Risks,
        (Review, E::Submit) => Processing,
        (Review, E::Back) => NextAction,

        (VoiceRecording, E::StopRecording) => Processing,
        (VoiceRecording, E::Back | E::Cancel) => Dashboard,
        (VoiceClarification, E::Next) => Review,
        (VoiceClarification, E::Back) => VoiceRecording,

        (PersonProfile, E::Next) => PersonChallenges,
        (PersonProfile, E::Back) => Dashboard,
        (PersonChallenges, E::Synthesize) => Processing,
        (PersonChallenges, E::Back) => PersonProfile,

        (Processing, E::Saved) => Success,
        (Processing, E::VoiceExtracted { has_questions: true }) => VoiceClarification,
        (Processing, E::VoiceExtracted { has_questions: false }) => Review,
        (Processing, E::ProfileGenerated) => Review,
        (Processing, E::Failed(task)) => task.return_screen(),
        (Processing, E::Cancel) => Dashboard,

        (MyIdeas, E::EditIdea) => IdeaEdit,
        (MyIdeas | IdeaEdit, E::ExportHarness) => HarnessExport,
        (MyIdeas, E::Back) => Dashboard,
        (IdeaEdit, E::EditSaved | E::Back | E::Cancel) => MyIdeas,
        (HarnessExport, E::Back | E::Cancel) => MyIdeas,
        (Settings, E::Back) => Dashboard,

        (s, E::Home) if s != Processing => Dashboard,

        _ => return None,
    };

    Some(next)
}

/// Field that must be non-empty before Next is enabled on a screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    ProjectName,
    ProblemStatement,
    TargetUser,
    SolutionSummary,
    PersonName,
}

impl Requirement {
    pub fn label(self) -> &'static str {
        match self {
            Requirement::ProjectName => "project name",
            Requirement::ProblemStatement => "problem statement",
            Requirement::TargetUser => "target user",
            Requirement::SolutionSummary => "solution summary",
            Requirement::PersonName => "person name",
        }
    }

    fn is_satisfied(self, form: &IdeationForm, person: &PersonProfile) -> bool {
        let value = match self {
            Requirement::ProjectName => &form.project_name,
            Requirement::ProblemStatement => &form.problem_statement,
            Requirement::TargetUser => &form.target_user,
            Requirement::SolutionSummary => &form.solution_summary,
            Requirement::PersonName => &person.name,
        };
        !value.trim().is_empty()
    }
}

pub fn required_field(screen: Screen) -> Option<Requirement> {
    match screen {
        Screen::Context => Some(Requirement::ProjectName),
        Screen::Problem => Some(Requirement::ProblemStatement),
        Screen::Audience => Some(Requirement::TargetUser),
        Screen::Solution => Some(Requirement::SolutionSummary),
        Screen::PersonProfile => Some(Requirement::PersonName),
        _ => None,
    }
}

/// Whether Next is enabled on `screen`. Depends only on that screen's required field.
pub fn can_advance(screen: Screen, form: &IdeationForm, person: &PersonProfile) -> bool {
    required_field(screen).map_or(true, |r| r.is_satisfied(form, person))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAIN_PATH: &[Screen] = &[
        Screen::Dashboard,
        Screen::Context,
        Screen::Problem,
        Screen::Audience,
        Screen::Solution,
        Screen::Visuals,
        Screen::Constraints,
        Screen::Differentiation,
        Screen::Risks,
        Screen::NextAction,
        Screen::Review,
    ];

    #[test]
    fn test_main_path_forward_and_back() {
        assert_eq!(transition(Screen::Dashboard, WizardEvent::StartIdea), Some(Screen::Context));
        for pair in MAIN_PATH[1..].windows(2) {
            assert_eq!(transition(pair[0], WizardEvent::Next), Some(pair[1]));
            assert_eq!(transition(pair[1], WizardEvent::Back), Some(pair[0]));
        }
        assert_eq!(transition(Screen::Review, WizardEvent::Submit), Some(Screen::Processing));
        assert_eq!(transition(Screen::Processing, WizardEvent::Saved), Some(Screen::Success));
    }

    #[test]
    fn test_voice_branch() {
        assert_eq!(
            transition(Screen::Processing, WizardEvent::VoiceExtracted { has_questions: true }),
            Some(Screen::VoiceClarification)
        );
        assert_eq!(
            transition(Screen::Processing, WizardEvent::VoiceExtracted { has_questions: false }),
            Some(Screen::Review)
        );
        assert_eq!(transition(Screen::VoiceClarification, WizardEvent::Next), Some(Screen::Review));
    }

    #[test]
    fn test_failure_return_screens() {
        assert_eq!(
            transition(Screen::Processing, WizardEvent::Failed(ProcessingTask::Save)),
            Some(Screen::Review)
        );
        assert_eq!(
            transition(Screen::Processing, WizardEvent::Failed(ProcessingTask::Voice)),
            Some(Screen::Dashboard)
        );
    }

    #[test]
    fn test_processing_ignores_navigation() {
        assert_eq!(transition(Screen::Processing, WizardEvent::Home), None);
        assert_eq!(transition(Screen::Processing, WizardEvent::Next), None);
        assert_eq!(transition(Screen::Processing, WizardEvent::Submit), None);
        assert_eq!(transition(Screen::Processing, WizardEvent::Cancel), Some(Screen::Dashboard));
    }

    #[test]
    fn test_submit_only_from_review() {
        assert_eq!(transition(Screen::NextAction, WizardEvent::Submit), None);
        assert_eq!(transition(Screen::Dashboard, WizardEvent::Submit), None);
    }

    #[test]
    fn test_context_guard_depends_only_on_project_name() {
        let person = PersonProfile::default();
        let mut form = IdeationForm::new();
        form.problem_statement = "X".to_string();
        form.solution_summary = "Y".to_string();
        assert!(!can_advance(Screen::Context, &form, &person));

        form.project_name = "  ".to_string();
        assert!(!can_advance(Screen::Context, &form, &person));

        let mut only_name = IdeationForm::new();
        only_name.project_name = "Acme".to_string();
        assert!(can_advance(Screen::Context, &only_name, &person));
    }

    #[test]
    fn test_unguarded_screens() {
        let form = IdeationForm::new();
        let person = PersonProfile::default();
        assert!(can_advance(Screen::Visuals, &form, &person));
        assert!(can_advance(Screen::Risks, &form, &person));
        assert!(!can_advance(Screen::PersonProfile, &form, &person));
    }
}
