//! Ideation wizard back end.
//!
//! A guided flow collects a startup idea, normalizes it through an ordered
//! chain of LLM providers and stores it as a one-row CSV in Google Drive.

pub mod csv_codec;
pub mod drive;
pub mod export;
pub mod flow;
pub mod harness;
pub mod idea;
pub mod library;
pub mod llm;
pub mod session;
pub mod settings;
pub mod voice;
pub mod wizard;

pub use flow::{FlowError, IdeationService, SaveOutcome};
pub use idea::{IdeationForm, NormalizedIdea, SavedIdeaRecord};
pub use session::{Session, UserIdentity};
pub use settings::Settings;
pub use wizard::{Screen, Wizard, WizardEvent};

/// Initialize `env_logger` with an `info` default, overridable via `RUST_LOG`.
///
/// Safe to call more than once.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}
