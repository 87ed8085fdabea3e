use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tokio::sync::Mutex;

use ideation_wizard_lib::drive::{DriveClient, DriveStore};
use ideation_wizard_lib::export::{export_csv, ExportError};
use ideation_wizard_lib::flow::{FlowError, IdeationService};
use ideation_wizard_lib::harness::{self, HarnessError, HarnessInput, ProjectType, TechStack};
use ideation_wizard_lib::idea::{IdeaError, ImageAttachment, SavedIdeaRecord};
use ideation_wizard_lib::library::IdeaLibrary;
use ideation_wizard_lib::llm::{
    default_llm_model_for_provider, default_transcription_model_for_provider, LlmGateway,
};
use ideation_wizard_lib::session::{InstructionMode, Session, UserIdentity};
use ideation_wizard_lib::settings::{Settings, SettingsError};
use ideation_wizard_lib::voice::{self, AudioClip, VoiceError, VoiceRecorder};
use ideation_wizard_lib::wizard::{FormField, Screen, Wizard, WizardError, WizardEvent};

#[derive(Parser, Debug)]
#[command(
    name = "ideation-wizard",
    version,
    about = "Capture startup ideas, normalize them with LLMs and store them in Google Drive"
)]
struct Cli {
    /// Settings file (JSON)
    #[arg(long, global = true, default_value = "settings.json")]
    settings: PathBuf,

    /// Identity the ideas belong to
    #[arg(long, global = true, env = "IDEATION_EMAIL")]
    email: Option<String>,

    /// Google Drive OAuth access token; offline when absent
    #[arg(long, global = true, env = "DRIVE_ACCESS_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Instruction preset (normal, yolo, mvp, strategic)
    #[arg(long, global = true, default_value = "normal")]
    preset: String,

    /// Free-form instruction used instead of the preset
    #[arg(long, global = true)]
    custom_instruction: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the wizard non-interactively and save one idea
    Submit(SubmitArgs),
    /// List saved ideas
    List,
    /// Download a saved idea as a local CSV file
    Export(ExportArgs),
    /// Generate a harness build spec for a saved idea
    Harness(HarnessArgs),
    /// Show provider and storage configuration
    Status,
}

#[derive(Args, Debug)]
struct SubmitArgs {
    #[arg(long, default_value = "")]
    project_name: String,
    #[arg(long, default_value = "")]
    problem: String,
    #[arg(long, default_value = "")]
    target_user: String,
    #[arg(long, default_value = "")]
    solution: String,
    #[arg(long, default_value = "")]
    constraints: String,
    #[arg(long, default_value = "")]
    differentiation: String,
    #[arg(long, default_value = "")]
    risks: String,
    #[arg(long, default_value = "")]
    next_action: String,
    #[arg(long, default_value = "")]
    tags: String,

    /// Image to attach (up to 5)
    #[arg(long = "image")]
    images: Vec<PathBuf>,

    /// Voice note to extract fields from before the typed fields are applied
    #[arg(long, conflicts_with = "record")]
    audio: Option<PathBuf>,

    /// Record a voice note from the microphone for this many seconds
    #[arg(long)]
    record: Option<u64>,

    /// Answer to a clarifying question, in question order
    #[arg(long = "answer")]
    answers: Vec<String>,

    /// Also write the saved idea as CSV into this directory
    #[arg(long)]
    export_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ExportArgs {
    /// Drive file id; newest idea when omitted
    #[arg(long)]
    file_id: Option<String>,
    #[arg(long, default_value = ".")]
    out: PathBuf,
}

#[derive(Args, Debug)]
struct HarnessArgs {
    /// Drive file id; newest idea when omitted
    #[arg(long)]
    file_id: Option<String>,
    /// SaaS, Tool, API, Mobile App, CLI or Library
    #[arg(long = "type", default_value = "SaaS")]
    project_type: String,
    /// Main feature (at least 3)
    #[arg(long = "feature")]
    features: Vec<String>,
    #[arg(long, default_value = "")]
    backend: String,
    #[arg(long, default_value = "")]
    database: String,
    #[arg(long, default_value = "")]
    frontend: String,
    #[arg(long, default_value = "")]
    auth: String,
    #[arg(long, default_value = "")]
    hosting: String,
    /// Render the template without LLM feature expansion
    #[arg(long)]
    basic: bool,
    /// Store project type, tech stack and features on the idea
    #[arg(long)]
    persist: bool,
    #[arg(long, default_value = ".")]
    out: PathBuf,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Flow(#[from] FlowError),

    #[error(transparent)]
    Wizard(#[from] WizardError),

    #[error(transparent)]
    Voice(#[from] VoiceError),

    #[error(transparent)]
    Idea(#[from] IdeaError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error(transparent)]
    Harness(#[from] HarnessError),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Usage(String),
}

impl CliError {
    fn user_message(&self) -> String {
        match self {
            CliError::Flow(e) => e.user_message(),
            other => other.to_string(),
        }
    }
}

struct App {
    settings: Settings,
    service: IdeationService,
    library: IdeaLibrary,
}

impl App {
    fn new(settings: Settings, token: Option<String>) -> Self {
        let gateway = Arc::new(LlmGateway::from_config(
            &settings.llm_config(),
            settings.gateway_timeouts(),
        ));
        let store = token
            .filter(|t| !t.trim().is_empty())
            .map(|t| Arc::new(DriveClient::new(t)) as Arc<dyn DriveStore>);
        let service = IdeationService::new(gateway, store, settings.drive.folders.clone())
            .with_settings(settings.flow_settings());
        let library = match &settings.data_dir {
            Some(dir) => IdeaLibrary::with_cache_dir(dir, settings.drive.library_limit),
            None => IdeaLibrary::new(settings.drive.library_limit),
        };
        Self {
            settings,
            service,
            library,
        }
    }

    fn session(&self, cli: &Cli) -> Result<Session, CliError> {
        let email = cli
            .email
            .clone()
            .ok_or_else(|| CliError::Usage("--email (or IDEATION_EMAIL) is required".to_string()))?;
        let identity = self.settings.find_user(&email).cloned().unwrap_or_else(|| {
            log::warn!("{} is not a configured user; using an empty base instruction", email);
            UserIdentity {
                name: email.clone(),
                email,
                base_instruction: String::new(),
            }
        });

        let mode = match &cli.custom_instruction {
            Some(text) => InstructionMode::Custom(text.clone()),
            None => InstructionMode::Preset(cli.preset.clone()),
        };
        let mut session = Session::new(identity).with_instruction_mode(mode);
        if let Some(token) = &cli.token {
            session = session.with_access_token(token.clone());
        }
        Ok(session)
    }

    async fn pick_record(
        &self,
        session: &Session,
        file_id: Option<&str>,
    ) -> Result<SavedIdeaRecord, CliError> {
        let records = self.service.load_library(&self.library, session).await?;
        let found = match file_id {
            Some(id) => records.into_iter().find(|r| r.file_id == id),
            None => records.into_iter().next(),
        };
        found.ok_or_else(|| CliError::Usage("No matching saved idea".to_string()))
    }
}

fn image_mime_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "image/jpeg",
    }
}

fn read_image(path: &Path) -> Result<ImageAttachment, CliError> {
    let bytes = std::fs::read(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(ImageAttachment::new(bytes, image_mime_type(path)))
}

async fn record_clip(seconds: u64) -> Result<AudioClip, CliError> {
    let mut recorder = VoiceRecorder::new(voice::default_source()?);
    recorder.start()?;
    println!("Recording for {}s...", seconds);
    tokio::time::sleep(Duration::from_secs(seconds)).await;
    recorder
        .stop()
        .ok_or_else(|| CliError::Usage("Recording was not active".to_string()))
}

fn apply_typed_fields(wizard: &mut Wizard, args: &SubmitArgs) {
    let fields = [
        (FormField::ProjectName, &args.project_name),
        (FormField::ProblemStatement, &args.problem),
        (FormField::TargetUser, &args.target_user),
        (FormField::SolutionSummary, &args.solution),
        (FormField::Constraints, &args.constraints),
        (FormField::Differentiation, &args.differentiation),
        (FormField::Risks, &args.risks),
        (FormField::NextAction, &args.next_action),
        (FormField::Tags, &args.tags),
    ];
    for (field, value) in fields {
        if !value.trim().is_empty() {
            wizard.set_field(field, value.trim());
        }
    }
}

async fn submit(app: &App, cli: &Cli, args: &SubmitArgs) -> Result<(), CliError> {
    let session = app.session(cli)?;
    let wizard = Mutex::new(Wizard::new());

    let clip = match (&args.audio, args.record) {
        (Some(path), _) => Some(AudioClip::from_file(path)?),
        (None, Some(seconds)) => Some(record_clip(seconds).await?),
        (None, None) => None,
    };

    if let Some(clip) = clip {
        wizard.lock().await.dispatch(WizardEvent::StartVoice)?;
        let served = app.service.process_voice(&wizard, clip, &session).await?;
        println!("Transcript ({}): {}", served.provider, served.value.transcript);
        for (i, question) in served.value.clarifying_questions.iter().enumerate() {
            println!("Question {}: {}", i + 1, question);
        }
    } else {
        wizard.lock().await.dispatch(WizardEvent::StartIdea)?;
    }

    {
        let mut w = wizard.lock().await;
        apply_typed_fields(&mut w, args);
        for path in &args.images {
            w.add_image(read_image(path)?)?;
        }
        for (i, answer) in args.answers.iter().enumerate() {
            w.answer_clarification(i, answer.as_str());
        }
        while w.screen() != Screen::Review {
            w.dispatch(WizardEvent::Next)?;
        }
    }

    let outcome = app.service.submit(&wizard, &session).await?;

    match outcome.provider {
        Some(provider) => println!("Normalized by {}", provider),
        None => println!("All providers failed; saved raw form data"),
    }
    for failure in &outcome.provider_failures {
        println!("  {}", failure);
    }
    for index in &outcome.failed_uploads {
        println!("Image {} failed to upload", index + 1);
    }
    match &outcome.file {
        Some(file) => println!("Saved {} ({})", file.name, file.view_url()),
        None => println!("Offline: nothing written to Drive"),
    }
    if let Some(folder) = &outcome.folder {
        if folder.shared_fallback {
            println!("Warning: {} has no folder mapping; saved to the shared folder", session.email());
        }
    }

    if let Some(dir) = &args.export_dir {
        let path = export_csv(&outcome.idea, dir)?;
        println!("Exported {}", path.display());
    }
    Ok(())
}

async fn list(app: &App, cli: &Cli) -> Result<(), CliError> {
    let session = app.session(cli)?;
    let records = app.service.load_library(&app.library, &session).await?;
    if records.is_empty() {
        println!("No saved ideas");
    }
    for r in records {
        let created = r
            .created_time
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}  {}  {} [{} {}] {}",
            created, r.file_id, r.data.project_name, r.data.priority, r.data.version, r.data.status
        );
    }
    Ok(())
}

async fn export(app: &App, cli: &Cli, args: &ExportArgs) -> Result<(), CliError> {
    let session = app.session(cli)?;
    let record = app.pick_record(&session, args.file_id.as_deref()).await?;
    let path = export_csv(&record.data, &args.out)?;
    println!("Exported {}", path.display());
    Ok(())
}

async fn harness_export(app: &App, cli: &Cli, args: &HarnessArgs) -> Result<(), CliError> {
    let session = app.session(cli)?;
    let record = app.pick_record(&session, args.file_id.as_deref()).await?;

    let input = HarnessInput::from_idea(
        &record.data,
        TechStack {
            backend: args.backend.clone(),
            database: args.database.clone(),
            frontend: args.frontend.clone(),
            auth: args.auth.clone(),
            hosting: args.hosting.clone(),
            payments: None,
            email: None,
        },
        args.features.clone(),
        args.project_type.parse::<ProjectType>()?,
    );

    let spec = if args.basic {
        harness::generate_basic(&input)?
    } else {
        harness::generate(app.service.gateway(), &input).await?
    };
    let path = harness::write_spec(&spec, &input.project_name, &args.out)?;
    println!(
        "Wrote {} ({} features, ~{} turns, {})",
        path.display(),
        spec.stats.total_features,
        spec.stats.estimated_turns,
        spec.stats.estimated_cost
    );

    if args.persist {
        let tagged = harness::with_harness_metadata(&record.data, &input)?;
        let store_record = app
            .library
            .update(app_store(app)?, session.email(), &record, &tagged)
            .await
            .map_err(FlowError::from)?;
        println!("Stored harness metadata ({})", store_record.data.version);
    }
    Ok(())
}

fn app_store(app: &App) -> Result<&dyn DriveStore, CliError> {
    app.service.store().map_err(CliError::from)
}

fn status(app: &App, cli: &Cli) {
    let providers = app.service.gateway().status();
    println!("LLM providers: {} ({})", providers.summary(), app.settings.llm.provider_order.join(" > "));
    for p in app.service.gateway().providers() {
        let state = if p.is_configured() { "configured" } else { "no API key" };
        let stt = default_transcription_model_for_provider(p.name()).unwrap_or("inline audio");
        let model = if default_llm_model_for_provider(p.name()) == Some(p.model()) {
            p.model().to_string()
        } else {
            format!("{} (override)", p.model())
        };
        println!("  {} [{}, {}]: {}", p.name(), model, stt, state);
    }
    if app.service.is_offline() {
        println!("Drive: offline (no access token)");
    } else {
        println!("Drive: online");
    }
    if let Some(email) = &cli.email {
        let folder = app.settings.drive.folders.resolve(email);
        println!(
            "Folder for {}: {}{}",
            email,
            folder.folder_id,
            if folder.shared_fallback { " (shared default)" } else { "" }
        );
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let mut settings = Settings::load(&cli.settings)?;
    settings.apply_env_overrides();
    let app = App::new(settings, cli.token.clone());

    match &cli.command {
        Command::Submit(args) => submit(&app, &cli, args).await,
        Command::List => list(&app, &cli).await,
        Command::Export(args) => export(&app, &cli, args).await,
        Command::Harness(args) => harness_export(&app, &cli, args).await,
        Command::Status => {
            status(&app, &cli);
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    ideation_wizard_lib::init_logging();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("Error: {}", e.user_message());
            ExitCode::FAILURE
        }
    }
}
