//! Protoflow - AI-assisted software-lifecycle workflow in your terminal.
//!
//! Describe a project once, then review, approve or send back each
//! generated phase from user stories through deployment.

#![allow(clippy::single_match_else)]

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use protoflow::ai::{DemoGateway, GenerationGateway};
use protoflow::core::{Config, FileBackend, SessionStore};
use protoflow::workflow::{
    download_filename, NavigationPolicy, Reconciliation, SkipReason, StepCatalog, WorkflowEngine,
    ENTRY_STEP,
};

/// Project-local configuration file read by `Config::load`.
const LOCAL_CONFIG: &str = ".protoflow.toml";

/// Credential used by the offline demo provider when none is given.
const DEMO_API_KEY: &str = "demo-offline-key-0000000000";

/// AI-assisted software-lifecycle workflow
#[derive(Parser)]
#[command(name = "protoflow")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use the offline demo provider instead of the generation API
    #[arg(long, global = true)]
    demo: bool,

    /// Directory holding the workflow session
    #[arg(long, global = true, value_name = "DIR")]
    session_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a new project and generate its first step
    Start {
        /// Project description
        prompt: String,

        /// Generation API key
        #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
    },

    /// Show workflow progress
    Status,

    /// Print the content of a step (defaults to the current step)
    Show {
        /// Step id
        step: Option<String>,
    },

    /// Generate content for the current step if it needs it
    Generate,

    /// Approve the current step and move to the next one
    Approve,

    /// Send a step back for regeneration with feedback
    Feedback {
        /// What should change
        text: String,

        /// Step id (defaults to the current step)
        #[arg(short, long)]
        step: Option<String>,
    },

    /// Go to a step
    Goto {
        /// Step id
        step: String,
    },

    /// Replace the content of an editable step with a file
    Edit {
        /// File with the new content
        file: PathBuf,

        /// Step id (defaults to the first editable step)
        #[arg(short, long)]
        step: Option<String>,
    },

    /// Export the workflow (or one step) to a file
    Export {
        /// Export only this step
        #[arg(short, long)]
        step: Option<String>,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    /// Discard the session and start over
    Reset,

    /// List the workflow steps
    Steps,

    /// Show configuration
    Config {
        /// Show config file path
        #[arg(long)]
        path: bool,

        /// Write the default configuration to ./.protoflow.toml
        #[arg(long, conflicts_with = "path")]
        init: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose { EnvFilter::new("debug") } else { EnvFilter::new("warn") };

    tracing_subscriber::registry().with(fmt::layer().with_target(false)).with(filter).init();

    // Commands that do not need a session
    match &cli.command {
        Commands::Steps => return cmd_steps(),
        Commands::Config { path, init } => return cmd_config(*path, *init),
        Commands::Completions { shell } => {
            cmd_completions(*shell);
            return Ok(());
        }
        _ => {}
    }

    let config = Config::load()?;
    let engine = open_engine(&cli, &config)?;

    match cli.command {
        Commands::Start { prompt, api_key } => cmd_start(&engine, &prompt, api_key, cli.demo)?,
        Commands::Status => cmd_status(&engine),
        Commands::Show { step } => cmd_show(&engine, step.as_deref())?,
        Commands::Generate => cmd_generate(&engine)?,
        Commands::Approve => cmd_approve(&engine)?,
        Commands::Feedback { text, step } => cmd_feedback(&engine, &text, step.as_deref())?,
        Commands::Goto { step } => cmd_goto(&engine, &step)?,
        Commands::Edit { file, step } => cmd_edit(&engine, &file, step.as_deref())?,
        Commands::Export { step, output } => cmd_export(&engine, step.as_deref(), &output)?,
        Commands::Reset => cmd_reset(&engine),
        Commands::Steps | Commands::Config { .. } | Commands::Completions { .. } => {}
    }

    Ok(())
}

/// Build the engine from configuration and command-line overrides.
fn open_engine(cli: &Cli, config: &Config) -> Result<WorkflowEngine> {
    let store = match &cli.session_dir {
        Some(dir) => {
            SessionStore::new(FileBackend::new(dir)).with_prefix(config.storage.key_prefix.clone())
        }
        None => config.storage.open(),
    };
    if !store.is_available() {
        eprintln!("⚠️ Session storage is unavailable; progress will not be saved.");
    }

    let gateway: Arc<dyn GenerationGateway> =
        if cli.demo { Arc::new(DemoGateway::new()) } else { provider_gateway(config)? };

    Ok(WorkflowEngine::new(StepCatalog::sdlc(), store, gateway).with_validation(config.validation))
}

#[cfg(feature = "gemini")]
fn provider_gateway(config: &Config) -> Result<Arc<dyn GenerationGateway>> {
    use protoflow::ai::GeminiGateway;

    match config.ai.provider.as_str() {
        "gemini" => Ok(Arc::new(GeminiGateway::from_config(&config.ai)?)),
        "demo" => Ok(Arc::new(DemoGateway::new())),
        other => anyhow::bail!("Unknown AI provider: {other}. Supported: gemini, demo"),
    }
}

#[cfg(not(feature = "gemini"))]
fn provider_gateway(config: &Config) -> Result<Arc<dyn GenerationGateway>> {
    match config.ai.provider.as_str() {
        "demo" => Ok(Arc::new(DemoGateway::new())),
        other => anyhow::bail!("AI provider '{other}' is not compiled in. Use --demo or enable the gemini feature"),
    }
}

/// Run one reconciliation pass and report what happened.
fn reconcile(engine: &WorkflowEngine) -> Result<Reconciliation> {
    let rt = tokio::runtime::Runtime::new()?;
    let step = engine.current_step_id();
    if engine.catalog().real_step(&step).is_some() && !engine.state().has_content(&step) {
        println!("Generating {}...\n", engine.catalog().label(&step));
    }

    let outcome = rt.block_on(engine.maybe_generate());
    print_notifications(engine);

    if let Some(step_id) = outcome.step_id().filter(|_| outcome.stored_content()) {
        print_step(engine, step_id);
    }

    match &outcome {
        Reconciliation::EmptyResponse { step_id } => {
            println!(
                "The provider returned no content for {}. Run `protoflow generate` to try again.",
                engine.catalog().label(step_id)
            );
        }
        Reconciliation::Failed { .. } => {
            println!("Run `protoflow generate` to try again.");
        }
        Reconciliation::Discarded { step_id } => {
            println!("Dropped an outdated response for {}.", engine.catalog().label(step_id));
        }
        Reconciliation::Generated { .. } | Reconciliation::Placeholder { .. } | Reconciliation::Idle(_) => {}
    }

    Ok(outcome)
}

fn print_notifications(engine: &WorkflowEngine) {
    for notification in engine.drain_notifications() {
        println!("{notification}");
    }
}

fn print_step(engine: &WorkflowEngine, step_id: &str) {
    let state = engine.state();
    let label = engine.catalog().label(step_id);
    match state.content(step_id) {
        Some(content) => {
            println!("── {label} ──\n");
            println!("{content}");
        }
        None => println!("No content generated yet for {label}."),
    }
}

/// Start a new project.
fn cmd_start(engine: &WorkflowEngine, prompt: &str, api_key: Option<String>, demo: bool) -> Result<()> {
    let api_key = match api_key {
        Some(key) => key,
        None if demo => DEMO_API_KEY.to_string(),
        None => anyhow::bail!("An API key is required. Pass --api-key or set GEMINI_API_KEY."),
    };

    engine.start(&api_key, prompt)?;
    println!("Project started with {} ({} steps).\n", engine.gateway_name(), engine.catalog().len());
    reconcile(engine)?;
    Ok(())
}

/// Show workflow progress.
fn cmd_status(engine: &WorkflowEngine) {
    let state = engine.state();
    let policy = NavigationPolicy::new(engine.catalog(), &state);

    if state.project_prompt.is_empty() {
        println!("No project started. Run `protoflow start <PROMPT>`.");
    } else {
        println!("Project: {}", state.project_prompt);
    }
    println!("Current: {}\n", engine.catalog().label(&state.current_step_id));

    for view in policy.views() {
        let marker = if view.current { "▶" } else { " " };
        println!("{marker} {} {:<16} {:<18} {}", view.status.icon(), view.id, view.label, view.status.description());
    }

    let progress = policy.progress();
    println!("\nProgress: {}/{} approved ({}%)", progress.approved, progress.total, progress.percent());
}

/// Print a step's content.
fn cmd_show(engine: &WorkflowEngine, step: Option<&str>) -> Result<()> {
    let step = step.map_or_else(|| engine.current_step_id(), str::to_string);
    if engine.catalog().real_step(&step).is_none() {
        anyhow::bail!("No content for '{step}'. Run `protoflow steps` to list step ids.");
    }
    print_step(engine, &step);
    Ok(())
}

/// Generate content for the current step.
fn cmd_generate(engine: &WorkflowEngine) -> Result<()> {
    match reconcile(engine)? {
        Reconciliation::Idle(SkipReason::UpToDate) => {
            println!("{} already has content. Use `protoflow feedback` to regenerate it.", current_label(engine));
        }
        Reconciliation::Idle(SkipReason::Sentinel) => {
            println!("Nothing to generate at {}.", current_label(engine));
        }
        Reconciliation::Idle(SkipReason::NotConfigured) => {
            println!("No project started. Run `protoflow start <PROMPT>`.");
        }
        Reconciliation::Idle(SkipReason::InFlight) => {
            println!("A generation is already in progress.");
        }
        _ => {}
    }
    Ok(())
}

/// Approve the current step.
fn cmd_approve(engine: &WorkflowEngine) -> Result<()> {
    let current = engine.current_step_id();
    engine.approve(&current)?;
    print_notifications(engine);

    let next = engine.current_step_id();
    if engine.catalog().real_step(&next).is_some() {
        println!("Next: {}\n", engine.catalog().label(&next));
        reconcile(engine)?;
    } else {
        println!("🎉 All steps approved. Run `protoflow export` to save the results.");
    }
    Ok(())
}

/// Send a step back with feedback.
fn cmd_feedback(engine: &WorkflowEngine, text: &str, step: Option<&str>) -> Result<()> {
    let step = step.map_or_else(|| engine.current_step_id(), str::to_string);
    engine.submit_feedback(&step, text)?;
    print_notifications(engine);

    if step == engine.current_step_id() {
        reconcile(engine)?;
    } else {
        println!("{} will be regenerated when you go back to it.", engine.catalog().label(&step));
    }
    Ok(())
}

/// Navigate to a step.
fn cmd_goto(engine: &WorkflowEngine, step: &str) -> Result<()> {
    if let Err(e) = engine.navigate(step) {
        // The warning notification repeats the error
        engine.drain_notifications();
        return Err(e.into());
    }
    print_notifications(engine);

    if step != ENTRY_STEP {
        if reconcile(engine)? == Reconciliation::Idle(SkipReason::UpToDate) {
            print_step(engine, step);
        }
    }
    Ok(())
}

/// Replace an editable step's content.
fn cmd_edit(engine: &WorkflowEngine, file: &Path, step: Option<&str>) -> Result<()> {
    let step = match step {
        Some(step) => step.to_string(),
        None => engine
            .catalog()
            .steps()
            .iter()
            .find(|s| s.editable)
            .map(|s| s.id.clone())
            .context("No editable step in this workflow")?,
    };

    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    engine.update_step_content(&step, &content)?;

    if content.trim().is_empty() {
        println!("Cleared the content of {}.", engine.catalog().label(&step));
    } else {
        println!("Updated {} from {}.", engine.catalog().label(&step), file.display());
    }
    Ok(())
}

/// Export the workflow or one step.
fn cmd_export(engine: &WorkflowEngine, step: Option<&str>, output: &Path) -> Result<()> {
    let now = chrono::Utc::now();
    std::fs::create_dir_all(output)?;

    let (path, content) = match step {
        Some(step) => {
            let doc = engine
                .step_document(step, now)
                .with_context(|| format!("No content to export for '{step}'"))?;
            (output.join(doc.file_name), doc.content)
        }
        None => {
            let state = engine.state();
            if !NavigationPolicy::new(engine.catalog(), &state).can_export() {
                anyhow::bail!("Nothing to export yet. Run `protoflow start <PROMPT>` first.");
            }
            let snapshot = engine.snapshot(now);
            let name = format!("{}.json", download_filename("sdlc_workflow", &state.project_prompt, now));
            (output.join(name), snapshot.to_json_pretty()?)
        }
    };

    std::fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Exported to {}", path.display());
    Ok(())
}

/// Discard the session.
fn cmd_reset(engine: &WorkflowEngine) {
    engine.reset();
    println!("Workflow reset. Run `protoflow start <PROMPT>` to begin a new project.");
}

/// List the workflow steps.
fn cmd_steps() -> Result<()> {
    let catalog = StepCatalog::sdlc();
    for step in catalog.steps() {
        let mut notes = Vec::new();
        if let Some(from) = step.source.as_ref().and_then(|s| s.depends_on()) {
            notes.push(format!("from {from}"));
        }
        if step.editable {
            notes.push("editable".to_string());
        }
        println!(
            "{}. {:<16} {:<18} .{} {}",
            step.ordinal,
            step.id,
            step.label,
            step.format.extension(),
            notes.join(", ")
        );
    }
    println!("\nTotal: {} steps", catalog.len());
    Ok(())
}

/// Show configuration.
fn cmd_config(show_path: bool, init: bool) -> Result<()> {
    if init {
        let path = Path::new(LOCAL_CONFIG);
        if path.exists() {
            anyhow::bail!("{LOCAL_CONFIG} already exists");
        }
        Config::default().save_to_file(path)?;
        println!("Wrote {LOCAL_CONFIG}");
        return Ok(());
    }

    if show_path {
        if let Some(path) = Config::config_dir() {
            println!("{}", path.display());
        }
        return Ok(());
    }

    let config = Config::load()?;
    let toml = toml::to_string_pretty(&config)?;
    println!("{toml}");

    Ok(())
}

/// Generate shell completions.
fn cmd_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "protoflow", &mut io::stdout());
}

fn current_label(engine: &WorkflowEngine) -> String {
    engine.catalog().label(&engine.current_step_id()).to_string()
}
