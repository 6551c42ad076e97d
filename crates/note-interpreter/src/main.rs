//! Interpret a CSV of notes with an LLM, asking the user for clarification.
//!
//! Reads the API key from `OPENAI_API_KEY` or `ANTHROPIC_API_KEY`, depending
//! on the configured provider.
//!
//! # Examples
//!
//! ```sh
//! # Interpret notes, answering questions on the terminal
//! note-interpreter run --notes notes.csv --memory memory.md --output results.csv
//!
//! # Same, with Anthropic and the new memory points appended
//! note-interpreter run --notes notes.csv --memory memory.md \
//!   --provider anthropic --append-memory
//!
//! # Print the system prompt the first round would send
//! note-interpreter prompt --notes notes.csv --memory memory.md
//!
//! # Free-form chat with the note tools bound
//! note-interpreter chat --system "You help organize notes."
//! ```

use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;

use note_interpreter::agent::{
    AgentCore, AnswerMode, CompositeEventHandler, ConsoleHandler, LoggingHandler, StdinInput,
};
use note_interpreter::config::{Settings, build_client};
use note_interpreter::io::{
    append_memory_points, read_notes_csv, read_user_memory, write_results_csv,
};
use note_interpreter::logging::init_logging;
use note_interpreter::model::{LlmOutput, Note, apply_entries};
use note_interpreter::prompt::{PromptInputs, SystemPromptBuilder};
use note_interpreter::tools::{ExportMeta, SharedContext, note_tools};
use note_interpreter::ui::{self, Banner};

/// LLM note interpretation with bounded clarification.
#[derive(Parser)]
#[command(name = "note-interpreter", version)]
struct Cli {
    /// Settings file (YAML). Defaults to ./note-interpreter.yaml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Also write a log file under the configured log directory
    #[arg(long, global = true)]
    log_to_file: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Interpret notes, asking clarification questions on the terminal
    Run(RunArgs),
    /// Print the system prompt for the first round and exit
    Prompt(PromptArgs),
    /// Chat with the model, note tools bound
    Chat(ChatArgs),
}

#[derive(clap::Args)]
struct RunArgs {
    /// CSV file with one note per row
    #[arg(long)]
    notes: PathBuf,

    /// Markdown memory file (`* ` bullets)
    #[arg(long)]
    memory: Option<PathBuf>,

    /// YAML prompt layout
    #[arg(long)]
    prompt_config: Option<PathBuf>,

    // ── Model selection ────────────────────────────────────────
    /// openai or anthropic
    #[arg(long)]
    provider: Option<String>,

    #[arg(long)]
    model: Option<String>,

    /// Maximum clarification rounds
    #[arg(long)]
    max_rounds: Option<u32>,

    /// Ask each clarification question separately
    #[arg(long)]
    per_question: bool,

    /// Print the system prompt every round
    #[arg(long)]
    show_prompt: bool,

    // ── Output ─────────────────────────────────────────────────
    /// Write interpreted notes as CSV
    #[arg(long)]
    output: Option<PathBuf>,

    /// Append new memory points to the memory file
    #[arg(long, requires = "memory")]
    append_memory: bool,

    /// Export the run as a shared-context YAML into this directory
    #[arg(long)]
    export_context: Option<PathBuf>,

    /// Print the result as JSON instead of a summary
    #[arg(long)]
    json: bool,
}

#[derive(clap::Args)]
struct PromptArgs {
    #[arg(long)]
    notes: PathBuf,

    #[arg(long)]
    memory: Option<PathBuf>,

    #[arg(long)]
    prompt_config: Option<PathBuf>,
}

#[derive(clap::Args)]
struct ChatArgs {
    /// System prompt for the session
    #[arg(long, default_value = "You are a helpful assistant for organizing personal notes.")]
    system: String,

    #[arg(long)]
    provider: Option<String>,

    #[arg(long)]
    model: Option<String>,
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(level) = &cli.log_level {
        settings.logging.level = level.clone();
    }
    settings.logging.log_to_file |= cli.log_to_file;
    Ok(settings)
}

fn apply_llm_overrides(settings: &mut Settings, provider: &Option<String>, model: &Option<String>) {
    if let Some(provider) = provider {
        settings.llm.provider = provider.clone();
        // A model id belongs to one vendor; drop it unless given again.
        settings.llm.model = None;
    }
    if let Some(model) = model {
        settings.llm.model = Some(model.clone());
    }
}

fn load_memory(path: Option<&Path>) -> Result<Vec<String>> {
    match path {
        Some(path) if path.exists() => Ok(read_user_memory(path)?),
        Some(path) => {
            tracing::warn!("Memory file {} not found; starting empty", path.display());
            Ok(Vec::new())
        }
        None => Ok(Vec::new()),
    }
}

async fn run(cli: &Cli, args: &RunArgs) -> Result<()> {
    let mut settings = load_settings(cli)?;
    apply_llm_overrides(&mut settings, &args.provider, &args.model);
    if let Some(rounds) = args.max_rounds {
        settings.max_clarification_rounds = rounds;
    }
    if let Some(path) = &args.prompt_config {
        settings.prompt_config = path.clone();
    }
    if args.per_question {
        settings.answer_mode = AnswerMode::PerQuestion;
    }
    settings.validate()?;
    let _guard = init_logging(&settings.logging)?;

    let notes = read_notes_csv(&args.notes)
        .with_context(|| format!("reading notes from {}", args.notes.display()))?;
    let memory = load_memory(args.memory.as_deref())?;
    tracing::info!("Loaded {} note(s), {} memory point(s)", notes.len(), memory.len());

    let client = build_client(&settings.llm)?;
    let model = client.model().to_string();
    let events = CompositeEventHandler::new()
        .with(LoggingHandler)
        .with(ConsoleHandler::new().with_prompt(args.show_prompt));
    let agent = settings
        .clarification_loop(client)?
        .with_input(Box::new(StdinInput))
        .with_event_handler(events);

    let output = agent.run(&notes, &memory).await?;
    report(&output, args.json)?;

    if let Some(path) = &args.output {
        let mut rows: Vec<Note> = notes.iter().map(Note::new).collect();
        apply_entries(&mut rows, &output.entries);
        write_results_csv(path, &rows)?;
        tracing::info!("Results written to {}", path.display());
    }
    if args.append_memory
        && let Some(path) = &args.memory
    {
        append_memory_points(path, &output.new_memory_points)?;
        tracing::info!(
            "Appended {} memory point(s) to {}",
            output.new_memory_points.len(),
            path.display()
        );
    }
    if let Some(dir) = &args.export_context {
        let mut context = SharedContext::new();
        context.insert("notes", json!(notes));
        context.insert("memory", json!(memory));
        context.insert("llm_output", serde_json::to_value(&output)?);
        let meta = ExportMeta {
            prompt_name: file_stem(&settings.prompt_config),
            use_case: file_stem(&args.notes),
            model,
            description: format!("{:?} after {} round(s)", output.status, output.rounds_used),
            saved_at: String::new(),
        };
        context.export(dir, meta)?;
    }
    Ok(())
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn report(output: &LlmOutput, as_json: bool) -> Result<()> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(output)?);
        return Ok(());
    }
    let mut lines = Vec::new();
    for entry in &output.entries {
        lines.push(format!(
            "- {} -> {} [{} / {}] clarity {}",
            entry.raw_text,
            entry.interpreted_text,
            entry.entity_type,
            entry.intent,
            entry.clarity_score
        ));
    }
    if !output.new_memory_points.is_empty() {
        lines.push(String::new());
        lines.push("New memory points:".into());
        lines.extend(output.new_memory_points.iter().cloned());
    }
    let kind = if output.is_fallback() {
        Banner::Fallback
    } else {
        Banner::FinalOutput
    };
    ui::print_banner(kind, &lines.join("\n"));
    Ok(())
}

fn print_prompt(cli: &Cli, args: &PromptArgs) -> Result<()> {
    let mut settings = load_settings(cli)?;
    if let Some(path) = &args.prompt_config {
        settings.prompt_config = path.clone();
    }
    let _guard = init_logging(&settings.logging)?;

    let notes = read_notes_csv(&args.notes)?;
    let memory = load_memory(args.memory.as_deref())?;
    let mut inputs = PromptInputs::new(&memory, &notes);
    if let Some(path) = &settings.classification_file {
        inputs.classification_config = Some(note_interpreter::io::read_yaml(path)?);
    }
    if let Some(path) = &settings.schema_file {
        inputs.schema = Some(note_interpreter::io::read_yaml(path)?);
    }
    if let Some(path) = &settings.parameters_file {
        inputs.parameters = Some(note_interpreter::io::read_yaml(path)?);
    }
    let prompt = SystemPromptBuilder::new(&settings.prompt_config).build(&inputs)?;
    println!("{prompt}");
    Ok(())
}

async fn chat(cli: &Cli, args: &ChatArgs) -> Result<()> {
    let mut settings = load_settings(cli)?;
    apply_llm_overrides(&mut settings, &args.provider, &args.model);
    settings.validate()?;
    let _guard = init_logging(&settings.logging)?;

    let client = build_client(&settings.llm)?;
    let mut agent = AgentCore::new(client, note_tools(), args.system.clone())?
        .with_llm_params(settings.llm.max_tokens, settings.llm.temperature)
        .map_llm(|llm| llm.with_retry(settings.llm.retry()));
    ui::user_print("Type 'exit' or 'quit' to leave.");
    agent.run_interactive(&StdinInput, &ConsoleHandler::new()).await;
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match &cli.command {
        Command::Run(args) => run(&cli, args).await,
        Command::Prompt(args) => print_prompt(&cli, args),
        Command::Chat(args) => chat(&cli, args).await,
    };
    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
