//! Prompt experiments from the command line.
//!
//! # Examples
//!
//! ```sh
//! # Compare a saved output with the expected one
//! prompt-lab validate --output out.json --expected expected.json --strict
//!
//! # Run a bundle with the deterministic dummy model, then for real
//! prompt-lab run-bundle bundles/milk.yaml
//! prompt-lab run-bundle bundles/milk.yaml --live
//!
//! # Show a plan, or one step of it
//! prompt-lab plan plans/clarifier.yaml --step baseline
//! ```

use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};

use note_interpreter::config::{LogSettings, Settings, build_client};
use note_interpreter::logging::init_logging;
use prompt_lab::bundle::{DummyModel, LabModel, LlmModel, run_bundle};
use prompt_lab::plan::StepwisePlan;
use prompt_lab::validate::{
    ValidationOptions, ValidationReport, validate_llm_reply, validate_value,
};

/// Prompt experiment harness.
#[derive(Parser)]
#[command(name = "prompt-lab", version)]
struct Cli {
    /// note-interpreter settings file, used by --live
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a JSON output against the expected JSON
    Validate(ValidateArgs),
    /// Run an experiment bundle and write the result back into it
    RunBundle(RunBundleArgs),
    /// Print a stepwise plan
    Plan(PlanArgs),
}

#[derive(clap::Args)]
struct MatchArgs {
    /// Unexpected fields in the output fail validation
    #[arg(long)]
    strict: bool,

    /// Missing fields do not fail validation
    #[arg(long)]
    partial: bool,

    /// Field to skip (repeatable)
    #[arg(long = "ignore", value_name = "FIELD")]
    ignore: Vec<String>,

    /// Report JSON type differences
    #[arg(long)]
    type_check: bool,

    /// Numeric tolerance for a field, as FIELD=TOLERANCE (repeatable)
    #[arg(long = "within", value_name = "FIELD=TOLERANCE")]
    within: Vec<String>,
}

impl MatchArgs {
    fn options(&self) -> Result<ValidationOptions> {
        let mut opts = ValidationOptions::new()
            .with_strict(self.strict)
            .with_partial(self.partial)
            .with_type_check(self.type_check);
        for field in &self.ignore {
            opts = opts.ignore(field.clone());
        }
        for spec in &self.within {
            let Some((field, tolerance)) = spec.split_once('=') else {
                bail!("--within expects FIELD=TOLERANCE, got '{spec}'");
            };
            let tolerance: f64 = tolerance
                .trim()
                .parse()
                .with_context(|| format!("invalid tolerance in '{spec}'"))?;
            opts = opts.with_tolerance(field.trim(), tolerance);
        }
        Ok(opts)
    }
}

#[derive(clap::Args)]
struct ValidateArgs {
    /// Actual output (JSON)
    #[arg(long)]
    output: PathBuf,

    /// Expected output (JSON object)
    #[arg(long)]
    expected: PathBuf,

    /// The output is a raw chat-completion reply
    #[arg(long)]
    raw_reply: bool,

    #[command(flatten)]
    matching: MatchArgs,
}

#[derive(clap::Args)]
struct RunBundleArgs {
    /// Bundle YAML file
    bundle: PathBuf,

    /// Call the configured LLM instead of the dummy model
    #[arg(long)]
    live: bool,

    #[command(flatten)]
    matching: MatchArgs,
}

#[derive(clap::Args)]
struct PlanArgs {
    /// Plan file (.yaml, .yml or .md)
    plan: PathBuf,

    /// Show only this step
    #[arg(long)]
    step: Option<String>,
}

fn read_json(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn read_json_object(path: &Path) -> Result<Map<String, Value>> {
    match read_json(path)? {
        Value::Object(map) => Ok(map),
        _ => bail!("{} must hold a JSON object", path.display()),
    }
}

fn print_report(report: &ValidationReport) -> Result<bool> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(report.passed())
}

fn validate(args: &ValidateArgs) -> Result<bool> {
    let opts = args.matching.options()?;
    let expected = read_json_object(&args.expected)?;
    let report = if args.raw_reply {
        validate_llm_reply(&read_json(&args.output)?, &expected, &opts)
    } else {
        validate_value(&read_json(&args.output)?, &expected, &opts)
    };
    print_report(&report)
}

async fn run(cli: &Cli, args: &RunBundleArgs) -> Result<bool> {
    let opts = args.matching.options()?;
    let model: Box<dyn LabModel> = if args.live {
        let settings = Settings::load(cli.config.as_deref())?;
        let client = build_client(&settings.llm)?;
        Box::new(
            LlmModel::new(client).with_llm_params(settings.llm.max_tokens, settings.llm.temperature),
        )
    } else {
        Box::new(DummyModel)
    };

    let bundle = run_bundle(&args.bundle, model.as_ref(), &opts)
        .await
        .with_context(|| format!("running bundle {}", args.bundle.display()))?;
    println!("Bundle updated: {}", args.bundle.display());
    match bundle.validation.and_then(|v| v.result) {
        Some(report) => {
            println!("Status: {}", report.status);
            Ok(report.passed())
        }
        None => Ok(false),
    }
}

fn show_plan(args: &PlanArgs) -> Result<bool> {
    let plan = StepwisePlan::load(&args.plan)?;
    match &args.step {
        Some(name) => {
            let Some(step) = plan.get_step(name) else {
                bail!(
                    "no step '{name}' in {} (steps: {})",
                    args.plan.display(),
                    plan.list_steps().join(", ")
                );
            };
            println!("{}", serde_yaml::to_string(step)?);
        }
        None => print!("{}", plan.summary()),
    }
    Ok(true)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let logging = LogSettings {
        level: cli.log_level.clone(),
        ..Default::default()
    };
    let _guard = match init_logging(&logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    let result = match &cli.command {
        Command::Validate(args) => validate(args),
        Command::RunBundle(args) => run(&cli, args).await,
        Command::Plan(args) => show_plan(args),
    };
    match result {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("Error: {e:#}");
            process::exit(2);
        }
    }
}
