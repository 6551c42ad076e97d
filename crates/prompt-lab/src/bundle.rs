//! Experiment bundles: one YAML file holding a prompt, an input, the
//! expected output and, once run, the actual output and its validation.
//!
//! ```yaml
//! prompt:
//!   text: "Interpret this note: {note}"
//! input:
//!   format: yaml
//!   content:
//!     note: buy milk
//! expected_output:
//!   clarity_score: 50
//!   interpreted_text: BUY MILK
//! ```
//!
//! [`run_bundle`] fills the prompt's `{placeholders}` from the input, runs a
//! [`LabModel`], validates its output and writes the bundle back with
//! `actual_output`, `validation.result` and `log` set. Keys it does not
//! know are kept.

use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use chrono::Utc;
use note_interpreter::api::client::{
    ChatClient, ChatRequest, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE,
};
use note_interpreter::io::parse_csv;
use note_interpreter::prompt::fill_placeholders;
use note_interpreter::Message;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use crate::error::{LabError, Result};
use crate::validate::{ValidationOptions, ValidationReport, ValidationStatus, validate_value};

// ── Bundle file ────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptSpec {
    /// Inline prompt text; wins over `source`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Prompt file, relative to the bundle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputFormat {
    #[default]
    Yaml,
    Csv,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputSpec {
    #[serde(default)]
    pub format: InputFormat,
    /// Inline input. For CSV, `{file: path}` names the file instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
    /// Input file, relative to the bundle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ValidationReport>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunLog {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ValidationStatus>,
    /// RFC 3339, UTC.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExperimentBundle {
    pub prompt: PromptSpec,
    pub input: InputSpec,
    #[serde(default)]
    pub expected_output: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<RunLog>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ExperimentBundle {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| LabError::io(path, e))?;
        serde_yaml::from_str(&text).map_err(|e| LabError::yaml(path, e))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let text = serde_yaml::to_string(self).map_err(|e| LabError::yaml(path, e))?;
        fs::write(path, text).map_err(|e| LabError::io(path, e))
    }

    /// The prompt text, read from `source` when there is no inline text.
    pub fn prompt_text(&self, base_dir: &Path) -> Result<String> {
        if let Some(text) = self.prompt.text.as_deref().filter(|t| !t.is_empty()) {
            return Ok(text.to_string());
        }
        let Some(source) = &self.prompt.source else {
            return Err(LabError::Bundle("prompt has neither text nor source".into()));
        };
        let path = base_dir.join(source);
        fs::read_to_string(&path).map_err(|e| LabError::io(&path, e))
    }

    /// The input document. CSV input is the first data row keyed by the
    /// header row.
    pub fn input_data(&self, base_dir: &Path) -> Result<Value> {
        match self.input.format {
            InputFormat::Yaml => {
                if let Some(content) = &self.input.content {
                    return Ok(content.clone());
                }
                let path = self.input_path(base_dir)?;
                let text = fs::read_to_string(&path).map_err(|e| LabError::io(&path, e))?;
                serde_yaml::from_str(&text).map_err(|e| LabError::yaml(&path, e))
            }
            InputFormat::Csv => {
                let path = self.input_path(base_dir)?;
                first_csv_row(&path)
            }
        }
    }

    fn input_path(&self, base_dir: &Path) -> Result<PathBuf> {
        let file = self
            .input
            .source
            .clone()
            .or_else(|| {
                self.input
                    .content
                    .as_ref()
                    .and_then(|c| c.get("file"))
                    .and_then(Value::as_str)
                    .map(PathBuf::from)
            })
            .ok_or_else(|| LabError::Bundle("input has no content or source".into()))?;
        Ok(base_dir.join(file))
    }

    /// Record a finished run.
    pub fn record_run(&mut self, actual: Value, report: ValidationReport, model: &str) {
        let status = report.status;
        self.actual_output = Some(actual);
        self.validation.get_or_insert_with(Default::default).result = Some(report);
        let log = self.log.get_or_insert_with(Default::default);
        log.status = Some(status);
        log.timestamp = Some(Utc::now().to_rfc3339());
        log.model = Some(model.to_string());
    }
}

fn first_csv_row(path: &Path) -> Result<Value> {
    let text = fs::read_to_string(path).map_err(|e| LabError::io(path, e))?;
    let records = parse_csv(&text).map_err(|reason| {
        LabError::Bundle(format!("malformed CSV in {}: {reason}", path.display()))
    })?;
    let mut rows = records.into_iter();
    let (Some(header), Some(row)) = (rows.next(), rows.next()) else {
        return Err(LabError::Bundle(format!(
            "{} needs a header and at least one row",
            path.display()
        )));
    };
    let map: Map<String, Value> = header
        .into_iter()
        .zip(row)
        .map(|(k, v)| (k.trim().to_string(), Value::String(v)))
        .collect();
    Ok(Value::Object(map))
}

// ── Models ─────────────────────────────────────────────────────────

pub type LabFuture<'a> = Pin<Box<dyn Future<Output = Result<Value>> + Send + 'a>>;

/// Something that turns a prompt and an input into a JSON output.
pub trait LabModel: Send + Sync {
    fn name(&self) -> &str;

    fn run<'a>(&'a self, prompt: &'a str, input: &'a Value) -> LabFuture<'a>;
}

/// Deterministic stand-in: echoes the input's `note` in upper case with a
/// fixed clarity score of 50.
#[derive(Debug, Clone, Copy, Default)]
pub struct DummyModel;

impl LabModel for DummyModel {
    fn name(&self) -> &str {
        "dummy"
    }

    fn run<'a>(&'a self, _prompt: &'a str, input: &'a Value) -> LabFuture<'a> {
        let interpreted = input
            .get("note")
            .and_then(Value::as_str)
            .filter(|n| !n.is_empty())
            .map(|n| Value::String(n.to_uppercase()))
            .unwrap_or(Value::Null);
        Box::pin(async move {
            Ok(json!({
                "clarity_score": 50,
                "interpreted_text": interpreted,
            }))
        })
    }
}

/// Sends the prompt as the system turn and the input as JSON in the user
/// turn; the reply must be a JSON document.
pub struct LlmModel {
    client: Arc<dyn ChatClient>,
    max_tokens: u32,
    temperature: f32,
}

impl LlmModel {
    pub fn new(client: Arc<dyn ChatClient>) -> Self {
        Self {
            client,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    pub fn with_llm_params(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }
}

impl LabModel for LlmModel {
    fn name(&self) -> &str {
        self.client.model()
    }

    fn run<'a>(&'a self, prompt: &'a str, input: &'a Value) -> LabFuture<'a> {
        Box::pin(async move {
            let request = ChatRequest {
                messages: vec![
                    Message::system(prompt),
                    Message::user(serde_json::to_string_pretty(input)?),
                ],
                tools: Vec::new(),
                max_tokens: self.max_tokens,
                temperature: self.temperature,
            };
            let completion = self.client.complete(&request).await?;
            let text = completion
                .content
                .ok_or_else(|| LabError::Model("reply has no text content".into()))?;
            parse_reply(&text)
        })
    }
}

/// Parse a model reply as JSON, tolerating a surrounding Markdown fence.
pub fn parse_reply(text: &str) -> Result<Value> {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed);
    serde_json::from_str(body.trim())
        .map_err(|e| LabError::Model(format!("reply is not JSON ({e}): {trimmed}")))
}

// ── Runner ─────────────────────────────────────────────────────────

/// Load the bundle at `path`, run `model` on it, validate and save.
pub async fn run_bundle(
    path: impl AsRef<Path>,
    model: &dyn LabModel,
    opts: &ValidationOptions,
) -> Result<ExperimentBundle> {
    let path = path.as_ref();
    let base_dir = path.parent().unwrap_or(Path::new("."));
    let mut bundle = ExperimentBundle::load(path)?;

    let input = bundle.input_data(base_dir)?;
    let template = bundle.prompt_text(base_dir)?;
    let prompt = match input.as_object() {
        Some(fields) => fill_placeholders(&template, fields),
        None => template,
    };
    debug!("Bundle {}: prompt is {} chars", path.display(), prompt.len());

    let actual = model.run(&prompt, &input).await?;
    let report = validate_value(&actual, &bundle.expected_output, opts);
    info!(
        "Bundle {} ran on {}: {}",
        path.display(),
        model.name(),
        report.status
    );

    bundle.record_run(actual, report, model.name());
    bundle.save(path)?;
    Ok(bundle)
}
