//! YAML-driven system prompt builder.
//!
//! The prompt layout lives in a YAML document:
//!
//! ```yaml
//! sections:
//!   - name: intro
//!   - name: classification
//!     params:
//!       classification_file: classification.yaml
//!   - name: constraints
//!     custom_text: "Never invent dates. Notes: {notes}"
//!   - name: example_output
//!     enabled: false
//! ```
//!
//! Section order in the file is the order in the prompt. A section with a
//! non-empty `custom_text` is emitted verbatim after `{placeholder}`
//! substitution; every other section is rendered through the
//! [`SectionRegistry`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Error, Result};
use crate::io::read_yaml;
use crate::prompt::assembler::PromptAssembler;
use crate::prompt::registry::{PromptContext, SectionParams, SectionRegistry, fill_placeholders};

// ── Config ─────────────────────────────────────────────────────────

fn enabled_by_default() -> bool {
    true
}

/// One entry of the `sections` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionConfig {
    pub name: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default)]
    pub params: SectionParams,
    #[serde(default)]
    pub custom_text: Option<String>,
}

impl SectionConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            params: SectionParams::new(),
            custom_text: None,
        }
    }

    pub fn with_custom_text(mut self, text: impl Into<String>) -> Self {
        self.custom_text = Some(text.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Configured literal text, if any. Whitespace-only text counts as absent.
    fn literal_text(&self) -> Option<&str> {
        self.custom_text.as_deref().filter(|t| !t.trim().is_empty())
    }
}

/// The parsed prompt layout document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptConfig {
    #[serde(default)]
    pub sections: Vec<SectionConfig>,
}

impl PromptConfig {
    /// Load a layout file. A missing file or invalid YAML is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&text).map_err(|e| Error::yaml(path, e))
    }
}

/// Human-readable header for a section name.
///
/// Related sections share a header. Unknown names fall back to the name in
/// upper case with underscores replaced by spaces.
pub fn section_header(name: &str) -> String {
    let header = match name {
        "intro" => "IDENTITY / ROLE",
        "goals" => "GOALS / OBJECTIVES",
        "output_schema_and_meanings"
        | "classification"
        | "scoring_guidelines"
        | "parameter_explanations"
        | "output_validation_rules" => "OPERATIONAL PROTOCOL",
        "tool_json_schema" | "tool_behavior_summary" => "TOOL INVENTORY & USAGE",
        "communication_strategy" => "COMMUNICATION STRATEGY",
        "constraints" => "CONSTRAINTS",
        "reasoning_style" => "REASONING STYLE / HEURISTICS",
        "meta_behavior" => "META BEHAVIOR / FALLBACK",
        "context_usage" | "clarification_protocol" => "CONTEXT & REASONING STYLE",
        "memory_update" | "memory_point_examples" => "MEMORY MANAGEMENT",
        "example_output" => "EXAMPLES",
        "input_context" | "finalization_protocol" => "INPUT CONTEXT & FINALIZATION",
        "custom_section" => "CUSTOM / EXTENSION",
        other => return other.replace('_', " ").to_uppercase(),
    };
    header.to_string()
}

// ── Inputs ─────────────────────────────────────────────────────────

/// Per-build data fed into the sections.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromptInputs {
    pub memory: Vec<String>,
    pub notes: Vec<String>,
    pub classification_config: Option<Value>,
    pub extra_context: Map<String, Value>,
    pub schema: Option<Value>,
    pub parameters: Option<Value>,
    pub scoring_metrics: Option<Value>,
}

impl PromptInputs {
    pub fn new(memory: &[String], notes: &[String]) -> Self {
        Self {
            memory: memory.to_vec(),
            notes: notes.to_vec(),
            ..Default::default()
        }
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra_context.insert(key.into(), value);
        self
    }
}

// ── Builder ────────────────────────────────────────────────────────

/// Composes the system prompt from a layout file and a section registry.
///
/// Cloning is cheap; the registry is shared.
#[derive(Debug, Clone)]
pub struct SystemPromptBuilder {
    config_path: PathBuf,
    registry: Arc<SectionRegistry>,
}

impl SystemPromptBuilder {
    /// Builder for the layout at `config_path`, using the default sections.
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            registry: Arc::new(SectionRegistry::with_default_sections()),
        }
    }

    /// Replace the section registry.
    pub fn with_registry(mut self, registry: SectionRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn registry(&self) -> &SectionRegistry {
        &self.registry
    }

    /// Load the layout file and build the prompt.
    ///
    /// The file is re-read on every call so edits apply between rounds.
    pub fn build(&self, inputs: &PromptInputs) -> Result<String> {
        let config = PromptConfig::load(&self.config_path)?;
        self.build_with_config(&config, inputs)
    }

    /// Build the prompt from an already-loaded layout.
    pub fn build_with_config(&self, config: &PromptConfig, inputs: &PromptInputs) -> Result<String> {
        let context = self.context_for(config, inputs)?;
        let placeholders = context.placeholder_map();

        let mut assembler = PromptAssembler::new();
        for section in config.sections.iter().filter(|s| s.enabled) {
            let header = section_header(&section.name);
            let content = match section.literal_text() {
                Some(text) => fill_placeholders(text, &placeholders),
                None => self.registry.render(&section.name, &section.params, &context),
            };
            assembler = assembler.section(&header, content);
        }
        debug!(
            "Built system prompt: {} part(s) from {}",
            assembler.len(),
            self.config_path.display()
        );
        Ok(assembler.build())
    }

    fn context_for(&self, config: &PromptConfig, inputs: &PromptInputs) -> Result<PromptContext> {
        let schema = inputs.schema.clone().unwrap_or(Value::Null);
        let scoring_metrics = inputs
            .scoring_metrics
            .clone()
            .or_else(|| schema.get("scoring_metrics").cloned())
            .unwrap_or(Value::Null);

        let classification_config = match self.classification_file(config) {
            Some(path) => {
                debug!("Loading classification config from {}", path.display());
                read_yaml(&path)?
            }
            None => inputs.classification_config.clone().unwrap_or(Value::Null),
        };

        Ok(PromptContext {
            memory: inputs.memory.clone(),
            notes: inputs.notes.clone(),
            classification_config,
            schema,
            parameters: inputs.parameters.clone().unwrap_or(Value::Null),
            scoring_metrics,
            extra_context: inputs.extra_context.clone(),
        })
    }

    /// `classification_file` of the first classification section, resolved
    /// against the layout file's directory when not found as given.
    fn classification_file(&self, config: &PromptConfig) -> Option<PathBuf> {
        let file = config
            .sections
            .iter()
            .filter(|s| s.name == "classification")
            .find_map(|s| s.params.get("classification_file").and_then(Value::as_str))?;

        let path = PathBuf::from(file);
        if path.is_absolute() || path.exists() {
            return Some(path);
        }
        match self.config_path.parent() {
            Some(dir) => Some(dir.join(path)),
            None => Some(path),
        }
    }
}
