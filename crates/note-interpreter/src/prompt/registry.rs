//! Name-keyed prompt section renderers.
//!
//! A [`SectionRegistry`] maps a section name to a rendering function
//! `(params, context) -> Result<String, String>`. Renderers are pure: the
//! same params and context always give the same text. The registry is an
//! explicit value handed to the [`SystemPromptBuilder`](super::SystemPromptBuilder);
//! it is filled once at startup and only read afterwards.

use std::collections::HashMap;

use serde_json::{Map, Value};
use tracing::warn;

use crate::model::ClarificationRecord;

/// Per-section parameters from the YAML config.
pub type SectionParams = Map<String, Value>;

/// Rendering function stored in the registry.
pub type SectionFn =
    Box<dyn Fn(&SectionParams, &PromptContext) -> Result<String, String> + Send + Sync>;

// ── Context ────────────────────────────────────────────────────────

/// Everything a section renderer may read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromptContext {
    pub memory: Vec<String>,
    pub notes: Vec<String>,
    pub classification_config: Value,
    pub schema: Value,
    pub parameters: Value,
    pub scoring_metrics: Value,
    /// Free-form extras; holds `clarification_qas` or `clarification_history`.
    pub extra_context: Map<String, Value>,
}

impl PromptContext {
    /// Accumulated clarification, taken from `clarification_qas` or, failing
    /// that, `clarification_history`.
    pub fn clarification_history(&self) -> Value {
        self.extra_context
            .get("clarification_qas")
            .or_else(|| self.extra_context.get("clarification_history"))
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new()))
    }

    /// Typed view of [`clarification_history`](Self::clarification_history).
    /// Entries that are neither a batch nor a pair are skipped.
    pub fn clarification_records(&self) -> Vec<ClarificationRecord> {
        match self.clarification_history() {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|v| serde_json::from_value(v).ok())
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Top-level keys available to `{placeholder}` substitution.
    pub fn placeholder_map(&self) -> Map<String, Value> {
        let memory = Value::from(self.memory.clone());
        let mut map = Map::new();
        map.insert("notes".into(), Value::from(self.notes.clone()));
        map.insert("user_memory".into(), memory.clone());
        map.insert("memory".into(), memory);
        map.insert("clarification_history".into(), self.clarification_history());
        map.insert(
            "extra_context".into(),
            Value::Object(self.extra_context.clone()),
        );
        map.insert(
            "classification_config".into(),
            self.classification_config.clone(),
        );
        map.insert("schema".into(), self.schema.clone());
        map.insert("parameters".into(), self.parameters.clone());
        map.insert("scoring_metrics".into(), self.scoring_metrics.clone());
        map
    }
}

// ── Placeholders ───────────────────────────────────────────────────

/// Render a context value for inclusion in prompt text.
///
/// Lists become `- item` lines, maps become pretty JSON, `null` becomes
/// `(none)`, strings are inserted as-is.
pub fn serialize_value(value: &Value) -> String {
    match value {
        Value::Null => "(none)".to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => format!("- {s}"),
                other => format!("- {other}"),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Object(_) => {
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        }
        other => other.to_string(),
    }
}

/// Replace every `{key}` whose key exists in `context` with its serialized
/// value. Unknown keys are left untouched, and substituted text is never
/// scanned again.
///
/// ```
/// use note_interpreter::prompt::fill_placeholders;
/// use serde_json::{Map, json};
///
/// let mut ctx = Map::new();
/// ctx.insert("name".into(), json!("World"));
/// assert_eq!(fill_placeholders("Hello {name}", &ctx), "Hello World");
/// assert_eq!(fill_placeholders("{missing}", &Map::new()), "{missing}");
/// ```
pub fn fill_placeholders(text: &str, context: &Map<String, Value>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find('{') {
        let (before, from_open) = rest.split_at(open);
        out.push_str(before);
        let after_open = from_open.strip_prefix('{').unwrap_or(from_open);
        let Some(end) = after_open.find(['{', '}']) else {
            out.push('{');
            rest = after_open;
            continue;
        };
        let (key, tail) = after_open.split_at(end);
        match tail.strip_prefix('}') {
            Some(after_close) => {
                match context.get(key) {
                    Some(value) => out.push_str(&serialize_value(value)),
                    None => {
                        out.push('{');
                        out.push_str(key);
                        out.push('}');
                    }
                }
                rest = after_close;
            }
            // Another `{` opens before this one closes: this brace is literal.
            None => {
                out.push('{');
                out.push_str(key);
                rest = tail;
            }
        }
    }
    out.push_str(rest);
    out
}

// ── Registry ───────────────────────────────────────────────────────

/// Registry of named section renderers.
///
/// # Example
///
/// ```
/// use note_interpreter::prompt::{PromptContext, SectionParams, SectionRegistry};
///
/// let registry = SectionRegistry::new()
///     .with("greeting", |_params, ctx| Ok(format!("{} note(s)", ctx.notes.len())));
///
/// let ctx = PromptContext { notes: vec!["a".into()], ..Default::default() };
/// assert_eq!(registry.render("greeting", &SectionParams::new(), &ctx), "1 note(s)");
/// assert_eq!(
///     registry.render("nope", &SectionParams::new(), &ctx),
///     "[WARNING: section 'nope' not found]"
/// );
/// ```
#[derive(Default)]
pub struct SectionRegistry {
    sections: HashMap<String, SectionFn>,
}

impl std::fmt::Debug for SectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SectionRegistry")
            .field("sections", &self.names())
            .finish()
    }
}

impl SectionRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a renderer under `name`.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        render: impl Fn(&SectionParams, &PromptContext) -> Result<String, String>
        + Send
        + Sync
        + 'static,
    ) -> &mut Self {
        self.sections.insert(name.into(), Box::new(render));
        self
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(
        mut self,
        name: impl Into<String>,
        render: impl Fn(&SectionParams, &PromptContext) -> Result<String, String>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.register(name, render);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sections.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.sections.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Render one section. Never fails: an unknown name or a renderer error
    /// yields a `[WARNING: ...]` marker and a log line.
    pub fn render(&self, name: &str, params: &SectionParams, context: &PromptContext) -> String {
        let Some(render) = self.sections.get(name) else {
            warn!("Prompt section '{name}' is not registered");
            return format!("[WARNING: section '{name}' not found]");
        };
        match render(params, context) {
            Ok(text) => text,
            Err(e) => {
                warn!("Prompt section '{name}' failed to render: {e}");
                format!("[WARNING: section '{name}' failed: {e}]")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn fill_replaces_known_keys() {
        let c = ctx(&[("name", json!("World"))]);
        assert_eq!(fill_placeholders("Hello {name}", &c), "Hello World");
    }

    #[test]
    fn fill_leaves_unknown_keys() {
        assert_eq!(fill_placeholders("{missing}", &Map::new()), "{missing}");
        assert_eq!(
            fill_placeholders("a {x} b {y}", &ctx(&[("y", json!(2))])),
            "a {x} b 2"
        );
    }

    #[test]
    fn fill_is_single_pass() {
        let c = ctx(&[("a", json!("{b}")), ("b", json!("nested"))]);
        assert_eq!(fill_placeholders("{a}", &c), "{b}");
    }

    #[test]
    fn fill_handles_unbalanced_braces() {
        let c = ctx(&[("k", json!("v"))]);
        assert_eq!(fill_placeholders("{ {k} }", &c), "{ v }");
        assert_eq!(fill_placeholders("tail {", &c), "tail {");
        assert_eq!(fill_placeholders("{{k}}", &c), "{v}");
    }

    #[test]
    fn fill_serializes_structured_values() {
        let c = ctx(&[
            ("notes", json!(["one", "two"])),
            ("nothing", Value::Null),
            ("n", json!(3)),
        ]);
        assert_eq!(fill_placeholders("{notes}", &c), "- one\n- two");
        assert_eq!(fill_placeholders("{nothing}", &c), "(none)");
        assert_eq!(fill_placeholders("{n}", &c), "3");
    }

    #[test]
    fn serialize_map_is_pretty_json() {
        let text = serialize_value(&json!({"a": 1}));
        assert_eq!(text, "{\n  \"a\": 1\n}");
    }

    #[test]
    fn render_reports_missing_and_failing_sections() {
        let registry = SectionRegistry::new().with("broken", |_, _| Err("no schema".into()));
        let ctx = PromptContext::default();
        let params = SectionParams::new();

        assert_eq!(
            registry.render("x", &params, &ctx),
            "[WARNING: section 'x' not found]"
        );
        assert_eq!(
            registry.render("broken", &params, &ctx),
            "[WARNING: section 'broken' failed: no schema]"
        );
    }

    #[test]
    fn register_replaces_existing() {
        let mut registry = SectionRegistry::new();
        registry.register("s", |_, _| Ok("old".into()));
        registry.register("s", |_, _| Ok("new".into()));
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.render("s", &SectionParams::new(), &PromptContext::default()),
            "new"
        );
    }

    #[test]
    fn clarification_history_prefers_qas() {
        let mut context = PromptContext::default();
        context
            .extra_context
            .insert("clarification_history".into(), json!([{"question": "old", "answer": "a"}]));
        context.extra_context.insert(
            "clarification_qas".into(),
            json!([{"questions": ["q1"], "response": "r1"}]),
        );
        let records = context.clarification_records();
        assert_eq!(records.len(), 1);
        assert!(matches!(records[0], ClarificationRecord::Batch { .. }));
    }
}
