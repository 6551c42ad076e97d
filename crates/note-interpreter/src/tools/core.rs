//! Vendor-neutral tool definitions and local dispatch.
//!
//! A [`ToolDefinition`] carries the name, description and JSON schema the
//! model sees, plus an optional local function run when the model calls the
//! tool. Definitions are collected into a [`ToolSet`], which handles lookup,
//! argument validation and dispatch. Local functions receive a
//! [`SharedContext`] so tools can hand data back to the agent without
//! global state.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};

/// Local function attached to a tool: `(args, shared_context) -> result`.
pub type ToolFn = Box<dyn Fn(&Value, &mut SharedContext) -> Value + Send + Sync>;

// ── ToolDefinition ─────────────────────────────────────────────────

/// A tool the model may call. Immutable once registered.
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object.
    pub schema: Value,
    function: Option<ToolFn>,
}

impl fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("has_function", &self.function.is_some())
            .finish()
    }
}

impl ToolDefinition {
    /// A schema-only definition. Calls to it are recorded but run nothing.
    pub fn new(name: impl Into<String>, description: impl Into<String>, schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
            function: None,
        }
    }

    /// Attach the local function.
    pub fn with_function(
        mut self,
        function: impl Fn(&Value, &mut SharedContext) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.function = Some(Box::new(function));
        self
    }

    pub fn has_function(&self) -> bool {
        self.function.is_some()
    }

    /// Run the local function, if any.
    pub fn call(&self, args: &Value, context: &mut SharedContext) -> Option<Value> {
        self.function.as_ref().map(|f| f(args, context))
    }

    /// `{name, description, parameters}` view used in prompt text.
    pub fn summary_json(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "parameters": self.schema,
        })
    }
}

/// Validate `args` against a JSON schema. Returns a readable error listing
/// every violation, or `None` when the arguments conform (or the schema
/// itself cannot be compiled).
pub fn validate_tool_arguments(name: &str, schema: &Value, args: &Value) -> Option<String> {
    let validator = match jsonschema::validator_for(schema) {
        Ok(v) => v,
        Err(e) => {
            warn!("Schema for tool '{name}' does not compile, skipping validation: {e}");
            return None;
        }
    };
    let errors: Vec<String> = validator
        .iter_errors(args)
        .map(|e| format!("{}: {e}", e.instance_path()))
        .collect();
    if errors.is_empty() {
        None
    } else {
        Some(format!(
            "argument validation failed for tool '{name}': {}",
            errors.join("; ")
        ))
    }
}

/// Log a tool call at INFO level with a truncated preview of arguments.
pub fn log_tool_call(name: &str, args: &Value) {
    let arguments = args.to_string();
    let preview: String = arguments.chars().take(120).collect();
    info!(
        "[tool] {name}({preview}{})",
        if arguments.chars().count() > 120 { "..." } else { "" }
    );
    debug!("[tool] {name} full args ({} bytes)", arguments.len());
    trace!("[tool] {name} arguments: {arguments}");
}

// ── SharedContext ──────────────────────────────────────────────────

/// Mutable key-value store passed to every tool function.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SharedContext {
    fields: Map<String, Value>,
}

/// Descriptive metadata stored next to an exported context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportMeta {
    pub prompt_name: String,
    pub use_case: String,
    pub model: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub saved_at: String,
}

#[derive(Serialize, Deserialize)]
struct ExportedContext {
    meta: ExportMeta,
    shared_context: SharedContext,
}

impl SharedContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.fields.insert(key.into(), value)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Merge every field of `other` into this context.
    pub fn update(&mut self, other: Map<String, Value>) {
        self.fields.extend(other);
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Only the named fields, for prompt variable injection. Missing fields
    /// are omitted.
    pub fn select(&self, names: &[String]) -> Map<String, Value> {
        names
            .iter()
            .filter_map(|n| self.fields.get(n).map(|v| (n.clone(), v.clone())))
            .collect()
    }

    /// Write this context to
    /// `{dir}/exported_{prompt}_{use_case}_{timestamp}.yaml`.
    pub fn export(&self, dir: impl AsRef<Path>, meta: ExportMeta) -> Result<PathBuf> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
        let now = chrono::Local::now();
        let file = dir.join(format!(
            "exported_{}_{}_{}.yaml",
            sanitize_file_part(&meta.prompt_name),
            sanitize_file_part(&meta.use_case),
            now.format("%Y%m%d_%H%M%S")
        ));
        let doc = ExportedContext {
            meta: ExportMeta {
                saved_at: now.to_rfc3339(),
                ..meta
            },
            shared_context: self.clone(),
        };
        let text = serde_yaml::to_string(&doc).map_err(|e| Error::yaml(&file, e))?;
        fs::write(&file, text).map_err(|e| Error::io(&file, e))?;
        info!("Shared context exported to {}", file.display());
        Ok(file)
    }

    /// Read the `shared_context` map of a file written by [`export`](Self::export).
    pub fn import(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let doc: ExportedContext = serde_yaml::from_str(&text).map_err(|e| Error::yaml(path, e))?;
        Ok(doc.shared_context)
    }
}

fn sanitize_file_part(s: &str) -> String {
    let cleaned: String = s
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "unnamed".to_string()
    } else {
        cleaned
    }
}

// ── ToolSet ────────────────────────────────────────────────────────

/// Ordered collection of tool definitions with unique names.
pub struct ToolSet {
    tools: Vec<ToolDefinition>,
    /// Whether to validate tool arguments against JSON Schema before execution.
    validate_args: bool,
}

impl fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolSet")
            .field("tools", &self.names())
            .field("validate_args", &self.validate_args)
            .finish()
    }
}

impl Default for ToolSet {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolSet {
    /// Create an empty tool set.
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            validate_args: false,
        }
    }

    /// Enable JSON Schema argument validation before tool execution.
    pub fn with_arg_validation(mut self, enabled: bool) -> Self {
        self.validate_args = enabled;
        self
    }

    /// Register a tool. Replaces any existing tool with the same name, keeping
    /// its position.
    pub fn register(&mut self, tool: ToolDefinition) {
        match self.tools.iter().position(|t| t.name == tool.name) {
            Some(idx) => self.tools[idx] = tool,
            None => self.tools.push(tool),
        }
    }

    /// Register a tool (builder pattern).
    pub fn with(mut self, tool: ToolDefinition) -> Self {
        self.register(tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.tools
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Run the local function of tool `name`.
    ///
    /// Returns `None` when no tool has that name or the tool has no local
    /// function. With validation enabled, non-conforming arguments produce
    /// `{"error": ...}` without running the function.
    pub fn execute(&self, name: &str, args: &Value, context: &mut SharedContext) -> Option<Value> {
        let Some(tool) = self.get(name) else {
            debug!("No tool named '{name}', nothing to execute");
            return None;
        };
        if !tool.has_function() {
            debug!("Tool '{name}' has no local function");
            return None;
        }
        log_tool_call(name, args);
        if self.validate_args
            && let Some(err) = validate_tool_arguments(name, &tool.schema, args)
        {
            warn!("{err}");
            return Some(json!({ "error": err }));
        }
        tool.call(args, context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo_tool() -> ToolDefinition {
        ToolDefinition::new(
            "echo",
            "Echo the text back",
            json!({
                "type": "object",
                "properties": {"text": {"type": "string"}},
                "required": ["text"]
            }),
        )
        .with_function(|args, ctx| {
            ctx.insert("last_echo", args["text"].clone());
            json!({ "echo": args["text"] })
        })
    }

    #[test]
    fn unknown_tool_returns_none() {
        let tools = ToolSet::new().with(echo_tool());
        let mut ctx = SharedContext::new();
        assert!(tools.execute("nope", &json!({}), &mut ctx).is_none());
    }

    #[test]
    fn tool_without_function_returns_none() {
        let tools = ToolSet::new().with(ToolDefinition::new("schema_only", "", json!({})));
        let mut ctx = SharedContext::new();
        assert!(tools.execute("schema_only", &json!({}), &mut ctx).is_none());
    }

    #[test]
    fn function_receives_shared_context() {
        let tools = ToolSet::new().with(echo_tool());
        let mut ctx = SharedContext::new();
        let result = tools
            .execute("echo", &json!({"text": "hi"}), &mut ctx)
            .unwrap();
        assert_eq!(result["echo"], "hi");
        assert_eq!(ctx.get("last_echo"), Some(&json!("hi")));
    }

    #[test]
    fn validation_blocks_bad_arguments() {
        let tools = ToolSet::new().with(echo_tool()).with_arg_validation(true);
        let mut ctx = SharedContext::new();
        let result = tools.execute("echo", &json!({"text": 5}), &mut ctx).unwrap();
        assert!(result["error"].as_str().unwrap().contains("echo"));
        assert!(!ctx.contains("last_echo"));
    }

    #[test]
    fn register_replaces_same_name_in_place() {
        let tools = ToolSet::new()
            .with(echo_tool())
            .with(ToolDefinition::new("other", "", json!({})))
            .with(ToolDefinition::new("echo", "replaced", json!({})));
        assert_eq!(tools.names(), vec!["echo", "other"]);
        assert_eq!(tools.get("echo").unwrap().description, "replaced");
        assert!(!tools.get("echo").unwrap().has_function());
    }

    #[test]
    fn select_returns_only_present_fields() {
        let mut ctx = SharedContext::new();
        ctx.insert("a", json!(1));
        let picked = ctx.select(&["a".to_string(), "b".to_string()]);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked["a"], 1);
    }

    #[test]
    fn export_then_import() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = SharedContext::new();
        ctx.insert("user", json!({"name": "Ada"}));
        let path = ctx
            .export(
                dir.path(),
                ExportMeta {
                    prompt_name: "single agent".into(),
                    use_case: "notes".into(),
                    model: "gpt-4o".into(),
                    ..Default::default()
                },
            )
            .unwrap();

        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("exported_single_agent_notes_"));
        assert_eq!(SharedContext::import(&path).unwrap(), ctx);
    }
}
