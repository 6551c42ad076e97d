//! LLM agent that interprets short, ambiguous notes into structured entries.
//!
//! `note-interpreter` sends free-text notes plus a running user memory to a
//! hosted chat model. The model is steered by a large system prompt composed
//! from YAML-configured sections and answers through two tools: `ask_user`
//! (request clarification) and `finalize_notes` (return the structured
//! result). A bounded clarification loop drives the conversation and always
//! terminates with a well-formed [`LlmOutput`](model::LlmOutput).
//!
//! # Getting started
//!
//! ```ignore
//! use note_interpreter::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> note_interpreter::Result<()> {
//!     let settings = Settings::load(None)?;
//!     let client = build_client(&settings.llm)?;
//!
//!     let notes = read_notes_csv("notes.csv")?;
//!     let memory = read_user_memory("memory.md")?;
//!
//!     let agent = ClarificationLoop::new(client, SystemPromptBuilder::new(&settings.prompt_config))
//!         .with_max_rounds(settings.max_clarification_rounds)
//!         .with_input(Box::new(StdinInput));
//!     let output = agent.run(&notes, &memory).await?;
//!     println!("{}", serde_json::to_string_pretty(&output)?);
//!     Ok(())
//! }
//! ```
//!
//! # Where to find things
//!
//! - **Prompt composition:** [`prompt::registry::SectionRegistry`] holds the
//!   named section renderers, [`prompt::builder::SystemPromptBuilder`] walks
//!   the YAML section list and assembles the final text.
//! - **Tools:** [`tools::core::ToolDefinition`] is vendor-neutral;
//!   [`tools::provider::ToolProvider`] converts it to OpenAI or Anthropic
//!   wire format and binds it to a [`ChatClient`](api::client::ChatClient).
//! - **Conversation:** [`agent::core::AgentCore`] owns the history and tool
//!   dispatch; [`agent::clarify::ClarificationLoop`] runs the bounded rounds.
//! - **Glue:** [`io`] for CSV/Markdown/YAML files, [`config`] for settings,
//!   [`logging`] for tracing setup, [`ui`] for colored console output.

pub mod agent;
pub mod api;
pub mod config;
pub mod error;
pub mod io;
pub mod logging;
pub mod model;
pub mod prelude;
pub mod prompt;
pub mod tools;
pub mod ui;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub use error::{Error, Result};

// Re-export schemars for downstream crates.
pub use schemars;

// ── Schema generation ──────────────────────────────────────────────

/// Generate a JSON Schema `serde_json::Value` from a type that implements
/// `schemars::JsonSchema`.
///
/// # Example
///
/// ```
/// use note_interpreter::json_schema_for;
/// use schemars::JsonSchema;
/// use serde::Deserialize;
///
/// #[derive(Deserialize, JsonSchema)]
/// struct AskArgs {
///     questions: Vec<String>,
/// }
///
/// let schema = json_schema_for::<AskArgs>();
/// assert_eq!(schema["type"], "object");
/// assert!(schema["required"].as_array().unwrap().contains(&"questions".into()));
/// ```
pub fn json_schema_for<T: JsonSchema>() -> serde_json::Value {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(schema)
        .unwrap_or_else(|_| serde_json::json!({"type": "object", "properties": {}}))
}

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in the conversation.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::Tool => write!(f, "tool"),
        }
    }
}

/// A message in the conversation.
///
/// The serialized shape is the OpenAI chat format; other providers convert
/// from it at the client boundary.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Message {
    pub role: MessageRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn assistant_text(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Assistant turn carrying tool-call metadata, with any text the model
    /// produced alongside the calls.
    pub fn assistant_tool_calls(content: Option<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content,
            tool_calls: Some(calls),
            tool_call_id: None,
        }
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(call_id.into()),
        }
    }

    /// Text content, or an empty string.
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }
}

// ── Tool call types ────────────────────────────────────────────────

/// The type of a tool call. Currently always `Function`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum CallType {
    #[serde(rename = "function")]
    Function,
}

/// A tool call returned by the model.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: CallType,
    pub function: FunctionCallData,
}

impl ToolCall {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            call_type: CallType::Function,
            function: FunctionCallData {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }

    /// Parse the raw argument string. An empty string is treated as `{}`.
    pub fn parse_arguments(&self) -> Result<serde_json::Value> {
        let raw = self.function.arguments.trim();
        if raw.is_empty() {
            return Ok(serde_json::Value::Object(serde_json::Map::new()));
        }
        serde_json::from_str(raw).map_err(|e| {
            Error::MalformedToolCall(format!(
                "arguments for '{}' are not valid JSON: {e}",
                self.function.name
            ))
        })
    }
}

/// Function name and raw JSON-encoded arguments of a tool call.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FunctionCallData {
    pub name: String,
    pub arguments: String,
}

// ── Response types ─────────────────────────────────────────────────

/// Provider-neutral result of one chat completion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatCompletion {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<UsageInfo>,
    pub finish_reason: Option<String>,
}

impl ChatCompletion {
    /// A plain-text completion.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            finish_reason: Some("stop".into()),
            ..Default::default()
        }
    }

    /// A completion consisting of a single tool call.
    pub fn tool_call(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        let name = name.into();
        Self {
            tool_calls: vec![ToolCall::new(
                format!("call_{name}"),
                name,
                arguments.to_string(),
            )],
            finish_reason: Some("tool_calls".into()),
            ..Default::default()
        }
    }

    /// A completion with a raw (possibly invalid) argument string.
    pub fn raw_tool_call(name: impl Into<String>, arguments: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            tool_calls: vec![ToolCall::new(format!("call_{name}"), name, arguments)],
            finish_reason: Some("tool_calls".into()),
            ..Default::default()
        }
    }
}

/// Token usage statistics.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct UsageInfo {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}
