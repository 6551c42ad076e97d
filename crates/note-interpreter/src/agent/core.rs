//! Conversation state and tool dispatch for one agent.
//!
//! [`AgentCore`] owns the message history and a tool-bound LLM handle. Each
//! call to [`handle_user_message`](AgentCore::handle_user_message) moves
//! through `awaiting input -> LLM call -> plain reply | tool call -> tool
//! executed -> awaiting input`. It never decides when a conversation is
//! over; callers look at which tool was invoked and decide.
//!
//! Failures during the model call or while reading its reply are caught,
//! recorded in history as a system turn, and returned as
//! [`ResponseKind::Error`]. They never propagate.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::agent::events::{EventHandler, LoopEvent};
use crate::agent::input::HumanInput;
use crate::api::client::{BoundLlm, ChatClient};
use crate::error::{Error, Result};
use crate::prompt::registry::fill_placeholders;
use crate::tools::core::{SharedContext, ToolSet};
use crate::tools::provider::bind_tools;
use crate::{ChatCompletion, Message, ToolCall};

// ── Input / output ─────────────────────────────────────────────────

/// What the caller hands to [`AgentCore::handle_user_message`].
#[derive(Debug, Clone, PartialEq)]
pub enum UserInput {
    /// A user turn appended to the running history.
    Text(String),
    /// A complete message list sent as-is; it replaces the history.
    History(Vec<Message>),
}

impl From<String> for UserInput {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for UserInput {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Vec<Message>> for UserInput {
    fn from(messages: Vec<Message>) -> Self {
        Self::History(messages)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    Conversation,
    ToolCall,
    Error,
}

/// The tool call carried by a response and what running it returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDetails {
    pub name: String,
    pub args: Value,
    /// Local function result; `None` when the tool has no function.
    pub result: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    #[serde(rename = "type")]
    pub kind: ResponseKind,
    pub display_message: String,
    pub tool_details: Option<ToolDetails>,
    pub error: Option<String>,
}

impl AgentResponse {
    fn conversation(text: String) -> Self {
        Self {
            kind: ResponseKind::Conversation,
            display_message: text,
            tool_details: None,
            error: None,
        }
    }

    fn tool_call(display_message: String, details: ToolDetails) -> Self {
        Self {
            kind: ResponseKind::ToolCall,
            display_message,
            tool_details: Some(details),
            error: None,
        }
    }

    fn error(message: String) -> Self {
        Self {
            kind: ResponseKind::Error,
            display_message: format!("Error: {message}"),
            tool_details: None,
            error: Some(message),
        }
    }

    /// Name of the invoked tool, if this is a tool-call response.
    pub fn tool_name(&self) -> Option<&str> {
        self.tool_details.as_ref().map(|d| d.name.as_str())
    }
}

// ── State ──────────────────────────────────────────────────────────

/// One executed tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutputRecord {
    pub tool_name: String,
    pub tool_args: Value,
    pub result: Value,
    /// RFC 3339, UTC.
    pub timestamp: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentState {
    pub history: Vec<Message>,
    pub tool_outputs: Vec<ToolOutputRecord>,
    pub errors: Vec<String>,
}

// ── Agent ──────────────────────────────────────────────────────────

/// A single conversational agent with tools.
pub struct AgentCore {
    llm: BoundLlm,
    tools: ToolSet,
    shared_context: SharedContext,
    state: AgentState,
    system_prompt: String,
    inject_fields: Vec<String>,
}

impl std::fmt::Debug for AgentCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentCore")
            .field("llm", &self.llm)
            .field("tools", &self.tools.names())
            .field("history", &self.state.history.len())
            .finish()
    }
}

impl AgentCore {
    /// Bind `tools` to `client` with the provider for its vendor.
    ///
    /// Fails when the client's vendor has no tool provider.
    pub fn new(
        client: Arc<dyn ChatClient>,
        tools: ToolSet,
        system_prompt: impl Into<String>,
    ) -> Result<Self> {
        let llm = bind_tools(client, &tools)?;
        Ok(Self {
            llm,
            tools,
            shared_context: SharedContext::new(),
            state: AgentState::default(),
            system_prompt: system_prompt.into(),
            inject_fields: Vec::new(),
        })
    }

    pub fn with_shared_context(mut self, context: SharedContext) -> Self {
        self.shared_context = context;
        self
    }

    /// Substitute these shared-context fields into the system prompt's
    /// `{placeholders}` before every call.
    pub fn with_prompt_injection<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inject_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_llm_params(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.llm = self.llm.with_max_tokens(max_tokens).with_temperature(temperature);
        self
    }

    /// Replace the tool-bound handle, e.g. to change its retry policy.
    pub fn map_llm(mut self, f: impl FnOnce(BoundLlm) -> BoundLlm) -> Self {
        self.llm = f(self.llm);
        self
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    pub fn history(&self) -> &[Message] {
        &self.state.history
    }

    pub fn shared_context(&self) -> &SharedContext {
        &self.shared_context
    }

    pub fn shared_context_mut(&mut self) -> &mut SharedContext {
        &mut self.shared_context
    }

    pub fn tools(&self) -> &ToolSet {
        &self.tools
    }

    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) {
        self.system_prompt = prompt.into();
    }

    /// The system prompt with injected shared-context fields.
    pub fn effective_system_prompt(&self) -> String {
        if self.inject_fields.is_empty() {
            return self.system_prompt.clone();
        }
        let fields = self.shared_context.select(&self.inject_fields);
        fill_placeholders(&self.system_prompt, &fields)
    }

    /// Run the local function of tool `name`. Unknown tools and tools
    /// without a function give `None`.
    pub fn execute_tool(&mut self, name: &str, args: &Value) -> Option<Value> {
        self.tools.execute(name, args, &mut self.shared_context)
    }

    /// Send one user turn (or a full history) and process the reply.
    pub async fn handle_user_message(&mut self, input: impl Into<UserInput>) -> AgentResponse {
        let messages = match input.into() {
            UserInput::Text(text) => {
                self.state.history.push(Message::user(text));
                let mut messages = Vec::with_capacity(self.state.history.len() + 1);
                let prompt = self.effective_system_prompt();
                if !prompt.is_empty() {
                    messages.push(Message::system(prompt));
                }
                messages.extend(self.state.history.iter().cloned());
                messages
            }
            UserInput::History(messages) => {
                self.state.history = messages.clone();
                messages
            }
        };

        match self.llm.invoke(&messages).await {
            Ok(completion) => self.process_completion(completion),
            Err(e) => self.fail(e),
        }
    }

    fn process_completion(&mut self, completion: ChatCompletion) -> AgentResponse {
        let ChatCompletion {
            content,
            tool_calls,
            ..
        } = completion;
        let content = content.filter(|c| !c.trim().is_empty());

        let mut calls = tool_calls.into_iter();
        let Some(call) = calls.next() else {
            return match content {
                Some(text) => {
                    self.state.history.push(Message::assistant_text(text.clone()));
                    AgentResponse::conversation(text)
                }
                None => self.fail(Error::Llm("empty response: no content and no tool call".into())),
            };
        };
        let ignored = calls.count();
        if ignored > 0 {
            warn!("Model returned {} extra tool call(s); only '{}' is handled", ignored, call.function.name);
        }
        self.process_tool_call(content, call)
    }

    fn process_tool_call(&mut self, content: Option<String>, call: ToolCall) -> AgentResponse {
        let args = match call.parse_arguments() {
            Ok(args) => args,
            Err(e) => return self.fail(e),
        };
        let name = call.function.name.clone();
        let result = self.execute_tool(&name, &args);

        self.state.tool_outputs.push(ToolOutputRecord {
            tool_name: name.clone(),
            tool_args: args.clone(),
            result: result.clone().unwrap_or(Value::Null),
            timestamp: Utc::now().to_rfc3339(),
        });

        let tool_message = match &result {
            Some(value) => value.to_string(),
            None => "{}".to_string(),
        };
        let call_id = call.id.clone();
        let display = content
            .clone()
            .unwrap_or_else(|| format!("Calling tool: {name}"));
        self.state
            .history
            .push(Message::assistant_tool_calls(content, vec![call]));
        self.state
            .history
            .push(Message::tool_result(call_id, tool_message));

        debug!("Handled tool call '{name}'");
        AgentResponse::tool_call(display, ToolDetails { name, args, result })
    }

    fn fail(&mut self, err: Error) -> AgentResponse {
        let message = err.to_string();
        error!("Error processing message: {message}");
        self.state
            .history
            .push(Message::system(format!("Error processing message: {message}")));
        self.state.errors.push(message.clone());
        AgentResponse::error(message)
    }

    /// Free-form chat on the terminal until `exit`, `quit` or end of input.
    pub async fn run_interactive(&mut self, input: &dyn HumanInput, events: &dyn EventHandler) {
        info!("Interactive session started; type 'exit' or 'quit' to leave");
        loop {
            let Some(line) = input.read_line("You:") else {
                break;
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
                break;
            }
            let response = self.handle_user_message(line).await;
            match (&response.kind, &response.tool_details) {
                (ResponseKind::ToolCall, Some(details)) => events.on_event(&LoopEvent::ToolCall {
                    name: &details.name,
                    args: &details.args,
                }),
                _ => events.on_event(&LoopEvent::LlmResponse(&response.display_message)),
            }
        }
        info!("Interactive session ended");
    }
}
