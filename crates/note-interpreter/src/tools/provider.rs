//! Adapting vendor-neutral tool definitions to vendor wire formats.
//!
//! Each chat client declares its [`ProviderKind`]. Binding a [`ToolSet`] to
//! a client picks the matching [`ToolProvider`], converts every definition
//! into that vendor's shape, and returns a [`BoundLlm`]. Callers never see
//! the vendor payloads.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use crate::api::client::{BoundLlm, ChatClient};
use crate::error::{Error, Result};
use crate::tools::core::{ToolDefinition, ToolSet};

/// LLM vendor families with distinct tool-calling formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::OpenAi => write!(f, "openai"),
            ProviderKind::Anthropic => write!(f, "anthropic"),
        }
    }
}

impl FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "anthropic" => Ok(ProviderKind::Anthropic),
            other => Err(Error::Config(format!(
                "unknown LLM provider '{other}' (expected 'openai' or 'anthropic')"
            ))),
        }
    }
}

/// Converts tool definitions into one vendor's wire format.
pub trait ToolProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Wire representation of a single tool.
    fn prepare_tool_call(&self, tool: &ToolDefinition) -> Value;

    /// Bind `tools` to `llm`. Fails when the client speaks a different
    /// vendor format than this provider produces.
    fn bind_tools(&self, llm: Arc<dyn ChatClient>, tools: &ToolSet) -> Result<BoundLlm> {
        if llm.provider() != self.kind() {
            return Err(Error::Config(format!(
                "{} tool provider cannot bind a {} client",
                self.kind(),
                llm.provider()
            )));
        }
        let prepared: Vec<Value> = tools
            .definitions()
            .iter()
            .map(|t| self.prepare_tool_call(t))
            .collect();
        debug!(
            "Bound {} tool(s) to {} model {}",
            prepared.len(),
            self.kind(),
            llm.model()
        );
        Ok(BoundLlm::new(llm, prepared))
    }
}

/// `{"type": "function", "function": {name, description, parameters}}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiToolProvider;

impl ToolProvider for OpenAiToolProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn prepare_tool_call(&self, tool: &ToolDefinition) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.schema,
            }
        })
    }
}

/// `{name, description, input_schema}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnthropicToolProvider;

impl ToolProvider for AnthropicToolProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    fn prepare_tool_call(&self, tool: &ToolDefinition) -> Value {
        json!({
            "name": tool.name,
            "description": tool.description,
            "input_schema": tool.schema,
        })
    }
}

/// The tool provider for a vendor.
pub fn tool_provider_for(kind: ProviderKind) -> Box<dyn ToolProvider> {
    match kind {
        ProviderKind::OpenAi => Box::new(OpenAiToolProvider),
        ProviderKind::Anthropic => Box::new(AnthropicToolProvider),
    }
}

/// Bind `tools` to `llm` using the provider matching the client's vendor.
pub fn bind_tools(llm: Arc<dyn ChatClient>, tools: &ToolSet) -> Result<BoundLlm> {
    tool_provider_for(llm.provider()).bind_tools(llm, tools)
}
