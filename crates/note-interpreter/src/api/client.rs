//! The chat-client seam and the tool-bound handle built on top of it.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::api::retry::{RetryConfig, retry_call};
use crate::error::Result;
use crate::tools::provider::ProviderKind;
use crate::{ChatCompletion, Message};

/// Default completion budget per request.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;
/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f32 = 0.2;

/// Boxed future returned by [`ChatClient::complete`].
pub type ChatFuture<'a> = Pin<Box<dyn Future<Output = Result<ChatCompletion>> + Send + 'a>>;

/// One chat-completion request in provider-neutral form. `tools` are
/// already in the wire shape of the client's provider.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<Value>,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// An LLM chat-completion endpoint.
pub trait ChatClient: Send + Sync {
    /// Tool wire format this client expects.
    fn provider(&self) -> ProviderKind;

    fn model(&self) -> &str;

    fn complete<'a>(&'a self, request: &'a ChatRequest) -> ChatFuture<'a>;
}

/// A chat client with a fixed tool set and generation parameters.
///
/// Created by [`ToolProvider::bind_tools`](crate::tools::provider::ToolProvider::bind_tools).
#[derive(Clone)]
pub struct BoundLlm {
    client: Arc<dyn ChatClient>,
    tools: Vec<Value>,
    max_tokens: u32,
    temperature: f32,
    retry: RetryConfig,
}

impl std::fmt::Debug for BoundLlm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundLlm")
            .field("provider", &self.client.provider())
            .field("model", &self.client.model())
            .field("tools", &self.tools.len())
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl BoundLlm {
    pub(crate) fn new(client: Arc<dyn ChatClient>, tools: Vec<Value>) -> Self {
        Self {
            client,
            tools,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Wire-format tool payloads sent with every request.
    pub fn tools(&self) -> &[Value] {
        &self.tools
    }

    pub fn client(&self) -> &Arc<dyn ChatClient> {
        &self.client
    }

    /// Send `messages` with the bound tools, retrying transient failures.
    pub async fn invoke(&self, messages: &[Message]) -> Result<ChatCompletion> {
        let request = ChatRequest {
            messages: messages.to_vec(),
            tools: self.tools.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };
        debug!(
            "Invoking {} ({}) with {} message(s)",
            self.client.model(),
            self.client.provider(),
            request.messages.len()
        );
        retry_call(&self.retry, || self.client.complete(&request)).await
    }
}
