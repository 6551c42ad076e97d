//! Deterministic in-process chat client.
//!
//! [`ScriptedClient`] replays queued completions in order and records every
//! request it receives. Tests and offline prompt experiments use it in place
//! of a real endpoint.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use crate::api::client::{ChatClient, ChatFuture, ChatRequest};
use crate::error::{Error, Result};
use crate::tools::provider::ProviderKind;
use crate::ChatCompletion;

/// A chat client that answers from a script.
///
/// # Example
///
/// ```
/// use note_interpreter::ChatCompletion;
/// use note_interpreter::api::scripted::ScriptedClient;
///
/// let client = ScriptedClient::new()
///     .then_reply(ChatCompletion::text("first"))
///     .always(ChatCompletion::text("again"));
/// assert_eq!(client.remaining(), 1);
/// ```
pub struct ScriptedClient {
    provider: ProviderKind,
    model: String,
    queue: Mutex<VecDeque<Result<ChatCompletion>>>,
    repeat: Option<ChatCompletion>,
    requests: Mutex<Vec<ChatRequest>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Default for ScriptedClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self {
            provider: ProviderKind::OpenAi,
            model: "scripted".to_string(),
            queue: Mutex::new(VecDeque::new()),
            repeat: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Which tool wire format this client claims to speak.
    pub fn with_provider(mut self, provider: ProviderKind) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Queue a completion.
    pub fn then_reply(self, completion: ChatCompletion) -> Self {
        lock(&self.queue).push_back(Ok(completion));
        self
    }

    /// Queue a failure.
    pub fn then_error(self, error: Error) -> Self {
        lock(&self.queue).push_back(Err(error));
        self
    }

    /// Completion returned whenever the queue is empty.
    pub fn always(mut self, completion: ChatCompletion) -> Self {
        self.repeat = Some(completion);
        self
    }

    /// Queued responses not yet consumed.
    pub fn remaining(&self) -> usize {
        lock(&self.queue).len()
    }

    /// Every request received so far, oldest first.
    pub fn requests(&self) -> Vec<ChatRequest> {
        lock(&self.requests).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.requests).len()
    }

    fn next(&self, request: &ChatRequest) -> Result<ChatCompletion> {
        lock(&self.requests).push(request.clone());
        let queued = lock(&self.queue).pop_front();
        match queued {
            Some(result) => result,
            None => self
                .repeat
                .clone()
                .ok_or_else(|| Error::Llm("scripted client has no more responses".into())),
        }
    }
}

impl ChatClient for ScriptedClient {
    fn provider(&self) -> ProviderKind {
        self.provider
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn complete<'a>(&'a self, request: &'a ChatRequest) -> ChatFuture<'a> {
        debug!(
            "Scripted completion #{} ({} message(s))",
            self.call_count() + 1,
            request.messages.len()
        );
        let result = self.next(request);
        Box::pin(async move { result })
    }
}
