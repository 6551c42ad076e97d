//! Events emitted by the clarification loop and the handlers that observe them.
//!
//! | Handler | Use case |
//! |---------|----------|
//! | [`NoopHandler`] | Tests and silent runs |
//! | [`LoggingHandler`] | Structured logging via `tracing` |
//! | [`ConsoleHandler`] | Colored bands on stdout for interactive use |
//! | [`CompositeEventHandler`] | Several handlers in order |

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::model::LlmOutput;
use crate::ui::{self, Banner};

// ── Events ─────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum LoopEvent<'a> {
    /// A round is starting. `round` counts from 1.
    RoundStart { round: u32, max_rounds: u32 },
    /// The freshly built system prompt for this round.
    SystemPrompt(&'a str),
    /// Text the model returned, with or without a tool call.
    LlmResponse(&'a str),
    /// The model called a tool.
    ToolCall { name: &'a str, args: &'a Value },
    /// Questions about to be put to the user.
    Questions(&'a [String]),
    /// The model finalized with a valid payload.
    Finalized(&'a LlmOutput),
    /// Rounds ran out; the output holds placeholders.
    Fallback(&'a LlmOutput),
    /// The model's tool call could not be used. The round is spent.
    Malformed { round: u32, reason: &'a str },
    /// The model call itself failed. The round is spent.
    Error { round: u32, message: &'a str },
}

/// Observer of [`LoopEvent`]s. Handlers never steer the loop.
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: &LoopEvent<'_>) {
        let _ = event;
    }
}

/// Ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHandler;

impl EventHandler for NoopHandler {}

/// Logs events through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn on_event(&self, event: &LoopEvent<'_>) {
        match event {
            LoopEvent::RoundStart { round, max_rounds } => {
                info!("[round {round}/{max_rounds}]");
            }
            LoopEvent::SystemPrompt(prompt) => {
                debug!("System prompt: {} chars", prompt.len());
            }
            LoopEvent::LlmResponse(text) => {
                debug!("LLM text: {}", ui::preview(text, 200));
            }
            LoopEvent::ToolCall { name, args } => {
                debug!("Tool call: {name} {}", ui::preview(&args.to_string(), 200));
            }
            LoopEvent::Questions(questions) => {
                info!("Asking the user {} question(s)", questions.len());
            }
            LoopEvent::Finalized(output) => {
                info!(
                    "Finalized {} entr{} after {} round(s)",
                    output.entries.len(),
                    if output.entries.len() == 1 { "y" } else { "ies" },
                    output.rounds_used
                );
            }
            LoopEvent::Fallback(output) => {
                warn!(
                    "No finalize after {} round(s); returning placeholder entries",
                    output.rounds_used
                );
            }
            LoopEvent::Malformed { round, reason } => {
                warn!("Round {round}: malformed tool call: {reason}");
            }
            LoopEvent::Error { round, message } => {
                warn!("Round {round}: LLM call failed: {message}");
            }
        }
    }
}

/// Prints colored bands for an interactive session.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleHandler {
    show_prompt: bool,
}

impl ConsoleHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also print the full system prompt each round.
    pub fn with_prompt(mut self, show: bool) -> Self {
        self.show_prompt = show;
        self
    }
}

impl EventHandler for ConsoleHandler {
    fn on_event(&self, event: &LoopEvent<'_>) {
        match event {
            LoopEvent::SystemPrompt(prompt) if self.show_prompt => {
                ui::print_banner(Banner::SystemPrompt, prompt);
            }
            LoopEvent::LlmResponse(text) => ui::print_banner(Banner::LlmResponse, text),
            LoopEvent::ToolCall { name, args } => {
                let args = serde_json::to_string_pretty(args).unwrap_or_else(|_| args.to_string());
                ui::print_banner(Banner::ToolCall, &format!("{name}\n{args}"));
            }
            LoopEvent::Questions(questions) => {
                let body = questions
                    .iter()
                    .enumerate()
                    .map(|(i, q)| format!("{}. {q}", i + 1))
                    .collect::<Vec<_>>()
                    .join("\n");
                ui::print_banner(Banner::Clarification, &body);
            }
            LoopEvent::Fallback(output) => ui::print_banner(
                Banner::Fallback,
                &format!(
                    "Clarification incomplete after {} round(s); entries marked UNDEFINED.",
                    output.rounds_used
                ),
            ),
            _ => {}
        }
    }
}

/// Calls each handler in registration order.
#[derive(Default)]
pub struct CompositeEventHandler {
    handlers: Vec<Box<dyn EventHandler>>,
}

impl CompositeEventHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, handler: impl EventHandler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    /// Add `handler` only when `condition` holds.
    pub fn with_if(self, condition: bool, handler: impl EventHandler + 'static) -> Self {
        if condition { self.with(handler) } else { self }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl EventHandler for CompositeEventHandler {
    fn on_event(&self, event: &LoopEvent<'_>) {
        for handler in &self.handlers {
            handler.on_event(event);
        }
    }
}
