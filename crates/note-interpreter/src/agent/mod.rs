//! Agent runtime.
//!
//! - [`core::AgentCore`]: history, LLM call and tool dispatch for one
//!   conversation. Start here for free-form chat.
//! - [`clarify::ClarificationLoop`]: the bounded ask/finalize loop that
//!   turns notes into an [`LlmOutput`](crate::model::LlmOutput).
//! - [`events`]: [`EventHandler`] and [`LoopEvent`] for observing a run.
//! - [`input`]: where clarification answers come from.

pub mod clarify;
pub mod core;
pub mod events;
pub mod input;

pub use clarify::{ClarificationLoop, KICKOFF_MESSAGE, NO_ANSWER};
pub use self::core::{
    AgentCore, AgentResponse, AgentState, ResponseKind, ToolDetails, ToolOutputRecord, UserInput,
};
pub use events::{
    CompositeEventHandler, ConsoleHandler, EventHandler, LoggingHandler, LoopEvent, NoopHandler,
};
pub use input::{AnswerMode, HumanInput, NoInput, PlainTextPolicy, ScriptedInput, StdinInput};
