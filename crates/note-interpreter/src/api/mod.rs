//! LLM API layer: the [`ChatClient`](client::ChatClient) seam, concrete
//! vendor clients and retry.
//!
//! - [`client`]: `ChatClient` trait, `ChatRequest`, and the tool-bound
//!   `BoundLlm` handle.
//! - [`openai`] / [`anthropic`]: HTTP clients for each vendor.
//! - [`scripted`]: replaying client for tests and dry runs.
//! - [`retry`]: exponential backoff for transient failures.

pub mod anthropic;
pub mod client;
pub mod openai;
pub mod retry;
pub mod scripted;

pub use anthropic::AnthropicClient;
pub use client::{BoundLlm, ChatClient, ChatFuture, ChatRequest};
pub use openai::OpenAiClient;
pub use retry::RetryConfig;
pub use scripted::ScriptedClient;
