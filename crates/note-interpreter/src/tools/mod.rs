//! Tool abstractions for the note agent.
//!
//! - [`core`]: [`ToolDefinition`], [`ToolSet`] dispatch and argument
//!   validation, [`SharedContext`].
//! - [`provider`]: [`ToolProvider`] implementations that turn definitions
//!   into OpenAI or Anthropic wire format and bind them to a client.
//! - [`notes`]: the `ask_user` and `finalize_notes` tools.

pub mod core;
pub mod notes;
pub mod provider;

pub use self::core::{ExportMeta, SharedContext, ToolDefinition, ToolFn, ToolSet};
pub use notes::{ASK_USER, AskUserArgs, FINALIZE_NOTES, FinalizeNotesArgs, note_tools};
pub use provider::{
    AnthropicToolProvider, OpenAiToolProvider, ProviderKind, ToolProvider, bind_tools,
    tool_provider_for,
};
