//! Convenience re-exports for building and running the note agent.
//!
//! ```ignore
//! use note_interpreter::prelude::*;
//! ```
//!
//! Vendor clients, retry tuning and the individual section renderers are
//! left out; import those from their modules.

// ── Core types ──────────────────────────────────────────────────────
pub use crate::{ChatCompletion, Error, Message, Result, ToolCall, json_schema_for};

// ── Model and I/O ───────────────────────────────────────────────────
pub use crate::io::{append_memory_points, read_notes_csv, read_user_memory, write_results_csv};
pub use crate::model::{DataEntry, LlmOutput, Note, RunStatus, UNDEFINED, apply_entries};

// ── Configuration ───────────────────────────────────────────────────
pub use crate::config::{Settings, build_client};

// ── Prompt ──────────────────────────────────────────────────────────
pub use crate::prompt::{PromptConfig, PromptInputs, SectionRegistry, SystemPromptBuilder};

// ── Tools ───────────────────────────────────────────────────────────
pub use crate::tools::{SharedContext, ToolDefinition, ToolSet, bind_tools, note_tools};

// ── Agent runtime ───────────────────────────────────────────────────
pub use crate::agent::{
    AgentCore, AgentResponse, ClarificationLoop, CompositeEventHandler, ConsoleHandler,
    EventHandler, LoggingHandler, NoopHandler, ResponseKind, ScriptedInput, StdinInput,
};
pub use crate::api::{ChatClient, ScriptedClient};
