//! System prompt composition.
//!
//! - [`registry`]: name-keyed section renderers ([`SectionRegistry`]) plus
//!   the `{placeholder}` substitution shared by custom text and renderers.
//! - [`sections`]: the default renderers for every known section name.
//! - [`builder`]: reads the YAML section list and produces the prompt text.
//! - [`assembler`]: separator lines and part joining.

pub mod assembler;
pub mod builder;
pub mod registry;
pub mod sections;

pub use assembler::PromptAssembler;
pub use builder::{PromptConfig, PromptInputs, SectionConfig, SystemPromptBuilder, section_header};
pub use registry::{PromptContext, SectionParams, SectionRegistry, fill_placeholders, serialize_value};
