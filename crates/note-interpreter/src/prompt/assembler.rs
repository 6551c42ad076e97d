//! Low-level prompt assembly.
//!
//! [`PromptAssembler`] collects rendered parts and joins them with blank
//! lines. Each configured section contributes a separator line followed by
//! its body; empty bodies are dropped.

/// Width-independent decoration around a section header.
const SEPARATOR_DASHES: &str = "------------";

/// Format the separator line shown above a section.
pub fn separator_line(header: &str) -> String {
    format!("{SEPARATOR_DASHES} {header} {SEPARATOR_DASHES}")
}

/// Builder for multi-section system prompts.
///
/// # Example
///
/// ```
/// use note_interpreter::prompt::PromptAssembler;
///
/// let prompt = PromptAssembler::new()
///     .section("GOALS / OBJECTIVES", "Interpret every note.")
///     .section("EXAMPLES", "")
///     .raw("Trailing text.")
///     .build();
///
/// assert!(prompt.starts_with("------------ GOALS / OBJECTIVES ------------\n\nInterpret"));
/// assert!(prompt.contains("------------ EXAMPLES ------------\n\nTrailing text."));
/// ```
#[derive(Debug, Default, Clone)]
pub struct PromptAssembler {
    parts: Vec<String>,
}

impl PromptAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a separator for `header` and then the body.
    ///
    /// The separator is kept even when the body is empty so the section
    /// layout stays visible in the prompt.
    pub fn section(mut self, header: &str, content: impl Into<String>) -> Self {
        self.parts.push(separator_line(header));
        self.raw(content)
    }

    /// Append raw text without a separator. Skipped if empty.
    pub fn raw(mut self, content: impl Into<String>) -> Self {
        let content = content.into();
        if !content.trim().is_empty() {
            self.parts.push(content);
        }
        self
    }

    /// Number of non-empty parts collected so far.
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Join all parts with blank lines.
    pub fn build(self) -> String {
        self.parts.join("\n\n")
    }
}
