//! Colored console output for interactive runs.
//!
//! Each kind of output gets its own colored band so a long session stays
//! readable: the system prompt, model replies, tool calls, clarification
//! questions, the final result and the fallback notice.

use std::io::{self, BufRead, Write};

use console::{Style, style};

/// Kind of console band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Banner {
    SystemPrompt,
    LlmResponse,
    ToolCall,
    Clarification,
    FinalOutput,
    Fallback,
}

impl Banner {
    pub fn title(self) -> &'static str {
        match self {
            Banner::SystemPrompt => "SYSTEM PROMPT",
            Banner::LlmResponse => "LLM RESPONSE",
            Banner::ToolCall => "TOOL CALL",
            Banner::Clarification => "CLARIFICATION",
            Banner::FinalOutput => "FINAL OUTPUT",
            Banner::Fallback => "FALLBACK",
        }
    }

    fn style(self) -> Style {
        let base = Style::new().bold();
        match self {
            Banner::SystemPrompt => base.cyan(),
            Banner::LlmResponse => base.yellow(),
            Banner::ToolCall => base.magenta(),
            Banner::Clarification => base.blue(),
            Banner::FinalOutput => base.green(),
            Banner::Fallback => base.red(),
        }
    }
}

const RULE_WIDTH: usize = 60;

/// Format a banner: a colored title rule followed by the body.
pub fn banner(kind: Banner, body: &str) -> String {
    let title = format!(" {} ", kind.title());
    let pad = RULE_WIDTH.saturating_sub(title.len()) / 2;
    let rule = format!("{}{title}{}", "=".repeat(pad), "=".repeat(pad));
    let rule = kind.style().apply_to(rule);
    if body.is_empty() {
        rule.to_string()
    } else {
        format!("{rule}\n{body}")
    }
}

/// Print a banner to stdout.
pub fn print_banner(kind: Banner, body: &str) {
    println!("{}", banner(kind, body));
}

/// Print a line meant for the human user, bypassing the log.
pub fn user_print(text: &str) {
    println!("{text}");
}

/// First `max` characters of `text`, with an ellipsis when cut.
pub fn preview(text: &str, max: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

/// Show `prompt` and read one line from stdin. `None` at end of input.
pub fn prompt_line(prompt: &str) -> Option<String> {
    print!("{} ", style(prompt).bold());
    io::stdout().flush().ok()?;
    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
    }
}
