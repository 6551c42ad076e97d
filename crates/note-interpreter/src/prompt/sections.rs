//! Default section renderers.
//!
//! Every renderer is a plain function of `(params, context)`. Text-only
//! sections hold the standing instructions for the note agent; data-driven
//! sections (classification, scoring, parameters, input context) render the
//! caller's YAML documents and run state.

use serde_json::{Map, Value};

use crate::io::read_yaml;
use crate::model::{ClarificationRecord, DATA_ENTRY_FIELDS, UNDEFINED};
use crate::prompt::registry::{PromptContext, SectionParams, SectionRegistry};
use crate::tools::notes::note_tools;

type SectionResult = Result<String, String>;

impl SectionRegistry {
    /// A registry with every built-in section.
    pub fn with_default_sections() -> Self {
        let mut registry = Self::new();
        registry.register_default_sections();
        registry
    }

    /// Register every built-in section, replacing same-named entries.
    pub fn register_default_sections(&mut self) -> &mut Self {
        self.register("intro", intro)
            .register("goals", goals)
            .register("output_schema_and_meanings", output_schema_and_meanings)
            .register("classification", classification)
            .register("scoring_guidelines", scoring_guidelines)
            .register("parameter_explanations", parameter_explanations)
            .register("output_validation_rules", output_validation_rules)
            .register("tool_json_schema", tool_json_schema)
            .register("tool_behavior_summary", tool_behavior_summary)
            .register("communication_strategy", custom_text_only)
            .register("constraints", custom_text_only)
            .register("reasoning_style", custom_text_only)
            .register("meta_behavior", custom_text_only)
            .register("context_usage", context_usage)
            .register("clarification_protocol", clarification_protocol)
            .register("memory_update", memory_update)
            .register("memory_point_examples", memory_point_examples)
            .register("example_output", example_output)
            .register("input_context", input_context)
            .register("finalization_protocol", finalization_protocol)
            .register("custom_section", custom_text_only)
    }
}

// ── Helpers ────────────────────────────────────────────────────────

fn param_str<'a>(params: &'a SectionParams, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Scalar rendering used inside bullet lists.
fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "(none)".to_string(),
        Value::Array(items) => items.iter().map(scalar).collect::<Vec<_>>().join(", "),
        other => other.to_string(),
    }
}

/// Names from a taxonomy list. Items may be plain strings or maps with a
/// `name` and optional `description`.
fn taxonomy_names(list: Option<&Value>) -> Vec<String> {
    let Some(Value::Array(items)) = list else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.clone()),
            Value::Object(map) => {
                let name = map.get("name").and_then(Value::as_str)?;
                match map.get("description").and_then(Value::as_str) {
                    Some(desc) => Some(format!("{name} ({desc})")),
                    None => Some(name.to_string()),
                }
            }
            _ => None,
        })
        .collect()
}

fn as_object(value: &Value) -> Option<&Map<String, Value>> {
    value.as_object().filter(|m| !m.is_empty())
}

// ── Static instruction sections ────────────────────────────────────

fn intro(params: &SectionParams, _ctx: &PromptContext) -> SectionResult {
    if let Some(text) = param_str(params, "custom_text") {
        return Ok(text.to_string());
    }
    Ok("You are a personal note interpretation assistant. The user writes short, \
        often ambiguous notes. Your job is to turn each note into a clear, structured \
        entry, using what you know about the user and asking for clarification only \
        when it is genuinely needed."
        .to_string())
}

fn goals(_params: &SectionParams, _ctx: &PromptContext) -> SectionResult {
    Ok([
        "- Interpret every note in the input context; none may be skipped.",
        "- Classify each note with exactly one entity type and one intent from the taxonomy.",
        "- Score how clear each interpretation is on a 0-100 scale.",
        "- Ask the user only about ambiguities that memory and earlier answers cannot resolve.",
        "- Record durable new facts about the user as memory points.",
    ]
    .join("\n"))
}

fn output_validation_rules(_params: &SectionParams, _ctx: &PromptContext) -> SectionResult {
    Ok(format!(
        "- Return exactly one entry per input note, in input order.\n\
         - `raw_text` must repeat the note verbatim.\n\
         - `clarity_score` must be an integer between 0 and 100.\n\
         - `entity_type` and `intent` must come from the taxonomy, or be `{UNDEFINED}`.\n\
         - Never return an empty `entries` list."
    ))
}

fn tool_behavior_summary(_params: &SectionParams, _ctx: &PromptContext) -> SectionResult {
    Ok("- `ask_user`: pass every open question in one call. The answers arrive in the \
        next prompt under the clarification history.\n\
        - `finalize_notes`: call once, when every note is interpreted. This ends the \
        session.\n\
        - Always answer through one of these tools. Plain text replies are treated as \
        questions to the user."
        .to_string())
}

fn context_usage(_params: &SectionParams, _ctx: &PromptContext) -> SectionResult {
    Ok("Read the user memory before interpreting anything. Memory and earlier \
        clarification answers take precedence over guesses. Resolve references such as \
        names, projects and places against memory first; ask only about what remains \
        unresolved."
        .to_string())
}

fn clarification_protocol(params: &SectionParams, _ctx: &PromptContext) -> SectionResult {
    let max_questions = params
        .get("max_questions")
        .and_then(Value::as_u64)
        .unwrap_or(3);
    Ok(format!(
        "- Ask at most {max_questions} question(s) per round, each about one concrete ambiguity.\n\
         - Never repeat a question that already has an answer in the clarification history.\n\
         - If the user's answer does not resolve a note, lower its clarity score instead \
         of asking again."
    ))
}

fn memory_update(_params: &SectionParams, _ctx: &PromptContext) -> SectionResult {
    Ok("Memory is append-only. Add new memory points for stable facts learned from the \
        notes or the user's answers (people, projects, routines, preferences). Never \
        restate, edit or contradict an existing memory point; if something changed, add \
        a new point describing the change. Each point is a single line starting with `* `."
        .to_string())
}

fn memory_point_examples(_params: &SectionParams, _ctx: &PromptContext) -> SectionResult {
    Ok([
        "* Anna is the user's sister.",
        "* \"The plan\" refers to the weekly running plan.",
        "* The user prefers grocery runs on Saturday mornings.",
    ]
    .join("\n"))
}

fn example_output(_params: &SectionParams, _ctx: &PromptContext) -> SectionResult {
    let example = serde_json::json!({
        "entries": [{
            "raw_text": "call anna re bday",
            "interpreted_text": "Call Anna (sister) about her birthday plans.",
            "entity_type": "task",
            "intent": "@DO",
            "clarity_score": 85
        }],
        "new_memory_points": ["* Anna's birthday is coming up."]
    });
    serde_json::to_string_pretty(&example)
        .map(|json| format!("Example `finalize_notes` arguments:\n{json}"))
        .map_err(|e| e.to_string())
}

fn finalization_protocol(_params: &SectionParams, _ctx: &PromptContext) -> SectionResult {
    Ok(format!(
        "When every note is interpreted, call `finalize_notes`. If a field still cannot be \
         determined after clarification, set it to `{UNDEFINED}` and give a low clarity \
         score. Do not call `finalize_notes` before the open questions are answered unless \
         the remaining ambiguity cannot be resolved by the user."
    ))
}

/// Sections whose whole content is configured text.
fn custom_text_only(params: &SectionParams, _ctx: &PromptContext) -> SectionResult {
    Ok(param_str(params, "custom_text")
        .or_else(|| param_str(params, "text"))
        .unwrap_or_default()
        .to_string())
}

// ── Data-driven sections ───────────────────────────────────────────

fn output_schema_and_meanings(params: &SectionParams, ctx: &PromptContext) -> SectionResult {
    let schema = match param_str(params, "schema_file") {
        Some(path) => read_yaml(path).map_err(|e| e.to_string())?,
        None => ctx.schema.clone(),
    };

    let fields = schema
        .get("fields")
        .and_then(as_object)
        .or_else(|| schema.get("DataEntry").and_then(as_object));

    let mut lines = vec!["Each entry has these fields:".to_string()];
    match fields {
        Some(fields) => {
            for (name, spec) in fields {
                let line = match spec {
                    Value::Object(spec) => {
                        let ty = spec.get("type").map(scalar).unwrap_or_else(|| "any".into());
                        let desc = spec.get("description").map(scalar).unwrap_or_default();
                        format!("- `{name}` ({ty}): {desc}")
                    }
                    other => format!("- `{name}`: {}", scalar(other)),
                };
                lines.push(line.trim_end().to_string());
            }
        }
        None => {
            for (name, ty, desc) in DATA_ENTRY_FIELDS {
                lines.push(format!("- `{name}` ({ty}): {desc}"));
            }
        }
    }
    Ok(lines.join("\n"))
}

fn classification(_params: &SectionParams, ctx: &PromptContext) -> SectionResult {
    let config = &ctx.classification_config;
    let entity_types = taxonomy_names(config.get("entity_types"));
    let intents = taxonomy_names(config.get("intents"));
    if entity_types.is_empty() && intents.is_empty() {
        return Ok(format!(
            "No classification taxonomy is configured. Use `{UNDEFINED}` for entity_type and intent."
        ));
    }
    let list = |items: &[String]| {
        if items.is_empty() {
            UNDEFINED.to_string()
        } else {
            items.join(", ")
        }
    };
    Ok(format!(
        "**Entity Types:** {}\n**Intents:** {}",
        list(&entity_types),
        list(&intents)
    ))
}

fn scoring_guidelines(_params: &SectionParams, ctx: &PromptContext) -> SectionResult {
    let Some(metrics) = as_object(&ctx.scoring_metrics) else {
        return Ok("Score each interpretation from 0 (unintelligible) to 100 (unambiguous).".into());
    };

    let mut lines = Vec::new();
    let mut triggers = Vec::new();
    for (metric, spec) in metrics {
        let range = spec.get("range").map(scalar).unwrap_or_else(|| "0-100".into());
        let desc = spec.get("description").map(scalar).unwrap_or_default();
        lines.push(format!("- **{metric}** ({range}): {desc}").trim_end().to_string());

        let threshold = ctx
            .parameters
            .get(format!("{metric}_threshold"))
            .map(|p| p.get("value").unwrap_or(p))
            .filter(|v| !v.is_null());
        if let Some(threshold) = threshold {
            let direction = spec
                .get("clarification_trigger")
                .and_then(Value::as_str)
                .unwrap_or("below");
            triggers.push(format!(
                "- Ask for clarification when {metric} is {direction} {}.",
                scalar(threshold)
            ));
        }
    }
    if !triggers.is_empty() {
        lines.push(String::new());
        lines.push("Clarification triggers:".into());
        lines.extend(triggers);
    }
    Ok(lines.join("\n"))
}

fn parameter_explanations(_params: &SectionParams, ctx: &PromptContext) -> SectionResult {
    let Some(parameters) = as_object(&ctx.parameters) else {
        return Ok(String::new());
    };
    let lines: Vec<String> = parameters
        .iter()
        .map(|(name, spec)| match spec {
            Value::Object(spec) if spec.contains_key("value") => {
                let value = spec.get("value").map(scalar).unwrap_or_default();
                match spec.get("description").and_then(Value::as_str) {
                    Some(desc) => format!("- `{name}` = {value} ({desc})"),
                    None => format!("- `{name}` = {value}"),
                }
            }
            other => format!("- `{name}` = {}", scalar(other)),
        })
        .collect();
    Ok(lines.join("\n"))
}

fn tool_json_schema(_params: &SectionParams, _ctx: &PromptContext) -> SectionResult {
    let tools: Vec<Value> = note_tools()
        .definitions()
        .iter()
        .map(|t| t.summary_json())
        .collect();
    serde_json::to_string_pretty(&tools)
        .map(|json| format!("Available tools:\n{json}"))
        .map_err(|e| e.to_string())
}

fn input_context(_params: &SectionParams, ctx: &PromptContext) -> SectionResult {
    let mut out = vec!["**User memory:**".to_string()];
    if ctx.memory.is_empty() {
        out.push("(none)".into());
    } else {
        for m in &ctx.memory {
            let m = m.trim();
            out.push(format!("* {}", m.strip_prefix("* ").unwrap_or(m)));
        }
    }

    out.push(String::new());
    out.push("**Notes to interpret:**".into());
    if ctx.notes.is_empty() {
        out.push("(none)".into());
    } else {
        for (i, note) in ctx.notes.iter().enumerate() {
            out.push(format!("{}. {note}", i + 1));
        }
    }

    let records = ctx.clarification_records();
    if !records.is_empty() {
        out.push(String::new());
        out.push("**Clarification so far:**".into());
        let mut batch_no = 0;
        for record in &records {
            match record {
                ClarificationRecord::Batch {
                    questions,
                    response,
                } => {
                    batch_no += 1;
                    out.push(format!("Batch {batch_no}:"));
                    for (i, q) in questions.iter().enumerate() {
                        out.push(format!("Q{}: {q}", i + 1));
                    }
                    out.push(format!("User response: {response}"));
                }
                ClarificationRecord::Pair { question, answer } => {
                    out.push(format!("Q: {question}"));
                    out.push(format!("A: {answer}"));
                }
            }
        }
    }
    Ok(out.join("\n"))
}
