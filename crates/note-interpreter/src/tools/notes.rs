//! The two tools the note agent exposes to the model.
//!
//! - `ask_user`: the model needs clarification before it can interpret.
//! - `finalize_notes`: the model returns the structured interpretation and
//!   any new memory points. This call ends the clarification loop.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{Error, Result};
use crate::json_schema_for;
use crate::model::DataEntry;
use crate::tools::core::{SharedContext, ToolDefinition, ToolSet};

pub const ASK_USER: &str = "ask_user";
pub const FINALIZE_NOTES: &str = "finalize_notes";

/// Shared-context key holding the questions of the latest `ask_user` call.
pub const PENDING_QUESTIONS_KEY: &str = "pending_questions";
/// Shared-context key holding the accepted `finalize_notes` payload.
pub const FINAL_OUTPUT_KEY: &str = "final_output";

/// Arguments for the `ask_user` tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AskUserArgs {
    /// Clarification questions for the user, one per open ambiguity.
    pub questions: Vec<String>,
}

impl AskUserArgs {
    /// Parse and check call arguments. Blank questions are dropped; at least
    /// one question must remain.
    pub fn parse(args: &Value) -> Result<Self> {
        let mut parsed: Self = serde_json::from_value(args.clone())
            .map_err(|e| Error::MalformedToolCall(format!("{ASK_USER}: {e}")))?;
        parsed.questions = parsed
            .questions
            .into_iter()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .collect();
        if parsed.questions.is_empty() {
            return Err(Error::MalformedToolCall(format!(
                "{ASK_USER}: no questions provided"
            )));
        }
        Ok(parsed)
    }
}

/// Arguments for the `finalize_notes` tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FinalizeNotesArgs {
    /// One interpreted entry per note.
    pub entries: Vec<DataEntry>,
    /// New facts about the user worth remembering, as `* ` bullets.
    #[serde(default)]
    pub new_memory_points: Vec<String>,
}

impl FinalizeNotesArgs {
    /// Parse and check call arguments: entries must be non-empty and every
    /// clarity score within range. Values are otherwise kept as given.
    pub fn parse(args: &Value) -> Result<Self> {
        let parsed: Self = serde_json::from_value(args.clone())
            .map_err(|e| Error::MalformedToolCall(format!("{FINALIZE_NOTES}: {e}")))?;
        if parsed.entries.is_empty() {
            return Err(Error::MalformedToolCall(format!(
                "{FINALIZE_NOTES}: entries must not be empty"
            )));
        }
        for entry in &parsed.entries {
            entry
                .validate()
                .map_err(|e| Error::MalformedToolCall(format!("{FINALIZE_NOTES}: {e}")))?;
        }
        Ok(parsed)
    }
}

fn error_value(err: &Error) -> Value {
    json!({ "error": err.to_string() })
}

/// `ask_user` definition. Its function stores the questions under
/// [`PENDING_QUESTIONS_KEY`].
pub fn ask_user_tool() -> ToolDefinition {
    ToolDefinition::new(
        ASK_USER,
        "Ask the user clarification questions when a note is ambiguous, incomplete or \
         contradicts memory. Batch all open questions into one call. Do not ask about \
         anything already answered in memory or earlier clarification.",
        json_schema_for::<AskUserArgs>(),
    )
    .with_function(|args, ctx: &mut SharedContext| match AskUserArgs::parse(args) {
        Ok(parsed) => {
            let count = parsed.questions.len();
            ctx.insert(PENDING_QUESTIONS_KEY, json!(parsed.questions));
            json!({ "status": "questions_recorded", "count": count })
        }
        Err(e) => error_value(&e),
    })
}

/// `finalize_notes` definition. Its function stores the accepted payload
/// under [`FINAL_OUTPUT_KEY`].
pub fn finalize_notes_tool() -> ToolDefinition {
    ToolDefinition::new(
        FINALIZE_NOTES,
        "Return the final interpretation: one entry per note with raw_text, \
         interpreted_text, entity_type, intent and clarity_score (0-100), plus new memory \
         points. Use UNDEFINED for any field you cannot determine.",
        json_schema_for::<FinalizeNotesArgs>(),
    )
    .with_function(
        |args, ctx: &mut SharedContext| match FinalizeNotesArgs::parse(args) {
            Ok(parsed) => {
                let count = parsed.entries.len();
                ctx.insert(FINAL_OUTPUT_KEY, args.clone());
                json!({ "status": "finalized", "entries": count })
            }
            Err(e) => error_value(&e),
        },
    )
}

/// Tool set used by the clarification loop: both tools, with schema
/// validation of arguments.
pub fn note_tools() -> ToolSet {
    ToolSet::new()
        .with(ask_user_tool())
        .with(finalize_notes_tool())
        .with_arg_validation(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry_json(score: i64) -> Value {
        json!({
            "raw_text": "continue plan",
            "interpreted_text": "Continue the weekly plan",
            "entity_type": "task",
            "intent": "@DO",
            "clarity_score": score
        })
    }

    #[test]
    fn ask_user_requires_a_question() {
        assert!(AskUserArgs::parse(&json!({"questions": []})).is_err());
        assert!(AskUserArgs::parse(&json!({"questions": ["  "]})).is_err());
        assert!(AskUserArgs::parse(&json!({})).is_err());

        let parsed = AskUserArgs::parse(&json!({"questions": [" Which plan? ", ""]})).unwrap();
        assert_eq!(parsed.questions, vec!["Which plan?"]);
    }

    #[test]
    fn finalize_accepts_valid_payload_unchanged() {
        let args = json!({"entries": [entry_json(85)], "new_memory_points": ["* x"]});
        let parsed = FinalizeNotesArgs::parse(&args).unwrap();
        assert_eq!(parsed.entries[0].clarity_score, 85);
        assert_eq!(parsed.entries[0].intent, "@DO");
        assert_eq!(parsed.new_memory_points, vec!["* x"]);
    }

    #[test]
    fn finalize_rejects_bad_payloads() {
        assert!(FinalizeNotesArgs::parse(&json!({"entries": []})).is_err());
        assert!(FinalizeNotesArgs::parse(&json!({"entries": [entry_json(101)]})).is_err());
        assert!(FinalizeNotesArgs::parse(&json!({"entries": [entry_json(-1)]})).is_err());
        assert!(FinalizeNotesArgs::parse(&json!({"entries": [{"raw_text": "x"}]})).is_err());
    }

    #[test]
    fn finalize_accepts_integral_float_scores() {
        let mut entry = entry_json(0);
        entry["clarity_score"] = json!(85.0);
        let parsed = FinalizeNotesArgs::parse(&json!({"entries": [entry]})).unwrap();
        assert_eq!(parsed.entries[0].clarity_score, 85);
    }

    #[test]
    fn finalize_rejects_fractional_and_out_of_range_floats() {
        for score in [json!(85.5), json!(100.5), json!(-1.0), json!(250.0)] {
            let mut entry = entry_json(0);
            entry["clarity_score"] = score.clone();
            let err = FinalizeNotesArgs::parse(&json!({"entries": [entry]})).unwrap_err();
            assert!(matches!(err, Error::MalformedToolCall(_)), "{score}: {err:?}");
        }
    }

    #[test]
    fn finalize_memory_points_default_to_empty() {
        let parsed = FinalizeNotesArgs::parse(&json!({"entries": [entry_json(10)]})).unwrap();
        assert!(parsed.new_memory_points.is_empty());
    }

    #[test]
    fn tool_functions_write_shared_context() {
        let tools = note_tools();
        let mut ctx = SharedContext::new();

        let asked = tools
            .execute(ASK_USER, &json!({"questions": ["Which plan?"]}), &mut ctx)
            .unwrap();
        assert_eq!(asked["count"], 1);
        assert_eq!(ctx.get(PENDING_QUESTIONS_KEY), Some(&json!(["Which plan?"])));

        let args = json!({"entries": [entry_json(70)], "new_memory_points": []});
        let done = tools.execute(FINALIZE_NOTES, &args, &mut ctx).unwrap();
        assert_eq!(done["status"], "finalized");
        assert_eq!(ctx.get(FINAL_OUTPUT_KEY), Some(&args));
    }

    #[test]
    fn schema_rejects_out_of_range_score_before_function_runs() {
        let tools = note_tools();
        let mut ctx = SharedContext::new();
        let result = tools
            .execute(FINALIZE_NOTES, &json!({"entries": [entry_json(150)]}), &mut ctx)
            .unwrap();
        assert!(result.get("error").is_some());
        assert!(!ctx.contains(FINAL_OUTPUT_KEY));
    }

    #[test]
    fn schemas_name_required_fields() {
        let tools = note_tools();
        let finalize = tools.get(FINALIZE_NOTES).unwrap();
        let required = finalize.schema["required"].as_array().unwrap();
        assert!(required.contains(&json!("entries")));
        let ask = tools.get(ASK_USER).unwrap();
        assert_eq!(ask.schema["required"], json!(["questions"]));
    }
}
