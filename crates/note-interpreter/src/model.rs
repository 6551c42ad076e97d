//! Data model shared by the agent, the tools and the I/O glue.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Sentinel written into every classification field of a fallback entry.
pub const UNDEFINED: &str = "UNDEFINED";

/// Upper bound of [`DataEntry::clarity_score`].
pub const MAX_CLARITY_SCORE: u32 = 100;

// ── Notes ──────────────────────────────────────────────────────────

/// One raw input note and whatever interpretation has been attached to it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub raw_input: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Note {
    pub fn new(raw_input: impl Into<String>) -> Self {
        Self {
            raw_input: raw_input.into(),
            metadata: Map::new(),
        }
    }

    /// Record an interpretation result on this note. Earlier keys of the
    /// same name are overwritten; nothing else is removed.
    pub fn apply_entry(&mut self, entry: &DataEntry) {
        self.metadata.insert(
            "interpreted_text".into(),
            Value::String(entry.interpreted_text.clone()),
        );
        self.metadata
            .insert("clarity_score".into(), Value::from(entry.clarity_score));
        self.metadata
            .insert("entity_type".into(), Value::String(entry.entity_type.clone()));
        self.metadata
            .insert("intent".into(), Value::String(entry.intent.clone()));
    }

    /// String form of a metadata field, empty when absent.
    pub fn field(&self, key: &str) -> String {
        match self.metadata.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }
}

/// Attach each entry to the note whose raw text it interprets.
///
/// Entries are matched by `raw_text`; entries that match nothing are paired
/// positionally with notes that are still uninterpreted.
pub fn apply_entries(notes: &mut [Note], entries: &[DataEntry]) {
    let mut unmatched = Vec::new();
    for entry in entries {
        match notes
            .iter_mut()
            .find(|n| n.raw_input == entry.raw_text && !n.metadata.contains_key("interpreted_text"))
        {
            Some(note) => note.apply_entry(entry),
            None => unmatched.push(entry),
        }
    }
    let mut free = notes
        .iter_mut()
        .filter(|n| !n.metadata.contains_key("interpreted_text"));
    for entry in unmatched {
        match free.next() {
            Some(note) => note.apply_entry(entry),
            None => break,
        }
    }
}

// ── Entries ────────────────────────────────────────────────────────

/// One interpreted note, as returned through the `finalize_notes` tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DataEntry {
    /// The note exactly as the user wrote it.
    pub raw_text: String,
    /// Clarified, enriched meaning of the note.
    pub interpreted_text: String,
    /// Entity type from the classification taxonomy, or `UNDEFINED`.
    pub entity_type: String,
    /// Intent from the classification taxonomy, or `UNDEFINED`.
    pub intent: String,
    /// Confidence in the interpretation, 0 to 100.
    #[schemars(range(min = 0, max = 100))]
    #[serde(deserialize_with = "clarity_score_from_number")]
    pub clarity_score: u32,
}

/// Accept any JSON number with an integral value in `0..=100`, so `85.0`
/// reads as 85. Fractional and out-of-range values are rejected.
fn clarity_score_from_number<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error as _;

    let number = serde_json::Number::deserialize(deserializer)?;
    let score = if let Some(n) = number.as_u64() {
        Some(n)
    } else if let Some(f) = number.as_f64()
        && f.fract() == 0.0
        && (0.0..=f64::from(MAX_CLARITY_SCORE)).contains(&f)
    {
        // Integral and bounded, so the cast is exact.
        Some(f as u64)
    } else {
        None
    };
    score
        .filter(|n| *n <= u64::from(MAX_CLARITY_SCORE))
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| {
            D::Error::custom(format!(
                "clarity_score must be an integer from 0 to {MAX_CLARITY_SCORE}, got {number}"
            ))
        })
}

impl DataEntry {
    /// Placeholder produced when clarification runs out of rounds.
    pub fn undefined(raw_text: impl Into<String>) -> Self {
        Self {
            raw_text: raw_text.into(),
            interpreted_text: UNDEFINED.into(),
            entity_type: UNDEFINED.into(),
            intent: UNDEFINED.into(),
            clarity_score: 0,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.clarity_score > MAX_CLARITY_SCORE {
            return Err(format!(
                "clarity_score {} for '{}' is outside 0..=100",
                self.clarity_score, self.raw_text
            ));
        }
        Ok(())
    }
}

/// Field names and descriptions of [`DataEntry`], used when rendering the
/// output-schema prompt section without an external schema file.
pub const DATA_ENTRY_FIELDS: &[(&str, &str, &str)] = &[
    ("raw_text", "string", "The original note exactly as written."),
    (
        "interpreted_text",
        "string",
        "Clarified meaning of the note, enriched with memory and answers.",
    ),
    (
        "entity_type",
        "string",
        "One of the configured entity types, or UNDEFINED.",
    ),
    ("intent", "string", "One of the configured intents, or UNDEFINED."),
    (
        "clarity_score",
        "integer",
        "Confidence in the interpretation, from 0 to 100.",
    ),
];

// ── Clarification ──────────────────────────────────────────────────

/// One unit of accumulated clarification. Records are append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClarificationRecord {
    /// All questions of one round answered by a single free-form response.
    Batch {
        questions: Vec<String>,
        response: String,
    },
    /// A single question and its answer.
    Pair { question: String, answer: String },
}

/// Audit entry for a tool call the model made.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub tool: String,
    pub args: Value,
}

// ── Run output ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// The model called `finalize_notes` with a valid payload.
    Finalized,
    /// Rounds ran out; entries are `UNDEFINED` placeholders.
    Fallback,
}

/// Terminal artifact of one agent run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmOutput {
    pub entries: Vec<DataEntry>,
    pub new_memory_points: Vec<String>,
    pub tool_calls: Vec<ToolCallRecord>,
    pub status: RunStatus,
    pub rounds_used: u32,
    #[serde(default)]
    pub clarifications: Vec<ClarificationRecord>,
}

impl LlmOutput {
    /// Placeholder output: one `UNDEFINED` entry per note (at least one) and
    /// a memory point recording the incomplete clarification.
    pub fn fallback(notes: &[String], rounds_used: u32) -> Self {
        let mut entries: Vec<DataEntry> = notes.iter().map(DataEntry::undefined).collect();
        if entries.is_empty() {
            entries.push(DataEntry::undefined(""));
        }
        Self {
            entries,
            new_memory_points: vec![format!(
                "* Clarification incomplete after {rounds_used} round(s); notes need manual review."
            )],
            tool_calls: Vec::new(),
            status: RunStatus::Fallback,
            rounds_used,
            clarifications: Vec::new(),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.status == RunStatus::Fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(raw: &str, score: u32) -> DataEntry {
        DataEntry {
            raw_text: raw.into(),
            interpreted_text: format!("{raw} (interpreted)"),
            entity_type: "task".into(),
            intent: "@DO".into(),
            clarity_score: score,
        }
    }

    #[test]
    fn fallback_has_one_entry_per_note() {
        let notes = vec!["call mom".to_string(), "buy milk".to_string()];
        let out = LlmOutput::fallback(&notes, 2);
        assert_eq!(out.entries.len(), 2);
        assert!(out.is_fallback());
        for (e, n) in out.entries.iter().zip(&notes) {
            assert_eq!(&e.raw_text, n);
            assert_eq!(e.entity_type, UNDEFINED);
            assert_eq!(e.intent, UNDEFINED);
            assert_eq!(e.interpreted_text, UNDEFINED);
            assert_eq!(e.clarity_score, 0);
        }
        assert_eq!(out.new_memory_points.len(), 1);
    }

    #[test]
    fn fallback_never_empty() {
        let out = LlmOutput::fallback(&[], 0);
        assert_eq!(out.entries.len(), 1);
        assert_eq!(out.entries[0].raw_text, "");
    }

    #[test]
    fn clarity_score_bounds() {
        assert!(entry("a", 0).validate().is_ok());
        assert!(entry("a", 100).validate().is_ok());
        assert!(entry("a", 101).validate().is_err());
    }

    #[test]
    fn clarification_record_shapes() {
        let batch: ClarificationRecord =
            serde_json::from_value(serde_json::json!({"questions": ["q1"], "response": "r"}))
                .unwrap();
        assert!(matches!(batch, ClarificationRecord::Batch { .. }));

        let pair: ClarificationRecord =
            serde_json::from_value(serde_json::json!({"question": "q", "answer": "a"})).unwrap();
        assert!(matches!(pair, ClarificationRecord::Pair { .. }));
    }

    #[test]
    fn apply_entries_matches_by_raw_text() {
        let mut notes = vec![Note::new("first"), Note::new("second")];
        apply_entries(&mut notes, &[entry("second", 80), entry("unknown", 10)]);
        assert_eq!(notes[1].field("clarity_score"), "80");
        assert_eq!(notes[0].field("interpreted_text"), "unknown (interpreted)");
    }

    #[test]
    fn note_field_defaults_to_empty() {
        let note = Note::new("x");
        assert_eq!(note.field("intent"), "");
    }
}
