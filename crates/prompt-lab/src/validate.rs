//! Field-by-field comparison of a model's output with the expected output.
//!
//! [`validate_output`] checks every expected field against the actual
//! output and reports what is missing, what differs and (in strict mode)
//! what was not asked for. [`validate_llm_reply`] does the same for a raw
//! chat-completion reply whose message content should be a JSON object.
//!
//! ```
//! use prompt_lab::validate::{ValidationOptions, validate_output};
//! use serde_json::json;
//!
//! let actual = json!({"clarity_score": 55, "intent": "@DO"});
//! let expected = json!({"clarity_score": 60, "intent": "@DO"});
//! let opts = ValidationOptions::new().with_tolerance("clarity_score", 10.0);
//!
//! let report = validate_output(
//!     actual.as_object().unwrap(),
//!     expected.as_object().unwrap(),
//!     &opts,
//! );
//! assert!(report.passed());
//! ```

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Custom equality for one field: `(actual, expected) -> matches`.
pub type Comparator = Box<dyn Fn(&Value, &Value) -> bool + Send + Sync>;

// ── Options ────────────────────────────────────────────────────────

#[derive(Default)]
pub struct ValidationOptions {
    /// Fields in the output that were not expected fail validation.
    pub strict: bool,
    /// Missing fields are reported but do not fail validation.
    pub partial: bool,
    /// Fields skipped on both sides.
    pub ignore_fields: Vec<String>,
    /// Report JSON type differences as type mismatches.
    pub type_check: bool,
    comparators: HashMap<String, Comparator>,
}

impl fmt::Debug for ValidationOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut comparators: Vec<&str> = self.comparators.keys().map(String::as_str).collect();
        comparators.sort_unstable();
        f.debug_struct("ValidationOptions")
            .field("strict", &self.strict)
            .field("partial", &self.partial)
            .field("ignore_fields", &self.ignore_fields)
            .field("type_check", &self.type_check)
            .field("comparators", &comparators)
            .finish()
    }
}

impl ValidationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_partial(mut self, partial: bool) -> Self {
        self.partial = partial;
        self
    }

    pub fn with_type_check(mut self, type_check: bool) -> Self {
        self.type_check = type_check;
        self
    }

    pub fn ignore(mut self, field: impl Into<String>) -> Self {
        self.ignore_fields.push(field.into());
        self
    }

    /// Compare `field` with `comparator` instead of equality. Takes
    /// precedence over the type check.
    pub fn with_comparator(
        mut self,
        field: impl Into<String>,
        comparator: impl Fn(&Value, &Value) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.comparators.insert(field.into(), Box::new(comparator));
        self
    }

    /// Accept numbers within `tolerance` of the expected value for `field`.
    pub fn with_tolerance(self, field: impl Into<String>, tolerance: f64) -> Self {
        self.with_comparator(field, move |actual, expected| {
            match (actual.as_f64(), expected.as_f64()) {
                (Some(a), Some(e)) => (a - e).abs() <= tolerance,
                _ => false,
            }
        })
    }

    fn is_ignored(&self, field: &str) -> bool {
        self.ignore_fields.iter().any(|f| f == field)
    }
}

// ── Report ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Passed,
    Failed,
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MismatchReason {
    ValueMismatch,
    /// `expected` and `actual` hold JSON type names.
    TypeMismatch,
    ComparatorFailed,
    /// The reply has no `choices[0].message.content`.
    MissingContent,
    InvalidJson,
    NotAnObject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mismatch {
    pub field: String,
    pub expected: Value,
    pub actual: Value,
    pub reason: MismatchReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub status: ValidationStatus,
    pub missing_fields: Vec<String>,
    pub mismatches: Vec<Mismatch>,
    pub unexpected_fields: Vec<String>,
    /// Nothing missing, nothing different, and (strict) nothing extra.
    /// Unlike `status`, partial mode does not relax this.
    pub full_match: bool,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.status == ValidationStatus::Passed
    }

    /// A failed report carrying a single problem with the whole output.
    fn rejected(mismatch: Mismatch) -> Self {
        Self {
            status: ValidationStatus::Failed,
            missing_fields: Vec::new(),
            mismatches: vec![mismatch],
            unexpected_fields: Vec::new(),
            full_match: false,
        }
    }
}

// ── Comparison ─────────────────────────────────────────────────────

/// JSON type name of `value`. Integers and floats are told apart.
pub fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Equality where `60` and `60.0` are the same number.
fn values_equal(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Number(a), Value::Number(e)) => match (a.as_f64(), e.as_f64()) {
            (Some(a), Some(e)) => a == e,
            _ => a == e,
        },
        (Value::Array(a), Value::Array(e)) => {
            a.len() == e.len() && a.iter().zip(e).all(|(a, e)| values_equal(a, e))
        }
        (Value::Object(a), Value::Object(e)) => {
            a.len() == e.len()
                && a.iter()
                    .all(|(k, a)| e.get(k).is_some_and(|e| values_equal(a, e)))
        }
        _ => actual == expected,
    }
}

/// Validate `output` against `expected`.
///
/// For each expected field, in order: a comparator decides if one is
/// registered; otherwise with `type_check` a differing JSON type is a
/// type mismatch; otherwise the values must be equal.
pub fn validate_output(
    output: &Map<String, Value>,
    expected: &Map<String, Value>,
    opts: &ValidationOptions,
) -> ValidationReport {
    let mut missing_fields = Vec::new();
    let mut mismatches = Vec::new();
    let mut unexpected_fields = Vec::new();

    for (field, expected_value) in expected {
        if opts.is_ignored(field) {
            continue;
        }
        let Some(actual) = output.get(field) else {
            missing_fields.push(field.clone());
            continue;
        };
        let mismatch = |expected: Value, actual: Value, reason| Mismatch {
            field: field.clone(),
            expected,
            actual,
            reason,
        };
        if let Some(comparator) = opts.comparators.get(field) {
            if !comparator(actual, expected_value) {
                mismatches.push(mismatch(
                    expected_value.clone(),
                    actual.clone(),
                    MismatchReason::ComparatorFailed,
                ));
            }
        } else if opts.type_check && json_type(actual) != json_type(expected_value) {
            mismatches.push(mismatch(
                json_type(expected_value).into(),
                json_type(actual).into(),
                MismatchReason::TypeMismatch,
            ));
        } else if !values_equal(actual, expected_value) {
            mismatches.push(mismatch(
                expected_value.clone(),
                actual.clone(),
                MismatchReason::ValueMismatch,
            ));
        }
    }

    if opts.strict {
        unexpected_fields = output
            .keys()
            .filter(|k| !expected.contains_key(*k) && !opts.is_ignored(k))
            .cloned()
            .collect();
    }

    let full_match = missing_fields.is_empty() && mismatches.is_empty() && unexpected_fields.is_empty();
    let passed = (opts.partial || missing_fields.is_empty())
        && mismatches.is_empty()
        && unexpected_fields.is_empty();

    ValidationReport {
        status: if passed {
            ValidationStatus::Passed
        } else {
            ValidationStatus::Failed
        },
        missing_fields,
        mismatches,
        unexpected_fields,
        full_match,
    }
}

/// Validate any JSON value; anything but an object fails outright.
pub fn validate_value(
    output: &Value,
    expected: &Map<String, Value>,
    opts: &ValidationOptions,
) -> ValidationReport {
    match output.as_object() {
        Some(map) => validate_output(map, expected, opts),
        None => ValidationReport::rejected(Mismatch {
            field: String::new(),
            expected: "object".into(),
            actual: json_type(output).into(),
            reason: MismatchReason::NotAnObject,
        }),
    }
}

/// Validate a raw OpenAI-style chat completion.
///
/// The text at `choices[0].message.content` is parsed as a JSON object and
/// compared with `expected`. A reply without content, or whose content is
/// not a JSON object, gives a failed report describing why.
pub fn validate_llm_reply(
    reply: &Value,
    expected: &Map<String, Value>,
    opts: &ValidationOptions,
) -> ValidationReport {
    let Some(content) = reply
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
    else {
        return ValidationReport::rejected(Mismatch {
            field: "choices".into(),
            expected: "string".into(),
            actual: reply.pointer("/choices/0/message/content").cloned().unwrap_or(Value::Null),
            reason: MismatchReason::MissingContent,
        });
    };
    match serde_json::from_str::<Value>(content.trim()) {
        Ok(Value::Object(parsed)) => validate_output(&parsed, expected, opts),
        _ => ValidationReport::rejected(Mismatch {
            field: "content".into(),
            expected: "object".into(),
            actual: Value::String(content.to_string()),
            reason: MismatchReason::InvalidJson,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn identical_outputs_match() {
        let out = obj(json!({"clarity_score": 50, "interpreted_text": "BUY MILK"}));
        let report = validate_output(&out, &out.clone(), &ValidationOptions::new());
        assert!(report.passed());
        assert!(report.full_match);
        assert!(report.mismatches.is_empty());
    }

    #[test]
    fn missing_and_different_fields_are_reported() {
        let out = obj(json!({"clarity_score": 40}));
        let expected = obj(json!({"clarity_score": 50, "intent": "@DO"}));
        let report = validate_output(&out, &expected, &ValidationOptions::new());
        assert_eq!(report.status, ValidationStatus::Failed);
        assert_eq!(report.missing_fields, vec!["intent"]);
        assert_eq!(report.mismatches.len(), 1);
        assert_eq!(report.mismatches[0].field, "clarity_score");
        assert_eq!(report.mismatches[0].reason, MismatchReason::ValueMismatch);
        assert_eq!(report.mismatches[0].actual, json!(40));
    }

    #[test]
    fn integer_and_float_compare_equal_without_type_check() {
        let out = obj(json!({"score": 60.0}));
        let expected = obj(json!({"score": 60}));
        assert!(validate_output(&out, &expected, &ValidationOptions::new()).passed());

        let report = validate_output(&out, &expected, &ValidationOptions::new().with_type_check(true));
        assert_eq!(report.mismatches[0].reason, MismatchReason::TypeMismatch);
        assert_eq!(report.mismatches[0].expected, json!("integer"));
        assert_eq!(report.mismatches[0].actual, json!("number"));
    }

    #[test]
    fn strict_mode_flags_extra_fields() {
        let out = obj(json!({"a": 1, "b": 2, "debug": true}));
        let expected = obj(json!({"a": 1, "b": 2}));
        assert!(validate_output(&out, &expected, &ValidationOptions::new()).passed());

        let strict = ValidationOptions::new().with_strict(true);
        let report = validate_output(&out, &expected, &strict);
        assert_eq!(report.unexpected_fields, vec!["debug"]);
        assert!(!report.passed());

        let report = validate_output(&out, &expected, &strict.ignore("debug"));
        assert!(report.passed());
    }

    #[test]
    fn partial_mode_tolerates_missing_fields() {
        let out = obj(json!({"a": 1}));
        let expected = obj(json!({"a": 1, "b": 2}));
        let report = validate_output(&out, &expected, &ValidationOptions::new().with_partial(true));
        assert!(report.passed());
        assert!(!report.full_match);
        assert_eq!(report.missing_fields, vec!["b"]);

        let wrong = obj(json!({"a": 3}));
        let report = validate_output(&wrong, &expected, &ValidationOptions::new().with_partial(true));
        assert!(!report.passed());
    }

    #[test]
    fn comparator_overrides_type_check() {
        let out = obj(json!({"clarity_score": 55.5}));
        let expected = obj(json!({"clarity_score": 60}));
        let opts = ValidationOptions::new()
            .with_type_check(true)
            .with_tolerance("clarity_score", 5.0);
        assert!(validate_output(&out, &expected, &opts).passed());

        let far = obj(json!({"clarity_score": 20}));
        let report = validate_output(&far, &expected, &opts);
        assert_eq!(report.mismatches[0].reason, MismatchReason::ComparatorFailed);
    }

    #[test]
    fn ignored_fields_are_skipped() {
        let out = obj(json!({"clarification_question": "What?"}));
        let expected = obj(json!({"clarification_question": "Which?"}));
        let opts = ValidationOptions::new().ignore("clarification_question");
        assert!(validate_output(&out, &expected, &opts).full_match);
    }

    #[test]
    fn llm_reply_content_is_parsed() {
        let reply = json!({
            "choices": [{"message": {"content": "{\"intent\": \"@DO\", \"clarity_score\": 80}"}}]
        });
        let expected = obj(json!({"intent": "@DO"}));
        assert!(validate_llm_reply(&reply, &expected, &ValidationOptions::new()).passed());
    }

    #[test]
    fn non_json_reply_fails_with_invalid_json() {
        let reply = json!({"choices": [{"message": {"content": "Sure! Here you go."}}]});
        let report = validate_llm_reply(&reply, &Map::new(), &ValidationOptions::new());
        assert!(!report.passed());
        assert_eq!(report.mismatches[0].reason, MismatchReason::InvalidJson);
        assert_eq!(report.mismatches[0].actual, json!("Sure! Here you go."));

        let serialized = serde_json::to_value(&report).unwrap();
        assert_eq!(serialized["mismatches"][0]["reason"], "invalid_json");
        assert_eq!(serialized["status"], "failed");
    }

    #[test]
    fn reply_without_choices_fails() {
        let report = validate_llm_reply(&json!({"choices": []}), &Map::new(), &ValidationOptions::new());
        assert_eq!(report.mismatches[0].reason, MismatchReason::MissingContent);
    }

    #[test]
    fn non_object_output_is_rejected() {
        let report = validate_value(&json!([1, 2]), &Map::new(), &ValidationOptions::new());
        assert_eq!(report.mismatches[0].reason, MismatchReason::NotAnObject);
        assert_eq!(report.mismatches[0].actual, json!("array"));
    }
}
