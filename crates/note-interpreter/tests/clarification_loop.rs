//! End-to-end runs of the clarification loop against a scripted model and
//! scripted user.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use note_interpreter::agent::{ClarificationLoop, NoInput, ScriptedInput};
use note_interpreter::api::RetryConfig;
use note_interpreter::api::scripted::ScriptedClient;
use note_interpreter::model::{ClarificationRecord, RunStatus, UNDEFINED};
use note_interpreter::prompt::{PromptInputs, SectionRegistry, SystemPromptBuilder};
use note_interpreter::tools::ProviderKind;
use note_interpreter::ChatCompletion;
use serde_json::{Value, json};

fn write_layout(dir: &Path, yaml: &str) -> PathBuf {
    let path = dir.join("prompt.yaml");
    std::fs::write(&path, yaml).unwrap();
    path
}

fn minimal_layout(dir: &Path) -> PathBuf {
    write_layout(dir, "sections:\n  - name: input_context\n")
}

fn finalize_args() -> Value {
    json!({
        "entries": [{
            "raw_text": "continue plan",
            "interpreted_text": "Continue the weekly running plan on Friday",
            "entity_type": "task",
            "intent": "@DO",
            "clarity_score": 81
        }],
        "new_memory_points": ["* x"]
    })
}

fn ask(questions: &[&str]) -> ChatCompletion {
    ChatCompletion::tool_call("ask_user", json!({ "questions": questions }))
}

fn notes() -> Vec<String> {
    vec!["continue plan".to_string()]
}

fn new_loop(client: &Arc<ScriptedClient>, layout: PathBuf) -> ClarificationLoop {
    ClarificationLoop::new(client.clone(), SystemPromptBuilder::new(layout))
        .with_retry(RetryConfig::none())
        .with_input(Box::new(NoInput))
}

#[tokio::test]
async fn endless_questions_fall_back_after_one_round() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(ScriptedClient::new().always(ask(&["Which plan?"])));

    let output = new_loop(&client, minimal_layout(dir.path()))
        .with_max_rounds(1)
        .run(&notes(), &[])
        .await
        .unwrap();

    assert_eq!(output.status, RunStatus::Fallback);
    assert_eq!(output.entries.len(), 1);
    let entry = &output.entries[0];
    assert_eq!(entry.raw_text, "continue plan");
    assert_eq!(entry.entity_type, UNDEFINED);
    assert_eq!(entry.intent, UNDEFINED);
    assert_eq!(entry.interpreted_text, UNDEFINED);
    assert_eq!(entry.clarity_score, 0);
    assert_eq!(output.new_memory_points.len(), 1);
    assert_eq!(client.call_count(), 1);
}

#[tokio::test]
async fn immediate_finalize_is_returned_unmodified() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(
        ScriptedClient::new().then_reply(ChatCompletion::tool_call("finalize_notes", finalize_args())),
    );

    let output = new_loop(&client, minimal_layout(dir.path()))
        .run(&notes(), &[])
        .await
        .unwrap();

    assert_eq!(output.status, RunStatus::Finalized);
    assert_eq!(output.rounds_used, 1);
    assert_eq!(serde_json::to_value(&output.entries).unwrap(), finalize_args()["entries"]);
    assert_eq!(output.new_memory_points, vec!["* x".to_string()]);
    assert_eq!(output.tool_calls.len(), 1);
    assert_eq!(output.tool_calls[0].tool, "finalize_notes");
}

#[tokio::test]
async fn float_clarity_score_still_finalizes() {
    let dir = tempfile::tempdir().unwrap();
    let mut args = finalize_args();
    args["entries"][0]["clarity_score"] = json!(85.0);
    let client = Arc::new(
        ScriptedClient::new().always(ChatCompletion::tool_call("finalize_notes", args)),
    );

    let output = new_loop(&client, minimal_layout(dir.path()))
        .with_max_rounds(2)
        .run(&notes(), &[])
        .await
        .unwrap();

    assert_eq!(output.status, RunStatus::Finalized);
    assert_eq!(output.rounds_used, 1);
    assert_eq!(output.entries[0].clarity_score, 85);
    assert_eq!(output.entries[0].intent, "@DO");
}

#[tokio::test]
async fn zero_rounds_falls_back_without_calling_the_model() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(ScriptedClient::new());
    let output = new_loop(&client, minimal_layout(dir.path()))
        .with_max_rounds(0)
        .run(&["a".to_string(), "b".to_string()], &[])
        .await
        .unwrap();
    assert!(output.is_fallback());
    assert_eq!(output.entries.len(), 2);
    assert_eq!(client.call_count(), 0);
}

#[tokio::test]
async fn no_notes_still_yield_an_entry() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(ScriptedClient::new().always(ask(&["Anything?"])));
    let output = new_loop(&client, minimal_layout(dir.path()))
        .with_max_rounds(1)
        .run(&[], &[])
        .await
        .unwrap();
    assert_eq!(output.entries.len(), 1);
    assert!(!output.new_memory_points.is_empty());
}

#[tokio::test]
async fn answers_are_carried_into_the_next_prompt() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(
        ScriptedClient::new()
            .then_reply(ask(&["Which plan?", "By when?"]))
            .then_reply(ChatCompletion::tool_call("finalize_notes", finalize_args())),
    );
    let input = ScriptedInput::new(["the running plan, by friday"]);

    let output = new_loop(&client, minimal_layout(dir.path()))
        .with_input(Box::new(input))
        .run(&notes(), &["* Runs three times a week".to_string()])
        .await
        .unwrap();

    assert_eq!(output.rounds_used, 2);
    assert_eq!(
        output.clarifications,
        vec![ClarificationRecord::Batch {
            questions: vec!["Which plan?".into(), "By when?".into()],
            response: "the running plan, by friday".into(),
        }]
    );

    let requests = client.requests();
    let first = requests[0].messages[0].text();
    let second = requests[1].messages[0].text();
    assert!(!first.contains("Batch 1:"));
    assert!(second.contains("Batch 1:\nQ1: Which plan?\nQ2: By when?\nUser response: the running plan, by friday"));
    assert!(second.contains("* Runs three times a week"));
    // Every round sends a fresh system prompt and the kickoff turn only.
    assert_eq!(requests[1].messages.len(), 2);
}

#[tokio::test]
async fn plain_text_reply_is_treated_as_a_question() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(
        ScriptedClient::new()
            .then_reply(ChatCompletion::text("Do you mean the running plan?"))
            .then_reply(ChatCompletion::tool_call("finalize_notes", finalize_args())),
    );
    let output = new_loop(&client, minimal_layout(dir.path()))
        .with_input(Box::new(ScriptedInput::new(["yes"])))
        .run(&notes(), &[])
        .await
        .unwrap();

    assert_eq!(output.status, RunStatus::Finalized);
    assert_eq!(
        output.clarifications,
        vec![ClarificationRecord::Batch {
            questions: vec!["Do you mean the running plan?".into()],
            response: "yes".into(),
        }]
    );
}

#[tokio::test]
async fn malformed_tool_call_spends_a_round_then_recovers() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(
        ScriptedClient::new()
            .then_reply(ChatCompletion::raw_tool_call("finalize_notes", "{\"entries\": ["))
            .then_reply(ChatCompletion::tool_call("finalize_notes", json!({"entries": []})))
            .then_reply(ChatCompletion::tool_call("finalize_notes", finalize_args())),
    );
    let output = new_loop(&client, minimal_layout(dir.path()))
        .run(&notes(), &[])
        .await
        .unwrap();
    assert_eq!(output.status, RunStatus::Finalized);
    assert_eq!(output.rounds_used, 3);
}

#[tokio::test]
async fn anthropic_clients_get_anthropic_tool_payloads() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(
        ScriptedClient::new()
            .with_provider(ProviderKind::Anthropic)
            .then_reply(ChatCompletion::tool_call("finalize_notes", finalize_args())),
    );
    new_loop(&client, minimal_layout(dir.path()))
        .run(&notes(), &[])
        .await
        .unwrap();
    let requests = client.requests();
    let tools = &requests[0].tools;
    assert_eq!(tools.len(), 2);
    assert!(tools.iter().all(|t| t.get("input_schema").is_some()));
}

#[test]
fn custom_text_only_layout_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let layout = write_layout(
        dir.path(),
        "sections:\n\
         \x20 - name: intro\n\
         \x20   custom_text: \"Notes:\\n{notes}\"\n\
         \x20 - name: custom_section\n\
         \x20   custom_text: \"History: {clarification_history}\"\n",
    );
    let builder = SystemPromptBuilder::new(layout).with_registry(SectionRegistry::new());
    let inputs = PromptInputs::new(&["* m".into()], &["a".into(), "b".into()])
        .with_extra("clarification_qas", json!([{"question": "q", "answer": "a"}]));

    let first = builder.build(&inputs).unwrap();
    let second = builder.build(&inputs).unwrap();
    assert_eq!(first, second);
    assert!(first.contains("Notes:\n- a\n- b"));
    assert!(!first.contains("[WARNING"));
}

#[test]
fn shipped_layout_renders_every_section() {
    let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../resources");
    let schema: Value =
        serde_yaml::from_str(&std::fs::read_to_string(root.join("schema.yaml")).unwrap()).unwrap();
    let parameters: Value =
        serde_yaml::from_str(&std::fs::read_to_string(root.join("parameters.yaml")).unwrap())
            .unwrap();
    let inputs = PromptInputs {
        schema: Some(schema),
        parameters: Some(parameters),
        ..PromptInputs::new(&["* Anna is my sister".into()], &["continue plan".into()])
    };

    let prompt = SystemPromptBuilder::new(root.join("prompt_config.yaml"))
        .build(&inputs)
        .unwrap();
    assert!(!prompt.contains("[WARNING"), "{prompt}");
    assert!(prompt.starts_with("------------ IDENTITY / ROLE ------------"));
    assert!(prompt.contains("**Entity Types:** task (something the user intends to do)"));
    assert!(prompt.contains("@DO"));
    assert!(prompt.contains("Ask for clarification when clarity_score is below 60."));
    assert!(prompt.contains("1. continue plan"));
    assert!(!prompt.contains("REASONING STYLE / HEURISTICS"));
}

#[test]
fn unregistered_section_leaves_a_marker() {
    let dir = tempfile::tempdir().unwrap();
    let layout = write_layout(
        dir.path(),
        "sections:\n  - name: nonexistent_section\n  - name: goals\n",
    );
    let prompt = SystemPromptBuilder::new(layout)
        .build(&PromptInputs::default())
        .unwrap();
    assert!(prompt.contains("[WARNING: section 'nonexistent_section' not found]"));
    assert!(prompt.contains("GOALS / OBJECTIVES"));
}
