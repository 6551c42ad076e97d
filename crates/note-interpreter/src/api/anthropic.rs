//! Client for the Anthropic messages API.
//!
//! Conversation history is kept in the OpenAI-shaped [`Message`] form and
//! converted here: system turns go into the top-level `system` field, tool
//! calls become `tool_use` blocks, tool results become `tool_result` blocks
//! in a user turn, and consecutive turns of the same role are merged.

use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, trace, warn};

use crate::api::client::{ChatClient, ChatFuture, ChatRequest, DEFAULT_MAX_TOKENS};
use crate::error::{Error, Result};
use crate::tools::provider::ProviderKind;
use crate::{ChatCompletion, Message, MessageRole, ToolCall, UsageInfo};

pub const ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Default model for the Anthropic provider.
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-20250514";

// ── Request conversion ─────────────────────────────────────────────

fn content_blocks(msg: &Message) -> Vec<Value> {
    match msg.role {
        MessageRole::Tool => vec![json!({
            "type": "tool_result",
            "tool_use_id": msg.tool_call_id.clone().unwrap_or_default(),
            "content": msg.text(),
        })],
        _ => {
            let mut blocks = Vec::new();
            if !msg.text().is_empty() {
                blocks.push(json!({"type": "text", "text": msg.text()}));
            }
            for call in msg.tool_calls.iter().flatten() {
                let input = call.parse_arguments().unwrap_or_else(|e| {
                    warn!(
                        "Sending empty input for tool call {} ({}): {e}",
                        call.id, call.function.name
                    );
                    Value::Object(serde_json::Map::new())
                });
                blocks.push(json!({
                    "type": "tool_use",
                    "id": call.id,
                    "name": call.function.name,
                    "input": input,
                }));
            }
            blocks
        }
    }
}

/// Split history into the `system` string and the alternating message list.
pub(crate) fn convert_messages(messages: &[Message]) -> (String, Vec<Value>) {
    let mut system = Vec::new();
    let mut turns: Vec<(&'static str, Vec<Value>)> = Vec::new();

    for msg in messages {
        let role = match msg.role {
            MessageRole::System => {
                if !msg.text().is_empty() {
                    system.push(msg.text().to_string());
                }
                continue;
            }
            MessageRole::Assistant => "assistant",
            MessageRole::User | MessageRole::Tool => "user",
        };
        let blocks = content_blocks(msg);
        if blocks.is_empty() {
            continue;
        }
        // The API requires alternating roles.
        match turns.last_mut() {
            Some((last_role, last_blocks)) if *last_role == role => last_blocks.extend(blocks),
            Some(_) | None => turns.push((role, blocks)),
        }
    }

    let messages = turns
        .into_iter()
        .map(|(role, content)| json!({"role": role, "content": content}))
        .collect();
    (system.join("\n\n"), messages)
}

pub(crate) fn request_body(model: &str, request: &ChatRequest) -> Value {
    let (system, messages) = convert_messages(&request.messages);
    let max_tokens = if request.max_tokens == 0 {
        DEFAULT_MAX_TOKENS
    } else {
        request.max_tokens
    };
    let mut body = json!({
        "model": model,
        "max_tokens": max_tokens,
        "temperature": request.temperature,
        "messages": messages,
    });
    if !system.is_empty() {
        body["system"] = Value::String(system);
    }
    if !request.tools.is_empty() {
        body["tools"] = Value::Array(request.tools.clone());
    }
    body
}

// ── Response parsing ───────────────────────────────────────────────

#[derive(Deserialize, Debug)]
struct RawMessageResponse {
    #[serde(default)]
    content: Vec<RawContentBlock>,
    stop_reason: Option<String>,
    usage: Option<RawUsage>,
    error: Option<RawError>,
}

#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RawContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Debug)]
struct RawUsage {
    input_tokens: Option<u32>,
    output_tokens: Option<u32>,
}

#[derive(Deserialize, Debug)]
struct RawError {
    message: String,
}

pub(crate) fn parse_response(text: &str) -> Result<ChatCompletion> {
    let parsed: RawMessageResponse = serde_json::from_str(text)
        .map_err(|e| Error::Llm(format!("failed to parse response: {e}")))?;
    if let Some(err) = parsed.error {
        return Err(Error::Llm(format!("API error: {}", err.message)));
    }

    let mut texts = Vec::new();
    let mut tool_calls = Vec::new();
    for block in parsed.content {
        match block {
            RawContentBlock::Text { text } => texts.push(text),
            RawContentBlock::ToolUse { id, name, input } => {
                tool_calls.push(ToolCall::new(id, name, input.to_string()));
            }
            RawContentBlock::Other => {}
        }
    }

    let usage = parsed.usage.map(|u| UsageInfo {
        prompt_tokens: u.input_tokens,
        completion_tokens: u.output_tokens,
        total_tokens: match (u.input_tokens, u.output_tokens) {
            (Some(i), Some(o)) => Some(i.saturating_add(o)),
            _ => None,
        },
    });

    Ok(ChatCompletion {
        content: if texts.is_empty() {
            None
        } else {
            Some(texts.join("\n"))
        },
        tool_calls,
        usage,
        finish_reason: parsed.stop_reason,
    })
}

// ── Client ─────────────────────────────────────────────────────────

/// Async HTTP client for the Anthropic messages API.
pub struct AnthropicClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    url: String,
}

impl AnthropicClient {
    /// Create a client for `model` with the default 120 s request timeout.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        Self::with_timeout(api_key, model, Duration::from_secs(120))
    }

    pub fn with_timeout(
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("note-interpreter/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            url: ANTHROPIC_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    async fn send(&self, request: &ChatRequest) -> Result<ChatCompletion> {
        debug!(
            "LLM request: model={}, messages={}, tools={}, max_tokens={}, temp={}",
            self.model,
            request.messages.len(),
            request.tools.len(),
            request.max_tokens,
            request.temperature,
        );
        let body = request_body(&self.model, request);
        trace!("Request payload: {body}");

        let start = Instant::now();
        let resp = self
            .client
            .post(&self.url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        debug!(
            "LLM response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );
        if !status.is_success() {
            return Err(Error::Http {
                status: status.as_u16(),
                body: text,
            });
        }
        parse_response(&text)
    }
}

impl ChatClient for AnthropicClient {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn complete<'a>(&'a self, request: &'a ChatRequest) -> ChatFuture<'a> {
        Box::pin(self.send(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_turns_move_to_system_field() {
        let (system, messages) = convert_messages(&[
            Message::system("prompt"),
            Message::user("hello"),
            Message::system("Error processing message: timeout"),
        ]);
        assert_eq!(system, "prompt\n\nError processing message: timeout");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[0]["content"][0]["text"], "hello");
    }

    #[test]
    fn tool_round_trip_is_converted_and_merged() {
        let call = ToolCall::new("toolu_1", "ask_user", r#"{"questions":["Which?"]}"#);
        let (_, messages) = convert_messages(&[
            Message::user("interpret"),
            Message::assistant_tool_calls(Some("Let me ask.".into()), vec![call]),
            Message::tool_result("toolu_1", r#"{"status":"ok"}"#),
            Message::user("answer: the weekly plan"),
        ]);

        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1]["role"], "assistant");
        assert_eq!(messages[1]["content"][0]["type"], "text");
        assert_eq!(messages[1]["content"][1]["type"], "tool_use");
        assert_eq!(messages[1]["content"][1]["input"]["questions"][0], "Which?");

        // Tool result and the following user text share one user turn.
        assert_eq!(messages[2]["role"], "user");
        assert_eq!(messages[2]["content"][0]["type"], "tool_result");
        assert_eq!(messages[2]["content"][0]["tool_use_id"], "toolu_1");
        assert_eq!(messages[2]["content"][1]["type"], "text");
    }

    #[test]
    fn body_has_tools_and_default_max_tokens() {
        let request = ChatRequest {
            messages: vec![Message::system("s"), Message::user("u")],
            tools: vec![json!({"name": "finalize_notes", "input_schema": {}})],
            max_tokens: 0,
            temperature: 0.0,
        };
        let body = request_body("claude", &request);
        assert_eq!(body["system"], "s");
        assert_eq!(body["max_tokens"], DEFAULT_MAX_TOKENS);
        assert_eq!(body["tools"][0]["name"], "finalize_notes");
    }

    #[test]
    fn parses_tool_use_response() {
        let text = json!({
            "content": [
                {"type": "text", "text": "Finalizing."},
                {"type": "tool_use", "id": "toolu_9", "name": "finalize_notes",
                 "input": {"entries": [], "new_memory_points": []}}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 12, "output_tokens": 8}
        })
        .to_string();

        let completion = parse_response(&text).unwrap();
        assert_eq!(completion.content.as_deref(), Some("Finalizing."));
        assert_eq!(completion.tool_calls[0].id, "toolu_9");
        assert_eq!(completion.tool_calls[0].function.name, "finalize_notes");
        let args = completion.tool_calls[0].parse_arguments().unwrap();
        assert!(args["entries"].as_array().unwrap().is_empty());
        assert_eq!(completion.usage.unwrap().total_tokens, Some(20));
    }

    #[test]
    fn unknown_blocks_are_ignored() {
        let text = r#"{"content":[{"type":"thinking","thinking":"..."},{"type":"text","text":"hi"}],"stop_reason":"end_turn"}"#;
        let completion = parse_response(text).unwrap();
        assert_eq!(completion.content.as_deref(), Some("hi"));
    }

    #[test]
    fn unparsable_history_arguments_become_empty_input() {
        let call = ToolCall::new("toolu_2", "finalize_notes", "{\"entries\": [");
        let (_, messages) = convert_messages(&[
            Message::user("interpret"),
            Message::assistant_tool_calls(None, vec![call]),
        ]);
        let block = &messages[1]["content"][0];
        assert_eq!(block["type"], "tool_use");
        assert_eq!(block["id"], "toolu_2");
        assert_eq!(block["input"], json!({}));
    }

    #[test]
    fn total_tokens_saturate_instead_of_overflowing() {
        let text = json!({
            "content": [{"type": "text", "text": "hi"}],
            "usage": {"input_tokens": u32::MAX - 5, "output_tokens": 10}
        })
        .to_string();
        let usage = parse_response(&text).unwrap().usage.unwrap();
        assert_eq!(usage.prompt_tokens, Some(u32::MAX - 5));
        assert_eq!(usage.total_tokens, Some(u32::MAX));
    }
}
