//! Client for OpenAI-compatible chat-completion endpoints.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace};

use crate::api::client::{ChatClient, ChatFuture, ChatRequest};
use crate::error::{Error, Result};
use crate::tools::provider::ProviderKind;
use crate::{ChatCompletion, Message, ToolCall, UsageInfo};

pub const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Default model for the OpenAI provider.
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";

// ── Wire types ─────────────────────────────────────────────────────

#[derive(Serialize, Debug)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "no_tools")]
    tools: &'a [Value],
    #[serde(skip_serializing_if = "is_zero_u32")]
    max_tokens: u32,
    temperature: f32,
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}

fn no_tools(v: &&[Value]) -> bool {
    v.is_empty()
}

#[derive(Deserialize, Debug)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    error: Option<ApiErrorResponse>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: RawResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorResponse {
    message: String,
}

/// Serialize the request body sent to the endpoint.
pub(crate) fn request_body(model: &str, request: &ChatRequest) -> Result<Value> {
    let body = OpenAiRequest {
        model,
        messages: &request.messages,
        tools: &request.tools,
        max_tokens: request.max_tokens,
        temperature: request.temperature,
    };
    Ok(serde_json::to_value(body)?)
}

/// Parse a successful response body into a [`ChatCompletion`].
pub(crate) fn parse_response(text: &str) -> Result<ChatCompletion> {
    let parsed: RawChatResponse = serde_json::from_str(text)
        .map_err(|e| Error::Llm(format!("failed to parse response: {e}")))?;

    if let Some(err) = parsed.error {
        return Err(Error::Llm(format!("API error: {}", err.message)));
    }

    let Some(choice) = parsed.choices.and_then(|c| c.into_iter().next()) else {
        return Err(Error::Llm("response contained no choices".into()));
    };

    Ok(ChatCompletion {
        content: choice.message.content,
        tool_calls: choice.message.tool_calls.unwrap_or_default(),
        usage: parsed.usage,
        finish_reason: choice.finish_reason,
    })
}

// ── Client ─────────────────────────────────────────────────────────

/// Async HTTP client for the OpenAI chat completions API.
pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    url: String,
}

impl OpenAiClient {
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
            url: OPENAI_URL.to_string(),
        })
    }

    /// Point the client at another OpenAI-compatible endpoint.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatCompletion> {
        debug!(
            "LLM request: model={}, messages={}, tools={}, max_tokens={}, temp={}",
            self.model,
            request.messages.len(),
            request.tools.len(),
            request.max_tokens,
            request.temperature,
        );
        let body = request_body(&self.model, request)?;
        trace!("Request payload: {body}");

        let start = Instant::now();
        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
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

        let completion = parse_response(&text)?;
        if let Some(ref usage) = completion.usage {
            debug!(
                "Token usage: prompt={}, completion={}, total={}",
                usage.prompt_tokens.unwrap_or(0),
                usage.completion_tokens.unwrap_or(0),
                usage.total_tokens.unwrap_or(0),
            );
        }
        Ok(completion)
    }
}

impl ChatClient for OpenAiClient {
    fn provider(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn complete<'a>(&'a self, request: &'a ChatRequest) -> ChatFuture<'a> {
        Box::pin(self.chat(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn body_includes_tools_only_when_present() {
        let mut request = ChatRequest {
            messages: vec![Message::system("s"), Message::user("u")],
            max_tokens: 100,
            temperature: 0.2,
            ..Default::default()
        };
        let body = request_body("gpt-4o", &request).unwrap();
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["messages"][1]["role"], "user");
        assert!(body.get("tools").is_none());

        request.tools = vec![json!({"type": "function", "function": {"name": "ask_user"}})];
        let body = request_body("gpt-4o", &request).unwrap();
        assert_eq!(body["tools"][0]["function"]["name"], "ask_user");
    }

    #[test]
    fn parses_tool_call_response() {
        let text = json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "ask_user", "arguments": "{\"questions\":[\"Which plan?\"]}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        })
        .to_string();

        let completion = parse_response(&text).unwrap();
        assert!(completion.content.is_none());
        assert_eq!(completion.tool_calls.len(), 1);
        assert_eq!(completion.tool_calls[0].function.name, "ask_user");
        assert_eq!(
            completion.tool_calls[0].parse_arguments().unwrap()["questions"][0],
            "Which plan?"
        );
        assert_eq!(completion.usage.unwrap().total_tokens, Some(15));
    }

    #[test]
    fn parses_text_response() {
        let text = r#"{"choices":[{"message":{"content":"Which plan do you mean?"},"finish_reason":"stop"}]}"#;
        let completion = parse_response(text).unwrap();
        assert_eq!(completion.content.as_deref(), Some("Which plan do you mean?"));
        assert!(completion.tool_calls.is_empty());
    }

    #[test]
    fn api_error_and_empty_choices_are_errors() {
        assert!(parse_response(r#"{"error":{"message":"quota"}}"#).is_err());
        assert!(parse_response(r#"{"choices":[]}"#).is_err());
        assert!(parse_response("not json").is_err());
    }
}
