//! The bounded clarification loop.
//!
//! Every round rebuilds the system prompt from scratch, including all
//! clarification gathered so far, and sends it with a fixed kickoff turn
//! through one [`AgentCore`]. The reply decides what happens next:
//!
//! | Reply | Effect |
//! |-------|--------|
//! | `ask_user` | questions shown, answers recorded, next round |
//! | `finalize_notes` | payload returned as-is, loop ends |
//! | plain text | shown as a question (or a failed round, per policy) |
//! | malformed / unknown tool / LLM error | logged, round spent |
//!
//! When rounds run out the loop returns [`LlmOutput::fallback`]. The only
//! errors it propagates are configuration errors: an unreadable prompt
//! layout or a client no tool provider can bind.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use crate::agent::core::{AgentCore, AgentResponse, ResponseKind};
use crate::agent::events::{EventHandler, LoggingHandler, LoopEvent};
use crate::agent::input::{AnswerMode, HumanInput, PlainTextPolicy, StdinInput};
use crate::api::client::{ChatClient, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE};
use crate::api::retry::RetryConfig;
use crate::error::Result;
use crate::model::{ClarificationRecord, LlmOutput, RunStatus, ToolCallRecord};
use crate::prompt::builder::{PromptInputs, SystemPromptBuilder};
use crate::tools::notes::{ASK_USER, AskUserArgs, FINALIZE_NOTES, FinalizeNotesArgs, note_tools};
use crate::Message;

/// User turn sent after the system prompt every round.
pub const KICKOFF_MESSAGE: &str = "Interpret the notes in the input context. \
    Call ask_user if you need clarification, or finalize_notes when every note is interpreted.";

/// Recorded answer when input ends before a question is answered.
pub const NO_ANSWER: &str = "(no answer provided)";

pub const DEFAULT_MAX_ROUNDS: u32 = 3;

/// Drives an agent through at most `max_rounds` rounds.
pub struct ClarificationLoop {
    client: Arc<dyn ChatClient>,
    builder: SystemPromptBuilder,
    max_rounds: u32,
    answer_mode: AnswerMode,
    plain_text_policy: PlainTextPolicy,
    input: Box<dyn HumanInput>,
    events: Box<dyn EventHandler>,
    template: PromptInputs,
    retry: RetryConfig,
    max_tokens: u32,
    temperature: f32,
}

/// What one round produced.
enum RoundOutcome {
    Continue,
    Finalized(FinalizeNotesArgs),
}

impl ClarificationLoop {
    pub fn new(client: Arc<dyn ChatClient>, builder: SystemPromptBuilder) -> Self {
        Self {
            client,
            builder,
            max_rounds: DEFAULT_MAX_ROUNDS,
            answer_mode: AnswerMode::default(),
            plain_text_policy: PlainTextPolicy::default(),
            input: Box::new(StdinInput),
            events: Box::new(LoggingHandler),
            template: PromptInputs::default(),
            retry: RetryConfig::default(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    pub fn with_max_rounds(mut self, max_rounds: u32) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    pub fn with_input(mut self, input: Box<dyn HumanInput>) -> Self {
        self.input = input;
        self
    }

    pub fn with_answer_mode(mut self, mode: AnswerMode) -> Self {
        self.answer_mode = mode;
        self
    }

    pub fn with_plain_text_policy(mut self, policy: PlainTextPolicy) -> Self {
        self.plain_text_policy = policy;
        self
    }

    pub fn with_event_handler(mut self, events: impl EventHandler + 'static) -> Self {
        self.events = Box::new(events);
        self
    }

    /// Classification taxonomy used when the layout names no file.
    pub fn with_classification(mut self, config: Value) -> Self {
        self.template.classification_config = Some(config);
        self
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.template.schema = Some(schema);
        self
    }

    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.template.parameters = Some(parameters);
        self
    }

    pub fn with_scoring_metrics(mut self, metrics: Value) -> Self {
        self.template.scoring_metrics = Some(metrics);
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_llm_params(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    pub fn max_rounds(&self) -> u32 {
        self.max_rounds
    }

    /// Interpret `notes` given the user's `memory`.
    pub async fn run(&self, notes: &[String], memory: &[String]) -> Result<LlmOutput> {
        let retry = self.retry.clone();
        let mut agent = AgentCore::new(self.client.clone(), note_tools(), String::new())?
            .with_llm_params(self.max_tokens, self.temperature)
            .map_llm(|llm| llm.with_retry(retry));

        let mut clarifications: Vec<ClarificationRecord> = Vec::new();
        let mut tool_calls: Vec<ToolCallRecord> = Vec::new();

        info!(
            "Interpreting {} note(s) with up to {} round(s)",
            notes.len(),
            self.max_rounds
        );
        for round in 1..=self.max_rounds {
            self.events.on_event(&LoopEvent::RoundStart {
                round,
                max_rounds: self.max_rounds,
            });

            let prompt = self.builder.build(&self.inputs_for(notes, memory, &clarifications)?)?;
            self.events.on_event(&LoopEvent::SystemPrompt(&prompt));

            let response = agent
                .handle_user_message(vec![Message::system(prompt), Message::user(KICKOFF_MESSAGE)])
                .await;

            let outcome = self.handle_response(round, response, &mut clarifications, &mut tool_calls);
            if let RoundOutcome::Finalized(args) = outcome {
                let output = LlmOutput {
                    entries: args.entries,
                    new_memory_points: args.new_memory_points,
                    tool_calls,
                    status: RunStatus::Finalized,
                    rounds_used: round,
                    clarifications,
                };
                self.events.on_event(&LoopEvent::Finalized(&output));
                return Ok(output);
            }
        }

        let mut output = LlmOutput::fallback(notes, self.max_rounds);
        output.tool_calls = tool_calls;
        output.clarifications = clarifications;
        self.events.on_event(&LoopEvent::Fallback(&output));
        Ok(output)
    }

    fn inputs_for(
        &self,
        notes: &[String],
        memory: &[String],
        clarifications: &[ClarificationRecord],
    ) -> Result<PromptInputs> {
        let mut inputs = self.template.clone();
        inputs.notes = notes.to_vec();
        inputs.memory = memory.to_vec();
        if !clarifications.is_empty() {
            inputs
                .extra_context
                .insert("clarification_qas".into(), serde_json::to_value(clarifications)?);
        }
        Ok(inputs)
    }

    fn handle_response(
        &self,
        round: u32,
        response: AgentResponse,
        clarifications: &mut Vec<ClarificationRecord>,
        tool_calls: &mut Vec<ToolCallRecord>,
    ) -> RoundOutcome {
        match response.kind {
            ResponseKind::Error => {
                let message = response.error.unwrap_or(response.display_message);
                self.events.on_event(&LoopEvent::Error {
                    round,
                    message: &message,
                });
                RoundOutcome::Continue
            }
            ResponseKind::Conversation => {
                let text = response.display_message;
                self.events.on_event(&LoopEvent::LlmResponse(&text));
                match self.plain_text_policy {
                    PlainTextPolicy::Clarify => {
                        debug!("Plain text reply treated as a clarification request");
                        clarifications.extend(self.collect_answers(vec![text]));
                    }
                    PlainTextPolicy::Error => self.events.on_event(&LoopEvent::Malformed {
                        round,
                        reason: "plain text reply instead of a tool call",
                    }),
                }
                RoundOutcome::Continue
            }
            ResponseKind::ToolCall => {
                let Some(details) = response.tool_details else {
                    return RoundOutcome::Continue;
                };
                self.events.on_event(&LoopEvent::ToolCall {
                    name: &details.name,
                    args: &details.args,
                });
                tool_calls.push(ToolCallRecord {
                    tool: details.name.clone(),
                    args: details.args.clone(),
                });

                let parsed = match details.name.as_str() {
                    ASK_USER => AskUserArgs::parse(&details.args).map(|ask| {
                        clarifications.extend(self.collect_answers(ask.questions));
                        RoundOutcome::Continue
                    }),
                    FINALIZE_NOTES => {
                        FinalizeNotesArgs::parse(&details.args).map(RoundOutcome::Finalized)
                    }
                    other => {
                        self.events.on_event(&LoopEvent::Malformed {
                            round,
                            reason: &format!("unknown tool '{other}'"),
                        });
                        Ok(RoundOutcome::Continue)
                    }
                };
                parsed.unwrap_or_else(|e| {
                    self.events.on_event(&LoopEvent::Malformed {
                        round,
                        reason: &e.to_string(),
                    });
                    RoundOutcome::Continue
                })
            }
        }
    }

    /// Put `questions` to the user and record the answers.
    fn collect_answers(&self, questions: Vec<String>) -> Vec<ClarificationRecord> {
        self.events.on_event(&LoopEvent::Questions(&questions));
        match self.answer_mode {
            AnswerMode::Batch => {
                let response = self.read_answer("Your answer:");
                vec![ClarificationRecord::Batch {
                    questions,
                    response,
                }]
            }
            AnswerMode::PerQuestion => questions
                .into_iter()
                .map(|question| {
                    let answer = self.read_answer(&format!("{question}\n>"));
                    ClarificationRecord::Pair { question, answer }
                })
                .collect(),
        }
    }

    fn read_answer(&self, prompt: &str) -> String {
        match self.input.read_line(prompt) {
            Some(answer) if !answer.trim().is_empty() => answer.trim().to_string(),
            _ => NO_ANSWER.to_string(),
        }
    }
}
