//! Sources of human answers and the knobs that shape how they are asked.

use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::ui;

/// Where clarification answers come from.
pub trait HumanInput: Send + Sync {
    /// Show `prompt` and return one line, or `None` when input is exhausted.
    fn read_line(&self, prompt: &str) -> Option<String>;
}

/// Interactive terminal input.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdinInput;

impl HumanInput for StdinInput {
    fn read_line(&self, prompt: &str) -> Option<String> {
        ui::prompt_line(prompt)
    }
}

/// Pre-recorded answers, returned in order.
#[derive(Debug, Default)]
pub struct ScriptedInput {
    answers: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedInput {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Prompts shown so far, oldest first.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }
}

impl HumanInput for ScriptedInput {
    fn read_line(&self, prompt: &str) -> Option<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        self.answers.lock().ok()?.pop_front()
    }
}

/// Input that is always exhausted. Every question goes unanswered.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoInput;

impl HumanInput for NoInput {
    fn read_line(&self, _prompt: &str) -> Option<String> {
        None
    }
}

/// How questions from one `ask_user` call are put to the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerMode {
    /// Show all questions, read one free-form response.
    #[default]
    Batch,
    /// Ask each question separately.
    PerQuestion,
}

impl FromStr for AnswerMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "batch" => Ok(Self::Batch),
            "per_question" => Ok(Self::PerQuestion),
            other => Err(Error::Config(format!("unknown answer mode '{other}'"))),
        }
    }
}

/// What to do when the model answers in plain text instead of a tool call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlainTextPolicy {
    /// Show the text as a question and record the user's answer.
    #[default]
    Clarify,
    /// Count the round as failed.
    Error,
}

impl FromStr for PlainTextPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "clarify" => Ok(Self::Clarify),
            "error" => Ok(Self::Error),
            other => Err(Error::Config(format!("unknown plain text policy '{other}'"))),
        }
    }
}
