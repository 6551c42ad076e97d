//! Crate-wide error type.
//!
//! Configuration problems (unreadable or malformed YAML, unknown provider,
//! missing API key) surface as `Err` to the caller. Everything that happens
//! inside a clarification round is recovered locally and never reaches this
//! type's consumers as a crash.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or incomplete configuration.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML in {}: {source}", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed CSV in {}: {reason}", path.display())]
    Csv { path: PathBuf, reason: String },

    /// Non-success status from an LLM endpoint.
    #[error("LLM API HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The provider answered, but not in a shape we can use.
    #[error("LLM error: {0}")]
    Llm(String),

    #[error("malformed tool call: {0}")]
    MalformedToolCall(String),
}

impl Error {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn yaml(path: impl AsRef<Path>, source: serde_yaml::Error) -> Self {
        Error::Yaml {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Whether retrying the same request may succeed.
    ///
    /// Rate limits, server-side failures and network hiccups are transient.
    /// Authentication and request-shape errors never are.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Http { status, .. } => matches!(status, 429 | 500 | 502 | 503 | 504),
            Error::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }
}
