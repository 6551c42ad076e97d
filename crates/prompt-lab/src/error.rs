use std::path::{Path, PathBuf};

use thiserror::Error;

pub type Result<T, E = LabError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum LabError {
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

    /// The bundle is missing a section or names an unusable input.
    #[error("invalid experiment bundle: {0}")]
    Bundle(String),

    #[error("invalid plan: {0}")]
    Plan(String),

    /// The model under test failed or answered with something unusable.
    #[error("model error: {0}")]
    Model(String),

    #[error(transparent)]
    Interpreter(#[from] note_interpreter::Error),
}

impl LabError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        LabError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn yaml(path: impl AsRef<Path>, source: serde_yaml::Error) -> Self {
        LabError::Yaml {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}
