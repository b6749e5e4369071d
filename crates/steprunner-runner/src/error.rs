//! Step execution errors.

use std::path::PathBuf;

use steprunner_config::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Core(#[from] steprunner_core::Error),

    #[error("step '{0}' is not configured")]
    StepNotFound(String),

    #[error("unknown step implementer '{implementer}' for sub-step '{sub_step}' of step '{step}'")]
    UnknownImplementer {
        step: String,
        sub_step: String,
        implementer: String,
    },

    #[error(
        "missing required configuration or previous result keys for sub-step '{sub_step}' of step '{step}': {}",
        keys.join(", ")
    )]
    MissingRequiredKeys {
        step: String,
        sub_step: String,
        keys: Vec<String>,
    },

    #[error("{0}")]
    Implementer(String),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RunnerError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type RunnerResult<T> = std::result::Result<T, RunnerError>;
