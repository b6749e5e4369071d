//! Error types for the result model.

use std::path::PathBuf;

use thiserror::Error;

use crate::StepResultKey;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid artifact: {0}")]
    InvalidArtifact(String),

    #[error("step result for {0} already exists in the workflow result")]
    DuplicateStepResult(StepResultKey),

    #[error("error persisting workflow result at {path}: {message}")]
    Persistence { path: PathBuf, message: String },

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
