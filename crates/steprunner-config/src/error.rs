//! Configuration loading and resolution errors.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("error parsing {path} as JSON ({json}) or YAML ({yaml})")]
    Parse {
        path: PathBuf,
        json: String,
        yaml: String,
    },

    #[error("configuration must have a '{expected}' key, received: {received}")]
    MissingRootKey { expected: String, received: String },

    #[error("configuration has both '{0}' and '{1}' keys, expected only one")]
    AmbiguousRootKey(String, String),

    #[error("invalid type for {context}: expected {expected}, found: {found}")]
    InvalidType {
        context: String,
        expected: String,
        found: String,
    },

    #[error("{context} is missing required key '{field}'")]
    MissingField { context: String, field: String },

    #[error("no configuration files found in directory {0}")]
    NoConfigFiles(PathBuf),

    #[error("Conflict at {path}")]
    MergeConflict { path: String },

    #[error("error merging global defaults: {source}")]
    GlobalDefaultsConflict {
        #[source]
        source: Box<ConfigError>,
    },

    #[error("error merging global environment defaults for environment '{environment}': {source}")]
    GlobalEnvironmentDefaultsConflict {
        environment: String,
        #[source]
        source: Box<ConfigError>,
    },

    #[error("error merging config for sub-step '{sub_step}' of step '{step}': {source}")]
    SubStepConflict {
        step: String,
        sub_step: String,
        #[source]
        source: Box<ConfigError>,
    },

    #[error(
        "sub-step '{sub_step}' of step '{step}' is already defined with implementer '{existing}', cannot redefine it with implementer '{requested}'"
    )]
    ImplementerMismatch {
        step: String,
        sub_step: String,
        existing: String,
        requested: String,
    },

    #[error("error decrypting value at {path} from {source_name}: {message}")]
    Decryption {
        path: String,
        source_name: String,
        message: String,
    },

    #[error("unknown config decryptor implementer: {0}")]
    UnknownDecryptor(String),

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn invalid_type(
        context: impl Into<String>,
        expected: &str,
        found: &serde_json::Value,
    ) -> Self {
        Self::InvalidType {
            context: context.into(),
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }
}

/// Failure reported by a [`Decryptor`](crate::Decryptor) plugin.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct DecryptError(pub String);

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
