//! Layered configuration for the step runner.
//!
//! This crate handles:
//! - Loading configuration documents from YAML/JSON files, directories and in-memory values
//! - Merging global defaults, environment defaults and sub-step definitions with conflict detection
//! - Resolving a sub-step's runtime configuration across the precedence tiers
//! - Decrypting secret values through pluggable decryptors (SOPS built in)

pub mod config;
pub mod decryptor;
pub mod error;
pub mod loader;
pub mod merge;
pub mod sops;
pub mod step;
pub mod sub_step;
pub mod value;

pub use config::Config;
pub use decryptor::{Decryptor, DecryptorFactory, DecryptorRegistry};
pub use error::{ConfigError, ConfigResult, DecryptError};
pub use loader::ConfigInput;
pub use merge::deep_merge;
pub use sops::SopsDecryptor;
pub use step::StepConfig;
pub use sub_step::{RuntimeStepConfig, SubStepConfig, SubStepRef};
pub use value::{ConfigMap, ConfigNode, ConfigSource, ConfigValue, PathPart};
