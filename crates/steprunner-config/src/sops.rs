//! SOPS-backed decryptor.
//!
//! Claims string values that look like `ENC[...]` and were read from a file,
//! and asks the `sops` binary to extract the decrypted value from that file.

use std::path::Path;
use std::process::Command;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::DecryptError;
use crate::{ConfigError, ConfigResult, ConfigSource, ConfigValue, Decryptor, PathPart};

static SOPS_ENCRYPTED_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ENC\[.*\]$").unwrap());

#[derive(Debug, Clone, Default)]
pub struct SopsDecryptor {
    additional_sops_args: Vec<String>,
}

impl SopsDecryptor {
    pub const IMPLEMENTER: &'static str = "sops";

    pub fn new(additional_sops_args: Vec<String>) -> Self {
        Self {
            additional_sops_args,
        }
    }

    /// Build from a `config-decryptors` entry config, reading the optional
    /// `additional-sops-args` list.
    pub fn from_config(config: &Map<String, Value>) -> ConfigResult<Self> {
        let args = match config.get("additional-sops-args") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_string).ok_or_else(|| {
                        ConfigError::invalid_type("sops additional-sops-args entry", "string", item)
                    })
                })
                .collect::<ConfigResult<_>>()?,
            Some(other) => {
                return Err(ConfigError::invalid_type(
                    "sops additional-sops-args",
                    "list of strings",
                    other,
                ));
            }
        };
        Ok(Self::new(args))
    }

    /// Build the `--extract` argument for a value, e.g. `["a"]["b"][0]`.
    pub fn extract_path(path_parts: &[PathPart]) -> String {
        path_parts
            .iter()
            .map(|part| match part {
                PathPart::Key(key) => format!("[\"{key}\"]"),
                PathPart::Index(index) => format!("[{index}]"),
            })
            .collect()
    }

    fn run_sops(&self, file: &Path, extract: &str) -> Result<String, DecryptError> {
        debug!(file = %file.display(), extract, "Decrypting value with sops");

        let output = Command::new("sops")
            .arg("--decrypt")
            .arg("--extract")
            .arg(extract)
            .args(&self.additional_sops_args)
            .arg(file)
            .output()
            .map_err(|e| DecryptError(format!("failed to run sops: {e}")))?;

        if !output.status.success() {
            return Err(DecryptError(format!(
                "sops exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.strip_suffix('\n').unwrap_or(&stdout).to_string())
    }
}

impl Decryptor for SopsDecryptor {
    fn name(&self) -> &str {
        Self::IMPLEMENTER
    }

    fn can_decrypt(&self, value: &ConfigValue) -> bool {
        let encrypted = value
            .raw_value()
            .as_str()
            .is_some_and(|s| SOPS_ENCRYPTED_VALUE.is_match(s));
        encrypted && matches!(value.source(), ConfigSource::File(_))
    }

    fn decrypt(&self, value: &ConfigValue) -> Result<String, DecryptError> {
        let ConfigSource::File(file) = value.source() else {
            return Err(DecryptError(
                "sops can only decrypt values read from a file".to_string(),
            ));
        };
        self.run_sops(file, &Self::extract_path(value.path_parts()))
    }
}
