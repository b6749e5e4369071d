//! Configuration sources: in-memory documents, files, directories and lists.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;
use walkdir::WalkDir;

use crate::{ConfigError, ConfigResult};

/// Anything [`Config::add_config`](crate::Config::add_config) accepts.
#[derive(Debug, Clone)]
pub enum ConfigInput {
    /// An already parsed document.
    Document(Value),
    /// A YAML/JSON file, or a directory searched recursively for them.
    Path(PathBuf),
    /// Several sources, applied in order.
    List(Vec<ConfigInput>),
}

impl From<Value> for ConfigInput {
    fn from(value: Value) -> Self {
        ConfigInput::Document(value)
    }
}

impl From<PathBuf> for ConfigInput {
    fn from(path: PathBuf) -> Self {
        ConfigInput::Path(path)
    }
}

impl From<&Path> for ConfigInput {
    fn from(path: &Path) -> Self {
        ConfigInput::Path(path.to_path_buf())
    }
}

impl From<&str> for ConfigInput {
    fn from(path: &str) -> Self {
        ConfigInput::Path(PathBuf::from(path))
    }
}

impl From<String> for ConfigInput {
    fn from(path: String) -> Self {
        ConfigInput::Path(PathBuf::from(path))
    }
}

impl<T: Into<ConfigInput>> From<Vec<T>> for ConfigInput {
    fn from(items: Vec<T>) -> Self {
        ConfigInput::List(items.into_iter().map(Into::into).collect())
    }
}

/// Parse a configuration file, trying JSON first and then YAML.
pub fn parse_config_file(path: &Path) -> ConfigResult<Value> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;

    match serde_json::from_str(&content) {
        Ok(value) => {
            debug!(path = %path.display(), "Parsed config file as JSON");
            Ok(value)
        }
        Err(json_error) => match serde_yaml::from_str(&content) {
            Ok(value) => {
                debug!(path = %path.display(), "Parsed config file as YAML");
                Ok(value)
            }
            Err(yaml_error) => Err(ConfigError::Parse {
                path: path.to_path_buf(),
                json: json_error.to_string(),
                yaml: yaml_error.to_string(),
            }),
        },
    }
}

/// Every file under `dir`, recursively, sorted by path. Hidden files and
/// directories are skipped. At least one file is required.
pub fn collect_config_files(dir: &Path) -> ConfigResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    let walker = WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry));
    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(dir).to_path_buf();
            ConfigError::io(path, e.into())
        })?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }

    if files.is_empty() {
        return Err(ConfigError::NoConfigFiles(dir.to_path_buf()));
    }
    Ok(files)
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}
