//! CLI command implementations.

pub mod results;
pub mod run;
pub mod validate;

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use indexmap::IndexMap;
use serde_json::Value;
use steprunner_config::Config;

/// Load every configuration source in order.
pub fn load_config(paths: &[PathBuf]) -> Result<Config> {
    let mut config = Config::new();
    for path in paths {
        config
            .add_config(path.clone())
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    }
    Ok(config)
}

/// Parse `KEY=VALUE` overrides. Values are YAML, so `3`, `true` and `[a, b]`
/// keep their types.
pub fn parse_step_config(pairs: &[String]) -> Result<IndexMap<String, Value>> {
    let mut overrides = IndexMap::new();
    for pair in pairs {
        let Some((key, raw)) = pair.split_once('=') else {
            bail!("Invalid step config '{pair}', expected KEY=VALUE");
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("Invalid step config '{pair}', key is empty");
        }

        let value = if raw.is_empty() {
            Value::String(String::new())
        } else {
            serde_yaml::from_str(raw)
                .with_context(|| format!("Invalid value for step config '{key}'"))?
        };
        overrides.insert(key.to_string(), value);
    }
    Ok(overrides)
}
