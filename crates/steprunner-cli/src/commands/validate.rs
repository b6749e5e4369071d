//! Validate configuration without running anything.

use std::path::PathBuf;

use anyhow::{Result, bail};
use steprunner_runner::ImplementerRegistry;

use super::load_config;

/// Load the configuration, list its steps and check every implementer is known.
pub fn validate(config_paths: &[PathBuf]) -> Result<()> {
    let config = load_config(config_paths)?;
    let registry = ImplementerRegistry::with_builtins();

    let mut unknown = Vec::new();
    for step in config.step_configs() {
        println!("{}", step.step_name());
        for sub_step in step.sub_steps() {
            let implementer = sub_step.sub_step_implementer_name();
            let marker = if registry.contains(implementer) {
                ""
            } else {
                unknown.push(format!("{}/{}", step.step_name(), sub_step.sub_step_name()));
                " (unknown implementer)"
            };
            println!("  {} [{}]{}", sub_step.sub_step_name(), implementer, marker);
        }
    }

    if !unknown.is_empty() {
        bail!(
            "Sub-steps with unknown implementers: {} (known: {})",
            unknown.join(", "),
            registry.names().join(", ")
        );
    }

    println!("Configuration is valid");
    Ok(())
}
