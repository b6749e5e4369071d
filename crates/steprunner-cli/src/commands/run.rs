//! Run a configured step.

use std::path::PathBuf;

use anyhow::{Context, Result};
use steprunner_runner::{ImplementerRegistry, RunnerSettings, StepRunner};
use tracing::info;

use super::{load_config, parse_step_config};

/// Run every sub-step of `step`. Returns whether all of them succeeded.
pub async fn run(
    settings: RunnerSettings,
    step: &str,
    environment: Option<&str>,
    config_paths: &[PathBuf],
    step_config: &[String],
) -> Result<bool> {
    let mut config = load_config(config_paths)?;

    let overrides = parse_step_config(step_config)?;
    if !overrides.is_empty() {
        config.set_step_config_overrides(step, overrides);
    }

    let runner = StepRunner::new(config, ImplementerRegistry::with_builtins(), settings);
    let success = runner
        .run_step(step, environment)
        .await
        .with_context(|| format!("Failed to run step '{step}'"))?;

    info!(
        step,
        success,
        results = %runner.settings().results_yml_file().display(),
        "Finished"
    );
    println!(
        "Step '{}' {}",
        step,
        if success { "succeeded" } else { "failed" }
    );
    Ok(success)
}
