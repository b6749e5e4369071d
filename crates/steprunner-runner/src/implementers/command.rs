//! Runs an arbitrary command for a sub-step.
//!
//! Configuration:
//! - `command`: a string run through `shell -c`, or a list run directly (required)
//! - `env`: extra environment variables for the process
//! - `shell`: shell used for string commands, `/bin/sh` by default

use std::collections::HashMap;
use std::process::Stdio;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use steprunner_core::StepResult;
use tokio::process::Command;
use tracing::{debug, info};

use crate::{RunnerError, RunnerResult, StepContext, StepImplementer};

pub const COMMAND_KEY: &str = "command";
pub const ENV_KEY: &str = "env";
pub const SHELL_KEY: &str = "shell";

pub const OUTPUT_ARTIFACT: &str = "command-output";
pub const EXIT_CODE_EVIDENCE: &str = "command-exit-code";

#[derive(Debug, Clone, Copy, Default)]
pub struct CommandStepImplementer;

impl CommandStepImplementer {
    pub const NAME: &'static str = "command";
}

#[async_trait]
impl StepImplementer for CommandStepImplementer {
    fn defaults(&self) -> IndexMap<String, Value> {
        let mut defaults = IndexMap::new();
        defaults.insert(SHELL_KEY.to_string(), Value::String("/bin/sh".to_string()));
        defaults
    }

    fn required_config_or_result_keys(&self) -> Vec<&'static str> {
        vec![COMMAND_KEY]
    }

    async fn run_step(&self, context: &StepContext<'_>, result: &mut StepResult) -> RunnerResult<()> {
        let command = context
            .get_value(COMMAND_KEY)?
            .ok_or_else(|| RunnerError::Implementer(format!("'{COMMAND_KEY}' is required")))?;
        let shell = context
            .get_value(SHELL_KEY)?
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| "/bin/sh".to_string());
        let argv = command_line(&command, &shell)?;
        let env = match context.get_value(ENV_KEY)? {
            Some(env) => environment(&env)?,
            None => HashMap::new(),
        };

        info!(
            step = context.step_name(),
            sub_step = context.sub_step_name(),
            program = %argv[0],
            work_dir = %context.work_dir().display(),
            "Running command"
        );

        let output = Command::new(&argv[0])
            .args(&argv[1..])
            .envs(&env)
            .current_dir(context.work_dir())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| RunnerError::Implementer(format!("failed to run '{}': {e}", argv[0])))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        // Killed by a signal.
        let exit_code = output.status.code().unwrap_or(-1);
        debug!(exit_code, stdout_len = stdout.len(), stderr_len = stderr.len(), "Command finished");

        result.add_evidence(EXIT_CODE_EVIDENCE, exit_code, "Exit code of the command")?;
        let stdout = stdout.trim_end();
        if !stdout.is_empty() {
            result.add_artifact(OUTPUT_ARTIFACT, stdout, "Standard output of the command")?;
        }

        if !output.status.success() {
            result.fail(format!(
                "command exited with code {exit_code}: {}",
                stderr.trim()
            ));
        }
        Ok(())
    }
}

fn command_line(command: &Value, shell: &str) -> RunnerResult<Vec<String>> {
    match command {
        Value::String(script) if !script.trim().is_empty() => {
            Ok(vec![shell.to_string(), "-c".to_string(), script.clone()])
        }
        Value::Array(items) if !items.is_empty() => items.iter().map(scalar_to_string).collect(),
        other => Err(RunnerError::Implementer(format!(
            "'{COMMAND_KEY}' must be a non-empty string or list, found: {other}"
        ))),
    }
}

fn environment(env: &Value) -> RunnerResult<HashMap<String, String>> {
    let env = env.as_object().ok_or_else(|| {
        RunnerError::Implementer(format!("'{ENV_KEY}' must be a mapping, found: {env}"))
    })?;
    env.iter()
        .map(|(key, value)| Ok((key.clone(), scalar_to_string(value)?)))
        .collect()
}

fn scalar_to_string(value: &Value) -> RunnerResult<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Bool(_) | Value::Number(_) => Ok(value.to_string()),
        other => Err(RunnerError::Implementer(format!(
            "expected a string, number or boolean, found: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use steprunner_config::Config;
    use steprunner_core::WorkflowResult;

    async fn run(command_config: Value) -> StepResult {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::from_source(json!({
            "step-runner-config": {
                "build": {"implementer": "command", "config": command_config}
            }
        }))
        .unwrap();
        let workflow = WorkflowResult::new();
        let sub_step = config.get_sub_step("build", "command").unwrap();
        let implementer = CommandStepImplementer;
        let context = StepContext::new(sub_step, None, implementer.defaults(), &workflow, dir.path());

        let mut result = StepResult::new("build", "command", "command", None);
        implementer.run_step(&context, &mut result).await.unwrap();
        result
    }

    #[tokio::test]
    async fn test_shell_command_output() {
        let result = run(json!({"command": "echo hello"})).await;

        assert!(result.success());
        assert_eq!(result.get_artifact(OUTPUT_ARTIFACT).unwrap().value, json!("hello"));
        assert_eq!(result.get_evidence(EXIT_CODE_EVIDENCE).unwrap().value, json!(0));
    }

    #[tokio::test]
    async fn test_list_command_with_env() {
        let result = run(json!({
            "command": ["sh", "-c", "echo $GREETING-$COUNT"],
            "env": {"GREETING": "hi", "COUNT": 2}
        }))
        .await;

        assert!(result.success());
        assert_eq!(result.get_artifact(OUTPUT_ARTIFACT).unwrap().value, json!("hi-2"));
    }

    #[tokio::test]
    async fn test_failing_command() {
        let result = run(json!({"command": "echo broken >&2; exit 3"})).await;

        assert!(!result.success());
        assert!(result.message().contains("code 3"));
        assert!(result.message().contains("broken"));
        assert!(result.get_artifact(OUTPUT_ARTIFACT).is_none());
        assert_eq!(result.get_evidence(EXIT_CODE_EVIDENCE).unwrap().value, json!(3));
    }

    #[tokio::test]
    async fn test_runs_in_work_dir() {
        let result = run(json!({"command": "touch marker && ls"})).await;
        assert_eq!(result.get_artifact(OUTPUT_ARTIFACT).unwrap().value, json!("marker"));
    }

    #[test]
    fn test_command_line() {
        assert_eq!(
            command_line(&json!("make all"), "/bin/bash").unwrap(),
            vec!["/bin/bash", "-c", "make all"]
        );
        assert_eq!(
            command_line(&json!(["git", "tag", 1]), "/bin/sh").unwrap(),
            vec!["git", "tag", "1"]
        );
        assert!(command_line(&json!([]), "/bin/sh").is_err());
        assert!(command_line(&json!("  "), "/bin/sh").is_err());
        assert!(command_line(&json!({"a": 1}), "/bin/sh").is_err());
    }

    #[test]
    fn test_environment_rejects_nested_values() {
        assert!(environment(&json!({"A": {"nested": true}})).is_err());
        assert!(environment(&json!(["A"])).is_err());
    }
}
