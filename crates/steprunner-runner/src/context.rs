//! What an implementer sees while running one sub-step.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde_json::Value;
use steprunner_config::{RuntimeStepConfig, SubStepRef};
use steprunner_core::{ResultQuery, WorkflowResult};

use crate::RunnerResult;

/// Configuration and prior results for one sub-step run.
#[derive(Debug)]
pub struct StepContext<'a> {
    sub_step: SubStepRef<'a>,
    environment: Option<&'a str>,
    defaults: IndexMap<String, Value>,
    workflow_result: &'a WorkflowResult,
    work_dir: PathBuf,
}

impl<'a> StepContext<'a> {
    pub fn new(
        sub_step: SubStepRef<'a>,
        environment: Option<&'a str>,
        defaults: IndexMap<String, Value>,
        workflow_result: &'a WorkflowResult,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            sub_step,
            environment,
            defaults,
            workflow_result,
            work_dir: work_dir.into(),
        }
    }

    pub fn step_name(&self) -> &'a str {
        self.sub_step.step_name()
    }

    pub fn sub_step_name(&self) -> &'a str {
        self.sub_step.sub_step_name()
    }

    pub fn sub_step(&self) -> SubStepRef<'a> {
        self.sub_step
    }

    pub fn environment(&self) -> Option<&'a str> {
        self.environment
    }

    /// Working directory reserved for this step.
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn workflow_result(&self) -> &'a WorkflowResult {
        self.workflow_result
    }

    /// The flattened configuration of the sub-step for this run.
    pub fn runtime_config(&self) -> RuntimeStepConfig {
        self.sub_step
            .get_copy_of_runtime_step_config(self.environment, Some(&self.defaults))
    }

    /// A configuration value, decrypted, ignoring previous results.
    pub fn get_config_value(&self, key: &str) -> RunnerResult<Option<Value>> {
        Ok(self
            .sub_step
            .get_config_value(key, self.environment, Some(&self.defaults))?)
    }

    /// A configuration value, or else the newest matching artifact recorded by
    /// a previous step for this environment.
    pub fn get_value(&self, key: &str) -> RunnerResult<Option<Value>> {
        if let Some(value) = self.get_config_value(key)? {
            return Ok(Some(value));
        }

        let query = match self.environment {
            Some(environment) => ResultQuery::any().environment(environment),
            None => ResultQuery::any(),
        };
        Ok(self.workflow_result.get_artifact_value(key, &query).cloned())
    }

    /// Keys from `required` that resolve neither from configuration nor from
    /// previous results.
    pub fn missing_keys(&self, required: &[&str]) -> RunnerResult<Vec<String>> {
        let mut missing = Vec::new();
        for key in required {
            if self.get_value(key)?.is_none() {
                missing.push(key.to_string());
            }
        }
        Ok(missing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use steprunner_config::Config;
    use steprunner_core::StepResult;

    fn config() -> Config {
        Config::from_source(json!({
            "step-runner-config": {
                "global-environment-defaults": {
                    "dev": {"namespace": "app-dev"}
                },
                "deploy": {
                    "implementer": "command",
                    "config": {"command": "deploy.sh"}
                }
            }
        }))
        .unwrap()
    }

    fn workflow_result() -> WorkflowResult {
        let mut workflow = WorkflowResult::new();

        let mut build = StepResult::new("package", "Maven", "Maven", None);
        build.add_artifact("image-tag", "1.0.0", "").unwrap();
        build.add_artifact("command", "from-results", "").unwrap();
        workflow.add_step_result(build).unwrap();

        let mut dev = StepResult::new("package", "Maven", "Maven", Some("dev".to_string()));
        dev.add_artifact("image-tag", "1.0.0-dev", "").unwrap();
        workflow.add_step_result(dev).unwrap();

        let mut prod = StepResult::new("package", "Maven", "Maven", Some("prod".to_string()));
        prod.add_artifact("prod-only", "x", "").unwrap();
        workflow.add_step_result(prod).unwrap();
        workflow
    }

    #[test]
    fn test_config_value_wins_over_results() {
        let config = config();
        let workflow = workflow_result();
        let sub_step = config.get_sub_step("deploy", "command").unwrap();
        let context = StepContext::new(sub_step, None, IndexMap::new(), &workflow, "/tmp");

        assert_eq!(context.get_value("command").unwrap(), Some(json!("deploy.sh")));
    }

    #[test]
    fn test_falls_back_to_results_for_environment() {
        let config = config();
        let workflow = workflow_result();
        let sub_step = config.get_sub_step("deploy", "command").unwrap();

        let dev = StepContext::new(sub_step, Some("dev"), IndexMap::new(), &workflow, "/tmp");
        assert_eq!(dev.get_value("image-tag").unwrap(), Some(json!("1.0.0-dev")));
        assert_eq!(dev.get_value("namespace").unwrap(), Some(json!("app-dev")));
        assert_eq!(dev.get_value("prod-only").unwrap(), None);

        let test = StepContext::new(sub_step, Some("test"), IndexMap::new(), &workflow, "/tmp");
        assert_eq!(test.get_value("image-tag").unwrap(), Some(json!("1.0.0")));
        assert_eq!(test.get_value("namespace").unwrap(), None);
    }

    #[test]
    fn test_defaults_are_lowest_tier() {
        let config = config();
        let workflow = WorkflowResult::new();
        let sub_step = config.get_sub_step("deploy", "command").unwrap();

        let mut defaults = IndexMap::new();
        defaults.insert("command".to_string(), json!("default.sh"));
        defaults.insert("shell".to_string(), json!("/bin/sh"));
        let context = StepContext::new(sub_step, None, defaults, &workflow, "/tmp");

        assert_eq!(context.get_value("command").unwrap(), Some(json!("deploy.sh")));
        assert_eq!(context.get_value("shell").unwrap(), Some(json!("/bin/sh")));
        assert_eq!(context.runtime_config().len(), 2);
    }

    #[test]
    fn test_missing_keys() {
        let config = config();
        let workflow = workflow_result();
        let sub_step = config.get_sub_step("deploy", "command").unwrap();
        let context = StepContext::new(sub_step, Some("dev"), IndexMap::new(), &workflow, "/tmp");

        let missing = context
            .missing_keys(&["command", "image-tag", "argocd-api", "kube-uri"])
            .unwrap();
        assert_eq!(missing, vec!["argocd-api", "kube-uri"]);
    }
}
