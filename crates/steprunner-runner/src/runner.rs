//! Step runner - executes every sub-step of a step and records the results.

use std::path::{Path, PathBuf};

use steprunner_config::{Config, SubStepRef};
use steprunner_core::{StepResult, StepResultKey, WorkflowResult};
use tracing::{error, info, warn};

use crate::{ImplementerRegistry, RunnerError, RunnerResult, StepContext, StepImplementer};

pub const DEFAULT_RESULTS_DIR: &str = "step-runner-results";
pub const DEFAULT_WORK_DIR: &str = "step-runner-working";
pub const DEFAULT_RESULTS_FILE_NAME: &str = "step-runner-results";

/// Where results, exports and per-step working files go.
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    /// Directory for the YAML/JSON result exports.
    pub results_dir: PathBuf,
    /// Directory for the state file and per-step working directories.
    pub work_dir: PathBuf,
    /// Base name shared by the exports and the state file.
    pub results_file_name: String,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from(DEFAULT_RESULTS_DIR),
            work_dir: PathBuf::from(DEFAULT_WORK_DIR),
            results_file_name: DEFAULT_RESULTS_FILE_NAME.to_string(),
        }
    }
}

impl RunnerSettings {
    pub fn state_file(&self) -> PathBuf {
        self.work_dir
            .join(format!("{}.state.json", self.results_file_name))
    }

    pub fn results_yml_file(&self) -> PathBuf {
        self.results_dir
            .join(format!("{}.yml", self.results_file_name))
    }

    pub fn results_json_file(&self) -> PathBuf {
        self.results_dir
            .join(format!("{}.json", self.results_file_name))
    }

    pub fn step_work_dir(&self, step_name: &str) -> PathBuf {
        self.work_dir.join(step_name)
    }
}

/// Runs configured steps.
#[derive(Debug)]
pub struct StepRunner {
    config: Config,
    implementers: ImplementerRegistry,
    settings: RunnerSettings,
}

impl StepRunner {
    pub fn new(config: Config, implementers: ImplementerRegistry, settings: RunnerSettings) -> Self {
        Self {
            config,
            implementers,
            settings,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn settings(&self) -> &RunnerSettings {
        &self.settings
    }

    /// Results recorded so far by any step.
    pub fn load_workflow_result(&self) -> RunnerResult<WorkflowResult> {
        Ok(WorkflowResult::load_from_state_file(self.settings.state_file())?)
    }

    /// Run every sub-step of `step_name` in order.
    ///
    /// A failing sub-step does not stop the ones after it. Returns whether
    /// all sub-steps succeeded. Errors are reserved for problems that prevent
    /// running or recording the step at all.
    pub async fn run_step(&self, step_name: &str, environment: Option<&str>) -> RunnerResult<bool> {
        let sub_steps = self.config.get_sub_steps(step_name);
        if sub_steps.is_empty() {
            return Err(RunnerError::StepNotFound(step_name.to_string()));
        }

        let implementers = sub_steps
            .iter()
            .map(|sub_step| self.implementer_for(sub_step))
            .collect::<RunnerResult<Vec<_>>>()?;

        let mut workflow_result = self.load_workflow_result()?;
        for sub_step in &sub_steps {
            let key = StepResultKey {
                step_name: step_name.to_string(),
                sub_step_name: sub_step.sub_step_name().to_string(),
                environment: environment.map(str::to_string),
            };
            if workflow_result
                .get_step_result(&key.step_name, &key.sub_step_name, environment)
                .is_some()
            {
                return Err(steprunner_core::Error::DuplicateStepResult(key).into());
            }
        }

        let step_work_dir = self.settings.step_work_dir(step_name);
        tokio::fs::create_dir_all(&step_work_dir)
            .await
            .map_err(|e| RunnerError::io(&step_work_dir, e))?;

        info!(step = step_name, environment = ?environment, sub_steps = sub_steps.len(), "Running step");

        let mut success = true;
        for (sub_step, implementer) in sub_steps.iter().zip(&implementers) {
            let result = Self::run_sub_step(
                *sub_step,
                implementer.as_ref(),
                environment,
                &workflow_result,
                &step_work_dir,
            )
            .await;

            if result.success() {
                info!(step = step_name, sub_step = sub_step.sub_step_name(), "Sub-step succeeded");
            } else {
                warn!(
                    step = step_name,
                    sub_step = sub_step.sub_step_name(),
                    message = result.message(),
                    "Sub-step failed"
                );
                success = false;
            }

            workflow_result.add_step_result(result)?;
            Self::persist(self.settings.clone(), workflow_result.clone()).await?;
        }

        info!(step = step_name, success, "Step completed");
        Ok(success)
    }

    fn implementer_for(&self, sub_step: &SubStepRef<'_>) -> RunnerResult<Box<dyn StepImplementer>> {
        self.implementers
            .create(sub_step.sub_step_implementer_name())
            .ok_or_else(|| RunnerError::UnknownImplementer {
                step: sub_step.step_name().to_string(),
                sub_step: sub_step.sub_step_name().to_string(),
                implementer: sub_step.sub_step_implementer_name().to_string(),
            })
    }

    /// Run one sub-step. Every outcome, including errors, becomes a result.
    async fn run_sub_step(
        sub_step: SubStepRef<'_>,
        implementer: &dyn StepImplementer,
        environment: Option<&str>,
        workflow_result: &WorkflowResult,
        work_dir: &Path,
    ) -> StepResult {
        let mut result = StepResult::new(
            sub_step.step_name(),
            sub_step.sub_step_name(),
            sub_step.sub_step_implementer_name(),
            environment.map(str::to_string),
        );

        info!(
            step = sub_step.step_name(),
            sub_step = sub_step.sub_step_name(),
            implementer = sub_step.sub_step_implementer_name(),
            environment = ?environment,
            "Running sub-step"
        );

        let context = StepContext::new(
            sub_step,
            environment,
            implementer.defaults(),
            workflow_result,
            work_dir,
        );

        let outcome = match context.missing_keys(&implementer.required_config_or_result_keys()) {
            Ok(keys) if !keys.is_empty() => Err(RunnerError::MissingRequiredKeys {
                step: sub_step.step_name().to_string(),
                sub_step: sub_step.sub_step_name().to_string(),
                keys,
            }),
            Ok(_) => implementer.run_step(&context, &mut result).await,
            Err(e) => Err(e),
        };

        if let Err(e) = outcome {
            error!(
                step = sub_step.step_name(),
                sub_step = sub_step.sub_step_name(),
                error = %e,
                "Sub-step error"
            );
            result.fail(e.to_string());
        }
        result
    }

    /// Rewrite the state file and both exports on the blocking pool.
    async fn persist(settings: RunnerSettings, workflow_result: WorkflowResult) -> RunnerResult<()> {
        tokio::task::spawn_blocking(move || -> RunnerResult<()> {
            workflow_result.write_to_state_file(settings.state_file())?;
            workflow_result.write_results_to_yml_file(settings.results_yml_file())?;
            workflow_result.write_results_to_json_file(settings.results_json_file())?;
            Ok(())
        })
        .await?
    }
}
