//! Step configuration: the sub-steps of one named step.

use indexmap::IndexMap;
use serde_json::Value;
use tracing::debug;

use crate::value::map_from_plain;
use crate::{ConfigError, ConfigMap, ConfigResult, SubStepConfig};

#[derive(Debug, Clone)]
pub struct StepConfig {
    step_name: String,
    sub_steps: IndexMap<String, SubStepConfig>,
    step_config_overrides: ConfigMap,
}

impl StepConfig {
    pub fn new(step_name: impl Into<String>) -> Self {
        Self {
            step_name: step_name.into(),
            sub_steps: IndexMap::new(),
            step_config_overrides: ConfigMap::new(),
        }
    }

    pub fn step_name(&self) -> &str {
        &self.step_name
    }

    /// Sub-steps in order of first appearance.
    pub fn sub_steps(&self) -> impl Iterator<Item = &SubStepConfig> {
        self.sub_steps.values()
    }

    pub fn get_sub_step(&self, sub_step_name: &str) -> Option<&SubStepConfig> {
        self.sub_steps.get(sub_step_name)
    }

    pub fn step_config_overrides(&self) -> &ConfigMap {
        &self.step_config_overrides
    }

    /// Replace (not merge) the step-wide overrides.
    pub fn set_step_config_overrides(&mut self, overrides: &IndexMap<String, Value>) {
        self.step_config_overrides = map_from_plain(overrides);
    }

    /// Add a sub-step, or merge into it if a sub-step of the same name exists.
    /// An existing sub-step keeps its implementer; redefining it with another
    /// implementer is an error.
    pub fn add_or_update_sub_step_config(
        &mut self,
        sub_step_name: &str,
        sub_step_implementer_name: &str,
        sub_step_config: ConfigMap,
        sub_step_env_config: IndexMap<String, ConfigMap>,
    ) -> ConfigResult<()> {
        match self.sub_steps.get_mut(sub_step_name) {
            Some(existing) => {
                if existing.sub_step_implementer_name() != sub_step_implementer_name {
                    return Err(ConfigError::ImplementerMismatch {
                        step: self.step_name.clone(),
                        sub_step: sub_step_name.to_string(),
                        existing: existing.sub_step_implementer_name().to_string(),
                        requested: sub_step_implementer_name.to_string(),
                    });
                }

                debug!(step = %self.step_name, sub_step = sub_step_name, "Merging sub-step config");
                existing.merge_sub_step_config(&self.step_name, sub_step_config)?;
                existing.merge_sub_step_env_config(&self.step_name, sub_step_env_config)?;
            }
            None => {
                debug!(
                    step = %self.step_name,
                    sub_step = sub_step_name,
                    implementer = sub_step_implementer_name,
                    "Adding sub-step"
                );
                self.sub_steps.insert(
                    sub_step_name.to_string(),
                    SubStepConfig::new(
                        sub_step_name,
                        sub_step_implementer_name,
                        sub_step_config,
                        sub_step_env_config,
                    ),
                );
            }
        }
        Ok(())
    }
}
