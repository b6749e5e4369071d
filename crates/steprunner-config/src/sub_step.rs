//! Sub-step configuration and runtime configuration resolution.

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::merge::{deep_merge, deep_merge_under};
use crate::value::{map_from_plain, map_to_value};
use crate::{Config, ConfigError, ConfigMap, ConfigNode, ConfigResult, DecryptorRegistry, StepConfig};

/// Configuration for one implementer invocation within a step.
#[derive(Debug, Clone)]
pub struct SubStepConfig {
    sub_step_name: String,
    sub_step_implementer_name: String,
    sub_step_config: ConfigMap,
    sub_step_env_config: IndexMap<String, ConfigMap>,
}

impl SubStepConfig {
    pub fn new(
        sub_step_name: impl Into<String>,
        sub_step_implementer_name: impl Into<String>,
        sub_step_config: ConfigMap,
        sub_step_env_config: IndexMap<String, ConfigMap>,
    ) -> Self {
        Self {
            sub_step_name: sub_step_name.into(),
            sub_step_implementer_name: sub_step_implementer_name.into(),
            sub_step_config,
            sub_step_env_config,
        }
    }

    pub fn sub_step_name(&self) -> &str {
        &self.sub_step_name
    }

    pub fn sub_step_implementer_name(&self) -> &str {
        &self.sub_step_implementer_name
    }

    pub fn sub_step_config(&self) -> &ConfigMap {
        &self.sub_step_config
    }

    pub fn sub_step_env_config(&self) -> &IndexMap<String, ConfigMap> {
        &self.sub_step_env_config
    }

    pub fn get_sub_step_env_config(&self, environment: &str) -> Option<&ConfigMap> {
        self.sub_step_env_config.get(environment)
    }

    /// Merge more sub-step config in. Duplicate keys with different values are
    /// an error.
    pub fn merge_sub_step_config(&mut self, step_name: &str, update: ConfigMap) -> ConfigResult<()> {
        deep_merge(&mut self.sub_step_config, update, false)
            .map_err(|e| self.conflict(step_name, e))
    }

    /// Merge more per-environment sub-step config in, with the same conflict
    /// rules as [`merge_sub_step_config`](Self::merge_sub_step_config). Conflict
    /// paths start with the environment name.
    pub fn merge_sub_step_env_config(
        &mut self,
        step_name: &str,
        update: IndexMap<String, ConfigMap>,
    ) -> ConfigResult<()> {
        for (environment, env_config) in update {
            let existing = self.sub_step_env_config.entry(environment.clone()).or_default();
            if let Err(e) = deep_merge_under(&environment, existing, env_config, false) {
                return Err(self.conflict(step_name, e));
            }
        }
        Ok(())
    }

    fn conflict(&self, step_name: &str, source: ConfigError) -> ConfigError {
        ConfigError::SubStepConflict {
            step: step_name.to_string(),
            sub_step: self.sub_step_name.clone(),
            source: Box::new(source),
        }
    }
}

/// A sub-step viewed together with the step and configuration that own it,
/// which is everything needed to resolve its runtime configuration.
#[derive(Debug, Clone, Copy)]
pub struct SubStepRef<'a> {
    config: &'a Config,
    step: &'a StepConfig,
    sub_step: &'a SubStepConfig,
}

impl<'a> SubStepRef<'a> {
    pub(crate) fn new(config: &'a Config, step: &'a StepConfig, sub_step: &'a SubStepConfig) -> Self {
        Self {
            config,
            step,
            sub_step,
        }
    }

    pub fn step_name(&self) -> &'a str {
        self.step.step_name()
    }

    pub fn sub_step_name(&self) -> &'a str {
        self.sub_step.sub_step_name()
    }

    pub fn sub_step_implementer_name(&self) -> &'a str {
        self.sub_step.sub_step_implementer_name()
    }

    pub fn sub_step(&self) -> &'a SubStepConfig {
        self.sub_step
    }

    pub fn step(&self) -> &'a StepConfig {
        self.step
    }

    pub fn decryptors(&self) -> &'a DecryptorRegistry {
        self.config.decryptors()
    }

    /// Flatten every configuration tier into one mapping. From lowest to
    /// highest precedence:
    ///
    /// 1. `defaults` supplied by the caller
    /// 2. global defaults
    /// 3. global environment defaults for `environment`
    /// 4. the sub-step's config
    /// 5. the sub-step's environment config for `environment`
    /// 6. the step's config overrides
    ///
    /// Higher tiers replace lower ones key by key; nested mappings are not merged.
    pub fn get_copy_of_runtime_step_config(
        &self,
        environment: Option<&str>,
        defaults: Option<&IndexMap<String, Value>>,
    ) -> RuntimeStepConfig {
        let mut runtime = ConfigMap::new();
        for tier in self.tiers(environment, defaults) {
            runtime.extend(tier.iter().map(|(key, node)| (key.clone(), node.clone())));
        }

        RuntimeStepConfig {
            values: runtime,
            environment: environment.map(str::to_string),
        }
    }

    /// Resolve a single key through the tiers, highest first.
    pub fn get_config_node(
        &self,
        key: &str,
        environment: Option<&str>,
        defaults: Option<&IndexMap<String, Value>>,
    ) -> Option<ConfigNode> {
        self.tiers(environment, defaults)
            .iter()
            .rev()
            .find_map(|tier| tier.get(key).cloned())
    }

    /// Resolve and decrypt a single key, `None` when no tier defines it.
    pub fn get_config_value(
        &self,
        key: &str,
        environment: Option<&str>,
        defaults: Option<&IndexMap<String, Value>>,
    ) -> ConfigResult<Option<Value>> {
        self.get_config_node(key, environment, defaults)
            .map(|node| node.to_value(self.decryptors()))
            .transpose()
    }

    fn tiers(
        &self,
        environment: Option<&str>,
        defaults: Option<&IndexMap<String, Value>>,
    ) -> Vec<std::borrow::Cow<'a, ConfigMap>> {
        use std::borrow::Cow;

        let mut tiers = Vec::with_capacity(6);
        if let Some(defaults) = defaults {
            tiers.push(Cow::Owned(map_from_plain(defaults)));
        }
        tiers.push(Cow::Borrowed(self.config.global_defaults()));
        if let Some(environment) = environment {
            if let Some(env_defaults) = self
                .config
                .get_global_environment_defaults_for_environment(environment)
            {
                tiers.push(Cow::Borrowed(env_defaults));
            }
        }
        tiers.push(Cow::Borrowed(self.sub_step.sub_step_config()));
        if let Some(environment) = environment {
            if let Some(env_config) = self.sub_step.get_sub_step_env_config(environment) {
                tiers.push(Cow::Borrowed(env_config));
            }
        }
        tiers.push(Cow::Borrowed(self.step.step_config_overrides()));
        tiers
    }
}

/// Flattened configuration for one sub-step in one environment.
#[derive(Debug, Clone, Default)]
pub struct RuntimeStepConfig {
    values: ConfigMap,
    environment: Option<String>,
}

impl RuntimeStepConfig {
    pub fn environment(&self) -> Option<&str> {
        self.environment.as_deref()
    }

    pub fn get(&self, key: &str) -> Option<&ConfigNode> {
        self.values.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConfigNode)> {
        self.values.iter().map(|(key, node)| (key.as_str(), node))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Resolved (decrypted) value of `key`.
    pub fn get_value(&self, key: &str, decryptors: &DecryptorRegistry) -> ConfigResult<Option<Value>> {
        self.values
            .get(key)
            .map(|node| node.to_value(decryptors))
            .transpose()
    }

    /// Every value resolved (decrypted) into a plain mapping.
    pub fn to_values(&self, decryptors: &DecryptorRegistry) -> ConfigResult<Map<String, Value>> {
        map_to_value(&self.values, decryptors)
    }

    /// Every value as written, without decryption. Suitable for printing.
    pub fn to_raw_values(&self) -> Map<String, Value> {
        self.values
            .iter()
            .map(|(key, node)| (key.clone(), node.to_raw_value()))
            .collect()
    }
}
