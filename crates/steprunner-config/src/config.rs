//! Top-level configuration: global defaults, per-environment defaults and
//! step definitions merged from any number of sources.
//!
//! A configuration document looks like:
//!
//! ```yaml
//! step-runner-config:
//!   config-decryptors:
//!   - implementer: sops
//!   global-defaults:
//!     organization: acme
//!   global-environment-defaults:
//!     dev:
//!       kube-api-uri: https://dev.example.com
//!   generate-metadata:
//!     implementer: Maven
//!   deploy:
//!   - implementer: ArgoCD
//!     name: argocd-app
//!     config:
//!       argocd-username: admin
//!     environment-config:
//!       dev:
//!         argocd-api: argocd.dev.example.com
//! ```

use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::loader::{ConfigInput, collect_config_files, parse_config_file};
use crate::merge::deep_merge;
use crate::value::{child_path, map_from_value};
use crate::{
    ConfigError, ConfigMap, ConfigNode, ConfigResult, ConfigSource, ConfigValue,
    DecryptorFactory, DecryptorRegistry, PathPart, StepConfig, SubStepRef,
};

/// Root key every configuration document must have.
pub const CONFIG_KEY: &str = "step-runner-config";
/// Historical root key, still accepted.
pub const LEGACY_CONFIG_KEY: &str = "tssc-config";

pub const GLOBAL_DEFAULTS_KEY: &str = "global-defaults";
pub const GLOBAL_ENVIRONMENT_DEFAULTS_KEY: &str = "global-environment-defaults";
pub const CONFIG_DECRYPTORS_KEY: &str = "config-decryptors";
pub const ENVIRONMENT_NAME_KEY: &str = "environment-name";

pub const IMPLEMENTER_KEY: &str = "implementer";
pub const SUB_STEP_NAME_KEY: &str = "name";
pub const SUB_STEP_CONFIG_KEY: &str = "config";
pub const SUB_STEP_ENVIRONMENT_CONFIG_KEY: &str = "environment-config";

/// Merged configuration from every added source.
#[derive(Debug, Clone)]
pub struct Config {
    global_defaults: ConfigMap,
    global_environment_defaults: IndexMap<String, ConfigMap>,
    step_configs: IndexMap<String, StepConfig>,
    decryptors: DecryptorRegistry,
    decryptor_factory: DecryptorFactory,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// An empty configuration that knows the built-in decryptors.
    pub fn new() -> Self {
        Self::with_decryptor_factory(DecryptorFactory::with_builtins())
    }

    /// An empty configuration resolving `config-decryptors` entries with `factory`.
    pub fn with_decryptor_factory(factory: DecryptorFactory) -> Self {
        Self {
            global_defaults: ConfigMap::new(),
            global_environment_defaults: IndexMap::new(),
            step_configs: IndexMap::new(),
            decryptors: DecryptorRegistry::new(),
            decryptor_factory: factory,
        }
    }

    /// Build a configuration from a single source.
    pub fn from_source(source: impl Into<ConfigInput>) -> ConfigResult<Self> {
        let mut config = Self::new();
        config.add_config(source)?;
        Ok(config)
    }

    pub fn global_defaults(&self) -> &ConfigMap {
        &self.global_defaults
    }

    pub fn global_environment_defaults(&self) -> &IndexMap<String, ConfigMap> {
        &self.global_environment_defaults
    }

    pub fn get_global_environment_defaults_for_environment(
        &self,
        environment: &str,
    ) -> Option<&ConfigMap> {
        self.global_environment_defaults.get(environment)
    }

    pub fn decryptors(&self) -> &DecryptorRegistry {
        &self.decryptors
    }

    pub fn decryptors_mut(&mut self) -> &mut DecryptorRegistry {
        &mut self.decryptors
    }

    /// Step configurations in order of first appearance.
    pub fn step_configs(&self) -> impl Iterator<Item = &StepConfig> {
        self.step_configs.values()
    }

    pub fn get_step_config(&self, step_name: &str) -> Option<&StepConfig> {
        self.step_configs.get(step_name)
    }

    pub fn get_sub_step(&self, step_name: &str, sub_step_name: &str) -> Option<SubStepRef<'_>> {
        let step = self.step_configs.get(step_name)?;
        let sub_step = step.get_sub_step(sub_step_name)?;
        Some(SubStepRef::new(self, step, sub_step))
    }

    /// Every sub-step of a step, in order; empty when the step is unknown.
    pub fn get_sub_steps(&self, step_name: &str) -> Vec<SubStepRef<'_>> {
        self.step_configs
            .get(step_name)
            .map(|step| {
                step.sub_steps()
                    .map(|sub_step| SubStepRef::new(self, step, sub_step))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Replace the overrides of a step, creating the step if needed.
    pub fn set_step_config_overrides(&mut self, step_name: &str, overrides: IndexMap<String, Value>) {
        debug!(step = step_name, keys = overrides.len(), "Setting step config overrides");
        self.step_configs
            .entry(step_name.to_string())
            .or_insert_with(|| StepConfig::new(step_name))
            .set_step_config_overrides(&overrides);
    }

    /// Add a document, file, directory or list of those.
    pub fn add_config(&mut self, source: impl Into<ConfigInput>) -> ConfigResult<()> {
        match source.into() {
            ConfigInput::List(items) => {
                for item in items {
                    self.add_config(item)?;
                }
                Ok(())
            }
            ConfigInput::Path(path) if path.is_dir() => {
                for file in collect_config_files(&path)? {
                    self.add_config_file(&file)?;
                }
                Ok(())
            }
            ConfigInput::Path(path) => self.add_config_file(&path),
            ConfigInput::Document(document) => {
                let source = ConfigSource::Document(Arc::new(document.clone()));
                self.add_config_document(&document, &source)
            }
        }
    }

    fn add_config_file(&mut self, path: &Path) -> ConfigResult<()> {
        info!(path = %path.display(), "Loading configuration file");
        let document = parse_config_file(path)?;
        self.add_config_document(&document, &ConfigSource::File(path.to_path_buf()))
    }

    fn add_config_document(&mut self, document: &Value, source: &ConfigSource) -> ConfigResult<()> {
        let (root_key, root) = root_of(document)?;
        let root = root.as_object().ok_or_else(|| {
            ConfigError::invalid_type(format!("'{root_key}'"), "mapping", root)
        })?;
        let root_path = [PathPart::from(root_key)];

        for (key, value) in root {
            let path = child_path(&root_path, key.as_str().into());
            match key.as_str() {
                GLOBAL_DEFAULTS_KEY => self.add_global_defaults(value, source, &path)?,
                GLOBAL_ENVIRONMENT_DEFAULTS_KEY => {
                    self.add_global_environment_defaults(value, source, &path)?;
                }
                CONFIG_DECRYPTORS_KEY => self.add_decryptors(value)?,
                step_name => self.add_step(step_name, value, source, &path)?,
            }
        }

        if let Some(object) = document.as_object() {
            for key in object.keys().filter(|k| *k != root_key) {
                warn!(key = %key, %source, "Ignoring unknown top-level configuration key");
            }
        }
        Ok(())
    }

    fn add_global_defaults(
        &mut self,
        value: &Value,
        source: &ConfigSource,
        path: &[PathPart],
    ) -> ConfigResult<()> {
        let defaults = expect_mapping(value, GLOBAL_DEFAULTS_KEY)?;
        deep_merge(
            &mut self.global_defaults,
            map_from_value(defaults, source, path),
            false,
        )
        .map_err(|e| ConfigError::GlobalDefaultsConflict {
            source: Box::new(e),
        })
    }

    fn add_global_environment_defaults(
        &mut self,
        value: &Value,
        source: &ConfigSource,
        path: &[PathPart],
    ) -> ConfigResult<()> {
        let environments = expect_mapping(value, GLOBAL_ENVIRONMENT_DEFAULTS_KEY)?;
        for (environment, defaults) in environments {
            let context = format!("{GLOBAL_ENVIRONMENT_DEFAULTS_KEY}.{environment}");
            let defaults = expect_mapping(defaults, &context)?;
            let env_path = child_path(path, environment.as_str().into());

            let mut incoming = map_from_value(defaults, source, &env_path);
            incoming.insert(
                ENVIRONMENT_NAME_KEY.to_string(),
                ConfigNode::Value(ConfigValue::new(
                    Value::String(environment.clone()),
                    source.clone(),
                    child_path(&env_path, ENVIRONMENT_NAME_KEY.into()),
                )),
            );

            let existing = self
                .global_environment_defaults
                .entry(environment.clone())
                .or_default();
            deep_merge(existing, incoming, false).map_err(|e| {
                ConfigError::GlobalEnvironmentDefaultsConflict {
                    environment: environment.clone(),
                    source: Box::new(e),
                }
            })?;
        }
        Ok(())
    }

    fn add_decryptors(&mut self, value: &Value) -> ConfigResult<()> {
        let definitions = value.as_array().ok_or_else(|| {
            ConfigError::invalid_type(CONFIG_DECRYPTORS_KEY, "list of decryptor definitions", value)
        })?;

        for (index, definition) in definitions.iter().enumerate() {
            let context = format!("{CONFIG_DECRYPTORS_KEY}[{index}]");
            let definition = expect_mapping(definition, &context)?;
            let implementer = required_string(definition, IMPLEMENTER_KEY, &context)?;
            let empty = Map::new();
            let decryptor_config = match definition.get(SUB_STEP_CONFIG_KEY) {
                None | Some(Value::Null) => &empty,
                Some(config) => expect_mapping(config, &format!("{context}.{SUB_STEP_CONFIG_KEY}"))?,
            };

            let decryptor = self.decryptor_factory.create(implementer, decryptor_config)?;
            self.decryptors.register(decryptor);
        }
        Ok(())
    }

    fn add_step(
        &mut self,
        step_name: &str,
        value: &Value,
        source: &ConfigSource,
        path: &[PathPart],
    ) -> ConfigResult<()> {
        let definitions: Vec<(&Map<String, Value>, Vec<PathPart>)> = match value {
            Value::Object(definition) => vec![(definition, path.to_vec())],
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(index, item)| -> ConfigResult<(&Map<String, Value>, Vec<PathPart>)> {
                    let context = format!("step '{step_name}' sub-step [{index}]");
                    Ok((expect_mapping(item, &context)?, child_path(path, index.into())))
                })
                .collect::<ConfigResult<_>>()?,
            other => {
                return Err(ConfigError::invalid_type(
                    format!("step '{step_name}'"),
                    "mapping or list of mappings",
                    other,
                ));
            }
        };

        for (definition, definition_path) in definitions {
            self.add_sub_step(step_name, definition, source, &definition_path)?;
        }
        Ok(())
    }

    fn add_sub_step(
        &mut self,
        step_name: &str,
        definition: &Map<String, Value>,
        source: &ConfigSource,
        path: &[PathPart],
    ) -> ConfigResult<()> {
        let context = format!("step '{step_name}' sub-step");
        let implementer = required_string(definition, IMPLEMENTER_KEY, &context)?;
        let sub_step_name = match definition.get(SUB_STEP_NAME_KEY) {
            None | Some(Value::Null) => implementer,
            Some(Value::String(name)) => name.as_str(),
            Some(other) => {
                return Err(ConfigError::invalid_type(
                    format!("{context} {SUB_STEP_NAME_KEY}"),
                    "string",
                    other,
                ));
            }
        };

        let sub_step_config = match definition.get(SUB_STEP_CONFIG_KEY) {
            None | Some(Value::Null) => ConfigMap::new(),
            Some(config) => {
                let config = expect_mapping(config, &format!("{context} '{sub_step_name}' config"))?;
                map_from_value(config, source, &child_path(path, SUB_STEP_CONFIG_KEY.into()))
            }
        };

        let mut sub_step_env_config = IndexMap::new();
        if let Some(env_config) = definition
            .get(SUB_STEP_ENVIRONMENT_CONFIG_KEY)
            .filter(|v| !v.is_null())
        {
            let env_context = format!("{context} '{sub_step_name}' {SUB_STEP_ENVIRONMENT_CONFIG_KEY}");
            let env_path = child_path(path, SUB_STEP_ENVIRONMENT_CONFIG_KEY.into());
            for (environment, config) in expect_mapping(env_config, &env_context)? {
                let config = expect_mapping(config, &format!("{env_context}.{environment}"))?;
                sub_step_env_config.insert(
                    environment.clone(),
                    map_from_value(config, source, &child_path(&env_path, environment.as_str().into())),
                );
            }
        }

        self.step_configs
            .entry(step_name.to_string())
            .or_insert_with(|| StepConfig::new(step_name))
            .add_or_update_sub_step_config(
                sub_step_name,
                implementer,
                sub_step_config,
                sub_step_env_config,
            )
    }
}

fn root_of(document: &Value) -> ConfigResult<(&'static str, &Value)> {
    let missing = || ConfigError::MissingRootKey {
        expected: CONFIG_KEY.to_string(),
        received: document.to_string(),
    };
    let object = document.as_object().ok_or_else(missing)?;

    match (object.get(CONFIG_KEY), object.get(LEGACY_CONFIG_KEY)) {
        (Some(root), None) => Ok((CONFIG_KEY, root)),
        (None, Some(root)) => Ok((LEGACY_CONFIG_KEY, root)),
        (Some(_), Some(_)) => Err(ConfigError::AmbiguousRootKey(
            CONFIG_KEY.to_string(),
            LEGACY_CONFIG_KEY.to_string(),
        )),
        (None, None) => Err(missing()),
    }
}

fn expect_mapping<'v>(value: &'v Value, context: &str) -> ConfigResult<&'v Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| ConfigError::invalid_type(context, "mapping", value))
}

fn required_string<'v>(
    definition: &'v Map<String, Value>,
    key: &str,
    context: &str,
) -> ConfigResult<&'v str> {
    match definition.get(key) {
        Some(Value::String(value)) => Ok(value.as_str()),
        None | Some(Value::Null) => Err(ConfigError::MissingField {
            context: context.to_string(),
            field: key.to_string(),
        }),
        Some(other) => Err(ConfigError::invalid_type(
            format!("{context} {key}"),
            "string",
            other,
        )),
    }
}
