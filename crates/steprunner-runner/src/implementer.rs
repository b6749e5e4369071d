//! Step implementer contract and the registry that builds implementers by name.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use steprunner_core::StepResult;

use crate::implementers::CommandStepImplementer;
use crate::{RunnerResult, StepContext};

/// Does the work of one sub-step.
///
/// Implementers read their configuration through the [`StepContext`] and
/// record artifacts, evidence and failures on the [`StepResult`]. Returning an
/// error marks the result failed with the error message.
#[async_trait]
pub trait StepImplementer: Send + Sync {
    /// Lowest-precedence configuration for the sub-step.
    fn defaults(&self) -> IndexMap<String, Value> {
        IndexMap::new()
    }

    /// Keys that must resolve from configuration or a previous step result
    /// before the sub-step runs.
    fn required_config_or_result_keys(&self) -> Vec<&'static str> {
        Vec::new()
    }

    async fn run_step(&self, context: &StepContext<'_>, result: &mut StepResult) -> RunnerResult<()>;
}

type ImplementerConstructor = Arc<dyn Fn() -> Box<dyn StepImplementer> + Send + Sync>;

/// Maps implementer names used in configuration to constructors.
#[derive(Clone, Default)]
pub struct ImplementerRegistry {
    constructors: HashMap<String, ImplementerConstructor>,
}

impl ImplementerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry knowing the built-in implementers.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(CommandStepImplementer::NAME, || {
            Box::new(CommandStepImplementer) as Box<dyn StepImplementer>
        });
        registry
    }

    /// Register (or replace) the constructor for `name`.
    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F)
    where
        F: Fn() -> Box<dyn StepImplementer> + Send + Sync + 'static,
    {
        self.constructors.insert(name.into(), Arc::new(constructor));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.constructors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn create(&self, name: &str) -> Option<Box<dyn StepImplementer>> {
        self.constructors.get(name).map(|constructor| constructor())
    }
}

impl fmt::Debug for ImplementerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImplementerRegistry")
            .field("implementers", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait]
    impl StepImplementer for Noop {
        async fn run_step(&self, _context: &StepContext<'_>, _result: &mut StepResult) -> RunnerResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_builtins() {
        let registry = ImplementerRegistry::with_builtins();
        assert!(registry.contains("command"));
        assert!(registry.create("command").is_some());
        assert!(registry.create("Maven").is_none());
    }

    #[test]
    fn test_register_extension() {
        let mut registry = ImplementerRegistry::with_builtins();
        registry.register("noop", || Box::new(Noop) as Box<dyn StepImplementer>);

        assert_eq!(registry.names(), vec!["command", "noop"]);
        let noop = registry.create("noop").unwrap();
        assert!(noop.defaults().is_empty());
        assert!(noop.required_config_or_result_keys().is_empty());
    }
}
