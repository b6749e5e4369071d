//! Aggregate of every step result recorded during a pipeline run.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::artifact::StepResultArtifact;
use crate::{Error, Result, StepResult};

/// Root key of the YAML/JSON result exports.
pub const RESULTS_ROOT_KEY: &str = "step-runner-results";

/// Narrows an artifact/evidence lookup. Every field is optional; an empty
/// query searches every recorded result.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultQuery<'a> {
    pub step_name: Option<&'a str>,
    pub sub_step_name: Option<&'a str>,
    pub environment: Option<&'a str>,
}

impl<'a> ResultQuery<'a> {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn step(mut self, step_name: &'a str) -> Self {
        self.step_name = Some(step_name);
        self
    }

    pub fn sub_step(mut self, sub_step_name: &'a str) -> Self {
        self.sub_step_name = Some(sub_step_name);
        self
    }

    pub fn environment(mut self, environment: &'a str) -> Self {
        self.environment = Some(environment);
        self
    }

    fn matches_step(&self, result: &StepResult) -> bool {
        // The sub-step filter only narrows a step filter.
        match self.step_name {
            Some(step_name) => {
                result.step_name() == step_name
                    && self
                        .sub_step_name
                        .is_none_or(|sub_step_name| result.sub_step_name() == sub_step_name)
            }
            None => true,
        }
    }
}

/// Ordered collection of [`StepResult`]s, unique by step, sub-step and environment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowResult {
    step_results: Vec<StepResult>,
}

impl WorkflowResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.step_results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.step_results.is_empty()
    }

    /// Results in the order they were added.
    pub fn step_results(&self) -> impl Iterator<Item = &StepResult> {
        self.step_results.iter()
    }

    /// Record a result. Re-recording the same step, sub-step and environment is an error.
    pub fn add_step_result(&mut self, step_result: StepResult) -> Result<()> {
        let key = step_result.key();
        if self.step_results.iter().any(|existing| existing.key() == key) {
            return Err(Error::DuplicateStepResult(key));
        }

        debug!(%key, "Recording step result");
        self.step_results.push(step_result);
        Ok(())
    }

    pub fn get_step_result(
        &self,
        step_name: &str,
        sub_step_name: &str,
        environment: Option<&str>,
    ) -> Option<&StepResult> {
        self.step_results.iter().find(|result| {
            result.step_name() == step_name
                && result.sub_step_name() == sub_step_name
                && result.environment() == environment
        })
    }

    /// Look up an artifact value. See [`search`](Self::search) for the rules.
    pub fn get_artifact_value(&self, artifact: &str, query: &ResultQuery<'_>) -> Option<&Value> {
        self.search(query, |result| result.get_artifact(artifact))
    }

    /// Look up an evidence value, with the same rules as artifacts.
    pub fn get_evidence_value(&self, evidence: &str, query: &ResultQuery<'_>) -> Option<&Value> {
        self.search(query, |result| result.get_evidence(evidence))
    }

    /// Newest matching result wins. With an environment in the query, results
    /// recorded for that environment are searched before results recorded
    /// without one; results for other environments are never considered.
    fn search<'s>(
        &'s self,
        query: &ResultQuery<'_>,
        pick: impl Fn(&'s StepResult) -> Option<&'s StepResultArtifact>,
    ) -> Option<&'s Value> {
        let candidates = move || {
            self.step_results
                .iter()
                .rev()
                .filter(move |result| query.matches_step(result))
        };

        let found = match query.environment {
            Some(environment) => candidates()
                .filter(|result| result.environment() == Some(environment))
                .find_map(&pick)
                .or_else(|| {
                    candidates()
                        .filter(|result| result.environment().is_none())
                        .find_map(&pick)
                }),
            None => candidates().find_map(&pick),
        };

        found.map(|entry| &entry.value)
    }

    /// All results grouped by environment, step and sub-step under
    /// [`RESULTS_ROOT_KEY`].
    pub fn get_step_results_dict(&self) -> Value {
        let mut all = Map::new();
        for result in &self.step_results {
            if let Value::Object(dict) = result.get_step_result_dict() {
                merge_result_dict(&mut all, dict);
            }
        }

        let mut root = Map::new();
        root.insert(RESULTS_ROOT_KEY.to_string(), Value::Object(all));
        Value::Object(root)
    }

    pub fn write_results_to_yml_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(&self.get_step_results_dict())?;
        write_file(path, content.as_bytes())
    }

    pub fn write_results_to_json_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(&self.get_step_results_dict())?;
        write_file(path, content.as_bytes())
    }
}

fn merge_result_dict(dest: &mut Map<String, Value>, source: Map<String, Value>) {
    for (key, value) in source {
        match (dest.get_mut(&key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                merge_result_dict(existing, incoming);
            }
            (_, value) => {
                dest.insert(key, value);
            }
        }
    }
}

pub(crate) fn write_file(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    std::fs::write(path, content).map_err(|e| Error::io(path, e))
}
