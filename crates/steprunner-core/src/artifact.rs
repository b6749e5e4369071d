//! Named outputs recorded on a step result.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// A named value produced by a sub-step.
///
/// Artifacts and evidence share this shape; which map an entry lives in on the
/// [`StepResult`](crate::StepResult) decides how it is consumed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResultArtifact {
    pub name: String,
    pub value: Value,
    #[serde(default)]
    pub description: String,
}

impl StepResultArtifact {
    pub fn new(name: impl Into<String>, value: Value, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value,
            description: description.into(),
        }
    }

    /// Plain `{name, value, description}` form used by the YAML/JSON exports.
    pub fn to_dict(&self) -> Value {
        json!({
            "name": self.name,
            "value": self.value,
            "description": self.description,
        })
    }
}
