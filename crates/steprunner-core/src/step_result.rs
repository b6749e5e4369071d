//! Outcome of one sub-step execution.

use derive_more::Display;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::artifact::StepResultArtifact;
use crate::{Error, Result};

/// Identity of a step result inside a [`WorkflowResult`](crate::WorkflowResult).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display(
    "step '{step_name}', sub-step '{sub_step_name}', environment '{}'",
    environment.as_deref().unwrap_or("<none>")
)]
pub struct StepResultKey {
    pub step_name: String,
    pub sub_step_name: String,
    pub environment: Option<String>,
}

/// Result of running one sub-step, optionally scoped to an environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    step_name: String,
    sub_step_name: String,
    sub_step_implementer_name: String,
    environment: Option<String>,
    success: bool,
    message: String,
    artifacts: IndexMap<String, StepResultArtifact>,
    evidence: IndexMap<String, StepResultArtifact>,
}

impl StepResult {
    pub fn new(
        step_name: impl Into<String>,
        sub_step_name: impl Into<String>,
        sub_step_implementer_name: impl Into<String>,
        environment: Option<String>,
    ) -> Self {
        Self {
            step_name: step_name.into(),
            sub_step_name: sub_step_name.into(),
            sub_step_implementer_name: sub_step_implementer_name.into(),
            environment,
            success: true,
            message: String::new(),
            artifacts: IndexMap::new(),
            evidence: IndexMap::new(),
        }
    }

    pub fn step_name(&self) -> &str {
        &self.step_name
    }

    pub fn sub_step_name(&self) -> &str {
        &self.sub_step_name
    }

    pub fn sub_step_implementer_name(&self) -> &str {
        &self.sub_step_implementer_name
    }

    pub fn environment(&self) -> Option<&str> {
        self.environment.as_deref()
    }

    pub fn key(&self) -> StepResultKey {
        StepResultKey {
            step_name: self.step_name.clone(),
            sub_step_name: self.sub_step_name.clone(),
            environment: self.environment.clone(),
        }
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn set_success(&mut self, success: bool) {
        self.success = success;
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn set_message(&mut self, message: impl Into<String>) {
        self.message = message.into();
    }

    /// Mark the result failed with the given message.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.success = false;
        self.message = message.into();
    }

    /// Record an artifact. A later artifact with the same name replaces the
    /// earlier one but keeps its position.
    pub fn add_artifact(
        &mut self,
        name: impl Into<String>,
        value: impl Into<Value>,
        description: impl Into<String>,
    ) -> Result<()> {
        let artifact = validated_entry("artifact", name.into(), value.into(), description)?;
        self.artifacts.insert(artifact.name.clone(), artifact);
        Ok(())
    }

    /// Record an evidence entry, same rules as [`add_artifact`](Self::add_artifact).
    pub fn add_evidence(
        &mut self,
        name: impl Into<String>,
        value: impl Into<Value>,
        description: impl Into<String>,
    ) -> Result<()> {
        let evidence = validated_entry("evidence", name.into(), value.into(), description)?;
        self.evidence.insert(evidence.name.clone(), evidence);
        Ok(())
    }

    pub fn get_artifact(&self, name: &str) -> Option<&StepResultArtifact> {
        self.artifacts.get(name)
    }

    pub fn get_evidence(&self, name: &str) -> Option<&StepResultArtifact> {
        self.evidence.get(name)
    }

    pub fn artifacts(&self) -> impl Iterator<Item = &StepResultArtifact> {
        self.artifacts.values()
    }

    pub fn evidence(&self) -> impl Iterator<Item = &StepResultArtifact> {
        self.evidence.values()
    }

    /// Nested `{[environment:] {step: {sub-step: {...}}}}` form of this result.
    pub fn get_step_result_dict(&self) -> Value {
        let body = json!({
            "sub-step-implementer-name": self.sub_step_implementer_name,
            "success": self.success,
            "message": self.message,
            "artifacts": self.artifacts.values().map(StepResultArtifact::to_dict).collect::<Vec<_>>(),
            "evidence": self.evidence.values().map(StepResultArtifact::to_dict).collect::<Vec<_>>(),
        });

        let mut sub_steps = Map::new();
        sub_steps.insert(self.sub_step_name.clone(), body);
        let mut steps = Map::new();
        steps.insert(self.step_name.clone(), Value::Object(sub_steps));

        match &self.environment {
            Some(environment) => {
                let mut environments = Map::new();
                environments.insert(environment.clone(), Value::Object(steps));
                Value::Object(environments)
            }
            None => Value::Object(steps),
        }
    }
}

// Empty strings are rejected along with null, so a legitimately empty value
// cannot be recorded.
fn validated_entry(
    kind: &str,
    name: String,
    value: Value,
    description: impl Into<String>,
) -> Result<StepResultArtifact> {
    if name.is_empty() {
        return Err(Error::InvalidArtifact(format!("name is required to add {kind}")));
    }

    let missing = match &value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    };
    if missing {
        return Err(Error::InvalidArtifact(format!(
            "value is required to add {kind} '{name}'"
        )));
    }

    Ok(StepResultArtifact::new(name, value, description))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deploy_result(environment: Option<&str>) -> StepResult {
        StepResult::new("deploy", "deploy-sub", "ArgoCD", environment.map(String::from))
    }

    #[test]
    fn test_new_result_is_successful() {
        let result = deploy_result(None);
        assert!(result.success());
        assert_eq!(result.message(), "");
        assert_eq!(result.artifacts().count(), 0);
    }

    #[test]
    fn test_add_artifact_requires_name() {
        let mut result = deploy_result(None);
        let err = result.add_artifact("", "v", "").unwrap_err();
        assert!(matches!(err, Error::InvalidArtifact(_)));
        assert!(err.to_string().contains("name is required"));
    }

    #[test]
    fn test_add_artifact_requires_value() {
        let mut result = deploy_result(None);
        let err = result.add_artifact("n", "", "").unwrap_err();
        assert!(err.to_string().contains("value is required to add artifact 'n'"));

        let err = result.add_evidence("n", Value::Null, "").unwrap_err();
        assert!(err.to_string().contains("value is required to add evidence 'n'"));
    }

    #[test]
    fn test_add_artifact_accepts_false_and_zero() {
        let mut result = deploy_result(None);
        result.add_artifact("flag", false, "").unwrap();
        result.add_artifact("count", 0, "").unwrap();
        assert_eq!(result.get_artifact("flag").unwrap().value, json!(false));
        assert_eq!(result.get_artifact("count").unwrap().value, json!(0));
    }

    #[test]
    fn test_last_artifact_write_wins_and_keeps_order() {
        let mut result = deploy_result(None);
        result.add_artifact("a", "1", "first").unwrap();
        result.add_artifact("b", "2", "").unwrap();
        result.add_artifact("a", "3", "replaced").unwrap();

        let names: Vec<_> = result.artifacts().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        let a = result.get_artifact("a").unwrap();
        assert_eq!(a.value, json!("3"));
        assert_eq!(a.description, "replaced");
    }

    #[test]
    fn test_artifacts_and_evidence_are_separate() {
        let mut result = deploy_result(None);
        result.add_artifact("shared", "artifact", "").unwrap();
        result.add_evidence("shared", "evidence", "").unwrap();

        assert_eq!(result.get_artifact("shared").unwrap().value, json!("artifact"));
        assert_eq!(result.get_evidence("shared").unwrap().value, json!("evidence"));
        assert!(result.get_evidence("missing").is_none());
    }

    #[test]
    fn test_step_result_dict_without_environment() {
        let mut result = deploy_result(None);
        result.add_artifact("image", "quay.io/app:1.0", "built image").unwrap();
        result.add_evidence("scan", true, "").unwrap();

        assert_eq!(
            result.get_step_result_dict(),
            json!({
                "deploy": {
                    "deploy-sub": {
                        "sub-step-implementer-name": "ArgoCD",
                        "success": true,
                        "message": "",
                        "artifacts": [
                            {"name": "image", "value": "quay.io/app:1.0", "description": "built image"}
                        ],
                        "evidence": [
                            {"name": "scan", "value": true, "description": ""}
                        ]
                    }
                }
            })
        );
    }

    #[test]
    fn test_step_result_dict_with_environment() {
        let mut result = deploy_result(Some("dev"));
        result.fail("sync failed");

        let dict = result.get_step_result_dict();
        let body = &dict["dev"]["deploy"]["deploy-sub"];
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["message"], json!("sync failed"));
        assert_eq!(body["artifacts"], json!([]));
    }

    #[test]
    fn test_structural_equality() {
        let mut a = deploy_result(Some("dev"));
        let mut b = deploy_result(Some("dev"));
        assert_eq!(a, b);

        a.add_artifact("x", "1", "").unwrap();
        assert_ne!(a, b);
        b.add_artifact("x", "1", "").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_key_display() {
        let key = deploy_result(Some("test")).key();
        assert_eq!(
            key.to_string(),
            "step 'deploy', sub-step 'deploy-sub', environment 'test'"
        );
        assert!(deploy_result(None).key().to_string().ends_with("environment '<none>'"));
    }
}
