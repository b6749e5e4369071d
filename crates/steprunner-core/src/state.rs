//! Versioned state file carrying a [`WorkflowResult`] between step invocations.
//!
//! Each pipeline step usually runs as its own process. The state file is read
//! whole at the start of a step and rewritten whole after every sub-step.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::workflow::write_file;
use crate::{Error, Result, StepResult, WorkflowResult};

pub const STATE_FORMAT: &str = "steprunner-workflow-result";
pub const STATE_VERSION: u32 = 1;

#[derive(Serialize)]
struct StateFileRef<'a> {
    format: &'a str,
    version: u32,
    written_at: DateTime<Utc>,
    step_results: Vec<&'a StepResult>,
}

#[derive(Deserialize)]
struct StateFile {
    format: String,
    version: u32,
    step_results: Vec<StepResult>,
}

impl WorkflowResult {
    /// Write the whole result set to `path`, replacing any previous content.
    pub fn write_to_state_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let state = StateFileRef {
            format: STATE_FORMAT,
            version: STATE_VERSION,
            written_at: Utc::now(),
            step_results: self.step_results().collect(),
        };
        let content = serde_json::to_vec_pretty(&state)?;
        write_file(path, &content)?;

        info!(path = %path.display(), results = self.len(), "Wrote workflow state");
        Ok(())
    }

    /// Load a result set written by [`write_to_state_file`](Self::write_to_state_file).
    ///
    /// A missing or empty file yields an empty `WorkflowResult`.
    pub fn load_from_state_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(path = %path.display(), "No workflow state yet");
            return Ok(Self::new());
        }

        let content = std::fs::read(path).map_err(|e| Error::io(path, e))?;
        if content.iter().all(u8::is_ascii_whitespace) {
            debug!(path = %path.display(), "Workflow state is empty");
            return Ok(Self::new());
        }

        let persistence = |message: String| Error::Persistence {
            path: path.to_path_buf(),
            message,
        };

        let state: StateFile = serde_json::from_slice(&content)
            .map_err(|e| persistence(format!("not a workflow result state file: {e}")))?;

        if state.format != STATE_FORMAT {
            return Err(persistence(format!(
                "expected format '{STATE_FORMAT}', found '{}'",
                state.format
            )));
        }
        if state.version != STATE_VERSION {
            return Err(persistence(format!(
                "unsupported state version {} (supported: {STATE_VERSION})",
                state.version
            )));
        }

        let mut workflow_result = Self::new();
        for step_result in state.step_results {
            workflow_result
                .add_step_result(step_result)
                .map_err(|e| persistence(e.to_string()))?;
        }

        debug!(path = %path.display(), results = workflow_result.len(), "Loaded workflow state");
        Ok(workflow_result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ResultQuery;
    use serde_json::json;

    fn sample() -> WorkflowResult {
        let mut build = StepResult::new("build", "maven", "Maven", None);
        build.add_artifact("version", "1.0.0", "app version").unwrap();
        build.add_evidence("tests-passed", true, "").unwrap();

        let mut deploy = StepResult::new("deploy", "argocd", "ArgoCD", Some("dev".to_string()));
        deploy.add_artifact("url", "https://dev.example.com", "").unwrap();
        deploy.fail("health check failed");

        let mut wfr = WorkflowResult::new();
        wfr.add_step_result(build).unwrap();
        wfr.add_step_result(deploy).unwrap();
        wfr
    }

    #[test]
    fn test_state_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("work/step-runner-results.state.json");

        let original = sample();
        original.write_to_state_file(&path).unwrap();
        let loaded = WorkflowResult::load_from_state_file(&path).unwrap();

        assert_eq!(loaded, original);
        assert_eq!(loaded.get_step_results_dict(), original.get_step_results_dict());
        assert_eq!(
            loaded.get_artifact_value("version", &ResultQuery::any()),
            Some(&json!("1.0.0"))
        );
    }

    #[test]
    fn test_missing_state_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = WorkflowResult::load_from_state_file(dir.path().join("absent.json")).unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn test_empty_state_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.json");
        std::fs::write(&path, "").unwrap();

        assert!(WorkflowResult::load_from_state_file(&path).unwrap().is_empty());
    }

    #[test]
    fn test_wrong_shape_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bogus.json");
        std::fs::write(&path, r#"{"hello": "world"}"#).unwrap();

        let err = WorkflowResult::load_from_state_file(&path).unwrap_err();
        match err {
            Error::Persistence { path: reported, .. } => assert_eq!(reported, path),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_wrong_format_tag_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("other.json");
        std::fs::write(
            &path,
            r#"{"format": "something-else", "version": 1, "step_results": []}"#,
        )
        .unwrap();

        let err = WorkflowResult::load_from_state_file(&path).unwrap_err();
        assert!(err.to_string().contains("expected format 'steprunner-workflow-result'"));
    }

    #[test]
    fn test_unsupported_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("future.json");
        std::fs::write(
            &path,
            r#"{"format": "steprunner-workflow-result", "version": 99, "step_results": []}"#,
        )
        .unwrap();

        let err = WorkflowResult::load_from_state_file(&path).unwrap_err();
        assert!(err.to_string().contains("unsupported state version 99"));
    }
}
