//! Print persisted results.

use anyhow::{Context, Result};
use clap::ValueEnum;
use steprunner_core::WorkflowResult;
use steprunner_runner::RunnerSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Yaml,
    Json,
}

pub fn render(workflow: &WorkflowResult, format: OutputFormat) -> Result<String> {
    let results = workflow.get_step_results_dict();
    let rendered = match format {
        OutputFormat::Yaml => serde_yaml::to_string(&results)?,
        OutputFormat::Json => serde_json::to_string_pretty(&results)?,
    };
    Ok(rendered)
}

pub fn print(settings: &RunnerSettings, format: OutputFormat) -> Result<()> {
    let state_file = settings.state_file();
    let workflow = WorkflowResult::load_from_state_file(&state_file)
        .with_context(|| format!("Failed to load results from {}", state_file.display()))?;
    println!("{}", render(&workflow, format)?.trim_end());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use steprunner_core::StepResult;

    #[test]
    fn test_render() {
        let mut workflow = WorkflowResult::new();
        let mut result = StepResult::new("tag-source", "Git", "Git", None);
        result.add_artifact("tag", "v1", "").unwrap();
        workflow.add_step_result(result).unwrap();

        let json: Value = serde_json::from_str(&render(&workflow, OutputFormat::Json).unwrap()).unwrap();
        assert_eq!(
            json["step-runner-results"]["tag-source"]["Git"]["artifacts"][0]["value"],
            json!("v1")
        );

        let yaml = render(&workflow, OutputFormat::Yaml).unwrap();
        assert!(yaml.starts_with("step-runner-results:"));
    }
}
