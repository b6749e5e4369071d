//! Result model for the step runner.
//!
//! This crate contains:
//! - Step results with named artifacts and evidence
//! - The workflow result store with environment-aware lookup
//! - YAML/JSON result exports and the versioned state file shared between
//!   step invocations

pub mod artifact;
pub mod error;
pub mod state;
pub mod step_result;
pub mod workflow;

pub use artifact::StepResultArtifact;
pub use error::{Error, Result};
pub use step_result::{StepResult, StepResultKey};
pub use workflow::{RESULTS_ROOT_KEY, ResultQuery, WorkflowResult};
