//! Step execution for the step runner.
//!
//! Resolves the implementer of each configured sub-step, runs it with its
//! layered configuration and the results of earlier steps, and persists the
//! outcome for the steps that follow.

pub mod context;
pub mod error;
pub mod implementer;
pub mod implementers;
pub mod runner;

pub use context::StepContext;
pub use error::{RunnerError, RunnerResult};
pub use implementer::{ImplementerRegistry, StepImplementer};
pub use implementers::CommandStepImplementer;
pub use runner::{RunnerSettings, StepRunner};
