//! Built-in step implementers.

pub mod command;

pub use command::CommandStepImplementer;
