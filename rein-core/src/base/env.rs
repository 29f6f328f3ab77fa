//! Environment.
use super::{Action, EnvSpec, State, Step};
use anyhow::Result;

/// Represents an environment, typically an MDP.
///
/// Adapters to concrete simulators implement this trait; the agent only relies
/// on the declared [`EnvSpec`] to select distributions and preprocessing.
pub trait Env {
    /// States and actions of the environment.
    fn spec(&self) -> EnvSpec;

    /// Starts a new episode and returns its initial state.
    fn reset(&mut self) -> Result<State>;

    /// Performes an environment step.
    fn step(&mut self, action: &Action) -> Result<Step>;
}
