//! Agent.
use super::{Action, State, Transition};
use crate::{error::Result, record::Record};

/// Interface of agents interacting with an environment through the act/observe protocol.
///
/// [`Agent::act`] stores a pending `(state, internal state, action)` tuple which the
/// next [`Agent::observe`] completes into a [`Transition`].
pub trait Agent {
    /// Returns an action for the given state and keeps it pending.
    fn act(&mut self, state: &State) -> Result<Action>;

    /// Completes the pending tuple with the reward and terminal flag.
    ///
    /// Returns the record of the model update if one was triggered.
    fn observe(&mut self, reward: f32, terminal: bool) -> Result<Option<Record>>;

    /// Adds externally supplied transitions to the memory without touching
    /// the pending tuple.
    fn import_observations(&mut self, transitions: Vec<Transition>) -> Result<()>;

    /// The most recently completed transition.
    fn last_observation(&self) -> Option<&Transition>;

    /// Starts a new episode.
    fn reset(&mut self);

    /// Set the agent to training mode.
    fn train(&mut self);

    /// Set the agent to evaluation mode.
    fn eval(&mut self);

    /// Return if it is in training mode.
    fn is_train(&self) -> bool;

    /// Number of completed act/observe steps.
    fn timestep(&self) -> usize;

    /// Number of completed episodes.
    fn episode(&self) -> usize;
}
