//! Environment step.
use super::State;

/// Outcome of an environment step: the next state, the reward for the action
/// and whether the episode ended.
#[derive(Clone, Debug, PartialEq)]
pub struct Step {
    /// State after the action.
    pub state: State,

    /// Reward.
    pub reward: f32,

    /// Flag denoting if episode is terminated.
    pub terminal: bool,
}

impl Step {
    /// Constructs a [`Step`] object.
    pub fn new(state: State, reward: f32, terminal: bool) -> Self {
        Self {
            state,
            reward,
            terminal,
        }
    }
}
