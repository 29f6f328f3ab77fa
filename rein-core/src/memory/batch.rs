//! Batches of transitions returned by memories.
use crate::{Action, InternalState, State};

/// Transitions retrieved from a memory, stored column-wise.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TransitionBatch {
    /// States.
    pub states: Vec<State>,

    /// Internal states before the actions.
    pub internals: Vec<InternalState>,

    /// Actions.
    pub actions: Vec<Action>,

    /// Rewards. For n-step batches, discounted sums over the horizon.
    pub rewards: Vec<f32>,

    /// Terminal flags. For n-step batches, whether the horizon ended the episode.
    pub terminals: Vec<bool>,

    /// States following the transitions, if requested.
    ///
    /// Terminal transitions carry their own state, which is masked by the terminal flag.
    pub next_states: Option<Vec<State>>,

    /// Internal states following the transitions, if requested.
    pub next_internals: Option<Vec<InternalState>>,

    /// Number of environment steps between the state and the next state.
    pub horizons: Vec<usize>,

    /// Importance sampling weights of prioritized memories.
    pub weights: Option<Vec<f32>>,

    /// Memory slots of the sampled transitions, used to write back priorities.
    pub indices: Option<Vec<usize>>,
}

impl TransitionBatch {
    /// Number of transitions.
    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    /// Returns `true` if the batch holds no transitions.
    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    /// Importance weight of the `i`-th transition, `1` for uniform memories.
    pub fn weight(&self, i: usize) -> f32 {
        self.weights.as_ref().map(|w| w[i]).unwrap_or(1.0)
    }
}
