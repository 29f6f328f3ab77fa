//! Memory interface.
use super::Transition;
use crate::{error::Result, memory::TransitionBatch};

/// Stores transitions and generates batches for updates.
pub trait Memory: Send {
    /// Adds a transition, evicting an entry when the memory is full.
    fn add(&mut self, transition: Transition);

    /// Current number of stored transitions.
    fn len(&self) -> usize;

    /// Returns `true` if nothing is stored.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximal number of stored transitions.
    fn capacity(&self) -> usize;

    /// Returns `true` if sampling is priority-weighted.
    fn is_prioritized(&self) -> bool;

    /// Samples `size` transitions.
    ///
    /// Fails with [`CapacityError`](crate::error::ReinError::CapacityError) if fewer
    /// than `size` transitions can be returned.
    fn get_batch(
        &mut self,
        size: usize,
        include_next_states: bool,
        include_next_internals: bool,
    ) -> Result<TransitionBatch>;

    /// Samples `size` start transitions with rewards accumulated over up to
    /// `n_step` successors.
    fn get_nstep_batch(
        &mut self,
        size: usize,
        n_step: usize,
        discount: f32,
        include_next_internals: bool,
    ) -> Result<TransitionBatch>;

    /// All transitions in chronological order.
    fn sequence(
        &self,
        include_next_states: bool,
        include_next_internals: bool,
    ) -> Result<TransitionBatch>;

    /// Writes back priorities of sampled transitions. No-op on uniform memories.
    fn update_priorities(&mut self, indices: &[usize], priorities: &[f32]);

    /// Adds externally supplied transitions in order.
    fn import(&mut self, transitions: Vec<Transition>) {
        for transition in transitions {
            self.add(transition);
        }
    }

    /// Removes all transitions.
    fn clear(&mut self);
}
