//! Contract of differentiable function approximators.
use super::InternalState;
use crate::{error::Result, model::ParamSet};
use rand::rngs::StdRng;

/// Output of [`Network::forward`].
#[derive(Clone, Debug, PartialEq)]
pub struct Forward {
    /// Raw outputs, interpreted by the update engine.
    pub output: Vec<f32>,

    /// Internal state for the next call.
    pub next_internal: InternalState,
}

/// A differentiable map from `(input, internal state)` to raw outputs and the
/// next internal state.
///
/// Networks hold no parameters themselves. Parameters live in a flat
/// [`ParamSet`] owned by the model, so the same network can be evaluated with
/// online, target and candidate parameters, and shared between threads.
pub trait Network: Send + Sync {
    /// Length of the flattened input.
    fn input_len(&self) -> usize;

    /// Length of the raw output.
    fn output_len(&self) -> usize;

    /// Length of the internal state, `0` for stateless networks.
    fn internal_len(&self) -> usize {
        0
    }

    /// Number of parameters.
    fn n_params(&self) -> usize;

    /// Draws initial parameters.
    fn init_params(&self, rng: &mut StdRng) -> ParamSet;

    /// Internal state at the start of an episode.
    fn initial_internal(&self) -> InternalState {
        InternalState::zeros(self.internal_len())
    }

    /// Evaluates the network.
    fn forward(&self, params: &ParamSet, input: &[f32], internal: &InternalState)
        -> Result<Forward>;

    /// Vector-Jacobian product: the gradient of `grad_output · output` with
    /// respect to the parameters.
    ///
    /// The incoming internal state is treated as a constant input.
    fn backward(
        &self,
        params: &ParamSet,
        input: &[f32],
        internal: &InternalState,
        grad_output: &[f32],
    ) -> Result<Vec<f32>>;
}
