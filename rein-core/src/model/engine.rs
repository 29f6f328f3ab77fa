//! The update engine contract shared by all algorithm families.
use super::{Optimizer, ParamSet};
use crate::{
    baseline::AdvantageConfig,
    error::{ReinError, Result},
    memory::TransitionBatch,
    record::Record,
    util::{axpy, norm},
    Action, Forward, InternalState, Network,
};
use rand::rngs::StdRng;

/// What an engine needs from the memory and the model.
#[derive(Clone, Debug, PartialEq)]
pub struct Requirements {
    /// Batches carry next states.
    pub next_states: bool,

    /// Batches are the chronological memory contents, cleared after the update.
    pub on_policy: bool,

    /// Length of the reward window of off-policy batches.
    pub n_step: usize,

    /// The engine bootstraps from a target network.
    pub target_network: bool,

    /// Advantages computed by the model, for policy-gradient engines.
    pub advantage: Option<AdvantageConfig>,
}

/// Parameter sets and the network an engine evaluates.
pub struct EngineContext<'a> {
    /// The network.
    pub network: &'a dyn Network,

    /// Online parameters, unchanged during an update.
    pub params: &'a ParamSet,

    /// Target parameters, read-only.
    pub target: Option<&'a ParamSet>,
}

impl<'a> EngineContext<'a> {
    /// Outputs of the network for all inputs of a batch.
    pub fn forward(
        &self,
        params: &ParamSet,
        inputs: &[Vec<f32>],
        internals: &[InternalState],
    ) -> Result<Vec<Forward>> {
        inputs
            .iter()
            .zip(internals.iter())
            .map(|(x, h)| self.network.forward(params, x, h))
            .collect()
    }

    /// Sum of the parameter gradients of `grad_outputs[i] · output_i`.
    pub fn backward(
        &self,
        params: &ParamSet,
        inputs: &[Vec<f32>],
        internals: &[InternalState],
        grad_outputs: &[Vec<f32>],
    ) -> Result<Vec<f32>> {
        let mut grad = vec![0.0; params.len()];
        for ((x, h), g) in inputs.iter().zip(internals.iter()).zip(grad_outputs.iter()) {
            if g.iter().any(|&v| v != 0.0) {
                axpy(&mut grad, 1.0, &self.network.backward(params, x, h, g)?);
            }
        }
        Ok(grad)
    }
}

/// A batch prepared for an update: flattened network inputs and, for
/// policy-gradient engines, advantages.
#[derive(Clone, Debug, Default)]
pub struct UpdateBatch {
    /// Network inputs.
    pub inputs: Vec<Vec<f32>>,

    /// Internal states before the actions.
    pub internals: Vec<InternalState>,

    /// Actions.
    pub actions: Vec<Action>,

    /// Rewards, summed over the horizon for n-step batches.
    pub rewards: Vec<f32>,

    /// Terminal flags.
    pub terminals: Vec<bool>,

    /// Network inputs of the next states.
    pub next_inputs: Option<Vec<Vec<f32>>>,

    /// Internal states after the actions.
    pub next_internals: Option<Vec<InternalState>>,

    /// Environment steps to the next state.
    pub horizons: Vec<usize>,

    /// Importance weights, `1` for uniform sampling.
    pub weights: Vec<f32>,

    /// Advantages of policy-gradient batches.
    pub advantages: Vec<f32>,

    /// The batch holds expert demonstrations.
    pub demo: bool,
}

impl UpdateBatch {
    /// Flattens the states of a memory batch.
    pub fn from_transitions(batch: &TransitionBatch) -> Self {
        let n = batch.len();
        Self {
            inputs: batch.states.iter().map(|s| s.flatten()).collect(),
            internals: batch.internals.clone(),
            actions: batch.actions.clone(),
            rewards: batch.rewards.clone(),
            terminals: batch.terminals.clone(),
            next_inputs: batch
                .next_states
                .as_ref()
                .map(|ns| ns.iter().map(|s| s.flatten()).collect()),
            next_internals: batch.next_internals.clone(),
            horizons: batch.horizons.clone(),
            weights: (0..n).map(|i| batch.weight(i)).collect(),
            advantages: vec![],
            demo: false,
        }
    }

    /// Number of transitions.
    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    /// Returns `true` if the batch holds no transitions.
    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    /// Next inputs and internal states, falling back to the current internal
    /// states for stateless networks.
    pub fn next(&self) -> Result<(&[Vec<f32>], &[InternalState])> {
        let next_inputs = self.next_inputs.as_ref().ok_or_else(|| {
            ReinError::SequenceError("batch was retrieved without next states".to_string())
        })?;
        let next_internals = self.next_internals.as_ref().unwrap_or(&self.internals);
        Ok((next_inputs, next_internals))
    }

    /// Subset of the batch at the given positions.
    pub fn select(&self, ixs: &[usize]) -> Self {
        fn pick<T: Clone>(xs: &[T], ixs: &[usize]) -> Vec<T> {
            if xs.is_empty() {
                return vec![];
            }
            ixs.iter().map(|&i| xs[i].clone()).collect()
        }
        Self {
            inputs: pick(&self.inputs, ixs),
            internals: pick(&self.internals, ixs),
            actions: pick(&self.actions, ixs),
            rewards: pick(&self.rewards, ixs),
            terminals: pick(&self.terminals, ixs),
            next_inputs: self.next_inputs.as_ref().map(|xs| pick(xs, ixs)),
            next_internals: self.next_internals.as_ref().map(|xs| pick(xs, ixs)),
            horizons: pick(&self.horizons, ixs),
            weights: pick(&self.weights, ixs),
            advantages: pick(&self.advantages, ixs),
            demo: self.demo,
        }
    }
}

/// Loss, gradient and diagnostics of a batch at the online parameters.
#[derive(Clone, Debug)]
pub struct Objective {
    /// Scalar loss.
    pub loss: f32,

    /// Gradient of the loss with respect to the parameters.
    pub grad: Vec<f32>,

    /// New priorities of the sampled transitions.
    pub priorities: Option<Vec<f32>>,

    /// Metrics.
    pub record: Record,
}

/// Parameter delta proposed by [`UpdateEngine::compute_step`].
#[derive(Clone, Debug)]
pub struct StepProposal {
    /// Delta to add to the online parameters.
    pub delta: Vec<f32>,

    /// Metrics.
    pub record: Record,
}

/// An algorithm's objective and update rule.
///
/// Engines never modify parameters. [`UpdateEngine::compute_step`] returns a
/// delta which the model validates before committing it with
/// [`UpdateEngine::apply_step`].
pub trait UpdateEngine: Send {
    /// Batch and model requirements.
    fn requirements(&self) -> Requirements;

    /// Number of network outputs the engine interprets.
    fn output_len(&self) -> usize;

    /// Maps a network output to an action.
    fn select_action(&self, output: &[f32], deterministic: bool, rng: &mut StdRng) -> Action;

    /// Computes the loss and its gradient at the online parameters.
    fn compute_objective(&mut self, ctx: &EngineContext, batch: &UpdateBatch)
        -> Result<Objective>;

    /// Computes the parameter delta.
    ///
    /// `optimizer` advances its moments with every step it takes, so engines
    /// step it only with validated finite gradients.
    fn compute_step(
        &mut self,
        ctx: &EngineContext,
        batch: &UpdateBatch,
        objective: Objective,
        optimizer: &mut Optimizer,
    ) -> Result<StepProposal>;

    /// Commits a validated delta.
    fn apply_step(&self, params: &mut ParamSet, delta: &[f32]) {
        params.add(delta);
    }
}

/// Scales `grad` to a global norm of at most `max_norm` and returns the norm before clipping.
pub fn clip_grad_norm(grad: &mut [f32], max_norm: Option<f32>) -> f32 {
    let n = norm(grad);
    if let Some(max_norm) = max_norm {
        if n > max_norm && n.is_finite() {
            let scale = max_norm / n;
            grad.iter_mut().for_each(|g| *g *= scale);
        }
    }
    n
}

/// A single optimizer step from `params` on the objective gradient, as used by
/// the gradient-based engines.
pub fn gradient_step(
    mut objective: Objective,
    params: &ParamSet,
    optimizer: &mut Optimizer,
    max_norm: Option<f32>,
) -> Result<StepProposal> {
    let grad_norm = clip_grad_norm(&mut objective.grad, max_norm);
    let delta = optimizer.step(params, &objective.grad)?;
    let mut record = objective.record;
    record.insert("loss", crate::record::RecordValue::Scalar(objective.loss));
    record.insert("grad_norm", crate::record::RecordValue::Scalar(grad_norm));
    Ok(StepProposal { delta, record })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_clip_grad_norm() {
        let mut g = vec![3.0, 4.0];
        assert_eq!(clip_grad_norm(&mut g, Some(1.0)), 5.0);
        assert!((g[0] - 0.6).abs() < 1e-6 && (g[1] - 0.8).abs() < 1e-6);
        let mut g = vec![0.3, 0.4];
        clip_grad_norm(&mut g, Some(1.0));
        assert_eq!(g, vec![0.3, 0.4]);
    }
}
