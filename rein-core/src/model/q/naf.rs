//! Normalized advantage functions for continuous actions.
use super::{bootstrap, td_loss};
use crate::{
    error::Result,
    model::{
        engine::{gradient_step, EngineContext, Objective, Requirements, StepProposal, UpdateBatch},
        Optimizer, UpdateEngine,
    },
    record::Record,
    Action, ActionValue,
};
use rand::rngs::StdRng;

const LOG_DIAG_MIN: f32 = -10.0;
const LOG_DIAG_MAX: f32 = 10.0;

/// Q-learning with a quadratic advantage per continuous action component.
///
/// Each component reads `[V, mu (dim), l (dim)]` from the network output and
/// `Q(s, a) = V(s) - 1/2 sum_j exp(l_j) (a_j - mu_j)^2`, so the greedy action is `mu`.
/// The diagonal log-precisions `l` are clamped to `[-10, 10]`.
pub struct NafEngine {
    dims: Vec<usize>,
    bounds: Vec<Option<(f32, f32)>>,
    offsets: Vec<usize>,
    discount: f32,
    huber_delta: Option<f32>,
    clip_grad_norm: Option<f32>,
    n_step: usize,
}

impl NafEngine {
    /// Creates an engine for continuous components with the given dimensions and bounds.
    pub fn new(components: Vec<(usize, Option<(f32, f32)>)>, discount: f32) -> Self {
        let mut offsets = vec![];
        let mut acc = 0;
        for (dim, _) in components.iter() {
            offsets.push(acc);
            acc += 1 + 2 * dim;
        }
        Self {
            dims: components.iter().map(|c| c.0).collect(),
            bounds: components.iter().map(|c| c.1).collect(),
            offsets,
            discount,
            huber_delta: None,
            clip_grad_norm: None,
            n_step: 1,
        }
    }

    /// Uses the Huber loss with the given threshold.
    pub fn huber_delta(mut self, huber_delta: Option<f32>) -> Self {
        self.huber_delta = huber_delta;
        self
    }

    /// Clips the global gradient norm.
    pub fn clip_grad_norm(mut self, clip_grad_norm: Option<f32>) -> Self {
        self.clip_grad_norm = clip_grad_norm;
        self
    }

    /// Sets the length of the reward window.
    pub fn n_step(mut self, n_step: usize) -> Self {
        self.n_step = n_step.max(1);
        self
    }

    /// `(V, mu, l)` of component `c`.
    fn split<'a>(&self, output: &'a [f32], c: usize) -> (f32, &'a [f32], &'a [f32]) {
        let (o, d) = (self.offsets[c], self.dims[c]);
        (output[o], &output[o + 1..o + 1 + d], &output[o + 1 + d..o + 1 + 2 * d])
    }

    /// Q-value of action `a` and its gradient with respect to the component outputs.
    fn q_value(&self, output: &[f32], c: usize, a: &[f32]) -> (f32, Vec<f32>) {
        let (v, mu, l) = self.split(output, c);
        let d = self.dims[c];
        let mut grad = vec![0.0; 1 + 2 * d];
        grad[0] = 1.0;
        let mut q = v;
        for j in 0..d {
            let p = l[j].max(LOG_DIAG_MIN).min(LOG_DIAG_MAX).exp();
            let diff = a[j] - mu[j];
            q -= 0.5 * p * diff * diff;
            grad[1 + j] = p * diff;
            if (LOG_DIAG_MIN..=LOG_DIAG_MAX).contains(&l[j]) {
                grad[1 + d + j] = -0.5 * p * diff * diff;
            }
        }
        (q, grad)
    }
}

impl UpdateEngine for NafEngine {
    fn requirements(&self) -> Requirements {
        Requirements {
            next_states: true,
            on_policy: false,
            n_step: self.n_step,
            target_network: true,
            advantage: None,
        }
    }

    fn output_len(&self) -> usize {
        self.dims.iter().map(|d| 1 + 2 * d).sum()
    }

    fn select_action(&self, output: &[f32], _deterministic: bool, _rng: &mut StdRng) -> Action {
        Action(
            (0..self.dims.len())
                .map(|c| {
                    let (_, mu, _) = self.split(output, c);
                    let values = mu
                        .iter()
                        .map(|&m| match self.bounds[c] {
                            Some((lo, hi)) => m.max(lo).min(hi),
                            None => m,
                        })
                        .collect();
                    ActionValue::Continuous(values)
                })
                .collect(),
        )
    }

    fn compute_objective(
        &mut self,
        ctx: &EngineContext,
        batch: &UpdateBatch,
    ) -> Result<Objective> {
        let n = batch.len();
        let n_heads = self.dims.len();
        let scale = 1.0 / (n * n_heads).max(1) as f32;
        let (next_inputs, next_internals) = batch.next()?;
        let target = ctx.target.unwrap_or(ctx.params);

        let outputs = ctx.forward(ctx.params, &batch.inputs, &batch.internals)?;
        let next_target = ctx.forward(target, next_inputs, next_internals)?;

        let mut loss = 0.0;
        let mut priorities = vec![0.0; n];
        let mut grad_outputs = vec![vec![0.0; self.output_len()]; n];
        for i in 0..n {
            let gamma = bootstrap(self.discount, batch.horizons[i], batch.terminals[i]);
            for c in 0..n_heads {
                let a = batch.actions[i].components()[c].as_continuous();
                let (q, dq) = self.q_value(&outputs[i].output, c, &a);
                let (next_v, _, _) = self.split(&next_target[i].output, c);
                let delta = q - (batch.rewards[i] + gamma * next_v);
                let (l, dl) = td_loss(delta, self.huber_delta);
                let w = batch.weights[i];
                loss += w * l * scale;
                priorities[i] += delta.abs() / n_heads as f32;
                let o = self.offsets[c];
                for (k, g) in dq.iter().enumerate() {
                    grad_outputs[i][o + k] += w * dl * scale * g;
                }
            }
        }

        let grad = ctx.backward(ctx.params, &batch.inputs, &batch.internals, &grad_outputs)?;
        Ok(Objective {
            loss,
            grad,
            priorities: Some(priorities),
            record: Record::empty(),
        })
    }

    fn compute_step(
        &mut self,
        ctx: &EngineContext,
        _batch: &UpdateBatch,
        objective: Objective,
        optimizer: &mut Optimizer,
    ) -> Result<StepProposal> {
        gradient_step(objective, ctx.params, optimizer, self.clip_grad_norm)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_q_value_gradient() {
        let engine = NafEngine::new(vec![(2, None)], 0.9);
        let output = [1.5, 0.2, -0.3, 0.1, -0.4];
        let a = [0.6, 0.1];
        let (_, grad) = engine.q_value(&output, 0, &a);
        for k in 0..5 {
            let mut plus = output;
            let mut minus = output;
            plus[k] += 1e-2;
            minus[k] -= 1e-2;
            let fd = (engine.q_value(&plus, 0, &a).0 - engine.q_value(&minus, 0, &a).0) / 2e-2;
            assert!((fd - grad[k]).abs() < 1e-3, "k={} fd={} grad={}", k, fd, grad[k]);
        }
    }

    #[test]
    fn test_greedy_action_is_clipped_mean() {
        let engine = NafEngine::new(vec![(1, Some((-1.0, 1.0))), (1, None)], 0.9);
        assert_eq!(engine.output_len(), 6);
        let mut rng = rand::SeedableRng::seed_from_u64(0);
        let action = engine.select_action(&[0.0, 3.0, 0.0, 0.0, 3.0, 0.0], true, &mut rng);
        assert_eq!(
            action,
            Action(vec![
                ActionValue::Continuous(vec![1.0]),
                ActionValue::Continuous(vec![3.0])
            ])
        );
    }
}
