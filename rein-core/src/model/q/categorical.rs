//! Distributional Q-learning over a fixed support of return atoms.
use super::bootstrap;
use crate::{
    error::Result,
    model::{
        engine::{gradient_step, EngineContext, Objective, Requirements, StepProposal, UpdateBatch},
        Optimizer, UpdateEngine,
    },
    record::Record,
    util::{argmax, log_softmax, softmax},
    Action, ActionValue,
};
use rand::rngs::StdRng;

/// Categorical DQN for a single discrete action component.
///
/// The network outputs `num_atoms` logits per action. The return distribution
/// of action `a` is the softmax of its logits over atoms evenly spaced in
/// `[v_min, v_max]`, and the loss is the cross-entropy to the projected
/// Bellman target.
pub struct CategoricalDqnEngine {
    num_actions: usize,
    num_atoms: usize,
    v_min: f32,
    v_max: f32,
    discount: f32,
    clip_grad_norm: Option<f32>,
    n_step: usize,
}

impl CategoricalDqnEngine {
    /// Creates an engine with the given support.
    pub fn new(num_actions: usize, num_atoms: usize, v_min: f32, v_max: f32, discount: f32) -> Self {
        Self {
            num_actions,
            num_atoms: num_atoms.max(2),
            v_min,
            v_max,
            discount,
            clip_grad_norm: None,
            n_step: 1,
        }
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

    fn delta_z(&self) -> f32 {
        (self.v_max - self.v_min) / (self.num_atoms - 1) as f32
    }

    fn atom(&self, j: usize) -> f32 {
        self.v_min + j as f32 * self.delta_z()
    }

    fn logits<'a>(&self, output: &'a [f32], a: usize) -> &'a [f32] {
        &output[a * self.num_atoms..(a + 1) * self.num_atoms]
    }

    /// Expected returns of all actions.
    fn q_values(&self, output: &[f32]) -> Vec<f32> {
        (0..self.num_actions)
            .map(|a| {
                softmax(self.logits(output, a))
                    .iter()
                    .enumerate()
                    .map(|(j, p)| p * self.atom(j))
                    .sum()
            })
            .collect()
    }

    /// Projects the distribution `probs` shifted by `reward + gamma * z` onto the support.
    fn project(&self, probs: &[f32], reward: f32, gamma: f32) -> Vec<f32> {
        let mut m = vec![0.0; self.num_atoms];
        let dz = self.delta_z();
        for (j, p) in probs.iter().enumerate() {
            let tz = (reward + gamma * self.atom(j)).max(self.v_min).min(self.v_max);
            let b = ((tz - self.v_min) / dz).max(0.0).min((self.num_atoms - 1) as f32);
            let (l, u) = (b.floor() as usize, b.ceil() as usize);
            if l == u {
                m[l] += p;
            } else {
                m[l] += p * (u as f32 - b);
                m[u] += p * (b - l as f32);
            }
        }
        m
    }
}

impl UpdateEngine for CategoricalDqnEngine {
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
        self.num_actions * self.num_atoms
    }

    fn select_action(&self, output: &[f32], _deterministic: bool, _rng: &mut StdRng) -> Action {
        Action::discrete(argmax(&self.q_values(output)))
    }

    fn compute_objective(
        &mut self,
        ctx: &EngineContext,
        batch: &UpdateBatch,
    ) -> Result<Objective> {
        let n = batch.len();
        let scale = 1.0 / n.max(1) as f32;
        let (next_inputs, next_internals) = batch.next()?;
        let target = ctx.target.unwrap_or(ctx.params);

        let outputs = ctx.forward(ctx.params, &batch.inputs, &batch.internals)?;
        let next_target = ctx.forward(target, next_inputs, next_internals)?;

        let mut loss = 0.0;
        let mut priorities = vec![0.0; n];
        let mut grad_outputs = vec![vec![0.0; self.output_len()]; n];
        for i in 0..n {
            let next = &next_target[i].output;
            let a_next = argmax(&self.q_values(next));
            let m = self.project(
                &softmax(self.logits(next, a_next)),
                batch.rewards[i],
                bootstrap(self.discount, batch.horizons[i], batch.terminals[i]),
            );

            let a = batch.actions[i].components()[0].as_discrete();
            let logits = self.logits(&outputs[i].output, a);
            let log_p = log_softmax(logits);
            let ce = -m.iter().zip(log_p.iter()).map(|(m, lp)| m * lp).sum::<f32>();
            let w = batch.weights[i];
            loss += w * ce * scale;
            priorities[i] = ce;
            for j in 0..self.num_atoms {
                grad_outputs[i][a * self.num_atoms + j] = w * scale * (log_p[j].exp() - m[j]);
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
