//! Deep Q-learning with optional double Q-learning and demonstration margins.
use super::{bootstrap, td_loss};
use crate::{
    error::Result,
    model::{
        engine::{gradient_step, EngineContext, Objective, Requirements, StepProposal, UpdateBatch},
        Optimizer, UpdateEngine,
    },
    record::{Record, RecordValue},
    util::argmax,
    Action, ActionValue,
};
use rand::rngs::StdRng;

/// DQN over one or more discrete action components, each with its own head of
/// Q-values in the network output.
///
/// With a demonstration margin, batches flagged as demonstrations add the
/// large-margin loss `max_a[Q(s, a) + m [a != a_E]] - Q(s, a_E)` to the TD loss.
pub struct DqnEngine {
    num_actions: Vec<usize>,
    offsets: Vec<usize>,
    discount: f32,
    double_q: bool,
    huber_delta: Option<f32>,
    clip_grad_norm: Option<f32>,
    n_step: usize,
    margin: Option<(f32, f32)>,
}

impl DqnEngine {
    /// Creates an engine for discrete action components with the given numbers of actions.
    pub fn new(num_actions: Vec<usize>, discount: f32) -> Self {
        let offsets = num_actions
            .iter()
            .scan(0, |acc, n| {
                let o = *acc;
                *acc += n;
                Some(o)
            })
            .collect();
        Self {
            num_actions,
            offsets,
            discount,
            double_q: false,
            huber_delta: None,
            clip_grad_norm: None,
            n_step: 1,
            margin: None,
        }
    }

    /// Selects next actions with the online network and evaluates them with the target.
    pub fn double_q(mut self, double_q: bool) -> Self {
        self.double_q = double_q;
        self
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

    /// Adds the large-margin loss on demonstration batches.
    pub fn margin(mut self, expert_margin: f32, supervised_weight: f32) -> Self {
        self.margin = Some((expert_margin, supervised_weight));
        self
    }

    fn head<'a>(&self, output: &'a [f32], c: usize) -> &'a [f32] {
        &output[self.offsets[c]..self.offsets[c] + self.num_actions[c]]
    }
}

impl UpdateEngine for DqnEngine {
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
        self.num_actions.iter().sum()
    }

    fn select_action(&self, output: &[f32], _deterministic: bool, _rng: &mut StdRng) -> Action {
        Action(
            (0..self.num_actions.len())
                .map(|c| ActionValue::Discrete(argmax(self.head(output, c))))
                .collect(),
        )
    }

    fn compute_objective(
        &mut self,
        ctx: &EngineContext,
        batch: &UpdateBatch,
    ) -> Result<Objective> {
        let n = batch.len();
        let n_heads = self.num_actions.len();
        let scale = 1.0 / (n * n_heads).max(1) as f32;
        let (next_inputs, next_internals) = batch.next()?;
        let target = ctx.target.unwrap_or(ctx.params);

        let outputs = ctx.forward(ctx.params, &batch.inputs, &batch.internals)?;
        let next_target = ctx.forward(target, next_inputs, next_internals)?;
        let next_online = if self.double_q {
            Some(ctx.forward(ctx.params, next_inputs, next_internals)?)
        } else {
            None
        };

        let mut loss = 0.0;
        let mut margin_loss = 0.0;
        let mut q_sum = 0.0;
        let mut priorities = vec![0.0; n];
        let mut grad_outputs = vec![vec![0.0; outputs.first().map_or(0, |f| f.output.len())]; n];

        for i in 0..n {
            let gamma = bootstrap(self.discount, batch.horizons[i], batch.terminals[i]);
            for c in 0..n_heads {
                let a = batch.actions[i].components()[c].as_discrete();
                let q_head = self.head(&outputs[i].output, c);
                let q = q_head[a];
                let target_head = self.head(&next_target[i].output, c);
                let next_q = match &next_online {
                    Some(online) => target_head[argmax(self.head(&online[i].output, c))],
                    None => target_head[argmax(target_head)],
                };
                let delta = q - (batch.rewards[i] + gamma * next_q);
                let (l, dl) = td_loss(delta, self.huber_delta);
                let w = batch.weights[i];
                loss += w * l * scale;
                grad_outputs[i][self.offsets[c] + a] += w * dl * scale;
                priorities[i] += delta.abs() / n_heads as f32;
                q_sum += q;

                if let (true, Some((m, lambda))) = (batch.demo, self.margin) {
                    let with_margin = q_head
                        .iter()
                        .enumerate()
                        .map(|(b, &qb)| if b == a { qb } else { qb + m })
                        .collect::<Vec<_>>();
                    let a_max = argmax(&with_margin);
                    margin_loss += lambda * (with_margin[a_max] - q) * scale;
                    if a_max != a {
                        grad_outputs[i][self.offsets[c] + a_max] += lambda * scale;
                        grad_outputs[i][self.offsets[c] + a] -= lambda * scale;
                    }
                }
            }
        }

        let grad = ctx.backward(ctx.params, &batch.inputs, &batch.internals, &grad_outputs)?;
        let mut record = Record::from_scalar("q_mean", q_sum * scale);
        if batch.demo && self.margin.is_some() {
            record.insert("margin_loss", RecordValue::Scalar(margin_loss));
        }
        Ok(Objective {
            loss: loss + margin_loss,
            grad,
            priorities: Some(priorities),
            record,
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
    use crate::{model::ParamSet, network::Linear, InternalState, Network};

    fn batch(demo: bool) -> UpdateBatch {
        UpdateBatch {
            inputs: vec![vec![1.0]],
            internals: vec![InternalState::default()],
            actions: vec![Action::discrete(0)],
            rewards: vec![1.0],
            terminals: vec![false],
            next_inputs: Some(vec![vec![1.0]]),
            next_internals: None,
            horizons: vec![1],
            weights: vec![1.0],
            advantages: vec![],
            demo,
        }
    }

    #[test]
    fn test_td_target_uses_target_params() {
        // Q(s, .) = W s with W = [[2], [3]] online and [[5], [1]] target.
        let net = Linear::new(1, 2);
        let params = ParamSet::new(vec![2.0, 3.0, 0.0, 0.0]);
        let target = ParamSet::new(vec![5.0, 1.0, 0.0, 0.0]);
        let ctx = EngineContext {
            network: &net as &dyn Network,
            params: &params,
            target: Some(&target),
        };

        let mut engine = DqnEngine::new(vec![2], 0.5);
        let obj = engine.compute_objective(&ctx, &batch(false)).unwrap();
        // delta = 2 - (1 + 0.5 * 5)
        assert!((obj.loss - 0.5 * 1.5 * 1.5).abs() < 1e-6);
        assert!((obj.priorities.as_ref().unwrap()[0] - 1.5).abs() < 1e-6);
        assert_eq!(obj.grad, vec![-1.5, 0.0, -1.5, 0.0]);

        // Double Q: the online network picks action 1, evaluated at 1 by the target.
        let mut engine = DqnEngine::new(vec![2], 0.5).double_q(true);
        let obj = engine.compute_objective(&ctx, &batch(false)).unwrap();
        assert!((obj.priorities.unwrap()[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_margin_loss_on_demonstrations() {
        let net = Linear::new(1, 2);
        let params = ParamSet::new(vec![2.0, 3.0, 0.0, 0.0]);
        let ctx = EngineContext {
            network: &net as &dyn Network,
            params: &params,
            target: Some(&params),
        };
        let mut engine = DqnEngine::new(vec![2], 0.0).margin(0.8, 0.1);
        let plain = engine.compute_objective(&ctx, &batch(false)).unwrap();
        let demo = engine.compute_objective(&ctx, &batch(true)).unwrap();
        // max(2, 3 + 0.8) - 2 = 1.8
        let margin = demo.record.get_scalar("margin_loss").unwrap();
        assert!((margin - 0.18).abs() < 1e-6);
        assert!((demo.loss - plain.loss - 0.18).abs() < 1e-6);
        assert!((demo.grad[1] - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_greedy_actions_per_component() {
        let engine = DqnEngine::new(vec![2, 3], 0.9);
        let mut rng = rand::SeedableRng::seed_from_u64(0);
        let action = engine.select_action(&[0.0, 1.0, 5.0, -1.0, 2.0], false, &mut rng);
        assert_eq!(action, Action(vec![ActionValue::Discrete(1), ActionValue::Discrete(0)]));
    }
}
