//! Proximal policy optimization with the clipped surrogate.
use super::{policy_action, PolicySnapshot};
use crate::{
    baseline::AdvantageConfig,
    distribution::PolicyHeads,
    error::{ReinError, Result},
    model::{
        engine::{EngineContext, Objective, Requirements, StepProposal, UpdateBatch},
        Optimizer, UpdateEngine,
    },
    record::{Record, RecordValue},
    Action,
};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

/// Unclipped and clipped terms of the PPO surrogate, `(r A, clip(r, 1 - eps, 1 + eps) A)`.
///
/// The per-sample objective is the minimum of both terms. The terms coincide at
/// `r = 1 ± eps`, so the objective is continuous at the clipping boundaries.
pub fn ppo_objective_terms(ratio: f32, advantage: f32, clip: f32) -> (f32, f32) {
    let clipped = ratio.max(1.0 - clip).min(1.0 + clip);
    (ratio * advantage, clipped * advantage)
}

/// Parameters of [`PpoEngine`].
#[derive(Clone, Debug)]
pub(crate) struct PpoParams {
    pub clip: f32,
    pub epochs: usize,
    pub minibatch_size: Option<usize>,
    pub target_kl: Option<f32>,
}

/// Maximizes `mean(min(r A, clip(r) A))` over several epochs of the same batch.
///
/// Ratios are taken against the policy pinned when the objective is computed.
/// Epochs run on a local copy of the parameters, the model receives the total
/// difference as the step. Training on the batch stops early when the mean KL
/// to the pinned policy exceeds `1.5 * target_kl`.
pub struct PpoEngine {
    heads: PolicyHeads,
    advantage: AdvantageConfig,
    params: PpoParams,
    rng: StdRng,
    snapshot: Option<PolicySnapshot>,
}

impl PpoEngine {
    pub(crate) fn new(
        heads: PolicyHeads,
        advantage: AdvantageConfig,
        params: PpoParams,
        seed: u64,
    ) -> Self {
        Self {
            heads,
            advantage,
            params,
            rng: StdRng::seed_from_u64(seed),
            snapshot: None,
        }
    }

    /// Gradient of the negative clipped surrogate of a minibatch at `params`.
    fn minibatch_grad(
        &self,
        ctx: &EngineContext,
        snapshot: &PolicySnapshot,
        batch: &UpdateBatch,
        ixs: &[usize],
        params: &crate::model::ParamSet,
    ) -> Result<(f32, Vec<f32>)> {
        let m = ixs.len().max(1) as f32;
        let mut loss = 0.0;
        let mut grad = vec![0.0; params.len()];
        for &i in ixs {
            let f = ctx
                .network
                .forward(params, &batch.inputs[i], &batch.internals[i])?;
            let action = &batch.actions[i];
            let adv = batch.advantages[i];
            let ratio = (self.heads.log_prob(&f.output, action) - snapshot.log_probs[i]).exp();
            let (unclipped, clipped) = ppo_objective_terms(ratio, adv, self.params.clip);
            loss -= unclipped.min(clipped) / m;

            // The clipped term is flat in the parameters
            if unclipped <= clipped {
                let g_out = self
                    .heads
                    .log_prob_grad(&f.output, action)
                    .into_iter()
                    .map(|g| -adv * ratio * g / m)
                    .collect::<Vec<_>>();
                let g = ctx
                    .network
                    .backward(params, &batch.inputs[i], &batch.internals[i], &g_out)?;
                grad.iter_mut().zip(g.iter()).for_each(|(a, b)| *a += b);
            }
        }
        Ok((loss, grad))
    }
}

impl UpdateEngine for PpoEngine {
    fn requirements(&self) -> Requirements {
        Requirements {
            next_states: false,
            on_policy: true,
            n_step: 1,
            target_network: false,
            advantage: Some(self.advantage.clone()),
        }
    }

    fn output_len(&self) -> usize {
        self.heads.param_len()
    }

    fn select_action(&self, output: &[f32], deterministic: bool, rng: &mut StdRng) -> Action {
        policy_action(&self.heads, output, deterministic, rng)
    }

    fn compute_objective(
        &mut self,
        ctx: &EngineContext,
        batch: &UpdateBatch,
    ) -> Result<Objective> {
        let snapshot = PolicySnapshot::take(
            ctx,
            &self.heads,
            &batch.inputs,
            &batch.internals,
            &batch.actions,
        )?;
        let all = (0..batch.len()).collect::<Vec<_>>();
        let (loss, grad) = self.minibatch_grad(ctx, &snapshot, batch, &all, &snapshot.params)?;
        let entropy = snapshot
            .outputs
            .iter()
            .map(|o| self.heads.entropy(o))
            .sum::<f32>()
            / batch.len().max(1) as f32;
        self.snapshot = Some(snapshot);

        Ok(Objective {
            loss,
            grad,
            priorities: None,
            record: Record::from_slice(&[("entropy", RecordValue::Scalar(entropy))]),
        })
    }

    fn compute_step(
        &mut self,
        ctx: &EngineContext,
        batch: &UpdateBatch,
        objective: Objective,
        optimizer: &mut Optimizer,
    ) -> Result<StepProposal> {
        let snapshot = self.snapshot.take().ok_or_else(|| {
            ReinError::SequenceError("step computed before the objective".to_string())
        })?;
        let n = batch.len();
        let minibatch_size = self.params.minibatch_size.unwrap_or(n).max(1).min(n.max(1));

        let mut local = snapshot.params.clone();
        let mut ixs = (0..n).collect::<Vec<_>>();
        let mut kl = 0.0;
        let mut loss = objective.loss;
        let mut epochs = 0;

        for epoch in 0..self.params.epochs {
            if self.params.minibatch_size.is_some() {
                ixs.shuffle(&mut self.rng);
            }
            for chunk in ixs.chunks(minibatch_size) {
                let (l, grad) = self.minibatch_grad(ctx, &snapshot, batch, chunk, &local)?;
                loss = l;
                let delta = optimizer.step(&local, &grad)?;
                local.add(&delta);
            }
            epochs = epoch + 1;

            let outputs = ctx
                .forward(&local, &batch.inputs, &batch.internals)?
                .into_iter()
                .map(|f| f.output)
                .collect::<Vec<_>>();
            kl = snapshot.mean_kl(&self.heads, &outputs);
            if let Some(target_kl) = self.params.target_kl {
                if kl > 1.5 * target_kl {
                    log::debug!("early stop at epoch {}: kl={}", epochs, kl);
                    break;
                }
            }
        }

        let mut record = objective.record;
        record.insert("loss", RecordValue::Scalar(loss));
        record.insert("kl", RecordValue::Scalar(kl));
        record.insert("epochs", RecordValue::Scalar(epochs as f32));
        Ok(StepProposal {
            delta: local.diff(&snapshot.params),
            record,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_objective_terms_continuous_at_boundaries() {
        let clip = 0.2;
        for &adv in &[1.5f32, -0.7] {
            for &boundary in &[1.0 - clip, 1.0 + clip] {
                let below = ppo_objective_terms(boundary - 1e-4, adv, clip);
                let at = ppo_objective_terms(boundary, adv, clip);
                let above = ppo_objective_terms(boundary + 1e-4, adv, clip);
                let obj = |(u, c): (f32, f32)| u.min(c);
                assert!((at.0 - at.1).abs() < 1e-6);
                assert!((obj(below) - obj(at)).abs() < 1e-3);
                assert!((obj(above) - obj(at)).abs() < 1e-3);
            }
        }
    }

    #[test]
    fn test_objective_terms_clip_only_one_side() {
        // Positive advantage: gains above 1 + eps are cut off
        let (u, c) = ppo_objective_terms(1.5, 1.0, 0.2);
        assert_eq!(u.min(c), 1.2);
        // Positive advantage below 1 - eps stays unclipped, the min picks r A
        let (u, c) = ppo_objective_terms(0.5, 1.0, 0.2);
        assert_eq!(u.min(c), 0.5);
        // Negative advantage: the pessimistic term is kept
        let (u, c) = ppo_objective_terms(1.5, -1.0, 0.2);
        assert_eq!(u.min(c), -1.5);
    }
}
