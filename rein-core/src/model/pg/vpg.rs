//! Vanilla policy gradient.
use super::policy_action;
use crate::{
    baseline::AdvantageConfig,
    distribution::PolicyHeads,
    error::Result,
    model::{
        engine::{gradient_step, EngineContext, Objective, Requirements, StepProposal, UpdateBatch},
        Optimizer, UpdateEngine,
    },
    record::{Record, RecordValue},
    Action,
};
use rand::rngs::StdRng;

/// Minimizes `-mean(A log pi(a | s))` over chronological batches.
pub struct VpgEngine {
    heads: PolicyHeads,
    advantage: AdvantageConfig,
}

impl VpgEngine {
    /// Creates an engine for the given policy heads.
    pub fn new(heads: PolicyHeads, advantage: AdvantageConfig) -> Self {
        Self { heads, advantage }
    }
}

impl UpdateEngine for VpgEngine {
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
        let scale = 1.0 / batch.len().max(1) as f32;
        let outputs = ctx.forward(ctx.params, &batch.inputs, &batch.internals)?;

        let mut loss = 0.0;
        let mut entropy = 0.0;
        let grad_outputs = outputs
            .iter()
            .zip(batch.actions.iter())
            .zip(batch.advantages.iter())
            .map(|((f, a), adv)| {
                loss -= adv * self.heads.log_prob(&f.output, a) * scale;
                entropy += self.heads.entropy(&f.output) * scale;
                self.heads
                    .log_prob_grad(&f.output, a)
                    .into_iter()
                    .map(|g| -adv * g * scale)
                    .collect()
            })
            .collect::<Vec<Vec<f32>>>();

        let grad = ctx.backward(ctx.params, &batch.inputs, &batch.internals, &grad_outputs)?;
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
        _batch: &UpdateBatch,
        objective: Objective,
        optimizer: &mut Optimizer,
    ) -> Result<StepProposal> {
        gradient_step(objective, ctx.params, optimizer, None)
    }
}
