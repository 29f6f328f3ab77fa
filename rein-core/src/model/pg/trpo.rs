//! Trust region policy optimization.
use super::{policy_action, PolicySnapshot};
use crate::{
    baseline::AdvantageConfig,
    distribution::PolicyHeads,
    error::{ReinError, Result},
    model::{
        conjugate_gradient::conjugate_gradient,
        engine::{EngineContext, Objective, Requirements, StepProposal, UpdateBatch},
        Optimizer, UpdateEngine,
    },
    record::{Record, RecordValue},
    util::{axpy, dot, norm},
    Action,
};
use rand::rngs::StdRng;

/// Parameters of [`TrpoEngine`].
#[derive(Clone, Debug)]
pub(crate) struct TrpoParams {
    pub max_kl: f32,
    pub cg_iters: usize,
    pub cg_damping: f32,
    pub max_backtracks: usize,
    pub backtrack_decay: f32,
    pub ls_accept_ratio: f32,
}

/// Maximizes the surrogate `mean(pi / pi_old * A)` subject to
/// `mean KL(pi_old || pi) <= max_kl`.
///
/// The search direction solves `F x = g` by conjugate gradient, where `F` is the
/// empirical Fisher matrix of the per-sample score vectors. The full step is
/// scaled so that its quadratic KL estimate equals `max_kl`, then shrunk by
/// `backtrack_decay` until a candidate either stays within `max_kl` or improves
/// the surrogate by more than `ls_accept_ratio` times the linear estimate.
/// A candidate with non-finite KL is never accepted.
pub struct TrpoEngine {
    heads: PolicyHeads,
    advantage: AdvantageConfig,
    params: TrpoParams,
    pending: Option<(PolicySnapshot, Vec<Vec<f32>>)>,
}

impl TrpoEngine {
    pub(crate) fn new(heads: PolicyHeads, advantage: AdvantageConfig, params: TrpoParams) -> Self {
        Self {
            heads,
            advantage,
            params,
            pending: None,
        }
    }

    /// Mean surrogate `pi / pi_old * A` of the candidate outputs.
    fn surrogate(&self, snapshot: &PolicySnapshot, batch: &UpdateBatch, outputs: &[Vec<f32>]) -> f32 {
        let n = batch.len().max(1) as f32;
        outputs
            .iter()
            .zip(batch.actions.iter())
            .zip(snapshot.log_probs.iter().zip(batch.advantages.iter()))
            .map(|((o, a), (lp_old, adv))| (self.heads.log_prob(o, a) - lp_old).exp() * adv)
            .sum::<f32>()
            / n
    }
}

impl UpdateEngine for TrpoEngine {
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
        let n = batch.len().max(1) as f32;

        // Per-sample score vectors grad log pi(a_i | s_i)
        let scores = (0..batch.len())
            .map(|i| {
                let g_out = self
                    .heads
                    .log_prob_grad(&snapshot.outputs[i], &batch.actions[i]);
                ctx.network
                    .backward(ctx.params, &batch.inputs[i], &batch.internals[i], &g_out)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut grad = vec![0.0; ctx.params.len()];
        for (s, adv) in scores.iter().zip(batch.advantages.iter()) {
            axpy(&mut grad, -adv / n, s);
        }
        let loss = -batch.advantages.iter().sum::<f32>() / n;
        self.pending = Some((snapshot, scores));

        Ok(Objective {
            loss,
            grad,
            priorities: None,
            record: Record::empty(),
        })
    }

    fn compute_step(
        &mut self,
        ctx: &EngineContext,
        batch: &UpdateBatch,
        objective: Objective,
        _optimizer: &mut Optimizer,
    ) -> Result<StepProposal> {
        let (snapshot, scores) = self.pending.take().ok_or_else(|| {
            ReinError::SequenceError("step computed before the objective".to_string())
        })?;
        let p = &self.params;
        let g = objective.grad.iter().map(|v| -v).collect::<Vec<_>>();
        if norm(&g) == 0.0 {
            return Err(ReinError::ConstraintRejectedError(
                "policy gradient is zero".to_string(),
            ));
        }

        let n = scores.len().max(1) as f32;
        let fisher = |v: &[f32]| {
            let mut fv = v.iter().map(|x| p.cg_damping * x).collect::<Vec<_>>();
            for s in scores.iter() {
                axpy(&mut fv, dot(s, v) / n, s);
            }
            fv
        };
        let x = conjugate_gradient(&fisher, &g, p.cg_iters, 1e-10);
        let shs = dot(&x, &fisher(&x));
        if !(shs.is_finite() && shs > 0.0) {
            return Err(ReinError::NumericalInstabilityError(format!(
                "non-positive curvature along the search direction: {}",
                shs
            )));
        }
        let beta = (2.0 * p.max_kl / shs).sqrt();
        let full_step = x.iter().map(|v| beta * v).collect::<Vec<_>>();
        let expected_full = dot(&g, &full_step);
        let surrogate_old = -objective.loss;

        for k in 0..p.max_backtracks {
            let frac = p.backtrack_decay.powi(k as i32);
            let candidate = snapshot.params.added(frac, &full_step);
            let outputs = ctx
                .forward(&candidate, &batch.inputs, &batch.internals)?
                .into_iter()
                .map(|f| f.output)
                .collect::<Vec<_>>();
            let kl = snapshot.mean_kl(&self.heads, &outputs);
            let improvement = self.surrogate(&snapshot, batch, &outputs) - surrogate_old;
            let expected = expected_full * frac;
            log::trace!(
                "backtrack {}: kl={} improvement={} expected={}",
                k,
                kl,
                improvement,
                expected
            );

            let within_kl = kl <= p.max_kl;
            let ratio_met = improvement > 0.0 && improvement / expected > p.ls_accept_ratio;
            if kl.is_finite() && (within_kl || ratio_met) {
                let record = Record::from_slice(&[
                    ("loss", RecordValue::Scalar(objective.loss)),
                    ("kl", RecordValue::Scalar(kl)),
                    ("backtracks", RecordValue::Scalar(k as f32)),
                    ("improvement", RecordValue::Scalar(improvement)),
                ]);
                return Ok(StepProposal {
                    delta: full_step.iter().map(|v| frac * v).collect(),
                    record,
                });
            }
        }

        Err(ReinError::ConstraintRejectedError(format!(
            "line search found no acceptable step in {} backtracks",
            p.max_backtracks
        )))
    }
}
