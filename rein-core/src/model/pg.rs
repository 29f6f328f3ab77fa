//! Policy-gradient engines acting through [`PolicyHeads`].
mod ppo;
mod trpo;
mod vpg;
pub use ppo::{ppo_objective_terms, PpoEngine};
pub use trpo::TrpoEngine;
pub use vpg::VpgEngine;
pub(crate) use ppo::PpoParams;
pub(crate) use trpo::TrpoParams;

use super::{engine::EngineContext, ParamSet};
use crate::{distribution::PolicyHeads, error::Result, Action};
use rand::rngs::StdRng;

/// Pre-update policy, pinned before any candidate parameters are evaluated.
///
/// Probability ratios and KL divergences of trust-region and clipped updates
/// are always taken against this snapshot.
#[derive(Clone, Debug)]
pub struct PolicySnapshot {
    /// Parameters before the update.
    pub params: ParamSet,

    /// Network outputs of the batch under `params`.
    pub outputs: Vec<Vec<f32>>,

    /// Log-probabilities of the batch actions under `params`.
    pub log_probs: Vec<f32>,
}

impl PolicySnapshot {
    /// Evaluates the policy at the online parameters.
    pub fn take(
        ctx: &EngineContext,
        heads: &PolicyHeads,
        inputs: &[Vec<f32>],
        internals: &[crate::InternalState],
        actions: &[Action],
    ) -> Result<Self> {
        let params = ctx.params.clone();
        let outputs = ctx
            .forward(&params, inputs, internals)?
            .into_iter()
            .map(|f| f.output)
            .collect::<Vec<_>>();
        let log_probs = outputs
            .iter()
            .zip(actions.iter())
            .map(|(o, a)| heads.log_prob(o, a))
            .collect();
        Ok(Self {
            params,
            outputs,
            log_probs,
        })
    }

    /// Mean KL divergence from the snapshot to the policy with `outputs`.
    pub fn mean_kl(&self, heads: &PolicyHeads, outputs: &[Vec<f32>]) -> f32 {
        if outputs.is_empty() {
            return 0.0;
        }
        self.outputs
            .iter()
            .zip(outputs.iter())
            .map(|(old, new)| heads.kl_divergence(old, new))
            .sum::<f32>()
            / outputs.len() as f32
    }
}

/// Samples or takes the mode of the policy.
pub(crate) fn policy_action(
    heads: &PolicyHeads,
    output: &[f32],
    deterministic: bool,
    rng: &mut StdRng,
) -> Action {
    if deterministic {
        heads.mode(output)
    } else {
        heads.sample(output, rng)
    }
}
