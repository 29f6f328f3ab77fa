//! Configuration of the learning algorithm.
use super::{
    pg::{PpoEngine, PpoParams, TrpoEngine, TrpoParams, VpgEngine},
    q::{CategoricalDqnEngine, DqnEngine, NafEngine},
    UpdateEngine,
};
use crate::{
    baseline::AdvantageConfig,
    distribution::{DistributionConfig, PolicyHeads},
    error::{ReinError, Result},
    ActionSpec,
};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`DqnEngine`].
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct DqnConfig {
    /// Discount factor.
    pub discount: f32,

    /// Double Q-learning.
    pub double_q: bool,

    /// Huber loss threshold. If `None`, the squared loss is used.
    pub huber_delta: Option<f32>,

    /// Maximal global gradient norm.
    pub clip_grad_norm: Option<f32>,

    /// Length of the reward window.
    pub n_step: usize,
}

impl Default for DqnConfig {
    fn default() -> Self {
        Self {
            discount: 0.99,
            double_q: false,
            huber_delta: None,
            clip_grad_norm: Some(10.0),
            n_step: 1,
        }
    }
}

impl DqnConfig {
    /// Sets the discount factor.
    pub fn discount(mut self, discount: f32) -> Self {
        self.discount = discount;
        self
    }

    /// Enables double Q-learning.
    pub fn double_q(mut self, double_q: bool) -> Self {
        self.double_q = double_q;
        self
    }

    /// Sets the Huber loss threshold.
    pub fn huber_delta(mut self, huber_delta: Option<f32>) -> Self {
        self.huber_delta = huber_delta;
        self
    }

    /// Sets the maximal global gradient norm.
    pub fn clip_grad_norm(mut self, clip_grad_norm: Option<f32>) -> Self {
        self.clip_grad_norm = clip_grad_norm;
        self
    }

    /// Sets the length of the reward window.
    pub fn n_step(mut self, n_step: usize) -> Self {
        self.n_step = n_step;
        self
    }
}

/// Configuration of deep Q-learning from demonstrations.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct DqfdConfig {
    /// Parameters of the TD loss.
    pub dqn: DqnConfig,

    /// Margin `m` added to non-expert actions.
    pub expert_margin: f32,

    /// Weight of the large-margin loss.
    pub supervised_weight: f32,

    /// Share `p` of demonstrations in the combined batch.
    pub demo_sampling_ratio: f32,

    /// Capacity of the demonstration memory.
    pub demo_memory_capacity: usize,
}

impl Default for DqfdConfig {
    fn default() -> Self {
        Self {
            dqn: DqnConfig::default(),
            expert_margin: 0.8,
            supervised_weight: 0.1,
            demo_sampling_ratio: 0.2,
            demo_memory_capacity: 10000,
        }
    }
}

impl DqfdConfig {
    /// Size of the demonstration batch run after a regular batch of `batch_size`.
    pub fn demo_batch_size(&self, batch_size: usize) -> usize {
        let p = self.demo_sampling_ratio;
        ((p * batch_size as f32) / (1.0 - p)).round() as usize
    }
}

/// Configuration of [`NafEngine`].
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct NafConfig {
    /// Discount factor.
    pub discount: f32,

    /// Huber loss threshold.
    pub huber_delta: Option<f32>,

    /// Maximal global gradient norm.
    pub clip_grad_norm: Option<f32>,

    /// Length of the reward window.
    pub n_step: usize,
}

impl Default for NafConfig {
    fn default() -> Self {
        Self {
            discount: 0.99,
            huber_delta: None,
            clip_grad_norm: Some(10.0),
            n_step: 1,
        }
    }
}

/// Configuration of [`CategoricalDqnEngine`].
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct CategoricalDqnConfig {
    /// Discount factor.
    pub discount: f32,

    /// Number of atoms of the return distribution.
    pub num_atoms: usize,

    /// Smallest atom.
    pub v_min: f32,

    /// Largest atom.
    pub v_max: f32,

    /// Maximal global gradient norm.
    pub clip_grad_norm: Option<f32>,

    /// Length of the reward window.
    pub n_step: usize,
}

impl Default for CategoricalDqnConfig {
    fn default() -> Self {
        Self {
            discount: 0.99,
            num_atoms: 51,
            v_min: -10.0,
            v_max: 10.0,
            clip_grad_norm: Some(10.0),
            n_step: 1,
        }
    }
}

/// Configuration of [`VpgEngine`].
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Default)]
#[serde(deny_unknown_fields, default)]
pub struct VpgConfig {
    /// Advantage estimation.
    pub advantage: AdvantageConfig,
}

/// Configuration of [`TrpoEngine`].
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct TrpoConfig {
    /// Advantage estimation.
    pub advantage: AdvantageConfig,

    /// Bound on the mean KL divergence between the old and the new policy.
    pub max_kl: f32,

    /// Conjugate gradient iterations.
    pub cg_iters: usize,

    /// Damping added to the Fisher matrix.
    pub cg_damping: f32,

    /// Maximal number of line search steps.
    pub max_backtracks: usize,

    /// Step shrinking factor of the line search.
    pub backtrack_decay: f32,

    /// Minimal ratio of actual to expected improvement.
    pub ls_accept_ratio: f32,
}

impl Default for TrpoConfig {
    fn default() -> Self {
        Self {
            advantage: AdvantageConfig::default(),
            max_kl: 0.01,
            cg_iters: 10,
            cg_damping: 0.1,
            max_backtracks: 10,
            backtrack_decay: 0.5,
            ls_accept_ratio: 0.1,
        }
    }
}

impl TrpoConfig {
    /// Sets the KL bound.
    pub fn max_kl(mut self, max_kl: f32) -> Self {
        self.max_kl = max_kl;
        self
    }

    /// Sets the number of line search steps.
    pub fn max_backtracks(mut self, max_backtracks: usize) -> Self {
        self.max_backtracks = max_backtracks;
        self
    }

    /// Sets the step shrinking factor.
    pub fn backtrack_decay(mut self, backtrack_decay: f32) -> Self {
        self.backtrack_decay = backtrack_decay;
        self
    }

    /// Sets the acceptance ratio.
    pub fn ls_accept_ratio(mut self, ls_accept_ratio: f32) -> Self {
        self.ls_accept_ratio = ls_accept_ratio;
        self
    }
}

/// Configuration of [`PpoEngine`].
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct PpoConfig {
    /// Advantage estimation.
    pub advantage: AdvantageConfig,

    /// Clipping range `eps` of the probability ratio.
    pub clip: f32,

    /// Optimization passes over a batch.
    pub epochs: usize,

    /// Minibatch size. If `None`, each epoch takes a single step on the full batch.
    pub minibatch_size: Option<usize>,

    /// Stops the epochs when the mean KL exceeds `1.5 * target_kl`.
    pub target_kl: Option<f32>,

    /// Seed of minibatch shuffling.
    pub seed: u64,
}

impl Default for PpoConfig {
    fn default() -> Self {
        Self {
            advantage: AdvantageConfig::default(),
            clip: 0.2,
            epochs: 10,
            minibatch_size: None,
            target_kl: None,
            seed: 42,
        }
    }
}

impl PpoConfig {
    /// Sets the clipping range.
    pub fn clip(mut self, clip: f32) -> Self {
        self.clip = clip;
        self
    }

    /// Sets the number of epochs.
    pub fn epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    /// Sets the minibatch size.
    pub fn minibatch_size(mut self, minibatch_size: Option<usize>) -> Self {
        self.minibatch_size = minibatch_size;
        self
    }

    /// Sets the KL target of early stopping.
    pub fn target_kl(mut self, target_kl: Option<f32>) -> Self {
        self.target_kl = target_kl;
        self
    }
}

/// The learning algorithm and its parameters.
///
/// # Examples
///
/// ```rust
/// use rein_core::model::{AlgorithmConfig, TrpoConfig};
///
/// let config = AlgorithmConfig::Trpo(TrpoConfig::default().max_kl(0.02));
/// assert!(config.is_on_policy());
/// ```
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub enum AlgorithmConfig {
    /// Deep Q-learning.
    Dqn(DqnConfig),

    /// Deep Q-learning from demonstrations.
    Dqfd(DqfdConfig),

    /// Normalized advantage functions.
    Naf(NafConfig),

    /// Distributional Q-learning.
    CategoricalDqn(CategoricalDqnConfig),

    /// Vanilla policy gradient.
    Vpg(VpgConfig),

    /// Trust region policy optimization.
    Trpo(TrpoConfig),

    /// Proximal policy optimization.
    Ppo(PpoConfig),
}

impl Default for AlgorithmConfig {
    fn default() -> Self {
        Self::Ppo(PpoConfig::default())
    }
}

impl AlgorithmConfig {
    /// Returns `true` for policy-gradient algorithms, which learn from the
    /// chronological memory contents.
    pub fn is_on_policy(&self) -> bool {
        self.advantage().is_some()
    }

    /// Advantage estimation of policy-gradient algorithms.
    pub fn advantage(&self) -> Option<&AdvantageConfig> {
        match self {
            Self::Vpg(c) => Some(&c.advantage),
            Self::Trpo(c) => Some(&c.advantage),
            Self::Ppo(c) => Some(&c.advantage),
            _ => None,
        }
    }

    /// Discount factor.
    pub fn discount(&self) -> f32 {
        match self {
            Self::Dqn(c) => c.discount,
            Self::Dqfd(c) => c.dqn.discount,
            Self::Naf(c) => c.discount,
            Self::CategoricalDqn(c) => c.discount,
            Self::Vpg(c) => c.advantage.discount,
            Self::Trpo(c) => c.advantage.discount,
            Self::Ppo(c) => c.advantage.discount,
        }
    }

    /// Length of the reward window of off-policy algorithms.
    pub fn n_step(&self) -> usize {
        match self {
            Self::Dqn(c) => c.n_step,
            Self::Dqfd(c) => c.dqn.n_step,
            Self::Naf(c) => c.n_step,
            Self::CategoricalDqn(c) => c.n_step,
            _ => 1,
        }
    }

    /// Demonstration settings.
    pub fn dqfd(&self) -> Option<&DqfdConfig> {
        match self {
            Self::Dqfd(c) => Some(c),
            _ => None,
        }
    }

    /// Checks parameter ranges and the compatibility with the action components.
    pub fn check(&self, actions: &[ActionSpec]) -> Result<()> {
        fn err<T>(msg: impl Into<String>) -> Result<T> {
            Err(ReinError::ConfigError(msg.into()))
        }

        let discount = self.discount();
        if !(0.0..=1.0).contains(&discount) {
            return err(format!("discount must lie in [0, 1], got {}", discount));
        }
        if actions.is_empty() {
            return err("no action components");
        }
        for spec in actions.iter() {
            spec.check()?;
        }
        if self.n_step() == 0 {
            return err("n_step must be positive");
        }
        let all_discrete = actions.iter().all(|a| a.is_discrete());
        let all_continuous = actions.iter().all(|a| !a.is_discrete());

        match self {
            Self::Dqn(_) | Self::Dqfd(_) if !all_discrete => {
                err("Q-learning requires discrete action components")
            }
            Self::CategoricalDqn(_) if !all_discrete || actions.len() != 1 => {
                err("categorical DQN requires exactly one discrete action component")
            }
            Self::CategoricalDqn(c) if c.num_atoms < 2 || c.v_min >= c.v_max => err(format!(
                "categorical DQN needs at least two atoms on v_min < v_max, got {} on [{}, {}]",
                c.num_atoms, c.v_min, c.v_max
            )),
            Self::Naf(_) if !all_continuous => err("NAF requires continuous action components"),
            Self::Dqfd(c) if !(0.0..1.0).contains(&c.demo_sampling_ratio) => err(format!(
                "demo_sampling_ratio must lie in [0, 1), got {}",
                c.demo_sampling_ratio
            )),
            Self::Trpo(c) if !(c.backtrack_decay > 0.0 && c.backtrack_decay < 1.0) => err(format!(
                "backtrack_decay must lie in (0, 1), got {}",
                c.backtrack_decay
            )),
            Self::Trpo(c) if c.max_kl <= 0.0 || c.max_backtracks == 0 => {
                err("TRPO needs a positive max_kl and at least one backtrack")
            }
            Self::Ppo(c) if c.clip <= 0.0 => err(format!("PPO clip must be positive, got {}", c.clip)),
            Self::Ppo(c) if c.epochs == 0 || c.minibatch_size == Some(0) => {
                err("PPO needs at least one epoch and non-empty minibatches")
            }
            _ => Ok(()),
        }
    }

    /// Builds the update engine for the given action components.
    ///
    /// `distribution` selects the policy distributions of policy-gradient
    /// algorithms and is ignored by Q-learning algorithms.
    pub fn build_engine(
        &self,
        actions: &[ActionSpec],
        distribution: &DistributionConfig,
        seed: u64,
    ) -> Result<Box<dyn UpdateEngine>> {
        self.check(actions)?;
        let num_actions = || {
            actions
                .iter()
                .map(|a| match a {
                    ActionSpec::Discrete { num_actions } => *num_actions,
                    ActionSpec::Continuous { shape, .. } => *shape,
                })
                .collect::<Vec<_>>()
        };

        let engine: Box<dyn UpdateEngine> = match self {
            Self::Dqn(c) => Box::new(dqn_engine(c, num_actions())),
            Self::Dqfd(c) => Box::new(
                dqn_engine(&c.dqn, num_actions()).margin(c.expert_margin, c.supervised_weight),
            ),
            Self::Naf(c) => Box::new(
                NafEngine::new(
                    actions
                        .iter()
                        .map(|a| match a {
                            ActionSpec::Continuous { shape, .. } => (*shape, a.bounds()),
                            ActionSpec::Discrete { .. } => (0, None),
                        })
                        .collect(),
                    c.discount,
                )
                .huber_delta(c.huber_delta)
                .clip_grad_norm(c.clip_grad_norm)
                .n_step(c.n_step),
            ),
            Self::CategoricalDqn(c) => Box::new(
                CategoricalDqnEngine::new(
                    num_actions()[0],
                    c.num_atoms,
                    c.v_min,
                    c.v_max,
                    c.discount,
                )
                .clip_grad_norm(c.clip_grad_norm)
                .n_step(c.n_step),
            ),
            Self::Vpg(c) => Box::new(VpgEngine::new(
                PolicyHeads::build(actions, distribution)?,
                c.advantage.clone(),
            )),
            Self::Trpo(c) => Box::new(TrpoEngine::new(
                PolicyHeads::build(actions, distribution)?,
                c.advantage.clone(),
                TrpoParams {
                    max_kl: c.max_kl,
                    cg_iters: c.cg_iters,
                    cg_damping: c.cg_damping,
                    max_backtracks: c.max_backtracks,
                    backtrack_decay: c.backtrack_decay,
                    ls_accept_ratio: c.ls_accept_ratio,
                },
            )),
            Self::Ppo(c) => Box::new(PpoEngine::new(
                PolicyHeads::build(actions, distribution)?,
                c.advantage.clone(),
                PpoParams {
                    clip: c.clip,
                    epochs: c.epochs,
                    minibatch_size: c.minibatch_size,
                    target_kl: c.target_kl,
                },
                c.seed ^ seed,
            )),
        };
        Ok(engine)
    }

    /// Number of network outputs the algorithm needs for the given action components.
    pub fn output_len(
        &self,
        actions: &[ActionSpec],
        distribution: &DistributionConfig,
    ) -> Result<usize> {
        Ok(self.build_engine(actions, distribution, 0)?.output_len())
    }

    /// Loads the configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves the configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

fn dqn_engine(config: &DqnConfig, num_actions: Vec<usize>) -> DqnEngine {
    DqnEngine::new(num_actions, config.discount)
        .double_q(config.double_q)
        .huber_delta(config.huber_delta)
        .clip_grad_norm(config.clip_grad_norm)
        .n_step(config.n_step)
}
