//! Configuration of [`ModelAgent`](super::ModelAgent).
use crate::{
    baseline::BaselineConfig,
    distribution::DistributionConfig,
    error::{ReinError, Result},
    exploration::ExplorationConfig,
    memory::ReplayMemoryConfig,
    model::{AlgorithmConfig, OptimizerConfig},
    preprocessing::PreprocessorConfig,
    ActionSpec, StateSpec,
};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// When the agent updates its model.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Copy)]
pub enum UpdateTrigger {
    /// Every `k` timesteps.
    EveryKSteps(usize),

    /// At the end of every episode.
    EpisodeEnd,

    /// Whenever the memory holds at least `n` transitions.
    Occupancy(usize),
}

/// Schedule of target network updates.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct TargetSyncConfig {
    /// Interval in timesteps.
    pub frequency: usize,

    /// Weight of the online parameters, `1` for a hard copy.
    pub weight: f32,
}

impl Default for TargetSyncConfig {
    fn default() -> Self {
        Self {
            frequency: 1000,
            weight: 1.0,
        }
    }
}

/// Configuration of [`ModelAgent`](super::ModelAgent).
///
/// # Examples
///
/// ```rust
/// use rein_core::{
///     agent::{AgentConfig, TargetSyncConfig, UpdateTrigger},
///     model::{AlgorithmConfig, DqnConfig},
/// };
///
/// let config = AgentConfig::default()
///     .algorithm(AlgorithmConfig::Dqn(DqnConfig::default().double_q(true)))
///     .batch_size(64)
///     .update_trigger(UpdateTrigger::EveryKSteps(4))
///     .target_sync(Some(TargetSyncConfig::default()));
/// ```
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct AgentConfig {
    /// Learning algorithm.
    pub algorithm: AlgorithmConfig,

    /// Memory of the agent.
    pub memory: ReplayMemoryConfig,

    /// Optimizer of the model.
    pub optimizer: OptimizerConfig,

    /// Policy distributions of policy-gradient algorithms.
    pub distribution: DistributionConfig,

    /// Baseline of policy-gradient algorithms.
    pub baseline: Option<BaselineConfig>,

    /// Exploration in training mode.
    pub exploration: Option<ExplorationConfig>,

    /// Preprocessor stacks, one per state component.
    pub preprocessing: Option<Vec<Vec<PreprocessorConfig>>>,

    /// Batch size of off-policy updates.
    pub batch_size: usize,

    /// When updates run.
    pub update_trigger: UpdateTrigger,

    /// Minimal memory occupancy before the first update.
    pub first_update: usize,

    /// Updates per trigger.
    pub repeat_update: usize,

    /// Target network updates of Q-learning algorithms.
    pub target_sync: Option<TargetSyncConfig>,

    /// Makes a second `act` without `observe` an error.
    pub stateless: bool,

    /// Seed of parameter initialization and action sampling.
    pub seed: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            algorithm: AlgorithmConfig::default(),
            memory: ReplayMemoryConfig::default(),
            optimizer: OptimizerConfig::default(),
            distribution: DistributionConfig::default(),
            baseline: None,
            exploration: None,
            preprocessing: None,
            batch_size: 32,
            update_trigger: UpdateTrigger::EpisodeEnd,
            first_update: 0,
            repeat_update: 1,
            target_sync: None,
            stateless: false,
            seed: 42,
        }
    }
}

impl AgentConfig {
    /// Sets the algorithm.
    pub fn algorithm(mut self, algorithm: AlgorithmConfig) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Sets the memory configuration.
    pub fn memory(mut self, memory: ReplayMemoryConfig) -> Self {
        self.memory = memory;
        self
    }

    /// Sets the optimizer.
    pub fn optimizer(mut self, optimizer: OptimizerConfig) -> Self {
        self.optimizer = optimizer;
        self
    }

    /// Sets the policy distributions.
    pub fn distribution(mut self, distribution: DistributionConfig) -> Self {
        self.distribution = distribution;
        self
    }

    /// Sets the baseline.
    pub fn baseline(mut self, baseline: Option<BaselineConfig>) -> Self {
        self.baseline = baseline;
        self
    }

    /// Sets the exploration.
    pub fn exploration(mut self, exploration: Option<ExplorationConfig>) -> Self {
        self.exploration = exploration;
        self
    }

    /// Sets the preprocessor stacks.
    pub fn preprocessing(mut self, preprocessing: Option<Vec<Vec<PreprocessorConfig>>>) -> Self {
        self.preprocessing = preprocessing;
        self
    }

    /// Sets the batch size.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the update trigger.
    pub fn update_trigger(mut self, update_trigger: UpdateTrigger) -> Self {
        self.update_trigger = update_trigger;
        self
    }

    /// Sets the minimal occupancy before the first update.
    pub fn first_update(mut self, first_update: usize) -> Self {
        self.first_update = first_update;
        self
    }

    /// Sets the number of updates per trigger.
    pub fn repeat_update(mut self, repeat_update: usize) -> Self {
        self.repeat_update = repeat_update;
        self
    }

    /// Sets the target network schedule.
    pub fn target_sync(mut self, target_sync: Option<TargetSyncConfig>) -> Self {
        self.target_sync = target_sync;
        self
    }

    /// Sets the stateless flag.
    pub fn stateless(mut self, stateless: bool) -> Self {
        self.stateless = stateless;
        self
    }

    /// Sets the random seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Checks the configuration against the state and action components.
    ///
    /// Returns a [`ReinError::ConfigError`] naming the first option that is out
    /// of range, inconsistent with another option or unused by the algorithm.
    pub fn validate(&self, states: &[StateSpec], actions: &[ActionSpec]) -> Result<()> {
        fn err(msg: impl Into<String>) -> Result<()> {
            Err(ReinError::ConfigError(msg.into()))
        }

        self.algorithm.check(actions)?;
        let on_policy = self.algorithm.is_on_policy();

        if self.batch_size == 0 {
            return err("batch_size must be positive");
        }
        if self.repeat_update == 0 {
            return err("repeat_update must be positive");
        }
        if self.memory.capacity == 0 {
            return err("memory capacity must be positive");
        }
        if !on_policy && self.batch_size >= self.memory.capacity {
            return err(format!(
                "batch_size {} does not fit into a memory of capacity {}",
                self.batch_size, self.memory.capacity
            ));
        }
        if let UpdateTrigger::EveryKSteps(0) = self.update_trigger {
            return err("update trigger every 0 steps");
        }

        if let Some(per) = &self.memory.per_config {
            if on_policy {
                return err("prioritized memory is unused by policy-gradient algorithms");
            }
            if per.alpha < 0.0 || per.beta_0 < 0.0 || per.beta_final < 0.0 {
                return err("prioritized replay exponents must be non-negative");
            }
        }

        match (&self.target_sync, on_policy) {
            (Some(_), true) => {
                return err("target network settings are unused by policy-gradient algorithms")
            }
            (Some(sync), false) if sync.frequency == 0 || !(sync.weight > 0.0 && sync.weight <= 1.0) => {
                return err(format!(
                    "target sync needs a positive frequency and a weight in (0, 1], got {:?}",
                    sync
                ))
            }
            _ => {}
        }

        if self.baseline.is_some() && !on_policy {
            return err("baselines are unused by Q-learning algorithms");
        }
        if let Some(advantage) = self.algorithm.advantage() {
            if advantage.gae_lambda.is_some() && self.baseline.is_none() {
                return err("generalized advantage estimation requires a baseline");
            }
            if let Some(lambda) = advantage.gae_lambda {
                if !(0.0..=1.0).contains(&lambda) {
                    return err(format!("gae_lambda must lie in [0, 1], got {}", lambda));
                }
            }
        }
        if !on_policy && self.distribution != DistributionConfig::default() {
            return err("distribution settings are unused by Q-learning algorithms");
        }

        if let Some(exploration) = &self.exploration {
            exploration.check(actions)?;
        }
        if let Some(stacks) = &self.preprocessing {
            if stacks.len() != states.len() {
                return err(format!(
                    "{} preprocessor stacks given for {} state components",
                    stacks.len(),
                    states.len()
                ));
            }
        }
        if let Some(defaults) = &self.distribution.defaults {
            if defaults.len() != actions.len() {
                return err(format!(
                    "{} distribution defaults given for {} action components",
                    defaults.len(),
                    actions.len()
                ));
            }
        }
        Ok(())
    }

    /// Loads the configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        log::info!("Load agent config from {:?}", path);
        Ok(b)
    }

    /// Saves the configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        log::info!("Save agent config into {:?}", path);
        Ok(())
    }
}
