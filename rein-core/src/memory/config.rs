//! Configuration of [`ReplayMemory`](super::ReplayMemory).
use super::WeightNormalizer;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    default::Default,
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Which entry a full memory drops when a new transition arrives.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Copy)]
pub enum EvictionPolicy {
    /// Ring-buffer semantics.
    Oldest,

    /// Drop the entry with the lowest priority. Only meaningful for prioritized memories.
    LowestPriority,
}

/// Configuration for prioritized replay.
///
/// # Examples
///
/// ```rust
/// use rein_core::memory::{PerConfig, WeightNormalizer};
///
/// let config = PerConfig::default()
///     .alpha(0.6)
///     .beta_0(0.4)
///     .beta_final(1.0)
///     .beta_batches(500_000)
///     .normalize(WeightNormalizer::Batch);
/// ```
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct PerConfig {
    /// Exponent of priorities. A value of 0 results in uniform sampling.
    pub alpha: f32,

    /// Initial value of the importance sampling exponent.
    pub beta_0: f32,

    /// Final value of the importance sampling exponent.
    pub beta_final: f32,

    /// Number of prioritized batches after which `beta` reaches its final value.
    pub beta_batches: usize,

    /// Method for normalizing importance sampling weights.
    pub normalize: WeightNormalizer,

    /// Added to priorities before exponentiation.
    pub epsilon: f32,

    /// Eviction order of a full memory.
    pub eviction: EvictionPolicy,
}

impl Default for PerConfig {
    fn default() -> Self {
        Self {
            alpha: 0.6,
            beta_0: 0.4,
            beta_final: 1.0,
            beta_batches: 500_000,
            normalize: WeightNormalizer::Batch,
            epsilon: 1e-6,
            eviction: EvictionPolicy::LowestPriority,
        }
    }
}

impl PerConfig {
    /// Sets the prioritization exponent `alpha`.
    pub fn alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha;
        self
    }

    /// Sets the initial importance sampling exponent `beta_0`.
    pub fn beta_0(mut self, beta_0: f32) -> Self {
        self.beta_0 = beta_0;
        self
    }

    /// Sets the final importance sampling exponent `beta_final`.
    pub fn beta_final(mut self, beta_final: f32) -> Self {
        self.beta_final = beta_final;
        self
    }

    /// Sets the number of prioritized batches to reach the final beta value.
    pub fn beta_batches(mut self, beta_batches: usize) -> Self {
        self.beta_batches = beta_batches;
        self
    }

    /// Sets the method for normalizing importance weights.
    pub fn normalize(mut self, normalize: WeightNormalizer) -> Self {
        self.normalize = normalize;
        self
    }

    /// Sets the offset added to priorities.
    pub fn epsilon(mut self, epsilon: f32) -> Self {
        self.epsilon = epsilon;
        self
    }

    /// Sets the eviction policy.
    pub fn eviction(mut self, eviction: EvictionPolicy) -> Self {
        self.eviction = eviction;
        self
    }
}

/// Configuration of the replay memory.
///
/// # Examples
///
/// ```rust
/// use rein_core::memory::{ReplayMemoryConfig, PerConfig};
///
/// let config = ReplayMemoryConfig::default()
///     .capacity(10000)
///     .seed(42)
///     .per_config(Some(PerConfig::default()));
/// ```
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct ReplayMemoryConfig {
    /// Maximum number of transitions that can be stored in the memory.
    pub capacity: usize,

    /// Random seed used for sampling transitions.
    pub seed: u64,

    /// Prioritized replay. If `None`, transitions are sampled uniformly at random.
    pub per_config: Option<PerConfig>,
}

impl Default for ReplayMemoryConfig {
    fn default() -> Self {
        Self {
            capacity: 10000,
            seed: 42,
            per_config: None,
        }
    }
}

impl ReplayMemoryConfig {
    /// Sets the capacity of the memory.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the random seed for sampling.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sets the configuration for prioritized replay.
    pub fn per_config(mut self, per_config: Option<PerConfig>) -> Self {
        self.per_config = per_config;
        self
    }

    /// Loads the configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves the configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
