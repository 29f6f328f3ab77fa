//! Configuration of action distributions.
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Distribution family of continuous action components.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Copy)]
pub enum ContinuousDistribution {
    /// [`Gaussian`](super::Gaussian), clipped to bounds if the action is bounded.
    Gaussian,

    /// [`Beta`](super::Beta), requires bounded actions.
    Beta,
}

/// Fixed value of an action component that is not learned.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub enum ActionDefault {
    /// The component is learned.
    Learned,

    /// The discrete component always takes this value.
    Discrete(usize),

    /// Per-dimension defaults of a continuous component. `None` dimensions are learned.
    Continuous(Vec<Option<f32>>),
}

/// Configuration of the distributions of a policy.
///
/// # Examples
///
/// ```rust
/// use rein_core::distribution::{ContinuousDistribution, DistributionConfig};
///
/// let config = DistributionConfig::default()
///     .continuous(ContinuousDistribution::Beta)
///     .temperature(0.5);
/// ```
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct DistributionConfig {
    /// Distribution of continuous action components.
    pub continuous: ContinuousDistribution,

    /// Sampling temperature of categorical distributions.
    pub temperature: f32,

    /// Default values, one entry per action component.
    pub defaults: Option<Vec<ActionDefault>>,
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            continuous: ContinuousDistribution::Gaussian,
            temperature: 1.0,
            defaults: None,
        }
    }
}

impl DistributionConfig {
    /// Sets the distribution of continuous action components.
    pub fn continuous(mut self, continuous: ContinuousDistribution) -> Self {
        self.continuous = continuous;
        self
    }

    /// Sets the sampling temperature of categorical distributions.
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Sets default values of action components.
    pub fn defaults(mut self, defaults: Option<Vec<ActionDefault>>) -> Self {
        self.defaults = defaults;
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
