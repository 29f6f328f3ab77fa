//! Configuration of baselines and advantage estimation.
use crate::model::OptimizerConfig;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Estimator used for each state component.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub enum BaselineConfig {
    /// [`LinearBaseline`](super::LinearBaseline).
    Linear,

    /// [`NetworkBaseline`](super::NetworkBaseline).
    Network {
        /// Hidden layer sizes of the value network.
        hidden: Vec<usize>,

        /// Optimizer of the value network.
        optimizer: OptimizerConfig,

        /// Gradient steps per fit.
        repeat_update: usize,
    },
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self::Linear
    }
}

impl BaselineConfig {
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

/// How policy-gradient algorithms turn rewards into advantages.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct AdvantageConfig {
    /// Discount factor.
    pub discount: f32,

    /// Generalized advantage estimation with this `lambda`. Requires a baseline.
    pub gae_lambda: Option<f32>,

    /// Standardizes advantages within a batch.
    pub normalize: bool,
}

impl Default for AdvantageConfig {
    fn default() -> Self {
        Self {
            discount: 0.99,
            gae_lambda: None,
            normalize: false,
        }
    }
}

impl AdvantageConfig {
    /// Sets the discount factor.
    pub fn discount(mut self, discount: f32) -> Self {
        self.discount = discount;
        self
    }

    /// Sets the GAE parameter.
    pub fn gae_lambda(mut self, gae_lambda: Option<f32>) -> Self {
        self.gae_lambda = gae_lambda;
        self
    }

    /// Enables normalization of advantages.
    pub fn normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }
}
