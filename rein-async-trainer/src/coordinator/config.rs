use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`Coordinator`](crate::Coordinator).
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct CoordinatorConfig {
    /// Number of worker threads.
    pub n_workers: usize,

    /// Environment steps over all workers.
    pub max_steps: usize,

    /// Interval of pulling the shared parameters in worker steps.
    pub sync_interval: usize,

    /// Episodes are truncated after this number of steps.
    pub max_episode_timesteps: Option<usize>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            n_workers: 4,
            max_steps: 10_000,
            sync_interval: 1,
            max_episode_timesteps: None,
        }
    }
}

impl CoordinatorConfig {
    /// Sets the number of workers.
    pub fn n_workers(mut self, v: usize) -> Self {
        self.n_workers = v;
        self
    }

    /// Sets the step budget.
    pub fn max_steps(mut self, v: usize) -> Self {
        self.max_steps = v;
        self
    }

    /// Sets the interval of pulling the shared parameters.
    pub fn sync_interval(mut self, v: usize) -> Self {
        self.sync_interval = v;
        self
    }

    /// Sets the truncation length of episodes.
    pub fn max_episode_timesteps(mut self, v: Option<usize>) -> Self {
        self.max_episode_timesteps = v;
        self
    }

    /// Constructs [`CoordinatorConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`CoordinatorConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
