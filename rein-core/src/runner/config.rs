//! Configuration of [`Runner`](super::Runner).
use anyhow::Result;
use log::info;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`Runner`](super::Runner).
///
/// At least one of `max_episodes` and `max_timesteps` must be set.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct RunnerConfig {
    /// The maximum number of episodes.
    pub max_episodes: Option<usize>,

    /// The maximum number of environment steps over all episodes.
    pub max_timesteps: Option<usize>,

    /// Episodes are truncated after this number of steps.
    pub max_episode_timesteps: Option<usize>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_episodes: Some(100),
            max_timesteps: None,
            max_episode_timesteps: None,
        }
    }
}

impl RunnerConfig {
    /// Sets the maximum number of episodes.
    pub fn max_episodes(mut self, v: Option<usize>) -> Self {
        self.max_episodes = v;
        self
    }

    /// Sets the maximum number of environment steps.
    pub fn max_timesteps(mut self, v: Option<usize>) -> Self {
        self.max_timesteps = v;
        self
    }

    /// Sets the truncation length of episodes.
    pub fn max_episode_timesteps(mut self, v: Option<usize>) -> Self {
        self.max_episode_timesteps = v;
        self
    }

    /// Constructs [`RunnerConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path_ = path.as_ref().to_owned();
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        info!("Load config of runner from {}", path_.to_str().unwrap_or("?"));
        Ok(b)
    }

    /// Saves [`RunnerConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path_ = path.as_ref().to_owned();
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        info!("Save config of runner into {}", path_.to_str().unwrap_or("?"));
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_serde_runner_config() -> Result<()> {
        let config = RunnerConfig::default()
            .max_episodes(None)
            .max_timesteps(Some(5000))
            .max_episode_timesteps(Some(200));

        let dir = TempDir::new("runner_config")?;
        let path = dir.path().join("runner_config.yaml");
        config.save(&path)?;
        let config_ = RunnerConfig::load(&path)?;
        assert_eq!(config, config_);
        Ok(())
    }
}
