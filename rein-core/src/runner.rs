//! Synchronous interaction loop of an agent and an environment.
mod config;
use crate::{
    record::{Record, RecordValue, Recorder},
    Agent, Env,
};
use anyhow::{bail, Result};
pub use config::RunnerConfig;
use log::{debug, info};

/// Statistics of a [`Runner::run`] call.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunnerStat {
    /// Number of completed episodes, truncated ones included.
    pub episodes: usize,

    /// Number of environment steps.
    pub timesteps: usize,

    /// Return of each completed episode.
    pub returns: Vec<f32>,

    /// Number of model updates reported by the agent.
    pub updates: usize,
}

impl RunnerStat {
    /// Mean return of the last `n` episodes.
    pub fn mean_return(&self, n: usize) -> Option<f32> {
        let n = n.min(self.returns.len());
        if n == 0 {
            return None;
        }
        let last = &self.returns[self.returns.len() - n..];
        Some(last.iter().sum::<f32>() / n as f32)
    }
}

/// Drives an [`Env`] and an [`Agent`] in a single thread.
///
/// Act, observe and updates run strictly in sequence. A truncated episode is
/// observed with a terminal flag on its last step. Each finished episode writes
/// a record with `episode`, `episode_return` and `episode_length`, each update
/// the record returned by the agent with `timestep` added.
pub struct Runner {
    config: RunnerConfig,
}

impl Runner {
    /// Constructs a runner.
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    fn is_finished(&self, stat: &RunnerStat) -> bool {
        self.config.max_episodes.map_or(false, |n| stat.episodes >= n)
            || self.config.max_timesteps.map_or(false, |n| stat.timesteps >= n)
    }

    /// Runs episodes until one of the limits is reached.
    pub fn run<E, A>(
        &self,
        env: &mut E,
        agent: &mut A,
        recorder: &mut dyn Recorder,
    ) -> Result<RunnerStat>
    where
        E: Env + ?Sized,
        A: Agent + ?Sized,
    {
        if self.config.max_episodes.is_none() && self.config.max_timesteps.is_none() {
            bail!("runner requires max_episodes or max_timesteps");
        }

        let mut stat = RunnerStat::default();
        while !self.is_finished(&stat) {
            let mut state = env.reset()?;
            agent.reset();
            let mut episode_return = 0.0;
            let mut episode_length = 0;

            loop {
                let action = agent.act(&state)?;
                let step = env.step(&action)?;
                episode_return += step.reward;
                episode_length += 1;
                stat.timesteps += 1;

                let truncated = self
                    .config
                    .max_episode_timesteps
                    .map_or(false, |n| episode_length >= n);
                let terminal = step.terminal || truncated;
                if let Some(record) = agent.observe(step.reward, terminal)? {
                    stat.updates += 1;
                    recorder.write(record.merge(Record::from_scalar(
                        "timestep",
                        stat.timesteps as f32,
                    )));
                }
                state = step.state;

                if terminal {
                    stat.episodes += 1;
                    stat.returns.push(episode_return);
                    debug!(
                        "Episode {}: return {}, length {}",
                        stat.episodes, episode_return, episode_length
                    );
                    recorder.write(Record::from_slice(&[
                        ("episode", RecordValue::Scalar(stat.episodes as f32)),
                        ("episode_return", RecordValue::Scalar(episode_return)),
                        ("episode_length", RecordValue::Scalar(episode_length as f32)),
                    ]));
                    break;
                }
                if self.is_finished(&stat) {
                    break;
                }
            }
        }

        info!(
            "Finished {} episodes in {} timesteps with {} updates",
            stat.episodes, stat.timesteps, stat.updates
        );
        Ok(stat)
    }

    /// Runs `n_episodes` episodes in evaluation mode and returns the mean return.
    ///
    /// The agent is switched back to its previous mode afterwards.
    pub fn evaluate<E, A>(&self, env: &mut E, agent: &mut A, n_episodes: usize) -> Result<f32>
    where
        E: Env + ?Sized,
        A: Agent + ?Sized,
    {
        let was_train = agent.is_train();
        agent.eval();
        let mut r_total = 0.0;
        for _ in 0..n_episodes {
            let mut state = env.reset()?;
            agent.reset();
            let mut t = 0;
            loop {
                let step = env.step(&agent.act(&state)?)?;
                r_total += step.reward;
                t += 1;
                let truncated = self.config.max_episode_timesteps.map_or(false, |n| t >= n);
                agent.observe(step.reward, step.terminal || truncated)?;
                if step.terminal || truncated {
                    break;
                }
                state = step.state;
            }
        }
        if was_train {
            agent.train();
        }
        Ok(r_total / n_episodes.max(1) as f32)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        agent::RandomAgent,
        dummy::ClockEnv,
        record::{BufferedRecorder, NullRecorder},
    };

    #[test]
    fn test_episode_limit() -> Result<()> {
        let mut env = ClockEnv::new(5);
        let mut agent = RandomAgent::new(env.spec(), 0);
        let mut recorder = BufferedRecorder::new();
        let runner = Runner::new(RunnerConfig::default().max_episodes(Some(3)));
        let stat = runner.run(&mut env, &mut agent, &mut recorder)?;

        assert_eq!(stat.episodes, 3);
        assert_eq!(stat.timesteps, 15);
        assert_eq!(stat.returns, vec![5.0; 3]);
        assert_eq!(recorder.scalars("episode_length"), vec![5.0; 3]);
        assert_eq!(stat.mean_return(2), Some(5.0));
        Ok(())
    }

    #[test]
    fn test_timestep_limit_and_truncation() -> Result<()> {
        let mut env = ClockEnv::new(100);
        let mut agent = RandomAgent::new(env.spec(), 0);
        let mut recorder = NullRecorder::new();
        let config = RunnerConfig::default()
            .max_episodes(None)
            .max_timesteps(Some(25))
            .max_episode_timesteps(Some(10));
        let stat = Runner::new(config).run(&mut env, &mut agent, &mut recorder)?;

        assert_eq!(stat.timesteps, 25);
        assert_eq!(stat.episodes, 2);
        assert_eq!(agent.timestep(), 25);
        assert_eq!(agent.episode(), 2);
        Ok(())
    }

    #[test]
    fn test_evaluate_restores_mode() -> Result<()> {
        let mut env = ClockEnv::new(4);
        let mut agent = RandomAgent::new(env.spec(), 0);
        let runner = Runner::new(RunnerConfig::default());
        assert_eq!(runner.evaluate(&mut env, &mut agent, 3)?, 4.0);
        assert!(agent.is_train());
        Ok(())
    }

    #[test]
    fn test_no_limit() {
        let mut env = ClockEnv::new(4);
        let mut agent = RandomAgent::new(env.spec(), 0);
        let runner = Runner::new(RunnerConfig::default().max_episodes(None));
        assert!(runner
            .run(&mut env, &mut agent, &mut NullRecorder::new())
            .is_err());
    }
}
