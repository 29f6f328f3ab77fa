//! Small deterministic environments used in tests and documentation.
use crate::{Action, ActionSpec, Env, EnvSpec, State, StateSpec, Step};
use anyhow::{bail, Result};

/// Episodes of a fixed number of steps.
///
/// The state is the step counter and every step gives reward `1`.
pub struct ClockEnv {
    episode_length: usize,
    t: usize,
}

impl ClockEnv {
    /// Creates an environment with episodes of `episode_length` steps.
    pub fn new(episode_length: usize) -> Self {
        Self { episode_length, t: 0 }
    }
}

impl Env for ClockEnv {
    fn spec(&self) -> EnvSpec {
        EnvSpec {
            states: vec![StateSpec::new(vec![1])],
            actions: vec![ActionSpec::discrete(2)],
        }
    }

    fn reset(&mut self) -> Result<State> {
        self.t = 0;
        Ok(State::single(vec![0.0]))
    }

    fn step(&mut self, _action: &Action) -> Result<Step> {
        self.t += 1;
        Ok(Step::new(
            State::single(vec![self.t as f32]),
            1.0,
            self.t >= self.episode_length,
        ))
    }
}

/// A walk on a chain of `length` cells.
///
/// The state is the one-hot encoded position. Action `1` moves right and `0`
/// moves left. Reaching the last cell ends the episode with reward `1`, other
/// steps cost `0.01`.
pub struct ChainEnv {
    length: usize,
    position: usize,
}

impl ChainEnv {
    /// Creates a chain with `length` cells, starting in the first one.
    pub fn new(length: usize) -> Self {
        Self {
            length: length.max(2),
            position: 0,
        }
    }

    fn state(&self) -> State {
        let mut xs = vec![0.0; self.length];
        xs[self.position] = 1.0;
        State::single(xs)
    }
}

impl Env for ChainEnv {
    fn spec(&self) -> EnvSpec {
        EnvSpec {
            states: vec![StateSpec::new(vec![self.length])],
            actions: vec![ActionSpec::discrete(2)],
        }
    }

    fn reset(&mut self) -> Result<State> {
        self.position = 0;
        Ok(self.state())
    }

    fn step(&mut self, action: &Action) -> Result<Step> {
        match action.0.first().map(|a| a.as_discrete()) {
            Some(0) => self.position = self.position.saturating_sub(1),
            Some(1) => self.position += 1,
            a => bail!("invalid action for ChainEnv: {:?}", a),
        }
        let terminal = self.position == self.length - 1;
        let reward = if terminal { 1.0 } else { -0.01 };
        Ok(Step::new(self.state(), reward, terminal))
    }
}

/// Moves a point on a line towards the origin.
///
/// The state is the position, the action a displacement in `[-0.2, 0.2]` and
/// the reward the negative distance to the origin after the move. The episode
/// ends when the point is within `0.05` of the origin.
pub struct PointEnv {
    start: f32,
    x: f32,
}

impl PointEnv {
    /// Creates the environment with episodes starting at `start`.
    pub fn new(start: f32) -> Self {
        Self { start, x: start }
    }
}

impl Env for PointEnv {
    fn spec(&self) -> EnvSpec {
        EnvSpec {
            states: vec![StateSpec::new(vec![1])],
            actions: vec![ActionSpec::bounded(1, -0.2, 0.2)],
        }
    }

    fn reset(&mut self) -> Result<State> {
        self.x = self.start;
        Ok(State::single(vec![self.x]))
    }

    fn step(&mut self, action: &Action) -> Result<Step> {
        let dx = match action.0.first() {
            Some(a) => a.as_continuous().first().cloned().unwrap_or(0.0),
            None => bail!("empty action for PointEnv"),
        };
        self.x += dx.max(-0.2).min(0.2);
        let distance = self.x.abs();
        Ok(Step::new(
            State::single(vec![self.x]),
            -distance,
            distance < 0.05,
        ))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_chain_env() -> Result<()> {
        let mut env = ChainEnv::new(3);
        env.reset()?;
        let step = env.step(&Action::discrete(0))?;
        assert_eq!(step.state, State::single(vec![1.0, 0.0, 0.0]));
        env.step(&Action::discrete(1))?;
        let step = env.step(&Action::discrete(1))?;
        assert!(step.terminal);
        assert_eq!(step.reward, 1.0);
        assert!(env.step(&Action::discrete(2)).is_err());
        Ok(())
    }

    #[test]
    fn test_point_env() -> Result<()> {
        let mut env = PointEnv::new(0.3);
        env.reset()?;
        let step = env.step(&Action::continuous(vec![-1.0]))?;
        assert!((step.reward + 0.1).abs() < 1e-6);
        assert!(!step.terminal);
        let step = env.step(&Action::continuous(vec![-0.1]))?;
        assert!(step.terminal);
        Ok(())
    }
}
