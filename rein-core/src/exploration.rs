//! Exploration applied to actions in training mode.
use crate::{
    error::{ReinError, Result},
    Action, ActionSpec, ActionValue,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

/// Exploration schedules.
///
/// `Constant`, `LinearDecay` and `ExponentialDecay` give a value `eps(t)` of the
/// agent timestep `t`. Discrete components take a uniformly random action with
/// probability `eps(t)`, continuous components get Gaussian noise with standard
/// deviation `eps(t)`. `GaussianNoise` and `OrnsteinUhlenbeck` only apply to
/// continuous components.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub enum ExplorationConfig {
    /// Fixed value.
    Constant {
        /// Exploration rate.
        epsilon: f32,
    },

    /// Linear interpolation from `initial` to `final_value` over `timesteps`.
    LinearDecay {
        /// Value at timestep 0.
        initial: f32,

        /// Value after `timesteps`.
        final_value: f32,

        /// Length of the decay.
        timesteps: usize,
    },

    /// `final_value + (initial - final_value) * decay^t`.
    ExponentialDecay {
        /// Value at timestep 0.
        initial: f32,

        /// Asymptotic value.
        final_value: f32,

        /// Decay factor per timestep.
        decay: f32,
    },

    /// Independent Gaussian noise.
    GaussianNoise {
        /// Standard deviation.
        sigma: f32,
    },

    /// Temporally correlated noise `x += theta (mu - x) + sigma N(0, 1)`,
    /// restarted at every episode.
    OrnsteinUhlenbeck {
        /// Mean reversion rate.
        theta: f32,

        /// Scale of the increments.
        sigma: f32,

        /// Mean.
        mu: f32,
    },
}

impl Default for ExplorationConfig {
    fn default() -> Self {
        Self::LinearDecay {
            initial: 1.0,
            final_value: 0.02,
            timesteps: 10_000,
        }
    }
}

impl ExplorationConfig {
    /// Value of an epsilon schedule at timestep `t`, `None` for noise processes.
    pub fn epsilon(&self, t: usize) -> Option<f32> {
        match self {
            Self::Constant { epsilon } => Some(*epsilon),
            Self::LinearDecay {
                initial,
                final_value,
                timesteps,
            } => {
                let frac = (t as f32 / (*timesteps).max(1) as f32).min(1.0);
                Some(initial + (final_value - initial) * frac)
            }
            Self::ExponentialDecay {
                initial,
                final_value,
                decay,
            } => Some(final_value + (initial - final_value) * decay.powf(t as f32)),
            _ => None,
        }
    }

    /// Checks the schedule against the action components.
    pub fn check(&self, actions: &[ActionSpec]) -> Result<()> {
        let noise_only = matches!(
            self,
            Self::GaussianNoise { .. } | Self::OrnsteinUhlenbeck { .. }
        );
        if noise_only && actions.iter().any(|a| a.is_discrete()) {
            return Err(ReinError::ConfigError(
                "noise exploration requires continuous action components".to_string(),
            ));
        }
        let invalid = match self {
            Self::Constant { epsilon } => *epsilon < 0.0,
            Self::LinearDecay {
                initial,
                final_value,
                ..
            } => *initial < 0.0 || *final_value < 0.0,
            Self::ExponentialDecay {
                initial,
                final_value,
                decay,
            } => *initial < 0.0 || *final_value < 0.0 || !(0.0..=1.0).contains(decay),
            Self::GaussianNoise { sigma } => *sigma < 0.0,
            Self::OrnsteinUhlenbeck { theta, sigma, .. } => *theta < 0.0 || *sigma < 0.0,
        };
        if invalid {
            return Err(ReinError::ConfigError(format!(
                "invalid exploration parameters: {:?}",
                self
            )));
        }
        Ok(())
    }
}

/// Applies an [`ExplorationConfig`] to actions.
pub struct Exploration {
    config: ExplorationConfig,
    actions: Vec<ActionSpec>,
    ou_state: Vec<Vec<f32>>,
    rng: StdRng,
}

impl Exploration {
    /// Creates the exploration for the given action components.
    pub fn build(config: ExplorationConfig, actions: &[ActionSpec], seed: u64) -> Result<Self> {
        config.check(actions)?;
        let mut exploration = Self {
            config,
            actions: actions.to_vec(),
            ou_state: vec![],
            rng: StdRng::seed_from_u64(seed),
        };
        exploration.reset();
        Ok(exploration)
    }

    /// Restarts the noise process at the beginning of an episode.
    pub fn reset(&mut self) {
        let mu = match self.config {
            ExplorationConfig::OrnsteinUhlenbeck { mu, .. } => mu,
            _ => 0.0,
        };
        self.ou_state = self
            .actions
            .iter()
            .map(|a| match a {
                ActionSpec::Continuous { shape, .. } => vec![mu; *shape],
                ActionSpec::Discrete { .. } => vec![],
            })
            .collect();
    }

    fn gaussian(&mut self, std: f32) -> f32 {
        match Normal::new(0.0, std) {
            Ok(normal) => normal.sample(&mut self.rng),
            Err(_) => 0.0,
        }
    }

    /// Explores around `action` at agent timestep `t`.
    pub fn explore(&mut self, action: Action, t: usize) -> Action {
        let config = self.config.clone();
        let epsilon = config.epsilon(t).unwrap_or(0.0);
        let mut values = Vec::with_capacity(action.0.len());
        for (c, value) in action.0.into_iter().enumerate() {
            let spec = self.actions[c].clone();
            let value = match (spec, value) {
                (ActionSpec::Discrete { num_actions }, ActionValue::Discrete(a)) => {
                    if self.rng.gen::<f32>() < epsilon {
                        ActionValue::Discrete(self.rng.gen_range(0..num_actions))
                    } else {
                        ActionValue::Discrete(a)
                    }
                }
                (spec, value) => {
                    let mut xs = value.as_continuous();
                    for (j, x) in xs.iter_mut().enumerate() {
                        *x += match config {
                            ExplorationConfig::GaussianNoise { sigma } => self.gaussian(sigma),
                            ExplorationConfig::OrnsteinUhlenbeck { theta, sigma, mu } => {
                                let n = self.gaussian(1.0);
                                let state = &mut self.ou_state[c][j];
                                *state += theta * (mu - *state) + sigma * n;
                                *state
                            }
                            _ => self.gaussian(epsilon),
                        };
                        if let Some((lo, hi)) = spec.bounds() {
                            *x = x.max(lo).min(hi);
                        }
                    }
                    ActionValue::Continuous(xs)
                }
            };
            values.push(value);
        }
        Action(values)
    }
}
