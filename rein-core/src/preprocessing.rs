//! Per-component state preprocessing.
//!
//! Each state component runs through its own stack of preprocessors before the
//! state reaches the network and the memory.
use crate::{
    error::{ReinError, Result},
    State, StateSpec,
};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// A preprocessing step.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub enum PreprocessorConfig {
    /// Multiplies all values by `factor`.
    Scale {
        /// Factor.
        factor: f32,
    },

    /// Clips all values to `[min, max]`.
    Clip {
        /// Lower bound.
        min: f32,

        /// Upper bound.
        max: f32,
    },

    /// Maps the values of each state to `[0, 1]` by their own minimum and maximum.
    Normalize,

    /// Standardizes the values of each state by their own mean and standard deviation.
    Standardize,

    /// Standardizes each value by the running mean and variance of all states seen so far.
    RunningStandardize,

    /// Concatenates the last `length` states, oldest first. The first state of
    /// an episode fills the whole window.
    Sequence {
        /// Number of stacked states.
        length: usize,
    },
}

/// Running moments of Welford's algorithm.
#[derive(Clone, Debug, Default)]
struct RunningMoments {
    count: f64,
    mean: Vec<f64>,
    m2: Vec<f64>,
}

impl RunningMoments {
    fn update(&mut self, xs: &[f32]) {
        if self.mean.len() != xs.len() {
            self.mean = vec![0.0; xs.len()];
            self.m2 = vec![0.0; xs.len()];
            self.count = 0.0;
        }
        self.count += 1.0;
        for (i, &x) in xs.iter().enumerate() {
            let x = x as f64;
            let delta = x - self.mean[i];
            self.mean[i] += delta / self.count;
            self.m2[i] += delta * (x - self.mean[i]);
        }
    }

    fn standardize(&self, xs: &[f32]) -> Vec<f32> {
        xs.iter()
            .enumerate()
            .map(|(i, &x)| {
                let std = if self.count > 1.0 {
                    (self.m2[i] / self.count).sqrt()
                } else {
                    1.0
                };
                ((x as f64 - self.mean[i]) / (std + 1e-8)) as f32
            })
            .collect()
    }
}

enum Preprocessor {
    Scale(f32),
    Clip(f32, f32),
    Normalize,
    Standardize,
    RunningStandardize(RunningMoments),
    Sequence(usize, VecDeque<Vec<f32>>),
}

impl Preprocessor {
    fn build(config: &PreprocessorConfig) -> Result<Self> {
        Ok(match config {
            PreprocessorConfig::Scale { factor } => Self::Scale(*factor),
            PreprocessorConfig::Clip { min, max } if min <= max => Self::Clip(*min, *max),
            PreprocessorConfig::Clip { min, max } => {
                return Err(ReinError::ConfigError(format!(
                    "clip preprocessor requires min <= max, got [{}, {}]",
                    min, max
                )))
            }
            PreprocessorConfig::Normalize => Self::Normalize,
            PreprocessorConfig::Standardize => Self::Standardize,
            PreprocessorConfig::RunningStandardize => {
                Self::RunningStandardize(RunningMoments::default())
            }
            PreprocessorConfig::Sequence { length } if *length > 0 => {
                Self::Sequence(*length, VecDeque::with_capacity(*length))
            }
            PreprocessorConfig::Sequence { .. } => {
                return Err(ReinError::ConfigError(
                    "sequence preprocessor requires a positive length".to_string(),
                ))
            }
        })
    }

    fn output_len(&self, input_len: usize) -> usize {
        match self {
            Self::Sequence(length, _) => length * input_len,
            _ => input_len,
        }
    }

    fn process(&mut self, xs: Vec<f32>) -> Vec<f32> {
        match self {
            Self::Scale(factor) => xs.into_iter().map(|x| x * *factor).collect(),
            Self::Clip(min, max) => xs.into_iter().map(|x| x.max(*min).min(*max)).collect(),
            Self::Normalize => {
                let min = xs.iter().cloned().fold(f32::INFINITY, f32::min);
                let max = xs.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
                let range = (max - min).max(1e-8);
                xs.into_iter().map(|x| (x - min) / range).collect()
            }
            Self::Standardize => crate::baseline::normalize(&xs),
            Self::RunningStandardize(moments) => {
                moments.update(&xs);
                moments.standardize(&xs)
            }
            Self::Sequence(length, window) => {
                if window.is_empty() {
                    window.extend(std::iter::repeat(xs).take(*length));
                } else {
                    window.pop_front();
                    window.push_back(xs);
                }
                window.iter().flatten().cloned().collect()
            }
        }
    }

    fn reset(&mut self) {
        if let Self::Sequence(_, window) = self {
            window.clear();
        }
    }
}

/// Preprocessor stacks of all state components.
#[derive(Default)]
pub struct Preprocessing {
    stacks: Vec<Vec<Preprocessor>>,
    specs: Vec<StateSpec>,
}

impl Preprocessing {
    /// Builds one stack per state component. `None` leaves states unchanged.
    pub fn build(
        configs: Option<&Vec<Vec<PreprocessorConfig>>>,
        states: &[StateSpec],
    ) -> Result<Self> {
        let configs = match configs {
            Some(configs) if configs.len() != states.len() => {
                return Err(ReinError::ConfigError(format!(
                    "{} preprocessor stacks given for {} state components",
                    configs.len(),
                    states.len()
                )))
            }
            Some(configs) => configs.clone(),
            None => vec![vec![]; states.len()],
        };

        let mut stacks = vec![];
        let mut specs = vec![];
        for (stack, spec) in configs.iter().zip(states.iter()) {
            let stack = stack
                .iter()
                .map(Preprocessor::build)
                .collect::<Result<Vec<_>>>()?;
            let len = stack.iter().fold(spec.len(), |len, p| p.output_len(len));
            specs.push(if len == spec.len() {
                spec.clone()
            } else {
                StateSpec::new(vec![len])
            });
            stacks.push(stack);
        }
        Ok(Self { stacks, specs })
    }

    /// Specifications of the preprocessed state components.
    pub fn processed_specs(&self) -> &[StateSpec] {
        &self.specs
    }

    /// Preprocesses a state.
    pub fn process(&mut self, state: State) -> State {
        State(
            state
                .0
                .into_iter()
                .zip(self.stacks.iter_mut())
                .map(|(xs, stack)| stack.iter_mut().fold(xs, |xs, p| p.process(xs)))
                .collect(),
        )
    }

    /// Clears episode-local state such as stacked frames.
    pub fn reset(&mut self) {
        self.stacks.iter_mut().flatten().for_each(|p| p.reset());
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn preprocessing(stack: Vec<PreprocessorConfig>, len: usize) -> Preprocessing {
        Preprocessing::build(Some(&vec![stack]), &[StateSpec::new(vec![len])]).unwrap()
    }

    #[test]
    fn test_scale_and_clip() {
        let mut p = preprocessing(
            vec![
                PreprocessorConfig::Scale { factor: 2.0 },
                PreprocessorConfig::Clip { min: -1.0, max: 1.0 },
            ],
            3,
        );
        let s = p.process(State::single(vec![0.25, 1.0, -3.0]));
        assert_eq!(s, State::single(vec![0.5, 1.0, -1.0]));
    }

    #[test]
    fn test_normalize() {
        let mut p = preprocessing(vec![PreprocessorConfig::Normalize], 3);
        let s = p.process(State::single(vec![2.0, 4.0, 3.0]));
        assert_eq!(s, State::single(vec![0.0, 1.0, 0.5]));
    }

    #[test]
    fn test_sequence_reset_at_episode_start() {
        let mut p = preprocessing(vec![PreprocessorConfig::Sequence { length: 3 }], 1);
        assert_eq!(p.processed_specs()[0].len(), 3);
        assert_eq!(p.process(State::single(vec![1.0])).0[0], vec![1.0, 1.0, 1.0]);
        assert_eq!(p.process(State::single(vec![2.0])).0[0], vec![1.0, 1.0, 2.0]);
        assert_eq!(p.process(State::single(vec![3.0])).0[0], vec![1.0, 2.0, 3.0]);
        assert_eq!(p.process(State::single(vec![4.0])).0[0], vec![2.0, 3.0, 4.0]);
        p.reset();
        assert_eq!(p.process(State::single(vec![5.0])).0[0], vec![5.0, 5.0, 5.0]);
    }

    #[test]
    fn test_running_standardize() {
        let mut p = preprocessing(vec![PreprocessorConfig::RunningStandardize], 1);
        for x in [1.0, 2.0, 3.0, 4.0].iter() {
            p.process(State::single(vec![*x]));
        }
        // Mean 3 and population std sqrt(2) after the fifth value
        let s = p.process(State::single(vec![5.0]));
        assert!((s.0[0][0] - 2.0 / 2f32.sqrt()).abs() < 1e-4);
    }

    #[test]
    fn test_stack_count_mismatch() {
        let result = Preprocessing::build(
            Some(&vec![vec![], vec![]]),
            &[StateSpec::new(vec![2])],
        );
        assert!(matches!(result, Err(ReinError::ConfigError(_))));
    }
}
