//! State and action specifications declared by environments.
use super::ActionValue;
use crate::error::{ReinError, Result};
use serde::{Deserialize, Serialize};

/// Specification of a state component.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct StateSpec {
    /// Shape of the component. Values are stored flattened in row-major order.
    pub shape: Vec<usize>,
}

impl StateSpec {
    /// A state component with the given shape.
    pub fn new(shape: impl Into<Vec<usize>>) -> Self {
        Self {
            shape: shape.into(),
        }
    }

    /// Number of scalar values in the component.
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    /// Returns `true` if the component holds no values.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Checks that `values` is a value of this component.
    pub fn check_values(&self, values: &[f32]) -> Result<()> {
        if values.len() != self.len() {
            return Err(ReinError::ConfigError(format!(
                "state component of shape {:?} has {} values, got {}",
                self.shape,
                self.len(),
                values.len()
            )));
        }
        Ok(())
    }
}

/// Specification of an action component.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub enum ActionSpec {
    /// One of `num_actions` choices.
    Discrete {
        /// Number of choices.
        num_actions: usize,
    },

    /// A real vector of length `shape`, optionally bounded elementwise.
    Continuous {
        /// Number of dimensions.
        shape: usize,

        /// Lower bound, given together with `max_value`.
        min_value: Option<f32>,

        /// Upper bound, given together with `min_value`.
        max_value: Option<f32>,
    },
}

impl ActionSpec {
    /// A discrete action component.
    pub fn discrete(num_actions: usize) -> Self {
        Self::Discrete { num_actions }
    }

    /// An unbounded continuous action component.
    pub fn continuous(shape: usize) -> Self {
        Self::Continuous {
            shape,
            min_value: None,
            max_value: None,
        }
    }

    /// A bounded continuous action component.
    pub fn bounded(shape: usize, min_value: f32, max_value: f32) -> Self {
        Self::Continuous {
            shape,
            min_value: Some(min_value),
            max_value: Some(max_value),
        }
    }

    /// Returns `true` for discrete components.
    pub fn is_discrete(&self) -> bool {
        matches!(self, Self::Discrete { .. })
    }

    /// Bounds of a continuous component, if any.
    pub fn bounds(&self) -> Option<(f32, f32)> {
        match self {
            Self::Continuous {
                min_value: Some(min),
                max_value: Some(max),
                ..
            } => Some((*min, *max)),
            _ => None,
        }
    }

    /// Checks that `value` is an action of this component.
    pub fn check_value(&self, value: &ActionValue) -> Result<()> {
        match (self, value) {
            (Self::Discrete { num_actions }, ActionValue::Discrete(a)) if a < num_actions => Ok(()),
            (Self::Continuous { shape, .. }, ActionValue::Continuous(v))
                if v.len() == *shape && v.iter().all(|x| x.is_finite()) =>
            {
                Ok(())
            }
            _ => Err(ReinError::ConfigError(format!(
                "action {:?} does not match {:?}",
                value, self
            ))),
        }
    }

    /// Checks that the specification is well formed.
    pub fn check(&self) -> Result<()> {
        match self {
            Self::Discrete { num_actions } if *num_actions == 0 => Err(ReinError::ConfigError(
                "discrete action with zero choices".to_string(),
            )),
            Self::Continuous { shape, .. } if *shape == 0 => Err(ReinError::ConfigError(
                "continuous action with zero dimensions".to_string(),
            )),
            Self::Continuous {
                min_value,
                max_value,
                ..
            } => match (min_value, max_value) {
                (Some(min), Some(max)) if min >= max => Err(ReinError::ConfigError(format!(
                    "action bounds must satisfy min < max, got [{}, {}]",
                    min, max
                ))),
                (Some(_), None) | (None, Some(_)) => Err(ReinError::ConfigError(
                    "action bounds must be given as a pair".to_string(),
                )),
                _ => Ok(()),
            },
            _ => Ok(()),
        }
    }
}

/// States and actions an environment works with.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct EnvSpec {
    /// State components.
    pub states: Vec<StateSpec>,

    /// Action components.
    pub actions: Vec<ActionSpec>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_check_action_values() {
        let discrete = ActionSpec::discrete(2);
        assert!(discrete.check_value(&ActionValue::Discrete(1)).is_ok());
        assert!(discrete.check_value(&ActionValue::Discrete(2)).is_err());
        assert!(discrete.check_value(&ActionValue::Continuous(vec![0.0])).is_err());

        let continuous = ActionSpec::bounded(2, -1.0, 1.0);
        assert!(continuous.check_value(&ActionValue::Continuous(vec![0.5, 3.0])).is_ok());
        assert!(continuous.check_value(&ActionValue::Continuous(vec![0.5])).is_err());
        assert!(continuous.check_value(&ActionValue::Continuous(vec![0.5, f32::NAN])).is_err());
        assert!(continuous.check_value(&ActionValue::Discrete(0)).is_err());
    }

    #[test]
    fn test_check_state_values() {
        let spec = StateSpec::new(vec![2, 3]);
        assert!(spec.check_values(&[0.0; 6]).is_ok());
        assert!(spec.check_values(&[0.0; 5]).is_err());
    }
}
