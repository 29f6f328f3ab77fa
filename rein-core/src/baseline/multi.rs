//! One baseline per state component.
use super::{Baseline, BaselineConfig, LinearBaseline, NetworkBaseline};
use crate::{error::Result, State};

/// Combines independent estimators of the state components.
///
/// The prediction is the arithmetic mean of the component predictions, each
/// component being fitted to the same returns.
pub struct MultiBaseline {
    components: Vec<Box<dyn Baseline>>,
}

impl MultiBaseline {
    /// Creates a baseline from component estimators in state component order.
    pub fn new(components: Vec<Box<dyn Baseline>>) -> Self {
        Self { components }
    }

    /// Creates one estimator per state component of the given lengths.
    pub fn build(config: &BaselineConfig, component_lens: &[usize], seed: u64) -> Result<Self> {
        let components = component_lens
            .iter()
            .enumerate()
            .map(|(i, &len)| -> Result<Box<dyn Baseline>> {
                Ok(match config {
                    BaselineConfig::Linear => Box::new(LinearBaseline::new()),
                    BaselineConfig::Network {
                        hidden,
                        optimizer,
                        repeat_update,
                    } => Box::new(NetworkBaseline::new(
                        len,
                        hidden,
                        optimizer,
                        *repeat_update,
                        seed + i as u64,
                    )?),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { components })
    }

    fn component_inputs(states: &[State], i: usize) -> Vec<Vec<f32>> {
        states.iter().map(|s| s.components()[i].clone()).collect()
    }

    /// Mean of the component predictions.
    pub fn predict(&self, states: &[State], timesteps: &[usize]) -> Result<Vec<f32>> {
        let mut values = vec![0.0; states.len()];
        if self.components.is_empty() {
            return Ok(values);
        }
        for (i, c) in self.components.iter().enumerate() {
            let v = c.predict(&Self::component_inputs(states, i), timesteps)?;
            crate::util::axpy(&mut values, 1.0, &v);
        }
        let n = self.components.len() as f32;
        values.iter_mut().for_each(|v| *v /= n);
        Ok(values)
    }

    /// Fits every component and returns the mean loss.
    pub fn update(&mut self, states: &[State], timesteps: &[usize], returns: &[f32]) -> Result<f32> {
        let mut loss = 0.0;
        for (i, c) in self.components.iter_mut().enumerate() {
            loss += c.update(&Self::component_inputs(states, i), timesteps, returns)?;
        }
        Ok(loss / self.components.len().max(1) as f32)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    struct Constant(f32);

    impl Baseline for Constant {
        fn predict(&self, inputs: &[Vec<f32>], _timesteps: &[usize]) -> Result<Vec<f32>> {
            Ok(vec![self.0; inputs.len()])
        }

        fn update(&mut self, _: &[Vec<f32>], _: &[usize], _: &[f32]) -> Result<f32> {
            Ok(0.0)
        }
    }

    #[test]
    fn test_prediction_is_mean_of_components() -> Result<()> {
        let b = MultiBaseline::new(vec![Box::new(Constant(1.0)), Box::new(Constant(4.0))]);
        let states = vec![State(vec![vec![0.0], vec![0.0, 1.0]]); 3];
        assert_eq!(b.predict(&states, &[0, 1, 2])?, vec![2.5; 3]);
        Ok(())
    }

    #[test]
    fn test_build_one_estimator_per_component() {
        let mut b = MultiBaseline::build(&BaselineConfig::Linear, &[1, 2], 0).unwrap();
        let states = (0..20)
            .map(|i| State(vec![vec![i as f32], vec![1.0, -(i as f32)]]))
            .collect::<Vec<_>>();
        let timesteps = (0..20).collect::<Vec<_>>();
        let returns = (0..20).map(|i| i as f32).collect::<Vec<_>>();
        b.update(&states, &timesteps, &returns).unwrap();
        let v = b.predict(&states, &timesteps).unwrap();
        assert!((v[10] - 10.0).abs() < 1.0);
    }
}
