//! Baseline fitted by gradient descent on a value network.
use super::{base::mse, Baseline};
use crate::{
    error::{ReinError, Result},
    model::{Optimizer, OptimizerConfig, ParamSet},
    network::Mlp,
    InternalState, Network,
};
use rand::{rngs::StdRng, SeedableRng};

/// Value regression with an [`Mlp`] and squared error.
pub struct NetworkBaseline {
    network: Mlp,
    params: ParamSet,
    optimizer: Optimizer,
    repeat_update: usize,
}

impl NetworkBaseline {
    /// Creates a baseline for inputs of length `input_len`.
    pub fn new(
        input_len: usize,
        hidden: &[usize],
        optimizer: &OptimizerConfig,
        repeat_update: usize,
        seed: u64,
    ) -> Result<Self> {
        let network = Mlp::new(input_len, hidden, 1);
        let params = network.init_params(&mut StdRng::seed_from_u64(seed));
        let optimizer = optimizer.build(network.n_params())?;
        Ok(Self {
            network,
            params,
            optimizer,
            repeat_update: repeat_update.max(1),
        })
    }

    fn value(&self, params: &ParamSet, input: &[f32]) -> Result<f32> {
        let f = self
            .network
            .forward(params, input, &InternalState::default())?;
        Ok(f.output[0])
    }
}

impl Baseline for NetworkBaseline {
    fn predict(&self, inputs: &[Vec<f32>], _timesteps: &[usize]) -> Result<Vec<f32>> {
        inputs.iter().map(|s| self.value(&self.params, s)).collect()
    }

    fn update(
        &mut self,
        inputs: &[Vec<f32>],
        timesteps: &[usize],
        returns: &[f32],
    ) -> Result<f32> {
        let loss = mse(&self.predict(inputs, timesteps)?, returns);
        if inputs.is_empty() {
            return Ok(loss);
        }
        let n = inputs.len() as f32;
        let none = InternalState::default();

        let mut params = self.params.clone();
        for _ in 0..self.repeat_update {
            let mut grad = vec![0.0; params.len()];
            for (s, &y) in inputs.iter().zip(returns.iter()) {
                let g_out = 2.0 * (self.value(&params, s)? - y) / n;
                let g = self.network.backward(&params, s, &none, &[g_out])?;
                crate::util::axpy(&mut grad, 1.0, &g);
            }
            let delta = self.optimizer.step(&params, &grad)?;
            params.add(&delta);
        }

        if !params.is_finite() {
            return Err(ReinError::NumericalInstabilityError(
                "value network parameters are not finite".to_string(),
            ));
        }
        self.params = params;
        Ok(loss)
    }
}
