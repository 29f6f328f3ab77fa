//! Multilayer perceptron.
use super::linear::{constant, dense, dense_init, dense_len, row, vjp};
use crate::{error::Result, model::ParamSet, Forward, InternalState, Network};
use candle_core::Tensor;
use candle_nn::Module;
use rand::rngs::StdRng;

/// Dense network with tanh hidden layers and a linear output layer.
///
/// ```rust
/// use rein_core::{network::Mlp, InternalState, Network};
/// use rand::{rngs::StdRng, SeedableRng};
///
/// let mlp = Mlp::new(4, &[16, 16], 2);
/// let params = mlp.init_params(&mut StdRng::seed_from_u64(0));
/// let out = mlp.forward(&params, &[0.0; 4], &InternalState::default()).unwrap();
/// assert_eq!(out.output.len(), 2);
/// ```
#[derive(Clone, Debug)]
pub struct Mlp {
    sizes: Vec<usize>,
}

impl Mlp {
    /// Creates a network with the given hidden layer sizes.
    pub fn new(n_in: usize, hidden: &[usize], n_out: usize) -> Self {
        let mut sizes = vec![n_in];
        sizes.extend_from_slice(hidden);
        sizes.push(n_out);
        Self { sizes }
    }

    fn n_layers(&self) -> usize {
        self.sizes.len() - 1
    }

    fn apply(&self, params: &Tensor, input: &[f32]) -> candle_core::Result<Tensor> {
        let mut xs = row(input)?;
        let mut offset = 0;
        for (l, w) in self.sizes.windows(2).enumerate() {
            xs = dense(params, offset, w[0], w[1])?.forward(&xs)?;
            if l + 1 < self.n_layers() {
                xs = xs.tanh()?;
            }
            offset += dense_len(w[0], w[1]);
        }
        Ok(xs)
    }
}

impl Network for Mlp {
    fn input_len(&self) -> usize {
        self.sizes[0]
    }

    fn output_len(&self) -> usize {
        self.sizes[self.n_layers()]
    }

    fn n_params(&self) -> usize {
        self.sizes.windows(2).map(|w| dense_len(w[0], w[1])).sum()
    }

    fn init_params(&self, rng: &mut StdRng) -> ParamSet {
        let mut params = Vec::with_capacity(self.n_params());
        for w in self.sizes.windows(2) {
            dense_init(&mut params, w[0], w[1], rng);
        }
        ParamSet::new(params)
    }

    fn forward(
        &self,
        params: &ParamSet,
        input: &[f32],
        internal: &InternalState,
    ) -> Result<Forward> {
        let output = self.apply(&constant(params)?, input)?.flatten_all()?;
        Ok(Forward {
            output: output.to_vec1::<f32>()?,
            next_internal: internal.clone(),
        })
    }

    fn backward(
        &self,
        params: &ParamSet,
        input: &[f32],
        _internal: &InternalState,
        grad_output: &[f32],
    ) -> Result<Vec<f32>> {
        vjp(params, grad_output, |p| self.apply(p, input))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_backward_matches_finite_differences() -> Result<()> {
        let mlp = Mlp::new(3, &[5, 4], 2);
        let params = mlp.init_params(&mut StdRng::seed_from_u64(42));
        let input = [0.3, -0.7, 1.2];
        let g_out = [1.0, -0.5];
        let none = InternalState::default();
        let grad = mlp.backward(&params, &input, &none, &g_out)?;
        assert_eq!(grad.len(), mlp.n_params());

        let f = |p: &ParamSet| -> Result<f32> {
            let y = mlp.forward(p, &input, &none)?.output;
            Ok(y[0] * g_out[0] + y[1] * g_out[1])
        };
        for i in (0..mlp.n_params()).step_by(3) {
            let mut plus = params.clone();
            let mut minus = params.clone();
            plus.as_mut_slice()[i] += 1e-2;
            minus.as_mut_slice()[i] -= 1e-2;
            let fd = (f(&plus)? - f(&minus)?) / 2e-2;
            assert!((fd - grad[i]).abs() < 1e-3, "i={} fd={} grad={}", i, fd, grad[i]);
        }
        Ok(())
    }
}
