//! Elman recurrent network.
use super::linear::{constant, dense, dense_init, dense_len, row, vjp};
use crate::{error::Result, model::ParamSet, Forward, InternalState, Network};
use candle_core::Tensor;
use candle_nn::Module;
use rand::rngs::StdRng;

/// Elman cell `h' = tanh(W [x; h] + b)` with a linear read-out `y = V h' + c`.
///
/// The internal state is the hidden vector `h`. Gradients are truncated at the
/// incoming hidden state.
#[derive(Clone, Debug)]
pub struct Recurrent {
    n_in: usize,
    n_hidden: usize,
    n_out: usize,
}

impl Recurrent {
    /// Creates a cell with `n_hidden` hidden units.
    pub fn new(n_in: usize, n_hidden: usize, n_out: usize) -> Self {
        Self {
            n_in,
            n_hidden,
            n_out,
        }
    }

    fn cell_len(&self) -> usize {
        dense_len(self.n_in + self.n_hidden, self.n_hidden)
    }

    fn cell_input(&self, input: &[f32], internal: &InternalState) -> Vec<f32> {
        let mut x = input.to_vec();
        if internal.is_empty() {
            x.extend(std::iter::repeat(0.0).take(self.n_hidden));
        } else {
            x.extend_from_slice(internal.as_slice());
        }
        x
    }

    /// Output and next hidden state.
    fn apply(
        &self,
        params: &Tensor,
        input: &[f32],
        internal: &InternalState,
    ) -> candle_core::Result<(Tensor, Tensor)> {
        let x = row(&self.cell_input(input, internal))?;
        let h = dense(params, 0, self.n_in + self.n_hidden, self.n_hidden)?
            .forward(&x)?
            .tanh()?;
        let y = dense(params, self.cell_len(), self.n_hidden, self.n_out)?.forward(&h)?;
        Ok((y, h))
    }
}

impl Network for Recurrent {
    fn input_len(&self) -> usize {
        self.n_in
    }

    fn output_len(&self) -> usize {
        self.n_out
    }

    fn internal_len(&self) -> usize {
        self.n_hidden
    }

    fn n_params(&self) -> usize {
        self.cell_len() + dense_len(self.n_hidden, self.n_out)
    }

    fn init_params(&self, rng: &mut StdRng) -> ParamSet {
        let mut params = Vec::with_capacity(self.n_params());
        dense_init(&mut params, self.n_in + self.n_hidden, self.n_hidden, rng);
        dense_init(&mut params, self.n_hidden, self.n_out, rng);
        ParamSet::new(params)
    }

    fn forward(
        &self,
        params: &ParamSet,
        input: &[f32],
        internal: &InternalState,
    ) -> Result<Forward> {
        let (y, h) = self.apply(&constant(params)?, input, internal)?;
        Ok(Forward {
            output: y.flatten_all()?.to_vec1::<f32>()?,
            next_internal: InternalState(h.flatten_all()?.to_vec1::<f32>()?),
        })
    }

    fn backward(
        &self,
        params: &ParamSet,
        input: &[f32],
        internal: &InternalState,
        grad_output: &[f32],
    ) -> Result<Vec<f32>> {
        vjp(params, grad_output, |p| Ok(self.apply(p, input, internal)?.0))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_internal_state_is_threaded() -> Result<()> {
        let net = Recurrent::new(2, 3, 1);
        let params = net.init_params(&mut StdRng::seed_from_u64(0));
        let h0 = net.initial_internal();
        assert_eq!(h0.as_slice(), &[0.0; 3]);

        let step1 = net.forward(&params, &[1.0, 0.0], &h0)?;
        assert_eq!(step1.next_internal.as_slice().len(), 3);
        let again = net.forward(&params, &[1.0, 0.0], &step1.next_internal)?;
        let fresh = net.forward(&params, &[1.0, 0.0], &h0)?;
        assert_eq!(fresh, step1);
        assert_ne!(again.next_internal, step1.next_internal);
        Ok(())
    }

    #[test]
    fn test_backward_matches_finite_differences() -> Result<()> {
        let net = Recurrent::new(2, 3, 2);
        let params = net.init_params(&mut StdRng::seed_from_u64(5));
        let h = InternalState(vec![0.1, -0.4, 0.6]);
        let input = [0.5, -1.0];
        let g_out = [0.7, 1.3];
        let grad = net.backward(&params, &input, &h, &g_out)?;

        let f = |p: &ParamSet| -> Result<f32> {
            let y = net.forward(p, &input, &h)?.output;
            Ok(y[0] * g_out[0] + y[1] * g_out[1])
        };
        for i in 0..net.n_params() {
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
