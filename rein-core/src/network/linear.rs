//! Affine map and the dense layer helpers shared by the other networks.
use crate::{error::Result, model::ParamSet, Forward, InternalState, Network};
use candle_core::{Device, Tensor, Var};
use candle_nn::Module;
use rand::{rngs::StdRng, Rng};

/// Number of parameters of a dense layer.
pub(super) fn dense_len(n_in: usize, n_out: usize) -> usize {
    n_out * n_in + n_out
}

/// Appends parameters of a dense layer, weights uniform in `±1/sqrt(n_in)`
/// and zero biases.
pub(super) fn dense_init(params: &mut Vec<f32>, n_in: usize, n_out: usize, rng: &mut StdRng) {
    let k = 1.0 / (n_in.max(1) as f32).sqrt();
    params.extend((0..n_out * n_in).map(|_| rng.gen_range(-k..k)));
    params.extend(std::iter::repeat(0.0).take(n_out));
}

/// Dense layer whose row-major weights and biases start at `offset` of the
/// flat parameter tensor.
pub(super) fn dense(
    params: &Tensor,
    offset: usize,
    n_in: usize,
    n_out: usize,
) -> candle_core::Result<candle_nn::Linear> {
    let w = params
        .narrow(0, offset, n_out * n_in)?
        .reshape((n_out, n_in))?;
    let b = params.narrow(0, offset + n_out * n_in, n_out)?;
    Ok(candle_nn::Linear::new(w, Some(b)))
}

/// A row vector of shape `(1, len)`.
pub(super) fn row(xs: &[f32]) -> candle_core::Result<Tensor> {
    Tensor::from_slice(xs, (1, xs.len()), &Device::Cpu)
}

/// Flat parameter tensor without gradient tracking.
pub(super) fn constant(params: &ParamSet) -> candle_core::Result<Tensor> {
    Tensor::from_slice(params.as_slice(), params.len(), &Device::Cpu)
}

/// Gradient of `grad_output · f(params)` with respect to the flat parameters.
pub(super) fn vjp(
    params: &ParamSet,
    grad_output: &[f32],
    f: impl FnOnce(&Tensor) -> candle_core::Result<Tensor>,
) -> Result<Vec<f32>> {
    let var = Var::from_slice(params.as_slice(), params.len(), &Device::Cpu)?;
    let output = f(var.as_tensor())?.flatten_all()?;
    let g = Tensor::from_slice(grad_output, grad_output.len(), &Device::Cpu)?;
    let grads = output.mul(&g)?.sum_all()?.backward()?;
    match grads.get(var.as_tensor()) {
        Some(grad) => Ok(grad.to_vec1::<f32>()?),
        None => Ok(vec![0.0; params.len()]),
    }
}

/// A single affine layer `W x + b`.
#[derive(Clone, Debug)]
pub struct Linear {
    n_in: usize,
    n_out: usize,
}

impl Linear {
    /// Creates an affine map from `n_in` to `n_out` values.
    pub fn new(n_in: usize, n_out: usize) -> Self {
        Self { n_in, n_out }
    }

    fn apply(&self, params: &Tensor, input: &[f32]) -> candle_core::Result<Tensor> {
        dense(params, 0, self.n_in, self.n_out)?.forward(&row(input)?)
    }
}

impl Network for Linear {
    fn input_len(&self) -> usize {
        self.n_in
    }

    fn output_len(&self) -> usize {
        self.n_out
    }

    fn n_params(&self) -> usize {
        dense_len(self.n_in, self.n_out)
    }

    fn init_params(&self, rng: &mut StdRng) -> ParamSet {
        let mut params = Vec::with_capacity(self.n_params());
        dense_init(&mut params, self.n_in, self.n_out, rng);
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
