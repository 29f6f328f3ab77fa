//! Beta distribution over bounded continuous actions.
use super::Distribution;
use crate::{
    util::{digamma, ln_beta, sigmoid, softplus},
    ActionValue,
};
use rand::rngs::StdRng;
use rand_distr::Distribution as _;

/// Keeps unit-interval values away from the singular endpoints.
const EPS: f64 = 1e-6;

/// Beta distribution scaled to `[min, max]`.
///
/// Raw parameters `[a; b]` are mapped to the concentrations
/// `alpha = softplus(a) + 1` and `beta = softplus(b) + 1`, so the density is unimodal.
#[derive(Clone, Debug)]
pub struct Beta {
    dim: usize,
    min: f32,
    max: f32,
    defaults: Vec<Option<f32>>,
}

impl Beta {
    /// Creates a distribution over `dim`-dimensional vectors in `[min, max]`.
    pub fn new(dim: usize, min: f32, max: f32) -> Self {
        Self {
            dim,
            min,
            max,
            defaults: vec![None; dim],
        }
    }

    /// Fixes dimensions to default values.
    pub fn defaults(mut self, defaults: Vec<Option<f32>>) -> Self {
        debug_assert_eq!(defaults.len(), self.dim);
        self.defaults = defaults;
        self
    }

    fn concentrations(&self, params: &[f32], i: usize) -> (f64, f64) {
        (
            (softplus(params[i]) + 1.0) as f64,
            (softplus(params[self.dim + i]) + 1.0) as f64,
        )
    }

    fn unit(&self, x: f32) -> f64 {
        let u = (x - self.min) as f64 / (self.max - self.min) as f64;
        u.max(EPS).min(1.0 - EPS)
    }

    fn scale(&self, u: f64) -> f32 {
        self.min + (self.max - self.min) * u as f32
    }

    fn learned(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.dim).filter(move |&i| self.defaults[i].is_none())
    }
}

impl Distribution for Beta {
    fn param_len(&self) -> usize {
        2 * self.dim
    }

    fn sample(&self, params: &[f32], rng: &mut StdRng) -> ActionValue {
        let values = (0..self.dim)
            .map(|i| match self.defaults[i] {
                Some(d) => d,
                None => {
                    let (a, b) = self.concentrations(params, i);
                    match rand_distr::Beta::new(a, b) {
                        Ok(dist) => self.scale(dist.sample(rng)),
                        Err(_) => self.scale(a / (a + b)),
                    }
                }
            })
            .collect();
        ActionValue::Continuous(values)
    }

    /// The mean of the distribution.
    fn mode(&self, params: &[f32]) -> ActionValue {
        let values = (0..self.dim)
            .map(|i| match self.defaults[i] {
                Some(d) => d,
                None => {
                    let (a, b) = self.concentrations(params, i);
                    self.scale(a / (a + b))
                }
            })
            .collect();
        ActionValue::Continuous(values)
    }

    fn log_prob(&self, params: &[f32], value: &ActionValue) -> f32 {
        let x = value.as_continuous();
        let log_range = ((self.max - self.min) as f64).ln();
        self.learned()
            .map(|i| {
                let (a, b) = self.concentrations(params, i);
                let u = self.unit(x[i]);
                (a - 1.0) * u.ln() + (b - 1.0) * (1.0 - u).ln() - ln_beta(a, b) - log_range
            })
            .sum::<f64>() as f32
    }

    fn log_prob_grad(&self, params: &[f32], value: &ActionValue) -> Vec<f32> {
        let x = value.as_continuous();
        let mut grad = vec![0.0; 2 * self.dim];
        for i in self.learned() {
            let (a, b) = self.concentrations(params, i);
            let u = self.unit(x[i]);
            let psi_ab = digamma(a + b);
            let da = u.ln() - digamma(a) + psi_ab;
            let db = (1.0 - u).ln() - digamma(b) + psi_ab;
            grad[i] = (da as f32) * sigmoid(params[i]);
            grad[self.dim + i] = (db as f32) * sigmoid(params[self.dim + i]);
        }
        grad
    }

    fn entropy(&self, params: &[f32]) -> f32 {
        let log_range = ((self.max - self.min) as f64).ln();
        self.learned()
            .map(|i| {
                let (a, b) = self.concentrations(params, i);
                ln_beta(a, b) - (a - 1.0) * digamma(a) - (b - 1.0) * digamma(b)
                    + (a + b - 2.0) * digamma(a + b)
                    + log_range
            })
            .sum::<f64>() as f32
    }

    fn kl_divergence(&self, params: &[f32], other: &[f32]) -> f32 {
        self.learned()
            .map(|i| {
                let (ap, bp) = self.concentrations(params, i);
                let (aq, bq) = self.concentrations(other, i);
                ln_beta(aq, bq) - ln_beta(ap, bp)
                    + (ap - aq) * digamma(ap)
                    + (bp - bq) * digamma(bp)
                    + (aq - ap + bq - bp) * digamma(ap + bp)
            })
            .sum::<f64>()
            .max(0.0) as f32
    }
}
