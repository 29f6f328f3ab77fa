//! Diagonal Gaussian distribution over continuous actions.
use super::Distribution;
use crate::ActionValue;
use rand::rngs::StdRng;
use rand_distr::{Distribution as _, StandardNormal};
use std::f32::consts::PI;

const LOG_STD_MIN: f32 = -20.0;
const LOG_STD_MAX: f32 = 2.0;

/// Diagonal Gaussian parametrized by `[mean; log_std]`.
///
/// The log standard deviation is clamped to `[-20, 2]`; the clamp has zero
/// gradient outside of that range. Samples are clipped to the bounds if given.
#[derive(Clone, Debug)]
pub struct Gaussian {
    dim: usize,
    bounds: Option<(f32, f32)>,
    defaults: Vec<Option<f32>>,
}

impl Gaussian {
    /// Creates a distribution over `dim`-dimensional vectors.
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            bounds: None,
            defaults: vec![None; dim],
        }
    }

    /// Sets the bounds of the action values.
    pub fn bounds(mut self, bounds: Option<(f32, f32)>) -> Self {
        self.bounds = bounds;
        self
    }

    /// Fixes dimensions to default values.
    pub fn defaults(mut self, defaults: Vec<Option<f32>>) -> Self {
        debug_assert_eq!(defaults.len(), self.dim);
        self.defaults = defaults;
        self
    }

    fn clip(&self, x: f32) -> f32 {
        match self.bounds {
            Some((lo, hi)) => x.max(lo).min(hi),
            None => x,
        }
    }

    /// Mean and clamped log standard deviation of dimension `i`.
    fn moments(&self, params: &[f32], i: usize) -> (f32, f32) {
        let log_std = params[self.dim + i].max(LOG_STD_MIN).min(LOG_STD_MAX);
        (params[i], log_std)
    }

    fn learned(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.dim).filter(move |&i| self.defaults[i].is_none())
    }
}

impl Distribution for Gaussian {
    fn param_len(&self) -> usize {
        2 * self.dim
    }

    fn sample(&self, params: &[f32], rng: &mut StdRng) -> ActionValue {
        let values = (0..self.dim)
            .map(|i| match self.defaults[i] {
                Some(d) => d,
                None => {
                    let (mean, log_std) = self.moments(params, i);
                    let z: f32 = StandardNormal.sample(rng);
                    self.clip(mean + log_std.exp() * z)
                }
            })
            .collect();
        ActionValue::Continuous(values)
    }

    fn mode(&self, params: &[f32]) -> ActionValue {
        let values = (0..self.dim)
            .map(|i| match self.defaults[i] {
                Some(d) => d,
                None => self.clip(params[i]),
            })
            .collect();
        ActionValue::Continuous(values)
    }

    fn log_prob(&self, params: &[f32], value: &ActionValue) -> f32 {
        let a = value.as_continuous();
        self.learned()
            .map(|i| {
                let (mean, log_std) = self.moments(params, i);
                let z = (a[i] - mean) / log_std.exp();
                -0.5 * z * z - log_std - 0.5 * (2.0 * PI).ln()
            })
            .sum()
    }

    fn log_prob_grad(&self, params: &[f32], value: &ActionValue) -> Vec<f32> {
        let a = value.as_continuous();
        let mut grad = vec![0.0; 2 * self.dim];
        for i in self.learned() {
            let (mean, log_std) = self.moments(params, i);
            let var = (2.0 * log_std).exp();
            let diff = a[i] - mean;
            grad[i] = diff / var;
            let raw = params[self.dim + i];
            if (LOG_STD_MIN..=LOG_STD_MAX).contains(&raw) {
                grad[self.dim + i] = diff * diff / var - 1.0;
            }
        }
        grad
    }

    fn entropy(&self, params: &[f32]) -> f32 {
        self.learned()
            .map(|i| self.moments(params, i).1 + 0.5 * (1.0 + (2.0 * PI).ln()))
            .sum()
    }

    fn kl_divergence(&self, params: &[f32], other: &[f32]) -> f32 {
        self.learned()
            .map(|i| {
                let (mp, lp) = self.moments(params, i);
                let (mq, lq) = self.moments(other, i);
                let (vp, vq) = ((2.0 * lp).exp(), (2.0 * lq).exp());
                lq - lp + (vp + (mp - mq).powi(2)) / (2.0 * vq) - 0.5
            })
            .sum::<f32>()
            .max(0.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_log_prob_of_standard_normal() {
        let dist = Gaussian::new(1);
        let lp = dist.log_prob(&[0.0, 0.0], &ActionValue::Continuous(vec![0.0]));
        assert!((lp + 0.5 * (2.0 * PI).ln()).abs() < 1e-6);
    }

    #[test]
    fn test_log_prob_grad_matches_finite_differences() {
        let dist = Gaussian::new(2);
        let params = vec![0.2f32, -0.4, -0.3, 0.5];
        let a = ActionValue::Continuous(vec![0.7, -1.1]);
        let grad = dist.log_prob_grad(&params, &a);
        for i in 0..4 {
            let mut plus = params.clone();
            let mut minus = params.clone();
            plus[i] += 1e-2;
            minus[i] -= 1e-2;
            let fd = (dist.log_prob(&plus, &a) - dist.log_prob(&minus, &a)) / 2e-2;
            assert!((fd - grad[i]).abs() < 1e-2, "i={} fd={} grad={}", i, fd, grad[i]);
        }
    }

    #[test]
    fn test_kl_divergence() {
        let dist = Gaussian::new(1);
        assert_eq!(dist.kl_divergence(&[0.3, -0.2], &[0.3, -0.2]), 0.0);
        // KL(N(0, 1) || N(1, 1)) = 1 / 2
        assert!((dist.kl_divergence(&[0.0, 0.0], &[1.0, 0.0]) - 0.5).abs() < 1e-6);
        let kl = dist.kl_divergence(&[0.0, -100.0], &[0.0, 100.0]);
        assert!(kl.is_finite());
    }

    #[test]
    fn test_bounds_and_defaults() {
        let dist = Gaussian::new(2)
            .bounds(Some((-1.0, 1.0)))
            .defaults(vec![None, Some(0.25)]);
        let mut rng = StdRng::seed_from_u64(3);
        let params = [0.0, 0.0, 2.0, 2.0];
        for _ in 0..100 {
            let a = dist.sample(&params, &mut rng).as_continuous();
            assert!(a[0] >= -1.0 && a[0] <= 1.0);
            assert_eq!(a[1], 0.25);
        }
        assert_eq!(dist.mode(&[3.0, 0.0, 0.0, 0.0]).as_continuous(), vec![1.0, 0.25]);

        let a = ActionValue::Continuous(vec![0.0, -5.0]);
        let single = Gaussian::new(1);
        assert_eq!(dist.log_prob(&params, &a), single.log_prob(&[0.0, 2.0], &a));
        assert_eq!(dist.log_prob_grad(&params, &a)[3], 0.0);
    }
}
