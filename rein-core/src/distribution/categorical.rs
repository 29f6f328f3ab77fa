//! Categorical distribution over discrete actions.
use super::Distribution;
use crate::{
    util::{argmax, log_softmax, softmax},
    ActionValue,
};
use rand::{rngs::StdRng, Rng};

/// Standard Gumbel noise.
fn gumbel(rng: &mut StdRng) -> f32 {
    let u: f32 = rng.gen_range(f32::MIN_POSITIVE..1.0);
    -(-u.ln()).ln()
}

/// Categorical distribution parametrized by unnormalized logits.
///
/// Sampling uses the Gumbel-max trick on `logits / temperature`, so a
/// temperature of `1` samples from the softmax of the logits.
#[derive(Clone, Debug)]
pub struct Categorical {
    num_actions: usize,
    temperature: f32,
    default: Option<usize>,
}

impl Categorical {
    /// Creates a distribution over `num_actions` actions.
    pub fn new(num_actions: usize) -> Self {
        Self {
            num_actions,
            temperature: 1.0,
            default: None,
        }
    }

    /// Sets the sampling temperature.
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Fixes the action to `default`, making the distribution deterministic.
    pub fn default_value(mut self, default: Option<usize>) -> Self {
        self.default = default;
        self
    }

    /// Gumbel-softmax sample, a differentiable relaxation of a one-hot sample.
    ///
    /// A fixed default action gives its one-hot vector.
    pub fn relaxed_sample(&self, params: &[f32], tau: f32, rng: &mut StdRng) -> Vec<f32> {
        if let Some(a) = self.default {
            let mut one_hot = vec![0.0; self.num_actions];
            one_hot[a] = 1.0;
            return one_hot;
        }
        let tau = tau.max(f32::MIN_POSITIVE);
        let perturbed = params[..self.num_actions]
            .iter()
            .map(|l| (l + gumbel(rng)) / tau)
            .collect::<Vec<_>>();
        softmax(&perturbed)
    }

    /// Class probabilities.
    pub fn probs(&self, params: &[f32]) -> Vec<f32> {
        softmax(&params[..self.num_actions])
    }
}

impl Distribution for Categorical {
    fn param_len(&self) -> usize {
        self.num_actions
    }

    fn sample(&self, params: &[f32], rng: &mut StdRng) -> ActionValue {
        if let Some(a) = self.default {
            return ActionValue::Discrete(a);
        }
        let t = self.temperature.max(f32::MIN_POSITIVE);
        let perturbed = params[..self.num_actions]
            .iter()
            .map(|l| l / t + gumbel(rng))
            .collect::<Vec<_>>();
        ActionValue::Discrete(argmax(&perturbed))
    }

    fn mode(&self, params: &[f32]) -> ActionValue {
        match self.default {
            Some(a) => ActionValue::Discrete(a),
            None => ActionValue::Discrete(argmax(&params[..self.num_actions])),
        }
    }

    fn log_prob(&self, params: &[f32], value: &ActionValue) -> f32 {
        if self.default.is_some() {
            return 0.0;
        }
        log_softmax(&params[..self.num_actions])[value.as_discrete()]
    }

    fn log_prob_grad(&self, params: &[f32], value: &ActionValue) -> Vec<f32> {
        if self.default.is_some() {
            return vec![0.0; self.num_actions];
        }
        let mut grad = self.probs(params).iter().map(|p| -p).collect::<Vec<_>>();
        grad[value.as_discrete()] += 1.0;
        grad
    }

    fn entropy(&self, params: &[f32]) -> f32 {
        if self.default.is_some() {
            return 0.0;
        }
        let lp = log_softmax(&params[..self.num_actions]);
        -lp.iter().map(|l| l.exp() * l).sum::<f32>()
    }

    fn kl_divergence(&self, params: &[f32], other: &[f32]) -> f32 {
        if self.default.is_some() {
            return 0.0;
        }
        let lp = log_softmax(&params[..self.num_actions]);
        let lq = log_softmax(&other[..self.num_actions]);
        lp.iter()
            .zip(lq.iter())
            .map(|(p, q)| p.exp() * (p - q))
            .sum::<f32>()
            .max(0.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_sampling_follows_softmax() {
        let dist = Categorical::new(3);
        let logits = [0.0f32, 1.0, 2.0];
        let probs = dist.probs(&logits);
        let mut rng = StdRng::seed_from_u64(0);
        let n = 30_000;
        let mut counts = [0usize; 3];
        for _ in 0..n {
            counts[dist.sample(&logits, &mut rng).as_discrete()] += 1;
        }
        for a in 0..3 {
            assert!((counts[a] as f32 / n as f32 - probs[a]).abs() < 0.015);
        }
    }

    #[test]
    fn test_log_prob_grad_matches_finite_differences() {
        let dist = Categorical::new(4);
        let logits = vec![0.3f32, -1.2, 0.8, 0.1];
        let a = ActionValue::Discrete(2);
        let grad = dist.log_prob_grad(&logits, &a);
        for i in 0..4 {
            let mut plus = logits.clone();
            let mut minus = logits.clone();
            plus[i] += 1e-2;
            minus[i] -= 1e-2;
            let fd = (dist.log_prob(&plus, &a) - dist.log_prob(&minus, &a)) / 2e-2;
            assert!((fd - grad[i]).abs() < 1e-3);
        }
    }

    #[test]
    fn test_entropy_and_kl() {
        let dist = Categorical::new(4);
        let uniform = [0.0f32; 4];
        assert!((dist.entropy(&uniform) - 4f32.ln()).abs() < 1e-6);
        assert_eq!(dist.kl_divergence(&uniform, &uniform), 0.0);
        assert!(dist.kl_divergence(&uniform, &[5.0, 0.0, 0.0, 0.0]) > 0.0);

        // Extreme logits stay finite.
        let kl = dist.kl_divergence(&[100.0, -100.0, 0.0, 0.0], &[-100.0, 100.0, 0.0, 0.0]);
        assert!(kl.is_finite() && kl > 0.0);
    }

    #[test]
    fn test_default_value_is_deterministic() {
        let dist = Categorical::new(3).default_value(Some(1));
        let mut rng = StdRng::seed_from_u64(0);
        let logits = [5.0, 0.0, 0.0];
        assert_eq!(dist.sample(&logits, &mut rng), ActionValue::Discrete(1));
        assert_eq!(dist.mode(&logits), ActionValue::Discrete(1));
        assert_eq!(dist.log_prob(&logits, &ActionValue::Discrete(1)), 0.0);
        assert_eq!(dist.entropy(&logits), 0.0);
        assert!(dist
            .log_prob_grad(&logits, &ActionValue::Discrete(1))
            .iter()
            .all(|&g| g == 0.0));
    }

    #[test]
    fn test_relaxed_sample_is_a_simplex_point() {
        let dist = Categorical::new(3);
        let mut rng = StdRng::seed_from_u64(1);
        let y = dist.relaxed_sample(&[1.0, 0.0, -1.0], 0.5, &mut rng);
        assert!((y.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert!(y.iter().all(|&p| p >= 0.0));
    }

    #[test]
    fn test_relaxed_sample_reads_own_logits() {
        // Trailing values belong to other heads
        let mut rng = StdRng::seed_from_u64(2);
        let y = Categorical::new(2).relaxed_sample(&[0.0, 0.0, 50.0], 1.0, &mut rng);
        assert_eq!(y.len(), 2);

        let dist = Categorical::new(3).default_value(Some(2));
        let y = dist.relaxed_sample(&[9.0, 0.0, 0.0], 1.0, &mut rng);
        assert_eq!(y, vec![0.0, 0.0, 1.0]);
    }

    #[test]
    #[should_panic]
    fn test_log_prob_of_invalid_action_is_not_clamped() {
        Categorical::new(2).log_prob(&[0.0, 1.0], &ActionValue::Discrete(5));
    }
}
