//! Distribution interface.
use crate::ActionValue;
use rand::rngs::StdRng;

/// A parametrized distribution over the values of one action component.
///
/// Every method takes the raw parameters, a slice of [`Distribution::param_len`]
/// network outputs. Dimensions with a fixed default value are deterministic and
/// contribute nothing to log-probabilities, entropies, KL divergences and
/// gradients.
pub trait Distribution: Send + Sync {
    /// Number of raw parameters consumed from the network output.
    fn param_len(&self) -> usize;

    /// Samples a value.
    fn sample(&self, params: &[f32], rng: &mut StdRng) -> ActionValue;

    /// The most likely value, used for deterministic actions.
    fn mode(&self, params: &[f32]) -> ActionValue;

    /// Log-probability (or log-density) of `value`.
    fn log_prob(&self, params: &[f32], value: &ActionValue) -> f32;

    /// Gradient of [`Distribution::log_prob`] with respect to the raw parameters.
    fn log_prob_grad(&self, params: &[f32], value: &ActionValue) -> Vec<f32>;

    /// Entropy.
    fn entropy(&self, params: &[f32]) -> f32;

    /// `KL(p || q)` where `p` has the parameters `params` and `q` has `other`.
    fn kl_divergence(&self, params: &[f32], other: &[f32]) -> f32;
}
