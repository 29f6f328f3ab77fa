//! Baseline interface.
use crate::error::Result;

/// Estimates state values of one state component.
///
/// `timesteps` holds the step index of every input within its episode.
pub trait Baseline: Send {
    /// Predicted values.
    fn predict(&self, inputs: &[Vec<f32>], timesteps: &[usize]) -> Result<Vec<f32>>;

    /// Fits the estimator to observed returns and returns the squared error
    /// of the predictions before the fit.
    fn update(&mut self, inputs: &[Vec<f32>], timesteps: &[usize], returns: &[f32])
        -> Result<f32>;
}

pub(super) fn mse(predictions: &[f32], targets: &[f32]) -> f32 {
    if targets.is_empty() {
        return 0.0;
    }
    predictions
        .iter()
        .zip(targets.iter())
        .map(|(p, t)| (p - t).powi(2))
        .sum::<f32>()
        / targets.len() as f32
}
