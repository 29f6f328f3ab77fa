//! Q-value engines bootstrapping from a target network.
mod categorical;
mod dqn;
mod naf;
pub use categorical::CategoricalDqnEngine;
pub use dqn::DqnEngine;
pub use naf::NafEngine;

/// Squared (`None`) or Huber loss of a TD error and its derivative.
pub(crate) fn td_loss(delta: f32, huber_delta: Option<f32>) -> (f32, f32) {
    match huber_delta {
        Some(d) if delta.abs() > d => (d * (delta.abs() - 0.5 * d), d * delta.signum()),
        _ => (0.5 * delta * delta, delta),
    }
}

/// Bootstrapping factor `discount^horizon`, zero after a terminal.
pub(crate) fn bootstrap(discount: f32, horizon: usize, terminal: bool) -> f32 {
    if terminal {
        0.0
    } else {
        discount.powi(horizon as i32)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_td_loss() {
        assert_eq!(td_loss(2.0, None), (2.0, 2.0));
        assert_eq!(td_loss(0.5, Some(1.0)), (0.125, 0.5));
        assert_eq!(td_loss(-3.0, Some(1.0)), (2.5, -1.0));
        assert_eq!(bootstrap(0.5, 3, false), 0.125);
        assert_eq!(bootstrap(0.5, 3, true), 0.0);
    }
}
