//! Returns and advantages of chronological batches.

/// Discounted returns, restarted after every terminal.
///
/// The return of the last entries of an unfinished episode bootstraps with 0.
pub fn cumulative_discount(rewards: &[f32], terminals: &[bool], discount: f32) -> Vec<f32> {
    let mut returns = vec![0.0; rewards.len()];
    let mut acc = 0.0;
    for i in (0..rewards.len()).rev() {
        if terminals[i] {
            acc = 0.0;
        }
        acc = rewards[i] + discount * acc;
        returns[i] = acc;
    }
    returns
}

/// Generalized advantage estimates from state values.
///
/// `delta_t = r_t + discount * V(s_{t+1}) - V(s_t)` where `V(s_{t+1})` is `0`
/// after a terminal and for the last entry of the batch.
pub fn generalized_advantage(
    rewards: &[f32],
    terminals: &[bool],
    values: &[f32],
    discount: f32,
    lambda: f32,
) -> Vec<f32> {
    let n = rewards.len();
    let mut advantages = vec![0.0; n];
    let mut acc = 0.0;
    for i in (0..n).rev() {
        let next_value = if terminals[i] || i + 1 == n {
            0.0
        } else {
            values[i + 1]
        };
        if terminals[i] {
            acc = 0.0;
        }
        let delta = rewards[i] + discount * next_value - values[i];
        acc = delta + discount * lambda * acc;
        advantages[i] = acc;
    }
    advantages
}

/// Standardizes values to zero mean and unit variance.
pub fn normalize(xs: &[f32]) -> Vec<f32> {
    let (mean, std) = crate::util::mean_std(xs);
    xs.iter().map(|x| (x - mean) / (std + 1e-8)).collect()
}

/// Step index of every entry within its episode, counted from the start of
/// the batch or the last terminal.
pub fn episode_timesteps(terminals: &[bool]) -> Vec<usize> {
    let mut t = 0;
    terminals
        .iter()
        .map(|&terminal| {
            let current = t;
            t = if terminal { 0 } else { t + 1 };
            current
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_cumulative_discount() {
        let returns = cumulative_discount(&[1.0, 1.0, 1.0, 2.0], &[false, true, false, false], 0.5);
        assert_eq!(returns, vec![1.5, 1.0, 2.0, 2.0]);
    }

    #[test]
    fn test_gae_reduces_to_returns_minus_values() {
        let rewards = [1.0, 0.0, 2.0];
        let terminals = [false, false, true];
        let values = [0.5, 0.2, 0.1];
        let adv = generalized_advantage(&rewards, &terminals, &values, 0.9, 1.0);
        let returns = cumulative_discount(&rewards, &terminals, 0.9);
        for i in 0..3 {
            assert!((adv[i] - (returns[i] - values[i])).abs() < 1e-6);
        }

        // lambda = 0 gives one-step TD errors
        let adv = generalized_advantage(&rewards, &terminals, &values, 0.9, 0.0);
        assert!((adv[0] - (1.0 + 0.9 * 0.2 - 0.5)).abs() < 1e-6);
        assert!((adv[2] - (2.0 - 0.1)).abs() < 1e-6);
    }

    #[test]
    fn test_gae_bootstraps_last_entry_with_zero() {
        let adv = generalized_advantage(&[1.0, 1.0], &[false, false], &[3.0, 3.0], 1.0, 0.5);
        assert!((adv[1] - (1.0 - 3.0)).abs() < 1e-6);
    }

    #[test]
    fn test_normalize() {
        let xs = normalize(&[1.0, 2.0, 3.0, 4.0]);
        let (mean, std) = crate::util::mean_std(&xs);
        assert!(mean.abs() < 1e-6);
        assert!((std - 1.0).abs() < 1e-4);
        assert_eq!(normalize(&[2.0, 2.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn test_episode_timesteps() {
        assert_eq!(
            episode_timesteps(&[false, false, true, false, true]),
            vec![0, 1, 2, 0, 1]
        );
    }
}
