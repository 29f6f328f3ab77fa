//! Distributions of all action components over one output vector.
use super::{
    ActionDefault, Beta, Categorical, ContinuousDistribution, Distribution, DistributionConfig,
    Gaussian,
};
use crate::{
    error::{ReinError, Result},
    Action, ActionSpec,
};
use rand::rngs::StdRng;

/// One distribution per action component, each reading `param_len` consecutive
/// values of the network output.
pub struct PolicyHeads {
    heads: Vec<Box<dyn Distribution>>,
    offsets: Vec<usize>,
    param_len: usize,
}

impl PolicyHeads {
    /// Creates heads from distributions in action component order.
    pub fn new(heads: Vec<Box<dyn Distribution>>) -> Self {
        let mut offsets = Vec::with_capacity(heads.len());
        let mut param_len = 0;
        for head in heads.iter() {
            offsets.push(param_len);
            param_len += head.param_len();
        }
        Self {
            heads,
            offsets,
            param_len,
        }
    }

    /// Selects distributions for the action components.
    ///
    /// Discrete components get a [`Categorical`], continuous ones a [`Gaussian`]
    /// or, if configured, a [`Beta`].
    pub fn build(actions: &[ActionSpec], config: &DistributionConfig) -> Result<Self> {
        if let Some(defaults) = &config.defaults {
            if defaults.len() != actions.len() {
                return Err(ReinError::ConfigError(format!(
                    "{} distribution defaults given for {} action components",
                    defaults.len(),
                    actions.len()
                )));
            }
        }

        let mut heads: Vec<Box<dyn Distribution>> = Vec::with_capacity(actions.len());
        for (i, spec) in actions.iter().enumerate() {
            spec.check()?;
            let default = config
                .defaults
                .as_ref()
                .map(|d| d[i].clone())
                .unwrap_or(ActionDefault::Learned);
            let head: Box<dyn Distribution> = match (spec, default) {
                (ActionSpec::Discrete { num_actions }, ActionDefault::Learned) => Box::new(
                    Categorical::new(*num_actions).temperature(config.temperature),
                ),
                (ActionSpec::Discrete { num_actions }, ActionDefault::Discrete(a))
                    if a < *num_actions =>
                {
                    Box::new(Categorical::new(*num_actions).default_value(Some(a)))
                }
                (ActionSpec::Continuous { shape, .. }, default) => {
                    let defaults = match default {
                        ActionDefault::Learned => vec![None; *shape],
                        ActionDefault::Continuous(d) if d.len() == *shape => d,
                        _ => {
                            return Err(ReinError::ConfigError(format!(
                                "invalid default for continuous action component {}",
                                i
                            )))
                        }
                    };
                    match (config.continuous, spec.bounds()) {
                        (ContinuousDistribution::Gaussian, bounds) => {
                            Box::new(Gaussian::new(*shape).bounds(bounds).defaults(defaults))
                        }
                        (ContinuousDistribution::Beta, Some((min, max))) => {
                            Box::new(Beta::new(*shape, min, max).defaults(defaults))
                        }
                        (ContinuousDistribution::Beta, None) => {
                            return Err(ReinError::ConfigError(format!(
                                "beta distribution requires bounds on action component {}",
                                i
                            )))
                        }
                    }
                }
                _ => {
                    return Err(ReinError::ConfigError(format!(
                        "invalid default for discrete action component {}",
                        i
                    )))
                }
            };
            heads.push(head);
        }
        Ok(Self::new(heads))
    }

    /// Number of network outputs consumed by all heads.
    pub fn param_len(&self) -> usize {
        self.param_len
    }

    /// Number of action components.
    pub fn len(&self) -> usize {
        self.heads.len()
    }

    /// Returns `true` if there are no action components.
    pub fn is_empty(&self) -> bool {
        self.heads.is_empty()
    }

    fn params<'a>(&self, output: &'a [f32], i: usize) -> &'a [f32] {
        &output[self.offsets[i]..self.offsets[i] + self.heads[i].param_len()]
    }

    /// Samples an action.
    pub fn sample(&self, output: &[f32], rng: &mut StdRng) -> Action {
        Action(
            self.heads
                .iter()
                .enumerate()
                .map(|(i, h)| h.sample(self.params(output, i), rng))
                .collect(),
        )
    }

    /// Deterministic action.
    pub fn mode(&self, output: &[f32]) -> Action {
        Action(
            self.heads
                .iter()
                .enumerate()
                .map(|(i, h)| h.mode(self.params(output, i)))
                .collect(),
        )
    }

    /// Joint log-probability of the action components.
    pub fn log_prob(&self, output: &[f32], action: &Action) -> f32 {
        self.heads
            .iter()
            .zip(action.components().iter())
            .enumerate()
            .map(|(i, (h, a))| h.log_prob(self.params(output, i), a))
            .sum()
    }

    /// Gradient of [`PolicyHeads::log_prob`] with respect to the output vector.
    ///
    /// Outputs beyond [`PolicyHeads::param_len`] get zero gradient.
    pub fn log_prob_grad(&self, output: &[f32], action: &Action) -> Vec<f32> {
        let mut grad = vec![0.0; output.len()];
        for (i, (h, a)) in self.heads.iter().zip(action.components().iter()).enumerate() {
            let g = h.log_prob_grad(self.params(output, i), a);
            grad[self.offsets[i]..self.offsets[i] + g.len()].copy_from_slice(&g);
        }
        grad
    }

    /// Sum of the entropies of the components.
    pub fn entropy(&self, output: &[f32]) -> f32 {
        self.heads
            .iter()
            .enumerate()
            .map(|(i, h)| h.entropy(self.params(output, i)))
            .sum()
    }

    /// Sum of the KL divergences of the components.
    pub fn kl_divergence(&self, output: &[f32], other: &[f32]) -> f32 {
        self.heads
            .iter()
            .enumerate()
            .map(|(i, h)| h.kl_divergence(self.params(output, i), self.params(other, i)))
            .sum()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ActionValue;
    use rand::SeedableRng;

    fn specs() -> Vec<ActionSpec> {
        vec![ActionSpec::discrete(3), ActionSpec::bounded(2, -1.0, 1.0)]
    }

    #[test]
    fn test_layout() {
        let heads = PolicyHeads::build(&specs(), &DistributionConfig::default()).unwrap();
        assert_eq!(heads.len(), 2);
        assert_eq!(heads.param_len(), 3 + 4);

        let output = [0.0, 10.0, 0.0, 0.5, -0.5, 0.0, 0.0];
        let action = heads.mode(&output);
        assert_eq!(action.components()[0], ActionValue::Discrete(1));
        assert_eq!(action.components()[1], ActionValue::Continuous(vec![0.5, -0.5]));

        let mut rng = StdRng::seed_from_u64(0);
        let sampled = heads.sample(&output, &mut rng);
        assert_eq!(sampled.components().len(), 2);

        let grad = heads.log_prob_grad(&output, &action);
        assert_eq!(grad.len(), output.len());
        // The mode of the gaussian components has zero mean gradient.
        assert_eq!(grad[3], 0.0);
        assert_eq!(grad[4], 0.0);
    }

    #[test]
    fn test_build_errors() {
        let config = DistributionConfig::default().continuous(ContinuousDistribution::Beta);
        assert!(PolicyHeads::build(&[ActionSpec::continuous(1)], &config).is_err());
        assert!(PolicyHeads::build(&[ActionSpec::bounded(1, 0.0, 1.0)], &config).is_ok());

        let config = DistributionConfig::default().defaults(Some(vec![ActionDefault::Learned]));
        assert!(PolicyHeads::build(&specs(), &config).is_err());

        let config = DistributionConfig::default()
            .defaults(Some(vec![ActionDefault::Discrete(5), ActionDefault::Learned]));
        assert!(PolicyHeads::build(&specs(), &config).is_err());
    }

    #[test]
    fn test_defaults_remove_randomness() {
        let config = DistributionConfig::default().defaults(Some(vec![
            ActionDefault::Discrete(2),
            ActionDefault::Continuous(vec![Some(0.0), Some(0.0)]),
        ]));
        let heads = PolicyHeads::build(&specs(), &config).unwrap();
        let output = [0.0; 7];
        let action = heads.mode(&output);
        assert_eq!(heads.log_prob(&output, &action), 0.0);
        assert_eq!(heads.entropy(&output), 0.0);
        assert_eq!(heads.kl_divergence(&output, &[1.0; 7]), 0.0);
    }
}
