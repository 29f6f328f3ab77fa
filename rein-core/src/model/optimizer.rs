//! Optimizers turning gradients into parameter deltas.
use super::ParamSet;
use crate::error::{ReinError, Result};
use candle_core::{DType, Device, Tensor, Var};
use candle_nn::{AdamW, Optimizer as _, ParamsAdamW, SGD};
use candle_optimisers::adam::{Adam, ParamsAdam};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of the optimizer.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub enum OptimizerConfig {
    /// Plain gradient descent.
    Sgd {
        /// Learning rate.
        lr: f64,
    },

    /// Adam optimizer.
    Adam {
        /// Learning rate.
        lr: f64,
    },

    /// AdamW optimizer.
    AdamW {
        /// Learning rate.
        lr: f64,

        /// Decay of the first moment.
        #[serde(default = "default_beta1")]
        beta1: f64,

        /// Decay of the second moment.
        #[serde(default = "default_beta2")]
        beta2: f64,

        /// Added to the denominator.
        #[serde(default = "default_eps")]
        eps: f64,

        /// Decoupled weight decay.
        #[serde(default = "default_weight_decay")]
        weight_decay: f64,
    },
}

fn default_beta1() -> f64 {
    ParamsAdamW::default().beta1
}

fn default_beta2() -> f64 {
    ParamsAdamW::default().beta2
}

fn default_eps() -> f64 {
    ParamsAdamW::default().eps
}

fn default_weight_decay() -> f64 {
    ParamsAdamW::default().weight_decay
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self::Adam {
            lr: ParamsAdam::default().lr,
        }
    }
}

impl OptimizerConfig {
    /// Adam with the given learning rate.
    pub fn adam(lr: f64) -> Self {
        Self::Adam { lr }
    }

    /// Builds an optimizer for `n_params` parameters.
    pub fn build(&self, n_params: usize) -> Result<Optimizer> {
        let var = Var::zeros(n_params, DType::F32, &Device::Cpu)?;
        let vars = vec![var.clone()];
        let backend = match self {
            Self::Sgd { lr } => Backend::Sgd(SGD::new(vars, *lr)?),
            Self::Adam { lr } => {
                let params = ParamsAdam {
                    lr: *lr,
                    ..ParamsAdam::default()
                };
                Backend::Adam(Adam::new(vars, params)?)
            }
            Self::AdamW {
                lr,
                beta1,
                beta2,
                eps,
                weight_decay,
            } => {
                let params = ParamsAdamW {
                    lr: *lr,
                    beta1: *beta1,
                    beta2: *beta2,
                    eps: *eps,
                    weight_decay: *weight_decay,
                };
                Backend::AdamW(AdamW::new(vars, params)?)
            }
        };
        Ok(Optimizer {
            var,
            backend,
            steps: 0,
        })
    }

    /// Loads the configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves the configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

enum Backend {
    Sgd(SGD),
    Adam(Adam),
    AdamW(AdamW),
}

/// Optimizer with its moments.
///
/// A thin wrapper of the candle optimizers. The flat parameters are copied into
/// a single variable, the optimizer steps it, and the difference is returned as
/// the delta, so the caller decides whether to commit it.
pub struct Optimizer {
    var: Var,
    backend: Backend,
    steps: usize,
}

impl Optimizer {
    /// Parameter delta from `params` minimizing the loss whose gradient is `grad`.
    ///
    /// Non-finite gradients are rejected before the moments are touched.
    pub fn step(&mut self, params: &ParamSet, grad: &[f32]) -> Result<Vec<f32>> {
        if params.len() != self.var.elem_count() || grad.len() != params.len() {
            return Err(ReinError::ConfigError(format!(
                "optimizer holds {} parameters, got {} parameters and {} gradients",
                self.var.elem_count(),
                params.len(),
                grad.len()
            )));
        }
        if grad.iter().any(|g| !g.is_finite()) {
            return Err(ReinError::NumericalInstabilityError(
                "non-finite gradient".to_string(),
            ));
        }

        let current = Tensor::from_slice(params.as_slice(), params.len(), &Device::Cpu)?;
        self.var.set(&current)?;
        let g = Tensor::from_slice(grad, grad.len(), &Device::Cpu)?;
        let grads = self.var.as_tensor().mul(&g)?.sum_all()?.backward()?;
        match &mut self.backend {
            Backend::Sgd(opt) => opt.step(&grads)?,
            Backend::Adam(opt) => opt.step(&grads)?,
            Backend::AdamW(opt) => opt.step(&grads)?,
        }
        self.steps += 1;

        let delta = self.var.as_tensor().sub(&current)?;
        Ok(delta.to_vec1::<f32>()?)
    }

    /// Number of steps taken.
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Number of parameters.
    pub fn n_params(&self) -> usize {
        self.var.elem_count()
    }
}

impl std::fmt::Debug for Optimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.backend {
            Backend::Sgd(_) => "Sgd",
            Backend::Adam(_) => "Adam",
            Backend::AdamW(_) => "AdamW",
        };
        f.debug_struct("Optimizer")
            .field("kind", &kind)
            .field("n_params", &self.n_params())
            .field("steps", &self.steps)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_sgd() -> Result<()> {
        let mut opt = OptimizerConfig::Sgd { lr: 0.5 }.build(2)?;
        let params = ParamSet::new(vec![0.0, 0.0]);
        assert_eq!(opt.step(&params, &[1.0, -2.0])?, vec![-0.5, 1.0]);
        assert_eq!(opt.steps(), 1);
        Ok(())
    }

    #[test]
    fn test_adam_first_step_has_lr_magnitude() -> Result<()> {
        let mut opt = OptimizerConfig::adam(0.01).build(3)?;
        let params = ParamSet::new(vec![0.0; 3]);
        let delta = opt.step(&params, &[3.0, -0.1, 0.0])?;
        assert!((delta[0] + 0.01).abs() < 1e-5);
        assert!((delta[1] - 0.01).abs() < 1e-5);
        assert_eq!(delta[2], 0.0);
        Ok(())
    }

    #[test]
    fn test_adam_minimizes_quadratic() -> Result<()> {
        let mut opt = OptimizerConfig::adam(0.05).build(1)?;
        let mut x = 3.0f32;
        for _ in 0..500 {
            x += opt.step(&ParamSet::new(vec![x]), &[2.0 * (x - 1.0)])?[0];
        }
        assert!((x - 1.0).abs() < 0.05);
        Ok(())
    }

    #[test]
    fn test_non_finite_gradient_leaves_moments() -> Result<()> {
        let mut opt = OptimizerConfig::adam(0.01).build(2)?;
        let params = ParamSet::new(vec![1.0, 1.0]);
        let err = opt.step(&params, &[f32::NAN, 1.0]).unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(opt.steps(), 0);

        // The next step is still a first step of magnitude lr.
        let delta = opt.step(&params, &[1.0, -1.0])?;
        assert!((delta[0] + 0.01).abs() < 1e-5);
        assert!((delta[1] - 0.01).abs() < 1e-5);
        Ok(())
    }

    #[test]
    fn test_config_yaml() -> anyhow::Result<()> {
        let config = OptimizerConfig::AdamW {
            lr: 1e-3,
            beta1: 0.9,
            beta2: 0.99,
            eps: 1e-6,
            weight_decay: 0.0,
        };
        let dir = tempdir::TempDir::new("optimizer")?;
        let path = dir.path().join("optimizer.yaml");
        config.save(&path)?;
        assert_eq!(OptimizerConfig::load(&path)?, config);
        Ok(())
    }
}
