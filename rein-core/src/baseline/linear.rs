//! Linear baseline on hand-crafted features.
use super::{base::mse, Baseline};
use crate::error::{ReinError, Result};
use ndarray::{s, Array1, Array2, Axis};

/// Ridge coefficient of the least-squares fit.
const REG: f64 = 2.0;

/// Least-squares value estimate on the features `[s, s², t/100, (t/100)², 1]`.
///
/// Predicts `0` until the first fit.
#[derive(Clone, Debug, Default)]
pub struct LinearBaseline {
    weights: Option<Array1<f64>>,
}

impl LinearBaseline {
    /// Creates an unfitted baseline.
    pub fn new() -> Self {
        Self::default()
    }

    fn features(input: &[f32], t: usize) -> Vec<f64> {
        let t = t as f64 / 100.0;
        let mut x = input.iter().map(|&v| v as f64).collect::<Vec<_>>();
        x.extend(input.iter().map(|&v| (v as f64).powi(2)));
        x.extend_from_slice(&[t, t * t, 1.0]);
        x
    }

    /// Feature matrix with one row per input.
    fn design(inputs: &[Vec<f32>], timesteps: &[usize]) -> Result<Array2<f64>> {
        let dim = inputs.first().map_or(3, |s| 2 * s.len() + 3);
        let mut x = Array2::zeros((inputs.len(), dim));
        for (mut row, (s, &t)) in x
            .axis_iter_mut(Axis(0))
            .zip(inputs.iter().zip(timesteps.iter()))
        {
            if 2 * s.len() + 3 != dim {
                return Err(ReinError::ConfigError(format!(
                    "baseline inputs of length {} and {}",
                    (dim - 3) / 2,
                    s.len()
                )));
            }
            row.assign(&Array1::from(Self::features(s, t)));
        }
        Ok(x)
    }
}

/// Solves `a x = b` by Gaussian elimination with partial pivoting.
fn solve(mut a: Array2<f64>, mut b: Array1<f64>) -> Option<Array1<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[[i, col]].abs().total_cmp(&a[[j, col]].abs()))?;
        if a[[pivot, col]].abs() < 1e-12 {
            return None;
        }
        if pivot != col {
            for k in 0..n {
                a.swap([col, k], [pivot, k]);
            }
            b.swap(col, pivot);
        }
        let pivot_row = a.row(col).to_owned();
        for row in col + 1..n {
            let f = a[[row, col]] / pivot_row[col];
            a.row_mut(row).scaled_add(-f, &pivot_row);
            b[row] -= f * b[col];
        }
    }
    let mut x = Array1::zeros(n);
    for row in (0..n).rev() {
        let tail = a.slice(s![row, row + 1..]).dot(&x.slice(s![row + 1..]));
        x[row] = (b[row] - tail) / a[[row, row]];
    }
    Some(x)
}

impl Baseline for LinearBaseline {
    fn predict(&self, inputs: &[Vec<f32>], timesteps: &[usize]) -> Result<Vec<f32>> {
        let w = match &self.weights {
            None => return Ok(vec![0.0; inputs.len()]),
            Some(w) => w,
        };
        let x = Self::design(inputs, timesteps)?;
        if x.ncols() != w.len() {
            return Err(ReinError::ConfigError(format!(
                "baseline fitted on {} features, got {}",
                w.len(),
                x.ncols()
            )));
        }
        Ok(x.dot(w).iter().map(|&v| v as f32).collect())
    }

    fn update(
        &mut self,
        inputs: &[Vec<f32>],
        timesteps: &[usize],
        returns: &[f32],
    ) -> Result<f32> {
        let loss = mse(&self.predict(inputs, timesteps)?, returns);
        if inputs.is_empty() {
            return Ok(loss);
        }

        let x = Self::design(inputs, timesteps)?;
        let y = returns.iter().map(|&r| r as f64).collect::<Array1<f64>>();
        let mut xtx = x.t().dot(&x);
        xtx.diag_mut().mapv_inplace(|v| v + REG);
        let xty = x.t().dot(&y);

        match solve(xtx, xty) {
            Some(w) if w.iter().all(|v| v.is_finite()) => {
                self.weights = Some(w);
                Ok(loss)
            }
            _ => Err(ReinError::NumericalInstabilityError(
                "linear baseline fit is singular".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_predicts_zero_before_fit() -> Result<()> {
        let b = LinearBaseline::new();
        assert_eq!(b.predict(&[vec![1.0], vec![2.0]], &[0, 1])?, vec![0.0, 0.0]);
        Ok(())
    }

    #[test]
    fn test_fit_reduces_error() {
        let mut b = LinearBaseline::new();
        let inputs = (0..200)
            .map(|i| vec![i as f32 / 50.0 - 2.0])
            .collect::<Vec<_>>();
        let timesteps = (0..200).collect::<Vec<_>>();
        let returns = inputs
            .iter()
            .map(|s| 3.0 * s[0] + s[0] * s[0] + 1.0)
            .collect::<Vec<_>>();

        let before = b.update(&inputs, &timesteps, &returns).unwrap();
        let after = mse(&b.predict(&inputs, &timesteps).unwrap(), &returns);
        assert!(after < 0.05 * before, "before={} after={}", before, after);
    }

    #[test]
    fn test_solve() {
        let x = solve(array![[0.0, 2.0], [1.0, 1.0]], array![4.0, 3.0]).unwrap();
        assert!((x[0] - 1.0).abs() < 1e-12 && (x[1] - 2.0).abs() < 1e-12);
        assert!(solve(array![[1.0, 1.0], [1.0, 1.0]], array![1.0, 1.0]).is_none());
    }
}
