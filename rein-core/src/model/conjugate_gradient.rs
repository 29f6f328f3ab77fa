//! Conjugate gradient solver for symmetric positive definite systems.
use ndarray::{Array1, ArrayView1};

/// Approximately solves `A x = b` where `a_v` computes `A v`.
///
/// Stops after `iters` iterations or when the squared residual falls below
/// `residual_tol`.
pub fn conjugate_gradient(
    a_v: impl Fn(&[f32]) -> Vec<f32>,
    b: &[f32],
    iters: usize,
    residual_tol: f32,
) -> Vec<f32> {
    let mut x = Array1::<f32>::zeros(b.len());
    let mut r = ArrayView1::from(b).to_owned();
    let mut p = r.clone();
    let mut rr = r.dot(&r);
    for _ in 0..iters {
        if rr < residual_tol {
            break;
        }
        let ap = Array1::from(a_v(&p.to_vec()));
        let pap = p.dot(&ap);
        if pap <= 0.0 || !pap.is_finite() {
            break;
        }
        let alpha = rr / pap;
        x.scaled_add(alpha, &p);
        r.scaled_add(-alpha, &ap);
        let rr_new = r.dot(&r);
        p = &r + &(&p * (rr_new / rr));
        rr = rr_new;
    }
    x.to_vec()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_solves_spd_system() {
        let a = [[4.0f32, 1.0, 0.0], [1.0, 3.0, 0.5], [0.0, 0.5, 2.0]];
        let a_v = |v: &[f32]| {
            a.iter()
                .map(|row| row.iter().zip(v.iter()).map(|(a, v)| a * v).sum())
                .collect::<Vec<f32>>()
        };
        let b = [1.0, 2.0, 3.0];
        let x = conjugate_gradient(a_v, &b, 10, 1e-12);
        let ax = a_v(&x);
        for i in 0..3 {
            assert!((ax[i] - b[i]).abs() < 1e-4);
        }
    }
}
