//! Flat parameter vectors.
use serde::{Deserialize, Serialize};

/// All parameters of a network in one flat vector.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct ParamSet(Vec<f32>);

impl ParamSet {
    /// Wraps a parameter vector.
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    /// `len` zeros.
    pub fn zeros(len: usize) -> Self {
        Self(vec![0.0; len])
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no parameters.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Values.
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Mutable values.
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.0
    }

    /// Consumes the set and returns its values.
    pub fn into_vec(self) -> Vec<f32> {
        self.0
    }

    /// Adds `delta` elementwise.
    pub fn add(&mut self, delta: &[f32]) {
        debug_assert_eq!(self.0.len(), delta.len());
        self.0.iter_mut().zip(delta.iter()).for_each(|(p, d)| *p += d);
    }

    /// A copy with `scale * delta` added.
    pub fn added(&self, scale: f32, delta: &[f32]) -> Self {
        Self(
            self.0
                .iter()
                .zip(delta.iter())
                .map(|(p, d)| p + scale * d)
                .collect(),
        )
    }

    /// `self - other` elementwise.
    pub fn diff(&self, other: &Self) -> Vec<f32> {
        self.0.iter().zip(other.0.iter()).map(|(a, b)| a - b).collect()
    }

    /// Moves towards `src` by `tau`: `self = tau * src + (1 - tau) * self`.
    pub fn track(&mut self, src: &Self, tau: f32) {
        self.0
            .iter_mut()
            .zip(src.0.iter())
            .for_each(|(d, s)| *d = tau * s + (1.0 - tau) * *d);
    }

    /// Returns `true` if all values are finite.
    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }
}

#[cfg(test)]
mod test {
    use super::ParamSet;

    #[test]
    fn test_track() {
        let mut dest = ParamSet::new(vec![1.0, 2.0]);
        let src = ParamSet::new(vec![3.0, 4.0]);
        dest.track(&src, 0.5);
        assert_eq!(dest.as_slice(), &[2.0, 3.0]);
        dest.track(&src, 1.0);
        assert_eq!(dest, src);
    }

    #[test]
    fn test_add_and_diff() {
        let mut p = ParamSet::zeros(3);
        p.add(&[1.0, -1.0, 0.5]);
        let q = p.added(2.0, &[1.0, 1.0, 1.0]);
        assert_eq!(q.diff(&p), vec![2.0, 2.0, 2.0]);
        assert!(p.is_finite());
        p.add(&[f32::NAN, 0.0, 0.0]);
        assert!(!p.is_finite());
    }
}
