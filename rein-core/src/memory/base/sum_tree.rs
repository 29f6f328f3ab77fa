//! Sum tree for prioritized sampling.
//!
//! Leaves hold `(p + eps)^alpha` for every slot of the memory. Inner nodes hold
//! the sums of their subtrees and the minima over slots whose priority came from
//! an update, so proportional sampling and the lowest-priority slot are found in
//! `O(log n)`. Raw priorities are kept in a segment tree to give new entries
//! the maximal priority seen so far.
use rand::{rngs::StdRng, Rng};
use segment_tree::{ops::MaxIgnoreNaN, SegmentPoint};
use serde::{Deserialize, Serialize};

/// Specifies how to normalize the importance weights in a prioritized batch.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Copy)]
pub enum WeightNormalizer {
    /// Normalize by the maximal weight any stored entry could get.
    All,

    /// Normalize by the maximal weight in the sampled batch.
    Batch,
}

pub struct SumTree {
    eps: f32,
    alpha: f32,
    capacity: usize,
    n_leaves: usize,
    tree: Vec<f32>,
    min_tree: Vec<f32>,
    max_tree: SegmentPoint<f32, MaxIgnoreNaN>,
    normalize: WeightNormalizer,
}

impl SumTree {
    pub fn new(capacity: usize, alpha: f32, eps: f32, normalize: WeightNormalizer) -> Self {
        let n_leaves = capacity.max(1).next_power_of_two();
        Self {
            eps,
            alpha,
            capacity,
            n_leaves,
            tree: vec![0.0; 2 * n_leaves - 1],
            min_tree: vec![f32::INFINITY; 2 * n_leaves - 1],
            max_tree: SegmentPoint::build(vec![0.0; n_leaves], MaxIgnoreNaN),
            normalize,
        }
    }

    #[inline]
    fn leaf(&self, ix: usize) -> usize {
        ix + self.n_leaves - 1
    }

    fn set_leaf(&mut self, ix: usize, value: f32, min_value: f32) {
        let mut node = self.leaf(ix);
        self.tree[node] = value;
        self.min_tree[node] = min_value;
        while node > 0 {
            node = (node - 1) / 2;
            let (l, r) = (2 * node + 1, 2 * node + 2);
            self.tree[node] = self.tree[l] + self.tree[r];
            self.min_tree[node] = self.min_tree[l].min(self.min_tree[r]);
        }
    }

    /// Sum of `p^alpha` over all sampleable slots.
    pub fn total(&self) -> f32 {
        self.tree[0]
    }

    /// Maximal raw priority set so far, `1` for an empty tree.
    pub fn max(&self) -> f32 {
        let m = self.max_tree.query(0, self.max_tree.len());
        if m > 0.0 {
            m
        } else {
            1.0
        }
    }

    /// Sets the raw priority of slot `ix` from a learning signal.
    ///
    /// Only slots updated this way are candidates of [`SumTree::argmin`].
    pub fn update(&mut self, ix: usize, p: f32) {
        debug_assert!(ix < self.capacity);
        let p = p.abs();
        let v = (p + self.eps).powf(self.alpha);
        self.max_tree.modify(ix, p);
        self.set_leaf(ix, v, v);
    }

    /// Makes slot `ix` sampleable with priority `p` before it has been seen
    /// by an update.
    pub fn insert(&mut self, ix: usize, p: f32) {
        debug_assert!(ix < self.capacity);
        let p = p.abs();
        let v = (p + self.eps).powf(self.alpha);
        self.max_tree.modify(ix, p);
        self.set_leaf(ix, v, f32::INFINITY);
    }

    /// Excludes slot `ix` from sampling and eviction.
    pub fn disable(&mut self, ix: usize) {
        self.max_tree.modify(ix, 0.0);
        self.set_leaf(ix, 0.0, f32::INFINITY);
    }

    /// Sampling weight `p^alpha` of slot `ix`.
    pub fn value(&self, ix: usize) -> f32 {
        self.tree[self.leaf(ix)]
    }

    /// Raw priority of slot `ix`, `0` for disabled slots.
    pub fn priority(&self, ix: usize) -> f32 {
        let v = self.value(ix);
        if v > 0.0 {
            (v.powf(1.0 / self.alpha) - self.eps).max(0.0)
        } else {
            0.0
        }
    }

    /// Slot with the lowest priority among the slots set by [`SumTree::update`].
    pub fn argmin(&self) -> Option<usize> {
        if self.min_tree[0].is_infinite() {
            return None;
        }
        let mut node = 0;
        while node < self.n_leaves - 1 {
            let (l, r) = (2 * node + 1, 2 * node + 2);
            node = if self.min_tree[l] <= self.min_tree[r] { l } else { r };
        }
        Some(node + 1 - self.n_leaves)
    }

    /// Smallest sampling weight among the sampleable slots.
    fn min_value(&self) -> f32 {
        (self.n_leaves - 1..self.tree.len())
            .map(|node| self.tree[node])
            .filter(|&v| v > 0.0)
            .fold(f32::INFINITY, f32::min)
    }

    /// Slot whose cumulative priority interval contains `s`.
    pub fn get(&self, s: f32) -> usize {
        let mut node = 0;
        let mut s = s;
        while node < self.n_leaves - 1 {
            let (l, r) = (2 * node + 1, 2 * node + 2);
            if s < self.tree[l] || self.tree[r] == 0.0 {
                node = l;
            } else {
                s -= self.tree[l];
                node = r;
            }
        }
        node + 1 - self.n_leaves
    }

    /// Samples slots in proportion to `p^alpha` and returns them with their
    /// normalized importance weights.
    ///
    /// The weight is $w_i=\left(N P(i)\right)^{-\beta}$ where `n_enabled` is $N$.
    pub fn sample(
        &self,
        batch_size: usize,
        beta: f32,
        n_enabled: usize,
        rng: &mut StdRng,
    ) -> (Vec<usize>, Vec<f32>) {
        let total = self.total();
        let ixs = (0..batch_size)
            .map(|_| {
                let mut ix = self.get(total * rng.gen::<f32>());
                // Rounding at interval boundaries can land on an empty leaf.
                let mut n_retry = 0;
                while self.value(ix) == 0.0 && n_retry < 16 {
                    ix = self.get(total * rng.gen::<f32>());
                    n_retry += 1;
                }
                ix
            })
            .collect::<Vec<_>>();

        let n = n_enabled as f32 / total;
        let ws = ixs
            .iter()
            .map(|&ix| (n * self.value(ix)).powf(-beta))
            .collect::<Vec<_>>();

        let w_max = match self.normalize {
            WeightNormalizer::All => (n * self.min_value()).powf(-beta),
            WeightNormalizer::Batch => ws.iter().cloned().fold(f32::MIN_POSITIVE, f32::max),
        };
        let ws = ws.iter().map(|w| (w / w_max).min(1.0)).collect();

        (ixs, ws)
    }

    /// Removes all priorities.
    pub fn clear(&mut self) {
        *self = Self::new(self.capacity, self.alpha, self.eps, self.normalize);
    }
}
