//! Replay memory with optional prioritized sampling.
mod sum_tree;
use super::{EvictionPolicy, PerConfig, ReplayMemoryConfig, TransitionBatch};
use crate::{
    error::{ReinError, Result},
    InternalState, Memory, State, Transition,
};
use log::warn;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use sum_tree::SumTree;
pub use sum_tree::WeightNormalizer;

/// Samples `size` of `n_slots` slots uniformly with replacement, skipping `excluded`.
fn uniform_slots(
    rng: &mut StdRng,
    n_slots: usize,
    size: usize,
    excluded: Option<usize>,
) -> Vec<usize> {
    let n = n_slots - excluded.is_some() as usize;
    (0..size)
        .map(|_| {
            let r = rng.gen_range(0..n);
            match excluded {
                Some(e) if r >= e => r + 1,
                _ => r,
            }
        })
        .collect()
}

/// State management for prioritized replay.
struct PerState {
    /// Priorities of the slots.
    sum_tree: SumTree,

    /// Importance sampling exponent of the first prioritized batch.
    beta_0: f32,

    /// Exponent reached after `beta_batches` prioritized batches.
    beta_final: f32,

    beta_batches: usize,

    /// Prioritized batches sampled so far.
    batches: usize,

    /// Eviction order of a full memory.
    eviction: EvictionPolicy,
}

impl PerState {
    fn new(capacity: usize, per_config: &PerConfig) -> Self {
        Self {
            sum_tree: SumTree::new(
                capacity,
                per_config.alpha,
                per_config.epsilon,
                per_config.normalize,
            ),
            beta_0: per_config.beta_0,
            beta_final: per_config.beta_final,
            beta_batches: per_config.beta_batches,
            batches: 0,
            eviction: per_config.eviction,
        }
    }

    /// Exponent of the importance weights of the next batch.
    ///
    /// Moves linearly from `beta_0` to `beta_final` over the prioritized
    /// batches drawn, so priority writes without sampling do not advance it.
    fn next_beta(&mut self) -> f32 {
        let beta = if self.batches >= self.beta_batches {
            self.beta_final
        } else {
            let frac = self.batches as f32 / self.beta_batches as f32;
            self.beta_0 + (self.beta_final - self.beta_0) * frac
        };
        self.batches += 1;
        beta
    }
}

/// A stored transition.
#[derive(Clone, Debug)]
struct Slot {
    /// Insertion order. The successor of an entry has the next sequence number.
    seq: u64,

    transition: Transition,

    /// State and internal state of the successor, kept only when the successor
    /// was evicted before this entry.
    successor: Option<(State, InternalState)>,
}

/// An entry of a [`MemorySnapshot`].
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct SnapshotEntry {
    /// The stored transition.
    pub transition: Transition,

    /// Successor state and internal state, if the successor is not the next entry.
    pub successor: Option<(State, InternalState)>,

    /// Raw priority of a prioritized memory.
    pub priority: Option<f32>,
}

/// Contents of a [`ReplayMemory`] in chronological order, for checkpointing.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct MemorySnapshot {
    /// Stored entries, oldest first.
    pub entries: Vec<SnapshotEntry>,
}

/// A replay memory of [`Transition`]s.
///
/// Next states are not stored with the transitions. The next state of a
/// non-terminal entry is the state of its chronological successor, so the
/// newest non-terminal entry cannot be returned when next states are requested.
///
/// Without [`PerConfig`], entries are sampled uniformly and evicted oldest first.
/// With it, entries are sampled in proportion to `p^alpha` and the newest
/// non-terminal entry becomes sampleable, with the maximal priority so far,
/// once its successor arrives.
///
/// # Examples
///
/// ```rust
/// use rein_core::{
///     memory::{ReplayMemory, ReplayMemoryConfig},
///     Action, Memory, State, Transition,
/// };
///
/// let mut memory = ReplayMemory::build(&ReplayMemoryConfig::default().capacity(100));
/// for i in 0..10 {
///     let state = State::single(vec![i as f32]);
///     memory.add(Transition::new(state, Action::discrete(0), 1.0, i == 9));
/// }
/// let batch = memory.get_batch(4, true, false).unwrap();
/// assert_eq!(batch.len(), 4);
/// ```
pub struct ReplayMemory {
    /// Maximum number of transitions that can be stored.
    capacity: usize,

    /// Stored entries. Slots are filled in order and reused after eviction.
    slots: Vec<Slot>,

    /// Slot of each stored sequence number.
    index: HashMap<u64, usize>,

    /// Sequence number of the next entry.
    next_seq: u64,

    /// Lower bound of the stored sequence numbers.
    oldest_seq: u64,

    /// Random number generator for sampling.
    rng: StdRng,

    /// State for prioritized replay, if enabled.
    per_state: Option<PerState>,
}

impl ReplayMemory {
    /// Creates a new memory with the given configuration.
    pub fn build(config: &ReplayMemoryConfig) -> Self {
        let capacity = config.capacity.max(1);
        Self {
            capacity,
            slots: Vec::with_capacity(capacity.min(1 << 16)),
            index: HashMap::new(),
            next_seq: 0,
            oldest_seq: 0,
            rng: StdRng::seed_from_u64(config.seed),
            per_state: config
                .per_config
                .as_ref()
                .map(|per_config| PerState::new(capacity, per_config)),
        }
    }

    /// Slot of the newest entry if it is still waiting for its successor.
    fn staged_slot(&self) -> Option<usize> {
        if self.next_seq == 0 {
            return None;
        }
        self.index
            .get(&(self.next_seq - 1))
            .filter(|&&ix| !self.slots[ix].transition.terminal)
            .cloned()
    }

    fn successor<'a>(&'a self, slot: &'a Slot) -> Option<(&'a State, &'a InternalState)> {
        if let Some((state, internal)) = &slot.successor {
            return Some((state, internal));
        }
        self.index.get(&(slot.seq + 1)).map(|&ix| {
            let t = &self.slots[ix].transition;
            (&t.state, &t.internal)
        })
    }

    fn next_state(&self, slot: &Slot) -> State {
        if slot.transition.terminal {
            return slot.transition.state.clone();
        }
        match self.successor(slot) {
            Some((state, _)) => state.clone(),
            None => slot.transition.state.clone(),
        }
    }

    fn next_internal(&self, slot: &Slot) -> InternalState {
        if let Some(internal) = &slot.transition.next_internal {
            return internal.clone();
        }
        match self.successor(slot) {
            Some((_, internal)) => internal.clone(),
            None => slot.transition.internal.clone(),
        }
    }

    /// Chooses the slot to overwrite in a full memory and detaches its entry.
    fn evict(&mut self) -> usize {
        let lowest = match &self.per_state {
            Some(per) if per.eviction == EvictionPolicy::LowestPriority => per.sum_tree.argmin(),
            _ => None,
        };
        let ix = match lowest {
            Some(ix) => ix,
            None => {
                while !self.index.contains_key(&self.oldest_seq) {
                    self.oldest_seq += 1;
                }
                self.index[&self.oldest_seq]
            }
        };

        let seq = self.slots[ix].seq;
        if seq > 0 {
            if let Some(&pred) = self.index.get(&(seq - 1)) {
                if !self.slots[pred].transition.terminal && self.slots[pred].successor.is_none() {
                    let t = &self.slots[ix].transition;
                    let successor = (t.state.clone(), t.internal.clone());
                    self.slots[pred].successor = Some(successor);
                }
            }
        }
        self.index.remove(&seq);
        ix
    }

    /// Samples slots of complete entries, or of any entry if `need_successor` is false
    /// and sampling is uniform.
    fn sample_slots(
        &mut self,
        size: usize,
        need_successor: bool,
    ) -> Result<(Vec<usize>, Option<Vec<f32>>)> {
        let staged = self.staged_slot();
        let prioritized = self.per_state.is_some();
        let excluded = if need_successor || prioritized {
            staged
        } else {
            None
        };
        let available = self.slots.len() - excluded.is_some() as usize;
        if size > available {
            return Err(ReinError::CapacityError {
                requested: size,
                available,
            });
        }
        if size == 0 {
            return Ok((vec![], None));
        }

        let n_slots = self.slots.len();
        match self.per_state.as_mut() {
            Some(per) if per.sum_tree.total() > 0.0 => {
                let beta = per.next_beta();
                let (ixs, ws) = per.sum_tree.sample(size, beta, available, &mut self.rng);
                Ok((ixs, Some(ws)))
            }
            Some(_) => {
                let ixs = uniform_slots(&mut self.rng, n_slots, size, excluded);
                Ok((ixs, Some(vec![1.0; size])))
            }
            None => Ok((
                uniform_slots(&mut self.rng, n_slots, size, excluded),
                None,
            )),
        }
    }

    fn make_batch(
        &self,
        ixs: Vec<usize>,
        weights: Option<Vec<f32>>,
        include_next_states: bool,
        include_next_internals: bool,
    ) -> TransitionBatch {
        let slots = ixs.iter().map(|&ix| &self.slots[ix]).collect::<Vec<_>>();
        TransitionBatch {
            states: slots.iter().map(|s| s.transition.state.clone()).collect(),
            internals: slots.iter().map(|s| s.transition.internal.clone()).collect(),
            actions: slots.iter().map(|s| s.transition.action.clone()).collect(),
            rewards: slots.iter().map(|s| s.transition.reward).collect(),
            terminals: slots.iter().map(|s| s.transition.terminal).collect(),
            next_states: if include_next_states {
                Some(slots.iter().map(|s| self.next_state(s)).collect())
            } else {
                None
            },
            next_internals: if include_next_internals {
                Some(slots.iter().map(|s| self.next_internal(s)).collect())
            } else {
                None
            },
            horizons: vec![1; slots.len()],
            weights,
            indices: Some(ixs),
        }
    }

    /// Slots of all entries, oldest first.
    fn chronological_slots(&self) -> Vec<usize> {
        let mut seqs = self.index.keys().cloned().collect::<Vec<_>>();
        seqs.sort_unstable();
        seqs.iter().map(|seq| self.index[seq]).collect()
    }

    /// Contents of the memory, oldest first.
    pub fn snapshot(&self) -> MemorySnapshot {
        let chronological = self.chronological_slots();
        let entries = chronological
            .iter()
            .map(|&ix| {
                let slot = &self.slots[ix];
                let successor = if slot.transition.terminal || self.index.contains_key(&(slot.seq + 1)) {
                    None
                } else {
                    slot.successor.clone()
                };
                SnapshotEntry {
                    transition: slot.transition.clone(),
                    successor,
                    priority: self.per_state.as_ref().map(|per| per.sum_tree.priority(ix)),
                }
            })
            .collect();
        MemorySnapshot { entries }
    }

    /// Replaces the contents of the memory with a snapshot.
    ///
    /// Entries beyond the capacity are evicted as in live insertion. Priorities
    /// are restored as priorities of entries not yet seen by an update.
    pub fn restore(&mut self, snapshot: MemorySnapshot) {
        self.clear();
        let mut priorities = Vec::with_capacity(snapshot.entries.len());
        for entry in snapshot.entries {
            self.add(entry.transition);
            let seq = self.next_seq - 1;
            if let Some(&ix) = self.index.get(&seq) {
                self.slots[ix].successor = entry.successor;
            }
            priorities.push((seq, entry.priority));
        }

        let staged = self.staged_slot();
        if let Some(per) = &mut self.per_state {
            for (seq, priority) in priorities {
                match (self.index.get(&seq), priority) {
                    (Some(&ix), Some(p)) if Some(ix) != staged && p > 0.0 => {
                        per.sum_tree.insert(ix, p)
                    }
                    _ => {}
                }
            }
        }
    }
}

impl Memory for ReplayMemory {
    fn add(&mut self, transition: Transition) {
        if let Some(staged) = self.staged_slot() {
            if let Some(per) = &mut self.per_state {
                let p = per.sum_tree.max();
                per.sum_tree.insert(staged, p);
            }
        }

        let seq = self.next_seq;
        let terminal = transition.terminal;
        let slot = Slot {
            seq,
            transition,
            successor: None,
        };
        let ix = if self.slots.len() < self.capacity {
            self.slots.push(slot);
            self.slots.len() - 1
        } else {
            let ix = self.evict();
            self.slots[ix] = slot;
            ix
        };
        self.index.insert(seq, ix);
        self.next_seq += 1;

        if let Some(per) = &mut self.per_state {
            if terminal {
                let p = per.sum_tree.max();
                per.sum_tree.insert(ix, p);
            } else {
                per.sum_tree.disable(ix);
            }
        }
    }

    fn len(&self) -> usize {
        self.slots.len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn is_prioritized(&self) -> bool {
        self.per_state.is_some()
    }

    fn get_batch(
        &mut self,
        size: usize,
        include_next_states: bool,
        include_next_internals: bool,
    ) -> Result<TransitionBatch> {
        let (ixs, weights) = self.sample_slots(size, include_next_states || include_next_internals)?;
        Ok(self.make_batch(ixs, weights, include_next_states, include_next_internals))
    }

    fn get_nstep_batch(
        &mut self,
        size: usize,
        n_step: usize,
        discount: f32,
        include_next_internals: bool,
    ) -> Result<TransitionBatch> {
        let n_step = n_step.max(1);
        let (ixs, weights) = self.sample_slots(size, true)?;
        let mut batch = self.make_batch(ixs.clone(), weights, true, include_next_internals);
        let staged = self.staged_slot();

        for (i, &start) in ixs.iter().enumerate() {
            let mut last = start;
            let mut reward = 0.0;
            let mut k = 0;
            loop {
                let t = &self.slots[last].transition;
                reward += discount.powi(k as i32) * t.reward;
                k += 1;
                if t.terminal || k == n_step {
                    break;
                }
                // The window continues through stored successors that are complete themselves.
                match self.index.get(&(self.slots[last].seq + 1)) {
                    Some(&next) if Some(next) != staged && self.slots[last].successor.is_none() => {
                        last = next
                    }
                    _ => break,
                }
            }
            let last_slot = &self.slots[last];
            batch.rewards[i] = reward;
            batch.terminals[i] = last_slot.transition.terminal;
            batch.horizons[i] = k;
            if let Some(next_states) = batch.next_states.as_mut() {
                next_states[i] = self.next_state(last_slot);
            }
            if let Some(next_internals) = batch.next_internals.as_mut() {
                next_internals[i] = self.next_internal(last_slot);
            }
        }
        Ok(batch)
    }

    fn sequence(
        &self,
        include_next_states: bool,
        include_next_internals: bool,
    ) -> Result<TransitionBatch> {
        let mut ixs = self.chronological_slots();
        if include_next_states || include_next_internals {
            if let Some(staged) = self.staged_slot() {
                ixs.retain(|&ix| ix != staged);
            }
        }
        let mut batch = self.make_batch(ixs, None, include_next_states, include_next_internals);
        batch.indices = None;
        Ok(batch)
    }

    fn update_priorities(&mut self, indices: &[usize], priorities: &[f32]) {
        let staged = self.staged_slot();
        let n_slots = self.slots.len();
        if let Some(per) = &mut self.per_state {
            for (&ix, &p) in indices.iter().zip(priorities.iter()) {
                if ix >= n_slots || Some(ix) == staged {
                    continue;
                }
                if !p.is_finite() {
                    warn!("Ignored non-finite priority {} for slot {}", p, ix);
                    continue;
                }
                per.sum_tree.update(ix, p);
            }
        }
    }

    fn clear(&mut self) {
        self.slots.clear();
        self.index.clear();
        self.next_seq = 0;
        self.oldest_seq = 0;
        if let Some(per) = &mut self.per_state {
            per.sum_tree.clear();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{error::ReinError, Action};

    fn transition(i: usize, reward: f32, terminal: bool) -> Transition {
        Transition::new(State::single(vec![i as f32]), Action::discrete(0), reward, terminal)
    }

    fn state_id(state: &State) -> usize {
        state.components()[0][0] as usize
    }

    fn per_memory(capacity: usize, per_config: PerConfig) -> ReplayMemory {
        ReplayMemory::build(
            &ReplayMemoryConfig::default()
                .capacity(capacity)
                .per_config(Some(per_config)),
        )
    }

    #[test]
    fn test_next_states_follow_chronology() {
        let mut memory = ReplayMemory::build(&ReplayMemoryConfig::default().capacity(15));
        for i in 0..40 {
            memory.add(transition(i, 0.0, i % 7 == 6));
        }
        assert!(memory.get_batch(15, true, false).is_err());
        let batch = memory.get_batch(14, true, false).unwrap();
        let next_states = batch.next_states.as_ref().unwrap();

        for i in 0..batch.len() {
            let id = state_id(&batch.states[i]);
            assert!(id >= 25 && id < 39, "stale or staged entry {}", id);
            if batch.terminals[i] {
                assert_eq!(next_states[i], batch.states[i]);
            } else {
                assert_eq!(state_id(&next_states[i]), id + 1);
            }
        }
    }

    #[test]
    fn test_capacity_error() {
        let mut memory = ReplayMemory::build(&ReplayMemoryConfig::default());
        for i in 0..3 {
            memory.add(transition(i, 0.0, false));
        }
        assert_eq!(
            memory.get_batch(3, true, false),
            Err(ReinError::CapacityError {
                requested: 3,
                available: 2
            })
        );
        assert_eq!(memory.get_batch(3, false, false).unwrap().len(), 3);
        assert!(memory.get_batch(4, false, false).is_err());
    }

    #[test]
    fn test_sequence_excludes_staged_entry() {
        let mut memory = ReplayMemory::build(&ReplayMemoryConfig::default());
        for i in 0..5 {
            memory.add(transition(i, i as f32, false));
        }
        let all = memory.sequence(false, false).unwrap();
        assert_eq!(all.rewards, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        assert!(all.indices.is_none());

        let complete = memory.sequence(true, false).unwrap();
        assert_eq!(complete.rewards, vec![0.0, 1.0, 2.0, 3.0]);
        let next_states = complete.next_states.unwrap();
        assert_eq!(state_id(&next_states[3]), 4);

        memory.clear();
        assert!(memory.is_empty());
        assert!(memory.sequence(true, true).unwrap().is_empty());
    }

    #[test]
    fn test_prioritized_sampling_frequencies() {
        let per_config = PerConfig::default().alpha(1.0).epsilon(0.0).beta_0(1.0);
        let mut memory = per_memory(4, per_config);
        for i in 0..4 {
            memory.add(transition(i, 0.0, true));
        }
        memory.update_priorities(&[0, 1, 2, 3], &[0.0, 1.0, 1.0, 2.0]);

        let mut counts = [0usize; 4];
        let n_batches = 5000;
        for _ in 0..n_batches {
            let batch = memory.get_batch(4, true, false).unwrap();
            let ixs = batch.indices.as_ref().unwrap();
            let weights = batch.weights.as_ref().unwrap();
            ixs.iter().for_each(|&ix| counts[ix] += 1);

            // Weights are (N P(i))^-beta normalized by the batch maximum.
            let w_max = ixs
                .iter()
                .map(|&ix| if ix == 3 { 0.5 } else { 1.0 })
                .fold(0.0f32, f32::max);
            for (&ix, &w) in ixs.iter().zip(weights.iter()) {
                let expected = (if ix == 3 { 0.5 } else { 1.0 }) / w_max;
                assert!((w - expected).abs() < 1e-5);
            }
        }
        let freq = |ix: usize| counts[ix] as f32 / (4 * n_batches) as f32;

        assert_eq!(counts[0], 0);
        assert!((freq(1) - 0.25).abs() < 0.02);
        assert!((freq(3) - 0.5).abs() < 0.02);
    }

    #[test]
    fn test_beta_follows_sampled_batches() {
        let per_config = PerConfig::default()
            .alpha(1.0)
            .epsilon(0.0)
            .beta_0(0.0)
            .beta_final(1.0)
            .beta_batches(2);
        let mut memory = per_memory(2, per_config);
        for i in 0..2 {
            memory.add(transition(i, 0.0, true));
        }
        for _ in 0..10 {
            memory.update_priorities(&[0, 1], &[1.0, 3.0]);
        }
        let batch = memory.get_batch(8, true, false).unwrap();
        assert!(batch.weights.unwrap().iter().all(|&w| w == 1.0));

        memory.get_batch(8, true, false).unwrap();
        let batch = memory.get_batch(64, true, false).unwrap();
        let ixs = batch.indices.unwrap();
        let weights = batch.weights.unwrap();
        assert!(ixs.contains(&0) && ixs.contains(&1));
        for (&ix, &w) in ixs.iter().zip(weights.iter()) {
            let expected = if ix == 0 { 1.0 } else { 1.0 / 3.0 };
            assert!((w - expected).abs() < 1e-5, "ix={} w={}", ix, w);
        }
    }

    #[test]
    fn test_staged_entry_is_not_sampled() {
        let mut memory = per_memory(10, PerConfig::default());
        memory.add(transition(0, 0.0, false));
        assert!(memory.get_batch(1, false, false).is_err());

        memory.add(transition(1, 0.0, false));
        assert!(memory.get_batch(2, false, false).is_err());
        for _ in 0..50 {
            let batch = memory.get_batch(1, true, false).unwrap();
            assert_eq!(batch.indices.unwrap(), vec![0]);
        }

        // Priorities of the staged entry are ignored.
        memory.update_priorities(&[1], &[100.0]);
        let batch = memory.get_batch(1, false, false).unwrap();
        assert_eq!(state_id(&batch.states[0]), 0);

        memory.add(transition(2, 0.0, true));
        assert_eq!(memory.get_batch(3, true, false).unwrap().len(), 3);
    }

    #[test]
    fn test_non_finite_priorities_are_ignored() {
        let mut memory = per_memory(4, PerConfig::default().alpha(1.0).epsilon(0.0));
        for i in 0..2 {
            memory.add(transition(i, 0.0, true));
        }
        memory.update_priorities(&[0, 1], &[f32::NAN, 1.0]);
        memory.update_priorities(&[1], &[f32::INFINITY]);
        let snapshot = memory.snapshot();
        assert_eq!(snapshot.entries[0].priority, Some(1.0));
        assert_eq!(snapshot.entries[1].priority, Some(1.0));
    }

    #[test]
    fn test_lowest_priority_eviction() {
        let mut memory = per_memory(3, PerConfig::default().alpha(1.0));
        for i in 0..3 {
            memory.add(transition(i, 0.0, true));
        }
        memory.update_priorities(&[0, 1, 2], &[3.0, 1.0, 2.0]);
        memory.add(transition(3, 0.0, true));

        let ids = memory
            .snapshot()
            .entries
            .iter()
            .map(|e| state_id(&e.transition.state))
            .collect::<Vec<_>>();
        assert_eq!(ids, vec![0, 2, 3]);

        // Entries not yet seen by an update are not evicted before seen ones.
        memory.add(transition(4, 0.0, true));
        let ids = memory
            .snapshot()
            .entries
            .iter()
            .map(|e| state_id(&e.transition.state))
            .collect::<Vec<_>>();
        assert_eq!(ids, vec![0, 3, 4]);
    }

    #[test]
    fn test_evicted_successor_is_kept() {
        let per_config = PerConfig::default().alpha(1.0);
        let mut memory = per_memory(3, per_config);
        for i in 0..3 {
            memory.add(transition(i, 0.0, false));
        }
        memory.update_priorities(&[0, 1], &[5.0, 0.1]);
        memory.add(transition(3, 0.0, true));

        // Entry 1 was evicted, entry 0 still knows its next state.
        let batch = memory.sequence(true, false).unwrap();
        let ids = batch.states.iter().map(state_id).collect::<Vec<_>>();
        let next_ids = batch
            .next_states
            .unwrap()
            .iter()
            .map(state_id)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec![0, 2, 3]);
        assert_eq!(next_ids, vec![1, 3, 3]);
    }

    #[test]
    fn test_nstep_batch() {
        let mut memory = ReplayMemory::build(&ReplayMemoryConfig::default());
        for i in 0..6 {
            memory.add(transition(i, 1.0, i == 3));
        }
        let mut seen = [false; 5];
        for _ in 0..100 {
            let batch = memory.get_nstep_batch(5, 3, 0.5, false).unwrap();
            let next_states = batch.next_states.as_ref().unwrap();

            for i in 0..batch.len() {
                seen[state_id(&batch.states[i])] = true;
                let (reward, terminal, horizon, next) = match state_id(&batch.states[i]) {
                    0 => (1.75, false, 3, 3),
                    1 => (1.75, true, 3, 3),
                    2 => (1.5, true, 2, 3),
                    3 => (1.0, true, 1, 3),
                    4 => (1.0, false, 1, 5),
                    id => panic!("unexpected entry {}", id),
                };
                assert!((batch.rewards[i] - reward).abs() < 1e-6);
                assert_eq!(batch.terminals[i], terminal);
                assert_eq!(batch.horizons[i], horizon);
                assert_eq!(state_id(&next_states[i]), next);
            }
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn test_import_beyond_capacity() {
        let mut memory = ReplayMemory::build(&ReplayMemoryConfig::default().capacity(50));
        memory.import((0..100).map(|i| transition(i, 0.0, i % 10 == 9)).collect());
        assert_eq!(memory.len(), 50);
        let ids = memory
            .sequence(false, false)
            .unwrap()
            .states
            .iter()
            .map(state_id)
            .collect::<Vec<_>>();
        assert_eq!(ids, (50..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_snapshot_restore() {
        let mut memory = per_memory(5, PerConfig::default());
        for i in 0..8 {
            memory.add(transition(i, i as f32, i == 4));
        }
        memory.update_priorities(&[0, 1], &[0.5, 2.0]);
        let snapshot = memory.snapshot();

        let yaml = serde_yaml::to_string(&snapshot).unwrap();
        let snapshot: MemorySnapshot = serde_yaml::from_str(&yaml).unwrap();
        let mut restored = per_memory(5, PerConfig::default());
        restored.restore(snapshot.clone());

        assert_eq!(restored.len(), memory.len());
        assert_eq!(
            restored.sequence(true, false).unwrap(),
            memory.sequence(true, false).unwrap()
        );
        let restored_snapshot = restored.snapshot();
        for (a, b) in restored_snapshot.entries.iter().zip(snapshot.entries.iter()) {
            assert_eq!(a.transition, b.transition);
            let (pa, pb) = (a.priority.unwrap(), b.priority.unwrap());
            assert!((pa - pb).abs() < 1e-3, "{} != {}", pa, pb);
        }
    }
}
