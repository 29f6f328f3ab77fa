//! Replay memory.
//!
//! A [`ReplayMemory`] stores [`Transition`](crate::Transition)s and returns
//! batches of them for updates, either sampled uniformly, sampled in proportion
//! to priorities, or as the full chronological sequence for on-policy algorithms.
mod base;
mod batch;
mod config;
pub use base::{MemorySnapshot, ReplayMemory, SnapshotEntry, WeightNormalizer};
pub use batch::TransitionBatch;
pub use config::{EvictionPolicy, PerConfig, ReplayMemoryConfig};
