#![warn(missing_docs)]
//! Core of a reinforcement learning agent framework.
//!
//! An [`Agent`] interacts with an [`Env`] through the act/observe protocol.
//! [`agent::ModelAgent`] stores completed [`Transition`]s in a
//! [`memory::ReplayMemory`] and updates a [`model::Model`] with one of the
//! update engines of [`model::AlgorithmConfig`]: DQN, DQFD, NAF, categorical
//! DQN, VPG, TRPO or PPO. Networks are supplied through the [`Network`] trait.
pub mod agent;
pub mod baseline;
pub mod distribution;
pub mod dummy;
pub mod error;
pub mod exploration;
pub mod memory;
pub mod model;
pub mod network;
pub mod preprocessing;
pub mod record;
pub mod runner;
pub mod util;

mod base;
pub use base::{
    Action, ActionSpec, ActionValue, Agent, Env, EnvSpec, Forward, InternalState, Memory,
    Network, State, StateSpec, Step, Transition,
};
