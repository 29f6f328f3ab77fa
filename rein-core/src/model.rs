//! Parameters and update engines.
//!
//! A [`Model`] owns the online (and target) [`ParamSet`] of a [`Network`](crate::Network)
//! and delegates the learning rule to an [`UpdateEngine`] selected by
//! [`AlgorithmConfig`]:
//!
//! * Q-learning: [`DqnEngine`] (with demonstration margins for DQFD),
//!   [`NafEngine`] and [`CategoricalDqnEngine`].
//! * Policy gradient: [`VpgEngine`], [`TrpoEngine`] and [`PpoEngine`].
mod base;
mod config;
mod conjugate_gradient;
mod engine;
mod optimizer;
mod params;
mod pg;
mod q;
pub use base::{
    BaselineTargets, Diagnostics, Model, ParamSync, ProposedStep, UpdateOutcome, UpdatePhase,
};
pub use config::{
    AlgorithmConfig, CategoricalDqnConfig, DqfdConfig, DqnConfig, NafConfig, PpoConfig,
    TrpoConfig, VpgConfig,
};
pub use conjugate_gradient::conjugate_gradient;
pub use engine::{
    clip_grad_norm, gradient_step, EngineContext, Objective, Requirements, StepProposal,
    UpdateBatch, UpdateEngine,
};
pub use optimizer::{Optimizer, OptimizerConfig};
pub use params::ParamSet;
pub use pg::{ppo_objective_terms, PolicySnapshot, PpoEngine, TrpoEngine, VpgEngine};
pub use q::{CategoricalDqnEngine, DqnEngine, NafEngine};
