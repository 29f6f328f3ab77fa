//! Agents implementing the act/observe protocol.
mod base;
mod config;
mod random;
pub use base::ModelAgent;
pub use config::{AgentConfig, TargetSyncConfig, UpdateTrigger};
pub use random::RandomAgent;
