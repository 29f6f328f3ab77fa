//! Core data types and the contracts between the agent and its collaborators.
mod agent;
mod env;
mod memory;
mod network;
mod spec;
mod step;
mod transition;
pub use agent::Agent;
pub use env::Env;
pub use memory::Memory;
pub use network::{Forward, Network};
pub use spec::{ActionSpec, EnvSpec, StateSpec};
pub use step::Step;
pub use transition::{Action, ActionValue, InternalState, State, Transition};
