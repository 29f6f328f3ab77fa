//! Asynchronous training with workers sharing one parameter store.
//!
//! # Threads
//! * Each [`Worker`] thread owns an agent and an environment. Its agent
//!   commits update steps to [`SharedParams`] and pulls the shared parameters
//!   every `sync_interval` steps.
//! * The [`Coordinator`] spawns the workers, hands out the global step budget
//!   and aggregates [`WorkerMessage`]s into a [`CoordinatorStat`].
//!
//! # Messages
//! * From [`Worker`] to [`Coordinator`]
//!   - `EpisodeFinished`, `UpdateSkipped`, `StepRejected`
//!   - `Finished` or `Failed` when the worker leaves its loop
mod coordinator;
mod messages;
mod shared_params;
mod sync_model;
mod worker;
pub use coordinator::{Coordinator, CoordinatorConfig, CoordinatorStat};
pub use messages::WorkerMessage;
pub use shared_params::{ParamStore, SharedParams};
pub use sync_model::SyncModel;
pub use worker::{worker_stats_fmt, Worker, WorkerStat};
