//! State-value baselines and advantage estimation for policy-gradient updates.
mod advantage;
mod base;
mod config;
mod linear;
mod multi;
mod network;
pub use advantage::{cumulative_discount, episode_timesteps, generalized_advantage, normalize};
pub use base::Baseline;
pub use config::{AdvantageConfig, BaselineConfig};
pub use linear::LinearBaseline;
pub use multi::MultiBaseline;
pub use network::NetworkBaseline;
