//! Action distributions.
//!
//! A distribution turns a slice of raw network outputs into a probability
//! distribution over the values of one action component. [`PolicyHeads`]
//! lays one distribution per action component over the full output vector.
mod base;
mod beta;
mod categorical;
mod config;
mod gaussian;
mod heads;
pub use base::Distribution;
pub use beta::Beta;
pub use categorical::Categorical;
pub use config::{ActionDefault, ContinuousDistribution, DistributionConfig};
pub use gaussian::Gaussian;
pub use heads::PolicyHeads;
