//! Reference networks.
//!
//! Small dense networks implementing [`Network`](crate::Network) on
//! [candle](candle_core). Flat parameters are viewed as candle tensors for each
//! call, and [`Network::backward`](crate::Network::backward) runs candle's
//! automatic differentiation. They are enough for low dimensional control tasks
//! and for testing update engines.
mod linear;
mod mlp;
mod recurrent;
pub use linear::Linear;
pub use mlp::Mlp;
pub use recurrent::Recurrent;
