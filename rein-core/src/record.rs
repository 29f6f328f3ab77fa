//! Types and traits for recording metrics of updates and episodes.
//!
//! Model updates return a [`Record`] with values such as `loss`, `grad_norm` or
//! `kl`, and the runner writes per-episode records to a [`Recorder`].
//!
//! ```rust
//! use rein_core::record::{Record, RecordValue};
//!
//! let mut record = Record::from_scalar("loss", 0.5);
//! record.insert("episode_length", RecordValue::Scalar(200.0));
//! assert_eq!(record.get_scalar("loss").unwrap(), 0.5);
//! ```
mod base;
mod buffered_recorder;
mod null_recorder;
mod recorder;

pub use base::{Record, RecordValue};
pub use buffered_recorder::BufferedRecorder;
pub use null_recorder::NullRecorder;
pub use recorder::Recorder;
