//! Errors in the library.
use thiserror::Error;

/// Errors in the library.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReinError {
    /// The act/observe protocol was violated.
    #[error("Sequence error: {0}")]
    SequenceError(String),

    /// The memory holds fewer eligible transitions than requested.
    #[error("Capacity error: requested {requested} transitions, {available} available")]
    CapacityError {
        /// Requested batch size.
        requested: usize,

        /// Number of transitions that could be returned.
        available: usize,
    },

    /// A computed objective or step contains non-finite values.
    #[error("Numerical instability: {0}")]
    NumericalInstabilityError(String),

    /// A constrained update could not find an acceptable step.
    #[error("Constraint rejected: {0}")]
    ConstraintRejectedError(String),

    /// Inconsistent, out-of-range or unused configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Record key error.
    #[error("Record key error: {0}")]
    RecordKeyError(String),

    /// Record value type error.
    #[error("Record value type error: {0}")]
    RecordValueTypeError(String),

    /// Error of the tensor backend.
    #[error("Backend error: {0}")]
    BackendError(String),
}

impl From<candle_core::Error> for ReinError {
    fn from(e: candle_core::Error) -> Self {
        ReinError::BackendError(e.to_string())
    }
}

impl ReinError {
    /// Returns `true` for errors that skip a single update instead of stopping training.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ReinError::NumericalInstabilityError(_) | ReinError::ConstraintRejectedError(_)
        )
    }
}

/// Result type of the core operations.
pub type Result<T> = std::result::Result<T, ReinError>;
