//! Error types for engine operations.
//!
//! "No data" is never an error: it is [`Lookup::NoData`](crate::models::Lookup).
//! These variants cover infrastructure failures only.

use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Infrastructure failures surfaced by the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The backing store returned an error.
    #[error("store error during {operation}: {source}")]
    Store {
        /// Store call that failed.
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// A store call exceeded its time budget.
    #[error("{operation} timed out after {after_ms} ms")]
    Timeout {
        /// Store call or sub-tree that timed out.
        operation: String,
        /// Budget that was exceeded.
        after_ms: u64,
    },

    /// The caller cancelled the request.
    #[error("{operation} cancelled")]
    Cancelled {
        /// Store call that was interrupted.
        operation: &'static str,
    },
}

impl EngineError {
    /// Machine-readable code used by the HTTP layer.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Store { .. } => "store_unavailable",
            EngineError::Timeout { .. } => "timeout",
            EngineError::Cancelled { .. } => "cancelled",
        }
    }
}
