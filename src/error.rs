//! Relay error types.

use crate::storage::StorageError;
use thiserror::Error;

/// The overarching error type for settlement operations.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The fee-cell pool could not serve a lease even after a refill attempt.
    ///
    /// Non-fatal to the caller: settlement jobs hitting this are re-delayed
    /// and retried, but it must be alerted on since it means the paymaster
    /// funds are running dry upstream.
    #[error("fee cell pool exhausted: {waiting} waiting of {preset} preset")]
    ResourceExhaustion {
        /// Number of cells waiting in the pool at the time of the failure.
        waiting: usize,
        /// Configured preset pool size.
        preset: usize,
    },

    /// A remote node returned a structured error.
    ///
    /// The remote code and message are preserved verbatim for diagnosis.
    #[error("chain rpc error {code}: {message}")]
    ChainRpc {
        /// Error code as reported by the remote node.
        code: i64,
        /// Error message as reported by the remote node.
        message: String,
    },

    /// Malformed input rejected synchronously at the boundary.
    ///
    /// Validation failures never enter the queue.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Transport-level failure talking to a collaborator. Retried per job
    /// policy.
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// Errors from the queue store.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Payload (de)serialization failure.
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    /// An internal error occurred.
    #[error(transparent)]
    Internal(#[from] eyre::Error),
}

impl RelayError {
    /// Whether this error signals malformed input rather than a transient
    /// condition.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
