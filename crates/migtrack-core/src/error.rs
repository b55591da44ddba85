//! Error types for the migration indexing pipeline.

use thiserror::Error;

/// Errors that abort (part of) a sync pass or a store operation.
#[derive(Debug, Error)]
pub enum IndexerError {
    /// The chain node could not be reached after the gateway's retries.
    #[error("remote error: {0}")]
    Remote(String),

    /// The store is unreachable or rejected a write for a reason other than
    /// the expected duplicate key.
    #[error("storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("sync aborted: {reason}")]
    Aborted { reason: String },
}

impl IndexerError {
    /// Returns `true` if the error came from the remote node (the next pass may succeed).
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Remote(_))
    }
}

/// A single log could not be turned into a `MigrationEvent`.
///
/// Decode errors are per-log: they are collected and reported, never fatal
/// to the surrounding batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("log has no event signature topic")]
    MissingSignature,

    #[error("unrecognised event signature {topic0}")]
    UnknownSignature { topic0: String },

    #[error("expected at least {expected} topics, got {actual}")]
    TooFewTopics { expected: usize, actual: usize },

    #[error("invalid hex in {field}: {reason}")]
    InvalidHex { field: String, reason: String },

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("log was removed by a reorg")]
    Removed,
}
