//! Transport-level error types.

use thiserror::Error;

use crate::request::JsonRpcError;

/// JSON-RPC "method not found".
pub const METHOD_NOT_FOUND: i64 = -32601;
/// JSON-RPC "invalid params".
pub const INVALID_PARAMS: i64 = -32602;
/// De-facto "limit exceeded" code used by most node providers.
pub const LIMIT_EXCEEDED: i64 = -32005;

/// Errors that can occur while talking to a chain node.
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP request failed (connection refused, reset, non-2xx status).
    #[error("HTTP error: {0}")]
    Http(String),

    /// JSON-RPC protocol-level error returned by the node.
    #[error("RPC error {}: {}", .0.code, .0.message)]
    Rpc(JsonRpcError),

    /// The provider asked us to slow down (HTTP 429).
    #[error("rate limit exceeded (provider: {provider})")]
    RateLimited { provider: String },

    /// Request timed out after the configured duration.
    #[error("request timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// The node answered, but not with what the method promises.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Response could not be deserialized.
    #[error("deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// Every attempt the retry policy allowed failed with a transient error.
    #[error("{method} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        method: String,
        attempts: u32,
        last: Box<TransportError>,
    },
}

impl TransportError {
    /// Returns `true` if this error is transient and the request may be retried.
    ///
    /// Node-side errors are retried unless they say the request itself is
    /// malformed (method not found, invalid params).
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) | Self::Timeout { .. } | Self::RateLimited { .. } => true,
            Self::Rpc(err) => !matches!(err.code, METHOD_NOT_FOUND | INVALID_PARAMS),
            _ => false,
        }
    }

    /// Returns `true` if the provider signalled rate limiting.
    pub fn is_rate_limit(&self) -> bool {
        match self {
            Self::RateLimited { .. } => true,
            Self::Rpc(err) => err.code == LIMIT_EXCEEDED,
            Self::RetriesExhausted { last, .. } => last.is_rate_limit(),
            _ => false,
        }
    }
}
