//! Shard RPC error types.

use thiserror::Error;

/// Result type alias for shard operations.
pub type ShardResult<T> = Result<T, ShardError>;

/// Errors that can occur while talking to a shard or its replicas.
#[derive(Debug, Error)]
pub enum ShardError {
    #[error("connection to {address} failed: {reason}")]
    Transport { address: String, reason: String },

    #[error("{address} returned {status}: {message}")]
    Status {
        address: String,
        status: u16,
        message: String,
    },

    #[error("failed to decode response from {address}: {reason}")]
    Decode { address: String, reason: String },

    #[error("request to {address} timed out")]
    Timeout { address: String },

    #[error("all {count} replicas failed, last error: {last}")]
    AllReplicasFailed { count: usize, last: String },

    #[error("shard has no replicas")]
    NoReplicas,
}
