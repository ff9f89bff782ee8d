//! Coordinator error types.

use scrapegrid_core::ConfigError;
use thiserror::Error;

/// Result type alias for coordinator operations.
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

/// Errors that can occur while driving reconciliation.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("discovery error: {0}")]
    Discovery(String),

    #[error("shard manager error: {0}")]
    Manager(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
