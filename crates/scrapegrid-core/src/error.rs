//! Config error types.

use thiserror::Error;

/// Result type alias for config loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while reading or validating a scrapegrid config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
