//! Scrape error types.

use thiserror::Error;

/// Errors that can occur while sampling a target.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("scrape failed: {0}")]
    Transport(String),

    #[error("target returned HTTP {0}")]
    Status(u16),

    #[error("scrape timed out")]
    Timeout,

    #[error("invalid exposition at line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("unsupported target url: {0}")]
    Unsupported(String),
}
