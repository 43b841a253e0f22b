//! Structured error types for the physalia toolkit.

use thiserror::Error;

/// Unified error type for all physalia operations.
#[derive(Debug, Error)]
pub enum PhysaliaError {
    /// Parse error (malformed input data)
    #[error("parse error: {0}")]
    Parse(String),

    /// Invalid input (bad arguments, out-of-range values, stale node ids)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A statistic whose value is undefined for the given tree
    /// (empty sample, zero denominator, single-leaf diversity, ...)
    #[error("undefined statistic: {0}")]
    Undefined(String),

    /// Catch-all for other errors
    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the physalia toolkit.
pub type Result<T> = std::result::Result<T, PhysaliaError>;
