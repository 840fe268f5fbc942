//! Error types for the cart engine.

use thiserror::Error;

/// All possible errors from the cart engine.
///
/// Most of the engine is total: identity, merge and stabilization never fail.
/// Errors only surface at the encoding boundaries.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Encoding errors
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("serialization failed: {0}")]
    Serialization(String),

    // Scope errors
    #[error("invalid scope: {0}")]
    InvalidScope(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
