//! Unified error handling for the cart runtime.
//!
//! Most failures here are soft: storage, remote and auth problems are logged
//! and swallowed inside the engine. These types surface only at the edges
//! (startup, malformed input handed to the public API).

use crate::auth::AuthError;
use crate::config::ConfigError;
use crate::remote::RemoteError;
use crate::storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Engine error: {0}")]
    Engine(#[from] cart_engine::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid line: {0}")]
    InvalidLine(String),

    #[error("Engine is shut down")]
    ShutDown,
}

/// Result type alias for the runtime.
pub type Result<T> = std::result::Result<T, SyncError>;
