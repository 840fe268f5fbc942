//! Key-value storage tiers.
//!
//! A tier is a synchronous string store. Three roles exist: a session tier
//! cleared when the session ends, a durable tier, and the cookie jar holding
//! the guest session id. Any tier may be unavailable (privacy mode, quota).

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use std::sync::Arc;
use thiserror::Error;

/// Errors from a storage tier.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The tier refuses all access
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// The tier is full
    #[error("storage quota exceeded writing {0}")]
    QuotaExceeded(String),

    /// I/O failure
    #[error("storage I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

/// A synchronous string key-value store.
pub trait StorageTier: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Whether the tier currently accepts reads and writes.
    fn is_available(&self) -> bool;

    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// The tiers one engine instance persists through.
#[derive(Clone)]
pub struct StorageTiers {
    /// Cleared at session end; preferred for guest carts
    pub session: Arc<dyn StorageTier>,
    /// Survives restarts; user carts and the last-user pointer
    pub durable: Arc<dyn StorageTier>,
    /// Holds the guest session cookie
    pub cookies: Arc<dyn StorageTier>,
}

impl StorageTiers {
    pub fn new(
        session: Arc<dyn StorageTier>,
        durable: Arc<dyn StorageTier>,
        cookies: Arc<dyn StorageTier>,
    ) -> Self {
        Self {
            session,
            durable,
            cookies,
        }
    }

    /// Fresh in-memory tiers.
    pub fn memory() -> Self {
        Self::new(
            Arc::new(MemoryStorage::named("session")),
            Arc::new(MemoryStorage::named("durable")),
            Arc::new(MemoryStorage::named("cookies")),
        )
    }
}

impl std::fmt::Debug for StorageTiers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageTiers")
            .field("session", &self.session.name())
            .field("durable", &self.durable.name())
            .field("cookies", &self.cookies.name())
            .finish()
    }
}
