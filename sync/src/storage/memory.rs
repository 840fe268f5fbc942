//! In-memory storage tier.
//!
//! Backs tests, the session tier of the binary, and models privacy mode:
//! an unavailable tier rejects every call.

use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use tracing::trace;

use super::{StorageError, StorageTier};

/// In-memory implementation of [`StorageTier`].
#[derive(Debug)]
pub struct MemoryStorage {
    name: String,
    entries: DashMap<String, String>,
    available: AtomicBool,
    /// Maximum number of keys, if bounded
    max_keys: Option<usize>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::named("memory")
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: DashMap::new(),
            available: AtomicBool::new(true),
            max_keys: None,
        }
    }

    /// A tier that rejects all access.
    pub fn unavailable(name: impl Into<String>) -> Self {
        let storage = Self::named(name);
        storage.available.store(false, Ordering::SeqCst);
        storage
    }

    /// A tier that holds at most `max_keys` keys.
    pub fn with_max_keys(mut self, max_keys: usize) -> Self {
        self.max_keys = Some(max_keys);
        self
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.is_available() {
            Ok(())
        } else {
            Err(StorageError::Unavailable(self.name.clone()))
        }
    }
}

impl StorageTier for MemoryStorage {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.check()?;
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.check()?;
        if let Some(max) = self.max_keys {
            if !self.entries.contains_key(key) && self.entries.len() >= max {
                return Err(StorageError::QuotaExceeded(key.to_string()));
            }
        }
        trace!(tier = %self.name, key = %key, bytes = value.len(), "set");
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.check()?;
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_remove() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.get("k").unwrap(), None);

        storage.set("k", "v").unwrap();
        assert_eq!(storage.get("k").unwrap().as_deref(), Some("v"));
        assert_eq!(storage.len(), 1);

        storage.remove("k").unwrap();
        assert!(storage.is_empty());
    }

    #[test]
    fn unavailable_rejects_everything() {
        let storage = MemoryStorage::unavailable("session");
        assert!(!storage.is_available());
        assert_eq!(
            storage.get("k"),
            Err(StorageError::Unavailable("session".into()))
        );
        assert!(storage.set("k", "v").is_err());
        assert!(storage.remove("k").is_err());

        storage.set_available(true);
        assert!(storage.set("k", "v").is_ok());
    }

    #[test]
    fn quota_applies_to_new_keys_only() {
        let storage = MemoryStorage::new().with_max_keys(1);
        storage.set("a", "1").unwrap();
        storage.set("a", "2").unwrap();
        assert_eq!(
            storage.set("b", "1"),
            Err(StorageError::QuotaExceeded("b".into()))
        );
    }
}
