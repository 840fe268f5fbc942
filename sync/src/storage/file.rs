//! File-backed durable storage tier: one file per key under a directory.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use super::{StorageError, StorageTier};

/// Durable [`StorageTier`] writing `<dir>/<encoded key>.json`.
///
/// Writes go to a uniquely named temporary file first and are renamed into
/// place, so a reader never observes a half-written value and concurrent
/// writers never share a temporary file.
#[derive(Debug, Clone)]
pub struct FileStorage {
    name: String,
    dir: PathBuf,
}

impl FileStorage {
    /// Open (and create if needed) a storage directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        debug!(dir = %dir.display(), "Opened file storage");
        Ok(Self {
            name: "file".to_string(),
            dir,
        })
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", urlencoding::encode(key)))
    }
}

impl StorageTier for FileStorage {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_available(&self) -> bool {
        self.dir.is_dir()
    }

    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(value.as_bytes())?;
        tmp.persist(self.path_for(key)).map_err(|e| e.error)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn set_get_remove() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();

        assert_eq!(storage.get("cart:guest:abc").unwrap(), None);
        storage.set("cart:guest:abc", r#"{"items":[]}"#).unwrap();
        assert_eq!(
            storage.get("cart:guest:abc").unwrap().as_deref(),
            Some(r#"{"items":[]}"#)
        );

        storage.remove("cart:guest:abc").unwrap();
        assert_eq!(storage.get("cart:guest:abc").unwrap(), None);
        storage.remove("cart:guest:abc").unwrap();
    }

    #[test]
    fn values_survive_reopen() {
        let dir = TempDir::new().unwrap();
        FileStorage::open(dir.path())
            .unwrap()
            .set("cart:user:1", "x")
            .unwrap();

        let reopened = FileStorage::open(dir.path()).unwrap();
        assert_eq!(reopened.get("cart:user:1").unwrap().as_deref(), Some("x"));
    }

    #[test]
    fn keys_are_encoded_as_safe_file_names() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();
        assert_eq!(
            storage.path_for("cart:user:a/b?x=1"),
            dir.path().join("cart%3Auser%3Aa%2Fb%3Fx%3D1.json")
        );
        assert_eq!(storage.path_for("cart_sid"), dir.path().join("cart_sid.json"));

        storage.set("cart:user:a/b", "v").unwrap();
        assert_eq!(storage.get("cart:user:a/b").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn concurrent_writers_leave_one_complete_value() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();
        let values: Vec<String> = (0..8).map(|i| format!("{i}").repeat(4096)).collect();

        std::thread::scope(|scope| {
            for value in &values {
                let storage = storage.clone();
                scope.spawn(move || {
                    for _ in 0..20 {
                        storage.set("cart:guest:abc", value).unwrap();
                    }
                });
            }
        });

        let stored = storage.get("cart:guest:abc").unwrap().unwrap();
        assert!(values.contains(&stored));
        // No temporary files left behind
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn missing_directory_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::open(dir.path().join("carts")).unwrap();
        assert!(storage.is_available());
        fs::remove_dir_all(storage.dir()).unwrap();
        assert!(!storage.is_available());
        assert!(storage.set("k", "v").is_err());
    }
}
