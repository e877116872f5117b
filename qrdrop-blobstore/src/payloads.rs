//! Payload backends.
//!
//! The index lives in DuckDB; payload bytes live behind a [`PayloadStore`].
//! Ids are validated by the caller before they reach a backend.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use qrdrop_crypto::is_valid_file_id;
use tempfile::NamedTempFile;

/// Byte storage keyed by file id.
pub trait PayloadStore: Send + Sync {
    /// Writes the payload for `id`. Readers never observe a partial write.
    fn write(&self, id: &str, bytes: &[u8]) -> io::Result<()>;

    /// Reads the payload for `id`, `None` if absent.
    fn read(&self, id: &str) -> io::Result<Option<Vec<u8>>>;

    /// Removes the payload for `id`. Returns whether anything was removed.
    fn remove(&self, id: &str) -> io::Result<bool>;

    fn exists(&self, id: &str) -> io::Result<bool>;

    /// All ids that currently have a payload.
    fn list_ids(&self) -> io::Result<Vec<String>>;
}

// ============================================================================
// DiskPayloads
// ============================================================================

/// One file per id inside a directory.
///
/// Writes go to a temp file in the same directory and are renamed into
/// place, so a crash mid-write leaves only a stray temp file.
pub struct DiskPayloads {
    dir: PathBuf,
}

impl DiskPayloads {
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(id)
    }
}

impl PayloadStore for DiskPayloads {
    fn write(&self, id: &str, bytes: &[u8]) -> io::Result<()> {
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.path_for(id)).map_err(|e| e.error)?;
        Ok(())
    }

    fn read(&self, id: &str) -> io::Result<Option<Vec<u8>>> {
        match fs::read(self.path_for(id)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn remove(&self, id: &str) -> io::Result<bool> {
        match fs::remove_file(self.path_for(id)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn exists(&self, id: &str) -> io::Result<bool> {
        self.path_for(id).try_exists()
    }

    fn list_ids(&self) -> io::Result<Vec<String>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            // Temp files (".tmpXXXX") and foreign files are not payloads.
            if let Some(name) = entry.file_name().to_str() {
                if is_valid_file_id(name) {
                    ids.push(name.to_string());
                }
            }
        }
        Ok(ids)
    }
}

// ============================================================================
// MemoryPayloads
// ============================================================================

/// Process-local payload map. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryPayloads {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryPayloads {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> io::Error {
    io::Error::other(e.to_string())
}

impl PayloadStore for MemoryPayloads {
    fn write(&self, id: &str, bytes: &[u8]) -> io::Result<()> {
        self.blobs
            .write()
            .map_err(poisoned)?
            .insert(id.to_string(), bytes.to_vec());
        Ok(())
    }

    fn read(&self, id: &str) -> io::Result<Option<Vec<u8>>> {
        Ok(self.blobs.read().map_err(poisoned)?.get(id).cloned())
    }

    fn remove(&self, id: &str) -> io::Result<bool> {
        Ok(self.blobs.write().map_err(poisoned)?.remove(id).is_some())
    }

    fn exists(&self, id: &str) -> io::Result<bool> {
        Ok(self.blobs.read().map_err(poisoned)?.contains_key(id))
    }

    fn list_ids(&self) -> io::Result<Vec<String>> {
        Ok(self.blobs.read().map_err(poisoned)?.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(store: &dyn PayloadStore) {
        assert_eq!(store.read("abc").unwrap(), None);
        assert!(!store.exists("abc").unwrap());

        store.write("abc", b"one").unwrap();
        store.write("abc", b"two").unwrap();
        assert_eq!(store.read("abc").unwrap().as_deref(), Some(&b"two"[..]));
        assert!(store.exists("abc").unwrap());
        assert_eq!(store.list_ids().unwrap(), vec!["abc".to_string()]);

        assert!(store.remove("abc").unwrap());
        assert!(!store.remove("abc").unwrap());
        assert!(store.list_ids().unwrap().is_empty());
    }

    #[test]
    fn memory_backend() {
        exercise(&MemoryPayloads::new());
    }

    #[test]
    fn disk_backend() {
        let dir = tempfile::tempdir().unwrap();
        exercise(&DiskPayloads::new(dir.path().join("blobs")).unwrap());
    }

    #[test]
    fn disk_listing_skips_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskPayloads::new(dir.path()).unwrap();
        fs::write(dir.path().join(".tmpA1b2C3"), b"partial").unwrap();
        store.write("real_id", b"data").unwrap();
        assert_eq!(store.list_ids().unwrap(), vec!["real_id".to_string()]);
    }
}
