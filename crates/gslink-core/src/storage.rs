//! Persistent blob storage abstraction
//!
//! A small named-blob store used to persist the reconnection endpoint list,
//! the per-machine region/cell hint, and (optionally) a persisted random
//! machine identity. Modeled as read/write of named blobs so deployments can
//! redirect storage to a database without the core caring.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::errors::{GsError, Result};

// ----------------------------------------------------------------------------
// Storage Trait
// ----------------------------------------------------------------------------

/// Result of reading a named blob; `bytes` is `None` when absent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedBlob {
    pub name: String,
    pub bytes: Option<Vec<u8>>,
}

/// Named-blob storage abstraction
pub trait BlobStorage: Send {
    /// Read several named blobs at once; absent names yield `bytes: None`
    fn read_named(&self, names: &[&str]) -> Vec<NamedBlob>;

    /// Write (create or replace) a named blob
    fn write_named(&mut self, name: &str, bytes: &[u8]) -> Result<()>;
}

/// Convenience: read a single named blob
pub fn read_one(storage: &dyn BlobStorage, name: &str) -> Option<Vec<u8>> {
    storage
        .read_named(&[name])
        .into_iter()
        .next()
        .and_then(|blob| blob.bytes)
}

// ----------------------------------------------------------------------------
// Memory Storage
// ----------------------------------------------------------------------------

/// In-memory storage implementation for testing and fallback
#[derive(Debug, Default)]
pub struct MemoryStorage {
    data: BTreeMap<String, Vec<u8>>,
}

impl MemoryStorage {
    /// Create a new memory storage instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl BlobStorage for MemoryStorage {
    fn read_named(&self, names: &[&str]) -> Vec<NamedBlob> {
        names
            .iter()
            .map(|name| NamedBlob {
                name: name.to_string(),
                bytes: self.data.get(*name).cloned(),
            })
            .collect()
    }

    fn write_named(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
        self.data.insert(name.to_string(), bytes.to_vec());
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// File Storage
// ----------------------------------------------------------------------------

/// Directory-backed storage: one file per blob
#[derive(Debug)]
pub struct FileStorage {
    directory: PathBuf,
}

impl FileStorage {
    /// Create a store rooted at `directory` (created on first write)
    pub fn new<P: Into<PathBuf>>(directory: P) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &PathBuf {
        &self.directory
    }
}

impl BlobStorage for FileStorage {
    fn read_named(&self, names: &[&str]) -> Vec<NamedBlob> {
        names
            .iter()
            .map(|name| NamedBlob {
                name: name.to_string(),
                bytes: std::fs::read(self.directory.join(name)).ok(),
            })
            .collect()
    }

    fn write_named(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
        std::fs::create_dir_all(&self.directory)
            .map_err(|e| GsError::storage(format!("create {}: {e}", self.directory.display())))?;
        let path = self.directory.join(name);
        std::fs::write(&path, bytes)
            .map_err(|e| GsError::storage(format!("write {}: {e}", path.display())))
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_storage_round_trip() {
        let mut storage = MemoryStorage::new();
        storage.write_named("cell-id-abc", b"14").unwrap();

        let blobs = storage.read_named(&["cell-id-abc", "missing"]);
        assert_eq!(blobs.len(), 2);
        assert_eq!(blobs[0].bytes.as_deref(), Some(b"14".as_slice()));
        assert_eq!(blobs[1].bytes, None);
    }

    #[test]
    fn test_read_one() {
        let mut storage = MemoryStorage::new();
        assert_eq!(read_one(&storage, "x"), None);
        storage.write_named("x", &[1, 2, 3]).unwrap();
        assert_eq!(read_one(&storage, "x"), Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_overwrite_replaces() {
        let mut storage = MemoryStorage::new();
        storage.write_named("x", b"old").unwrap();
        storage.write_named("x", b"new").unwrap();
        assert_eq!(read_one(&storage, "x"), Some(b"new".to_vec()));
        assert_eq!(storage.len(), 1);
    }
}
