//! In-memory artifact store using `DashMap`.
//!
//! Contents are lost on process restart.

use dashmap::DashMap;

use super::{segments, ArtifactStore};
use crate::{Error, Result};

/// Artifact store on a lock-free concurrent hashmap.
///
/// Locations are normalized (`a//b/./c` and `a/b/c` are the same blob).
///
/// # Example
///
/// ```rust
/// use trueno_track::artifact::{ArtifactStore, MemoryArtifactStore};
///
/// let store = MemoryArtifactStore::new();
/// store.save("runs/1/model.bin", b"weights")?;
/// assert_eq!(store.load("runs/1/model.bin")?, b"weights".to_vec());
/// # Ok::<(), trueno_track::Error>(())
/// ```
pub struct MemoryArtifactStore {
    blobs: DashMap<String, Vec<u8>>,
}

impl MemoryArtifactStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            blobs: DashMap::new(),
        }
    }

    /// Number of stored blobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    /// Check if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    fn normalize(location: &str) -> Result<String> {
        Ok(segments(location)?.join("/"))
    }
}

impl Default for MemoryArtifactStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn save(&self, location: &str, bytes: &[u8]) -> Result<()> {
        self.blobs.insert(Self::normalize(location)?, bytes.to_vec());
        Ok(())
    }

    fn load(&self, location: &str) -> Result<Vec<u8>> {
        let key = Self::normalize(location)?;
        self.blobs
            .get(&key)
            .map(|blob| blob.value().clone())
            .ok_or_else(|| Error::not_found(format!("artifact '{key}'")))
    }

    fn exists(&self, location: &str) -> Result<bool> {
        Ok(self.blobs.contains_key(&Self::normalize(location)?))
    }

    fn delete(&self, location: &str) -> Result<()> {
        self.blobs.remove(&Self::normalize(location)?);
        Ok(())
    }

    fn delete_prefix(&self, location: &str) -> Result<()> {
        let prefix = Self::normalize(location)?;
        let nested = format!("{prefix}/");
        self.blobs
            .retain(|key, _| key != &prefix && !key.starts_with(&nested));
        Ok(())
    }
}
