//! Filesystem artifact store.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::{segments, ArtifactStore};
use crate::{Error, Result};

/// Artifact store rooted at a directory. Locations never escape the root.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    /// Store blobs below `root` (created lazily on first save).
    #[must_use]
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, location: &str) -> Result<PathBuf> {
        let mut path = self.root.clone();
        path.extend(segments(location)?);
        Ok(path)
    }
}

impl ArtifactStore for FsArtifactStore {
    fn save(&self, location: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(location)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, bytes)?;
        Ok(())
    }

    fn load(&self, location: &str) -> Result<Vec<u8>> {
        let path = self.path(location)?;
        fs::read(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::not_found(format!("artifact '{}'", path.display())),
            _ => Error::Io(e),
        })
    }

    fn exists(&self, location: &str) -> Result<bool> {
        Ok(self.path(location)?.is_file())
    }

    fn delete(&self, location: &str) -> Result<()> {
        match fs::remove_file(self.path(location)?) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(Error::Io(e)),
            _ => Ok(()),
        }
    }

    fn delete_prefix(&self, location: &str) -> Result<()> {
        let path = self.path(location)?;
        let removed = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        match removed {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(Error::Io(e)),
            _ => Ok(()),
        }
    }
}
