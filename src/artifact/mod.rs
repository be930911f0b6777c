//! Artifact storage
//!
//! Runs keep large opaque blobs (checkpoints, plots) outside the tracking
//! relations. An experiment's `artifact_uri` names where they go, e.g.
//! `mem://sweeps/mnist` or `file:///var/lib/track/mnist`; a run's artifact
//! lives at `<artifact_uri>/<run uuid>/<name>`.
//!
//! The scheme picks the [`ArtifactStore`] through an explicit
//! [`ArtifactRegistry`] owned by the caller.
//!
//! # Example
//!
//! ```rust
//! use trueno_track::artifact::ArtifactRegistry;
//!
//! let registry = ArtifactRegistry::with_defaults();
//! registry.save("mem://models/best.bin", b"weights")?;
//! assert_eq!(registry.load("mem://models/best.bin")?, b"weights".to_vec());
//! # Ok::<(), trueno_track::Error>(())
//! ```

mod fs;
mod memory;

pub use fs::FsArtifactStore;
pub use memory::MemoryArtifactStore;

use std::collections::BTreeMap;
use std::fmt;

use tracing::debug;

use crate::experiment::{ExperimentRecord, RunRecord};
use crate::{Error, Result};

/// Separator between a URI scheme and its path.
pub const SCHEME_SEPARATOR: &str = "://";

/// Blob storage addressed by slash-separated locations.
pub trait ArtifactStore: Send + Sync {
    /// Write `bytes` at `location`, replacing any previous content.
    ///
    /// # Errors
    ///
    /// Returns error if the location is invalid or the write fails.
    fn save(&self, location: &str, bytes: &[u8]) -> Result<()>;

    /// Read the blob at `location`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if nothing is stored there.
    fn load(&self, location: &str) -> Result<Vec<u8>>;

    /// Check whether a blob exists at `location`.
    ///
    /// # Errors
    ///
    /// Returns error if the location is invalid.
    fn exists(&self, location: &str) -> Result<bool>;

    /// Remove the blob at `location`. No-op if absent.
    ///
    /// # Errors
    ///
    /// Returns error if the location is invalid or removal fails.
    fn delete(&self, location: &str) -> Result<()>;

    /// Remove every blob at or below `location`. No-op if absent.
    ///
    /// # Errors
    ///
    /// Returns error if the location is invalid or removal fails.
    fn delete_prefix(&self, location: &str) -> Result<()>;
}

/// Scheme -> store mapping.
#[derive(Default)]
pub struct ArtifactRegistry {
    stores: BTreeMap<String, Box<dyn ArtifactStore>>,
}

impl fmt::Debug for ArtifactRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtifactRegistry")
            .field("schemes", &self.stores.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ArtifactRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `mem` (process-local) and `file` (absolute paths).
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new()
            .with_store("mem", MemoryArtifactStore::new())
            .with_store("file", FsArtifactStore::new(std::path::MAIN_SEPARATOR_STR))
    }

    /// Builder form of [`ArtifactRegistry::register`].
    #[must_use]
    pub fn with_store(mut self, scheme: &str, store: impl ArtifactStore + 'static) -> Self {
        self.register(scheme, store);
        self
    }

    /// Map `scheme` to `store`, replacing any previous mapping.
    pub fn register(&mut self, scheme: &str, store: impl ArtifactStore + 'static) {
        self.stores.insert(scheme.to_string(), Box::new(store));
    }

    /// Registered schemes, sorted.
    #[must_use]
    pub fn schemes(&self) -> Vec<&str> {
        self.stores.keys().map(String::as_str).collect()
    }

    /// Split `uri` into its store and the path within it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the URI has no scheme or the scheme
    /// is not registered.
    pub fn resolve<'u>(&self, uri: &'u str) -> Result<(&dyn ArtifactStore, &'u str)> {
        let (scheme, path) = split_uri(uri)?;
        let store = self.stores.get(scheme).ok_or_else(|| {
            Error::validation(format!("no artifact store registered for scheme '{scheme}' ({uri})"))
        })?;
        Ok((store.as_ref(), path))
    }

    /// Save `bytes` at `uri`.
    ///
    /// # Errors
    ///
    /// Returns error if the URI cannot be resolved or the store fails.
    pub fn save(&self, uri: &str, bytes: &[u8]) -> Result<()> {
        let (store, path) = self.resolve(uri)?;
        store.save(path, bytes)?;
        debug!(uri, bytes = bytes.len(), "saved artifact");
        Ok(())
    }

    /// Load the blob at `uri`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if absent.
    pub fn load(&self, uri: &str) -> Result<Vec<u8>> {
        let (store, path) = self.resolve(uri)?;
        store.load(path)
    }

    /// Check whether `uri` holds a blob.
    ///
    /// # Errors
    ///
    /// Returns error if the URI cannot be resolved.
    pub fn exists(&self, uri: &str) -> Result<bool> {
        let (store, path) = self.resolve(uri)?;
        store.exists(path)
    }

    /// Remove the blob at `uri`.
    ///
    /// # Errors
    ///
    /// Returns error if the URI cannot be resolved or the store fails.
    pub fn delete(&self, uri: &str) -> Result<()> {
        let (store, path) = self.resolve(uri)?;
        store.delete(path)
    }

    /// Remove every blob below `uri`.
    ///
    /// # Errors
    ///
    /// Returns error if the URI cannot be resolved or the store fails.
    pub fn delete_prefix(&self, uri: &str) -> Result<()> {
        let (store, path) = self.resolve(uri)?;
        store.delete_prefix(path)?;
        debug!(uri, "deleted artifacts");
        Ok(())
    }
}

/// Split `scheme://path`.
///
/// # Errors
///
/// Returns [`Error::Validation`] without a scheme.
pub fn split_uri(uri: &str) -> Result<(&str, &str)> {
    match uri.split_once(SCHEME_SEPARATOR) {
        Some((scheme, path)) if !scheme.is_empty() => Ok((scheme, path)),
        _ => Err(Error::validation(format!(
            "artifact uri '{uri}' has no scheme (expected scheme://path)"
        ))),
    }
}

/// Directory holding every artifact of `run`: `<artifact_uri>/<run uuid>`.
///
/// # Errors
///
/// Returns [`Error::Validation`] if the experiment has no artifact URI or
/// the run belongs to another experiment.
pub fn run_artifact_root(experiment: &ExperimentRecord, run: &RunRecord) -> Result<String> {
    let base = experiment.artifact_uri().ok_or_else(|| {
        Error::validation(format!(
            "experiment '{}' has no artifact uri",
            experiment.name()
        ))
    })?;
    if run.experiment_id() != experiment.id() {
        return Err(Error::validation(format!(
            "run {} does not belong to experiment '{}'",
            run.id(),
            experiment.name()
        )));
    }
    Ok(format!("{}/{}", base.trim_end_matches('/'), run.uuid()))
}

/// Location of artifact `name` of `run`: `<artifact_uri>/<run uuid>/<name>`.
///
/// # Errors
///
/// Returns [`Error::Validation`] if the experiment has no artifact URI, the
/// run belongs to another experiment, or the name is empty.
pub fn artifact_location(
    experiment: &ExperimentRecord,
    run: &RunRecord,
    name: &str,
) -> Result<String> {
    let root = run_artifact_root(experiment, run)?;
    let name = name.trim_matches('/');
    if name.is_empty() {
        return Err(Error::validation("artifact name must not be empty"));
    }
    Ok(format!("{root}/{name}"))
}

/// Split a location into non-empty segments, rejecting `..`.
pub(crate) fn segments(location: &str) -> Result<Vec<&str>> {
    let parts: Vec<&str> = location
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();
    if parts.iter().any(|s| *s == "..") {
        return Err(Error::validation(format!(
            "artifact location '{location}' must not contain '..'"
        )));
    }
    if parts.is_empty() {
        return Err(Error::validation("artifact location must not be empty"));
    }
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::{ExperimentId, RunId};

    #[test]
    fn test_split_uri() {
        assert_eq!(split_uri("mem://a/b").unwrap(), ("mem", "a/b"));
        assert!(split_uri("a/b").is_err());
        assert!(split_uri("://a").is_err());
    }

    #[test]
    fn test_unknown_scheme() {
        let registry = ArtifactRegistry::with_defaults();
        let err = registry.load("s3://bucket/x").unwrap_err();
        assert!(err.to_string().contains("s3"));
    }

    #[test]
    fn test_location_layout() {
        let exp = ExperimentRecord::builder(ExperimentId::new(1), "mnist")
            .artifact_uri(Some("mem://sweeps/mnist/".to_string()))
            .build();
        let run = RunRecord::new(RunId::new(4), ExperimentId::new(1), "r");
        let location = artifact_location(&exp, &run, "model.bin").unwrap();
        assert_eq!(location, format!("mem://sweeps/mnist/{}/model.bin", run.uuid()));
    }

    #[test]
    fn test_location_requires_uri() {
        let exp = ExperimentRecord::new(ExperimentId::new(1), "mnist");
        let run = RunRecord::new(RunId::new(4), ExperimentId::new(1), "r");
        let err = artifact_location(&exp, &run, "model.bin").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_segments_reject_parent() {
        assert!(segments("a/../b").is_err());
        assert!(segments("").is_err());
        assert_eq!(segments("/a//b/./c").unwrap(), vec!["a", "b", "c"]);
    }
}
