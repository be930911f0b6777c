//! Tracker configuration.
//!
//! Deserializable from JSON, with environment overrides applied on top:
//!
//! | Variable                 | Effect                                      |
//! |--------------------------|---------------------------------------------|
//! | `TRUENO_TRACK_DB`        | SQLite path, or `:memory:` for the memory backend |
//! | `TRUENO_TRACK_ARTIFACTS` | Artifact root URI for new experiments       |
//!
//! ```rust
//! use trueno_track::config::{BackendConfig, TrackerConfig};
//!
//! let config = TrackerConfig::from_json_str(
//!     r#"{ "backend": { "type": "memory" }, "artifact_root": "mem://runs" }"#,
//! )?;
//! assert_eq!(config.backend, BackendConfig::Memory);
//!
//! let store = config.open()?;
//! let exp = store.create_experiment("mnist", None)?;
//! assert_eq!(exp.artifact_uri(), Some("mem://runs/mnist"));
//! # Ok::<(), trueno_track::Error>(())
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::backend::{MemoryBackend, SqliteBackend};
use crate::experiment::TrackingStore;
use crate::logging;
use crate::Result;

/// Environment variable selecting the backend.
pub const DB_ENV: &str = "TRUENO_TRACK_DB";

/// Environment variable setting the artifact root.
pub const ARTIFACTS_ENV: &str = "TRUENO_TRACK_ARTIFACTS";

/// `TRUENO_TRACK_DB` value selecting the memory backend.
pub const IN_MEMORY: &str = ":memory:";

/// Storage backend selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    /// Process-local tables, lost on exit.
    #[default]
    Memory,
    /// SQLite database file.
    Sqlite {
        /// Database file, created with its parent directories if missing.
        path: PathBuf,
    },
}

/// Tracker configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Storage backend.
    pub backend: BackendConfig,
    /// Artifact root URI; new experiments get `<root>/<name>`.
    pub artifact_root: Option<String>,
    /// `tracing` filter directive used by [`TrackerConfig::init_logging`].
    pub log_filter: String,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::Memory,
            artifact_root: None,
            log_filter: logging::DEFAULT_FILTER.to_string(),
        }
    }
}

impl TrackerConfig {
    /// Parse a JSON document. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Json`] on malformed input.
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Defaults overridden by the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Apply `TRUENO_TRACK_DB` and `TRUENO_TRACK_ARTIFACTS`.
    #[must_use]
    pub fn with_env(self) -> Self {
        self.with_env_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides from `lookup` instead of the process environment.
    #[must_use]
    pub fn with_env_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(db) = lookup(DB_ENV).filter(|v| !v.is_empty()) {
            self.backend = if db == IN_MEMORY {
                BackendConfig::Memory
            } else {
                BackendConfig::Sqlite { path: db.into() }
            };
        }
        if let Some(root) = lookup(ARTIFACTS_ENV).filter(|v| !v.is_empty()) {
            self.artifact_root = Some(root);
        }
        self
    }

    /// Use the memory backend.
    #[must_use]
    pub fn memory(mut self) -> Self {
        self.backend = BackendConfig::Memory;
        self
    }

    /// Use a SQLite file.
    #[must_use]
    pub fn sqlite(mut self, path: impl Into<PathBuf>) -> Self {
        self.backend = BackendConfig::Sqlite { path: path.into() };
        self
    }

    /// Set the artifact root URI.
    #[must_use]
    pub fn artifact_root(mut self, root: impl Into<String>) -> Self {
        self.artifact_root = Some(root.into());
        self
    }

    /// Set the log filter directive.
    #[must_use]
    pub fn log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = filter.into();
        self
    }

    /// Install the global `tracing` subscriber with [`Self::log_filter`].
    /// Returns `false` if one was already installed.
    pub fn init_logging(&self) -> bool {
        logging::init(&self.log_filter)
    }

    /// Open the configured backend.
    ///
    /// # Errors
    ///
    /// Returns error if the SQLite database cannot be opened.
    pub fn open(&self) -> Result<TrackingStore> {
        let store = match &self.backend {
            BackendConfig::Memory => TrackingStore::new(MemoryBackend::new()),
            BackendConfig::Sqlite { path } => TrackingStore::new(SqliteBackend::open(path)?),
        };
        info!(backend = store.backend_name(), artifact_root = ?self.artifact_root, "opened tracking store");
        Ok(match &self.artifact_root {
            Some(root) => store.with_artifact_root(root.clone()),
            None => store,
        })
    }
}
