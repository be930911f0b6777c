//! Error types for trueno-track
//!
//! Toyota Way: Clear error messages with actionable guidance (Respect for People)

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// trueno-track error types
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed key, value shape, or inconsistent select/match request
    #[error("Validation error: {0}")]
    Validation(String),

    /// Entity with the same identity already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Lookup found nothing
    #[error("Not found: {0}")]
    NotFound(String),

    /// Point lookup found more than one row
    #[error("Ambiguous result: {0}")]
    AmbiguousResult(String),

    /// Step reference violates the step hierarchy rules
    #[error("Invalid step: {0}")]
    InvalidStep(String),

    /// Variable logged with a type different from the stored one
    #[error("Type conflict for variable '{key}' in experiment {experiment_id}: stored as {stored}, logged as {requested}")]
    TypeConflict {
        /// Offending key
        key: String,
        /// Owning experiment
        experiment_id: String,
        /// Type already persisted
        stored: String,
        /// Type requested by the failing call
        requested: String,
    },

    /// Step variables must be parameters, and metrics can never be steps
    #[error("Step conflict: {0}")]
    StepConflict(String),

    /// Backend uniqueness constraint violated (distinguishable from other backend failures)
    #[error("Uniqueness conflict: {0}")]
    Conflict(String),

    /// Backend failure not covered by a more specific variant
    #[error("Storage error: {0}")]
    Storage(String),

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for [`Error::Validation`].
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Shorthand for [`Error::NotFound`].
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// True for a backend uniqueness violation.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}
