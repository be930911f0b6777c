//! Run Record - execution instance of an experiment

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ExperimentId, RunId};

/// Run Record represents a single execution of an experiment.
///
/// The `name` is for humans and need not be unique; the `uuid` is globally
/// unique and is used to address the run's artifacts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunRecord {
    id: RunId,
    experiment_id: ExperimentId,
    name: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
    uuid: Uuid,
}

impl RunRecord {
    /// Create a new run record stamped with the current time and a fresh UUID.
    ///
    /// # Arguments
    ///
    /// * `id` - Store-assigned identifier
    /// * `experiment_id` - ID of the parent experiment
    /// * `name` - Human-readable run name
    #[must_use]
    pub fn new(id: RunId, experiment_id: ExperimentId, name: impl Into<String>) -> Self {
        Self::builder(id, experiment_id, name).build()
    }

    /// Create a builder for constructing a run record with optional fields.
    #[must_use]
    pub fn builder(
        id: RunId,
        experiment_id: ExperimentId,
        name: impl Into<String>,
    ) -> RunRecordBuilder {
        RunRecordBuilder::new(id, experiment_id, name)
    }

    /// Get the run ID.
    #[must_use]
    pub const fn id(&self) -> RunId {
        self.id
    }

    /// Get the parent experiment ID.
    #[must_use]
    pub const fn experiment_id(&self) -> ExperimentId {
        self.experiment_id
    }

    /// Get the run name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the description, if any.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Get the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Get the globally unique run identifier.
    #[must_use]
    pub const fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub(crate) fn set_description(&mut self, description: Option<String>) {
        self.description = description;
    }
}

/// Builder for `RunRecord`.
#[derive(Debug)]
pub struct RunRecordBuilder {
    id: RunId,
    experiment_id: ExperimentId,
    name: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
    uuid: Uuid,
}

impl RunRecordBuilder {
    /// Create a new builder with required fields.
    #[must_use]
    pub fn new(id: RunId, experiment_id: ExperimentId, name: impl Into<String>) -> Self {
        Self {
            id,
            experiment_id,
            name: name.into(),
            description: None,
            created_at: Utc::now(),
            uuid: Uuid::new_v4(),
        }
    }

    /// Set the description.
    #[must_use]
    pub fn description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    /// Set a custom creation timestamp (useful for loading persisted rows).
    #[must_use]
    pub const fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Set the run UUID (useful for loading persisted rows).
    #[must_use]
    pub const fn uuid(mut self, uuid: Uuid) -> Self {
        self.uuid = uuid;
        self
    }

    /// Build the `RunRecord`.
    #[must_use]
    pub fn build(self) -> RunRecord {
        RunRecord {
            id: self.id,
            experiment_id: self.experiment_id,
            name: self.name,
            description: self.description,
            created_at: self.created_at,
            uuid: self.uuid,
        }
    }
}
