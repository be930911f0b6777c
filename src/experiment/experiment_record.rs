//! Experiment Record - root entity for experiment tracking

use serde::{Deserialize, Serialize};

use super::ExperimentId;

/// Experiment Record represents a named collection of runs.
///
/// This is the root entity in the tracking schema. Names are unique
/// within a store; runs and variables are owned by the experiment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExperimentRecord {
    id: ExperimentId,
    name: String,
    description: Option<String>,
    artifact_uri: Option<String>,
}

impl ExperimentRecord {
    /// Create a new experiment record with the given ID and name.
    ///
    /// # Arguments
    ///
    /// * `id` - Store-assigned identifier
    /// * `name` - Unique human-readable name
    #[must_use]
    pub fn new(id: ExperimentId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            description: None,
            artifact_uri: None,
        }
    }

    /// Create a builder for constructing an experiment record with optional fields.
    #[must_use]
    pub fn builder(id: ExperimentId, name: impl Into<String>) -> ExperimentRecordBuilder {
        ExperimentRecordBuilder::new(id, name)
    }

    /// Get the experiment ID.
    #[must_use]
    pub const fn id(&self) -> ExperimentId {
        self.id
    }

    /// Get the experiment name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the free-text description, if any.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Get the artifact storage location, if any.
    #[must_use]
    pub fn artifact_uri(&self) -> Option<&str> {
        self.artifact_uri.as_deref()
    }

    pub(crate) fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub(crate) fn set_artifact_uri(&mut self, uri: Option<String>) {
        self.artifact_uri = uri;
    }
}

/// Builder for `ExperimentRecord`.
#[derive(Debug)]
pub struct ExperimentRecordBuilder {
    id: ExperimentId,
    name: String,
    description: Option<String>,
    artifact_uri: Option<String>,
}

impl ExperimentRecordBuilder {
    /// Create a new builder with required fields.
    #[must_use]
    pub fn new(id: ExperimentId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            description: None,
            artifact_uri: None,
        }
    }

    /// Set the description.
    #[must_use]
    pub fn description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    /// Set the artifact storage location.
    #[must_use]
    pub fn artifact_uri(mut self, uri: Option<String>) -> Self {
        self.artifact_uri = uri;
        self
    }

    /// Build the `ExperimentRecord`.
    #[must_use]
    pub fn build(self) -> ExperimentRecord {
        ExperimentRecord {
            id: self.id,
            name: self.name,
            description: self.description,
            artifact_uri: self.artifact_uri,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_experiment_record_new() {
        let record = ExperimentRecord::new(ExperimentId::new(1), "mnist");
        assert_eq!(record.id().get(), 1);
        assert_eq!(record.name(), "mnist");
        assert!(record.description().is_none());
        assert!(record.artifact_uri().is_none());
    }

    #[test]
    fn test_experiment_record_builder() {
        let record = ExperimentRecord::builder(ExperimentId::new(2), "cifar")
            .description(Some("baseline sweep".into()))
            .artifact_uri(Some("mem://cifar".into()))
            .build();

        assert_eq!(record.description(), Some("baseline sweep"));
        assert_eq!(record.artifact_uri(), Some("mem://cifar"));
    }
}
