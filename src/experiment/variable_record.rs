//! Variable Record - declared identity of an observable key

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{ExperimentId, VariableId};
use crate::Error;

/// Kind of observable a variable holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableType {
    /// Logged without declaring a kind.
    #[default]
    Unknown,
    /// Configuration input (compared when matching runs).
    Parameter,
    /// Measured output. Never a step.
    Metric,
}

impl VariableType {
    /// Persisted text form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Parameter => "parameter",
            Self::Metric => "metric",
        }
    }

    /// True unless `Unknown`.
    #[must_use]
    pub const fn is_explicit(self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl fmt::Display for VariableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VariableType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unknown" => Ok(Self::Unknown),
            "parameter" => Ok(Self::Parameter),
            "metric" => Ok(Self::Metric),
            other => Err(Error::validation(format!("unknown variable type '{other}'"))),
        }
    }
}

/// Variable Record declares an observable within an experiment.
///
/// Identity is `(experiment_id, key, parent_id)`. The parent is the variable
/// of the step value under which this variable was logged; root-level
/// variables have no parent. Variables are shared by every run of the
/// experiment.
///
/// `is_step` is tri-state: `None` until the variable is first used as a step,
/// then `Some(true)` forever.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VariableRecord {
    id: VariableId,
    experiment_id: ExperimentId,
    key: String,
    parent_id: Option<VariableId>,
    kind: VariableType,
    is_step: Option<bool>,
}

impl VariableRecord {
    /// Create a variable record.
    #[must_use]
    pub fn new(
        id: VariableId,
        experiment_id: ExperimentId,
        key: impl Into<String>,
        parent_id: Option<VariableId>,
        kind: VariableType,
        is_step: Option<bool>,
    ) -> Self {
        Self {
            id,
            experiment_id,
            key: key.into(),
            parent_id,
            kind,
            is_step,
        }
    }

    /// Get the variable ID.
    #[must_use]
    pub const fn id(&self) -> VariableId {
        self.id
    }

    /// Get the owning experiment ID.
    #[must_use]
    pub const fn experiment_id(&self) -> ExperimentId {
        self.experiment_id
    }

    /// Get the dotted key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Get the parent (step) variable ID, if any.
    #[must_use]
    pub const fn parent_id(&self) -> Option<VariableId> {
        self.parent_id
    }

    /// Get the variable kind.
    #[must_use]
    pub const fn kind(&self) -> VariableType {
        self.kind
    }

    /// Get the tri-state step flag.
    #[must_use]
    pub const fn is_step(&self) -> Option<bool> {
        self.is_step
    }

    pub(crate) fn promote_step(&mut self) {
        self.is_step = Some(true);
    }
}

/// Fields of a variable that does not exist yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewVariable<'a> {
    /// Owning experiment
    pub experiment_id: ExperimentId,
    /// Dotted key
    pub key: &'a str,
    /// Parent step variable
    pub parent_id: Option<VariableId>,
    /// Declared kind
    pub kind: VariableType,
    /// Initial step flag
    pub is_step: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variable_type_text_roundtrip() {
        for kind in [VariableType::Unknown, VariableType::Parameter, VariableType::Metric] {
            assert_eq!(kind.as_str().parse::<VariableType>().unwrap(), kind);
        }
        assert!("weight".parse::<VariableType>().is_err());
    }

    #[test]
    fn test_variable_type_serde_lowercase() {
        assert_eq!(serde_json::to_string(&VariableType::Metric).unwrap(), "\"metric\"");
    }

    #[test]
    fn test_promote_step() {
        let mut var = VariableRecord::new(
            VariableId::new(1),
            ExperimentId::new(1),
            "epoch",
            None,
            VariableType::Parameter,
            None,
        );
        assert_eq!(var.is_step(), None);
        var.promote_step();
        assert_eq!(var.is_step(), Some(true));
    }
}
