//! Value Record - one observation within a run

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{RunId, ValueId, VariableId, VariableType};
use crate::value::LogValue;

/// Value Record represents a single observation of a variable.
///
/// Values are append-only. `step_id` points at an earlier value of the same
/// run that acts as the logging context, which makes the values of a run a
/// forest rooted at "no step".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValueRecord {
    id: ValueId,
    run_id: RunId,
    variable_id: VariableId,
    value: LogValue,
    timestamp: DateTime<Utc>,
    step_id: Option<ValueId>,
}

impl ValueRecord {
    /// Create a value record.
    #[must_use]
    pub fn new(
        id: ValueId,
        run_id: RunId,
        variable_id: VariableId,
        value: LogValue,
        timestamp: DateTime<Utc>,
        step_id: Option<ValueId>,
    ) -> Self {
        Self {
            id,
            run_id,
            variable_id,
            value,
            timestamp,
            step_id,
        }
    }

    /// Get the value ID.
    #[must_use]
    pub const fn id(&self) -> ValueId {
        self.id
    }

    /// Get the owning run ID.
    #[must_use]
    pub const fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Get the variable ID.
    #[must_use]
    pub const fn variable_id(&self) -> VariableId {
        self.variable_id
    }

    /// Get the observed value.
    #[must_use]
    pub const fn value(&self) -> &LogValue {
        &self.value
    }

    /// Consume the record, returning the observed value.
    #[must_use]
    pub fn into_value(self) -> LogValue {
        self.value
    }

    /// Get the timestamp when the value was recorded.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Get the step value ID, if logged under a step.
    #[must_use]
    pub const fn step_id(&self) -> Option<ValueId> {
        self.step_id
    }
}

/// A value joined with the key and kind of its variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyedValue {
    /// Persisted value row
    pub record: ValueRecord,
    /// Variable key
    pub key: String,
    /// Variable kind
    pub kind: VariableType,
}

/// Flat projection of a value used to rebuild step trees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawValue {
    /// Value ID
    pub value_id: ValueId,
    /// Step value ID, if any
    pub step_id: Option<ValueId>,
    /// True iff another value of the run references this one as its step
    pub is_step: bool,
    /// Variable key
    pub key: String,
    /// Observed value
    pub value: LogValue,
}

impl RawValue {
    /// Project keyed values of one run, computing `is_step` from the step
    /// references inside `values`. Output is ordered by value id.
    #[must_use]
    pub fn from_keyed(values: Vec<KeyedValue>) -> Vec<Self> {
        let steps: rustc_hash::FxHashSet<ValueId> =
            values.iter().filter_map(|v| v.record.step_id()).collect();
        let mut raw: Vec<Self> = values
            .into_iter()
            .map(|v| Self {
                value_id: v.record.id(),
                step_id: v.record.step_id(),
                is_step: steps.contains(&v.record.id()),
                key: v.key,
                value: v.record.into_value(),
            })
            .collect();
        raw.sort_by_key(|v| v.value_id);
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyed(id: i64, step: Option<i64>, key: &str) -> KeyedValue {
        KeyedValue {
            record: ValueRecord::new(
                ValueId::new(id),
                RunId::new(1),
                VariableId::new(1),
                LogValue::from(id),
                Utc::now(),
                step.map(ValueId::new),
            ),
            key: key.to_string(),
            kind: VariableType::Parameter,
        }
    }

    #[test]
    fn test_raw_values_flag_steps() {
        let raw = RawValue::from_keyed(vec![
            keyed(3, Some(1), "acc"),
            keyed(1, None, "epoch"),
            keyed(2, None, "lr"),
        ]);

        assert_eq!(raw.iter().map(|r| r.value_id.get()).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert!(raw[0].is_step);
        assert!(!raw[1].is_step);
        assert!(!raw[2].is_step);
    }
}
