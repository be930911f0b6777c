//! In-memory backend.
//!
//! This is the default backend - data is lost on process restart.
//! For persistence, use [`super::SqliteBackend`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use rustc_hash::FxHashMap;

use super::{Backend, NewRun, NewValue, Transaction};
use crate::experiment::{
    ExperimentId, ExperimentRecord, KeyedValue, NewVariable, RunId, RunRecord, ValueId,
    ValueRecord, VariableId, VariableRecord, VariableType,
};
use crate::{Error, Result};

type VariableKey = (ExperimentId, String, Option<VariableId>);

/// Tables with secondary indexes for the lookups the store performs.
#[derive(Debug, Default)]
struct Tables {
    next_id: i64,
    experiments: BTreeMap<ExperimentId, ExperimentRecord>,
    runs: BTreeMap<RunId, RunRecord>,
    variables: BTreeMap<VariableId, VariableRecord>,
    variable_index: FxHashMap<VariableKey, VariableId>,
    values: BTreeMap<ValueId, ValueRecord>,
    values_by_run: FxHashMap<RunId, BTreeSet<ValueId>>,
}

/// Inverse of one applied change.
#[derive(Debug)]
enum Undo {
    RemoveExperiment(ExperimentId),
    RestoreExperiment(ExperimentRecord),
    RemoveRun(RunId),
    RestoreRun(RunRecord),
    RemoveVariable(VariableId),
    RestoreVariable(VariableRecord),
    RemoveValue(ValueId),
    RestoreValue(ValueRecord),
}

impl Tables {
    fn allocate(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn variable_key(var: &VariableRecord) -> VariableKey {
        (var.experiment_id(), var.key().to_string(), var.parent_id())
    }

    fn put_variable(&mut self, var: VariableRecord) {
        self.variable_index.insert(Self::variable_key(&var), var.id());
        self.variables.insert(var.id(), var);
    }

    fn take_variable(&mut self, id: VariableId) -> Option<VariableRecord> {
        let var = self.variables.remove(&id)?;
        self.variable_index.remove(&Self::variable_key(&var));
        Some(var)
    }

    fn put_value(&mut self, value: ValueRecord) {
        self.values_by_run
            .entry(value.run_id())
            .or_default()
            .insert(value.id());
        self.values.insert(value.id(), value);
    }

    fn take_value(&mut self, id: ValueId) -> Option<ValueRecord> {
        let value = self.values.remove(&id)?;
        if let Some(ids) = self.values_by_run.get_mut(&value.run_id()) {
            ids.remove(&id);
            if ids.is_empty() {
                self.values_by_run.remove(&value.run_id());
            }
        }
        Some(value)
    }

    fn keyed(&self, value: &ValueRecord) -> Result<KeyedValue> {
        let var = self.variables.get(&value.variable_id()).ok_or_else(|| {
            Error::Storage(format!(
                "value {} references missing variable {}",
                value.id(),
                value.variable_id()
            ))
        })?;
        Ok(KeyedValue {
            record: value.clone(),
            key: var.key().to_string(),
            kind: var.kind(),
        })
    }

    fn undo(&mut self, change: Undo) {
        match change {
            Undo::RemoveExperiment(id) => {
                self.experiments.remove(&id);
            }
            Undo::RestoreExperiment(record) => {
                self.experiments.insert(record.id(), record);
            }
            Undo::RemoveRun(id) => {
                self.runs.remove(&id);
            }
            Undo::RestoreRun(record) => {
                self.runs.insert(record.id(), record);
            }
            Undo::RemoveVariable(id) => {
                self.take_variable(id);
            }
            Undo::RestoreVariable(record) => self.put_variable(record),
            Undo::RemoveValue(id) => {
                self.take_value(id);
            }
            Undo::RestoreValue(record) => self.put_value(record),
        }
    }
}

/// In-memory tracking backend.
///
/// Thread-safe: transactions are serialized on a single mutex, which also
/// makes them isolated. Rollback replays an undo journal in reverse.
///
/// # Example
///
/// ```rust
/// use trueno_track::backend::MemoryBackend;
/// use trueno_track::TrackingStore;
///
/// let store = TrackingStore::new(MemoryBackend::new());
/// let experiment = store.create_experiment("mnist", None)?;
/// assert_eq!(experiment.name(), "mnist");
/// # Ok::<(), trueno_track::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct MemoryBackend {
    tables: Mutex<Tables>,
}

impl MemoryBackend {
    /// Create an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Backend for MemoryBackend {
    fn begin(&self) -> Result<Box<dyn Transaction + '_>> {
        let tables = self
            .tables
            .lock()
            .map_err(|_| Error::Storage("memory backend mutex poisoned".to_string()))?;
        Ok(Box::new(MemoryTransaction {
            tables,
            journal: Vec::new(),
            committed: false,
        }))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

struct MemoryTransaction<'a> {
    tables: MutexGuard<'a, Tables>,
    journal: Vec<Undo>,
    committed: bool,
}

impl Drop for MemoryTransaction<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        while let Some(change) = self.journal.pop() {
            self.tables.undo(change);
        }
    }
}

impl MemoryTransaction<'_> {
    fn name_taken(&self, name: &str, except: Option<ExperimentId>) -> bool {
        self.tables
            .experiments
            .values()
            .any(|e| e.name() == name && Some(e.id()) != except)
    }

    fn remove_run_cascade(&mut self, id: RunId) -> bool {
        let Some(run) = self.tables.runs.remove(&id) else {
            return false;
        };
        let value_ids: Vec<ValueId> = self
            .tables
            .values_by_run
            .get(&id)
            .map(|ids| ids.iter().rev().copied().collect())
            .unwrap_or_default();
        // Children before parents so a replayed journal never sees a dangling step.
        for value_id in value_ids {
            if let Some(value) = self.tables.take_value(value_id) {
                self.journal.push(Undo::RestoreValue(value));
            }
        }
        self.journal.push(Undo::RestoreRun(run));
        true
    }
}

impl Transaction for MemoryTransaction<'_> {
    fn commit(mut self: Box<Self>) -> Result<()> {
        self.committed = true;
        self.journal.clear();
        Ok(())
    }

    fn insert_experiment(
        &mut self,
        name: &str,
        description: Option<&str>,
        artifact_uri: Option<&str>,
    ) -> Result<ExperimentRecord> {
        if self.name_taken(name, None) {
            return Err(Error::Conflict(format!("experiment name '{name}'")));
        }
        let id = ExperimentId::new(self.tables.allocate());
        let record = ExperimentRecord::builder(id, name)
            .description(description.map(ToString::to_string))
            .artifact_uri(artifact_uri.map(ToString::to_string))
            .build();
        self.tables.experiments.insert(id, record.clone());
        self.journal.push(Undo::RemoveExperiment(id));
        Ok(record)
    }

    fn experiment_by_id(&mut self, id: ExperimentId) -> Result<Option<ExperimentRecord>> {
        Ok(self.tables.experiments.get(&id).cloned())
    }

    fn experiment_by_name(&mut self, name: &str) -> Result<Option<ExperimentRecord>> {
        Ok(self
            .tables
            .experiments
            .values()
            .find(|e| e.name() == name)
            .cloned())
    }

    fn list_experiments(&mut self) -> Result<Vec<ExperimentRecord>> {
        Ok(self.tables.experiments.values().cloned().collect())
    }

    fn rename_experiment(&mut self, id: ExperimentId, name: &str) -> Result<bool> {
        if self.name_taken(name, Some(id)) {
            return Err(Error::Conflict(format!("experiment name '{name}'")));
        }
        let Some(record) = self.tables.experiments.get_mut(&id) else {
            return Ok(false);
        };
        let before = record.clone();
        record.set_name(name);
        self.journal.push(Undo::RestoreExperiment(before));
        Ok(true)
    }

    fn set_artifact_uri(&mut self, id: ExperimentId, uri: Option<&str>) -> Result<bool> {
        let Some(record) = self.tables.experiments.get_mut(&id) else {
            return Ok(false);
        };
        let before = record.clone();
        record.set_artifact_uri(uri.map(ToString::to_string));
        self.journal.push(Undo::RestoreExperiment(before));
        Ok(true)
    }

    fn delete_experiment(&mut self, id: ExperimentId) -> Result<bool> {
        if !self.tables.experiments.contains_key(&id) {
            return Ok(false);
        }
        let run_ids: Vec<RunId> = self
            .tables
            .runs
            .values()
            .filter(|r| r.experiment_id() == id)
            .map(RunRecord::id)
            .collect();
        for run_id in run_ids {
            self.remove_run_cascade(run_id);
        }
        // Children first, mirroring the run cascade.
        let variable_ids: Vec<VariableId> = self
            .tables
            .variables
            .values()
            .rev()
            .filter(|v| v.experiment_id() == id)
            .map(VariableRecord::id)
            .collect();
        for variable_id in variable_ids {
            if let Some(var) = self.tables.take_variable(variable_id) {
                self.journal.push(Undo::RestoreVariable(var));
            }
        }
        if let Some(record) = self.tables.experiments.remove(&id) {
            self.journal.push(Undo::RestoreExperiment(record));
        }
        Ok(true)
    }

    fn insert_run(&mut self, run: NewRun<'_>) -> Result<RunRecord> {
        if !self.tables.experiments.contains_key(&run.experiment_id) {
            return Err(Error::Storage(format!(
                "run references missing experiment {}",
                run.experiment_id
            )));
        }
        let id = RunId::new(self.tables.allocate());
        let record = RunRecord::builder(id, run.experiment_id, run.name)
            .description(run.description.map(ToString::to_string))
            .created_at(run.created_at)
            .uuid(run.uuid)
            .build();
        self.tables.runs.insert(id, record.clone());
        self.journal.push(Undo::RemoveRun(id));
        Ok(record)
    }

    fn run_by_id(&mut self, id: RunId) -> Result<Option<RunRecord>> {
        Ok(self.tables.runs.get(&id).cloned())
    }

    fn runs_for_experiment(&mut self, experiment_id: ExperimentId) -> Result<Vec<RunRecord>> {
        Ok(self
            .tables
            .runs
            .values()
            .filter(|r| r.experiment_id() == experiment_id)
            .cloned()
            .collect())
    }

    fn set_run_description(&mut self, id: RunId, description: Option<&str>) -> Result<bool> {
        let Some(record) = self.tables.runs.get_mut(&id) else {
            return Ok(false);
        };
        let before = record.clone();
        record.set_description(description.map(ToString::to_string));
        self.journal.push(Undo::RestoreRun(before));
        Ok(true)
    }

    fn delete_run(&mut self, id: RunId) -> Result<bool> {
        Ok(self.remove_run_cascade(id))
    }

    fn insert_variable(&mut self, variable: NewVariable<'_>) -> Result<VariableRecord> {
        let key: VariableKey = (
            variable.experiment_id,
            variable.key.to_string(),
            variable.parent_id,
        );
        if self.tables.variable_index.contains_key(&key) {
            return Err(Error::Conflict(format!(
                "variable '{}' (parent {:?}) in experiment {}",
                variable.key, variable.parent_id, variable.experiment_id
            )));
        }
        let id = VariableId::new(self.tables.allocate());
        let record = VariableRecord::new(
            id,
            variable.experiment_id,
            variable.key,
            variable.parent_id,
            variable.kind,
            variable.is_step,
        );
        self.tables.put_variable(record.clone());
        self.journal.push(Undo::RemoveVariable(id));
        Ok(record)
    }

    fn find_variable(
        &mut self,
        experiment_id: ExperimentId,
        key: &str,
        parent_id: Option<VariableId>,
    ) -> Result<Option<VariableRecord>> {
        let index_key: VariableKey = (experiment_id, key.to_string(), parent_id);
        Ok(self
            .tables
            .variable_index
            .get(&index_key)
            .and_then(|id| self.tables.variables.get(id))
            .cloned())
    }

    fn variable_by_id(&mut self, id: VariableId) -> Result<Option<VariableRecord>> {
        Ok(self.tables.variables.get(&id).cloned())
    }

    fn promote_step(&mut self, id: VariableId) -> Result<()> {
        let record = self
            .tables
            .variables
            .get_mut(&id)
            .ok_or_else(|| Error::not_found(format!("variable {id}")))?;
        let before = record.clone();
        record.promote_step();
        self.journal.push(Undo::RestoreVariable(before));
        Ok(())
    }

    fn insert_value(&mut self, value: NewValue<'_>) -> Result<ValueRecord> {
        if !self.tables.runs.contains_key(&value.run_id) {
            return Err(Error::Storage(format!(
                "value references missing run {}",
                value.run_id
            )));
        }
        if let Some(step_id) = value.step_id {
            if !self.tables.values.contains_key(&step_id) {
                return Err(Error::Storage(format!(
                    "value references missing step {step_id}"
                )));
            }
        }
        let id = ValueId::new(self.tables.allocate());
        let record = ValueRecord::new(
            id,
            value.run_id,
            value.variable_id,
            value.value.clone(),
            value.timestamp,
            value.step_id,
        );
        self.tables.put_value(record.clone());
        self.journal.push(Undo::RemoveValue(id));
        Ok(record)
    }

    fn value_by_id(&mut self, id: ValueId) -> Result<Option<ValueRecord>> {
        Ok(self.tables.values.get(&id).cloned())
    }

    fn find_values(
        &mut self,
        run_id: RunId,
        variable_id: VariableId,
        step_id: Option<ValueId>,
    ) -> Result<Vec<ValueRecord>> {
        let Some(ids) = self.tables.values_by_run.get(&run_id) else {
            return Ok(Vec::new());
        };
        Ok(ids
            .iter()
            .filter_map(|id| self.tables.values.get(id))
            .filter(|v| v.variable_id() == variable_id && v.step_id() == step_id)
            .cloned()
            .collect())
    }

    fn run_values(&mut self, run_id: RunId) -> Result<Vec<KeyedValue>> {
        let Some(ids) = self.tables.values_by_run.get(&run_id) else {
            return Ok(Vec::new());
        };
        ids.iter()
            .filter_map(|id| self.tables.values.get(id))
            .map(|v| self.tables.keyed(v))
            .collect()
    }

    fn experiment_values(
        &mut self,
        experiment_id: ExperimentId,
        kind: Option<VariableType>,
    ) -> Result<Vec<KeyedValue>> {
        let mut out = Vec::new();
        for run in self
            .tables
            .runs
            .values()
            .filter(|r| r.experiment_id() == experiment_id)
        {
            let Some(ids) = self.tables.values_by_run.get(&run.id()) else {
                continue;
            };
            for value in ids.iter().filter_map(|id| self.tables.values.get(id)) {
                let keyed = self.tables.keyed(value)?;
                if kind.map_or(true, |k| k == keyed.kind) {
                    out.push(keyed);
                }
            }
        }
        out.sort_by_key(|v| v.record.id());
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::LogValue;
    use chrono::Utc;
    use uuid::Uuid;

    fn new_run(experiment_id: ExperimentId) -> NewRun<'static> {
        NewRun {
            experiment_id,
            name: "run",
            description: None,
            created_at: Utc::now(),
            uuid: Uuid::new_v4(),
        }
    }

    #[test]
    fn test_rollback_on_drop() {
        let backend = MemoryBackend::new();
        {
            let mut tx = backend.begin().unwrap();
            tx.insert_experiment("exp", None, None).unwrap();
            // dropped without commit
        }
        let mut tx = backend.begin().unwrap();
        assert!(tx.experiment_by_name("exp").unwrap().is_none());
    }

    #[test]
    fn test_commit_persists() {
        let backend = MemoryBackend::new();
        let mut tx = backend.begin().unwrap();
        tx.insert_experiment("exp", None, None).unwrap();
        tx.commit().unwrap();

        let mut tx = backend.begin().unwrap();
        assert!(tx.experiment_by_name("exp").unwrap().is_some());
    }

    #[test]
    fn test_variable_unique_conflict() {
        let backend = MemoryBackend::new();
        let mut tx = backend.begin().unwrap();
        let exp = tx.insert_experiment("exp", None, None).unwrap();
        let new = NewVariable {
            experiment_id: exp.id(),
            key: "lr",
            parent_id: None,
            kind: VariableType::Parameter,
            is_step: None,
        };
        tx.insert_variable(new.clone()).unwrap();
        let err = tx.insert_variable(new).unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn test_delete_rollback_restores_cascade() {
        let backend = MemoryBackend::new();
        let mut tx = backend.begin().unwrap();
        let exp = tx.insert_experiment("exp", None, None).unwrap();
        let run = tx.insert_run(new_run(exp.id())).unwrap();
        let var = tx
            .insert_variable(NewVariable {
                experiment_id: exp.id(),
                key: "lr",
                parent_id: None,
                kind: VariableType::Parameter,
                is_step: None,
            })
            .unwrap();
        let value = LogValue::from(0.1);
        tx.insert_value(NewValue {
            run_id: run.id(),
            variable_id: var.id(),
            value: &value,
            timestamp: Utc::now(),
            step_id: None,
        })
        .unwrap();
        tx.commit().unwrap();

        {
            let mut tx = backend.begin().unwrap();
            assert!(tx.delete_experiment(exp.id()).unwrap());
            assert!(tx.run_values(run.id()).unwrap().is_empty());
        }

        let mut tx = backend.begin().unwrap();
        assert_eq!(tx.run_values(run.id()).unwrap().len(), 1);
        assert!(tx.find_variable(exp.id(), "lr", None).unwrap().is_some());
    }
}
