//! Tracking Store - transactional operations over experiments, runs,
//! variables and values.
//!
//! Every public method is one unit of work: it opens a transaction on the
//! backend, commits on success and rolls back on any error, so a failed
//! `log_value` never leaves a half-created variable behind.

use std::collections::BTreeMap;

use chrono::Utc;
use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    ExperimentId, ExperimentRecord, KeyedValue, NewVariable, RawValue, RunId, RunRecord, ValueId,
    ValueRecord, VariableRecord, VariableType,
};
use crate::backend::{Backend, NewRun, NewValue, Transaction};
use crate::namespace::{self, validate_key, SEPARATOR};
use crate::tree::{self, Record, StepTree, MAX_STEP_DEPTH};
use crate::value::LogValue;
use crate::{names, Error, Result};

/// Inputs of one `log_value` call.
#[derive(Debug, Clone)]
struct LogRequest<'a> {
    run_id: RunId,
    key: &'a str,
    value: LogValue,
    kind: VariableType,
    step: Option<ValueId>,
    /// `Some(false)` for metrics, `Some(true)` for explicit steps.
    expect_step: Option<bool>,
}

/// Experiment tracking store.
///
/// ## Design
///
/// The store owns its backend and opens an explicit transaction per call;
/// there is no ambient "current transaction". Variables are resolved with
/// insert-or-fetch so concurrent writers converge on one row per
/// `(experiment, key, parent)`.
///
/// ## Example
///
/// ```rust
/// use trueno_track::{backend::MemoryBackend, TrackingStore, VariableType};
///
/// let store = TrackingStore::new(MemoryBackend::new());
/// let exp = store.create_experiment("mnist", None)?;
/// let run = store.start_run(exp.id(), Some("baseline"))?;
///
/// let epoch = store.log_value(run.id(), "epoch", 1, VariableType::Parameter, None)?;
/// store.log_value(run.id(), "acc", 0.9, VariableType::Metric, Some(epoch.id()))?;
///
/// let rows = store.select(run.id(), &["epoch", "acc"])?;
/// assert_eq!(rows.len(), 1);
/// # Ok::<(), trueno_track::Error>(())
/// ```
pub struct TrackingStore {
    backend: Box<dyn Backend>,
    artifact_root: Option<String>,
}

impl std::fmt::Debug for TrackingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackingStore")
            .field("backend", &self.backend.name())
            .field("artifact_root", &self.artifact_root)
            .finish()
    }
}

impl TrackingStore {
    /// Create a store over `backend`.
    #[must_use]
    pub fn new(backend: impl Backend + 'static) -> Self {
        Self::from_boxed(Box::new(backend))
    }

    /// Create a store over an already boxed backend.
    #[must_use]
    pub fn from_boxed(backend: Box<dyn Backend>) -> Self {
        Self {
            backend,
            artifact_root: None,
        }
    }

    /// Give newly created experiments the artifact location `<root>/<name>`.
    #[must_use]
    pub fn with_artifact_root(mut self, root: impl Into<String>) -> Self {
        self.artifact_root = Some(root.into().trim_end_matches('/').to_string());
        self
    }

    /// Name of the backend in use.
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    fn transaction<T>(&self, f: impl FnOnce(&mut dyn Transaction) -> Result<T>) -> Result<T> {
        let mut tx = self.backend.begin()?;
        let out = f(&mut *tx)?;
        tx.commit()?;
        Ok(out)
    }

    fn default_artifact_uri(&self, name: &str) -> Option<String> {
        self.artifact_root.as_ref().map(|root| format!("{root}/{name}"))
    }

    // =========================================================================
    // Experiments
    // =========================================================================

    /// Create an experiment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyExists`] if the name is taken and
    /// [`Error::Validation`] for an empty name.
    pub fn create_experiment(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<ExperimentRecord> {
        validate_name(name)?;
        let uri = self.default_artifact_uri(name);
        let record = self
            .transaction(|tx| tx.insert_experiment(name, description, uri.as_deref()))
            .map_err(|e| match e {
                Error::Conflict(_) => Error::AlreadyExists(format!("experiment '{name}'")),
                other => other,
            })?;
        info!(experiment_id = %record.id(), name, "created experiment");
        Ok(record)
    }

    /// Fetch an experiment by name, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns error on an empty name or backend failure.
    pub fn get_or_create_experiment(&self, name: &str) -> Result<ExperimentRecord> {
        validate_name(name)?;
        let uri = self.default_artifact_uri(name);
        self.transaction(|tx| match tx.experiment_by_name(name)? {
            Some(existing) => Ok(existing),
            None => {
                let record = tx.insert_experiment(name, None, uri.as_deref())?;
                info!(experiment_id = %record.id(), name, "created experiment");
                Ok(record)
            }
        })
    }

    /// Fetch an experiment by name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no experiment has that name.
    pub fn get_experiment(&self, name: &str) -> Result<ExperimentRecord> {
        self.transaction(|tx| tx.experiment_by_name(name))?
            .ok_or_else(|| Error::not_found(format!("experiment '{name}'")))
    }

    /// Fetch an experiment by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if absent.
    pub fn experiment_by_id(&self, id: ExperimentId) -> Result<ExperimentRecord> {
        self.transaction(|tx| require_experiment(tx, id))
    }

    /// All experiments, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns error on backend failure.
    pub fn list_experiments(&self) -> Result<Vec<ExperimentRecord>> {
        self.transaction(|tx| tx.list_experiments())
    }

    /// Rename an experiment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if absent and [`Error::AlreadyExists`] if
    /// the new name is taken.
    pub fn rename_experiment(&self, id: ExperimentId, name: &str) -> Result<()> {
        validate_name(name)?;
        let renamed = self
            .transaction(|tx| tx.rename_experiment(id, name))
            .map_err(|e| match e {
                Error::Conflict(_) => Error::AlreadyExists(format!("experiment '{name}'")),
                other => other,
            })?;
        if !renamed {
            return Err(Error::not_found(format!("experiment {id}")));
        }
        info!(experiment_id = %id, name, "renamed experiment");
        Ok(())
    }

    /// Set or clear the artifact location of an experiment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if absent.
    pub fn set_artifact_uri(&self, id: ExperimentId, uri: Option<&str>) -> Result<()> {
        if self.transaction(|tx| tx.set_artifact_uri(id, uri))? {
            Ok(())
        } else {
            Err(Error::not_found(format!("experiment {id}")))
        }
    }

    /// Delete an experiment with all its runs, values and variables.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if absent.
    pub fn delete_experiment(&self, id: ExperimentId) -> Result<()> {
        if !self.transaction(|tx| tx.delete_experiment(id))? {
            return Err(Error::not_found(format!("experiment {id}")));
        }
        info!(experiment_id = %id, "deleted experiment");
        Ok(())
    }

    // =========================================================================
    // Runs
    // =========================================================================

    /// Start a run. Without a name, a random human-readable one is generated.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the experiment does not exist.
    pub fn start_run(&self, experiment_id: ExperimentId, name: Option<&str>) -> Result<RunRecord> {
        let name = name.map_or_else(names::generate, ToString::to_string);
        let run = self.transaction(|tx| {
            require_experiment(tx, experiment_id)?;
            tx.insert_run(NewRun {
                experiment_id,
                name: &name,
                description: None,
                created_at: Utc::now(),
                uuid: Uuid::new_v4(),
            })
        })?;
        info!(run_id = %run.id(), experiment_id = %experiment_id, name = %run.name(), "started run");
        Ok(run)
    }

    /// Fetch a run.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if absent.
    pub fn get_run(&self, id: RunId) -> Result<RunRecord> {
        self.transaction(|tx| require_run(tx, id))
    }

    /// Runs of an experiment, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the experiment does not exist.
    pub fn list_runs(&self, experiment_id: ExperimentId) -> Result<Vec<RunRecord>> {
        self.search_runs(experiment_id, None, None)
    }

    /// Set or clear a run description.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if absent.
    pub fn set_run_description(&self, id: RunId, description: Option<&str>) -> Result<()> {
        if self.transaction(|tx| tx.set_run_description(id, description))? {
            Ok(())
        } else {
            Err(Error::not_found(format!("run {id}")))
        }
    }

    /// Delete a run with all its values.
    ///
    /// Artifacts live outside the store; [`crate::Run::delete`] removes them
    /// too.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if absent.
    pub fn delete_run(&self, id: RunId) -> Result<()> {
        if !self.transaction(|tx| tx.delete_run(id))? {
            return Err(Error::not_found(format!("run {id}")));
        }
        info!(run_id = %id, "deleted run");
        Ok(())
    }

    /// Runs of an experiment filtered by exact name and by root-level
    /// parameter values, newest first.
    ///
    /// `parameter_equals` may be nested; it is flattened into dotted keys.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the experiment does not exist.
    pub fn search_runs(
        &self,
        experiment_id: ExperimentId,
        name: Option<&str>,
        parameter_equals: Option<&BTreeMap<String, LogValue>>,
    ) -> Result<Vec<RunRecord>> {
        let wanted = parameter_equals
            .map(|p| namespace::flatten(p, SEPARATOR))
            .transpose()?;
        let (runs, params) = self.transaction(|tx| {
            require_experiment(tx, experiment_id)?;
            let runs = tx.runs_for_experiment(experiment_id)?;
            let params = match wanted {
                Some(ref w) if !w.is_empty() => {
                    tx.experiment_values(experiment_id, Some(VariableType::Parameter))?
                }
                _ => Vec::new(),
            };
            Ok((runs, params))
        })?;

        let mut root_params: FxHashMap<RunId, Vec<(String, LogValue)>> = FxHashMap::default();
        for keyed in params {
            if keyed.record.step_id().is_none() {
                root_params
                    .entry(keyed.record.run_id())
                    .or_default()
                    .push((keyed.key, keyed.record.into_value()));
            }
        }

        let mut found: Vec<RunRecord> = runs
            .into_iter()
            .filter(|run| name.map_or(true, |n| run.name() == n))
            .filter(|run| {
                wanted.as_ref().map_or(true, |w| {
                    let logged = root_params.get(&run.id());
                    w.iter().all(|(key, value)| {
                        logged.is_some_and(|l| l.iter().any(|(k, v)| k == key && v == value))
                    })
                })
            })
            .collect();
        found.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| b.id().cmp(&a.id()))
        });
        Ok(found)
    }

    // =========================================================================
    // Logging
    // =========================================================================

    /// Log one value, optionally under a step value of the same run.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] for a malformed key or a NaN/infinite float
    /// - [`Error::NotFound`] if the run or step value does not exist
    /// - [`Error::InvalidStep`] if the step belongs to another run, or the
    ///   value would sit deeper than [`MAX_STEP_DEPTH`]
    /// - [`Error::StepConflict`] if a metric would become a step
    /// - [`Error::TypeConflict`] if `kind` differs from the stored kind
    pub fn log_value(
        &self,
        run_id: RunId,
        key: &str,
        value: impl Into<LogValue>,
        kind: VariableType,
        step: Option<ValueId>,
    ) -> Result<ValueRecord> {
        self.log(LogRequest {
            run_id,
            key,
            value: value.into(),
            kind,
            step,
            expect_step: None,
        })
    }

    /// Log a parameter.
    ///
    /// # Errors
    ///
    /// See [`TrackingStore::log_value`].
    pub fn log_param(
        &self,
        run_id: RunId,
        key: &str,
        value: impl Into<LogValue>,
        step: Option<ValueId>,
    ) -> Result<ValueRecord> {
        self.log_value(run_id, key, value, VariableType::Parameter, step)
    }

    /// Log a metric. Fails with [`Error::StepConflict`] if the variable is
    /// used as a step.
    ///
    /// # Errors
    ///
    /// See [`TrackingStore::log_value`].
    pub fn log_metric(
        &self,
        run_id: RunId,
        key: &str,
        value: impl Into<LogValue>,
        step: Option<ValueId>,
    ) -> Result<ValueRecord> {
        self.log(LogRequest {
            run_id,
            key,
            value: value.into(),
            kind: VariableType::Metric,
            step,
            expect_step: Some(false),
        })
    }

    /// Log a parameter that will be used as a step; its variable is marked
    /// as a step immediately.
    ///
    /// # Errors
    ///
    /// See [`TrackingStore::log_value`].
    pub fn log_step(
        &self,
        run_id: RunId,
        key: &str,
        value: impl Into<LogValue>,
        step: Option<ValueId>,
    ) -> Result<ValueRecord> {
        self.log(LogRequest {
            run_id,
            key,
            value: value.into(),
            kind: VariableType::Parameter,
            step,
            expect_step: Some(true),
        })
    }

    /// Flatten a nested map and log every entry, in key order.
    ///
    /// Each entry is its own transaction: entries logged before a failing
    /// one stay committed. A map that does not flatten cleanly logs nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for an empty key segment or colliding
    /// flattened paths, otherwise the first failing entry's error.
    pub fn log_values(
        &self,
        run_id: RunId,
        values: &BTreeMap<String, LogValue>,
        kind: VariableType,
        step: Option<ValueId>,
        prefix: Option<&str>,
    ) -> Result<Vec<ValueRecord>> {
        let flat = namespace::flatten_with_prefix(values, prefix, SEPARATOR)?;
        let expect_step = (kind == VariableType::Metric).then_some(false);
        flat.into_iter()
            .map(|(key, value)| {
                self.log(LogRequest {
                    run_id,
                    key: &key,
                    value,
                    kind,
                    step,
                    expect_step,
                })
            })
            .collect()
    }

    fn log(&self, request: LogRequest<'_>) -> Result<ValueRecord> {
        validate_key(request.key)?;
        if request.value.has_non_finite() {
            return Err(Error::validation(format!(
                "value {} for key '{}' in run {} contains a non-finite number",
                request.value, request.key, request.run_id
            )));
        }
        let record = self.transaction(|tx| log_in(tx, &request))?;
        debug!(
            run_id = %request.run_id,
            key = request.key,
            kind = %request.kind,
            value_id = %record.id(),
            step_id = ?request.step,
            "logged value"
        );
        Ok(record)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Point lookup of the value logged for `key` under `step`.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if nothing matches and no default is given
    /// - [`Error::AmbiguousResult`] if more than one value matches
    /// - [`Error::InvalidStep`] if the step belongs to another run
    pub fn get_param(
        &self,
        run_id: RunId,
        key: &str,
        default: Option<LogValue>,
        step: Option<ValueId>,
    ) -> Result<LogValue> {
        validate_key(key)?;
        let found = self.transaction(|tx| {
            let run = require_run(tx, run_id)?;
            let parent = match step {
                Some(step_id) => Some(require_step(tx, run_id, step_id)?.variable_id()),
                None => None,
            };
            let Some(variable) = tx.find_variable(run.experiment_id(), key, parent)? else {
                return Ok(Vec::new());
            };
            tx.find_values(run_id, variable.id(), step)
        })?;

        match found.len() {
            0 => default.ok_or_else(|| {
                Error::not_found(format!("key '{key}' in run {run_id} (step {step:?})"))
            }),
            1 => Ok(found.into_iter().next().map(ValueRecord::into_value).unwrap_or_default()),
            n => Err(Error::AmbiguousResult(format!(
                "{n} values for key '{key}' in run {run_id} (step {step:?})"
            ))),
        }
    }

    /// Flat value list of a run, ordered by value id, with `is_step` set on
    /// values other values were logged under.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the run does not exist.
    pub fn get_raw_values(&self, run_id: RunId) -> Result<Vec<RawValue>> {
        let keyed = self.transaction(|tx| {
            require_run(tx, run_id)?;
            tx.run_values(run_id)
        })?;
        Ok(RawValue::from_keyed(keyed))
    }

    /// Step hierarchy of a run.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the run does not exist.
    pub fn step_tree(&self, run_id: RunId) -> Result<StepTree> {
        Ok(StepTree::build(&self.get_raw_values(run_id)?))
    }

    /// Select `keys` from a run's step tree.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the run does not exist.
    pub fn select<S: AsRef<str>>(&self, run_id: RunId, keys: &[S]) -> Result<Vec<Record>> {
        tree::select(&self.step_tree(run_id)?, keys)
    }

    /// Every logged key of a run, one record per leaf path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the run does not exist.
    pub fn get_logs(&self, run_id: RunId) -> Result<Vec<Record>> {
        let tree = self.step_tree(run_id)?;
        let keys: Vec<String> = tree.keys().into_iter().collect();
        tree::select(&tree, &keys)
    }

    /// Other runs of the same experiment whose parameter hierarchy matches
    /// this run's. Partial matching is asymmetric: a run with extra
    /// parameters matches, a run missing one does not.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the run does not exist or has no
    /// parameter values.
    pub fn find_matching_runs(&self, run_id: RunId, partial: bool) -> Result<Vec<RunId>> {
        let values = self.transaction(|tx| {
            let run = require_run(tx, run_id)?;
            tx.experiment_values(run.experiment_id(), Some(VariableType::Parameter))
        })?;

        let mut per_run: BTreeMap<RunId, Vec<KeyedValue>> = BTreeMap::new();
        for keyed in values {
            per_run.entry(keyed.record.run_id()).or_default().push(keyed);
        }
        let raw: BTreeMap<RunId, Vec<RawValue>> = per_run
            .into_iter()
            .map(|(id, keyed)| (id, RawValue::from_keyed(keyed)))
            .collect();

        let matches = tree::matching_runs(run_id, &raw, partial)?;
        debug!(run_id = %run_id, partial, candidates = raw.len(), matches = matches.len(), "matched runs");
        Ok(matches)
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::validation("experiment name must not be empty"));
    }
    Ok(())
}

fn require_experiment(tx: &mut dyn Transaction, id: ExperimentId) -> Result<ExperimentRecord> {
    tx.experiment_by_id(id)?
        .ok_or_else(|| Error::not_found(format!("experiment {id}")))
}

fn require_run(tx: &mut dyn Transaction, id: RunId) -> Result<RunRecord> {
    tx.run_by_id(id)?
        .ok_or_else(|| Error::not_found(format!("run {id}")))
}

/// Fetch a step value and check it belongs to `run_id`.
fn require_step(tx: &mut dyn Transaction, run_id: RunId, step_id: ValueId) -> Result<ValueRecord> {
    let step = tx
        .value_by_id(step_id)?
        .ok_or_else(|| Error::not_found(format!("step value {step_id} for run {run_id}")))?;
    if step.run_id() != run_id {
        return Err(Error::InvalidStep(format!(
            "step value {step_id} belongs to run {}, not run {run_id}",
            step.run_id()
        )));
    }
    Ok(step)
}

/// Fail if a value logged under `step` would exceed [`MAX_STEP_DEPTH`].
fn require_depth(tx: &mut dyn Transaction, step: &ValueRecord) -> Result<()> {
    let mut depth = 1;
    let mut cursor = step.step_id();
    while let Some(id) = cursor {
        depth += 1;
        if depth >= MAX_STEP_DEPTH {
            break;
        }
        cursor = tx.value_by_id(id)?.and_then(|v| v.step_id());
    }
    if depth >= MAX_STEP_DEPTH {
        return Err(Error::InvalidStep(format!(
            "step value {} of run {} is at depth {depth}; values are limited to depth {MAX_STEP_DEPTH}",
            step.id(),
            step.run_id()
        )));
    }
    Ok(())
}

/// Body of `log_value`, inside one transaction.
fn log_in(tx: &mut dyn Transaction, request: &LogRequest<'_>) -> Result<ValueRecord> {
    let run = require_run(tx, request.run_id)?;
    let experiment_id = run.experiment_id();

    let parent_id = match request.step {
        None => None,
        Some(step_id) => {
            let step = require_step(tx, request.run_id, step_id)?;
            require_depth(tx, &step)?;
            let parent = tx.variable_by_id(step.variable_id())?.ok_or_else(|| {
                Error::Storage(format!(
                    "step value {step_id} references missing variable {}",
                    step.variable_id()
                ))
            })?;
            if parent.kind() == VariableType::Metric {
                return Err(Error::StepConflict(format!(
                    "metric '{}' cannot be used as a step (run {}, experiment {experiment_id})",
                    parent.key(),
                    request.run_id
                )));
            }
            match parent.is_step() {
                Some(true) => {}
                Some(false) => {
                    return Err(Error::InvalidStep(format!(
                        "variable '{}' is not a step (run {}, experiment {experiment_id})",
                        parent.key(),
                        request.run_id
                    )));
                }
                None => {
                    tx.promote_step(parent.id())?;
                    debug!(variable_id = %parent.id(), key = parent.key(), "promoted variable to step");
                }
            }
            Some(parent.id())
        }
    };

    let mut variable = resolve_variable(
        tx,
        NewVariable {
            experiment_id,
            key: request.key,
            parent_id,
            kind: request.kind,
            is_step: (request.expect_step == Some(true)).then_some(true),
        },
    )?;

    match (request.expect_step, variable.is_step()) {
        (Some(expected), Some(actual)) if expected != actual => {
            let reason = if actual {
                "is used as a step and cannot be logged as a metric"
            } else {
                "is not a step"
            };
            return Err(Error::StepConflict(format!(
                "variable '{}' {reason} (run {}, experiment {experiment_id})",
                request.key, request.run_id
            )));
        }
        (Some(true), None) => {
            tx.promote_step(variable.id())?;
            variable.promote_step();
        }
        _ => {}
    }

    if request.kind.is_explicit() && variable.kind() != request.kind {
        return Err(Error::TypeConflict {
            key: request.key.to_string(),
            experiment_id: experiment_id.to_string(),
            stored: variable.kind().to_string(),
            requested: request.kind.to_string(),
        });
    }

    tx.insert_value(NewValue {
        run_id: request.run_id,
        variable_id: variable.id(),
        value: &request.value,
        timestamp: Utc::now(),
        step_id: request.step,
    })
}

/// Insert-or-fetch a variable. A conflict whose winner is not visible is
/// retried once; a second one is fatal.
fn resolve_variable(tx: &mut dyn Transaction, new: NewVariable<'_>) -> Result<VariableRecord> {
    for attempt in 0..2 {
        match tx.insert_variable(new.clone()) {
            Ok(created) => {
                debug!(
                    variable_id = %created.id(),
                    key = new.key,
                    experiment_id = %new.experiment_id,
                    "created variable"
                );
                return Ok(created);
            }
            Err(Error::Conflict(_)) => {
                if let Some(existing) =
                    tx.find_variable(new.experiment_id, new.key, new.parent_id)?
                {
                    return Ok(existing);
                }
                warn!(attempt, key = new.key, experiment_id = %new.experiment_id, "variable insert conflicted but no row is visible, retrying");
            }
            Err(other) => return Err(other),
        }
    }
    Err(Error::validation(format!(
        "variable '{}' in experiment {} could not be resolved",
        new.key, new.experiment_id
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;

    fn store_with_run() -> (TrackingStore, RunRecord) {
        let store = TrackingStore::new(MemoryBackend::new());
        let exp = store.create_experiment("exp", None).unwrap();
        let run = store.start_run(exp.id(), Some("run")).unwrap();
        (store, run)
    }

    #[test]
    fn test_store_default_run_name() {
        let store = TrackingStore::new(MemoryBackend::new());
        let exp = store.create_experiment("exp", None).unwrap();
        let run = store.start_run(exp.id(), None).unwrap();
        assert_eq!(run.name().split('-').count(), 3);
    }

    #[test]
    fn test_failed_log_rolls_back_variable() {
        let (store, run) = store_with_run();
        store.log_param(run.id(), "lr", 0.1, None).unwrap();

        // Fails after creating `acc` would have been possible; nothing may stick.
        let err = store
            .log_metric(run.id(), "acc", 0.5, Some(ValueId::new(9999)))
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        let raw = store.get_raw_values(run.id()).unwrap();
        assert_eq!(raw.len(), 1);
    }

    #[test]
    fn test_promotion_rolled_back_with_failed_child() {
        let (store, run) = store_with_run();
        let epoch = store.log_param(run.id(), "epoch", 1, None).unwrap();
        store.log_param(run.id(), "acc", 0.5, Some(epoch.id())).unwrap();

        // `acc` under epoch is a parameter; logging it as a metric conflicts,
        // and the transaction must not leave anything behind.
        let err = store.log_metric(run.id(), "acc", 0.7, Some(epoch.id())).unwrap_err();
        assert!(matches!(err, Error::TypeConflict { .. }));
        assert_eq!(store.get_raw_values(run.id()).unwrap().len(), 2);
    }

    #[test]
    fn test_log_step_marks_variable() {
        let (store, run) = store_with_run();
        store.log_step(run.id(), "epoch", 1, None).unwrap();
        let err = store.log_metric(run.id(), "epoch", 2, None).unwrap_err();
        assert!(matches!(err, Error::StepConflict(_)));
    }

    #[test]
    fn test_metric_cannot_be_step() {
        let (store, run) = store_with_run();
        let loss = store.log_metric(run.id(), "loss", 0.3, None).unwrap();
        let err = store.log_param(run.id(), "lr", 0.1, Some(loss.id())).unwrap_err();
        assert!(matches!(err, Error::StepConflict(_)));
    }

    #[test]
    fn test_step_chain_limited_to_max_depth() {
        let (store, run) = store_with_run();
        let mut step = store.log_step(run.id(), "level", 1, None).unwrap();
        for depth in 2..=i64::try_from(MAX_STEP_DEPTH).unwrap() {
            step = store.log_step(run.id(), "level", depth, Some(step.id())).unwrap();
        }

        let err = store.log_param(run.id(), "level", 0, Some(step.id())).unwrap_err();
        assert!(matches!(err, Error::InvalidStep(_)));
        assert_eq!(store.step_tree(run.id()).unwrap().depth(), MAX_STEP_DEPTH);
    }

    #[test]
    fn test_non_finite_value_rejected() {
        let (store, run) = store_with_run();
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = store.log_metric(run.id(), "loss", bad, None).unwrap_err();
            assert!(matches!(err, Error::Validation(ref m) if m.contains("'loss'")));
        }
        let nested = LogValue::from(vec![LogValue::from(1.0), LogValue::from(f64::NAN)]);
        assert!(store.log_param(run.id(), "grid", nested, None).is_err());
        assert!(store.get_raw_values(run.id()).unwrap().is_empty());
    }

    #[test]
    fn test_get_param_with_default() {
        let (store, run) = store_with_run();
        let value = store
            .get_param(run.id(), "missing", Some(LogValue::from(3)), None)
            .unwrap();
        assert_eq!(value, LogValue::from(3));
    }
}
