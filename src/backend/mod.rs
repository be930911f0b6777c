//! Persistence backends
//!
//! The tracking store never talks to storage directly. It opens one
//! [`Transaction`] per public operation through a [`Backend`], and every
//! relational query it needs is a method on that transaction:
//!
//! ```text
//! experiment(id, name, description, artifact_uri)
//! run(id, experiment_id, name, description, created_at, uuid)
//! variable(id, experiment_id, key, parent_id, type, is_step)
//!     UNIQUE (experiment_id, key, parent_id)
//! value(id, run_id, variable_id, value_json, timestamp, step_id -> value.id)
//! ```
//!
//! Two implementations ship with the crate:
//! - [`MemoryBackend`]: tables behind a mutex with an undo journal
//! - [`SqliteBackend`]: `rusqlite`, one `BEGIN IMMEDIATE` per transaction

mod memory;
mod sqlite;

pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::experiment::{
    ExperimentId, ExperimentRecord, KeyedValue, NewVariable, RunId, RunRecord, ValueId,
    ValueRecord, VariableId, VariableRecord, VariableType,
};
use crate::value::LogValue;
use crate::Result;

/// Source of transactions over the four tracking relations.
pub trait Backend: Send + Sync {
    /// Open a transaction. Blocks until the backend can serve it.
    ///
    /// # Errors
    ///
    /// Returns error if the backend cannot start a transaction.
    fn begin(&self) -> Result<Box<dyn Transaction + '_>>;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}

/// Fields of a run that does not exist yet.
#[derive(Debug, Clone)]
pub struct NewRun<'a> {
    /// Owning experiment
    pub experiment_id: ExperimentId,
    /// Human-readable name
    pub name: &'a str,
    /// Optional description
    pub description: Option<&'a str>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Globally unique identifier
    pub uuid: Uuid,
}

/// Fields of a value that does not exist yet.
#[derive(Debug, Clone)]
pub struct NewValue<'a> {
    /// Owning run
    pub run_id: RunId,
    /// Variable being observed
    pub variable_id: VariableId,
    /// Observation
    pub value: &'a LogValue,
    /// Observation time
    pub timestamp: DateTime<Utc>,
    /// Step context
    pub step_id: Option<ValueId>,
}

/// One unit of work. Dropping without [`Transaction::commit`] rolls back.
///
/// Insert methods that hit a uniqueness constraint return
/// [`crate::Error::Conflict`]; all other failures are propagated as-is.
pub trait Transaction {
    /// Make every change of this transaction durable.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails to commit.
    fn commit(self: Box<Self>) -> Result<()>;

    // ------------------------------------------------------------------
    // experiment
    // ------------------------------------------------------------------

    /// Insert an experiment. `Conflict` if the name is taken.
    ///
    /// # Errors
    ///
    /// Returns error on uniqueness conflict or backend failure.
    fn insert_experiment(
        &mut self,
        name: &str,
        description: Option<&str>,
        artifact_uri: Option<&str>,
    ) -> Result<ExperimentRecord>;

    /// Fetch an experiment by id.
    ///
    /// # Errors
    ///
    /// Returns error on backend failure.
    fn experiment_by_id(&mut self, id: ExperimentId) -> Result<Option<ExperimentRecord>>;

    /// Fetch an experiment by name.
    ///
    /// # Errors
    ///
    /// Returns error on backend failure.
    fn experiment_by_name(&mut self, name: &str) -> Result<Option<ExperimentRecord>>;

    /// All experiments, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns error on backend failure.
    fn list_experiments(&mut self) -> Result<Vec<ExperimentRecord>>;

    /// Rename. Returns `false` if the experiment does not exist,
    /// `Conflict` if the name is taken.
    ///
    /// # Errors
    ///
    /// Returns error on uniqueness conflict or backend failure.
    fn rename_experiment(&mut self, id: ExperimentId, name: &str) -> Result<bool>;

    /// Set or clear the artifact location. Returns `false` if absent.
    ///
    /// # Errors
    ///
    /// Returns error on backend failure.
    fn set_artifact_uri(&mut self, id: ExperimentId, uri: Option<&str>) -> Result<bool>;

    /// Delete an experiment with its runs, values and variables.
    /// Returns `false` if absent.
    ///
    /// # Errors
    ///
    /// Returns error on backend failure.
    fn delete_experiment(&mut self, id: ExperimentId) -> Result<bool>;

    // ------------------------------------------------------------------
    // run
    // ------------------------------------------------------------------

    /// Insert a run.
    ///
    /// # Errors
    ///
    /// Returns error on backend failure.
    fn insert_run(&mut self, run: NewRun<'_>) -> Result<RunRecord>;

    /// Fetch a run by id.
    ///
    /// # Errors
    ///
    /// Returns error on backend failure.
    fn run_by_id(&mut self, id: RunId) -> Result<Option<RunRecord>>;

    /// Runs of an experiment, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns error on backend failure.
    fn runs_for_experiment(&mut self, experiment_id: ExperimentId) -> Result<Vec<RunRecord>>;

    /// Set or clear a run description. Returns `false` if absent.
    ///
    /// # Errors
    ///
    /// Returns error on backend failure.
    fn set_run_description(&mut self, id: RunId, description: Option<&str>) -> Result<bool>;

    /// Delete a run with its values. Returns `false` if absent.
    ///
    /// # Errors
    ///
    /// Returns error on backend failure.
    fn delete_run(&mut self, id: RunId) -> Result<bool>;

    // ------------------------------------------------------------------
    // variable
    // ------------------------------------------------------------------

    /// Insert a variable. `Conflict` if `(experiment, key, parent)` exists.
    ///
    /// # Errors
    ///
    /// Returns error on uniqueness conflict or backend failure.
    fn insert_variable(&mut self, variable: NewVariable<'_>) -> Result<VariableRecord>;

    /// Fetch a variable by its identity triple.
    ///
    /// # Errors
    ///
    /// Returns error on backend failure.
    fn find_variable(
        &mut self,
        experiment_id: ExperimentId,
        key: &str,
        parent_id: Option<VariableId>,
    ) -> Result<Option<VariableRecord>>;

    /// Fetch a variable by id.
    ///
    /// # Errors
    ///
    /// Returns error on backend failure.
    fn variable_by_id(&mut self, id: VariableId) -> Result<Option<VariableRecord>>;

    /// Set `is_step = true`.
    ///
    /// # Errors
    ///
    /// Returns error on backend failure.
    fn promote_step(&mut self, id: VariableId) -> Result<()>;

    // ------------------------------------------------------------------
    // value
    // ------------------------------------------------------------------

    /// Append a value.
    ///
    /// # Errors
    ///
    /// Returns error on backend failure.
    fn insert_value(&mut self, value: NewValue<'_>) -> Result<ValueRecord>;

    /// Fetch a value by id.
    ///
    /// # Errors
    ///
    /// Returns error on backend failure.
    fn value_by_id(&mut self, id: ValueId) -> Result<Option<ValueRecord>>;

    /// Values of `run` for `variable` logged under exactly `step_id`
    /// (`None` = root level), ordered by id.
    ///
    /// # Errors
    ///
    /// Returns error on backend failure.
    fn find_values(
        &mut self,
        run_id: RunId,
        variable_id: VariableId,
        step_id: Option<ValueId>,
    ) -> Result<Vec<ValueRecord>>;

    /// Every value of a run joined with its variable, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns error on backend failure.
    fn run_values(&mut self, run_id: RunId) -> Result<Vec<KeyedValue>>;

    /// Every value of every run in an experiment joined with its variable,
    /// optionally restricted to one variable kind, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns error on backend failure.
    fn experiment_values(
        &mut self,
        experiment_id: ExperimentId,
        kind: Option<VariableType>,
    ) -> Result<Vec<KeyedValue>>;
}
