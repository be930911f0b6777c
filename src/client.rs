//! High-level handles over [`TrackingStore`].
//!
//! [`Experiment`] and [`Run`] borrow the store and carry their record, so
//! callers stop threading ids through every call:
//!
//! ```rust
//! use trueno_track::{backend::MemoryBackend, TrackingStore};
//!
//! let store = TrackingStore::new(MemoryBackend::new());
//! let exp = store.experiment("mnist")?;
//! let run = exp.start_run(Some("baseline"))?;
//!
//! run.log_param("lr", 0.01)?;
//! for epoch in 1..=3 {
//!     let step = run.log_step("epoch", epoch)?;
//!     run.log_metric_at("acc", 0.7 + f64::from(epoch) / 10.0, &step)?;
//! }
//!
//! assert_eq!(run.select(&["epoch", "acc"])?.len(), 3);
//! # Ok::<(), trueno_track::Error>(())
//! ```

use std::collections::BTreeMap;

use crate::artifact::{artifact_location, run_artifact_root, ArtifactRegistry};
use crate::experiment::{
    ExperimentRecord, RunId, RunRecord, TrackingStore, ValueRecord, VariableType,
};
use crate::tree::{Record, StepTree};
use crate::value::LogValue;
use crate::Result;

impl TrackingStore {
    /// Handle to the experiment `name`, created if needed.
    ///
    /// # Errors
    ///
    /// Returns error on an empty name or backend failure.
    pub fn experiment(&self, name: &str) -> Result<Experiment<'_>> {
        Ok(Experiment {
            store: self,
            record: self.get_or_create_experiment(name)?,
        })
    }

    /// Handle to an existing run.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NotFound`] if the run does not exist.
    pub fn run(&self, id: RunId) -> Result<Run<'_>> {
        Ok(Run {
            store: self,
            record: self.get_run(id)?,
        })
    }
}

/// Experiment handle.
#[derive(Debug, Clone)]
pub struct Experiment<'s> {
    store: &'s TrackingStore,
    record: ExperimentRecord,
}

impl<'s> Experiment<'s> {
    /// Underlying record, as of when the handle was created.
    #[must_use]
    pub const fn record(&self) -> &ExperimentRecord {
        &self.record
    }

    /// Experiment name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.record.name()
    }

    /// Start a run; a name is generated when `None`.
    ///
    /// # Errors
    ///
    /// Returns error if the experiment was deleted meanwhile.
    pub fn start_run(&self, name: Option<&str>) -> Result<Run<'s>> {
        Ok(Run {
            store: self.store,
            record: self.store.start_run(self.record.id(), name)?,
        })
    }

    /// Runs, newest first.
    ///
    /// # Errors
    ///
    /// Returns error if the experiment was deleted meanwhile.
    pub fn runs(&self) -> Result<Vec<Run<'s>>> {
        self.search_runs(None, None)
    }

    /// Runs filtered by name and root-level parameter values, newest first.
    ///
    /// # Errors
    ///
    /// Returns error if the experiment was deleted meanwhile.
    pub fn search_runs(
        &self,
        name: Option<&str>,
        parameter_equals: Option<&BTreeMap<String, LogValue>>,
    ) -> Result<Vec<Run<'s>>> {
        Ok(self
            .store
            .search_runs(self.record.id(), name, parameter_equals)?
            .into_iter()
            .map(|record| Run {
                store: self.store,
                record,
            })
            .collect())
    }

    /// Rename the experiment.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::AlreadyExists`] if the name is taken.
    pub fn rename(&mut self, name: &str) -> Result<()> {
        self.store.rename_experiment(self.record.id(), name)?;
        self.record.set_name(name);
        Ok(())
    }

    /// Set the artifact location for this experiment's runs.
    ///
    /// # Errors
    ///
    /// Returns error if the experiment was deleted meanwhile.
    pub fn set_artifact_uri(&mut self, uri: &str) -> Result<()> {
        self.store.set_artifact_uri(self.record.id(), Some(uri))?;
        self.record.set_artifact_uri(Some(uri.to_string()));
        Ok(())
    }
}

/// Run handle.
#[derive(Debug, Clone)]
pub struct Run<'s> {
    store: &'s TrackingStore,
    record: RunRecord,
}

impl<'s> Run<'s> {
    /// Underlying record, as of when the handle was created.
    #[must_use]
    pub const fn record(&self) -> &RunRecord {
        &self.record
    }

    /// Run id.
    #[must_use]
    pub const fn id(&self) -> RunId {
        self.record.id()
    }

    /// Run name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.record.name()
    }

    /// Log a root-level parameter.
    ///
    /// # Errors
    ///
    /// See [`TrackingStore::log_value`].
    pub fn log_param(&self, key: &str, value: impl Into<LogValue>) -> Result<ValueRecord> {
        self.store.log_param(self.id(), key, value, None)
    }

    /// Log a parameter under `step`.
    ///
    /// # Errors
    ///
    /// See [`TrackingStore::log_value`].
    pub fn log_param_at(
        &self,
        key: &str,
        value: impl Into<LogValue>,
        step: &ValueRecord,
    ) -> Result<ValueRecord> {
        self.store.log_param(self.id(), key, value, Some(step.id()))
    }

    /// Log a nested map of root-level parameters as dotted keys.
    ///
    /// # Errors
    ///
    /// See [`TrackingStore::log_values`].
    pub fn log_params(&self, params: &BTreeMap<String, LogValue>) -> Result<Vec<ValueRecord>> {
        self.store
            .log_values(self.id(), params, VariableType::Parameter, None, None)
    }

    /// Log a root-level metric.
    ///
    /// # Errors
    ///
    /// See [`TrackingStore::log_metric`].
    pub fn log_metric(&self, key: &str, value: impl Into<LogValue>) -> Result<ValueRecord> {
        self.store.log_metric(self.id(), key, value, None)
    }

    /// Log a metric under `step`.
    ///
    /// # Errors
    ///
    /// See [`TrackingStore::log_metric`].
    pub fn log_metric_at(
        &self,
        key: &str,
        value: impl Into<LogValue>,
        step: &ValueRecord,
    ) -> Result<ValueRecord> {
        self.store.log_metric(self.id(), key, value, Some(step.id()))
    }

    /// Log a nested map of metrics, optionally under `step`.
    ///
    /// # Errors
    ///
    /// See [`TrackingStore::log_values`].
    pub fn log_metrics(
        &self,
        metrics: &BTreeMap<String, LogValue>,
        step: Option<&ValueRecord>,
    ) -> Result<Vec<ValueRecord>> {
        self.store.log_values(
            self.id(),
            metrics,
            VariableType::Metric,
            step.map(ValueRecord::id),
            None,
        )
    }

    /// Log a step value; pass the returned record to the `*_at` methods.
    ///
    /// # Errors
    ///
    /// See [`TrackingStore::log_step`].
    pub fn log_step(&self, key: &str, value: impl Into<LogValue>) -> Result<ValueRecord> {
        self.store.log_step(self.id(), key, value, None)
    }

    /// Log a step nested under another step.
    ///
    /// # Errors
    ///
    /// See [`TrackingStore::log_step`].
    pub fn log_step_at(
        &self,
        key: &str,
        value: impl Into<LogValue>,
        step: &ValueRecord,
    ) -> Result<ValueRecord> {
        self.store.log_step(self.id(), key, value, Some(step.id()))
    }

    /// Point lookup of a root-level value.
    ///
    /// # Errors
    ///
    /// See [`TrackingStore::get_param`].
    pub fn get_param(&self, key: &str, default: Option<LogValue>) -> Result<LogValue> {
        self.store.get_param(self.id(), key, default, None)
    }

    /// Point lookup of a value logged under `step`.
    ///
    /// # Errors
    ///
    /// See [`TrackingStore::get_param`].
    pub fn get_param_at(&self, key: &str, step: &ValueRecord) -> Result<LogValue> {
        self.store.get_param(self.id(), key, None, Some(step.id()))
    }

    /// Every logged key, one record per leaf path.
    ///
    /// # Errors
    ///
    /// Returns error if the run was deleted meanwhile.
    pub fn get_logs(&self) -> Result<Vec<Record>> {
        self.store.get_logs(self.id())
    }

    /// Selected keys, one record per leaf path.
    ///
    /// # Errors
    ///
    /// Returns error if the run was deleted meanwhile.
    pub fn select<S: AsRef<str>>(&self, keys: &[S]) -> Result<Vec<Record>> {
        self.store.select(self.id(), keys)
    }

    /// Step hierarchy of this run.
    ///
    /// # Errors
    ///
    /// Returns error if the run was deleted meanwhile.
    pub fn tree(&self) -> Result<StepTree> {
        self.store.step_tree(self.id())
    }

    /// Runs of the same experiment with matching parameters.
    ///
    /// # Errors
    ///
    /// See [`TrackingStore::find_matching_runs`].
    pub fn find_matching(&self, partial: bool) -> Result<Vec<RunId>> {
        self.store.find_matching_runs(self.id(), partial)
    }

    /// Set or clear the description.
    ///
    /// # Errors
    ///
    /// Returns error if the run was deleted meanwhile.
    pub fn set_description(&mut self, description: Option<&str>) -> Result<()> {
        self.store.set_run_description(self.id(), description)?;
        self.record.set_description(description.map(ToString::to_string));
        Ok(())
    }

    /// Store `bytes` as artifact `name`; returns the artifact URI.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Validation`] if the experiment has no
    /// artifact URI or its scheme is not registered.
    pub fn save_artifact(
        &self,
        registry: &ArtifactRegistry,
        name: &str,
        bytes: &[u8],
    ) -> Result<String> {
        let uri = self.artifact_uri(name)?;
        registry.save(&uri, bytes)?;
        Ok(uri)
    }

    /// Load artifact `name`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NotFound`] if it was never saved.
    pub fn load_artifact(&self, registry: &ArtifactRegistry, name: &str) -> Result<Vec<u8>> {
        registry.load(&self.artifact_uri(name)?)
    }

    /// Delete this run, its values and every artifact saved under it.
    ///
    /// Without an experiment artifact URI only the run is deleted.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Validation`] if the artifact scheme is not
    /// registered (nothing is deleted then), or the store's error.
    pub fn delete(self, registry: &ArtifactRegistry) -> Result<()> {
        let experiment = self.store.experiment_by_id(self.record.experiment_id())?;
        let artifacts = match experiment.artifact_uri() {
            Some(_) => {
                let root = run_artifact_root(&experiment, &self.record)?;
                registry.resolve(&root)?;
                Some(root)
            }
            None => None,
        };
        self.store.delete_run(self.id())?;
        if let Some(root) = artifacts {
            registry.delete_prefix(&root)?;
        }
        Ok(())
    }

    /// URI of artifact `name`, whether saved or not.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Validation`] if the experiment has no
    /// artifact URI.
    pub fn artifact_uri(&self, name: &str) -> Result<String> {
        let experiment = self.store.experiment_by_id(self.record.experiment_id())?;
        artifact_location(&experiment, &self.record, name)
    }
}
