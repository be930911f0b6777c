//! Experiment Tracking Schema
//!
//! Records of the four tracking relations and the store that writes them.
//!
//! ## Schema Overview
//!
//! ```text
//! ExperimentRecord (1) ──< RunRecord (N) ──< ValueRecord (N)
//!        │                                        │   │
//!        └──────────< VariableRecord (N) >────────┘   └─ step_id -> ValueRecord
//!                          └─ parent_id -> VariableRecord
//! ```
//!
//! Variables belong to the experiment, so every run of an experiment shares
//! the declared kind and step-ness of a key. Values belong to a run and may
//! point at an earlier value of the same run as their step.
//!
//! ## Usage
//!
//! ```rust
//! use trueno_track::backend::MemoryBackend;
//! use trueno_track::experiment::TrackingStore;
//!
//! let store = TrackingStore::new(MemoryBackend::new());
//! let exp = store.create_experiment("resnet", Some("depth sweep"))?;
//! let run = store.start_run(exp.id(), None)?;
//!
//! store.log_param(run.id(), "depth", 50, None)?;
//! let epoch = store.log_step(run.id(), "epoch", 1, None)?;
//! store.log_metric(run.id(), "loss", 0.42, Some(epoch.id()))?;
//!
//! assert_eq!(store.get_logs(run.id())?.len(), 1);
//! # Ok::<(), trueno_track::Error>(())
//! ```

mod experiment_record;
mod ids;
mod run_record;
mod store;
mod value_record;
mod variable_record;

pub use experiment_record::{ExperimentRecord, ExperimentRecordBuilder};
pub use ids::{ExperimentId, RunId, ValueId, VariableId};
pub use run_record::{RunRecord, RunRecordBuilder};
pub use store::TrackingStore;
pub use value_record::{KeyedValue, RawValue, ValueRecord};
pub use variable_record::{NewVariable, VariableRecord, VariableType};
