//! # Trueno-Track: Embedded Experiment Tracking
//!
//! **Version**: 0.1.0
//!
//! Trueno-Track records machine-learning experiments: named experiments own
//! runs, runs log parameter and metric values, and values may be nested
//! under *step* values (epoch, fold, batch). The flat log of a run is
//! rebuilt into a step tree that can be projected into rows or compared
//! against other runs.
//!
//! ## Design Principles
//!
//! - **Poka-Yoke typing**: a key is a parameter or a metric for the whole
//!   experiment; a metric can never be a step
//! - **Jidoka**: every store call is one transaction, so a rejected write
//!   leaves nothing behind
//! - **Backend equivalence**: memory and SQLite backends pass the same tests
//!
//! ## Example Usage
//!
//! ```rust
//! use trueno_track::{backend::MemoryBackend, LogValue, TrackingStore};
//!
//! let store = TrackingStore::new(MemoryBackend::new());
//! let run = store.experiment("mnist")?.start_run(Some("baseline"))?;
//!
//! run.log_param("lr", 0.01)?;
//! let epoch = run.log_step("epoch", 1)?;
//! run.log_metric_at("acc", 0.9, &epoch)?;
//!
//! let rows = run.select(&["lr", "epoch", "acc"])?;
//! assert_eq!(rows[0]["acc"], LogValue::from(0.9));
//! # Ok::<(), trueno_track::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod artifact;
pub mod backend;
pub mod client;
pub mod config;
pub mod error;
pub mod experiment;
pub mod logging;
pub mod names;
pub mod namespace;
pub mod tree;
pub mod value;

pub use client::{Experiment, Run};
pub use config::{BackendConfig, TrackerConfig};
pub use error::{Error, Result};
pub use experiment::{
    ExperimentId, ExperimentRecord, RawValue, RunId, RunRecord, TrackingStore, ValueId,
    ValueRecord, VariableId, VariableRecord, VariableType,
};
pub use namespace::Key;
pub use tree::{Record, StepTree};
pub use value::LogValue;
