//! Concurrent writers converge on one variable row.

use std::sync::{Arc, Barrier};
use std::thread;

use tempfile::TempDir;
use trueno_track::backend::{MemoryBackend, SqliteBackend};
use trueno_track::{ExperimentId, RunId, TrackingStore};

const THREADS: usize = 8;

/// Log `lr` from `THREADS` threads at once, one run each, and return the
/// variable ids they observed.
fn race(stores: &[Arc<TrackingStore>], runs: &[RunId]) -> Vec<i64> {
    let barrier = Arc::new(Barrier::new(runs.len()));
    let handles: Vec<_> = runs
        .iter()
        .enumerate()
        .map(|(i, &run)| {
            let store = Arc::clone(&stores[i % stores.len()]);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                store
                    .log_param(run, "optimizer.lr", 0.01, None)
                    .expect("log_param")
                    .variable_id()
                    .get()
            })
        })
        .collect();
    handles
        .into_iter()
        .map(|h| h.join().expect("thread panicked"))
        .collect()
}

fn start_runs(store: &TrackingStore, experiment: ExperimentId) -> Vec<RunId> {
    (0..THREADS)
        .map(|_| store.start_run(experiment, None).expect("start_run").id())
        .collect()
}

#[test]
fn test_memory_backend_single_variable() {
    let store = Arc::new(TrackingStore::new(MemoryBackend::new()));
    let exp = store.create_experiment("race", None).unwrap();
    let runs = start_runs(&store, exp.id());

    let ids = race(&[Arc::clone(&store)], &runs);
    assert!(ids.windows(2).all(|w| w[0] == w[1]), "{ids:?}");
    assert_eq!(store.find_matching_runs(runs[0], false).unwrap().len(), THREADS - 1);
}

#[test]
fn test_sqlite_shared_connection_single_variable() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(TrackingStore::new(
        SqliteBackend::open(dir.path().join("race.db")).unwrap(),
    ));
    let exp = store.create_experiment("race", None).unwrap();
    let runs = start_runs(&store, exp.id());

    let ids = race(&[Arc::clone(&store)], &runs);
    assert!(ids.windows(2).all(|w| w[0] == w[1]), "{ids:?}");
}

#[test]
fn test_sqlite_separate_connections_single_variable() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("race.db");
    let stores: Vec<Arc<TrackingStore>> = (0..2)
        .map(|_| Arc::new(TrackingStore::new(SqliteBackend::open(&path).unwrap())))
        .collect();
    let exp = stores[0].create_experiment("race", None).unwrap();
    let runs = start_runs(&stores[0], exp.id());

    let ids = race(&stores, &runs);
    assert!(ids.windows(2).all(|w| w[0] == w[1]), "{ids:?}");

    for run in &runs {
        assert_eq!(stores[1].get_raw_values(*run).unwrap().len(), 1);
    }
}
