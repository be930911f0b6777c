//! Run Matching Example
//!
//! A small grid search where some runs repeat a configuration. Full matching
//! finds exact repeats; partial matching finds runs that extend a config.
//!
//! Run with: cargo run --example run_matching

use std::collections::BTreeMap;

use trueno_track::backend::SqliteBackend;
use trueno_track::{LogValue, TrackingStore};

fn main() -> anyhow::Result<()> {
    println!("=== Trueno-Track Run Matching ===\n");

    let store = TrackingStore::new(SqliteBackend::open_in_memory()?);
    let experiment = store.experiment("lr-sweep")?;

    let grid = [
        ("base-a", 0.01, None),
        ("base-b", 0.01, None),
        ("warmup", 0.01, Some(500)),
        ("fast", 0.1, None),
    ];

    let mut ids = BTreeMap::new();
    for (name, lr, warmup) in grid {
        let run = experiment.start_run(Some(name))?;
        run.log_param("lr", lr)?;
        if let Some(steps) = warmup {
            run.log_param("warmup_steps", steps)?;
        }
        for seed in 0..2 {
            let fold = run.log_step("seed", seed)?;
            run.log_metric_at("val_loss", lr * 10.0 + f64::from(seed), &fold)?;
        }
        ids.insert(run.id(), name);
    }

    let name_of = |matches: Vec<trueno_track::RunId>| -> Vec<&str> {
        matches.iter().filter_map(|id| ids.get(id).copied()).collect()
    };

    let base = experiment.search_runs(Some("base-a"), None)?;
    let base = base.first().ok_or_else(|| anyhow::anyhow!("base-a not found"))?;

    println!("Full matches of base-a:    {:?}", name_of(base.find_matching(false)?));
    println!("Partial matches of base-a: {:?}", name_of(base.find_matching(true)?));

    let mut filter = BTreeMap::new();
    filter.insert("lr".to_string(), LogValue::from(0.1));
    let fast: Vec<String> = experiment
        .search_runs(None, Some(&filter))?
        .iter()
        .map(|r| r.name().to_string())
        .collect();
    println!("Runs with lr=0.1:          {fast:?}");

    println!("\n=== Run Matching Complete ===");
    Ok(())
}
