//! Experiment Tracking Example
//!
//! A simulated training loop logged with step-nested metrics, then read
//! back as rows.
//!
//! Run with: cargo run --example experiment_tracking
//! Persist to disk with: TRUENO_TRACK_DB=/tmp/track.db cargo run --example experiment_tracking

use std::collections::BTreeMap;

use anyhow::Context;
use trueno_track::artifact::ArtifactRegistry;
use trueno_track::{LogValue, TrackerConfig};

fn main() -> anyhow::Result<()> {
    let config = TrackerConfig::default()
        .artifact_root("mem://artifacts")
        .with_env();
    config.init_logging();

    println!("=== Trueno-Track Experiment Tracking ===\n");

    let store = config.open().context("opening tracking store")?;
    let registry = ArtifactRegistry::with_defaults();

    // -------------------------------------------------------------------------
    // 1. Experiment and run
    // -------------------------------------------------------------------------
    println!("1. Starting run...");

    let experiment = store.experiment("resnet50-imagenet")?;
    let run = experiment.start_run(None)?;
    println!("   Experiment: {}", experiment.name());
    println!("   Run: {} ({})", run.name(), run.record().uuid());

    // -------------------------------------------------------------------------
    // 2. Hyperparameters (nested maps become dotted keys)
    // -------------------------------------------------------------------------
    println!("\n2. Logging hyperparameters...");

    let mut optimizer = BTreeMap::new();
    optimizer.insert("name".to_string(), LogValue::from("adam"));
    optimizer.insert("lr".to_string(), LogValue::from(0.001));
    let mut params = BTreeMap::new();
    params.insert("optimizer".to_string(), LogValue::from(optimizer));
    params.insert("batch_size".to_string(), LogValue::from(32));
    for value in run.log_params(&params)? {
        println!("   value #{} logged", value.id());
    }

    // -------------------------------------------------------------------------
    // 3. Training loop: epoch is a step, metrics hang under it
    // -------------------------------------------------------------------------
    println!("\n3. Simulating training (5 epochs x 3 batches)...");

    for epoch in 0..5 {
        let epoch_step = run.log_step("epoch", epoch)?;
        for batch in 0..3 {
            let batch_step = run.log_step_at("batch", batch, &epoch_step)?;
            let loss = 2.5 / (f64::from(epoch * 3 + batch) + 1.0) + 0.1;
            run.log_metric_at("loss", loss, &batch_step)?;
        }
        let accuracy = 0.05f64.mul_add(f64::from(epoch), 0.5);
        run.log_metric_at("accuracy", accuracy, &epoch_step)?;
    }

    // -------------------------------------------------------------------------
    // 4. Read back as rows
    // -------------------------------------------------------------------------
    println!("\n4. Accuracy per epoch:");
    for row in run.select(&["epoch", "accuracy"])? {
        println!("   epoch {} -> {}", row["epoch"], row["accuracy"]);
    }

    println!("\n   Loss per batch (epoch 4):");
    for row in run.select(&["epoch", "batch", "loss"])? {
        if row.get("epoch") == Some(&LogValue::from(4)) {
            println!("   batch {} -> {:.4}", row["batch"], row["loss"].as_f64().unwrap_or_default());
        }
    }

    // -------------------------------------------------------------------------
    // 5. Artifact
    // -------------------------------------------------------------------------
    println!("\n5. Saving model artifact...");
    let uri = run.save_artifact(&registry, "model_final.pt", b"not really weights")?;
    println!("   Stored at {uri}");
    println!("   {} bytes read back", run.load_artifact(&registry, "model_final.pt")?.len());

    // -------------------------------------------------------------------------
    // 6. Tree as JSON
    // -------------------------------------------------------------------------
    println!("\n6. Step tree depth: {}", run.tree()?.depth());
    let first = run.get_logs()?.into_iter().next().unwrap_or_default();
    println!("   First leaf path:\n{}", serde_json::to_string_pretty(&first)?);

    println!("\n=== Experiment Tracking Complete ===");
    Ok(())
}
