//! Step tree benchmarks
//!
//! Toyota Way: Genchi Genbutsu (measure, don't guess)
//!
//! Tree building and selection run on every `select`/`get_logs` call and
//! matching normalizes one tree per run of the experiment.
//!
//! Run with: cargo bench --bench tree_benchmarks

use std::collections::BTreeMap;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use trueno_track::backend::MemoryBackend;
use trueno_track::tree::{matching_runs, select};
use trueno_track::{LogValue, RawValue, RunId, StepTree, TrackingStore, ValueId};

const EPOCHS: [usize; 3] = [10, 100, 1_000];
const BATCHES: usize = 10;

/// Flat values of a run with `epochs` epochs of `BATCHES` batches each.
fn training_run(epochs: usize) -> Vec<RawValue> {
    let mut values = Vec::with_capacity(epochs * (BATCHES * 2 + 2) + 1);
    let mut next = 0i64;
    let mut push = |values: &mut Vec<RawValue>, step: Option<i64>, is_step: bool, key: &str, value: LogValue| {
        next += 1;
        values.push(RawValue {
            value_id: ValueId::new(next),
            step_id: step.map(ValueId::new),
            is_step,
            key: key.to_string(),
            value,
        });
        next
    };

    push(&mut values, None, false, "lr", LogValue::from(0.01));
    for epoch in 0..epochs {
        let e = push(&mut values, None, true, "epoch", LogValue::from(epoch as i64));
        for batch in 0..BATCHES {
            let b = push(&mut values, Some(e), true, "batch", LogValue::from(batch as i64));
            push(&mut values, Some(b), false, "loss", LogValue::from(1.0 / (batch as f64 + 1.0)));
        }
        push(&mut values, Some(e), false, "acc", LogValue::from(0.5));
    }
    values
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("step_tree_build");
    for epochs in EPOCHS {
        let values = training_run(epochs);
        group.bench_with_input(BenchmarkId::new("build", values.len()), &values, |b, values| {
            b.iter(|| StepTree::build(black_box(values)));
        });
    }
    group.finish();
}

fn bench_select(c: &mut Criterion) {
    let mut group = c.benchmark_group("step_tree_select");
    for epochs in EPOCHS {
        let tree = StepTree::build(&training_run(epochs));
        group.bench_with_input(BenchmarkId::new("epoch_acc", epochs), &tree, |b, tree| {
            b.iter(|| select(black_box(tree), &["epoch", "acc"]));
        });
        group.bench_with_input(BenchmarkId::new("full_path", epochs), &tree, |b, tree| {
            b.iter(|| select(black_box(tree), &["lr", "epoch", "batch", "loss"]));
        });
        group.bench_with_input(BenchmarkId::new("aggregate_loss", epochs), &tree, |b, tree| {
            b.iter(|| select(black_box(tree), &["loss"]));
        });
    }
    group.finish();
}

fn bench_matching(c: &mut Criterion) {
    let mut group = c.benchmark_group("run_matching");
    for runs in [10usize, 100, 1_000] {
        let experiment: BTreeMap<RunId, Vec<RawValue>> = (0..runs)
            .map(|i| {
                let mut values = training_run(5);
                values.retain(|v| v.key != "loss" && v.key != "acc");
                for v in &mut values {
                    v.is_step = false;
                    v.step_id = None;
                }
                values[0].value = LogValue::from(0.01 * (i % 4) as f64);
                (RunId::new(i as i64 + 1), values)
            })
            .collect();
        group.bench_with_input(BenchmarkId::new("partial", runs), &experiment, |b, exp| {
            b.iter(|| matching_runs(RunId::new(1), black_box(exp), true));
        });
    }
    group.finish();
}

fn bench_store_logging(c: &mut Criterion) {
    c.bench_function("memory_store_log_epoch", |b| {
        let store = TrackingStore::new(MemoryBackend::new());
        let run = store
            .experiment("bench")
            .and_then(|exp| exp.start_run(None))
            .map(|run| run.id())
            .unwrap();
        let mut epoch = 0i64;
        b.iter(|| {
            epoch += 1;
            let step = store.log_step(run, "epoch", epoch, None).unwrap();
            store.log_metric(run, "acc", 0.5, Some(step.id())).unwrap();
        });
    });
}

criterion_group!(benches, bench_build, bench_select, bench_matching, bench_store_logging);
criterion_main!(benches);
