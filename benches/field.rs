//! Criterion benchmarks for the crystalfield tick loop.
//!
//! Run with:
//!   cargo bench
//!
//! Results are saved to target/criterion/

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use crystalfield::prelude::*;

/// A field that has already grown detectors over `alphabet` distinct tokens.
fn trained_field(alphabet: usize) -> Field {
    let mut field = Field::new();
    let tokens: Vec<String> = (0..alphabet).map(|i| i.to_string()).collect();
    for _ in 0..4 {
        for w in tokens.windows(2) {
            let episode = [w[0].as_str(), w[1].as_str(), w[0].as_str(), w[1].as_str(), w[0].as_str(), w[1].as_str()];
            field.run_episode(&episode).expect("episode");
        }
        field.run_episode(&tokens).expect("episode");
    }
    field
}

/// Steady-state ticks with learning on, by alphabet size.
fn bench_step_alphabet(c: &mut Criterion) {
    let mut group = c.benchmark_group("step_alphabet");

    for size in [4usize, 16, 64].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::new("train", size), size, |b, &size| {
            let mut field = trained_field(size);
            let tokens: Vec<String> = (0..size).map(|i| i.to_string()).collect();
            b.iter(|| {
                for t in &tokens {
                    black_box(field.step(t).len());
                }
            });
        });
    }

    group.finish();
}

/// Inference-only ticks over a trained field.
fn bench_step_test_mode(c: &mut Criterion) {
    let mut group = c.benchmark_group("step_mode");
    let size = 16;
    group.throughput(Throughput::Elements(size as u64));

    group.bench_function("test_16", |b| {
        let mut field = trained_field(size);
        field.set_modes(Modes::test());
        let tokens: Vec<String> = (0..size).map(|i| i.to_string()).collect();
        b.iter(|| {
            for t in &tokens {
                black_box(field.step(t).len());
            }
        });
    });

    group.finish();
}

/// Full episode including boundary reset and reporting.
fn bench_episode(c: &mut Criterion) {
    c.bench_function("episode_demo_line", |b| {
        let mut field = trained_field(4);
        let line = ["1", "2", "3", "1", "2", "3", "1", "2", "3"];
        b.iter(|| black_box(field.run_episode(&line).map(|r| r.structures_fired.len())));
    });
}

criterion_group!(benches, bench_step_alphabet, bench_step_test_mode, bench_episode);
criterion_main!(benches);
