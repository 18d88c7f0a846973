//! Benchmarks for full reaching trials.
//!
//! Run with: cargo bench -p reach-core

#![allow(missing_docs, clippy::cast_precision_loss)]

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use nalgebra::{DMatrix, DVector};
use rand::Rng;

use reach_core::{
    ControlConfig, ForwardModelConfig, NoiseConfig, Nonlinearity, PiecewiseLinear, PlantConfig,
    SimulationConfig, SimulationState, Simulator, TrialConfig, WarmStart,
};

const NOISE_COLUMNS: usize = 4096;

fn random_noise(n_dim: usize) -> DMatrix<f64> {
    let mut rng = rand::thread_rng();
    DMatrix::from_fn(n_dim, NOISE_COLUMNS, |_, _| rng.gen_range(-1.0..1.0))
}

/// A target that is never acquired, so every trial runs the full budget.
fn timeout_config(
    n_dim: usize,
    delay_steps: usize,
    nonlinearity: Nonlinearity,
) -> SimulationConfig {
    let trial = TrialConfig::new(DVector::from_element(n_dim, 1.0))
        .radius(0.0)
        .timeout(10.0);
    let control = ControlConfig::new(
        PiecewiseLinear::from_knots(&[(0.0, 0.0), (0.5, 1.0), (2.0, 1.0)]).expect("valid curve"),
        PiecewiseLinear::constant(-0.1),
    );
    let noise = NoiseConfig::new(PiecewiseLinear::constant(0.05), random_noise(n_dim));

    SimulationConfig::new(0.01, PlantConfig::new(n_dim).nonlinearity(nonlinearity), trial)
        .forward_model(ForwardModelConfig::compensating(delay_steps))
        .control(control)
        .noise(noise)
}

fn bench_trial_by_delay(c: &mut Criterion) {
    let mut group = c.benchmark_group("trial_by_delay");

    for delay in [0usize, 5, 20] {
        let config = timeout_config(2, delay, Nonlinearity::Linear);
        let steps = config.step_budget();
        let simulator = Simulator::new(config).expect("valid config");
        let warm = WarmStart::at_rest(&DVector::zeros(2), delay + 1);

        group.throughput(Throughput::Elements(steps as u64));
        group.bench_with_input(BenchmarkId::new("run", delay), &warm, |b, warm| {
            b.iter(|| black_box(simulator.run(warm)));
        });
    }

    group.finish();
}

fn bench_trial_by_dimension(c: &mut Criterion) {
    let mut group = c.benchmark_group("trial_by_dimension");

    for n_dim in [1usize, 2, 8, 32] {
        let config = timeout_config(n_dim, 3, Nonlinearity::Linear);
        let simulator = Simulator::new(config).expect("valid config");
        let warm = WarmStart::at_rest(&DVector::zeros(n_dim), 4);

        group.bench_with_input(BenchmarkId::new("run", n_dim), &warm, |b, warm| {
            b.iter(|| black_box(simulator.run(warm)));
        });
    }

    group.finish();
}

fn bench_nonlinear_plants(c: &mut Criterion) {
    let mut group = c.benchmark_group("nonlinear_plants");

    let plants = [
        ("linear", Nonlinearity::Linear),
        (
            "power_law",
            Nonlinearity::PowerLaw {
                exponent: 1.5,
                scale: 0.5,
            },
        ),
        ("threshold", Nonlinearity::Threshold { threshold: 0.05 }),
        (
            "static_curve",
            Nonlinearity::StaticCurve(
                PiecewiseLinear::from_knots(&[(0.0, 0.0), (0.2, 0.1), (1.0, 1.5)])
                    .expect("valid curve"),
            ),
        ),
    ];

    for (name, nonlinearity) in plants {
        let config = timeout_config(2, 3, nonlinearity);
        let simulator = Simulator::new(config).expect("valid config");
        let warm = WarmStart::at_rest(&DVector::zeros(2), 4);

        group.bench_function(name, |b| {
            b.iter(|| black_box(simulator.run(&warm)));
        });
    }

    group.finish();
}

fn bench_reused_buffers(c: &mut Criterion) {
    let mut group = c.benchmark_group("reused_buffers");

    let config = timeout_config(2, 5, Nonlinearity::Linear);
    let simulator = Simulator::new(config).expect("valid config");
    let warm = WarmStart::at_rest(&DVector::zeros(2), 6);

    group.bench_function("run", |b| {
        b.iter(|| black_box(simulator.run(&warm)));
    });

    let mut state = SimulationState::new(simulator.config(), &warm).expect("valid config");
    group.bench_function("run_in", |b| {
        b.iter(|| black_box(simulator.run_in(&mut state, &warm)));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_trial_by_delay,
    bench_trial_by_dimension,
    bench_nonlinear_plants,
    bench_reused_buffers,
);
criterion_main!(benches);
