/* benches/cycle_profiling.rs */
/*▫~•◦────────────────────────────────────────────────────────────────────────────────────‣
 * © 2025 ArcMoon Studios ◦ SPDX-License-Identifier MIT OR Apache-2.0 ◦ Author: Lord Xyn ✶
 *///◦────────────────────────────────────────────────────────────────────────────────────‣

use criterion::{
    black_box, criterion_group, criterion_main, AxisScale, BenchmarkId, Criterion, PlotConfiguration, Throughput,
};
use cadence::{
    ComplexityClass, CostMode, ExecutionMode, HarnessConfig, OptimizerBounds, PerformanceProfiler, StateVectorEvolver,
    WorkloadModel, WorkloadSet, WorkloadSpec,
};
use std::time::Duration;

/// Measured kernels of every complexity class at growing effective sizes
fn bench_workload_kernels(c: &mut Criterion) {
    let mut group = c.benchmark_group("workload_kernels");
    group.plot_config(PlotConfiguration::default().summary_scale(AxisScale::Logarithmic));

    for &class in ComplexityClass::value_variants() {
        for &size in &[16u32, 32, 64] {
            let model = WorkloadModel::new(
                0,
                WorkloadSpec::new(class.to_string(), class, size),
                OptimizerBounds::default(),
                CostMode::Measured,
                7,
            );
            group.throughput(Throughput::Elements(class.operation_count(size as usize) as u64));
            group.bench_with_input(BenchmarkId::new(class.to_string(), size), &size, |b, _| {
                b.iter(|| black_box(model.compute(black_box(1.0), 0)))
            });
        }
    }

    group.finish();
}

/// State evolution alone across dimensions
fn bench_state_evolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("state_evolution");

    for &dimension in &[16usize, 64, 256, 1024] {
        let mut evolver = match StateVectorEvolver::new(dimension, 42) {
            Ok(evolver) => evolver,
            Err(_) => continue,
        };
        group.throughput(Throughput::Elements(dimension as u64));
        group.bench_with_input(BenchmarkId::from_parameter(dimension), &dimension, |b, _| {
            b.iter(|| black_box(evolver.evolve()))
        });
    }

    group.finish();
}

/// One full profiled cycle over the reference workload table
fn bench_profiled_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("profiled_cycle");
    group.sample_size(20);
    group.measurement_time(Duration::from_secs(10));

    for mode in [ExecutionMode::Sequential, ExecutionMode::Parallel] {
        let config = HarnessConfig { execution_mode: mode, ..HarnessConfig::default() };
        let Ok(workloads) = WorkloadSet::from_config(&config) else { continue };
        let Ok(mut evolver) = StateVectorEvolver::new(config.state_vector_dimension, config.seed) else { continue };
        let profiler = PerformanceProfiler::from_config(&config);
        let factors = vec![0.5; workloads.len()];

        group.bench_function(format!("{mode:?}").to_lowercase(), |b| {
            b.iter(|| black_box(profiler.run_cycle(&mut evolver, &workloads, black_box(&factors))))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_workload_kernels,
    bench_state_evolution,
    bench_profiled_cycle
);
criterion_main!(benches);
