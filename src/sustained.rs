/* src/sustained.rs */
//! # Sustained runs
//!
//! Repeats monitored cycles against a wall clock deadline and an iteration cap.
//! Iterations are strictly sequential because they all mutate the one shared state
//! vector. Deadline expiry and cancellation only stop the scheduling of new iterations;
//! an iteration already in flight always completes, so every recorded iteration is whole.
//!
//! With modeled workload costs no real time passes during a cycle, so the run is timed
//! on a simulated clock that advances by each cycle's `total_time` instead of the wall
//! clock.
/*▫~•◦────────────────────────────────────────────────────────────────────────────────────‣
 * © 2025 ArcMoon Studios ◦ SPDX-License-Identifier MIT OR Apache-2.0 ◦ Author: Lord Xyn ✶
 *///◦────────────────────────────────────────────────────────────────────────────────────‣

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{CostMode, HarnessConfig, ResourceCeiling, SustainedConfig};
use crate::error::{HarnessError, Result};
use crate::metrics::counter;
use crate::monitor::{ResourceMonitor, ResourceUsage};
use crate::profiler::{CycleMeasurement, PerformanceProfiler, TIME_EPSILON};
use crate::run_id::RunId;
use crate::state::StateVectorEvolver;
use crate::workload::WorkloadSet;

/// Why a sustained run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The configured number of iterations completed
    IterationCap,
    /// The wall clock deadline expired
    Deadline,
    /// The cancellation token fired
    Cancelled,
}

/// Time base for the deadline and the achieved frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SustainedClock {
    /// Real elapsed time
    Wall,
    /// Sum of the measured cycle times
    Simulated,
}

/// One completed iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    /// Zero based iteration index
    pub iteration: u64,
    /// Evolution step of the cycle
    pub step: u64,
    /// Cycle metrics
    pub measurement: CycleMeasurement,
    /// Snapshot pair bracketing the cycle
    pub resources: ResourceUsage,
}

/// Achieved frequency against the real-time target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrequencyStats {
    /// Iterations per second of wall time
    pub achieved_frequency: f64,
    /// Achieved over target frequency
    pub frequency_ratio: f64,
}

impl FrequencyStats {
    /// `achieved = iterations / duration`, `ratio = achieved / target`.
    pub fn compute(iteration_count: u64, duration_secs: f64, target_frequency: f64) -> Self {
        let achieved_frequency = iteration_count as f64 / duration_secs.max(TIME_EPSILON);
        Self { achieved_frequency, frequency_ratio: achieved_frequency / target_frequency }
    }
}

/// `1 − coefficient of variation`, clamped to `[0, 1]`.
///
/// An empty series has no evidence of stability and scores 0.
pub fn stability_score(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if !(mean.is_finite() && mean > 0.0) {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (1.0 - variance.sqrt() / mean).clamp(0.0, 1.0)
}

/// Resource behaviour across all iterations of a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceStability {
    /// Iterations whose snapshot pair was fully available
    pub samples_available: u64,
    /// Mean CPU usage at iteration end, percent
    pub cpu_mean: f64,
    /// Standard deviation of CPU usage at iteration end
    pub cpu_std: f64,
    /// Used memory at the last iteration minus used memory at the first
    pub memory_drift_bytes: i64,
    /// Largest per-iteration CPU delta
    pub max_cpu_delta: f64,
    /// Largest per-iteration memory delta
    pub max_memory_delta: i64,
    /// Every available iteration stayed within the ceiling
    pub within_ceiling: bool,
}

impl ResourceStability {
    fn from_iterations(iterations: &[IterationRecord], ceiling: &ResourceCeiling) -> Self {
        let available: Vec<&ResourceUsage> =
            iterations.iter().map(|r| &r.resources).filter(|u| u.available()).collect();
        let cpu: Vec<f64> = available.iter().map(|u| u.after.cpu_usage).collect();
        let n = cpu.len().max(1) as f64;
        let cpu_mean = cpu.iter().sum::<f64>() / n;
        let cpu_std = (cpu.iter().map(|c| (c - cpu_mean).powi(2)).sum::<f64>() / n).sqrt();
        let memory_drift_bytes = match (available.first(), available.last()) {
            (Some(first), Some(last)) => last.after.memory_usage as i64 - first.before.memory_usage as i64,
            _ => 0,
        };
        Self {
            samples_available: available.len() as u64,
            cpu_mean,
            cpu_std,
            memory_drift_bytes,
            max_cpu_delta: available.iter().filter_map(|u| u.cpu_delta).fold(0.0, f64::max),
            max_memory_delta: available.iter().filter_map(|u| u.memory_delta).max().unwrap_or(0),
            within_ceiling: available.iter().all(|u| u.within(ceiling)),
        }
    }
}

/// Aggregate of a sustained run. Partial records are valid results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SustainedRunRecord {
    /// Identity shared by all snapshot pairs of this run
    pub run_id: RunId,
    /// Length of the run in seconds on `clock`
    pub duration: f64,
    /// Time base of `duration`
    pub clock: SustainedClock,
    /// Completed (non-discarded) iterations
    pub iteration_count: u64,
    /// Real-time target in Hz
    pub target_frequency: f64,
    /// Iterations per second
    pub achieved_frequency: f64,
    /// Achieved over target frequency
    pub frequency_ratio: f64,
    /// Mean cycle efficiency
    pub mean_efficiency: f64,
    /// Worst cycle efficiency
    pub min_efficiency: f64,
    /// `1 − CV(efficiency)`
    pub stability: f64,
    /// Resource behaviour
    pub resource_stability: ResourceStability,
    /// Cycles discarded for numeric instability
    pub discarded_cycles: u64,
    /// Cycles whose total time exceeded the computation budget
    pub over_budget_cycles: u64,
    /// Why the run stopped
    pub stop_reason: StopReason,
    /// True when stopped by deadline or cancellation
    pub partial: bool,
    /// Completed iterations in order
    pub iterations: Vec<IterationRecord>,
}

/// Drives repeated cycles against a deadline and an iteration cap.
#[derive(Debug, Clone, Copy)]
pub struct SustainedRunner {
    config: SustainedConfig,
    target_frequency: f64,
    max_computation_time: f64,
    ceiling: ResourceCeiling,
    clock: SustainedClock,
}

impl SustainedRunner {
    /// Wall clock runner with explicit parameters.
    pub fn new(
        config: SustainedConfig,
        target_frequency: f64,
        max_computation_time: f64,
        ceiling: ResourceCeiling,
    ) -> Self {
        Self { config, target_frequency, max_computation_time, ceiling, clock: SustainedClock::Wall }
    }

    /// Same runner on a different time base.
    pub fn with_clock(mut self, clock: SustainedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Runner matching a harness configuration; modeled costs run on the simulated clock.
    pub fn from_config(config: &HarnessConfig) -> Self {
        let clock = match config.cost_mode {
            CostMode::Measured => SustainedClock::Wall,
            CostMode::Modeled { .. } => SustainedClock::Simulated,
        };
        Self::new(config.sustained, config.target_frequency, config.max_computation_time, config.resource_ceiling)
            .with_clock(clock)
    }

    /// Time base of this runner.
    pub fn clock(&self) -> SustainedClock {
        self.clock
    }

    /// Run until the iteration cap, the deadline or cancellation, whichever comes first.
    ///
    /// Fails only with [`HarnessError::FatalInstability`] (too many unstable cycles in a
    /// row) or with an error raised by the workloads themselves.
    #[allow(clippy::too_many_arguments)]
    pub fn run(
        &self,
        evolver: &mut StateVectorEvolver,
        workloads: &WorkloadSet,
        load_factors: &[f64],
        profiler: &PerformanceProfiler,
        monitor: &ResourceMonitor,
        run_id: RunId,
        cancel: &CancellationToken,
    ) -> Result<SustainedRunRecord> {
        let deadline = self.config.duration_secs;
        let threshold = self.config.max_consecutive_instabilities;
        info!(
            %run_id,
            duration_secs = self.config.duration_secs,
            iteration_cap = self.config.iteration_cap,
            clock = ?self.clock,
            "Sustained run started"
        );

        let mut iterations: Vec<IterationRecord> = Vec::new();
        let mut discarded_cycles = 0u64;
        let mut consecutive_failures = 0u32;
        let start = Instant::now();
        let mut simulated = 0.0f64;
        let elapsed = |simulated: f64| match self.clock {
            SustainedClock::Wall => start.elapsed().as_secs_f64(),
            SustainedClock::Simulated => simulated,
        };

        let stop_reason = loop {
            if iterations.len() as u64 >= self.config.iteration_cap {
                break StopReason::IterationCap;
            }
            if cancel.is_cancelled() {
                break StopReason::Cancelled;
            }
            if elapsed(simulated) >= deadline {
                break StopReason::Deadline;
            }

            let monitored = monitor.measure(run_id, || profiler.run_cycle(evolver, workloads, load_factors));
            match monitored.value {
                Ok(cycle) => {
                    consecutive_failures = 0;
                    simulated += cycle.measurement.total_time;
                    iterations.push(IterationRecord {
                        iteration: iterations.len() as u64,
                        step: cycle.step,
                        measurement: cycle.measurement,
                        resources: monitored.usage,
                    });
                }
                Err(HarnessError::NumericInstability { step, reason }) => {
                    discarded_cycles += 1;
                    consecutive_failures += 1;
                    counter!("cadence_cycles_discarded_total").increment(1);
                    warn!(step, %reason, consecutive_failures, "Unstable cycle discarded");
                    if consecutive_failures > threshold {
                        error!(consecutive_failures, threshold, "Instability threshold exceeded; aborting run");
                        return Err(HarnessError::FatalInstability { consecutive: consecutive_failures, threshold });
                    }
                }
                Err(other) => return Err(other),
            }
        };

        let record = self.summarize(run_id, elapsed(simulated), iterations, discarded_cycles, stop_reason);
        info!(
            %run_id,
            iterations = record.iteration_count,
            achieved_frequency = record.achieved_frequency,
            frequency_ratio = record.frequency_ratio,
            stability = record.stability,
            stop_reason = ?record.stop_reason,
            partial = record.partial,
            "Sustained run finished"
        );
        Ok(record)
    }

    fn summarize(
        &self,
        run_id: RunId,
        duration: f64,
        iterations: Vec<IterationRecord>,
        discarded_cycles: u64,
        stop_reason: StopReason,
    ) -> SustainedRunRecord {
        let iteration_count = iterations.len() as u64;
        let frequency = FrequencyStats::compute(iteration_count, duration, self.target_frequency);
        let efficiencies: Vec<f64> = iterations.iter().map(|r| r.measurement.efficiency).collect();
        let mean_efficiency = if efficiencies.is_empty() {
            0.0
        } else {
            efficiencies.iter().sum::<f64>() / efficiencies.len() as f64
        };
        let min_efficiency = efficiencies.iter().copied().reduce(f64::min).unwrap_or(0.0);
        let over_budget_cycles = iterations
            .iter()
            .filter(|r| r.measurement.total_time > self.max_computation_time)
            .count() as u64;

        SustainedRunRecord {
            run_id,
            duration,
            clock: self.clock,
            iteration_count,
            target_frequency: self.target_frequency,
            achieved_frequency: frequency.achieved_frequency,
            frequency_ratio: frequency.frequency_ratio,
            mean_efficiency,
            min_efficiency,
            stability: stability_score(&efficiencies),
            resource_stability: ResourceStability::from_iterations(&iterations, &self.ceiling),
            discarded_cycles,
            over_budget_cycles,
            stop_reason,
            partial: stop_reason != StopReason::IterationCap,
            iterations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExecutionMode, WorkloadSpec};
    use crate::workload::ComplexityClass;
    use crate::monitor::UnavailableSampler;
    use crate::run_id::RunPhase;
    use crate::state::{PhaseCoupling, StateUpdate};
    use rand::rngs::StdRng;
    use std::sync::Arc;
    use std::time::Duration;

    /// Cancels the token while step `at` is in flight.
    #[derive(Debug)]
    struct CancelAt {
        at: u64,
        token: CancellationToken,
    }

    impl StateUpdate for CancelAt {
        fn apply(&self, state: &mut [f64], step: u64, rng: &mut StdRng) {
            PhaseCoupling::default().apply(state, step, rng);
            if step == self.at {
                self.token.cancel();
            }
        }
    }

    /// Sleeps on every step so that wall clock deadlines are reachable.
    #[derive(Debug)]
    struct Slow(Duration);

    impl StateUpdate for Slow {
        fn apply(&self, _state: &mut [f64], _step: u64, _rng: &mut StdRng) {
            std::thread::sleep(self.0);
        }
    }

    /// Always produces NaN.
    #[derive(Debug)]
    struct AlwaysNan;

    impl StateUpdate for AlwaysNan {
        fn apply(&self, state: &mut [f64], _step: u64, _rng: &mut StdRng) {
            state[0] = f64::NAN;
        }
    }

    /// Produces NaN on odd steps only.
    #[derive(Debug)]
    struct NanOnOdd;

    impl StateUpdate for NanOnOdd {
        fn apply(&self, state: &mut [f64], step: u64, _rng: &mut StdRng) {
            if step % 2 == 1 {
                state[0] = f64::NAN;
            }
        }
    }

    struct Fixture {
        config: HarnessConfig,
        workloads: WorkloadSet,
        profiler: PerformanceProfiler,
        monitor: ResourceMonitor,
        run_id: RunId,
    }

    fn fixture(sustained: SustainedConfig) -> Fixture {
        let config = HarnessConfig {
            state_vector_dimension: 4,
            execution_mode: ExecutionMode::Sequential,
            cost_mode: CostMode::Modeled { nanos_per_op: 1.0, noise: 0.0 },
            sustained,
            ..HarnessConfig::default()
        };
        Fixture {
            workloads: WorkloadSet::from_config(&config).expect("workloads"),
            profiler: PerformanceProfiler::from_config(&config),
            monitor: ResourceMonitor::new(Arc::new(UnavailableSampler)),
            run_id: RunId::new(config.seed, b"sustained-test").child(RunPhase::Sustained, 0),
            config,
        }
    }

    fn run(fx: &Fixture, evolver: &mut StateVectorEvolver, token: &CancellationToken) -> Result<SustainedRunRecord> {
        let factors = vec![1.0; fx.workloads.len()];
        SustainedRunner::from_config(&fx.config).run(
            evolver,
            &fx.workloads,
            &factors,
            &fx.profiler,
            &fx.monitor,
            fx.run_id,
            token,
        )
    }

    #[test]
    fn test_reference_frequency_numbers() {
        let stats = FrequencyStats::compute(13, 5.06, 1000.0);
        assert!((stats.achieved_frequency - 2.57).abs() < 0.01);
        assert!((stats.frequency_ratio - 0.0026).abs() < 0.0001);
    }

    #[test]
    fn test_stability_score_edges() {
        assert_eq!(stability_score(&[]), 0.0);
        assert_eq!(stability_score(&[0.5]), 1.0);
        assert_eq!(stability_score(&[0.5, 0.5, 0.5]), 1.0);
        let noisy = stability_score(&[0.1, 1.0, 0.1, 1.0]);
        assert!(noisy > 0.0 && noisy < 0.5);
        assert_eq!(stability_score(&[0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_iteration_cap_completes_run() {
        let fx = fixture(SustainedConfig { duration_secs: 60.0, iteration_cap: 5, max_consecutive_instabilities: 3 });
        let mut evolver = StateVectorEvolver::new(4, 1).expect("evolver");
        let record = run(&fx, &mut evolver, &CancellationToken::new()).expect("run");
        assert_eq!(record.iteration_count, 5);
        assert_eq!(record.stop_reason, StopReason::IterationCap);
        assert!(!record.partial);
        assert_eq!(record.iterations.len(), 5);
        assert!((record.stability - 1.0).abs() < 1e-9);
        assert!(record.iterations.iter().all(|r| r.resources.before.run_id == fx.run_id));
        assert_eq!(record.resource_stability.samples_available, 0);
    }

    #[test]
    fn test_cancellation_returns_exactly_completed_iterations() {
        let fx = fixture(SustainedConfig { duration_secs: 60.0, iteration_cap: 100, max_consecutive_instabilities: 3 });
        let token = CancellationToken::new();
        let rule = Arc::new(CancelAt { at: 4, token: token.clone() });
        let mut evolver = StateVectorEvolver::with_rule(4, 1, rule).expect("evolver");
        let record = run(&fx, &mut evolver, &token).expect("run");
        assert_eq!(record.iteration_count, 4);
        assert_eq!(record.iterations.len(), 4);
        assert!(record.partial);
        assert_eq!(record.stop_reason, StopReason::Cancelled);
        for (i, iteration) in record.iterations.iter().enumerate() {
            assert_eq!(iteration.iteration, i as u64);
            assert_eq!(iteration.step, i as u64 + 1);
            assert_eq!(iteration.measurement.workload_count(), fx.workloads.len());
        }
    }

    #[test]
    fn test_deadline_produces_partial_record() {
        let fx = fixture(SustainedConfig { duration_secs: 0.03, iteration_cap: 1_000_000, max_consecutive_instabilities: 3 });
        let mut evolver = StateVectorEvolver::with_rule(4, 1, Arc::new(Slow(Duration::from_millis(5)))).expect("evolver");
        let record = run(&fx, &mut evolver, &CancellationToken::new()).expect("run");
        assert_eq!(record.stop_reason, StopReason::Deadline);
        assert!(record.partial);
        assert!(record.iteration_count >= 1);
        assert!(record.duration >= 0.03);
        assert!(record.achieved_frequency > 0.0);
    }

    #[test]
    fn test_simulated_clock_reproduces_reference_frequency() {
        let mut fx = fixture(SustainedConfig { duration_secs: 5.06, iteration_cap: 13, max_consecutive_instabilities: 3 });
        fx.config.cost_mode = CostMode::Modeled { nanos_per_op: 1.0, noise: 0.0 };
        fx.config.workloads = vec![WorkloadSpec::new("probe", ComplexityClass::Low, 100)];
        fx.workloads = WorkloadSet::from_config(&fx.config).expect("workloads");
        let runner = SustainedRunner::from_config(&fx.config);
        assert_eq!(runner.clock(), SustainedClock::Simulated);
        assert_eq!(SustainedRunner::from_config(&HarnessConfig::default()).clock(), SustainedClock::Wall);

        let mut evolver = StateVectorEvolver::new(4, 1).expect("evolver");
        let record = runner
            .run(&mut evolver, &fx.workloads, &[1.0], &fx.profiler, &fx.monitor, fx.run_id, &CancellationToken::new())
            .expect("run");
        let cycle_sum: f64 = record.iterations.iter().map(|r| r.measurement.total_time).sum();
        assert_eq!(record.clock, SustainedClock::Simulated);
        assert!((record.duration - cycle_sum).abs() < 1e-12);
        assert_eq!(record.iteration_count, 13);
    }

    #[test]
    fn test_persistent_instability_escalates() {
        let fx = fixture(SustainedConfig { duration_secs: 60.0, iteration_cap: 100, max_consecutive_instabilities: 2 });
        let mut evolver = StateVectorEvolver::with_rule(4, 1, Arc::new(AlwaysNan)).expect("evolver");
        let err = run(&fx, &mut evolver, &CancellationToken::new()).expect_err("must abort");
        assert!(matches!(err, HarnessError::FatalInstability { consecutive: 3, threshold: 2 }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_isolated_instabilities_are_discarded_not_fatal() {
        let fx = fixture(SustainedConfig { duration_secs: 60.0, iteration_cap: 6, max_consecutive_instabilities: 1 });
        let mut evolver = StateVectorEvolver::with_rule(4, 1, Arc::new(NanOnOdd)).expect("evolver");
        let record = run(&fx, &mut evolver, &CancellationToken::new()).expect("run");
        assert_eq!(record.iteration_count, 6);
        assert_eq!(record.discarded_cycles, 6);
        assert!(record.iterations.iter().all(|r| r.step % 2 == 0));
    }
}
