/* src/profiler.rs */
//! # Cycle profiling
//!
//! A cycle evolves the shared state once and evaluates every workload once. The
//! [`PerformanceProfiler`] reduces the timings of one cycle into a [`CycleMeasurement`]:
//!
//! - `total_time = state_evolution_time + repository_computation_time`
//! - `real_time_ratio = efficiency = target_cycle_period / max(total_time, ε)`
//! - `parallel_efficiency = Σ individual / (n_workloads × max(total_time, ε))`
//!
//! `efficiency` and `real_time_ratio` are one metric by definition and are computed once.
//! Repository time is the sum of workload times in sequential mode and the maximum in
//! parallel mode; both reductions are order independent.
/*▫~•◦────────────────────────────────────────────────────────────────────────────────────‣
 * © 2025 ArcMoon Studios ◦ SPDX-License-Identifier MIT OR Apache-2.0 ◦ Author: Lord Xyn ✶
 *///◦────────────────────────────────────────────────────────────────────────────────────‣

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{ExecutionMode, HarnessConfig};
use crate::error::Result;
use crate::metrics::{counter, gauge, histogram};
use crate::state::StateVectorEvolver;
use crate::workload::{WorkloadSample, WorkloadSet};

/// Guard against division by a zero cycle time.
pub const TIME_EPSILON: f64 = 1e-9;

/// Efficiency metrics of one cycle. All times are in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleMeasurement {
    /// Time spent evolving the state vector
    pub state_evolution_time: f64,
    /// Aggregated workload time (sum or max per execution mode)
    pub repository_computation_time: f64,
    /// Total cycle time
    pub total_time: f64,
    /// Target period over total time
    pub real_time_ratio: f64,
    /// Same value as `real_time_ratio`
    pub efficiency: f64,
    /// Summed workload time over `n × total_time`
    pub parallel_efficiency: f64,
    /// Individual workload times in table order
    pub workload_times: Vec<f64>,
}

impl CycleMeasurement {
    /// Number of workloads measured.
    pub fn workload_count(&self) -> usize {
        self.workload_times.len()
    }
}

/// Pure reducer from one cycle's timings to a [`CycleMeasurement`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerformanceProfiler {
    target_cycle_period: f64,
    mode: ExecutionMode,
}

impl PerformanceProfiler {
    /// Profiler for a target period (seconds) and an execution mode.
    pub fn new(target_cycle_period: f64, mode: ExecutionMode) -> Self {
        Self { target_cycle_period, mode }
    }

    /// Profiler matching a configuration.
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self::new(config.target_cycle_period(), config.execution_mode)
    }

    /// Target cycle period in seconds.
    pub fn target_cycle_period(&self) -> f64 {
        self.target_cycle_period
    }

    /// Execution mode used for aggregation.
    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Reduce one cycle's timings.
    pub fn profile(&self, state_evolution_time: Duration, workload_times: &[Duration]) -> CycleMeasurement {
        let individual: Vec<f64> = workload_times.iter().map(Duration::as_secs_f64).collect();
        let repository_computation_time = match self.mode {
            ExecutionMode::Sequential => individual.iter().sum(),
            ExecutionMode::Parallel => individual.iter().copied().fold(0.0, f64::max),
        };
        let state_evolution_time = state_evolution_time.as_secs_f64();
        let total_time = state_evolution_time + repository_computation_time;
        let guarded_total = total_time.max(TIME_EPSILON);

        let efficiency = self.target_cycle_period / guarded_total;
        let parallel_efficiency = if individual.is_empty() {
            0.0
        } else {
            individual.iter().sum::<f64>() / (individual.len() as f64 * guarded_total)
        };

        CycleMeasurement {
            state_evolution_time,
            repository_computation_time,
            total_time,
            real_time_ratio: efficiency,
            efficiency,
            parallel_efficiency,
            workload_times: individual,
        }
    }

    /// Evolve the state once, evaluate all workloads and profile the result.
    ///
    /// A [`HarnessError::NumericInstability`](crate::error::HarnessError::NumericInstability)
    /// from the evolver is returned before any workload runs.
    pub fn run_cycle(
        &self,
        evolver: &mut StateVectorEvolver,
        workloads: &WorkloadSet,
        load_factors: &[f64],
    ) -> Result<ProfiledCycle> {
        let evolution = evolver.evolve()?;
        let samples = workloads.compute_all(load_factors, evolver.cycle_seed())?;
        let times: Vec<Duration> = samples.iter().map(|s| s.computation_time).collect();
        let measurement = self.profile(evolution.elapsed, &times);

        counter!("cadence_cycles_total").increment(1);
        histogram!("cadence_cycle_total_time_seconds").record(measurement.total_time);
        gauge!("cadence_efficiency").set(measurement.efficiency);
        debug!(
            step = evolution.step,
            total_time = measurement.total_time,
            efficiency = measurement.efficiency,
            parallel_efficiency = measurement.parallel_efficiency,
            "Cycle profiled"
        );

        Ok(ProfiledCycle { step: evolution.step, measurement, samples })
    }
}

/// A profiled cycle together with its raw workload samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfiledCycle {
    /// Evolution step of the cycle
    pub step: u64,
    /// Derived metrics
    pub measurement: CycleMeasurement,
    /// Raw workload samples in table order
    pub samples: Vec<WorkloadSample>,
}
