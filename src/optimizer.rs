/* src/optimizer.rs */
//! # Load factor optimization
//!
//! A bounded compass search over the per-workload load factor vector. The cost surface
//! is a noisy black box measured through trial cycles, so the search makes no global
//! optimality claim: it stops when the step falls below `min_step`, when the trial
//! budget runs out or when cancelled, and reports `success = false` whenever no trial
//! improved on the baseline.
//!
//! Every trial runs on a fork of the evolver's initial state with its own derived seed,
//! so trials are independent and are evaluated concurrently in a pool of
//! `trial_concurrency` threads.
/*▫~•◦────────────────────────────────────────────────────────────────────────────────────‣
 * © 2025 ArcMoon Studios ◦ SPDX-License-Identifier MIT OR Apache-2.0 ◦ Author: Lord Xyn ✶
 *///◦────────────────────────────────────────────────────────────────────────────────────‣

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{HarnessConfig, OptimizerConfig, ResourceCeiling};
use crate::error::{HarnessError, Result};
use crate::metrics::counter;
use crate::profiler::{CycleMeasurement, PerformanceProfiler};
use crate::run_id::RunId;
use crate::state::{derive_seed, StateVectorEvolver};
use crate::workload::WorkloadSet;

/// Outcome of a load factor search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    /// Identity of the optimization run
    pub run_id: RunId,
    /// Starting point of the search
    pub initial_load_factors: Vec<f64>,
    /// Best factors found (equal to the initial ones when unsuccessful)
    pub optimized_load_factors: Vec<f64>,
    /// `(baseline_total − optimized_total) / baseline_total` on success, else 0
    pub performance_improvement: f64,
    /// Whether an improving trial was found
    pub success: bool,
    /// Trial cycles measured, baseline included
    pub trials_used: u32,
    /// The search was stopped by the cancellation token
    pub cancelled: bool,
    /// Trial measurement at the initial factors
    pub baseline: CycleMeasurement,
    /// Trial measurement at the optimized factors
    pub optimized: CycleMeasurement,
    /// Why the search did not improve, if it did not
    pub reason: Option<String>,
}

impl OptimizationResult {
    /// Result for a search that never ran its baseline trial, e.g. after cancellation.
    pub fn skipped(run_id: RunId, load_factors: Vec<f64>, reference: CycleMeasurement, reason: impl Into<String>) -> Self {
        Self {
            run_id,
            initial_load_factors: load_factors.clone(),
            optimized_load_factors: load_factors,
            performance_improvement: 0.0,
            success: false,
            trials_used: 0,
            cancelled: true,
            baseline: reference.clone(),
            optimized: reference,
            reason: Some(reason.into()),
        }
    }
}

/// A trial whose factors and seed index are fixed before it is scheduled.
struct Trial {
    index: u32,
    load_factors: Vec<f64>,
}

/// Derivative-free bounded local search over load factors.
#[derive(Debug)]
pub struct LoadFactorOptimizer {
    config: OptimizerConfig,
    ceiling: ResourceCeiling,
    max_consecutive_instabilities: u32,
    seed: u64,
    pool: rayon::ThreadPool,
}

impl LoadFactorOptimizer {
    /// Optimizer with an explicit search configuration, ceiling and trial seed root.
    pub fn new(
        config: OptimizerConfig,
        ceiling: ResourceCeiling,
        max_consecutive_instabilities: u32,
        seed: u64,
    ) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.trial_concurrency.max(1))
            .thread_name(|i| format!("cadence-trial-{i}"))
            .build()
            .map_err(|e| HarnessError::config(format!("failed to build trial pool: {e}")))?;
        Ok(Self { config, ceiling, max_consecutive_instabilities, seed, pool })
    }

    /// Optimizer matching a harness configuration.
    pub fn from_config(config: &HarnessConfig) -> Result<Self> {
        Self::new(
            config.optimizer,
            config.resource_ceiling,
            config.sustained.max_consecutive_instabilities,
            derive_seed(config.seed, 0x4F50_5400),
        )
    }

    fn feasible(&self, workloads: &WorkloadSet, load_factors: &[f64]) -> bool {
        workloads
            .estimated_memory_bytes(load_factors)
            .map(|bytes| bytes <= self.ceiling.max_workload_memory_bytes)
            .unwrap_or(false)
    }

    /// Measure one trial cycle on a fresh fork. `None` means the cycle was numerically unstable.
    fn run_trial(
        &self,
        evolver: &StateVectorEvolver,
        workloads: &WorkloadSet,
        profiler: &PerformanceProfiler,
        trial: &Trial,
    ) -> Result<Option<CycleMeasurement>> {
        let mut fork = evolver.fork(derive_seed(self.seed, u64::from(trial.index)));
        counter!("cadence_optimizer_trials_total").increment(1);
        match profiler.run_cycle(&mut fork, workloads, &trial.load_factors) {
            Ok(cycle) => Ok(Some(cycle.measurement)),
            Err(HarnessError::NumericInstability { step, reason }) => {
                warn!(trial = trial.index, step, %reason, "Unstable trial discarded");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Search for load factors that reduce total cycle time.
    ///
    /// `evolver` is only forked, never advanced. Fails with
    /// [`HarnessError::Cancelled`] if cancelled before the baseline trial completes and with
    /// [`HarnessError::FatalInstability`] if the baseline trial cannot be measured stably.
    pub fn optimize(
        &self,
        evolver: &StateVectorEvolver,
        workloads: &WorkloadSet,
        profiler: &PerformanceProfiler,
        initial_load_factors: &[f64],
        run_id: RunId,
        cancel: &CancellationToken,
    ) -> Result<OptimizationResult> {
        let bounds = self.config.bounds;
        let initial: Vec<f64> = initial_load_factors.iter().map(|&lf| bounds.clamp(lf)).collect();
        workloads.estimated_memory_bytes(&initial)?;
        info!(%run_id, workloads = initial.len(), max_trials = self.config.max_trials, "Optimization started");

        let mut trials_used = 0u32;
        let baseline = self.measure_baseline(evolver, workloads, profiler, &initial, &mut trials_used, cancel)?;

        let mut incumbent = initial.clone();
        let mut incumbent_measurement = baseline.clone();
        let mut step = self.config.initial_step;
        let mut cancelled = false;
        let mut budget_exhausted = false;

        while step >= self.config.min_step {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            if trials_used >= self.config.max_trials {
                budget_exhausted = true;
                break;
            }

            let candidates = self.candidates(workloads, &incumbent, step);
            if candidates.is_empty() {
                step *= self.config.step_shrink;
                continue;
            }

            let mut best: Option<(Vec<f64>, CycleMeasurement)> = None;
            for chunk in candidates.chunks(self.config.trial_concurrency.max(1)) {
                if cancel.is_cancelled() {
                    cancelled = true;
                    break;
                }
                let remaining = (self.config.max_trials - trials_used) as usize;
                if remaining == 0 {
                    budget_exhausted = true;
                    break;
                }
                let batch: Vec<Trial> = chunk
                    .iter()
                    .take(remaining)
                    .enumerate()
                    .map(|(offset, lfs)| Trial { index: trials_used + offset as u32, load_factors: lfs.clone() })
                    .collect();
                trials_used += batch.len() as u32;

                let outcomes: Vec<Result<Option<CycleMeasurement>>> = self.pool.install(|| {
                    batch
                        .par_iter()
                        .map(|trial| self.run_trial(evolver, workloads, profiler, trial))
                        .collect()
                });
                for (trial, outcome) in batch.into_iter().zip(outcomes) {
                    if let Some(measurement) = outcome? {
                        let better = best
                            .as_ref()
                            .map_or(true, |(_, current)| measurement.total_time < current.total_time);
                        if better {
                            best = Some((trial.load_factors, measurement));
                        }
                    }
                }
            }

            let threshold = incumbent_measurement.total_time * (1.0 - self.config.min_relative_improvement);
            match best {
                Some((factors, measurement)) if measurement.total_time < threshold => {
                    debug!(
                        step,
                        total_time = measurement.total_time,
                        previous = incumbent_measurement.total_time,
                        "Improving candidate accepted"
                    );
                    incumbent = factors;
                    incumbent_measurement = measurement;
                }
                _ if cancelled || budget_exhausted => break,
                _ => step *= self.config.step_shrink,
            }
            if cancelled || budget_exhausted {
                break;
            }
        }

        let success = incumbent != initial && incumbent_measurement.total_time < baseline.total_time;
        let performance_improvement = if success {
            (baseline.total_time - incumbent_measurement.total_time) / baseline.total_time
        } else {
            0.0
        };
        let reason = (!success).then(|| {
            if cancelled {
                "cancelled before an improving trial was found".to_string()
            } else if budget_exhausted {
                format!("trial budget of {} exhausted without improvement", self.config.max_trials)
            } else {
                format!("no candidate improved total time by more than {:.1}%", self.config.min_relative_improvement * 100.0)
            }
        });

        let (optimized_load_factors, optimized) = if success {
            (incumbent, incumbent_measurement)
        } else {
            (initial.clone(), baseline.clone())
        };

        info!(
            %run_id,
            success,
            trials_used,
            cancelled,
            performance_improvement,
            baseline_total = baseline.total_time,
            optimized_total = optimized.total_time,
            "Optimization finished"
        );

        Ok(OptimizationResult {
            run_id,
            initial_load_factors: initial,
            optimized_load_factors,
            performance_improvement,
            success,
            trials_used,
            cancelled,
            baseline,
            optimized,
            reason,
        })
    }

    /// Measure the initial factors, retrying unstable trials up to the instability threshold.
    fn measure_baseline(
        &self,
        evolver: &StateVectorEvolver,
        workloads: &WorkloadSet,
        profiler: &PerformanceProfiler,
        initial: &[f64],
        trials_used: &mut u32,
        cancel: &CancellationToken,
    ) -> Result<CycleMeasurement> {
        let mut failures = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(HarnessError::Cancelled("optimization cancelled before the baseline trial".into()));
            }
            if *trials_used >= self.config.max_trials || failures > self.max_consecutive_instabilities {
                error!(failures, "Baseline trial could not be measured stably");
                return Err(HarnessError::FatalInstability {
                    consecutive: failures,
                    threshold: self.max_consecutive_instabilities,
                });
            }
            let trial = Trial { index: *trials_used, load_factors: initial.to_vec() };
            *trials_used += 1;
            match self.run_trial(evolver, workloads, profiler, &trial)? {
                Some(measurement) => return Ok(measurement),
                None => failures += 1,
            }
        }
    }

    /// Feasible compass neighbours of `incumbent` at the given step.
    fn candidates(&self, workloads: &WorkloadSet, incumbent: &[f64], step: f64) -> Vec<Vec<f64>> {
        let bounds = self.config.bounds;
        let mut out: Vec<Vec<f64>> = Vec::with_capacity(incumbent.len() * 2);
        for (i, &current) in incumbent.iter().enumerate() {
            for direction in [-1.0, 1.0] {
                let moved = bounds.clamp(current + direction * step);
                if (moved - current).abs() < f64::EPSILON {
                    continue;
                }
                let mut candidate = incumbent.to_vec();
                candidate[i] = moved;
                if !self.feasible(workloads, &candidate) {
                    debug!(workload = i, load_factor = moved, "Candidate exceeds memory ceiling");
                    continue;
                }
                out.push(candidate);
            }
        }
        out
    }
}
