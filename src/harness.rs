/* src/harness.rs */
//! # Resolution harness
//!
//! Orchestrates one complete analysis:
//!
//! 1. a monitored baseline cycle at load factor 1.0,
//! 2. a sustained run on the same evolving state,
//! 3. a load factor search on forks of the initial state,
//! 4. the assessment of all three.
//!
//! The phases are blocking CPU work. [`ResolutionHarness::run`] moves them onto the
//! blocking pool of the tokio runtime so that async callers keep their reactor free.
/*▫~•◦────────────────────────────────────────────────────────────────────────────────────‣
 * © 2025 ArcMoon Studios ◦ SPDX-License-Identifier MIT OR Apache-2.0 ◦ Author: Lord Xyn ✶
 *///◦────────────────────────────────────────────────────────────────────────────────────‣

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn};

use crate::assessor::{AssessmentInputs, ResolutionAssessor};
use crate::config::HarnessConfig;
use crate::error::{HarnessError, Result};
use crate::monitor::ResourceMonitor;
use crate::optimizer::{LoadFactorOptimizer, OptimizationResult};
use crate::profiler::PerformanceProfiler;
use crate::report::{AnalysisMetadata, BaselinePerformance, HarnessReport, WorkloadTiming};
use crate::run_id::{RunId, RunPhase};
use crate::state::{PhaseCoupling, StateUpdate, StateVectorEvolver};
use crate::sustained::{SustainedRunRecord, SustainedRunner};
use crate::workload::WorkloadSet;

/// Load factor every workload starts from.
pub const BASELINE_LOAD_FACTOR: f64 = 1.0;

/// Baseline, sustained run, optimization and assessment over one configuration.
#[derive(Debug)]
pub struct ResolutionHarness {
    config: HarnessConfig,
    workloads: WorkloadSet,
    profiler: PerformanceProfiler,
    monitor: ResourceMonitor,
    sustained: SustainedRunner,
    optimizer: LoadFactorOptimizer,
    assessor: ResolutionAssessor,
    rule: Arc<dyn StateUpdate>,
}

impl ResolutionHarness {
    /// Validate `config` and build a harness that samples the host.
    pub fn new(config: HarnessConfig) -> Result<Self> {
        Self::with_parts(config, ResourceMonitor::system(), Arc::new(PhaseCoupling::default()))
    }

    /// Validate `config` and build a harness with an explicit monitor and state update rule.
    pub fn with_parts(config: HarnessConfig, monitor: ResourceMonitor, rule: Arc<dyn StateUpdate>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            workloads: WorkloadSet::from_config(&config)?,
            profiler: PerformanceProfiler::from_config(&config),
            sustained: SustainedRunner::from_config(&config),
            optimizer: LoadFactorOptimizer::from_config(&config)?,
            assessor: ResolutionAssessor::from_config(&config),
            monitor,
            rule,
            config,
        })
    }

    /// Active configuration.
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Workloads evaluated every cycle.
    pub fn workloads(&self) -> &WorkloadSet {
        &self.workloads
    }

    /// `BASELINE_LOAD_FACTOR` for every workload.
    pub fn initial_load_factors(&self) -> Vec<f64> {
        vec![BASELINE_LOAD_FACTOR; self.workloads.len()]
    }

    /// Fresh evolver seeded from the configuration.
    pub fn evolver(&self) -> Result<StateVectorEvolver> {
        StateVectorEvolver::with_rule(self.config.state_vector_dimension, self.config.seed, Arc::clone(&self.rule))
    }

    /// Root identity for a run starting now.
    pub fn root_run_id(&self) -> RunId {
        RunId::new(self.config.seed, &self.config.fingerprint())
    }

    /// One monitored cycle, retrying unstable cycles up to the instability threshold.
    pub fn baseline(
        &self,
        evolver: &mut StateVectorEvolver,
        load_factors: &[f64],
        run_id: RunId,
    ) -> Result<BaselinePerformance> {
        let threshold = self.config.sustained.max_consecutive_instabilities;
        let mut failures = 0u32;
        loop {
            let monitored = self
                .monitor
                .measure(run_id, || self.profiler.run_cycle(evolver, &self.workloads, load_factors));
            match monitored.value {
                Ok(cycle) => {
                    let workloads = self
                        .workloads
                        .workloads(load_factors)
                        .into_iter()
                        .zip(&cycle.samples)
                        .map(|(w, sample)| WorkloadTiming {
                            name: w.name,
                            complexity_class: w.complexity_class,
                            load_factor: w.load_factor,
                            effective_size: sample.effective_size,
                            computation_time: sample.computation_time.as_secs_f64(),
                        })
                        .collect();
                    info!(
                        %run_id,
                        total_time = cycle.measurement.total_time,
                        real_time_ratio = cycle.measurement.real_time_ratio,
                        "Baseline cycle measured"
                    );
                    return Ok(BaselinePerformance {
                        run_id,
                        workloads,
                        meets_real_time: cycle.measurement.real_time_ratio >= 1.0,
                        measurement: cycle.measurement,
                        resources: monitored.usage,
                    });
                }
                Err(HarnessError::NumericInstability { step, reason }) => {
                    failures += 1;
                    warn!(step, %reason, failures, "Unstable baseline cycle discarded");
                    if failures > threshold {
                        return Err(HarnessError::FatalInstability { consecutive: failures, threshold });
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Sustained run on `evolver` at fixed load factors.
    pub fn sustained(
        &self,
        evolver: &mut StateVectorEvolver,
        load_factors: &[f64],
        run_id: RunId,
        cancel: &CancellationToken,
    ) -> Result<SustainedRunRecord> {
        self.sustained
            .run(evolver, &self.workloads, load_factors, &self.profiler, &self.monitor, run_id, cancel)
    }

    /// Load factor search on forks of `evolver`'s initial state.
    pub fn optimize(
        &self,
        evolver: &StateVectorEvolver,
        load_factors: &[f64],
        run_id: RunId,
        cancel: &CancellationToken,
    ) -> Result<OptimizationResult> {
        self.optimizer
            .optimize(evolver, &self.workloads, &self.profiler, load_factors, run_id, cancel)
    }

    /// Run every phase on the calling thread.
    ///
    /// Cancellation stops the sustained run and the optimizer early; their partial
    /// results still flow into the report. Only cancellation before the baseline cycle
    /// yields [`HarnessError::Cancelled`].
    pub fn run_blocking(&self, cancel: &CancellationToken) -> Result<HarnessReport> {
        let started = Utc::now();
        let root = RunId::at(self.config.seed, &self.config.fingerprint(), started);
        let span = info_span!("harness", run_id = %root);
        let _entered = span.enter();

        if cancel.is_cancelled() {
            return Err(HarnessError::Cancelled("harness cancelled before the baseline cycle".into()));
        }
        info!(workloads = self.workloads.len(), mode = ?self.workloads.mode(), "Harness run started");

        let initial = self.initial_load_factors();
        let mut evolver = self.evolver()?;
        let baseline = self.baseline(&mut evolver, &initial, root.child(RunPhase::Baseline, 0))?;
        let sustained = self.sustained(&mut evolver, &initial, root.child(RunPhase::Sustained, 0), cancel)?;

        let trial_id = root.child(RunPhase::Trial, 0);
        let optimization = match self.optimize(&evolver, &initial, trial_id, cancel) {
            Ok(result) => result,
            Err(HarnessError::Cancelled(reason)) => {
                warn!(%reason, "Optimization skipped");
                OptimizationResult::skipped(trial_id, initial.clone(), baseline.measurement.clone(), reason)
            }
            Err(e) => return Err(e),
        };

        let inputs = AssessmentInputs::from_results(&baseline.measurement, &sustained, &optimization);
        let assessment = self.assessor.assess(&inputs);
        info!(
            score = assessment.overall_resolution_score,
            status = %assessment.resolution_status,
            recommendations = assessment.recommendations.len(),
            "Harness run finished"
        );

        Ok(HarnessReport::new(
            AnalysisMetadata::new(root, &self.config, started),
            baseline,
            sustained,
            optimization,
            assessment,
        ))
    }

    /// Run every phase on the tokio blocking pool.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) -> Result<HarnessReport> {
        match tokio::task::spawn_blocking(move || self.run_blocking(&cancel)).await {
            Ok(report) => report,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(HarnessError::Cancelled(format!("harness task aborted: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assessor::ResolutionStatus;
    use crate::config::{CostMode, SustainedConfig};
    use crate::monitor::UnavailableSampler;
    use crate::sustained::{StopReason, SustainedClock};
    use rand::rngs::StdRng;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Calibrated so that the reference workload table costs ≈0.279 s per cycle.
    const REFERENCE_NANOS_PER_OP: f64 = 0.279e9 / 7_504_582.0;

    fn reference_config() -> HarnessConfig {
        HarnessConfig {
            state_vector_dimension: 16,
            cost_mode: CostMode::Modeled { nanos_per_op: REFERENCE_NANOS_PER_OP, noise: 0.0 },
            sustained: SustainedConfig { duration_secs: 5.06, iteration_cap: 1_000, max_consecutive_instabilities: 3 },
            worker_threads: 2,
            ..HarnessConfig::default()
        }
    }

    fn harness(config: HarnessConfig) -> ResolutionHarness {
        ResolutionHarness::with_parts(config, ResourceMonitor::new(Arc::new(UnavailableSampler)), Arc::new(PhaseCoupling::default()))
            .expect("harness")
    }

    #[test]
    fn test_invalid_config_fails_before_any_run() {
        let config = HarnessConfig { target_frequency: 0.0, ..HarnessConfig::default() };
        assert!(matches!(ResolutionHarness::new(config), Err(HarnessError::Configuration(_))));
    }

    #[test]
    fn test_reference_run_needs_improvement() {
        let report = harness(reference_config()).run_blocking(&CancellationToken::new()).expect("report");

        let baseline = &report.baseline_performance;
        assert_eq!(baseline.workloads.len(), 8);
        assert!((baseline.measurement.total_time - 0.279).abs() < 1e-3);
        assert!((baseline.measurement.real_time_ratio - 0.0036).abs() < 1e-4);
        assert!(!baseline.meets_real_time);
        assert_eq!(baseline.resources.before.run_id, baseline.run_id);
        assert_eq!(baseline.resources.after.run_id, baseline.run_id);

        let sustained = &report.sustained_performance;
        assert_eq!(sustained.clock, SustainedClock::Simulated);
        assert_eq!(sustained.stop_reason, StopReason::Deadline);
        assert!(sustained.iteration_count >= 18);
        assert!(sustained.frequency_ratio < 0.01);

        let optimization = &report.optimization_results;
        assert!(optimization.success);
        assert!(optimization.optimized.total_time <= optimization.baseline.total_time);

        let verdict = &report.resolution_assessment;
        assert!(!verdict.frequency_achievement);
        assert_eq!(verdict.resolution_status, ResolutionStatus::NeedsImprovement);
        assert!(report.recommendations[0].starts_with("Sustained frequency ratio"));
        assert!(report.recommendations.iter().any(|r| r.contains("Resource sampling was unavailable")));
    }

    #[test]
    fn test_report_top_level_fields_are_fixed() {
        let mut config = reference_config();
        config.sustained.iteration_cap = 3;
        config.optimizer.max_trials = 4;
        let report = harness(config).run_blocking(&CancellationToken::new()).expect("report");
        let value = serde_json::to_value(&report).expect("json");
        let keys: Vec<&str> = value.as_object().expect("object").keys().map(String::as_str).collect();
        for key in [
            "analysis_metadata",
            "baseline_performance",
            "sustained_performance",
            "optimization_results",
            "resolution_assessment",
            "recommendations",
        ] {
            assert!(keys.contains(&key), "missing {key}");
        }
        assert_eq!(keys.len(), 6);
        let assessment = &value["resolution_assessment"];
        for key in [
            "frequency_achievement",
            "computational_efficiency",
            "resource_compliance",
            "stability_achievement",
            "overall_resolution_score",
            "resolution_status",
        ] {
            assert!(assessment.get(key).is_some(), "missing resolution_assessment.{key}");
        }
        assert_eq!(assessment["resolution_status"], "NEEDS_IMPROVEMENT");
        assert!(!report.to_text_format().is_empty());
    }

    #[test]
    fn test_cancelled_before_start() {
        let token = CancellationToken::new();
        token.cancel();
        assert!(matches!(
            harness(reference_config()).run_blocking(&token),
            Err(HarnessError::Cancelled(_))
        ));
    }

    /// Cancels the token on the given evolution call.
    #[derive(Debug)]
    struct CancelOnCall {
        call: u32,
        calls: AtomicU32,
        token: CancellationToken,
    }

    impl StateUpdate for CancelOnCall {
        fn apply(&self, state: &mut [f64], _step: u64, _rng: &mut StdRng) {
            if self.calls.fetch_add(1, Ordering::SeqCst) + 1 == self.call {
                self.token.cancel();
            }
            state[0] += 0.1;
        }
    }

    #[test]
    fn test_cancel_during_sustained_still_reports() {
        let token = CancellationToken::new();
        let rule = Arc::new(CancelOnCall { call: 3, calls: AtomicU32::new(0), token: token.clone() });
        let harness = ResolutionHarness::with_parts(
            reference_config(),
            ResourceMonitor::new(Arc::new(UnavailableSampler)),
            rule,
        )
        .expect("harness");
        let report = harness.run_blocking(&token).expect("report");

        let sustained = &report.sustained_performance;
        assert_eq!(sustained.stop_reason, StopReason::Cancelled);
        assert!(sustained.partial);
        assert_eq!(sustained.iteration_count, 2);

        let optimization = &report.optimization_results;
        assert!(optimization.cancelled);
        assert!(!optimization.success);
        assert_eq!(optimization.trials_used, 0);
        assert_eq!(optimization.optimized_load_factors, optimization.initial_load_factors);
        assert_eq!(report.resolution_assessment.resolution_status, ResolutionStatus::NeedsImprovement);
    }

    #[tokio::test]
    async fn test_async_run_matches_blocking_shape() {
        let mut config = reference_config();
        config.sustained.iteration_cap = 2;
        config.optimizer.max_trials = 2;
        let report = Arc::new(harness(config)).run(CancellationToken::new()).await.expect("report");
        assert_eq!(report.sustained_performance.iteration_count, 2);
        assert!(!report.sustained_performance.partial);
        assert!(report.optimization_results.trials_used <= 2);
        assert_eq!(report.analysis_metadata.version, env!("CARGO_PKG_VERSION"));
    }
}
