/* src/report.rs */
//! # Harness report
//!
//! The document handed to downstream report writers. Top-level field names and the
//! nesting of `resolution_assessment` are fixed:
//!
//! ```text
//! analysis_metadata
//! baseline_performance
//! sustained_performance
//! optimization_results
//! resolution_assessment { frequency_achievement, computational_efficiency,
//!                         resource_compliance, stability_achievement,
//!                         overall_resolution_score, resolution_status }
//! recommendations
//! ```
/*▫~•◦────────────────────────────────────────────────────────────────────────────────────‣
 * © 2025 ArcMoon Studios ◦ SPDX-License-Identifier MIT OR Apache-2.0 ◦ Author: Lord Xyn ✶
 *///◦────────────────────────────────────────────────────────────────────────────────────‣

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::assessor::{ResolutionAssessment, ResolutionStatus};
use crate::config::{CostMode, ExecutionMode, HarnessConfig};
use crate::monitor::ResourceUsage;
use crate::optimizer::OptimizationResult;
use crate::profiler::CycleMeasurement;
use crate::run_id::RunId;
use crate::sustained::SustainedRunRecord;
use crate::workload::ComplexityClass;

/// Host the harness ran on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostInfo {
    /// CPU brand and core count
    pub cpu_info: String,
    /// Logical CPUs
    pub logical_cpus: usize,
    /// Installed memory in GiB, when known
    pub total_memory_gb: Option<f64>,
    /// Operating system description
    pub os_info: String,
}

impl HostInfo {
    /// Describe the current host.
    #[cfg(feature = "system-monitoring")]
    pub fn collect() -> Self {
        let mut system = sysinfo::System::new();
        system.refresh_cpu_all();
        system.refresh_memory();
        let cpu_info = format!(
            "{} ({} cores)",
            system.cpus().first().map(|cpu| cpu.brand()).unwrap_or("Unknown"),
            system.cpus().len()
        );
        Self {
            cpu_info,
            logical_cpus: num_cpus::get(),
            total_memory_gb: Some(system.total_memory() as f64 / (1024.0 * 1024.0 * 1024.0)),
            os_info: sysinfo::System::long_os_version().unwrap_or_else(|| std::env::consts::OS.to_string()),
        }
    }

    /// Describe the current host.
    #[cfg(not(feature = "system-monitoring"))]
    pub fn collect() -> Self {
        Self {
            cpu_info: format!("Unknown ({} cores)", num_cpus::get_physical()),
            logical_cpus: num_cpus::get(),
            total_memory_gb: None,
            os_info: std::env::consts::OS.to_string(),
        }
    }
}

/// Configuration fields worth repeating next to the results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSummary {
    /// State vector dimension
    pub state_vector_dimension: usize,
    /// Target frequency in Hz
    pub target_frequency: f64,
    /// Per-cycle computation budget in seconds
    pub max_computation_time: f64,
    /// Workload execution mode
    pub execution_mode: ExecutionMode,
    /// Worker pool size
    pub worker_threads: usize,
    /// Source of workload times
    pub cost_mode: CostMode,
    /// Number of workloads
    pub workload_count: usize,
    /// Root seed
    pub seed: u64,
}

impl From<&HarnessConfig> for ConfigSummary {
    fn from(config: &HarnessConfig) -> Self {
        Self {
            state_vector_dimension: config.state_vector_dimension,
            target_frequency: config.target_frequency,
            max_computation_time: config.max_computation_time,
            execution_mode: config.execution_mode,
            worker_threads: config.worker_threads,
            cost_mode: config.cost_mode,
            workload_count: config.workloads.len(),
            seed: config.seed,
        }
    }
}

/// Provenance of a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisMetadata {
    /// Identity of the harness run
    pub run_id: RunId,
    /// When the run started
    pub timestamp: DateTime<Utc>,
    /// Crate version that produced the report
    pub version: String,
    /// Configuration summary
    pub configuration: ConfigSummary,
    /// Host description
    pub host: HostInfo,
}

impl AnalysisMetadata {
    /// Metadata for a run starting now on this host.
    pub fn new(run_id: RunId, config: &HarnessConfig, timestamp: DateTime<Utc>) -> Self {
        Self {
            run_id,
            timestamp,
            version: env!("CARGO_PKG_VERSION").to_string(),
            configuration: ConfigSummary::from(config),
            host: HostInfo::collect(),
        }
    }
}

/// Timing of one workload in the baseline cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadTiming {
    /// Workload name
    pub name: String,
    /// Cost class
    pub complexity_class: ComplexityClass,
    /// Load factor used
    pub load_factor: f64,
    /// Effective size used
    pub effective_size: usize,
    /// Seconds spent
    pub computation_time: f64,
}

/// One monitored cycle at the initial load factors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselinePerformance {
    /// Identity shared by the snapshot pair
    pub run_id: RunId,
    /// Per-workload timings in table order
    pub workloads: Vec<WorkloadTiming>,
    /// Cycle metrics
    pub measurement: CycleMeasurement,
    /// Snapshot pair bracketing the cycle
    pub resources: ResourceUsage,
    /// `real_time_ratio ≥ 1`
    pub meets_real_time: bool,
}

/// The `resolution_assessment` section: criteria, score and status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentSection {
    /// Frequency criterion
    pub frequency_achievement: bool,
    /// Efficiency criterion
    pub computational_efficiency: bool,
    /// Resource criterion
    pub resource_compliance: bool,
    /// Stability criterion
    pub stability_achievement: bool,
    /// Weighted score in `[0, 1]`
    pub overall_resolution_score: f64,
    /// Verdict
    pub resolution_status: ResolutionStatus,
}

/// Structured result of a full harness run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarnessReport {
    /// Provenance
    pub analysis_metadata: AnalysisMetadata,
    /// Baseline cycle
    pub baseline_performance: BaselinePerformance,
    /// Sustained run
    pub sustained_performance: SustainedRunRecord,
    /// Load factor search
    pub optimization_results: OptimizationResult,
    /// Verdict
    pub resolution_assessment: AssessmentSection,
    /// Ordered advice
    pub recommendations: Vec<String>,
}

impl HarnessReport {
    /// Assemble a report, moving the recommendations to the top level.
    pub fn new(
        analysis_metadata: AnalysisMetadata,
        baseline_performance: BaselinePerformance,
        sustained_performance: SustainedRunRecord,
        optimization_results: OptimizationResult,
        assessment: ResolutionAssessment,
    ) -> Self {
        let ResolutionAssessment {
            frequency_achievement,
            computational_efficiency,
            resource_compliance,
            stability_achievement,
            overall_resolution_score,
            resolution_status,
            recommendations,
        } = assessment;
        Self {
            analysis_metadata,
            baseline_performance,
            sustained_performance,
            optimization_results,
            resolution_assessment: AssessmentSection {
                frequency_achievement,
                computational_efficiency,
                resource_compliance,
                stability_achievement,
                overall_resolution_score,
                resolution_status,
            },
            recommendations,
        }
    }

    /// Human readable summary.
    pub fn to_text_format(&self) -> String {
        let meta = &self.analysis_metadata;
        let base = &self.baseline_performance.measurement;
        let sus = &self.sustained_performance;
        let opt = &self.optimization_results;
        let verdict = &self.resolution_assessment;
        let mut out = String::new();

        let _ = writeln!(out, "=== CADENCE RESOLUTION REPORT ===\n");
        let _ = writeln!(out, "Run: {}", meta.run_id);
        let _ = writeln!(out, "Timestamp: {}", meta.timestamp.to_rfc3339());
        let _ = writeln!(out, "Version: {}", meta.version);
        let _ = writeln!(
            out,
            "Target: {:.1} Hz, {} workloads, {:?} execution",
            meta.configuration.target_frequency, meta.configuration.workload_count, meta.configuration.execution_mode
        );

        let _ = writeln!(out, "\n=== BASELINE ===");
        for w in &self.baseline_performance.workloads {
            let _ = writeln!(
                out,
                "  {:<24} {:<9} n={:<5} {:.6}s",
                w.name,
                w.complexity_class.to_string(),
                w.effective_size, w.computation_time
            );
        }
        let _ = writeln!(out, "Total Time: {:.6}s", base.total_time);
        let _ = writeln!(out, "Real-Time Ratio: {:.4}", base.real_time_ratio);
        let _ = writeln!(out, "Parallel Efficiency: {:.4}", base.parallel_efficiency);

        let _ = writeln!(out, "\n=== SUSTAINED ===");
        let _ = writeln!(out, "Iterations: {} in {:.3}s ({:?})", sus.iteration_count, sus.duration, sus.stop_reason);
        let _ = writeln!(out, "Achieved Frequency: {:.2} Hz (ratio {:.4})", sus.achieved_frequency, sus.frequency_ratio);
        let _ = writeln!(out, "Efficiency: mean {:.4}, min {:.4}", sus.mean_efficiency, sus.min_efficiency);
        let _ = writeln!(out, "Stability: {:.4}", sus.stability);
        if sus.partial {
            let _ = writeln!(out, "Partial: yes");
        }

        let _ = writeln!(out, "\n=== OPTIMIZATION ===");
        let _ = writeln!(out, "Success: {} after {} trials", opt.success, opt.trials_used);
        let _ = writeln!(out, "Improvement: {:.2}%", opt.performance_improvement * 100.0);
        let factors: Vec<String> = opt.optimized_load_factors.iter().map(|lf| format!("{lf:.2}")).collect();
        let _ = writeln!(out, "Load Factors: [{}]", factors.join(", "));

        let _ = writeln!(out, "\n=== ASSESSMENT ===");
        let _ = writeln!(out, "Frequency Achievement: {}", verdict.frequency_achievement);
        let _ = writeln!(out, "Computational Efficiency: {}", verdict.computational_efficiency);
        let _ = writeln!(out, "Resource Compliance: {}", verdict.resource_compliance);
        let _ = writeln!(out, "Stability Achievement: {}", verdict.stability_achievement);
        let _ = writeln!(out, "Score: {:.3}", verdict.overall_resolution_score);
        let _ = writeln!(out, "Status: {}", verdict.resolution_status);

        if !self.recommendations.is_empty() {
            let _ = writeln!(out, "\n=== RECOMMENDATIONS ===");
            for (i, rec) in self.recommendations.iter().enumerate() {
                let _ = writeln!(out, "{}. {}", i + 1, rec);
            }
        }
        out
    }
}
