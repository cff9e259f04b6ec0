/* src/lib.rs */
#![warn(missing_docs, clippy::pedantic)]
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::too_many_arguments,
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::struct_excessive_bools
)]
//! # Cadence: Real-Time Computational Load Harness
//!
//! Measures whether a set of heterogeneous workloads sharing one evolving state vector
//! can keep up with a real-time cycle frequency, searches for per-workload load factors
//! that make them cheaper, and condenses everything into a pass/fail verdict.
//!
//! ## Core Features
//!
//! - Cycle profiling in sequential or parallel execution mode
//! - Scoped CPU/memory sampling with guaranteed closing snapshots
//! - Sustained runs against a deadline, an iteration cap and a cancellation token
//! - Bounded compass search over load factors with concurrent independent trials
//! - Weighted threshold assessment with deterministic recommendations
//!
//! ## Example
//!
//! ```no_run
//! use cadence::{HarnessConfig, ResolutionHarness};
//! use tokio_util::sync::CancellationToken;
//!
//! let harness = ResolutionHarness::new(HarnessConfig::default())?;
//! let report = harness.run_blocking(&CancellationToken::new())?;
//! println!("{}", report.resolution_assessment.resolution_status);
//! # Ok::<(), cadence::HarnessError>(())
//! ```
/*▫~•◦────────────────────────────────────────────────────────────────────────────────────‣
 * © 2025 ArcMoon Studios ◦ SPDX-License-Identifier MIT OR Apache-2.0 ◦ Author: Lord Xyn ✶
 *///◦────────────────────────────────────────────────────────────────────────────────────‣

pub mod metrics;

pub mod assessor;
pub mod config;
pub mod error;
pub mod harness;
pub mod monitor;
pub mod optimizer;
pub mod profiler;
pub mod report;
pub mod run_id;
pub mod state;
pub mod sustained;
pub mod workload;

pub use assessor::{AssessmentInputs, ResolutionAssessment, ResolutionAssessor, ResolutionStatus};
pub use config::{
    CostMode, CriterionWeights, ExecutionMode, HarnessConfig, OptimizerBounds, OptimizerConfig, ResourceCeiling,
    SustainedConfig, Thresholds, WorkloadSpec,
};
pub use error::{HarnessError, Result};
pub use harness::ResolutionHarness;
pub use monitor::{ResourceMonitor, ResourceSampler, ResourceSnapshot, ResourceUsage};
pub use optimizer::{LoadFactorOptimizer, OptimizationResult};
pub use profiler::{CycleMeasurement, PerformanceProfiler};
pub use report::HarnessReport;
pub use run_id::{RunId, RunPhase};
pub use state::{PhaseCoupling, StateUpdate, StateVector, StateVectorEvolver};
pub use sustained::{StopReason, SustainedClock, SustainedRunRecord, SustainedRunner};
pub use workload::{ComplexityClass, Workload, WorkloadModel, WorkloadSet};
