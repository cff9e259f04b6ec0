/* src/config.rs */
//! Harness configuration.
//!
//! The configuration is normally supplied by an external loader; [`HarnessConfig::from_path`]
//! is provided for the CLI and for tests. Every run starts with [`HarnessConfig::validate`],
//! which fails fast with [`HarnessError::Configuration`] before anything is measured.
/*▫~•◦────────────────────────────────────────────────────────────────────────────────────‣
 * © 2025 ArcMoon Studios ◦ SPDX-License-Identifier MIT OR Apache-2.0 ◦ Author: Lord Xyn ✶
 *///◦────────────────────────────────────────────────────────────────────────────────────‣

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, Result};
use crate::workload::{effective_size, modeled_duration, ComplexityClass};

/// Lowest load factor any configuration may allow.
pub const LOAD_FACTOR_FLOOR: f64 = 0.1;
/// Highest load factor any configuration may allow.
pub const LOAD_FACTOR_CEILING: f64 = 2.0;

/// How the workloads of one cycle are executed and aggregated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Deterministic order, repository time is the sum of workload times.
    Sequential,
    /// Bounded worker pool, repository time is the slowest workload time.
    Parallel,
}

/// Where workload computation times come from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum CostMode {
    /// Run the dense kernel and time it with the wall clock.
    Measured,
    /// Synthetic cost `ops(n) * nanos_per_op`, optionally perturbed by seeded relative noise.
    Modeled {
        /// Nanoseconds charged per modeled operation.
        nanos_per_op: f64,
        /// Relative standard deviation of the multiplicative noise (0 disables it).
        noise: f64,
    },
}

/// One entry of the workload table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadSpec {
    /// Unique workload name
    pub name: String,
    /// Asymptotic cost class
    pub complexity_class: ComplexityClass,
    /// Lattice edge length at load factor 1.0
    pub base_matrix_size: u32,
}

impl WorkloadSpec {
    /// Convenience constructor.
    pub fn new(name: impl Into<String>, complexity_class: ComplexityClass, base_matrix_size: u32) -> Self {
        Self { name: name.into(), complexity_class, base_matrix_size }
    }
}

/// Allowed load factor interval for the optimizer and for every workload evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptimizerBounds {
    /// Lower bound (inclusive)
    pub min_load_factor: f64,
    /// Upper bound (inclusive)
    pub max_load_factor: f64,
}

impl Default for OptimizerBounds {
    fn default() -> Self {
        Self { min_load_factor: LOAD_FACTOR_FLOOR, max_load_factor: LOAD_FACTOR_CEILING }
    }
}

impl OptimizerBounds {
    /// Whether `load_factor` lies within the bounds.
    pub fn contains(&self, load_factor: f64) -> bool {
        load_factor.is_finite() && load_factor >= self.min_load_factor && load_factor <= self.max_load_factor
    }

    /// Clamp a value into the bounds.
    pub fn clamp(&self, load_factor: f64) -> f64 {
        load_factor.clamp(self.min_load_factor, self.max_load_factor)
    }
}

/// Load factor search parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Search bounds
    pub bounds: OptimizerBounds,
    /// Initial compass step applied to each load factor
    pub initial_step: f64,
    /// The search stops once the step shrinks below this value
    pub min_step: f64,
    /// Step multiplier after an unsuccessful sweep, in (0, 1)
    pub step_shrink: f64,
    /// Maximum number of measured trial cycles (baseline trial included)
    pub max_trials: u32,
    /// Maximum number of trial cycles evaluated concurrently
    pub trial_concurrency: usize,
    /// Minimum relative reduction of total time for a candidate to be accepted
    pub min_relative_improvement: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            bounds: OptimizerBounds::default(),
            initial_step: 0.25,
            min_step: 0.02,
            step_shrink: 0.5,
            max_trials: 64,
            trial_concurrency: 4,
            min_relative_improvement: 0.01,
        }
    }
}

/// Sustained run budget.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SustainedConfig {
    /// Wall clock deadline in seconds
    pub duration_secs: f64,
    /// Maximum number of completed iterations
    pub iteration_cap: u64,
    /// Unstable cycles tolerated in a row before the run is aborted
    pub max_consecutive_instabilities: u32,
}

impl Default for SustainedConfig {
    fn default() -> Self {
        Self { duration_secs: 5.0, iteration_cap: 10_000, max_consecutive_instabilities: 3 }
    }
}

/// Relative weight of each assessment criterion in the overall score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CriterionWeights {
    /// Weight of frequency achievement
    pub frequency: f64,
    /// Weight of computational efficiency
    pub efficiency: f64,
    /// Weight of resource compliance
    pub resources: f64,
    /// Weight of stability achievement
    pub stability: f64,
}

impl Default for CriterionWeights {
    fn default() -> Self {
        Self { frequency: 1.0, efficiency: 1.0, resources: 1.0, stability: 1.0 }
    }
}

impl CriterionWeights {
    fn as_array(&self) -> [f64; 4] {
        [self.frequency, self.efficiency, self.resources, self.stability]
    }

    /// Sum of all weights.
    pub fn total(&self) -> f64 {
        self.as_array().iter().sum()
    }
}

/// Pass/fail rubric used by the assessor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Required sustained frequency ratio
    pub min_frequency_ratio: f64,
    /// Required efficiency
    pub min_efficiency: f64,
    /// Required stability score
    pub min_stability: f64,
    /// Score at or above which (with all criteria passing) the status is acceptable
    pub acceptable_score: f64,
    /// Criterion weights
    pub weights: CriterionWeights,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            min_frequency_ratio: 1.0,
            min_efficiency: 0.5,
            min_stability: 0.9,
            acceptable_score: 0.8,
            weights: CriterionWeights::default(),
        }
    }
}

/// Resource ceilings for optimization candidates and sustained runs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceCeiling {
    /// Upper bound for the summed dense working set of all workloads
    pub max_workload_memory_bytes: u64,
    /// Largest tolerated rise in CPU usage across a measured block, in percent points
    pub max_cpu_delta_percent: f64,
    /// Largest tolerated rise in used memory across a measured block
    pub max_memory_delta_bytes: u64,
}

impl Default for ResourceCeiling {
    fn default() -> Self {
        Self {
            max_workload_memory_bytes: 512 * 1024 * 1024,
            max_cpu_delta_percent: 50.0,
            max_memory_delta_bytes: 256 * 1024 * 1024,
        }
    }
}

/// Complete harness configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Dimension D of the shared state vector
    pub state_vector_dimension: usize,
    /// Real-time target in Hz; the cycle period is its reciprocal
    pub target_frequency: f64,
    /// Per-cycle computation budget in seconds
    pub max_computation_time: f64,
    /// Root seed for state initialisation and trial derivation
    pub seed: u64,
    /// Workload execution mode
    pub execution_mode: ExecutionMode,
    /// Worker pool size for parallel execution
    pub worker_threads: usize,
    /// Source of workload computation times
    pub cost_mode: CostMode,
    /// Workload table
    pub workloads: Vec<WorkloadSpec>,
    /// Sustained run budget
    #[serde(default)]
    pub sustained: SustainedConfig,
    /// Optimizer bounds and search parameters
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    /// Assessment rubric
    #[serde(default)]
    pub thresholds: Thresholds,
    /// Resource ceilings
    #[serde(default)]
    pub resource_ceiling: ResourceCeiling,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            state_vector_dimension: 64,
            target_frequency: 1000.0,
            max_computation_time: 0.1,
            seed: 0x1337_CAFE_BABE_FEED,
            execution_mode: ExecutionMode::Sequential,
            worker_threads: num_cpus::get(),
            cost_mode: CostMode::Measured,
            workloads: default_workloads(),
            sustained: SustainedConfig::default(),
            optimizer: OptimizerConfig::default(),
            thresholds: Thresholds::default(),
            resource_ceiling: ResourceCeiling::default(),
        }
    }
}

/// The reference set of eight heterogeneous workloads.
pub fn default_workloads() -> Vec<WorkloadSpec> {
    vec![
        WorkloadSpec::new("field_propagator", ComplexityClass::High, 64),
        WorkloadSpec::new("spectral_decomposition", ComplexityClass::VeryHigh, 135),
        WorkloadSpec::new("boundary_coupling", ComplexityClass::Medium, 32),
        WorkloadSpec::new("phase_synchronizer", ComplexityClass::Medium, 48),
        WorkloadSpec::new("topology_tracker", ComplexityClass::Low, 24),
        WorkloadSpec::new("entropy_balancer", ComplexityClass::High, 56),
        WorkloadSpec::new("lattice_relaxation", ComplexityClass::High, 72),
        WorkloadSpec::new("coherence_estimator", ComplexityClass::VeryHigh, 96),
    ]
}

impl HarnessConfig {
    /// Target cycle period in seconds.
    pub fn target_cycle_period(&self) -> f64 {
        1.0 / self.target_frequency
    }

    /// Stable byte fingerprint used to derive run identities.
    pub fn fingerprint(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// Load a configuration from YAML (`.yaml`/`.yml`) or JSON.
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = match path.extension().and_then(|s| s.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)?,
            _ => serde_json::from_str(&content)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject any configuration that cannot produce a meaningful run.
    pub fn validate(&self) -> Result<()> {
        if self.state_vector_dimension == 0 {
            return Err(HarnessError::config("state_vector_dimension must be at least 1"));
        }
        if !self.target_frequency.is_finite() || self.target_frequency <= 0.0 {
            return Err(HarnessError::config(format!(
                "target_frequency must be finite and positive, got {}",
                self.target_frequency
            )));
        }
        if !self.max_computation_time.is_finite() || self.max_computation_time <= 0.0 {
            return Err(HarnessError::config("max_computation_time must be finite and positive"));
        }
        if self.worker_threads == 0 {
            return Err(HarnessError::config("worker_threads must be at least 1"));
        }
        if let CostMode::Modeled { nanos_per_op, noise } = self.cost_mode {
            if !nanos_per_op.is_finite() || nanos_per_op <= 0.0 {
                return Err(HarnessError::config("modeled nanos_per_op must be finite and positive"));
            }
            if !(0.0..1.0).contains(&noise) {
                return Err(HarnessError::config("modeled noise must lie in [0, 1)"));
            }
        }
        self.validate_workloads()?;
        self.validate_optimizer()?;
        self.validate_sustained()?;
        self.validate_thresholds()
    }

    fn validate_workloads(&self) -> Result<()> {
        if self.workloads.is_empty() {
            return Err(HarnessError::config("at least one workload is required"));
        }
        let mut names = HashSet::new();
        for spec in &self.workloads {
            if spec.name.trim().is_empty() {
                return Err(HarnessError::config("workload names must not be empty"));
            }
            if spec.base_matrix_size == 0 {
                return Err(HarnessError::config(format!(
                    "workload '{}' has base_matrix_size 0",
                    spec.name
                )));
            }
            if !names.insert(spec.name.as_str()) {
                return Err(HarnessError::config(format!("duplicate workload name '{}'", spec.name)));
            }
            if let CostMode::Modeled { nanos_per_op, .. } = self.cost_mode {
                let n = effective_size(spec.base_matrix_size, self.optimizer.bounds.max_load_factor);
                let nominal = spec.complexity_class.operation_count(n) * nanos_per_op * 1e-9;
                if modeled_duration(nominal).is_none() {
                    return Err(HarnessError::config(format!(
                        "workload '{}' has an unrepresentable modeled time at load factor {}",
                        spec.name, self.optimizer.bounds.max_load_factor
                    )));
                }
            }
        }
        Ok(())
    }

    fn validate_optimizer(&self) -> Result<()> {
        let opt = &self.optimizer;
        let OptimizerBounds { min_load_factor: lo, max_load_factor: hi } = opt.bounds;
        if !(lo.is_finite() && hi.is_finite()) || lo < LOAD_FACTOR_FLOOR || hi > LOAD_FACTOR_CEILING || lo >= hi {
            return Err(HarnessError::config(format!(
                "optimizer bounds [{lo}, {hi}] must satisfy {LOAD_FACTOR_FLOOR} <= min < max <= {LOAD_FACTOR_CEILING}"
            )));
        }
        if lo > 1.0 || hi < 1.0 {
            return Err(HarnessError::config("optimizer bounds must contain the baseline load factor 1.0"));
        }
        if !(opt.initial_step > 0.0 && opt.min_step > 0.0 && opt.min_step <= opt.initial_step) {
            return Err(HarnessError::config("optimizer steps must satisfy 0 < min_step <= initial_step"));
        }
        if !(opt.step_shrink > 0.0 && opt.step_shrink < 1.0) {
            return Err(HarnessError::config("optimizer step_shrink must lie in (0, 1)"));
        }
        if opt.max_trials == 0 {
            return Err(HarnessError::config("optimizer max_trials must be at least 1"));
        }
        if opt.trial_concurrency == 0 {
            return Err(HarnessError::config("optimizer trial_concurrency must be at least 1"));
        }
        if !(opt.min_relative_improvement >= 0.0 && opt.min_relative_improvement < 1.0) {
            return Err(HarnessError::config("optimizer min_relative_improvement must lie in [0, 1)"));
        }
        Ok(())
    }

    fn validate_sustained(&self) -> Result<()> {
        let sustained = &self.sustained;
        if !sustained.duration_secs.is_finite() || sustained.duration_secs <= 0.0 {
            return Err(HarnessError::config("sustained duration_secs must be finite and positive"));
        }
        if sustained.iteration_cap == 0 {
            return Err(HarnessError::config("sustained iteration_cap must be at least 1"));
        }
        Ok(())
    }

    fn validate_thresholds(&self) -> Result<()> {
        let t = &self.thresholds;
        for (name, value) in [
            ("min_stability", t.min_stability),
            ("acceptable_score", t.acceptable_score),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(HarnessError::config(format!("threshold {name} must lie in [0, 1], got {value}")));
            }
        }
        for (name, value) in [
            ("min_frequency_ratio", t.min_frequency_ratio),
            ("min_efficiency", t.min_efficiency),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(HarnessError::config(format!("threshold {name} must be finite and non-negative")));
            }
        }
        let weights = t.weights.as_array();
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) || t.weights.total() <= 0.0 {
            return Err(HarnessError::config("criterion weights must be non-negative with a positive sum"));
        }
        let ceiling = &self.resource_ceiling;
        if !ceiling.max_cpu_delta_percent.is_finite() || ceiling.max_cpu_delta_percent < 0.0 {
            return Err(HarnessError::config("max_cpu_delta_percent must be finite and non-negative"));
        }
        Ok(())
    }
}
