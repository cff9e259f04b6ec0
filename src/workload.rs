/* src/workload.rs */
//! # Workload models
//!
//! Each workload is a synthetic cost function standing in for one component of the
//! simulated system. Its problem size is a lattice edge length scaled by a load factor,
//! and its cost follows the declared [`ComplexityClass`]:
//!
//! | class       | operations      | kernel                         |
//! |-------------|-----------------|--------------------------------|
//! | `low`       | `n`             | element-wise sweep             |
//! | `medium`    | `n²`            | dense matrix-vector product    |
//! | `high`      | `n³`            | dense matrix-matrix product    |
//! | `very_high` | `2·n³`          | two chained matrix products    |
//!
//! In [`CostMode::Measured`] the kernel really runs and is timed; in
//! [`CostMode::Modeled`] a deterministic synthetic time is charged per operation.
/*▫~•◦────────────────────────────────────────────────────────────────────────────────────‣
 * © 2025 ArcMoon Studios ◦ SPDX-License-Identifier MIT OR Apache-2.0 ◦ Author: Lord Xyn ✶
 *///◦────────────────────────────────────────────────────────────────────────────────────‣

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::config::{CostMode, ExecutionMode, HarnessConfig, OptimizerBounds, WorkloadSpec};
use crate::error::{HarnessError, Result};
use crate::state::derive_seed;

/// Asymptotic cost class of a workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityClass {
    /// Linear in the effective size
    Low,
    /// Quadratic in the effective size
    Medium,
    /// Cubic in the effective size
    High,
    /// Cubic with a doubled constant
    VeryHigh,
}

impl ComplexityClass {
    /// All variants in ascending cost order.
    pub fn value_variants() -> &'static [Self] {
        &[Self::Low, Self::Medium, Self::High, Self::VeryHigh]
    }

    /// Modeled operation count for an effective size `n`.
    pub fn operation_count(&self, n: usize) -> f64 {
        let n = n as f64;
        match self {
            Self::Low => n,
            Self::Medium => n * n,
            Self::High => n * n * n,
            Self::VeryHigh => 2.0 * n * n * n,
        }
    }

    /// Dense working set of the kernel in bytes for an effective size `n`.
    pub fn working_set_bytes(&self, n: usize) -> u64 {
        let n = n as u64;
        let elements = match self {
            Self::Low => n,
            Self::Medium => n * n + 2 * n,
            Self::High => 3 * n * n,
            Self::VeryHigh => 4 * n * n,
        };
        elements * std::mem::size_of::<f64>() as u64
    }
}

impl fmt::Display for ComplexityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::VeryHigh => write!(f, "very_high"),
        }
    }
}

impl FromStr for ComplexityClass {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, String> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "very_high" | "veryhigh" | "very-high" => Ok(Self::VeryHigh),
            _ => Err(format!("Unknown ComplexityClass: {}", s)),
        }
    }
}

/// `max(1, round(base_matrix_size × load_factor))`.
pub fn effective_size(base_matrix_size: u32, load_factor: f64) -> usize {
    let scaled = (f64::from(base_matrix_size) * load_factor).round();
    if scaled.is_finite() && scaled >= 1.0 {
        scaled as usize
    } else {
        1
    }
}

/// Seconds as a `Duration`, or `None` when negative, non-finite or too large.
pub fn modeled_duration(seconds: f64) -> Option<Duration> {
    if seconds < 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(seconds).ok()
}

/// A workload together with its current load factor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workload {
    /// Position in the workload table
    pub id: usize,
    /// Workload name
    pub name: String,
    /// Cost class
    pub complexity_class: ComplexityClass,
    /// Lattice edge length at load factor 1.0
    pub base_matrix_size: u32,
    /// Current load factor
    pub load_factor: f64,
}

impl Workload {
    /// Effective lattice edge length under the current load factor.
    pub fn effective_size(&self) -> usize {
        effective_size(self.base_matrix_size, self.load_factor)
    }
}

/// Result of one workload evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorkloadSample {
    /// Time spent computing
    pub computation_time: Duration,
    /// Effective size used
    pub effective_size: usize,
}

/// Synthetic per-component cost function.
#[derive(Debug)]
pub struct WorkloadModel {
    id: usize,
    spec: WorkloadSpec,
    bounds: OptimizerBounds,
    cost_mode: CostMode,
    seed: u64,
}

impl WorkloadModel {
    /// Create a model for `spec` at table position `id`.
    pub fn new(id: usize, spec: WorkloadSpec, bounds: OptimizerBounds, cost_mode: CostMode, seed: u64) -> Self {
        Self { id, spec, bounds, cost_mode, seed }
    }

    /// Position in the workload table.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Workload name.
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Workload table entry.
    pub fn spec(&self) -> &WorkloadSpec {
        &self.spec
    }

    /// Snapshot of this workload at the given load factor.
    pub fn workload(&self, load_factor: f64) -> Workload {
        Workload {
            id: self.id,
            name: self.spec.name.clone(),
            complexity_class: self.spec.complexity_class,
            base_matrix_size: self.spec.base_matrix_size,
            load_factor,
        }
    }

    fn check_load_factor(&self, load_factor: f64) -> Result<()> {
        if self.bounds.contains(load_factor) {
            Ok(())
        } else {
            Err(HarnessError::InvalidLoadFactor {
                workload: self.spec.name.clone(),
                load_factor,
                min: self.bounds.min_load_factor,
                max: self.bounds.max_load_factor,
            })
        }
    }

    /// Effective size for a load factor, validated against the bounds.
    pub fn effective_size(&self, load_factor: f64) -> Result<usize> {
        self.check_load_factor(load_factor)?;
        Ok(effective_size(self.spec.base_matrix_size, load_factor))
    }

    /// Dense working set at a load factor.
    pub fn estimated_memory_bytes(&self, load_factor: f64) -> Result<u64> {
        let n = self.effective_size(load_factor)?;
        Ok(self.spec.complexity_class.working_set_bytes(n))
    }

    /// Evaluate the workload once, returning `(computation_time, effective_size)`.
    ///
    /// Kernel inputs and modeled noise are drawn from `derive_seed(model seed, cycle_seed)`,
    /// so the same cycle seed always reproduces the same evaluation.
    pub fn compute(&self, load_factor: f64, cycle_seed: u64) -> Result<WorkloadSample> {
        let n = self.effective_size(load_factor)?;
        let mut rng = StdRng::seed_from_u64(derive_seed(self.seed, cycle_seed));

        let computation_time = match self.cost_mode {
            CostMode::Measured => self.run_kernel(n, &mut rng),
            CostMode::Modeled { nanos_per_op, noise } => {
                let nominal = self.spec.complexity_class.operation_count(n) * nanos_per_op * 1e-9;
                let factor = if noise > 0.0 {
                    Normal::new(1.0, noise)
                        .map(|dist| dist.sample(&mut rng).max(0.0))
                        .unwrap_or(1.0)
                } else {
                    1.0
                };
                modeled_duration(nominal * factor).ok_or_else(|| {
                    HarnessError::config(format!(
                        "modeled time of workload '{}' at load factor {load_factor} is not representable",
                        self.spec.name
                    ))
                })?
            }
        };

        trace!(
            workload = %self.spec.name,
            load_factor,
            effective_size = n,
            seconds = computation_time.as_secs_f64(),
            "Workload evaluated"
        );

        Ok(WorkloadSample { computation_time, effective_size: n })
    }

    /// Run the dense kernel for size `n`; only the kernel itself is timed.
    fn run_kernel(&self, n: usize, rng: &mut StdRng) -> Duration {
        match self.spec.complexity_class {
            ComplexityClass::Low => {
                let sites = Array1::from_shape_fn(n, |_| rng.random::<f64>());
                let start = Instant::now();
                let energy: f64 = sites.mapv(|x| (x * std::f64::consts::TAU).cos()).sum();
                std::hint::black_box(energy);
                start.elapsed()
            }
            ComplexityClass::Medium => {
                let coupling = Array2::from_shape_fn((n, n), |_| rng.random::<f64>() - 0.5);
                let field = Array1::from_shape_fn(n, |_| rng.random::<f64>());
                let start = Instant::now();
                let response = coupling.dot(&field);
                std::hint::black_box(response);
                start.elapsed()
            }
            ComplexityClass::High => {
                let a = Array2::from_shape_fn((n, n), |_| rng.random::<f64>() - 0.5);
                let b = Array2::from_shape_fn((n, n), |_| rng.random::<f64>() - 0.5);
                let start = Instant::now();
                let product = a.dot(&b);
                std::hint::black_box(product);
                start.elapsed()
            }
            ComplexityClass::VeryHigh => {
                let a = Array2::from_shape_fn((n, n), |_| rng.random::<f64>() - 0.5);
                let b = Array2::from_shape_fn((n, n), |_| rng.random::<f64>() - 0.5);
                let start = Instant::now();
                let product = a.dot(&b).dot(&a);
                std::hint::black_box(product);
                start.elapsed()
            }
        }
    }
}

/// The fixed set of workloads evaluated every cycle.
#[derive(Debug)]
pub struct WorkloadSet {
    models: Vec<WorkloadModel>,
    mode: ExecutionMode,
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl WorkloadSet {
    /// Build the set described by the configuration.
    pub fn from_config(config: &HarnessConfig) -> Result<Self> {
        let models = config
            .workloads
            .iter()
            .enumerate()
            .map(|(id, spec)| {
                WorkloadModel::new(
                    id,
                    spec.clone(),
                    config.optimizer.bounds,
                    config.cost_mode,
                    derive_seed(config.seed, 0x5745_0000 + id as u64),
                )
            })
            .collect();
        Self::new(models, config.execution_mode, config.worker_threads)
    }

    /// Assemble a set from explicit models.
    pub fn new(models: Vec<WorkloadModel>, mode: ExecutionMode, worker_threads: usize) -> Result<Self> {
        let pool = match mode {
            ExecutionMode::Sequential => None,
            ExecutionMode::Parallel => Some(Arc::new(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(worker_threads.max(1))
                    .thread_name(|i| format!("cadence-worker-{i}"))
                    .build()
                    .map_err(|e| HarnessError::config(format!("failed to build worker pool: {e}")))?,
            )),
        };
        Ok(Self { models, mode, pool })
    }

    /// Execution mode of the set.
    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Number of workloads.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Models in table order.
    pub fn models(&self) -> &[WorkloadModel] {
        &self.models
    }

    /// Workload snapshots at the given load factors.
    pub fn workloads(&self, load_factors: &[f64]) -> Vec<Workload> {
        self.models
            .iter()
            .zip(load_factors)
            .map(|(model, &lf)| model.workload(lf))
            .collect()
    }

    /// Summed dense working set of all workloads.
    pub fn estimated_memory_bytes(&self, load_factors: &[f64]) -> Result<u64> {
        self.check_arity(load_factors)?;
        self.models
            .iter()
            .zip(load_factors)
            .map(|(model, &lf)| model.estimated_memory_bytes(lf))
            .sum()
    }

    fn check_arity(&self, load_factors: &[f64]) -> Result<()> {
        if load_factors.len() == self.models.len() {
            Ok(())
        } else {
            Err(HarnessError::config(format!(
                "expected {} load factors, got {}",
                self.models.len(),
                load_factors.len()
            )))
        }
    }

    /// Evaluate every workload once. Samples are returned in table order in both modes.
    ///
    /// Each workload seeds its own RNG from `cycle_seed`, so results do not depend on
    /// which worker thread picks up which workload.
    pub fn compute_all(&self, load_factors: &[f64], cycle_seed: u64) -> Result<Vec<WorkloadSample>> {
        self.check_arity(load_factors)?;
        match &self.pool {
            None => self
                .models
                .iter()
                .zip(load_factors)
                .map(|(model, &lf)| model.compute(lf, cycle_seed))
                .collect(),
            Some(pool) => pool.install(|| {
                self.models
                    .par_iter()
                    .zip(load_factors.par_iter())
                    .map(|(model, &lf)| model.compute(lf, cycle_seed))
                    .collect()
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn modeled(nanos_per_op: f64) -> CostMode {
        CostMode::Modeled { nanos_per_op, noise: 0.0 }
    }

    fn model(class: ComplexityClass, base: u32, cost_mode: CostMode) -> WorkloadModel {
        WorkloadModel::new(0, WorkloadSpec::new("kernel", class, base), OptimizerBounds::default(), cost_mode, 7)
    }

    #[test]
    fn test_effective_size_boundaries() {
        assert_eq!(effective_size(24, 0.1), 2);
        assert_eq!(effective_size(64, 1.0), 64);
        assert_eq!(effective_size(135, 2.0), 270);
        assert_eq!(effective_size(3, 0.1), 1);
        assert_eq!(effective_size(1, 0.1), 1);
        assert_eq!(effective_size(5, 0.5), 3);
    }

    #[test]
    fn test_out_of_bounds_load_factor_is_rejected() {
        let model = model(ComplexityClass::Low, 24, modeled(1.0));
        assert!(matches!(model.compute(0.05, 0), Err(HarnessError::InvalidLoadFactor { .. })));
        assert!(matches!(model.compute(2.5, 0), Err(HarnessError::InvalidLoadFactor { .. })));
        assert!(matches!(model.compute(f64::NAN, 0), Err(HarnessError::InvalidLoadFactor { .. })));
        assert!(model.compute(0.1, 0).is_ok());
        assert!(model.compute(2.0, 0).is_ok());
    }

    #[test]
    fn test_modeled_cost_follows_complexity_class() {
        let low = model(ComplexityClass::Low, 10, modeled(1_000.0)).compute(1.0, 0).expect("low");
        let medium = model(ComplexityClass::Medium, 10, modeled(1_000.0)).compute(1.0, 0).expect("medium");
        let high = model(ComplexityClass::High, 10, modeled(1_000.0)).compute(1.0, 0).expect("high");
        let very_high = model(ComplexityClass::VeryHigh, 10, modeled(1_000.0)).compute(1.0, 0).expect("very high");

        assert!((low.computation_time.as_secs_f64() - 10.0e-6).abs() < 1e-12);
        assert!((medium.computation_time.as_secs_f64() - 100.0e-6).abs() < 1e-12);
        assert!((high.computation_time.as_secs_f64() - 1_000.0e-6).abs() < 1e-12);
        assert!((very_high.computation_time.as_secs_f64() - 2_000.0e-6).abs() < 1e-12);
    }

    #[test]
    fn test_noise_is_reproducible_per_cycle_seed() {
        let noisy = CostMode::Modeled { nanos_per_op: 50.0, noise: 0.3 };
        let model = model(ComplexityClass::Medium, 40, noisy);
        let first = model.compute(1.0, 11).expect("first");
        let again = model.compute(1.0, 11).expect("again");
        assert_eq!(first, again);

        let draws: Vec<_> = (0..8).map(|seed| model.compute(1.0, seed).expect("draw").computation_time).collect();
        assert!(draws.windows(2).any(|w| w[0] != w[1]));
    }

    #[test]
    fn test_unrepresentable_modeled_time_is_an_error() {
        let model = model(ComplexityClass::High, 4_000_000_000, modeled(1.0));
        assert!(matches!(model.compute(2.0, 0), Err(HarnessError::Configuration(_))));
        assert_eq!(modeled_duration(f64::INFINITY), None);
        assert_eq!(modeled_duration(-1.0), None);
        assert_eq!(modeled_duration(0.5), Some(Duration::from_millis(500)));
    }

    #[test]
    fn test_measured_kernels_run_for_every_class() {
        for &class in ComplexityClass::value_variants() {
            let sample = model(class, 16, CostMode::Measured).compute(1.0, 0).expect("measured");
            assert_eq!(sample.effective_size, 16);
        }
    }

    #[test]
    fn test_complexity_class_parsing_and_serde() {
        assert_eq!("very_high".parse::<ComplexityClass>(), Ok(ComplexityClass::VeryHigh));
        assert_eq!("Medium".parse::<ComplexityClass>(), Ok(ComplexityClass::Medium));
        assert!("extreme".parse::<ComplexityClass>().is_err());
        for variant in ComplexityClass::value_variants() {
            let serialized = serde_json::to_string(variant).expect("serialize");
            assert_eq!(serialized, format!("\"{variant}\""));
            let deserialized: ComplexityClass = serde_json::from_str(&serialized).expect("deserialize");
            assert_eq!(*variant, deserialized);
        }
    }

    #[test]
    fn test_parallel_and_sequential_return_table_order() {
        let specs = [
            WorkloadSpec::new("a", ComplexityClass::Low, 10),
            WorkloadSpec::new("b", ComplexityClass::High, 12),
            WorkloadSpec::new("c", ComplexityClass::Medium, 30),
        ];
        let build = |mode| {
            let models = specs
                .iter()
                .enumerate()
                .map(|(id, spec)| WorkloadModel::new(id, spec.clone(), OptimizerBounds::default(), modeled(10.0), 1))
                .collect();
            WorkloadSet::new(models, mode, 3).expect("set")
        };
        let factors = [1.0, 1.0, 0.5];
        let sequential = build(ExecutionMode::Sequential).compute_all(&factors, 0).expect("sequential");
        let parallel = build(ExecutionMode::Parallel).compute_all(&factors, 0).expect("parallel");
        assert_eq!(sequential, parallel);
        assert_eq!(
            sequential.iter().map(|s| s.effective_size).collect::<Vec<_>>(),
            vec![10, 12, 15]
        );
    }

    #[test]
    fn test_compute_all_rejects_wrong_arity() {
        let config = HarnessConfig { cost_mode: modeled(1.0), ..HarnessConfig::default() };
        let set = WorkloadSet::from_config(&config).expect("set");
        assert!(set.compute_all(&[1.0], 0).is_err());
    }

    #[test]
    fn test_memory_estimate_grows_with_load_factor() {
        let config = HarnessConfig { cost_mode: modeled(1.0), ..HarnessConfig::default() };
        let set = WorkloadSet::from_config(&config).expect("set");
        let small = set.estimated_memory_bytes(&vec![0.5; set.len()]).expect("small");
        let large = set.estimated_memory_bytes(&vec![1.5; set.len()]).expect("large");
        assert!(small < large);
    }

    proptest! {
        #[test]
        fn prop_modeled_time_is_monotonic_in_load_factor(
            class_index in 0usize..4,
            base in 1u32..200,
            a in 0.1f64..=2.0,
            b in 0.1f64..=2.0,
        ) {
            let class = ComplexityClass::value_variants()[class_index];
            let model = model(class, base, modeled(3.0));
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let t_lo = model.compute(lo, 0).unwrap().computation_time;
            let t_hi = model.compute(hi, 0).unwrap().computation_time;
            prop_assert!(t_lo <= t_hi);
        }

        #[test]
        fn prop_effective_size_is_at_least_one(base in 1u32..10_000, lf in 0.1f64..=2.0) {
            let n = effective_size(base, lf);
            prop_assert!(n >= 1);
            prop_assert_eq!(n, ((f64::from(base) * lf).round() as usize).max(1));
        }
    }
}
