/* src/state.rs */
//! # Shared state vector
//!
//! The [`StateVectorEvolver`] exclusively owns the global state and advances it once
//! per cycle. The default update is an Euler-Maruyama step of phase-coupled
//! oscillators:
//!
//!   dθ_i = (ω_i + K·R·sin(ψ − θ_i))·dt + σ·√dt·η_i
//!
//! where `R·e^{iψ}` is the mean field of all phases. The physics is opaque to the
//! harness; only its cost and numeric health matter. Any other rule can be plugged in
//! through [`StateUpdate`].
/*▫~•◦────────────────────────────────────────────────────────────────────────────────────‣
 * © 2025 ArcMoon Studios ◦ SPDX-License-Identifier MIT OR Apache-2.0 ◦ Author: Lord Xyn ✶
 *///◦────────────────────────────────────────────────────────────────────────────────────‣

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{HarnessError, Result};

/// FNV-1a hash constants for deterministic seed derivation
const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x00000100000001B3;

/// A fast, non-cryptographic hash function (FNV-1a) for deterministic operations.
#[inline]
fn fnv1a_hash(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for &byte in bytes {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Derive an independent child seed from a base seed and a salt (trial index, workload id, ...).
pub fn derive_seed(base: u64, salt: u64) -> u64 {
    let mut bytes = [0u8; 16];
    bytes[..8].copy_from_slice(&base.to_le_bytes());
    bytes[8..].copy_from_slice(&salt.to_le_bytes());
    fnv1a_hash(&bytes)
}

/// Ordered sequence of reals with a fixed dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateVector(Vec<f64>);

impl StateVector {
    /// Wrap raw values.
    pub fn from_values(values: Vec<f64>) -> Self {
        Self(values)
    }

    /// Dimension D.
    pub fn dimension(&self) -> usize {
        self.0.len()
    }

    /// Read-only view.
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Index of the first non-finite component, if any.
    pub fn first_non_finite(&self) -> Option<usize> {
        self.0.iter().position(|v| !v.is_finite())
    }

    /// Mean-field coherence `R ∈ [0, 1]` of the components read as phases.
    pub fn order_parameter(&self) -> f64 {
        mean_field(&self.0).0
    }
}

/// `(R, ψ)` of the phase mean field.
fn mean_field(theta: &[f64]) -> (f64, f64) {
    if theta.is_empty() {
        return (0.0, 0.0);
    }
    let n = theta.len() as f64;
    let (sum_sin, sum_cos) = theta.iter().fold((0.0, 0.0), |(s, c), &th| (s + th.sin(), c + th.cos()));
    let (mean_sin, mean_cos) = (sum_sin / n, sum_cos / n);
    ((mean_sin.powi(2) + mean_cos.powi(2)).sqrt().clamp(0.0, 1.0), mean_sin.atan2(mean_cos))
}

/// One opaque update step applied to the state in place.
pub trait StateUpdate: fmt::Debug + Send + Sync {
    /// Advance `state` by one step. `step` is the index of the step being taken.
    fn apply(&self, state: &mut [f64], step: u64, rng: &mut StdRng);
}

/// Phase-coupled oscillator update (mean-field Kuramoto, Euler-Maruyama).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseCoupling {
    /// Integration step
    pub dt: f64,
    /// Global coupling strength K
    pub coupling: f64,
    /// Noise amplitude σ
    pub noise: f64,
}

impl Default for PhaseCoupling {
    fn default() -> Self {
        Self { dt: 0.01, coupling: 1.5, noise: 0.05 }
    }
}

impl StateUpdate for PhaseCoupling {
    fn apply(&self, state: &mut [f64], _step: u64, rng: &mut StdRng) {
        let (r, psi) = mean_field(state);
        let diffusion = self.noise * self.dt.sqrt();
        for (i, theta) in state.iter_mut().enumerate() {
            let omega = 1.0 + 0.1 * (i % 7) as f64;
            let drift = omega + self.coupling * r * (psi - *theta).sin();
            let eta: f64 = StandardNormal.sample(rng);
            let wrapped = (*theta + drift * self.dt + diffusion * eta).rem_euclid(std::f64::consts::TAU);
            // rem_euclid may round up to TAU for tiny negative inputs
            *theta = if wrapped >= std::f64::consts::TAU { 0.0 } else { wrapped };
        }
    }
}

/// Outcome of a successful evolution step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionStep {
    /// Index of the step just taken
    pub step: u64,
    /// State after the step
    pub snapshot: StateVector,
    /// Time spent in the update
    pub elapsed: Duration,
}

/// Owner of the shared global state.
#[derive(Debug)]
pub struct StateVectorEvolver {
    state: StateVector,
    initial: StateVector,
    seed: u64,
    step: u64,
    rng: StdRng,
    rule: Arc<dyn StateUpdate>,
}

impl StateVectorEvolver {
    /// Create an evolver with the default phase-coupling rule.
    pub fn new(dimension: usize, seed: u64) -> Result<Self> {
        Self::with_rule(dimension, seed, Arc::new(PhaseCoupling::default()))
    }

    /// Create an evolver with a custom update rule. The initial state depends only on `seed`.
    pub fn with_rule(dimension: usize, seed: u64, rule: Arc<dyn StateUpdate>) -> Result<Self> {
        if dimension == 0 {
            return Err(HarnessError::config("state vector dimension must be at least 1"));
        }
        let mut init_rng = StdRng::seed_from_u64(seed);
        let initial = StateVector(
            (0..dimension)
                .map(|_| init_rng.random::<f64>() * std::f64::consts::TAU)
                .collect(),
        );
        Ok(Self {
            state: initial.clone(),
            initial,
            seed,
            step: 0,
            rng: StdRng::seed_from_u64(derive_seed(seed, u64::MAX)),
            rule,
        })
    }

    /// An independent evolver starting from a fresh copy of this evolver's initial state,
    /// with its own noise stream seeded by `seed`.
    pub fn fork(&self, seed: u64) -> Self {
        Self {
            state: self.initial.clone(),
            initial: self.initial.clone(),
            seed,
            step: 0,
            rng: StdRng::seed_from_u64(seed),
            rule: Arc::clone(&self.rule),
        }
    }

    /// Restore the initial state and noise stream.
    pub fn reset(&mut self) {
        self.state = self.initial.clone();
        self.step = 0;
        self.rng = StdRng::seed_from_u64(derive_seed(self.seed, u64::MAX));
    }

    /// Current state.
    pub fn state(&self) -> &StateVector {
        &self.state
    }

    /// Number of update attempts so far.
    pub fn step(&self) -> u64 {
        self.step
    }

    /// Seed this evolver was created or forked with.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Seed for the workloads of the current step.
    pub fn cycle_seed(&self) -> u64 {
        derive_seed(self.seed, self.step)
    }

    /// Apply one update step.
    ///
    /// If the update produces non-finite values the state is rolled back to its previous
    /// value and [`HarnessError::NumericInstability`] is returned for this cycle.
    pub fn evolve(&mut self) -> Result<EvolutionStep> {
        self.step += 1;
        let step = self.step;
        let mut candidate = self.state.0.clone();

        let start = Instant::now();
        self.rule.apply(&mut candidate, step, &mut self.rng);
        let elapsed = start.elapsed();

        if let Some(index) = candidate.iter().position(|v| !v.is_finite()) {
            warn!(step, index, value = candidate[index], "Non-finite state update rolled back");
            return Err(HarnessError::NumericInstability {
                step,
                reason: format!("component {index} became {}", candidate[index]),
            });
        }

        self.state = StateVector(candidate);
        debug!(step, elapsed_us = elapsed.as_micros() as u64, "State evolved");
        Ok(EvolutionStep { step, snapshot: self.state.clone(), elapsed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Produces NaN on the configured steps.
    #[derive(Debug)]
    struct NanOnSteps(Vec<u64>);

    impl StateUpdate for NanOnSteps {
        fn apply(&self, state: &mut [f64], step: u64, _rng: &mut StdRng) {
            for value in state.iter_mut() {
                *value += 1.0;
            }
            if self.0.contains(&step) {
                state[0] = f64::NAN;
            }
        }
    }

    #[test]
    fn test_initial_state_is_seed_deterministic() {
        let a = StateVectorEvolver::new(16, 42).expect("evolver");
        let b = StateVectorEvolver::new(16, 42).expect("evolver");
        let c = StateVectorEvolver::new(16, 43).expect("evolver");
        assert_eq!(a.state(), b.state());
        assert_ne!(a.state(), c.state());
        assert_eq!(a.state().dimension(), 16);
    }

    #[test]
    fn test_evolution_is_reproducible() {
        let mut a = StateVectorEvolver::new(8, 7).expect("evolver");
        let mut b = StateVectorEvolver::new(8, 7).expect("evolver");
        for _ in 0..5 {
            assert_eq!(a.evolve().expect("a").snapshot, b.evolve().expect("b").snapshot);
        }
        assert_eq!(a.step(), 5);
    }

    #[test]
    fn test_zero_dimension_is_configuration_error() {
        assert!(matches!(StateVectorEvolver::new(0, 1), Err(HarnessError::Configuration(_))));
    }

    #[test]
    fn test_non_finite_update_rolls_back() {
        let mut evolver = StateVectorEvolver::with_rule(4, 1, Arc::new(NanOnSteps(vec![2]))).expect("evolver");
        let first = evolver.evolve().expect("step 1").snapshot;
        let err = evolver.evolve().expect_err("step 2 must fail");
        assert!(matches!(err, HarnessError::NumericInstability { step: 2, .. }));
        assert_eq!(evolver.state(), &first);
        assert!(evolver.state().first_non_finite().is_none());
        assert!(evolver.evolve().is_ok());
    }

    #[test]
    fn test_fork_starts_from_initial_state() {
        let mut evolver = StateVectorEvolver::new(8, 3).expect("evolver");
        let initial = evolver.state().clone();
        evolver.evolve().expect("evolve");
        let fork = evolver.fork(99);
        assert_eq!(fork.state(), &initial);
        assert_eq!(fork.step(), 0);
        assert_eq!(fork.seed(), 99);
        evolver.reset();
        assert_eq!(evolver.state(), &initial);
    }

    #[test]
    fn test_phase_coupling_keeps_phases_wrapped() {
        let mut evolver = StateVectorEvolver::new(32, 11).expect("evolver");
        for _ in 0..50 {
            let step = evolver.evolve().expect("evolve");
            assert!(step.snapshot.as_slice().iter().all(|&th| (0.0..std::f64::consts::TAU).contains(&th)));
        }
        let r = evolver.state().order_parameter();
        assert!((0.0..=1.0).contains(&r));
    }

    #[test]
    fn test_derive_seed_separates_salts() {
        assert_eq!(derive_seed(1, 2), derive_seed(1, 2));
        assert_ne!(derive_seed(1, 2), derive_seed(1, 3));
        assert_ne!(derive_seed(1, 2), derive_seed(2, 2));
    }
}
