/* src/assessor.rs */
//! Threshold rubric that turns measurements into a resolution verdict.
//!
//! [`ResolutionAssessor::assess`] is a pure function of its inputs: four pass/fail
//! criteria, a weighted mean score and a deterministic recommendation list. Failing
//! criteria are reported first in the fixed order frequency, efficiency, resources,
//! stability; advisory notes about non-fatal conditions follow.
/*▫~•◦────────────────────────────────────────────────────────────────────────────────────‣
 * © 2025 ArcMoon Studios ◦ SPDX-License-Identifier MIT OR Apache-2.0 ◦ Author: Lord Xyn ✶
 *///◦────────────────────────────────────────────────────────────────────────────────────‣

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::{HarnessConfig, Thresholds};
use crate::optimizer::OptimizationResult;
use crate::profiler::CycleMeasurement;
use crate::sustained::{StopReason, SustainedRunRecord};

/// Final verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionStatus {
    /// Score at or above the acceptance line and every criterion passes
    Acceptable,
    /// Anything else
    NeedsImprovement,
}

impl fmt::Display for ResolutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Acceptable => write!(f, "ACCEPTABLE"),
            Self::NeedsImprovement => write!(f, "NEEDS_IMPROVEMENT"),
        }
    }
}

/// Everything the rubric looks at, already reduced to plain values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentInputs {
    /// Sustained achieved frequency over target
    pub frequency_ratio: f64,
    /// Cycle efficiency (optimized when optimization succeeded, else baseline)
    pub efficiency: f64,
    /// Resource deltas stayed within the ceiling
    pub resources_within_ceiling: bool,
    /// `1 − CV(efficiency)` of the sustained run
    pub stability: f64,
    /// Non-convergence note from the optimizer
    pub optimization_note: Option<String>,
    /// Every sustained iteration had both resource samples
    pub resource_sampling_available: bool,
    /// Sustained cycles discarded for numeric instability
    pub discarded_cycles: u64,
    /// Sustained cycles over the computation budget
    pub over_budget_cycles: u64,
    /// Why the sustained run stopped early, if it did
    pub early_stop: Option<StopReason>,
    /// Completed sustained iterations
    pub iteration_count: u64,
}

impl AssessmentInputs {
    /// Reduce the phase results of a harness run.
    pub fn from_results(
        baseline: &CycleMeasurement,
        sustained: &SustainedRunRecord,
        optimization: &OptimizationResult,
    ) -> Self {
        let efficiency = if optimization.success { optimization.optimized.efficiency } else { baseline.efficiency };
        Self {
            frequency_ratio: sustained.frequency_ratio,
            efficiency,
            resources_within_ceiling: sustained.resource_stability.within_ceiling,
            stability: sustained.stability,
            optimization_note: optimization.reason.clone(),
            resource_sampling_available: sustained.resource_stability.samples_available == sustained.iteration_count,
            discarded_cycles: sustained.discarded_cycles,
            over_budget_cycles: sustained.over_budget_cycles,
            early_stop: sustained.partial.then_some(sustained.stop_reason),
            iteration_count: sustained.iteration_count,
        }
    }
}

/// Verdict with per-criterion results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionAssessment {
    /// `frequency_ratio ≥ min_frequency_ratio`
    pub frequency_achievement: bool,
    /// `efficiency ≥ min_efficiency`
    pub computational_efficiency: bool,
    /// Resource deltas within the ceiling
    pub resource_compliance: bool,
    /// `stability ≥ min_stability`
    pub stability_achievement: bool,
    /// Weighted mean of the criteria, in `[0, 1]`
    pub overall_resolution_score: f64,
    /// Verdict
    pub resolution_status: ResolutionStatus,
    /// Ordered, deterministic advice
    pub recommendations: Vec<String>,
}

impl ResolutionAssessment {
    /// Whether all four criteria pass.
    pub fn all_criteria_pass(&self) -> bool {
        self.frequency_achievement && self.computational_efficiency && self.resource_compliance && self.stability_achievement
    }
}

/// Applies [`Thresholds`] to [`AssessmentInputs`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolutionAssessor {
    thresholds: Thresholds,
    max_computation_time: f64,
}

impl ResolutionAssessor {
    /// Assessor for a rubric and per-cycle computation budget.
    pub fn new(thresholds: Thresholds, max_computation_time: f64) -> Self {
        Self { thresholds, max_computation_time }
    }

    /// Assessor matching a harness configuration.
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self::new(config.thresholds, config.max_computation_time)
    }

    /// Apply the rubric.
    pub fn assess(&self, inputs: &AssessmentInputs) -> ResolutionAssessment {
        let t = &self.thresholds;
        let frequency_achievement = inputs.frequency_ratio >= t.min_frequency_ratio;
        let computational_efficiency = inputs.efficiency >= t.min_efficiency;
        let resource_compliance = inputs.resources_within_ceiling;
        let stability_achievement = inputs.stability >= t.min_stability;

        let w = &t.weights;
        let passed = [
            (frequency_achievement, w.frequency),
            (computational_efficiency, w.efficiency),
            (resource_compliance, w.resources),
            (stability_achievement, w.stability),
        ];
        let total = w.total();
        let score = if total > 0.0 {
            passed.iter().filter(|(ok, _)| *ok).map(|(_, weight)| weight).sum::<f64>() / total
        } else {
            0.0
        };
        let overall_resolution_score = score.clamp(0.0, 1.0);

        let all_pass = passed.iter().all(|(ok, _)| *ok);
        let resolution_status = if all_pass && overall_resolution_score >= t.acceptable_score {
            ResolutionStatus::Acceptable
        } else {
            ResolutionStatus::NeedsImprovement
        };

        let mut recommendations = Vec::new();
        if !frequency_achievement {
            recommendations.push(format!(
                "Sustained frequency ratio {:.4} is below the required {:.2}; reduce per-cycle workload or enable parallel execution",
                inputs.frequency_ratio, t.min_frequency_ratio
            ));
        }
        if !computational_efficiency {
            recommendations.push(format!(
                "Computational efficiency {:.4} is below {:.2}; apply optimized load factors or lower workload complexity",
                inputs.efficiency, t.min_efficiency
            ));
        }
        if !resource_compliance {
            recommendations.push(
                "Resource usage exceeded the configured ceiling; lower load factors or raise the ceiling".to_string(),
            );
        }
        if !stability_achievement {
            recommendations.push(format!(
                "Efficiency stability {:.3} is below {:.2}; investigate timing variance across iterations",
                inputs.stability, t.min_stability
            ));
        }
        self.advisories(inputs, &mut recommendations);

        ResolutionAssessment {
            frequency_achievement,
            computational_efficiency,
            resource_compliance,
            stability_achievement,
            overall_resolution_score,
            resolution_status,
            recommendations,
        }
    }

    fn advisories(&self, inputs: &AssessmentInputs, out: &mut Vec<String>) {
        if let Some(note) = &inputs.optimization_note {
            out.push(format!("Load factor optimization did not converge: {note}"));
        }
        if !inputs.resource_sampling_available {
            out.push("Resource sampling was unavailable; resource compliance is unverified".to_string());
        }
        if inputs.discarded_cycles > 0 {
            out.push(format!("{} cycles were discarded for numeric instability", inputs.discarded_cycles));
        }
        if inputs.over_budget_cycles > 0 {
            out.push(format!(
                "{} cycles exceeded the per-cycle computation budget of {:.3}s",
                inputs.over_budget_cycles, self.max_computation_time
            ));
        }
        if let Some(reason) = inputs.early_stop {
            let why = match reason {
                StopReason::Deadline => "deadline",
                StopReason::Cancelled => "cancellation",
                StopReason::IterationCap => "iteration cap",
            };
            out.push(format!(
                "Sustained run stopped early by {why}; results cover {} iterations",
                inputs.iteration_count
            ));
        }
    }
}
