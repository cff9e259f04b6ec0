/* src/error.rs */
//! Error taxonomy for the cadence harness.
//!
//! Only [`HarnessError::Configuration`] and [`HarnessError::FatalInstability`] abort a run.
//! Everything else is observed, recorded on the relevant result and surfaced as a
//! recommendation in the final assessment.
/*▫~•◦────────────────────────────────────────────────────────────────────────────────────‣
 * © 2025 ArcMoon Studios ◦ SPDX-License-Identifier MIT OR Apache-2.0 ◦ Author: Lord Xyn ✶
 *///◦────────────────────────────────────────────────────────────────────────────────────‣

use thiserror::Error;

/// Unified error type for the cadence harness, providing structured, contextual error information.
#[derive(Error, Debug)]
pub enum HarnessError {
    /// Invalid dimension, bounds, thresholds or target frequency. Raised before any run starts.
    #[error("Configuration Error: {0}")]
    Configuration(String),

    /// A load factor outside the configured optimizer bounds was requested.
    #[error("Invalid load factor {load_factor} for workload '{workload}' (allowed [{min}, {max}])")]
    InvalidLoadFactor {
        /// Workload name
        workload: String,
        /// The rejected load factor
        load_factor: f64,
        /// Lower bound
        min: f64,
        /// Upper bound
        max: f64,
    },

    /// A state update produced non-finite values. The cycle is discarded and the state rolled back.
    #[error("Numeric instability at step {step}: {reason}")]
    NumericInstability {
        /// Evolution step that failed
        step: u64,
        /// Description of the offending values
        reason: String,
    },

    /// Consecutive numeric instabilities exceeded the configured threshold.
    #[error("Fatal instability: {consecutive} consecutive unstable cycles (threshold {threshold})")]
    FatalInstability {
        /// Number of consecutive unstable cycles observed
        consecutive: u32,
        /// Configured tolerance
        threshold: u32,
    },

    /// The run was cancelled before any valid measurement could be produced.
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// An error related to system I/O.
    #[error("I/O Error: {0}")]
    Io(#[from] std::io::Error),

    /// An error related to serialization/deserialization operations.
    #[error("Serialization Error: {message}")]
    Serialization {
        /// Description of the serialization failure
        message: String,
    },
}

impl HarnessError {
    /// Whether this error must propagate to the caller as a hard failure.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            HarnessError::Configuration(_) | HarnessError::FatalInstability { .. }
        )
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        HarnessError::Configuration(message.into())
    }
}

impl From<serde_json::Error> for HarnessError {
    #[inline]
    fn from(error: serde_json::Error) -> Self {
        HarnessError::Serialization { message: error.to_string() }
    }
}

impl From<serde_yaml::Error> for HarnessError {
    #[inline]
    fn from(error: serde_yaml::Error) -> Self {
        HarnessError::Serialization { message: error.to_string() }
    }
}

/// A specialized `Result` type for harness operations.
pub type Result<T> = std::result::Result<T, HarnessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_configuration_and_fatal_instability_are_fatal() {
        assert!(HarnessError::config("bad dimension").is_fatal());
        assert!(HarnessError::FatalInstability { consecutive: 4, threshold: 3 }.is_fatal());
        assert!(!HarnessError::NumericInstability { step: 1, reason: "nan".into() }.is_fatal());
        assert!(!HarnessError::Cancelled("deadline".into()).is_fatal());
        assert!(!HarnessError::InvalidLoadFactor {
            workload: "w".into(),
            load_factor: 3.0,
            min: 0.1,
            max: 2.0,
        }
        .is_fatal());
    }

    #[test]
    fn test_error_display_carries_context() {
        let err = HarnessError::InvalidLoadFactor {
            workload: "spectral_solver".into(),
            load_factor: 2.5,
            min: 0.1,
            max: 2.0,
        };
        let text = err.to_string();
        assert!(text.contains("spectral_solver"));
        assert!(text.contains("2.5"));
    }
}
