/* src/run_id.rs */
//! # Run identity
//!
//! Every measured block is bracketed by a pair of resource snapshots, and both
//! snapshots carry the same [`RunId`]. A run id is content addressed: it hashes the
//! harness seed, a configuration fingerprint and the creation time with BLAKE3,
//! so two runs of the same configuration still receive distinct identities while a
//! phase id can always be traced back to its root run.
//!
//! ```text
//! RUN-{phase}::{seed:016X}::{digest}
//!
//! Example:
//! RUN-SUS::000000000000002A::9F2C61D04B7E13A8
//! ```
/*▫~•◦────────────────────────────────────────────────────────────────────────────────────‣
 * © 2025 ArcMoon Studios ◦ SPDX-License-Identifier MIT OR Apache-2.0 ◦ Author: Lord Xyn ✶
 *///◦────────────────────────────────────────────────────────────────────────────────────‣

use std::fmt;
use std::str::FromStr;

use blake3::Hasher;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Errors raised while parsing a textual run id.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RunIdError {
    /// Wrong number of `::` separated components.
    #[error("Invalid run id format: expected {expected} components, found {found} in '{input}'")]
    InvalidFormat {
        /// Expected component count
        expected: usize,
        /// Actual component count
        found: usize,
        /// Offending input
        input: String,
    },
    /// The leading `RUN-` prefix is missing.
    #[error("Missing RUN- prefix: {0}")]
    MissingPrefix(String),
    /// Unknown phase tag.
    #[error("Unknown run phase: {0}")]
    InvalidPhase(String),
    /// Seed or digest is not valid hexadecimal.
    #[error("Invalid hex component: {0}")]
    InvalidHex(String),
}

/// Phase of the harness a measured block belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunPhase {
    /// Whole harness invocation
    Harness,
    /// Single baseline cycle
    Baseline,
    /// Sustained multi-iteration trial
    Sustained,
    /// Optimizer trial cycle
    Trial,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunPhase::Harness => write!(f, "HAR"),
            RunPhase::Baseline => write!(f, "BAS"),
            RunPhase::Sustained => write!(f, "SUS"),
            RunPhase::Trial => write!(f, "TRL"),
        }
    }
}

impl FromStr for RunPhase {
    type Err = RunIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HAR" => Ok(RunPhase::Harness),
            "BAS" => Ok(RunPhase::Baseline),
            "SUS" => Ok(RunPhase::Sustained),
            "TRL" => Ok(RunPhase::Trial),
            _ => Err(RunIdError::InvalidPhase(s.to_string())),
        }
    }
}

/// Identity shared by every snapshot pair taken within one measured run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunId {
    phase: RunPhase,
    seed: u64,
    digest: u64,
}

impl RunId {
    /// Create a root run id from the harness seed and a configuration fingerprint.
    pub fn new(seed: u64, fingerprint: &[u8]) -> Self {
        Self::at(seed, fingerprint, Utc::now())
    }

    /// Deterministic constructor with an explicit creation time.
    pub fn at(seed: u64, fingerprint: &[u8], created: DateTime<Utc>) -> Self {
        let mut hasher = Hasher::new();
        hasher.update(&seed.to_le_bytes());
        hasher.update(fingerprint);
        hasher.update(&created.timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
        Self { phase: RunPhase::Harness, seed, digest: fold_digest(hasher.finalize().as_bytes()) }
    }

    /// Derive the id of a phase (and optional index, e.g. a trial number) under this run.
    pub fn child(&self, phase: RunPhase, index: u64) -> Self {
        let mut hasher = Hasher::new();
        hasher.update(&self.digest.to_le_bytes());
        hasher.update(phase.to_string().as_bytes());
        hasher.update(&index.to_le_bytes());
        Self { phase, seed: self.seed, digest: fold_digest(hasher.finalize().as_bytes()) }
    }

    /// Phase this id was issued for.
    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Harness seed the run descends from.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Parse a run id from its string representation.
    pub fn parse(input: &str) -> Result<Self, RunIdError> {
        let components: Vec<&str> = input.split("::").collect();
        if components.len() != 3 {
            return Err(RunIdError::InvalidFormat {
                expected: 3,
                found: components.len(),
                input: input.to_string(),
            });
        }

        let phase_part = components[0]
            .strip_prefix("RUN-")
            .ok_or_else(|| RunIdError::MissingPrefix(input.to_string()))?;
        let phase = RunPhase::from_str(phase_part)?;
        let seed = u64::from_str_radix(components[1], 16)
            .map_err(|_| RunIdError::InvalidHex(components[1].to_string()))?;
        let digest = u64::from_str_radix(components[2], 16)
            .map_err(|_| RunIdError::InvalidHex(components[2].to_string()))?;

        Ok(Self { phase, seed, digest })
    }
}

fn fold_digest(bytes: &[u8; 32]) -> u64 {
    bytes[0..8].iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RUN-{}::{:016X}::{:016X}", self.phase, self.seed, self.digest)
    }
}

impl FromStr for RunId {
    type Err = RunIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RunId::parse(s)
    }
}

impl Serialize for RunId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RunId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        RunId::parse(&text).map_err(serde::de::Error::custom)
    }
}
