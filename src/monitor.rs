/* src/monitor.rs */
//! # Resource monitoring
//!
//! [`ResourceMonitor`] brackets a measured block with a pair of [`ResourceSnapshot`]s
//! sharing one [`RunId`]. The closing sample is taken by a guard, so it is recorded on
//! every exit path of the block: normal return, an `Err` result, or unwinding.
//! An unreachable sampler never aborts the block; the snapshots are marked unavailable.
/*▫~•◦────────────────────────────────────────────────────────────────────────────────────‣
 * © 2025 ArcMoon Studios ◦ SPDX-License-Identifier MIT OR Apache-2.0 ◦ Author: Lord Xyn ✶
 *///◦────────────────────────────────────────────────────────────────────────────────────‣

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ResourceCeiling;
use crate::run_id::RunId;

/// Raw reading from a sampler.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    /// Global CPU usage in percent (0-100)
    pub cpu_usage: f64,
    /// Used memory in bytes
    pub memory_usage: u64,
    /// Available memory in bytes
    pub available_memory: u64,
    /// Total memory in bytes
    pub total_memory: u64,
}

/// Source of CPU and memory readings.
pub trait ResourceSampler: fmt::Debug + Send + Sync {
    /// Take a reading, or `None` if the underlying source cannot be reached.
    fn sample(&self) -> Option<RawSample>;
}

/// Sampler backed by `sysinfo`.
#[cfg(feature = "system-monitoring")]
pub struct SysinfoSampler {
    system: std::sync::Mutex<sysinfo::System>,
}

#[cfg(feature = "system-monitoring")]
impl fmt::Debug for SysinfoSampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SysinfoSampler").finish_non_exhaustive()
    }
}

#[cfg(feature = "system-monitoring")]
impl SysinfoSampler {
    /// Create the sampler and prime the CPU counters.
    pub fn new() -> Self {
        let mut system = sysinfo::System::new();
        system.refresh_cpu_usage();
        system.refresh_memory();
        Self { system: std::sync::Mutex::new(system) }
    }
}

#[cfg(feature = "system-monitoring")]
impl Default for SysinfoSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "system-monitoring")]
impl ResourceSampler for SysinfoSampler {
    fn sample(&self) -> Option<RawSample> {
        let mut system = self.system.lock().ok()?;
        system.refresh_cpu_usage();
        system.refresh_memory();
        let total_memory = system.total_memory();
        if total_memory == 0 {
            return None;
        }
        Some(RawSample {
            cpu_usage: f64::from(system.global_cpu_usage()),
            memory_usage: system.used_memory(),
            available_memory: system.available_memory(),
            total_memory,
        })
    }
}

/// Sampler that is never reachable.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableSampler;

impl ResourceSampler for UnavailableSampler {
    fn sample(&self) -> Option<RawSample> {
        None
    }
}

/// One CPU/memory reading tagged with its run identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    /// Run this snapshot belongs to
    pub run_id: RunId,
    /// Global CPU usage in percent
    pub cpu_usage: f64,
    /// Used memory in bytes
    pub memory_usage: u64,
    /// Available memory in bytes
    pub available_memory: u64,
    /// Total memory in bytes
    pub total_memory: u64,
    /// Wall clock time of the reading
    pub timestamp: DateTime<Utc>,
    /// False when the sampler could not be reached; numeric fields are then zero
    pub available: bool,
}

impl ResourceSnapshot {
    fn from_sample(run_id: RunId, sample: Option<RawSample>) -> Self {
        let timestamp = Utc::now();
        match sample {
            Some(raw) => Self {
                run_id,
                cpu_usage: raw.cpu_usage,
                memory_usage: raw.memory_usage,
                available_memory: raw.available_memory,
                total_memory: raw.total_memory,
                timestamp,
                available: true,
            },
            None => Self {
                run_id,
                cpu_usage: 0.0,
                memory_usage: 0,
                available_memory: 0,
                total_memory: 0,
                timestamp,
                available: false,
            },
        }
    }

    /// Used memory as a fraction of total memory.
    pub fn memory_fraction(&self) -> Option<f64> {
        (self.available && self.total_memory > 0).then(|| self.memory_usage as f64 / self.total_memory as f64)
    }
}

/// Before/after pair of a measured block with derived deltas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    /// Snapshot taken on entry
    pub before: ResourceSnapshot,
    /// Snapshot taken on exit
    pub after: ResourceSnapshot,
    /// CPU usage change in percent points, if both samples are available
    pub cpu_delta: Option<f64>,
    /// Used memory change in bytes, if both samples are available
    pub memory_delta: Option<i64>,
}

impl ResourceUsage {
    fn new(before: ResourceSnapshot, after: ResourceSnapshot) -> Self {
        let both = before.available && after.available;
        let cpu_delta = both.then(|| after.cpu_usage - before.cpu_usage);
        let memory_delta = both.then(|| after.memory_usage as i64 - before.memory_usage as i64);
        Self { before, after, cpu_delta, memory_delta }
    }

    /// Whether both samples were taken.
    pub fn available(&self) -> bool {
        self.cpu_delta.is_some()
    }

    /// Whether the deltas stay under the ceiling. Unavailable samples are not judged.
    pub fn within(&self, ceiling: &ResourceCeiling) -> bool {
        let cpu_ok = self.cpu_delta.map_or(true, |d| d <= ceiling.max_cpu_delta_percent);
        let memory_ok = self
            .memory_delta
            .map_or(true, |d| d <= i64::try_from(ceiling.max_memory_delta_bytes).unwrap_or(i64::MAX));
        cpu_ok && memory_ok
    }
}

/// Value produced by a monitored block together with its resource usage.
#[derive(Debug, Clone, PartialEq)]
pub struct Monitored<T> {
    /// Block output
    pub value: T,
    /// Snapshot pair and deltas
    pub usage: ResourceUsage,
}

/// Scoped CPU/memory sampling around measured blocks.
#[derive(Debug, Clone)]
pub struct ResourceMonitor {
    sampler: Arc<dyn ResourceSampler>,
}

impl ResourceMonitor {
    /// Monitor using an explicit sampler.
    pub fn new(sampler: Arc<dyn ResourceSampler>) -> Self {
        Self { sampler }
    }

    /// Monitor using the host sampler when system monitoring is compiled in.
    pub fn system() -> Self {
        #[cfg(feature = "system-monitoring")]
        {
            Self::new(Arc::new(SysinfoSampler::new()))
        }

        #[cfg(not(feature = "system-monitoring"))]
        {
            Self::new(Arc::new(UnavailableSampler))
        }
    }

    /// Take a single snapshot.
    pub fn snapshot(&self, run_id: RunId) -> ResourceSnapshot {
        let sample = self.sampler.sample();
        if sample.is_none() {
            debug!(%run_id, "Resource sampler unavailable");
        }
        ResourceSnapshot::from_sample(run_id, sample)
    }

    /// Sample on entry and return a guard that samples again when finished or dropped.
    pub fn begin(&self, run_id: RunId) -> ResourceGuard<'_> {
        let before = self.snapshot(run_id);
        ResourceGuard { monitor: self, run_id, before: Some(before) }
    }

    /// Run `block` between two snapshots.
    ///
    /// If `block` returns a `Result`, both the `Ok` and the `Err` path are bracketed.
    pub fn measure<T>(&self, run_id: RunId, block: impl FnOnce() -> T) -> Monitored<T> {
        let guard = self.begin(run_id);
        let value = block();
        let usage = guard.finish();
        Monitored { value, usage }
    }
}

/// Open measurement scope; the closing snapshot is taken exactly once.
#[derive(Debug)]
pub struct ResourceGuard<'a> {
    monitor: &'a ResourceMonitor,
    run_id: RunId,
    before: Option<ResourceSnapshot>,
}

impl ResourceGuard<'_> {
    /// Take the closing snapshot and return the pair.
    pub fn finish(mut self) -> ResourceUsage {
        self.close()
    }

    fn close(&mut self) -> ResourceUsage {
        let before = self
            .before
            .take()
            .unwrap_or_else(|| ResourceSnapshot::from_sample(self.run_id, None));
        let after = self.monitor.snapshot(self.run_id);
        ResourceUsage::new(before, after)
    }
}

impl Drop for ResourceGuard<'_> {
    fn drop(&mut self) {
        if self.before.is_some() {
            let usage = self.close();
            warn!(
                run_id = %self.run_id,
                cpu_delta = ?usage.cpu_delta,
                memory_delta = ?usage.memory_delta,
                "Measured block exited abnormally; closing resource sample recorded"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run_id::RunPhase;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Deterministic sampler whose memory grows by 1 KiB per reading.
    #[derive(Debug, Default)]
    struct CountingSampler {
        calls: AtomicUsize,
    }

    impl ResourceSampler for CountingSampler {
        fn sample(&self) -> Option<RawSample> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) as u64;
            Some(RawSample {
                cpu_usage: 10.0 + call as f64,
                memory_usage: 1_000_000 + call * 1024,
                available_memory: 8_000_000,
                total_memory: 16_000_000,
            })
        }
    }

    fn run_id() -> RunId {
        RunId::new(1, b"monitor-test").child(RunPhase::Baseline, 0)
    }

    #[test]
    fn test_measure_brackets_block_with_shared_run_id() {
        let sampler = Arc::new(CountingSampler::default());
        let monitor = ResourceMonitor::new(sampler.clone());
        let id = run_id();
        let monitored = monitor.measure(id, || 21 * 2);
        assert_eq!(monitored.value, 42);
        assert_eq!(sampler.calls.load(Ordering::SeqCst), 2);
        assert_eq!(monitored.usage.before.run_id, id);
        assert_eq!(monitored.usage.after.run_id, id);
        assert_eq!(monitored.usage.memory_delta, Some(1024));
        assert_eq!(monitored.usage.cpu_delta, Some(1.0));
        assert!(monitored.usage.within(&ResourceCeiling::default()));
    }

    #[test]
    fn test_error_result_is_still_bracketed() {
        let sampler = Arc::new(CountingSampler::default());
        let monitor = ResourceMonitor::new(sampler.clone());
        let monitored = monitor.measure(run_id(), || -> Result<(), String> { Err("boom".into()) });
        assert!(monitored.value.is_err());
        assert_eq!(sampler.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_panicking_block_still_takes_closing_sample() {
        let sampler = Arc::new(CountingSampler::default());
        let monitor = ResourceMonitor::new(sampler.clone());
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            monitor.measure(run_id(), || -> u32 { panic!("measured block failed") })
        }));
        assert!(outcome.is_err());
        assert_eq!(sampler.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unavailable_sampler_marks_snapshots() {
        let monitor = ResourceMonitor::new(Arc::new(UnavailableSampler));
        let monitored = monitor.measure(run_id(), || "still ran");
        assert_eq!(monitored.value, "still ran");
        assert!(!monitored.usage.before.available);
        assert!(!monitored.usage.after.available);
        assert!(!monitored.usage.available());
        assert!(monitored.usage.within(&ResourceCeiling::default()));
        assert_eq!(monitored.usage.before.memory_fraction(), None);
    }

    #[test]
    fn test_ceiling_violation_detected() {
        let monitor = ResourceMonitor::new(Arc::new(CountingSampler::default()));
        let usage = monitor.measure(run_id(), || ()).usage;
        let tight = ResourceCeiling { max_memory_delta_bytes: 512, ..ResourceCeiling::default() };
        assert!(!usage.within(&tight));
    }

    #[cfg(feature = "system-monitoring")]
    #[test]
    fn test_system_monitor_produces_snapshots() {
        let monitor = ResourceMonitor::system();
        let snapshot = monitor.snapshot(run_id());
        if snapshot.available {
            assert!(snapshot.total_memory > 0);
            assert!(snapshot.memory_fraction().is_some());
        }
    }
}
