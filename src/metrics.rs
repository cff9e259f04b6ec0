/* src/metrics.rs */
//! Metric handles reported as structured `tracing` events.
//!
//! Each `counter!`/`gauge!`/`histogram!` call site owns one static handle. Nothing is
//! aggregated in-process; a subscriber with a JSON layer turns the events into series.
/*▫~•◦────────────────────────────────────────────────────────────────────────────────────‣
 * © 2025 ArcMoon Studios ◦ SPDX-License-Identifier MIT OR Apache-2.0 ◦ Author: Lord Xyn ✶
 *///◦────────────────────────────────────────────────────────────────────────────────────‣

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, trace};

/// Monotonic count; every increment is logged with the running total of its call site.
#[derive(Debug)]
pub struct Counter {
    name: &'static str,
    total: AtomicU64,
}

impl Counter {
    /// Counter named `name`, starting at zero.
    pub const fn new(name: &'static str) -> Self {
        Self { name, total: AtomicU64::new(0) }
    }

    /// Add `delta` and log the new total.
    pub fn increment(&self, delta: u64) {
        let total = self.total.fetch_add(delta, Ordering::Relaxed) + delta;
        trace!(metric_type = "counter", metric_name = self.name, total, delta, "Counter incremented");
    }
}

/// Point-in-time value.
#[derive(Debug)]
pub struct Gauge {
    name: &'static str,
}

impl Gauge {
    /// Gauge named `name`.
    pub const fn new(name: &'static str) -> Self {
        Self { name }
    }

    /// Log the current value.
    pub fn set(&self, value: f64) {
        debug!(metric_type = "gauge", metric_name = self.name, value, "Gauge set");
    }
}

/// Distribution of observations.
#[derive(Debug)]
pub struct Histogram {
    name: &'static str,
}

impl Histogram {
    /// Histogram named `name`.
    pub const fn new(name: &'static str) -> Self {
        Self { name }
    }

    /// Log one observation.
    pub fn record(&self, value: f64) {
        debug!(metric_type = "histogram", metric_name = self.name, value, "Histogram observation");
    }
}

/// Static [`Counter`] for this call site.
macro_rules! counter {
    ($name:expr) => {{
        static COUNTER: $crate::metrics::Counter = $crate::metrics::Counter::new($name);
        &COUNTER
    }};
}

/// Static [`Gauge`] for this call site.
macro_rules! gauge {
    ($name:expr) => {{
        static GAUGE: $crate::metrics::Gauge = $crate::metrics::Gauge::new($name);
        &GAUGE
    }};
}

/// Static [`Histogram`] for this call site.
macro_rules! histogram {
    ($name:expr) => {{
        static HISTOGRAM: $crate::metrics::Histogram = $crate::metrics::Histogram::new($name);
        &HISTOGRAM
    }};
}

pub(crate) use counter;
pub(crate) use gauge;
pub(crate) use histogram;
