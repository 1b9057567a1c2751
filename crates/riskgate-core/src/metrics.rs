//! Process-wide run counters.
//!
//! Counters are bumped at the call site and emitted together by
//! [`Metrics::flush`] (once per CLI invocation or batch).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Atomic counters; no allocation, no locking.
pub struct Metrics {
    runs_started: AtomicU64,
    runs_failed: AtomicU64,
    deployments_executed: AtomicU64,
    gate_rejections: AtomicU64,
    assessment_failures: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            runs_started: AtomicU64::new(0),
            runs_failed: AtomicU64::new(0),
            deployments_executed: AtomicU64::new(0),
            gate_rejections: AtomicU64::new(0),
            assessment_failures: AtomicU64::new(0),
        }
    }

    pub fn inc_runs_started(&self) {
        self.runs_started.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "runs_started", "counter incremented");
    }

    /// A run that finished with `success = false`.
    pub fn inc_runs_failed(&self) {
        self.runs_failed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "runs_failed", "counter incremented");
    }

    pub fn inc_deployments(&self) {
        self.deployments_executed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "deployments_executed", "counter incremented");
    }

    pub fn inc_gate_rejections(&self) {
        self.gate_rejections.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "gate_rejections", "counter incremented");
    }

    pub fn inc_assessment_failures(&self) {
        self.assessment_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "assessment_failures", "counter incremented");
    }

    /// Emit all counters as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            runs_started = self.runs_started(),
            runs_failed = self.runs_failed(),
            deployments_executed = self.deployments_executed(),
            gate_rejections = self.gate_rejections(),
            assessment_failures = self.assessment_failures(),
        );
    }

    pub fn runs_started(&self) -> u64 {
        self.runs_started.load(Ordering::Relaxed)
    }

    pub fn runs_failed(&self) -> u64 {
        self.runs_failed.load(Ordering::Relaxed)
    }

    pub fn deployments_executed(&self) -> u64 {
        self.deployments_executed.load(Ordering::Relaxed)
    }

    pub fn gate_rejections(&self) -> u64 {
        self.gate_rejections.load(Ordering::Relaxed)
    }

    pub fn assessment_failures(&self) -> u64 {
        self.assessment_failures.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.runs_started.store(0, Ordering::Relaxed);
        self.runs_failed.store(0, Ordering::Relaxed);
        self.deployments_executed.store(0, Ordering::Relaxed);
        self.gate_rejections.store(0, Ordering::Relaxed);
        self.assessment_failures.store(0, Ordering::Relaxed);
    }
}
