//! Metrics collection for the cron scheduler

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Metrics collected by the scheduler
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CronMetrics {
    /// Number of heartbeat passes evaluated
    pub passes_evaluated: u64,

    /// Number of passes skipped because another pass was still running
    pub passes_skipped: u64,

    /// Duration of the last pass in nanoseconds
    pub last_pass_duration_ns: u64,

    /// Maximum pass duration in nanoseconds
    pub max_pass_duration_ns: u64,

    /// Number of registered tickers
    pub active_tickers: u64,

    /// Total emissions delivered
    pub total_emissions: u64,

    /// Total listener failures during emission
    pub total_dispatch_failures: u64,

    /// Total failures computing a next boundary
    pub total_schedule_failures: u64,

    /// Tickers removed after reaching their emit limit
    pub tickers_exhausted: u64,

    /// Boundaries skipped because they fell behind the catch-up window
    pub stale_boundaries_skipped: u64,

    /// Seconds since the collector was created
    pub uptime_seconds: u64,
}

/// Lock-free metrics collector
pub struct MetricsCollector {
    passes_evaluated: AtomicU64,
    passes_skipped: AtomicU64,
    last_pass_duration: AtomicU64,
    max_pass_duration: AtomicU64,
    active_tickers: AtomicU64,
    total_emissions: AtomicU64,
    total_dispatch_failures: AtomicU64,
    total_schedule_failures: AtomicU64,
    tickers_exhausted: AtomicU64,
    stale_boundaries_skipped: AtomicU64,
    start_time: Instant,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            passes_evaluated: AtomicU64::new(0),
            passes_skipped: AtomicU64::new(0),
            last_pass_duration: AtomicU64::new(0),
            max_pass_duration: AtomicU64::new(0),
            active_tickers: AtomicU64::new(0),
            total_emissions: AtomicU64::new(0),
            total_dispatch_failures: AtomicU64::new(0),
            total_schedule_failures: AtomicU64::new(0),
            tickers_exhausted: AtomicU64::new(0),
            stale_boundaries_skipped: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a completed pass
    pub fn record_pass(&self, duration: Duration) {
        let duration_ns = duration.as_nanos() as u64;

        self.passes_evaluated.fetch_add(1, Ordering::Relaxed);
        self.last_pass_duration.store(duration_ns, Ordering::Relaxed);
        self.max_pass_duration.fetch_max(duration_ns, Ordering::Relaxed);
    }

    pub fn record_skipped_pass(&self) {
        self.passes_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_emission(&self) {
        self.total_emissions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatch_failure(&self) {
        self.total_dispatch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_schedule_failure(&self) {
        self.total_schedule_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_exhausted(&self) {
        self.tickers_exhausted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stale_skipped(&self, count: u64) {
        self.stale_boundaries_skipped.fetch_add(count, Ordering::Relaxed);
    }

    pub fn update_active_tickers(&self, count: usize) {
        self.active_tickers.store(count as u64, Ordering::Relaxed);
    }

    /// Get current metrics
    pub fn get_metrics(&self) -> CronMetrics {
        CronMetrics {
            passes_evaluated: self.passes_evaluated.load(Ordering::Relaxed),
            passes_skipped: self.passes_skipped.load(Ordering::Relaxed),
            last_pass_duration_ns: self.last_pass_duration.load(Ordering::Relaxed),
            max_pass_duration_ns: self.max_pass_duration.load(Ordering::Relaxed),
            active_tickers: self.active_tickers.load(Ordering::Relaxed),
            total_emissions: self.total_emissions.load(Ordering::Relaxed),
            total_dispatch_failures: self.total_dispatch_failures.load(Ordering::Relaxed),
            total_schedule_failures: self.total_schedule_failures.load(Ordering::Relaxed),
            tickers_exhausted: self.tickers_exhausted.load(Ordering::Relaxed),
            stale_boundaries_skipped: self.stale_boundaries_skipped.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Reset all counters
    pub fn reset(&self) {
        for counter in [
            &self.passes_evaluated,
            &self.passes_skipped,
            &self.last_pass_duration,
            &self.max_pass_duration,
            &self.total_emissions,
            &self.total_dispatch_failures,
            &self.total_schedule_failures,
            &self.tickers_exhausted,
            &self.stale_boundaries_skipped,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
