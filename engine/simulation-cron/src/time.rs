//! Time sources sampled by the scheduler

use std::fmt::Debug;
use std::sync::atomic::{AtomicI64, Ordering};

/// Milliseconds since the Unix epoch
pub type Timestamp = i64;

/// Source of "now" for registration and heartbeat evaluation
pub trait TimeSource: Debug + Send + Sync {
    fn now_ms(&self) -> Timestamp;
}

/// Host wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now_ms(&self) -> Timestamp {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Manually advanced clock for deterministic tests
#[derive(Debug, Default)]
pub struct ManualTimeSource {
    now: AtomicI64,
}

impl ManualTimeSource {
    pub fn new(start: Timestamp) -> Self {
        Self { now: AtomicI64::new(start) }
    }

    pub fn set(&self, now: Timestamp) {
        self.now.store(now, Ordering::SeqCst);
    }

    /// Advance by `delta_ms` and return the new time
    pub fn advance(&self, delta_ms: i64) -> Timestamp {
        self.now.fetch_add(delta_ms, Ordering::SeqCst) + delta_ms
    }
}

impl TimeSource for ManualTimeSource {
    fn now_ms(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}
