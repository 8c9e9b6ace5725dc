//! # SimulationCron
//!
//! Heartbeat-driven ticker scheduler used by the simulation harness to mock time-based events.
//!
//! Callers register named tickers, each with a fixed or calendar period, an optional emit limit
//! and a listener. A single heartbeat timer evaluates every ticker on each firing and emits the
//! ones whose boundary fell inside the last heartbeat interval.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod metrics;
pub mod period;
pub mod registry;
pub mod scheduler;
pub mod simulation;
pub mod time;



pub use config::{CronConfig, SimulationConfig, StaleBoundary};
pub use dispatcher::{EventDispatcher, Listener};
pub use error::{CronError, DispatchError};
pub use metrics::CronMetrics;
pub use period::{CalendarUnit, PeriodUnit, Step};
pub use registry::{TickerRegistry, TickerSpec, TickerState};
pub use scheduler::{CronScheduler, PassReport, TickerFailure};
pub use simulation::Simulation;
pub use time::{ManualTimeSource, SystemTimeSource, TimeSource, Timestamp};

/// Current version of the simulation cron
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default heartbeat interval (1s)
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 1000;
