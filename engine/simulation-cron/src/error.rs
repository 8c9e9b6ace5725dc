//! Error types for the simulation cron

use thiserror::Error;

/// Errors that can occur in the cron scheduler
#[derive(Error, Debug)]
pub enum CronError {
    #[error("Invalid period {count}{unit}")]
    InvalidPeriod { count: i64, unit: String },

    #[error("Ticker {id} step of {step_ms}ms is not longer than heartbeat ({heartbeat_ms}ms)")]
    TickerTooFast { id: String, step_ms: u64, heartbeat_ms: u64 },

    #[error("Next boundary after timestamp {timestamp} is out of range")]
    TimestampOutOfRange { timestamp: i64 },

    #[error("Scheduler is already running")]
    AlreadyRunning,

    #[error("Heartbeat interval must be positive")]
    ZeroHeartbeat,

    #[error("Heartbeat interval of {heartbeat_ms}ms is out of range")]
    HeartbeatOutOfRange { heartbeat_ms: u64 },

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by listeners while an event is being emitted
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Listener for {event} failed: {source}")]
    ListenerFailed {
        event: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Listener for {event} panicked: {message}")]
    Panicked { event: String, message: String },
}

impl DispatchError {
    /// Name of the event whose listener failed
    pub fn event(&self) -> &str {
        match self {
            DispatchError::ListenerFailed { event, .. } | DispatchError::Panicked { event, .. } => {
                event
            }
        }
    }
}

impl CronError {
    /// True for errors that reject a ticker at registration time
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            CronError::InvalidPeriod { .. }
                | CronError::TickerTooFast { .. }
                | CronError::ZeroHeartbeat
                | CronError::HeartbeatOutOfRange { .. }
                | CronError::Config(_)
        )
    }
}
