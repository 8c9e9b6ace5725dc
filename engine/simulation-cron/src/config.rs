//! Configuration for the simulation cron

use crate::error::CronError;
use crate::registry::TickerSpec;
use crate::DEFAULT_HEARTBEAT_INTERVAL_MS;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration for the cron scheduler
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CronConfig {
    /// Whether the simulation starts the scheduler
    pub enabled: bool,

    /// Heartbeat interval in milliseconds (default: 1000ms)
    pub heartbeat_interval_ms: u64,

    /// What to do with boundaries that fell behind the catch-up window
    pub stale_boundary: StaleBoundary,

    /// Tickers registered at construction
    pub tickers: Vec<TickerSpec>,
}

/// Handling of a boundary older than one heartbeat interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StaleBoundary {
    /// Leave the ticker untouched; it will not fire again
    Hold,
    /// Advance to the first boundary inside or after the window without emitting
    Realign,
}

/// Top-level simulation configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub cron: CronConfig,
}

impl Default for CronConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
            stale_boundary: StaleBoundary::Hold,
            tickers: Vec::new(),
        }
    }
}

impl CronConfig {
    /// Get heartbeat interval as Duration
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn with_ticker(mut self, ticker: TickerSpec) -> Self {
        self.tickers.push(ticker);
        self
    }

    /// Load configuration from TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CronError> {
        read_toml(path.as_ref())
    }

    /// Save configuration to TOML file
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<(), CronError> {
        write_toml(self, path.as_ref())
    }
}

impl SimulationConfig {
    /// Load configuration from TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CronError> {
        read_toml(path.as_ref())
    }

    /// Save configuration to TOML file
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<(), CronError> {
        write_toml(self, path.as_ref())
    }
}

fn read_toml<T: DeserializeOwned>(path: &Path) -> Result<T, CronError> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| CronError::Config(format!("Failed to parse {}: {e}", path.display())))
}

fn write_toml<T: Serialize>(value: &T, path: &Path) -> Result<(), CronError> {
    let content = toml::to_string_pretty(value)
        .map_err(|e| CronError::Config(format!("Failed to serialize config: {e}")))?;
    std::fs::write(path, content)?;
    Ok(())
}
