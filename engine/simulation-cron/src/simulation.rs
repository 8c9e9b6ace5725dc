//! Simulation harness entry point

use std::sync::Arc;

use crate::config::SimulationConfig;
use crate::error::CronError;
use crate::scheduler::CronScheduler;
use crate::time::{SystemTimeSource, TimeSource};

/// Owns the mocked services enabled in a [`SimulationConfig`]
#[derive(Debug)]
pub struct Simulation {
    config: SimulationConfig,
    cron: Option<CronScheduler>,
    initialised: bool,
}

impl Simulation {
    pub fn new(config: SimulationConfig) -> Result<Self, CronError> {
        Self::with_time_source(config, Arc::new(SystemTimeSource))
    }

    /// Build the enabled services; an invalid initial ticker fails the whole simulation
    pub fn with_time_source(
        config: SimulationConfig,
        time: Arc<dyn TimeSource>,
    ) -> Result<Self, CronError> {
        let cron = if config.cron.enabled {
            Some(CronScheduler::new(config.cron.clone(), time)?)
        } else {
            None
        };

        Ok(Self { config, cron, initialised: false })
    }

    /// Start the enabled services
    pub fn init(&mut self) -> Result<(), CronError> {
        if self.initialised {
            return Err(CronError::AlreadyRunning);
        }

        if let Some(cron) = &self.cron {
            cron.start()?;
        }

        self.initialised = true;
        tracing::info!("Simulation: ready");
        Ok(())
    }

    /// Stop the enabled services
    pub fn shutdown(&mut self) {
        if let Some(cron) = &self.cron {
            cron.stop();
        }
        self.initialised = false;
    }

    pub fn cron(&self) -> Option<&CronScheduler> {
        self.cron.as_ref()
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn is_initialised(&self) -> bool {
        self.initialised
    }
}
