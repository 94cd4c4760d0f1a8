//! Manager Configuration
//!
//! The surrounding program parses its own configuration files; this is the
//! subset a real-time execution manager needs, in the shape it is usually
//! stored in.
//!
//! ```json
//! { "control_loop_period": 0.002, "thread_priority": 80 }
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Highest priority accepted for the clock thread.
pub const MAX_THREAD_PRIORITY: u8 = 99;

/// Settings for a [`RealTimeExecutionManager`](super::RealTimeExecutionManager).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Tick period in seconds.
    pub control_loop_period: f64,

    /// OS priority of the clock thread, 0 to leave it unchanged.
    #[serde(default)]
    pub thread_priority: u8,
}

impl ManagerConfig {
    /// Parse and validate a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.control_loop_period.is_finite() || self.control_loop_period <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "control_loop_period must be a positive number of seconds, got {}",
                self.control_loop_period
            )));
        }
        if self.thread_priority > MAX_THREAD_PRIORITY {
            return Err(Error::InvalidConfig(format!(
                "thread_priority must be at most {}, got {}",
                MAX_THREAD_PRIORITY, self.thread_priority
            )));
        }
        Ok(())
    }

    /// The tick period.
    pub fn period(&self) -> Result<Duration> {
        self.validate()?;
        Duration::try_from_secs_f64(self.control_loop_period)
            .map_err(|err| Error::InvalidConfig(err.to_string()))
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            control_loop_period: 0.002,
            thread_priority: 0,
        }
    }
}
