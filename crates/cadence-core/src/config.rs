//! Scheduler configuration
//!
//! Deserializable from the `[scheduler]` table of the application config,
//! with defaults for every field.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::scheduler::{Result, SchedulerError};

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Number of worker slots shared by all chains
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// How long a due iteration may wait for a free worker before it is
    /// reported as rejected
    #[serde(default = "default_dispatch_timeout_ms")]
    pub dispatch_timeout_ms: u64,
    /// Grace period for in-flight iterations during shutdown
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
    /// Log every iteration at info level
    #[serde(default = "default_true")]
    pub logging_enabled: bool,
}

fn default_pool_size() -> usize {
    5
}

fn default_dispatch_timeout_ms() -> u64 {
    30_000
}

fn default_shutdown_grace_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            dispatch_timeout_ms: default_dispatch_timeout_ms(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            logging_enabled: default_true(),
        }
    }
}

impl SchedulerConfig {
    /// Create a new configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the worker pool size
    #[must_use]
    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    /// Set the dispatch timeout
    #[must_use]
    pub fn with_dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.dispatch_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the shutdown grace period
    #[must_use]
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace_secs = grace.as_secs();
        self
    }

    /// Enable or disable per-iteration logging
    #[must_use]
    pub fn with_logging(mut self, enabled: bool) -> Self {
        self.logging_enabled = enabled;
        self
    }

    /// Dispatch timeout as a [`Duration`]
    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch_timeout_ms)
    }

    /// Shutdown grace period as a [`Duration`]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// Reject settings the scheduler cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(SchedulerError::InvalidConfig(
                "pool_size must be at least 1".to_string(),
            ));
        }
        if self.dispatch_timeout_ms == 0 {
            return Err(SchedulerError::InvalidConfig(
                "dispatch_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
