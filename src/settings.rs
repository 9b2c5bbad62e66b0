//! Application settings
//!
//! The `[scheduler]` table maps onto [`SchedulerConfig`]; `[[jobs]]` entries
//! declare what to run.

mod loader;

pub use loader::load_config;

use cadence_core::SchedulerConfig;
use serde::{Deserialize, Serialize};

use crate::jobs::JobConfig;

/// Top-level configuration of the `cadence` binary
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Scheduler tuning
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Declared jobs
    #[serde(default)]
    pub jobs: Vec<JobConfig>,
}
