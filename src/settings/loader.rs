//! Configuration loading
//!
//! Handles loading configuration from embedded defaults, files, and environment.

use std::path::Path;

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};

use super::AppConfig;

/// Embedded default configuration (compiled into binary)
pub const DEFAULT_CONFIG: &str = include_str!("../../config/default.toml");

/// Load configuration.
///
/// Sources, lowest priority first: embedded defaults, then `path` if given
/// (required) or `config/local.toml` (optional), then `CADENCE_` environment
/// variables.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let builder = Config::builder()
        // 1. Embedded defaults (always available)
        .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml));

    // 2. File overrides
    let builder = match path {
        Some(path) => builder.add_source(File::from(path).required(true)),
        None => builder.add_source(File::with_name("config/local").required(false)),
    };

    // 3. Environment variables (highest priority)
    // CADENCE_SCHEDULER__POOL_SIZE=8 sets scheduler.pool_size.
    let config = builder
        .add_source(
            Environment::with_prefix("CADENCE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    config
        .try_deserialize()
        .context("Failed to deserialize configuration")
}
