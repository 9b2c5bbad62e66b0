//! `cadence run`

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use cadence_core::{wait_for_shutdown_signal, Scheduler};
use futures::future::join_all;
use tracing::{info, warn};

use crate::jobs::{schedule_jobs, JobLogListener};
use crate::settings::load_config;

pub async fn run(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;

    let scheduler = Scheduler::builder()
        .config(config.scheduler.clone())
        .listener(Arc::new(JobLogListener))
        .build()
        .context("Invalid scheduler configuration")?;

    if config.jobs.is_empty() {
        warn!("No jobs configured. Add [[jobs]] tables to config/local.toml.");
        return Ok(());
    }

    let handles = schedule_jobs(&scheduler, &config.jobs)?;
    info!(
        jobs = handles.len(),
        pool_size = config.scheduler.pool_size,
        "Scheduler running"
    );

    tokio::select! {
        _ = wait_for_shutdown_signal() => info!("Shutdown signal received"),
        _ = join_all(handles.iter().map(|handle| handle.wait_done())) => info!("All jobs finished"),
    }

    let grace = config.scheduler.shutdown_grace();
    if !scheduler.shutdown(grace).await {
        warn!(grace_secs = grace.as_secs(), "Jobs still running after grace period were interrupted");
    }

    for handle in &handles {
        let outcome = handle.last_record().map(|record| record.outcome().clone());
        info!(
            job = handle.name(),
            runs = handle.executions(),
            cancelled = handle.is_cancelled(),
            last_outcome = ?outcome,
            "Job summary"
        );
    }

    info!("Cadence stopped");
    Ok(())
}
