//! `cadence validate`

use std::path::Path;

use anyhow::{bail, Result};
use cadence_core::TriggerSpec;

use crate::jobs::JobAction;
use crate::settings::load_config;

pub fn run(config_path: Option<&Path>) -> Result<()> {
    println!("🔎 Cadence configuration check\n");

    let config = load_config(config_path)?;

    print!("Checking scheduler settings... ");
    match config.scheduler.validate() {
        Ok(()) => println!(
            "✅ pool_size={}, dispatch_timeout={}ms, shutdown_grace={}s",
            config.scheduler.pool_size,
            config.scheduler.dispatch_timeout_ms,
            config.scheduler.shutdown_grace_secs
        ),
        Err(e) => {
            println!("❌ {}", e);
            bail!("scheduler settings are invalid");
        }
    }

    let mut failures = 0;
    for job in &config.jobs {
        print!("Checking job '{}'... ", job.name);
        match job.validate() {
            Ok(()) => println!("✅ {} / {}", describe_trigger(&job.trigger), describe_action(&job.action)),
            Err(e) => {
                println!("❌ {:#}", e);
                failures += 1;
            }
        }
    }

    println!();
    if failures > 0 {
        bail!("{} of {} job(s) are invalid", failures, config.jobs.len());
    }
    println!("✅ Configuration OK: {} job(s)", config.jobs.len());
    Ok(())
}

fn describe_trigger(trigger: &TriggerSpec) -> String {
    let limit = |max_runs: Option<u64>| match max_runs {
        Some(max) => format!(", at most {} run(s)", max),
        None => String::new(),
    };
    match trigger {
        TriggerSpec::Once { delay_ms } => format!("once after {}ms", delay_ms),
        TriggerSpec::FixedRate {
            initial_delay_ms,
            period_ms,
            max_runs,
        } => format!(
            "every {}ms from {}ms{}",
            period_ms,
            initial_delay_ms,
            limit(*max_runs)
        ),
        TriggerSpec::FixedDelay {
            initial_delay_ms,
            delay_ms,
            max_runs,
        } => format!(
            "{}ms after each run from {}ms{}",
            delay_ms,
            initial_delay_ms,
            limit(*max_runs)
        ),
    }
}

fn describe_action(action: &JobAction) -> String {
    match action {
        JobAction::Log { .. } => "log".to_string(),
        JobAction::Shell { command, .. } => format!("sh -c {:?}", command),
    }
}
