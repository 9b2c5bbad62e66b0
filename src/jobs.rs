//! Declarative jobs
//!
//! A job is a named action under a [`TriggerSpec`]. Jobs come from the
//! `[[jobs]]` tables of the configuration and each one becomes a chain on
//! the scheduler.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use cadence_core::{
    ExecutionRecord, Outcome, ScheduledHandle, Scheduler, TaskInfo, TaskListener, TaskOptions,
    TriggerSpec,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// A configured job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfig {
    /// Job name, used in logs
    pub name: String,
    /// When the job runs
    pub trigger: TriggerSpec,
    /// What the job does
    pub action: JobAction,
}

/// What a job does on each run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobAction {
    /// Emit a log line
    Log {
        /// Message to log
        message: String,
    },
    /// Run a shell command; a non-zero exit fails the run
    Shell {
        /// Command line passed to `sh -c`
        command: String,
        /// Working directory
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cwd: Option<PathBuf>,
    },
}

impl JobConfig {
    /// Check the job without scheduling it
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("job name must not be empty");
        }
        self.trigger
            .validate()
            .with_context(|| format!("invalid trigger for job '{}'", self.name))?;
        if let JobAction::Shell { command, .. } = &self.action {
            if command.trim().is_empty() {
                bail!("job '{}' has an empty shell command", self.name);
            }
        }
        Ok(())
    }
}

impl JobAction {
    /// Perform one run, returning its output
    pub async fn run(&self, job: &str) -> Result<String> {
        match self {
            JobAction::Log { message } => {
                info!(job = %job, "{}", message);
                Ok(message.clone())
            }
            JobAction::Shell { command, cwd } => run_shell(job, command, cwd.as_deref()).await,
        }
    }
}

async fn run_shell(job: &str, command: &str, cwd: Option<&Path>) -> Result<String> {
    debug!(job = %job, command = %command, "Executing shell command");

    let mut cmd = tokio::process::Command::new("sh");
    cmd.arg("-c").arg(command).kill_on_drop(true);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let output = cmd
        .output()
        .await
        .with_context(|| format!("failed to start `{}`", command))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("Command failed: {}\nStderr: {}", output.status, stderr.trim());
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
}

/// Put every job on the scheduler
pub fn schedule_jobs(scheduler: &Scheduler, jobs: &[JobConfig]) -> Result<Vec<ScheduledHandle<String>>> {
    jobs.iter()
        .map(|job| {
            job.validate()?;
            let trigger = job.trigger.build()?;
            let action = Arc::new(job.action.clone());
            let name: Arc<str> = job.name.as_str().into();

            let task = move || {
                let action = Arc::clone(&action);
                let name = Arc::clone(&name);
                async move { action.run(&name).await }
            };
            let handle = scheduler
                .schedule_with(TaskOptions::named(&job.name), task, trigger)
                .with_context(|| format!("failed to schedule job '{}'", job.name))?;
            Ok(handle)
        })
        .collect()
}

/// Logs how each job run ended
#[derive(Debug, Default)]
pub struct JobLogListener;

impl TaskListener for JobLogListener {
    fn task_done(&self, task: &TaskInfo, record: &ExecutionRecord) {
        let elapsed_ms = record
            .run_duration()
            .map(|d| d.num_milliseconds())
            .unwrap_or_default();
        match record.outcome() {
            Outcome::Failed { message } => warn!(
                job = %task.name,
                run = record.run_count(),
                elapsed_ms,
                "Job run failed: {}",
                message
            ),
            Outcome::Interrupted => info!(job = %task.name, run = record.run_count(), "Job run interrupted"),
            _ => debug!(job = %task.name, run = record.run_count(), elapsed_ms, "Job run finished"),
        }
    }

    fn task_skipped(&self, task: &TaskInfo, record: &ExecutionRecord) {
        if let Outcome::Rejected { message } = record.outcome() {
            warn!(job = %task.name, iteration = record.iteration(), "Job run rejected: {}", message);
        }
    }

    fn chain_finished(&self, task: &TaskInfo) {
        info!(job = %task.name, "Job finished");
    }
}
