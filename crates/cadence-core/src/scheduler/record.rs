//! Execution records
//!
//! One record per candidate run of a chain. A chain keeps only its latest
//! record, which is handed to the trigger to compute the next run.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// How a candidate run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// Task returned a value
    Success,
    /// Task returned an error or panicked
    Failed {
        /// Error message
        message: String,
    },
    /// Task was interrupted by cancellation
    Interrupted,
    /// The trigger skipped this run; the task was not invoked
    Skipped,
    /// No worker was available within the dispatch bound; the task was not
    /// invoked
    Rejected {
        /// Rejection reason
        message: String,
    },
}

/// Immutable snapshot of one candidate run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionRecord {
    task_name: String,
    iteration: u64,
    run_count: u64,
    scheduled_time: DateTime<Utc>,
    run_start: Option<DateTime<Utc>>,
    run_end: Option<DateTime<Utc>>,
    outcome: Outcome,
}

impl ExecutionRecord {
    /// Record of a run that invoked the task.
    ///
    /// `iteration` numbers every candidate of the chain (skips included),
    /// `run_count` counts task invocations up to and including this one.
    pub fn completed(
        task_name: impl Into<String>,
        iteration: u64,
        run_count: u64,
        scheduled_time: DateTime<Utc>,
        run_start: DateTime<Utc>,
        run_end: DateTime<Utc>,
        outcome: Outcome,
    ) -> Self {
        Self {
            task_name: task_name.into(),
            iteration,
            run_count,
            scheduled_time,
            run_start: Some(run_start),
            run_end: Some(run_end),
            outcome,
        }
    }

    /// Record of a candidate the trigger skipped. Carries no run timings.
    pub fn skipped(
        task_name: impl Into<String>,
        iteration: u64,
        run_count: u64,
        scheduled_time: DateTime<Utc>,
    ) -> Self {
        Self::not_run(task_name, iteration, run_count, scheduled_time, Outcome::Skipped)
    }

    /// Record of a candidate that never got a worker
    pub fn rejected(
        task_name: impl Into<String>,
        iteration: u64,
        run_count: u64,
        scheduled_time: DateTime<Utc>,
        message: impl Into<String>,
    ) -> Self {
        Self::not_run(
            task_name,
            iteration,
            run_count,
            scheduled_time,
            Outcome::Rejected {
                message: message.into(),
            },
        )
    }

    fn not_run(
        task_name: impl Into<String>,
        iteration: u64,
        run_count: u64,
        scheduled_time: DateTime<Utc>,
        outcome: Outcome,
    ) -> Self {
        Self {
            task_name: task_name.into(),
            iteration,
            run_count,
            scheduled_time,
            run_start: None,
            run_end: None,
            outcome,
        }
    }

    /// Name of the task this record belongs to
    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    /// 1-based candidate number within the chain
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// Task invocations so far, including this one
    pub fn run_count(&self) -> u64 {
        self.run_count
    }

    /// Instant the trigger asked for
    pub fn scheduled_time(&self) -> DateTime<Utc> {
        self.scheduled_time
    }

    /// Instant the task started, `None` if it was not invoked
    pub fn run_start(&self) -> Option<DateTime<Utc>> {
        self.run_start
    }

    /// Instant the task ended, `None` if it was not invoked
    pub fn run_end(&self) -> Option<DateTime<Utc>> {
        self.run_end
    }

    /// How the run ended
    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    /// Whether the trigger skipped this candidate
    pub fn is_skipped(&self) -> bool {
        self.outcome == Outcome::Skipped
    }

    /// Whether the task ran and succeeded
    pub fn succeeded(&self) -> bool {
        self.outcome == Outcome::Success
    }

    /// Whether the task ran and failed
    pub fn failed(&self) -> bool {
        matches!(self.outcome, Outcome::Failed { .. })
    }

    /// Time between start and end, for runs that invoked the task
    pub fn run_duration(&self) -> Option<Duration> {
        Some(self.run_end? - self.run_start?)
    }
}
