//! Scheduler error definitions and shared types

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Result type for scheduler operations
pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Scheduler error types
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// Invalid configuration or schedule parameters
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The scheduler no longer accepts work
    #[error("scheduler is shutting down")]
    ShuttingDown,
    /// No worker became available within the dispatch bound
    #[error("worker pool saturated: no worker free after {waited_ms}ms")]
    ResourceExhausted {
        /// How long the dispatch waited
        waited_ms: u64,
    },
}

/// Error raised by a trigger's own policy code.
///
/// Fatal to the chain that owns the trigger.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("trigger error: {message}")]
pub struct TriggerError {
    message: String,
}

impl TriggerError {
    /// Create a trigger error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Error message
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Why an iteration (or the whole chain) did not produce a value
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExecutionError {
    /// The task body returned an error or panicked
    #[error("task failed: {0}")]
    TaskFailed(Arc<anyhow::Error>),
    /// The chain was cancelled before the iteration resolved
    #[error("execution cancelled")]
    Cancelled,
    /// The trigger failed; the chain is terminated
    #[error(transparent)]
    Trigger(#[from] TriggerError),
    /// The chain ended without ever executing the task
    #[error("chain finished without executing")]
    NoExecution,
    /// The iteration could not get a worker in time
    #[error("worker pool saturated: no worker free after {waited_ms}ms")]
    ResourceExhausted {
        /// How long the dispatch waited
        waited_ms: u64,
    },
    /// `get_timeout` elapsed first
    #[error("timed out waiting for execution result")]
    Timeout,
}

impl ExecutionError {
    /// Wrap a task body error
    pub fn task_failed(error: anyhow::Error) -> Self {
        Self::TaskFailed(Arc::new(error))
    }

    /// Whether this is a cancellation rather than a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Lifecycle state of a chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainState {
    /// First run not yet fired
    Pending,
    /// An iteration is executing
    Running,
    /// Between iterations, alarm armed
    AwaitingNext,
    /// Cancellation accepted, chain unwinding
    Cancelling,
    /// No further iteration will occur
    Terminated,
}

impl std::fmt::Display for ChainState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ChainState::Pending => "pending",
            ChainState::Running => "running",
            ChainState::AwaitingNext => "awaiting_next",
            ChainState::Cancelling => "cancelling",
            ChainState::Terminated => "terminated",
        };
        write!(f, "{s}")
    }
}

/// Identity of a scheduled chain, as seen by listeners
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInfo {
    /// Chain ID
    pub id: Uuid,
    /// Human-readable task name
    pub name: Arc<str>,
}
