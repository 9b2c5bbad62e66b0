//! Task lifecycle listener
//!
//! Optional observer notified as a chain moves through its runs. Callbacks
//! run on the chain's driver, so they must be quick; a panicking listener is
//! logged and otherwise ignored.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;

use super::record::ExecutionRecord;
use super::types::TaskInfo;

/// Observer of a chain's lifecycle. Every method defaults to a no-op.
#[cfg_attr(test, mockall::automock)]
pub trait TaskListener: Send + Sync {
    /// The chain was accepted by the scheduler
    fn task_submitted(&self, task: &TaskInfo) {
        let _ = task;
    }

    /// The task is about to be invoked for the candidate at `scheduled`
    fn task_starting(&self, task: &TaskInfo, scheduled: DateTime<Utc>) {
        let _ = (task, scheduled);
    }

    /// An invocation finished (success, failure or interruption)
    fn task_done(&self, task: &TaskInfo, record: &ExecutionRecord) {
        let _ = (task, record);
    }

    /// A candidate was skipped by the trigger or rejected for lack of a worker
    fn task_skipped(&self, task: &TaskInfo, record: &ExecutionRecord) {
        let _ = (task, record);
    }

    /// The chain was cancelled
    fn task_aborted(&self, task: &TaskInfo) {
        let _ = task;
    }

    /// The chain terminated; no further callbacks follow
    fn chain_finished(&self, task: &TaskInfo) {
        let _ = task;
    }
}

/// Invoke `f` on the listener, if any, containing panics.
pub(crate) fn notify<F>(listener: Option<&Arc<dyn TaskListener>>, task: &TaskInfo, f: F)
where
    F: FnOnce(&dyn TaskListener),
{
    let Some(listener) = listener else {
        return;
    };
    if catch_unwind(AssertUnwindSafe(|| f(listener.as_ref()))).is_err() {
        warn!(handle_id = %task.id, task = %task.name, "Task listener panicked");
    }
}
