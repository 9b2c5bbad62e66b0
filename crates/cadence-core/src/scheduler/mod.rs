//! Trigger-driven task scheduling
//!
//! A chain is a task paired with a trigger. The trigger decides when the
//! task runs next, based on the record of the previous candidate, and may
//! end the chain at any point:
//!
//! - **Once**: a single run after a delay
//! - **Fixed rate**: runs on a fixed grid, dropping slots a slow run missed
//! - **Fixed delay**: a fixed pause between the end of one run and the next
//! - **Custom**: any [`Trigger`] implementation, optionally capped by [`MaxRuns`]
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │    Scheduler    │  Accepts chains, owns pool and shutdown
//! └────────┬────────┘
//!          │ one driver per chain
//!          ▼
//! ┌─────────────────┐
//! │   ChainDriver   │  Alarm, skip, dispatch, reschedule
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │   WorkerPool    │  Bounded concurrency across chains
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ ScheduledHandle │  Latest result, state, cancellation
//! └─────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use cadence_core::scheduler::{Scheduler, TriggerSpec};
//! use cadence_core::SchedulerConfig;
//!
//! let scheduler = Scheduler::new(SchedulerConfig::default())?;
//!
//! let handle = scheduler.schedule_at_fixed_rate(
//!     || async { Ok(collect_metrics().await?) },
//!     Duration::ZERO,
//!     Duration::from_secs(60),
//! )?;
//!
//! let latest = handle.get().await?;
//! handle.cancel(false);
//!
//! scheduler.shutdown(Duration::from_secs(30)).await;
//! ```

mod engine;
mod handle;
mod listener;
mod record;
mod triggers;
mod types;

pub use engine::{Scheduler, SchedulerBuilder, Task, TaskOptions};
pub use handle::ScheduledHandle;
pub use listener::TaskListener;
pub use record::{ExecutionRecord, Outcome};
pub use triggers::{
    FixedDelayTrigger, FixedRateTrigger, MaxRuns, OnceTrigger, Trigger, TriggerSpec,
};
pub use types::{ChainState, ExecutionError, Result, SchedulerError, TaskInfo, TriggerError};
