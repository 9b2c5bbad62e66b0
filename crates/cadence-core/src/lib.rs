//! Cadence Core - Trigger-Driven Task Scheduling
//!
//! This crate provides the scheduling engine behind Cadence:
//! - Scheduler: runs tasks repeatedly under a caller-supplied trigger policy
//! - Triggers: one-shot, fixed-rate, fixed-delay and run-capped policies
//! - Handles: latest result, lifecycle state and cancellation per chain
//! - Pool: bounded worker concurrency shared by all chains
//! - Shutdown: graceful stop with a drain period, then interruption
//! - Context: ambient state carried into every invocation

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod clock;
pub mod config;
pub mod context;
pub mod pool;
pub mod scheduler;
pub mod shutdown;

pub use clock::{Clock, TokioClock};
pub use config::SchedulerConfig;
pub use context::{current_identity, run_as, with_context, ContextPropagator, IdentityContext};
pub use pool::{WorkerPermit, WorkerPool};
pub use scheduler::{
    ChainState, ExecutionError, ExecutionRecord, FixedDelayTrigger, FixedRateTrigger, MaxRuns,
    OnceTrigger, Outcome, Result, ScheduledHandle, Scheduler, SchedulerBuilder, SchedulerError,
    Task, TaskInfo, TaskListener, TaskOptions, Trigger, TriggerError, TriggerSpec,
};
pub use shutdown::{wait_for_shutdown_signal, ShutdownController, ShutdownPhase};
