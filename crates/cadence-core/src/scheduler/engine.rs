//! Scheduler execution engine
//!
//! Each accepted chain gets one driver task that owns its trigger and task
//! and performs every step of the loop in order:
//!
//! ```text
//! arm alarm ─▶ skip_run? ─┬─ yes ─▶ skipped record ───────────────┐
//!                         └─ no ──▶ acquire worker ─▶ run task ─▶ record
//!                                                                   │
//! terminate ◀─ None ── next_run_time(record, candidate) ◀──────────┘
//! ```
//!
//! Because one driver performs all of these steps, the trigger of a chain is
//! never consulted concurrently and two iterations of one chain never
//! overlap. Chains share the worker pool and otherwise run independently.

use std::any::Any;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::{join_all, BoxFuture, FutureExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::handle::{ChainControl, ScheduledHandle, Shared};
use super::listener::{notify, TaskListener};
use super::record::{ExecutionRecord, Outcome};
use super::triggers::{FixedDelayTrigger, FixedRateTrigger, OnceTrigger, Trigger};
use super::types::{ExecutionError, Result, SchedulerError, TaskInfo, TriggerError};
use crate::clock::{Clock, TokioClock};
use crate::config::SchedulerConfig;
use crate::pool::WorkerPool;
use crate::shutdown::{ShutdownController, ShutdownPhase};

/// Unit of work run once per iteration.
///
/// Implemented for every `Fn() -> impl Future<Output = anyhow::Result<T>>`
/// closure, so plain async closures can be scheduled directly.
pub trait Task<T>: Send + Sync + 'static {
    /// Start one invocation
    fn call(&self) -> BoxFuture<'static, anyhow::Result<T>>;
}

impl<T, F, Fut> Task<T> for F
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    fn call(&self) -> BoxFuture<'static, anyhow::Result<T>> {
        (self)().boxed()
    }
}

/// Per-schedule options
#[derive(Clone, Default)]
pub struct TaskOptions {
    name: Option<String>,
    listener: Option<Arc<dyn TaskListener>>,
}

impl TaskOptions {
    /// Default options: generated name, scheduler-wide listener
    pub fn new() -> Self {
        Self::default()
    }

    /// Options with a task name
    pub fn named(name: impl Into<String>) -> Self {
        Self::new().with_name(name)
    }

    /// Set the task name used in logs, records and listener callbacks
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set a listener for this chain, replacing the scheduler-wide one
    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn TaskListener>) -> Self {
        self.listener = Some(listener);
        self
    }
}

impl std::fmt::Debug for TaskOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskOptions")
            .field("name", &self.name)
            .field("listener", &self.listener.is_some())
            .finish()
    }
}

struct Inner {
    config: SchedulerConfig,
    clock: Arc<dyn Clock>,
    pool: WorkerPool,
    shutdown: Arc<ShutdownController>,
    chains: DashMap<Uuid, Arc<dyn ChainControl>>,
    listener: Option<Arc<dyn TaskListener>>,
}

/// Trigger-driven scheduler.
///
/// Cheap to clone; clones share the pool and the live chains. Scheduling
/// spawns onto the current tokio runtime, so it must be called from within
/// one.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    /// Create a scheduler with the system clock
    pub fn new(config: SchedulerConfig) -> Result<Self> {
        SchedulerBuilder::new().config(config).build()
    }

    /// Create a scheduler driven by `clock`
    pub fn with_clock(config: SchedulerConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        SchedulerBuilder::new().config(config).clock(clock).build()
    }

    /// Start building a scheduler
    pub fn builder() -> SchedulerBuilder {
        SchedulerBuilder::new()
    }

    /// Active configuration
    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// Clock the scheduler runs on
    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.inner.clock)
    }

    /// Schedule `task` under `trigger`.
    ///
    /// The trigger is asked for the first run immediately. If it declines,
    /// or fails, the returned handle is already terminated.
    pub fn schedule<T, K, R>(&self, task: K, trigger: R) -> Result<ScheduledHandle<T>>
    where
        T: Clone + Send + Sync + 'static,
        K: Task<T>,
        R: Trigger,
    {
        self.schedule_with(TaskOptions::default(), task, trigger)
    }

    /// [`Scheduler::schedule`] with a name and/or listener
    pub fn schedule_with<T, K, R>(
        &self,
        options: TaskOptions,
        task: K,
        trigger: R,
    ) -> Result<ScheduledHandle<T>>
    where
        T: Clone + Send + Sync + 'static,
        K: Task<T>,
        R: Trigger,
    {
        if !self.inner.shutdown.is_accepting_work() {
            return Err(SchedulerError::ShuttingDown);
        }

        let id = Uuid::new_v4();
        let name = options
            .name
            .unwrap_or_else(|| format!("task-{}", &id.simple().to_string()[..8]));
        let info = TaskInfo {
            id,
            name: name.into(),
        };
        let listener = options.listener.or_else(|| self.inner.listener.clone());

        let shared = Arc::new(Shared::new(
            info.clone(),
            self.inner.shutdown.stop_token(),
            self.inner.shutdown.interrupt_token(),
        ));
        let handle = ScheduledHandle::new(Arc::clone(&shared));
        notify(listener.as_ref(), &info, |l| l.task_submitted(&info));

        let submitted_at = self.inner.clock.now();
        let first = match consult(|| trigger.next_run_time(None, submitted_at)) {
            Ok(Some(first)) => first,
            Ok(None) => {
                debug!(handle_id = %info.id, task = %info.name, "Trigger declined the first run");
                shared.terminate(None);
                notify(listener.as_ref(), &info, |l| l.chain_finished(&info));
                return Ok(handle);
            }
            Err(e) => {
                warn!(handle_id = %info.id, task = %info.name, "Trigger failed at submission: {}", e);
                shared.terminate(Some(e.into()));
                notify(listener.as_ref(), &info, |l| l.chain_finished(&info));
                return Ok(handle);
            }
        };

        shared.arm(first);
        self.inner
            .chains
            .insert(info.id, Arc::clone(&shared) as Arc<dyn ChainControl>);

        if self.inner.config.logging_enabled {
            info!(handle_id = %info.id, task = %info.name, first_run = %first, "Chain scheduled");
        }

        let driver = ChainDriver {
            shared,
            task,
            trigger,
            listener,
            inner: Arc::clone(&self.inner),
        };
        tokio::spawn(driver.run(first));

        Ok(handle)
    }

    /// Run `task` once after `delay`
    pub fn schedule_once<T, K>(&self, task: K, delay: Duration) -> Result<ScheduledHandle<T>>
    where
        T: Clone + Send + Sync + 'static,
        K: Task<T>,
    {
        self.schedule(task, OnceTrigger::new(delay))
    }

    /// Run `task` once as soon as possible
    pub fn submit<T, K>(&self, task: K) -> Result<ScheduledHandle<T>>
    where
        T: Clone + Send + Sync + 'static,
        K: Task<T>,
    {
        self.schedule_once(task, Duration::ZERO)
    }

    /// Run `task` every `period`, starting after `initial_delay`
    pub fn schedule_at_fixed_rate<T, K>(
        &self,
        task: K,
        initial_delay: Duration,
        period: Duration,
    ) -> Result<ScheduledHandle<T>>
    where
        T: Clone + Send + Sync + 'static,
        K: Task<T>,
    {
        if period.is_zero() {
            return Err(SchedulerError::InvalidConfig(
                "period must be positive".to_string(),
            ));
        }
        self.schedule(task, FixedRateTrigger::new(initial_delay, period))
    }

    /// Run `task` repeatedly with `delay` between the end of one run and the
    /// start of the next, starting after `initial_delay`
    pub fn schedule_with_fixed_delay<T, K>(
        &self,
        task: K,
        initial_delay: Duration,
        delay: Duration,
    ) -> Result<ScheduledHandle<T>>
    where
        T: Clone + Send + Sync + 'static,
        K: Task<T>,
    {
        if delay.is_zero() {
            return Err(SchedulerError::InvalidConfig(
                "delay must be positive".to_string(),
            ));
        }
        self.schedule(task, FixedDelayTrigger::new(initial_delay, delay))
    }

    /// Number of chains that have not terminated
    pub fn live_chains(&self) -> usize {
        self.inner.chains.len()
    }

    /// Number of iterations currently executing
    pub fn active_iterations(&self) -> u32 {
        self.inner.shutdown.active_iterations()
    }

    /// Number of free worker slots
    pub fn available_workers(&self) -> usize {
        self.inner.pool.available_slots()
    }

    /// Whether shutdown has begun
    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutdown.is_shutting_down()
    }

    /// Current shutdown phase
    pub fn shutdown_phase(&self) -> ShutdownPhase {
        self.inner.shutdown.phase()
    }

    /// Shut down gracefully.
    ///
    /// Stops accepting schedules and stops every chain from starting new
    /// iterations, waits up to `grace` for in-flight iterations, interrupts
    /// the rest, and returns once every chain has terminated. Returns `true`
    /// when no interruption was needed.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        let drained = self.inner.shutdown.shutdown(grace).await;
        self.wait_for_chains().await;
        self.inner.pool.close();
        self.inner.shutdown.finish();
        drained
    }

    /// Stop and interrupt every chain without a grace period
    pub async fn shutdown_now(&self) {
        self.inner.shutdown.force_shutdown();
        self.wait_for_chains().await;
        self.inner.pool.close();
        self.inner.shutdown.finish();
    }

    async fn wait_for_chains(&self) {
        let remaining: Vec<Arc<dyn ChainControl>> = self
            .inner
            .chains
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        if remaining.is_empty() {
            return;
        }

        info!(chains = remaining.len(), "Waiting for chains to terminate...");
        join_all(remaining.iter().map(|chain| chain.done())).await;
    }
}

/// Builder for creating a [`Scheduler`]
#[derive(Default)]
pub struct SchedulerBuilder {
    config: SchedulerConfig,
    clock: Option<Arc<dyn Clock>>,
    listener: Option<Arc<dyn TaskListener>>,
}

impl SchedulerBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration
    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the clock
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Set a listener used by chains that do not bring their own
    pub fn listener(mut self, listener: Arc<dyn TaskListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Build the scheduler
    pub fn build(self) -> Result<Scheduler> {
        self.config.validate()?;

        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(TokioClock::new()) as Arc<dyn Clock>);
        let pool = WorkerPool::new(self.config.pool_size);

        Ok(Scheduler {
            inner: Arc::new(Inner {
                config: self.config,
                clock,
                pool,
                shutdown: ShutdownController::new(),
                chains: DashMap::new(),
                listener: self.listener,
            }),
        })
    }
}

/// How one task invocation ended
enum Iteration<T> {
    Completed(T),
    Failed(anyhow::Error),
    Interrupted,
}

/// Serializing actor for one chain
struct ChainDriver<T, K, R> {
    shared: Arc<Shared<T>>,
    task: K,
    trigger: R,
    listener: Option<Arc<dyn TaskListener>>,
    inner: Arc<Inner>,
}

impl<T, K, R> ChainDriver<T, K, R>
where
    T: Clone + Send + Sync + 'static,
    K: Task<T>,
    R: Trigger,
{
    async fn run(self, first: DateTime<Utc>) {
        let fatal = self.drive(first).await;
        let info = self.shared.info().clone();

        match &fatal {
            Some(e) => error!(handle_id = %info.id, task = %info.name, "Chain terminated: {}", e),
            None if self.inner.config.logging_enabled => {
                info!(handle_id = %info.id, task = %info.name, "Chain finished")
            }
            None => debug!(handle_id = %info.id, task = %info.name, "Chain finished"),
        }

        self.shared.terminate(fatal);
        self.inner.chains.remove(&info.id);

        if self.shared.is_cancelled() {
            notify(self.listener.as_ref(), &info, |l| l.task_aborted(&info));
        }
        notify(self.listener.as_ref(), &info, |l| l.chain_finished(&info));
    }

    /// Drive the chain until it ends. Returns the fatal error, if any.
    async fn drive(&self, first: DateTime<Utc>) -> Option<ExecutionError> {
        let mut candidate = first;
        let mut last: Option<ExecutionRecord> = None;
        let mut iteration = 0u64;
        let mut run_count = 0u64;

        loop {
            self.shared.arm(candidate);
            tokio::select! {
                biased;
                _ = self.shared.stop_token().cancelled() => return None,
                _ = self.inner.clock.sleep_until(candidate) => {}
            }
            iteration += 1;

            match consult(|| self.trigger.skip_run(last.as_ref(), candidate)) {
                Err(e) => return Some(e.into()),
                Ok(true) => last = Some(self.skip(candidate, iteration, run_count)),
                Ok(false) => match self.dispatch(candidate, iteration, &mut run_count).await {
                    Some(record) => last = Some(record),
                    None => return None,
                },
            }

            if self.shared.stop_token().is_cancelled() {
                return None;
            }

            match consult(|| self.trigger.next_run_time(last.as_ref(), candidate)) {
                Err(e) => return Some(e.into()),
                Ok(None) => return None,
                Ok(Some(next)) => candidate = next,
            }
        }
    }

    fn skip(&self, candidate: DateTime<Utc>, iteration: u64, run_count: u64) -> ExecutionRecord {
        let info = self.shared.info();
        debug!(handle_id = %info.id, task = %info.name, iteration, "Run skipped by trigger");

        let record = ExecutionRecord::skipped(&*info.name, iteration, run_count, candidate);
        self.shared.record_not_run(record.clone());
        notify(self.listener.as_ref(), info, |l| l.task_skipped(info, &record));
        record
    }

    /// Run one iteration on the pool. `None` means cancellation won before
    /// the task was dispatched.
    async fn dispatch(
        &self,
        candidate: DateTime<Utc>,
        iteration: u64,
        run_count: &mut u64,
    ) -> Option<ExecutionRecord> {
        let info = self.shared.info();
        let bound = self.inner.config.dispatch_timeout();

        let acquired = tokio::select! {
            biased;
            _ = self.shared.stop_token().cancelled() => return None,
            acquired = self.inner.pool.acquire(bound) => acquired,
        };

        let permit = match acquired {
            Ok(permit) => permit,
            Err(SchedulerError::ResourceExhausted { waited_ms }) => {
                let n = self.shared.try_begin()?;
                warn!(
                    handle_id = %info.id,
                    task = %info.name,
                    iteration,
                    waited_ms,
                    "Iteration rejected, no worker available"
                );
                let record = ExecutionRecord::rejected(
                    &*info.name,
                    iteration,
                    *run_count,
                    candidate,
                    format!("no worker free after {waited_ms}ms"),
                );
                self.shared.finish(
                    n,
                    Err(ExecutionError::ResourceExhausted { waited_ms }),
                    record.clone(),
                );
                notify(self.listener.as_ref(), info, |l| l.task_skipped(info, &record));
                return Some(record);
            }
            Err(_) => return None,
        };

        let n = self.shared.try_begin()?;
        *run_count += 1;
        let _guard = self.inner.shutdown.register_iteration();

        notify(self.listener.as_ref(), info, |l| l.task_starting(info, candidate));
        if self.inner.config.logging_enabled {
            info!(handle_id = %info.id, task = %info.name, iteration, scheduled = %candidate, "Executing iteration");
        } else {
            debug!(handle_id = %info.id, task = %info.name, iteration, "Executing iteration");
        }

        let run_start = self.inner.clock.now();
        let iteration_result = self.invoke().await;
        let run_end = self.inner.clock.now();
        drop(permit);

        let (result, outcome) = match iteration_result {
            Iteration::Completed(value) => (Ok(value), Outcome::Success),
            Iteration::Failed(e) => {
                warn!(handle_id = %info.id, task = %info.name, iteration, "Iteration failed: {:#}", e);
                let message = format!("{:#}", e);
                (Err(ExecutionError::task_failed(e)), Outcome::Failed { message })
            }
            Iteration::Interrupted => {
                info!(handle_id = %info.id, task = %info.name, iteration, "Iteration interrupted");
                (Err(ExecutionError::Cancelled), Outcome::Interrupted)
            }
        };

        let record = ExecutionRecord::completed(
            &*info.name,
            iteration,
            *run_count,
            candidate,
            run_start,
            run_end,
            outcome,
        );
        self.shared.finish(n, result, record.clone());
        notify(self.listener.as_ref(), info, |l| l.task_done(info, &record));
        Some(record)
    }

    /// Invoke the task on its own tokio task so a panic stays contained and
    /// the interrupt token can drop it at its next await point.
    async fn invoke(&self) -> Iteration<T> {
        let call = match catch_unwind(AssertUnwindSafe(|| self.task.call())) {
            Ok(call) => call,
            Err(panic) => return Iteration::Failed(panicked(panic)),
        };
        let interrupt: CancellationToken = self.shared.interrupt_token().clone();

        let worker = tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = interrupt.cancelled() => Iteration::Interrupted,
                result = call => match result {
                    Ok(value) => Iteration::Completed(value),
                    Err(e) => Iteration::Failed(e),
                },
            }
        });

        match worker.await {
            Ok(iteration) => iteration,
            Err(e) if e.is_panic() => Iteration::Failed(panicked(e.into_panic())),
            Err(_) => Iteration::Interrupted,
        }
    }
}

/// Call into the trigger. A panic becomes a trigger error, which ends the
/// chain like any other trigger failure.
fn consult<V>(
    call: impl FnOnce() -> std::result::Result<V, TriggerError>,
) -> std::result::Result<V, TriggerError> {
    catch_unwind(AssertUnwindSafe(call)).unwrap_or_else(|panic| {
        Err(TriggerError::new(format!(
            "trigger panicked: {}",
            panic_message(panic.as_ref())
        )))
    })
}

fn panicked(panic: Box<dyn Any + Send>) -> anyhow::Error {
    anyhow::anyhow!("task panicked: {}", panic_message(panic.as_ref()))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
