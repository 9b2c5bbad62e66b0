//! Scheduled task handle
//!
//! The caller's view of a chain. Unlike a one-shot future, a handle stays
//! live across iterations: `get()` resolves with the latest started
//! iteration, `is_done()` only turns true once no further iteration can
//! happen, and `cancel()` stops the whole chain.
//!
//! All state sits in one `watch` channel. The chain's driver performs every
//! transition except the cancellation request, which the caller applies
//! under the same channel lock so the driver observes it before dispatching.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use super::record::ExecutionRecord;
use super::types::{ChainState, ExecutionError, TaskInfo};

type IterationResult<T> = std::result::Result<T, ExecutionError>;

/// Mutable chain state, guarded by the watch channel
pub(crate) struct Slot<T> {
    state: ChainState,
    cancelled: bool,
    /// Iterations started (task dispatched or rejected)
    started: u64,
    /// Latest resolved iteration and its result
    resolved: Option<(u64, IterationResult<T>)>,
    /// Chain-ending error, takes precedence over `resolved`
    fatal: Option<ExecutionError>,
    last_record: Option<ExecutionRecord>,
    next_run: Option<DateTime<Utc>>,
}

impl<T> Slot<T> {
    fn new() -> Self {
        Self {
            state: ChainState::Pending,
            cancelled: false,
            started: 0,
            resolved: None,
            fatal: None,
            last_record: None,
            next_run: None,
        }
    }

    /// Whether `get()` can answer now
    fn is_settled(&self) -> bool {
        if self.fatal.is_some() || self.state == ChainState::Terminated {
            return true;
        }
        matches!(self.resolved, Some((n, _)) if n >= self.started)
    }
}

impl<T: Clone> Slot<T> {
    fn answer(&self) -> IterationResult<T> {
        if let Some(fatal) = &self.fatal {
            return Err(fatal.clone());
        }
        match &self.resolved {
            Some((_, result)) => result.clone(),
            None if self.cancelled => Err(ExecutionError::Cancelled),
            None => Err(ExecutionError::NoExecution),
        }
    }
}

/// State shared between a handle and its driver
pub(crate) struct Shared<T> {
    info: TaskInfo,
    slot: watch::Sender<Slot<T>>,
    stop: CancellationToken,
    interrupt: CancellationToken,
}

impl<T> Shared<T> {
    pub(crate) fn new(info: TaskInfo, stop: CancellationToken, interrupt: CancellationToken) -> Self {
        Self {
            info,
            slot: watch::Sender::new(Slot::new()),
            stop,
            interrupt,
        }
    }

    pub(crate) fn info(&self) -> &TaskInfo {
        &self.info
    }

    /// Cancelled when no further iteration may start
    pub(crate) fn stop_token(&self) -> &CancellationToken {
        &self.stop
    }

    /// Cancelled when the in-flight iteration must be interrupted
    pub(crate) fn interrupt_token(&self) -> &CancellationToken {
        &self.interrupt
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.slot.borrow().cancelled
    }

    pub(crate) fn state(&self) -> ChainState {
        self.slot.borrow().state
    }

    pub(crate) fn cancel(&self, interrupt_if_running: bool) -> bool {
        let applied = self.slot.send_if_modified(|slot| {
            if slot.cancelled || slot.state == ChainState::Terminated {
                return false;
            }
            slot.cancelled = true;
            slot.state = ChainState::Cancelling;
            true
        });

        if applied {
            info!(
                handle_id = %self.info.id,
                task = %self.info.name,
                interrupt = interrupt_if_running,
                "Chain cancelled"
            );
            self.stop.cancel();
        }
        if interrupt_if_running && self.state() != ChainState::Terminated {
            self.interrupt.cancel();
        }
        applied
    }

    /// Record that the driver is about to wait for `at`
    pub(crate) fn arm(&self, at: DateTime<Utc>) {
        self.slot.send_modify(|slot| slot.next_run = Some(at));
    }

    /// Claim the next iteration number unless cancellation got there first.
    ///
    /// A stop from shutdown counts as cancellation.
    pub(crate) fn try_begin(&self) -> Option<u64> {
        let mut claimed = None;
        self.slot.send_if_modified(|slot| {
            if slot.cancelled || self.stop.is_cancelled() {
                slot.cancelled = true;
                slot.state = ChainState::Cancelling;
                return true;
            }
            slot.started += 1;
            slot.state = ChainState::Running;
            slot.next_run = None;
            claimed = Some(slot.started);
            true
        });
        claimed
    }

    /// Publish the result of iteration `n`
    pub(crate) fn finish(&self, n: u64, result: IterationResult<T>, record: ExecutionRecord) {
        self.slot.send_modify(|slot| {
            slot.resolved = Some((n, result));
            slot.last_record = Some(record);
            if slot.state == ChainState::Running {
                slot.state = ChainState::AwaitingNext;
            }
        });
    }

    /// Keep the record of a candidate that did not run
    pub(crate) fn record_not_run(&self, record: ExecutionRecord) {
        self.slot.send_modify(|slot| {
            slot.last_record = Some(record);
            slot.next_run = None;
        });
    }

    /// End the chain. A stop observed without an explicit `cancel` (shutdown)
    /// still marks the handle cancelled.
    pub(crate) fn terminate(&self, fatal: Option<ExecutionError>) {
        let stopped = self.stop.is_cancelled();
        self.slot.send_modify(|slot| {
            if stopped && fatal.is_none() {
                slot.cancelled = true;
            }
            slot.fatal = fatal;
            slot.state = ChainState::Terminated;
            slot.next_run = None;
        });
    }

    fn wait_done(&self) -> impl std::future::Future<Output = ()> + Send + 'static
    where
        T: Send + Sync + 'static,
    {
        let mut rx = self.slot.subscribe();
        async move {
            let _ = rx.wait_for(|slot| slot.state == ChainState::Terminated).await;
        }
    }
}

/// Type-erased view of a live chain kept in the scheduler's registry.
///
/// Shutdown stops chains through the controller's root tokens, so the
/// registry only needs to wait for them.
pub(crate) trait ChainControl: Send + Sync {
    fn done(&self) -> BoxFuture<'static, ()>;
}

impl<T: Send + Sync + 'static> ChainControl for Shared<T> {
    fn done(&self) -> BoxFuture<'static, ()> {
        self.wait_done().boxed()
    }
}

/// Handle to a scheduled chain of executions
pub struct ScheduledHandle<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for ScheduledHandle<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> std::fmt::Debug for ScheduledHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledHandle")
            .field("id", &self.shared.info.id)
            .field("name", &self.shared.info.name)
            .field("state", &self.shared.state())
            .finish()
    }
}

impl<T> ScheduledHandle<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(shared: Arc<Shared<T>>) -> Self {
        Self { shared }
    }

    /// Chain ID
    pub fn id(&self) -> Uuid {
        self.shared.info.id
    }

    /// Task name
    pub fn name(&self) -> &str {
        &self.shared.info.name
    }

    /// Current lifecycle state
    pub fn state(&self) -> ChainState {
        self.shared.state()
    }

    /// Whether the chain has fully terminated.
    ///
    /// Finishing one iteration does not make a chain done; only the end of
    /// the whole chain does.
    pub fn is_done(&self) -> bool {
        self.state() == ChainState::Terminated
    }

    /// Whether cancellation was requested and accepted
    pub fn is_cancelled(&self) -> bool {
        self.shared.is_cancelled()
    }

    /// Stop scheduling further iterations.
    ///
    /// With `interrupt_if_running`, an iteration currently executing is
    /// interrupted at its next await point and recorded as interrupted.
    /// Returns `true` if this call applied the cancellation; `false` if the
    /// chain was already cancelled or already done. The effect is
    /// asynchronous: `is_done()` turns true once the driver has unwound.
    pub fn cancel(&self, interrupt_if_running: bool) -> bool {
        self.shared.cancel(interrupt_if_running)
    }

    /// Wait for the most recently started iteration to resolve and return
    /// its result.
    ///
    /// Returns immediately with the same value while no newer iteration has
    /// started.
    pub async fn get(&self) -> std::result::Result<T, ExecutionError> {
        let mut rx = self.shared.slot.subscribe();
        let slot = rx
            .wait_for(Slot::is_settled)
            .await
            .map_err(|_| ExecutionError::Cancelled)?;
        slot.answer()
    }

    /// [`ScheduledHandle::get`] bounded by `timeout`
    pub async fn get_timeout(&self, timeout: Duration) -> std::result::Result<T, ExecutionError> {
        tokio::time::timeout(timeout, self.get())
            .await
            .unwrap_or(Err(ExecutionError::Timeout))
    }

    /// Wait until the chain has terminated
    pub async fn wait_done(&self) {
        self.shared.wait_done().await
    }

    /// Record of the latest candidate, run or not
    pub fn last_record(&self) -> Option<ExecutionRecord> {
        self.shared.slot.borrow().last_record.clone()
    }

    /// Instant the armed alarm fires, if the chain is waiting for one
    pub fn next_run_time(&self) -> Option<DateTime<Utc>> {
        self.shared.slot.borrow().next_run
    }

    /// Number of iterations started so far (skipped candidates excluded)
    pub fn executions(&self) -> u64 {
        self.shared.slot.borrow().started
    }
}
