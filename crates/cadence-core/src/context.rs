//! Context propagation for scheduled tasks
//!
//! Iterations run on pool workers, away from the code that scheduled them.
//! [`with_context`] captures ambient state when a task is wrapped and puts
//! it back around every invocation. The scheduler only sees an ordinary
//! [`Task`].

use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};

use crate::scheduler::Task;

/// Captures ambient state and re-applies it around a future
pub trait ContextPropagator: Send + Sync + 'static {
    /// Captured state
    type Snapshot: Clone + Send + Sync + 'static;

    /// Capture the state visible to the caller
    fn capture(&self) -> Self::Snapshot;

    /// Run `future` with `snapshot` in effect
    fn scope<T: Send + 'static>(
        &self,
        snapshot: Self::Snapshot,
        future: BoxFuture<'static, T>,
    ) -> BoxFuture<'static, T>;
}

/// Wrap `task` so every invocation runs inside the context captured now.
pub fn with_context<T, P, K>(propagator: P, task: K) -> impl Task<T>
where
    T: Send + 'static,
    P: ContextPropagator,
    K: Task<T>,
{
    let snapshot = propagator.capture();
    move || propagator.scope(snapshot.clone(), task.call())
}

tokio::task_local! {
    static IDENTITY: Option<Arc<str>>;
}

/// Identity of the caller on whose behalf the current future runs
pub fn current_identity() -> Option<Arc<str>> {
    IDENTITY.try_with(|identity| identity.clone()).ok().flatten()
}

/// Run `future` as `identity`
pub async fn run_as<F: Future>(identity: impl Into<Arc<str>>, future: F) -> F::Output {
    IDENTITY.scope(Some(identity.into()), future).await
}

/// Propagates the task-local identity set by [`run_as`]
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityContext;

impl ContextPropagator for IdentityContext {
    type Snapshot = Option<Arc<str>>;

    fn capture(&self) -> Self::Snapshot {
        current_identity()
    }

    fn scope<T: Send + 'static>(
        &self,
        snapshot: Self::Snapshot,
        future: BoxFuture<'static, T>,
    ) -> BoxFuture<'static, T> {
        IDENTITY.scope(snapshot, future).boxed()
    }
}
