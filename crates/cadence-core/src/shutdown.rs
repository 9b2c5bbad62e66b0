//! Graceful shutdown
//!
//! The controller owns two root tokens. Cancelling `stop` ends every chain's
//! alarm wait so no new iteration starts; cancelling `interrupt` reaches
//! iterations that are still running once the grace period is over.
//!
//! ## Usage
//!
//! ```ignore
//! let shutdown = ShutdownController::new();
//!
//! // Give child tokens to every chain
//! let stop = shutdown.stop_token();
//! let interrupt = shutdown.interrupt_token();
//!
//! // Stop, drain for up to the grace period, then interrupt
//! let drained = shutdown.shutdown(Duration::from_secs(30)).await;
//! ```

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Shutdown phases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownPhase {
    /// Normal operation
    Running,
    /// No new schedules are accepted, no new iterations start
    Stopping,
    /// Waiting for in-flight iterations to complete
    Draining,
    /// Grace period exceeded, in-flight iterations are interrupted
    Terminating,
    /// Shutdown complete
    Terminated,
}

impl std::fmt::Display for ShutdownPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "Running"),
            Self::Stopping => write!(f, "Stopping"),
            Self::Draining => write!(f, "Draining"),
            Self::Terminating => write!(f, "Terminating"),
            Self::Terminated => write!(f, "Terminated"),
        }
    }
}

/// Shutdown controller shared by the scheduler and its chains
pub struct ShutdownController {
    /// Parent of every chain's stop token
    stop_token: CancellationToken,
    /// Parent of every chain's interrupt token
    interrupt_token: CancellationToken,
    /// Broadcast channel for phase changes
    phase_tx: broadcast::Sender<ShutdownPhase>,
    /// Current shutdown phase
    phase: AtomicU32,
    /// Whether shutdown has been initiated
    shutdown_initiated: AtomicBool,
    /// Iterations currently executing
    active_iterations: AtomicU32,
}

impl ShutdownController {
    /// Create a new shutdown controller
    #[must_use]
    pub fn new() -> Arc<Self> {
        let (phase_tx, _) = broadcast::channel(16);
        Arc::new(Self {
            stop_token: CancellationToken::new(),
            interrupt_token: CancellationToken::new(),
            phase_tx,
            phase: AtomicU32::new(ShutdownPhase::Running as u32),
            shutdown_initiated: AtomicBool::new(false),
            active_iterations: AtomicU32::new(0),
        })
    }

    /// Child token cancelled when shutdown begins
    #[must_use]
    pub fn stop_token(&self) -> CancellationToken {
        self.stop_token.child_token()
    }

    /// Child token cancelled when in-flight iterations must be interrupted
    #[must_use]
    pub fn interrupt_token(&self) -> CancellationToken {
        self.interrupt_token.child_token()
    }

    /// Subscribe to phase changes
    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownPhase> {
        self.phase_tx.subscribe()
    }

    /// Current shutdown phase
    #[must_use]
    pub fn phase(&self) -> ShutdownPhase {
        match self.phase.load(Ordering::SeqCst) {
            0 => ShutdownPhase::Running,
            1 => ShutdownPhase::Stopping,
            2 => ShutdownPhase::Draining,
            3 => ShutdownPhase::Terminating,
            _ => ShutdownPhase::Terminated,
        }
    }

    /// Whether shutdown has been initiated
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_initiated.load(Ordering::SeqCst)
    }

    /// Whether new schedules may still be accepted
    #[must_use]
    pub fn is_accepting_work(&self) -> bool {
        self.phase() == ShutdownPhase::Running
    }

    /// Register an executing iteration
    pub fn register_iteration(&self) -> IterationGuard<'_> {
        self.active_iterations.fetch_add(1, Ordering::SeqCst);
        IterationGuard { controller: self }
    }

    /// Number of iterations currently executing
    #[must_use]
    pub fn active_iterations(&self) -> u32 {
        self.active_iterations.load(Ordering::SeqCst)
    }

    fn set_phase(&self, phase: ShutdownPhase) {
        self.phase.store(phase as u32, Ordering::SeqCst);
        let _ = self.phase_tx.send(phase);
        info!(phase = %phase, "Shutdown phase changed");
    }

    /// Initiate graceful shutdown
    ///
    /// 1. Stop accepting work and cancel every stop token
    /// 2. Wait for in-flight iterations, up to `grace`
    /// 3. Interrupt whatever is still running
    ///
    /// Returns `true` when every iteration finished within the grace period,
    /// `false` when interruption was needed or shutdown was already underway.
    /// The caller marks the end with [`ShutdownController::finish`].
    pub async fn shutdown(&self, grace: Duration) -> bool {
        if self
            .shutdown_initiated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Shutdown already initiated");
            return false;
        }

        info!(grace_secs = grace.as_secs(), "Initiating graceful shutdown...");

        self.set_phase(ShutdownPhase::Stopping);
        self.stop_token.cancel();

        self.set_phase(ShutdownPhase::Draining);
        let drain_start = tokio::time::Instant::now();
        let check_interval = Duration::from_millis(100);

        loop {
            let active = self.active_iterations();
            if active == 0 {
                info!("All iterations completed gracefully");
                return true;
            }

            let elapsed = drain_start.elapsed();
            if elapsed >= grace {
                warn!(
                    active_iterations = active,
                    grace_secs = grace.as_secs(),
                    "Grace period exceeded, interrupting running iterations"
                );
                self.set_phase(ShutdownPhase::Terminating);
                self.interrupt_token.cancel();
                return false;
            }

            debug!(
                active_iterations = active,
                elapsed_ms = elapsed.as_millis() as u64,
                "Waiting for iterations to complete..."
            );

            tokio::time::sleep(check_interval).await;
        }
    }

    /// Mark shutdown complete
    pub fn finish(&self) {
        if self.phase() != ShutdownPhase::Terminated {
            self.set_phase(ShutdownPhase::Terminated);
            info!("Shutdown complete");
        }
    }

    /// Stop and interrupt everything at once, skipping the drain
    pub fn force_shutdown(&self) {
        if self
            .shutdown_initiated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            warn!("Force shutdown initiated");
            self.set_phase(ShutdownPhase::Terminating);
            self.stop_token.cancel();
            self.interrupt_token.cancel();
        }
    }
}

/// Tracks one executing iteration.
///
/// Decrements the active count when dropped.
pub struct IterationGuard<'a> {
    controller: &'a ShutdownController,
}

impl<'a> Drop for IterationGuard<'a> {
    fn drop(&mut self) {
        self.controller
            .active_iterations
            .fetch_sub(1, Ordering::SeqCst);
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM)
pub async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
