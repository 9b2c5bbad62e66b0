//! Clock and one-shot alarms
//!
//! The scheduler never reads the system time directly. Every "now" and every
//! alarm goes through a [`Clock`], so tests can drive chains with tokio's
//! paused time.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::future::{BoxFuture, FutureExt};
use tokio::time::Instant;

/// Source of the current instant and of one-shot alarms
pub trait Clock: Send + Sync + 'static {
    /// Current instant
    fn now(&self) -> DateTime<Utc>;

    /// Resolve once `at` has been reached.
    ///
    /// An instant at or before [`Clock::now`] resolves immediately.
    fn sleep_until(&self, at: DateTime<Utc>) -> BoxFuture<'static, ()>;
}

/// Wall clock anchored at construction and advanced by the tokio timer.
///
/// Because it is driven by [`tokio::time::Instant`], it follows paused and
/// auto-advanced time in tests, and `now()` never goes backwards.
#[derive(Debug, Clone)]
pub struct TokioClock {
    wall_origin: DateTime<Utc>,
    instant_origin: Instant,
}

impl TokioClock {
    /// Create a clock anchored at the current system time
    pub fn new() -> Self {
        Self {
            wall_origin: Utc::now(),
            instant_origin: Instant::now(),
        }
    }

    fn deadline(&self, at: DateTime<Utc>) -> Instant {
        match (at - self.wall_origin).to_std() {
            Ok(offset) => self.instant_origin + offset,
            // Before the anchor: already due.
            Err(_) => self.instant_origin,
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = ChronoDuration::from_std(self.instant_origin.elapsed())
            .unwrap_or_else(|_| ChronoDuration::zero());
        self.wall_origin + elapsed
    }

    fn sleep_until(&self, at: DateTime<Utc>) -> BoxFuture<'static, ()> {
        tokio::time::sleep_until(self.deadline(at)).boxed()
    }
}

#[cfg(test)]
mod tests;
