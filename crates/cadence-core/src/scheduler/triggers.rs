//! Triggers - policies that decide when a chain runs next
//!
//! A [`Trigger`] is caller code. The scheduler consults it once per
//! candidate run, strictly after the previous candidate is final, and never
//! concurrently for one chain.
//!
//! Built-in policies:
//! - [`OnceTrigger`]: a single run after a delay
//! - [`FixedRateTrigger`]: runs aligned on a fixed period from the first run
//! - [`FixedDelayTrigger`]: a fixed pause between the end of one run and the
//!   start of the next
//! - [`MaxRuns`]: stops any trigger after a number of task invocations
//!
//! [`TriggerSpec`] is the serializable form used by job configuration.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

use super::record::ExecutionRecord;
use super::types::{Result, SchedulerError, TriggerError};

/// Policy deciding when the next run of a chain happens
pub trait Trigger: Send + Sync + 'static {
    /// Next run instant, or `None` to end the chain.
    ///
    /// `last` is `None` for the first call. `scheduled_origin` is the
    /// submission time on the first call and the candidate time of the run
    /// that just finished afterwards.
    fn next_run_time(
        &self,
        last: Option<&ExecutionRecord>,
        scheduled_origin: DateTime<Utc>,
    ) -> std::result::Result<Option<DateTime<Utc>>, TriggerError>;

    /// Whether the candidate at `candidate` should be abandoned without
    /// invoking the task. The chain continues either way.
    fn skip_run(
        &self,
        last: Option<&ExecutionRecord>,
        candidate: DateTime<Utc>,
    ) -> std::result::Result<bool, TriggerError> {
        let _ = (last, candidate);
        Ok(false)
    }
}

impl<T: Trigger + ?Sized> Trigger for Box<T> {
    fn next_run_time(
        &self,
        last: Option<&ExecutionRecord>,
        scheduled_origin: DateTime<Utc>,
    ) -> std::result::Result<Option<DateTime<Utc>>, TriggerError> {
        (**self).next_run_time(last, scheduled_origin)
    }

    fn skip_run(
        &self,
        last: Option<&ExecutionRecord>,
        candidate: DateTime<Utc>,
    ) -> std::result::Result<bool, TriggerError> {
        (**self).skip_run(last, candidate)
    }
}

impl<T: Trigger + ?Sized> Trigger for Arc<T> {
    fn next_run_time(
        &self,
        last: Option<&ExecutionRecord>,
        scheduled_origin: DateTime<Utc>,
    ) -> std::result::Result<Option<DateTime<Utc>>, TriggerError> {
        (**self).next_run_time(last, scheduled_origin)
    }

    fn skip_run(
        &self,
        last: Option<&ExecutionRecord>,
        candidate: DateTime<Utc>,
    ) -> std::result::Result<bool, TriggerError> {
        (**self).skip_run(last, candidate)
    }
}

fn to_delta(duration: Duration) -> std::result::Result<ChronoDuration, TriggerError> {
    ChronoDuration::from_std(duration)
        .map_err(|_| TriggerError::new(format!("duration out of range: {:?}", duration)))
}

fn shift(
    at: DateTime<Utc>,
    delta: ChronoDuration,
) -> std::result::Result<DateTime<Utc>, TriggerError> {
    at.checked_add_signed(delta)
        .ok_or_else(|| TriggerError::new(format!("run time out of range: {} + {}", at, delta)))
}

/// Runs the task once, `delay` after submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OnceTrigger {
    /// Delay from submission to the single run
    pub delay: Duration,
}

impl OnceTrigger {
    /// Create a one-shot trigger
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Trigger for OnceTrigger {
    fn next_run_time(
        &self,
        last: Option<&ExecutionRecord>,
        scheduled_origin: DateTime<Utc>,
    ) -> std::result::Result<Option<DateTime<Utc>>, TriggerError> {
        match last {
            None => Ok(Some(shift(scheduled_origin, to_delta(self.delay)?)?)),
            Some(_) => Ok(None),
        }
    }
}

/// Runs at `first + n * period`.
///
/// When a run overruns one or more periods, the missed slots are dropped and
/// the next run is the first slot at or after the end of the late run, so a
/// slow task never builds a backlog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedRateTrigger {
    /// Delay from submission to the first run
    pub initial_delay: Duration,
    /// Distance between consecutive slots
    pub period: Duration,
}

impl FixedRateTrigger {
    /// Create a fixed-rate trigger
    pub fn new(initial_delay: Duration, period: Duration) -> Self {
        Self {
            initial_delay,
            period,
        }
    }
}

impl Trigger for FixedRateTrigger {
    fn next_run_time(
        &self,
        last: Option<&ExecutionRecord>,
        scheduled_origin: DateTime<Utc>,
    ) -> std::result::Result<Option<DateTime<Utc>>, TriggerError> {
        let Some(last) = last else {
            return Ok(Some(shift(scheduled_origin, to_delta(self.initial_delay)?)?));
        };

        let period = to_delta(self.period)?;
        let next = shift(last.scheduled_time(), period)?;
        let reference = last.run_end().unwrap_or(next);
        if reference <= next || period <= ChronoDuration::zero() {
            return Ok(Some(next.max(reference)));
        }

        // Overran: jump to the first slot not before the end of the run.
        let behind_ms = (reference - next).num_milliseconds();
        let period_ms = period.num_milliseconds().max(1);
        let slots = (behind_ms + period_ms - 1) / period_ms;
        let skipped = slots
            .checked_mul(period_ms)
            .and_then(ChronoDuration::try_milliseconds)
            .ok_or_else(|| TriggerError::new("fixed-rate catch-up out of range"))?;
        Ok(Some(shift(next, skipped)?))
    }
}

/// Waits `delay` after each run ends before the next one.
///
/// After a candidate that did not run (skipped or rejected), the delay is
/// measured from that candidate's scheduled time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedDelayTrigger {
    /// Delay from submission to the first run
    pub initial_delay: Duration,
    /// Pause between the end of a run and the next start
    pub delay: Duration,
}

impl FixedDelayTrigger {
    /// Create a fixed-delay trigger
    pub fn new(initial_delay: Duration, delay: Duration) -> Self {
        Self {
            initial_delay,
            delay,
        }
    }
}

impl Trigger for FixedDelayTrigger {
    fn next_run_time(
        &self,
        last: Option<&ExecutionRecord>,
        scheduled_origin: DateTime<Utc>,
    ) -> std::result::Result<Option<DateTime<Utc>>, TriggerError> {
        match last {
            None => Ok(Some(shift(scheduled_origin, to_delta(self.initial_delay)?)?)),
            Some(last) => {
                let from = last.run_end().unwrap_or_else(|| last.scheduled_time());
                Ok(Some(shift(from, to_delta(self.delay)?)?))
            }
        }
    }
}

/// Ends the wrapped trigger's chain after `max` task invocations.
///
/// Skipped and rejected candidates do not count.
#[derive(Debug, Clone)]
pub struct MaxRuns<T> {
    inner: T,
    max: u64,
}

impl<T: Trigger> MaxRuns<T> {
    /// Wrap `inner`, allowing at most `max` invocations
    pub fn new(inner: T, max: u64) -> Self {
        Self { inner, max }
    }
}

impl<T: Trigger> Trigger for MaxRuns<T> {
    fn next_run_time(
        &self,
        last: Option<&ExecutionRecord>,
        scheduled_origin: DateTime<Utc>,
    ) -> std::result::Result<Option<DateTime<Utc>>, TriggerError> {
        let runs = last.map(ExecutionRecord::run_count).unwrap_or(0);
        if runs >= self.max {
            return Ok(None);
        }
        self.inner.next_run_time(last, scheduled_origin)
    }

    fn skip_run(
        &self,
        last: Option<&ExecutionRecord>,
        candidate: DateTime<Utc>,
    ) -> std::result::Result<bool, TriggerError> {
        self.inner.skip_run(last, candidate)
    }
}

/// Serializable trigger definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerSpec {
    /// Single run after a delay
    Once {
        /// Delay in milliseconds
        #[serde(default)]
        delay_ms: u64,
    },
    /// Fixed-rate runs
    FixedRate {
        /// Delay before the first run, in milliseconds
        #[serde(default)]
        initial_delay_ms: u64,
        /// Period in milliseconds
        period_ms: u64,
        /// Stop after this many runs
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_runs: Option<u64>,
    },
    /// Fixed-delay runs
    FixedDelay {
        /// Delay before the first run, in milliseconds
        #[serde(default)]
        initial_delay_ms: u64,
        /// Pause between runs in milliseconds
        delay_ms: u64,
        /// Stop after this many runs
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_runs: Option<u64>,
    },
}

impl TriggerSpec {
    /// One-shot definition
    pub fn once(delay: Duration) -> Self {
        Self::Once {
            delay_ms: delay.as_millis() as u64,
        }
    }

    /// Fixed-rate definition without a run limit
    pub fn fixed_rate(initial_delay: Duration, period: Duration) -> Self {
        Self::FixedRate {
            initial_delay_ms: initial_delay.as_millis() as u64,
            period_ms: period.as_millis() as u64,
            max_runs: None,
        }
    }

    /// Fixed-delay definition without a run limit
    pub fn fixed_delay(initial_delay: Duration, delay: Duration) -> Self {
        Self::FixedDelay {
            initial_delay_ms: initial_delay.as_millis() as u64,
            delay_ms: delay.as_millis() as u64,
            max_runs: None,
        }
    }

    /// Check the definition without building it
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Once { .. } => Ok(()),
            Self::FixedRate { period_ms: 0, .. } => Err(SchedulerError::InvalidConfig(
                "fixed_rate trigger needs period_ms > 0".to_string(),
            )),
            Self::FixedDelay { delay_ms: 0, .. } => Err(SchedulerError::InvalidConfig(
                "fixed_delay trigger needs delay_ms > 0".to_string(),
            )),
            Self::FixedRate {
                max_runs: Some(0), ..
            }
            | Self::FixedDelay {
                max_runs: Some(0), ..
            } => Err(SchedulerError::InvalidConfig(
                "max_runs must be at least 1".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Build the trigger this definition describes
    pub fn build(&self) -> Result<Box<dyn Trigger>> {
        self.validate()?;
        let trigger: Box<dyn Trigger> = match *self {
            Self::Once { delay_ms } => Box::new(OnceTrigger::new(Duration::from_millis(delay_ms))),
            Self::FixedRate {
                initial_delay_ms,
                period_ms,
                max_runs,
            } => limited(
                FixedRateTrigger::new(
                    Duration::from_millis(initial_delay_ms),
                    Duration::from_millis(period_ms),
                ),
                max_runs,
            ),
            Self::FixedDelay {
                initial_delay_ms,
                delay_ms,
                max_runs,
            } => limited(
                FixedDelayTrigger::new(
                    Duration::from_millis(initial_delay_ms),
                    Duration::from_millis(delay_ms),
                ),
                max_runs,
            ),
        };
        Ok(trigger)
    }
}

fn limited<T: Trigger>(trigger: T, max_runs: Option<u64>) -> Box<dyn Trigger> {
    match max_runs {
        Some(max) => Box::new(MaxRuns::new(trigger, max)),
        None => Box::new(trigger),
    }
}

#[cfg(test)]
mod tests;
