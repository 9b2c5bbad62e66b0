//! End-to-end scheduling scenarios on a paused tokio clock.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cadence_core::{
    ChainState, ExecutionError, ExecutionRecord, FixedRateTrigger, MaxRuns, Scheduler,
    SchedulerConfig, Trigger, TriggerError,
};
use chrono::{DateTime, Utc};
use tokio::time::{sleep, timeout, Instant};
use tokio_test::{assert_pending, assert_ready};

type TriggerResult<T> = std::result::Result<T, TriggerError>;

fn scheduler() -> Scheduler {
    Scheduler::new(SchedulerConfig::default()).unwrap()
}

/// `now, now+1s, now+2s, none`
struct ThreeTicks;

impl Trigger for ThreeTicks {
    fn next_run_time(
        &self,
        last: Option<&ExecutionRecord>,
        scheduled_origin: DateTime<Utc>,
    ) -> TriggerResult<Option<DateTime<Utc>>> {
        match last {
            None => Ok(Some(scheduled_origin)),
            Some(last) if last.iteration() < 3 => {
                Ok(Some(scheduled_origin + chrono::Duration::seconds(1)))
            }
            Some(_) => Ok(None),
        }
    }
}

/// `now`, then one second after the previous run ended
struct AfterRunEnd;

impl Trigger for AfterRunEnd {
    fn next_run_time(
        &self,
        last: Option<&ExecutionRecord>,
        scheduled_origin: DateTime<Utc>,
    ) -> TriggerResult<Option<DateTime<Utc>>> {
        let from = match last {
            None => return Ok(Some(scheduled_origin)),
            Some(last) => last.run_end().unwrap_or(scheduled_origin),
        };
        Ok(Some(from + chrono::Duration::seconds(1)))
    }
}

/// Runs every second until a run fails
struct UntilFailure;

impl Trigger for UntilFailure {
    fn next_run_time(
        &self,
        last: Option<&ExecutionRecord>,
        scheduled_origin: DateTime<Utc>,
    ) -> TriggerResult<Option<DateTime<Utc>>> {
        match last {
            None => Ok(Some(scheduled_origin)),
            Some(last) if last.failed() => Ok(None),
            Some(_) => Ok(Some(scheduled_origin + chrono::Duration::seconds(1))),
        }
    }
}

/// Every `period_ms`, forever, skipping the listed candidates
struct SkipSome {
    period_ms: i64,
    skip: &'static [u64],
}

impl Trigger for SkipSome {
    fn next_run_time(
        &self,
        last: Option<&ExecutionRecord>,
        scheduled_origin: DateTime<Utc>,
    ) -> TriggerResult<Option<DateTime<Utc>>> {
        Ok(Some(match last {
            None => scheduled_origin,
            Some(_) => scheduled_origin + chrono::Duration::milliseconds(self.period_ms),
        }))
    }

    fn skip_run(
        &self,
        last: Option<&ExecutionRecord>,
        _candidate: DateTime<Utc>,
    ) -> TriggerResult<bool> {
        let iteration = last.map(|l| l.iteration()).unwrap_or(0) + 1;
        Ok(self.skip.contains(&iteration))
    }
}

#[tokio::test(start_paused = true)]
async fn test_scenario_a_three_runs_then_terminated() {
    let scheduler = scheduler();
    let counter = Arc::new(AtomicU64::new(0));

    let handle = {
        let counter = counter.clone();
        scheduler
            .schedule(
                move || {
                    let counter = counter.clone();
                    async move { Ok(counter.fetch_add(1, Ordering::SeqCst) + 1) }
                },
                ThreeTicks,
            )
            .unwrap()
    };

    sleep(Duration::from_millis(2500)).await;

    assert_eq!(counter.load(Ordering::SeqCst), 3);
    assert_eq!(handle.state(), ChainState::Terminated);
    assert!(handle.is_done());
    assert!(!handle.is_cancelled());
    assert_eq!(handle.get().await.unwrap(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_scenario_b_delay_after_run_end_then_interrupt() {
    let scheduler = scheduler();
    let counter = Arc::new(AtomicU64::new(0));

    let handle = {
        let counter = counter.clone();
        scheduler
            .schedule(
                move || {
                    let counter = counter.clone();
                    async move { Ok(counter.fetch_add(1, Ordering::SeqCst) + 1) }
                },
                AfterRunEnd,
            )
            .unwrap()
    };

    sleep(Duration::from_secs(5)).await;

    let runs = handle.get().await.unwrap();
    assert!((5..=6).contains(&runs), "unexpected run count {runs}");
    assert_eq!(counter.load(Ordering::SeqCst), runs);

    assert!(handle.cancel(true));
    sleep(Duration::from_secs(2)).await;

    assert!(handle.is_done());
    assert!(handle.is_cancelled());
    assert_eq!(counter.load(Ordering::SeqCst), runs);
}

#[tokio::test(start_paused = true)]
async fn test_scenario_c_get_waits_for_delay_plus_body() {
    let scheduler = scheduler();
    let start = Instant::now();

    let handle = scheduler
        .schedule_once(
            || async {
                sleep(Duration::from_secs(4)).await;
                Ok("report")
            },
            Duration::from_secs(2),
        )
        .unwrap();

    assert_eq!(handle.get().await.unwrap(), "report");

    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(6), "returned after {elapsed:?}");
    assert!(elapsed < Duration::from_millis(6100), "returned after {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn test_scenario_d_failure_ends_chain() {
    let scheduler = scheduler();
    let calls = Arc::new(AtomicU64::new(0));

    let handle = {
        let calls = calls.clone();
        scheduler
            .schedule(
                move || {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Err::<(), _>(anyhow::anyhow!("disk full"))
                    }
                },
                UntilFailure,
            )
            .unwrap()
    };

    handle.wait_done().await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(handle.executions(), 1);
    assert!(!handle.is_cancelled());
    match handle.get().await {
        Err(ExecutionError::TaskFailed(e)) => assert_eq!(e.to_string(), "disk full"),
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(handle.last_record().unwrap().failed());
}

#[tokio::test(start_paused = true)]
async fn test_iterations_never_overlap() {
    let scheduler = scheduler();
    let active = Arc::new(AtomicUsize::new(0));
    let spans = Arc::new(Mutex::new(Vec::new()));

    let task = {
        let active = active.clone();
        let spans = spans.clone();
        move || {
            let active = active.clone();
            let spans = spans.clone();
            async move {
                let concurrent = active.fetch_add(1, Ordering::SeqCst) + 1;
                let started = Instant::now();
                sleep(Duration::from_millis(250)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                spans.lock().unwrap().push((started, Instant::now()));
                Ok(concurrent)
            }
        }
    };
    // Period shorter than the body: slots are missed, never overlapped.
    let trigger = MaxRuns::new(
        FixedRateTrigger::new(Duration::ZERO, Duration::from_millis(100)),
        5,
    );

    let handle = scheduler.schedule(task, trigger).unwrap();
    handle.wait_done().await;

    assert_eq!(handle.get().await.unwrap(), 1);
    let spans = spans.lock().unwrap();
    assert_eq!(spans.len(), 5);
    for pair in spans.windows(2) {
        assert!(pair[1].0 >= pair[0].1, "iterations overlapped: {pair:?}");
    }
}

#[tokio::test(start_paused = true)]
async fn test_skipped_candidates_keep_chain_going() {
    let scheduler = scheduler();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let task = {
        let seen = seen.clone();
        move || {
            let seen = seen.clone();
            async move {
                seen.lock().unwrap().push(Instant::now());
                Ok(())
            }
        }
    };
    let handle = scheduler
        .schedule(
            task,
            SkipSome {
                period_ms: 100,
                skip: &[2, 3],
            },
        )
        .unwrap();

    sleep(Duration::from_millis(450)).await;

    // Candidates 1..=5 were due; 2 and 3 were skipped.
    assert_eq!(seen.lock().unwrap().len(), 3);
    assert_eq!(handle.executions(), 3);
    assert_eq!(handle.last_record().unwrap().iteration(), 5);

    handle.cancel(false);
    handle.wait_done().await;
}

#[tokio::test(start_paused = true)]
async fn test_cancel_stops_endless_chain() {
    let scheduler = scheduler();
    let counter = Arc::new(AtomicU64::new(0));

    let handle = {
        let counter = counter.clone();
        scheduler
            .schedule_at_fixed_rate(
                move || {
                    let counter = counter.clone();
                    async move {
                        sleep(Duration::from_millis(50)).await;
                        Ok(counter.fetch_add(1, Ordering::SeqCst) + 1)
                    }
                },
                Duration::ZERO,
                Duration::from_millis(100),
            )
            .unwrap()
    };

    sleep(Duration::from_millis(1020)).await;
    assert!(handle.cancel(false));

    timeout(Duration::from_secs(1), handle.wait_done())
        .await
        .expect("chain did not terminate");
    assert!(handle.is_done());
    assert!(handle.is_cancelled());

    let after_cancel = counter.load(Ordering::SeqCst);
    sleep(Duration::from_secs(5)).await;
    assert_eq!(counter.load(Ordering::SeqCst), after_cancel);
    assert_eq!(scheduler.live_chains(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_get_waits_for_latest_started_iteration() {
    let scheduler = scheduler();
    let counter = Arc::new(AtomicU64::new(0));

    let handle = {
        let counter = counter.clone();
        scheduler
            .schedule_at_fixed_rate(
                move || {
                    let counter = counter.clone();
                    async move {
                        let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                        sleep(Duration::from_millis(500)).await;
                        Ok(n)
                    }
                },
                Duration::ZERO,
                Duration::from_secs(1),
            )
            .unwrap()
    };

    // Iteration 1 ran 0.0-0.5s, iteration 2 is running since 1.0s.
    sleep(Duration::from_millis(1200)).await;
    assert_eq!(handle.executions(), 2);

    let mut get = tokio_test::task::spawn(handle.get());
    assert_pending!(get.poll());

    sleep(Duration::from_millis(400)).await;
    assert_eq!(assert_ready!(get.poll()).unwrap(), 2);
    drop(get);

    // Between iterations, get answers immediately with the latest result.
    let mut get = tokio_test::task::spawn(handle.get());
    assert_eq!(assert_ready!(get.poll()).unwrap(), 2);
    drop(get);

    handle.cancel(true);
    handle.wait_done().await;
}

#[tokio::test(start_paused = true)]
async fn test_sibling_chains_unaffected_by_failure() {
    let scheduler = scheduler();

    let failing = scheduler
        .submit(|| async { Err::<u32, _>(anyhow::anyhow!("broken")) })
        .unwrap();
    let healthy = scheduler
        .schedule_once(|| async { Ok(42u32) }, Duration::from_millis(10))
        .unwrap();

    assert!(matches!(
        failing.get().await,
        Err(ExecutionError::TaskFailed(_))
    ));
    assert_eq!(healthy.get().await.unwrap(), 42);
    assert_eq!(scheduler.available_workers(), scheduler.config().pool_size);
}
