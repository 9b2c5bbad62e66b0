
    use super::*;
    use crate::scheduler::record::Outcome;

    fn at(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_700_000_000_000 + ms).unwrap()
    }

    fn ran(iteration: u64, runs: u64, scheduled: i64, start: i64, end: i64) -> ExecutionRecord {
        ExecutionRecord::completed(
            "job",
            iteration,
            runs,
            at(scheduled),
            at(start),
            at(end),
            Outcome::Success,
        )
    }

    #[test]
    fn test_once_runs_single_time() {
        let trigger = OnceTrigger::new(Duration::from_secs(2));

        let first = trigger.next_run_time(None, at(0)).unwrap();
        assert_eq!(first, Some(at(2000)));

        let record = ran(1, 1, 2000, 2000, 6000);
        assert_eq!(trigger.next_run_time(Some(&record), at(2000)).unwrap(), None);
        assert!(!trigger.skip_run(None, at(2000)).unwrap());
    }

    #[test]
    fn test_fixed_rate_on_schedule() {
        let trigger = FixedRateTrigger::new(Duration::from_millis(500), Duration::from_secs(1));

        assert_eq!(trigger.next_run_time(None, at(0)).unwrap(), Some(at(500)));

        let record = ran(1, 1, 500, 500, 700);
        assert_eq!(
            trigger.next_run_time(Some(&record), at(500)).unwrap(),
            Some(at(1500))
        );
    }

    #[test]
    fn test_fixed_rate_overrun_drops_missed_slots() {
        let trigger = FixedRateTrigger::new(Duration::ZERO, Duration::from_secs(1));

        // Slot at 0 ran until 3.2s: slots 1s, 2s, 3s are gone, next is 4s.
        let record = ran(1, 1, 0, 0, 3200);
        assert_eq!(
            trigger.next_run_time(Some(&record), at(0)).unwrap(),
            Some(at(4000))
        );

        // Ending exactly on a slot keeps that slot.
        let record = ran(1, 1, 0, 0, 2000);
        assert_eq!(
            trigger.next_run_time(Some(&record), at(0)).unwrap(),
            Some(at(2000))
        );
    }

    #[test]
    fn test_fixed_rate_after_skip_keeps_alignment() {
        let trigger = FixedRateTrigger::new(Duration::ZERO, Duration::from_secs(1));
        let skipped = ExecutionRecord::skipped("job", 2, 1, at(1000));

        assert_eq!(
            trigger.next_run_time(Some(&skipped), at(1000)).unwrap(),
            Some(at(2000))
        );
    }

    #[test]
    fn test_fixed_delay_measures_from_run_end() {
        let trigger = FixedDelayTrigger::new(Duration::ZERO, Duration::from_secs(1));

        assert_eq!(trigger.next_run_time(None, at(0)).unwrap(), Some(at(0)));

        let record = ran(1, 1, 0, 0, 2500);
        assert_eq!(
            trigger.next_run_time(Some(&record), at(0)).unwrap(),
            Some(at(3500))
        );

        let skipped = ExecutionRecord::skipped("job", 2, 1, at(3500));
        assert_eq!(
            trigger.next_run_time(Some(&skipped), at(3500)).unwrap(),
            Some(at(4500))
        );
    }

    #[test]
    fn test_max_runs_counts_invocations_only() {
        let trigger = MaxRuns::new(
            FixedDelayTrigger::new(Duration::ZERO, Duration::from_secs(1)),
            2,
        );

        let first = ran(1, 1, 0, 0, 10);
        assert!(trigger.next_run_time(Some(&first), at(0)).unwrap().is_some());

        // A skip after one run still leaves one run to go.
        let skipped = ExecutionRecord::skipped("job", 2, 1, at(1010));
        assert!(trigger
            .next_run_time(Some(&skipped), at(1010))
            .unwrap()
            .is_some());

        let second = ran(3, 2, 2010, 2010, 2020);
        assert_eq!(trigger.next_run_time(Some(&second), at(2010)).unwrap(), None);
    }

    #[test]
    fn test_max_runs_zero_never_starts() {
        let trigger = MaxRuns::new(OnceTrigger::new(Duration::ZERO), 0);
        assert_eq!(trigger.next_run_time(None, at(0)).unwrap(), None);
    }

    #[test]
    fn test_run_time_past_calendar_end_is_an_error() {
        // In range for a chrono delta, but past the last representable date.
        let far = Duration::from_secs(9_000_000_000_000);
        let record = ran(1, 1, 0, 0, 10);

        let err = OnceTrigger::new(far).next_run_time(None, at(0)).unwrap_err();
        assert!(err.message().contains("out of range"), "{}", err);

        let rate = FixedRateTrigger::new(Duration::ZERO, far);
        assert_eq!(rate.next_run_time(None, at(0)).unwrap(), Some(at(0)));
        assert!(rate.next_run_time(Some(&record), at(0)).is_err());

        let delay = FixedDelayTrigger::new(Duration::ZERO, far);
        assert!(delay.next_run_time(Some(&record), at(0)).is_err());
        assert!(FixedDelayTrigger::new(far, far)
            .next_run_time(None, at(0))
            .is_err());
    }

    struct EveryOther;

    impl Trigger for EveryOther {
        fn next_run_time(
            &self,
            last: Option<&ExecutionRecord>,
            scheduled_origin: DateTime<Utc>,
        ) -> std::result::Result<Option<DateTime<Utc>>, TriggerError> {
            match last {
                Some(last) if last.iteration() >= 4 => Ok(None),
                _ => Ok(Some(scheduled_origin + ChronoDuration::seconds(1))),
            }
        }

        fn skip_run(
            &self,
            last: Option<&ExecutionRecord>,
            _candidate: DateTime<Utc>,
        ) -> std::result::Result<bool, TriggerError> {
            Ok(last.is_some_and(|l| !l.is_skipped()))
        }
    }

    #[test]
    fn test_boxed_and_shared_triggers_delegate() {
        let boxed: Box<dyn Trigger> = Box::new(EveryOther);
        let shared: Arc<dyn Trigger> = Arc::new(EveryOther);
        let record = ran(1, 1, 0, 0, 10);

        assert!(boxed.skip_run(Some(&record), at(1000)).unwrap());
        assert!(shared.skip_run(Some(&record), at(1000)).unwrap());
        assert_eq!(
            boxed.next_run_time(None, at(0)).unwrap(),
            shared.next_run_time(None, at(0)).unwrap()
        );
    }

    #[test]
    fn test_spec_build() {
        let trigger = TriggerSpec::fixed_rate(Duration::from_secs(1), Duration::from_secs(5))
            .build()
            .unwrap();
        assert_eq!(trigger.next_run_time(None, at(0)).unwrap(), Some(at(1000)));

        let limited = TriggerSpec::FixedDelay {
            initial_delay_ms: 0,
            delay_ms: 100,
            max_runs: Some(1),
        }
        .build()
        .unwrap();
        let record = ran(1, 1, 0, 0, 10);
        assert_eq!(limited.next_run_time(Some(&record), at(0)).unwrap(), None);
    }

    #[test]
    fn test_spec_validation() {
        assert!(TriggerSpec::fixed_rate(Duration::ZERO, Duration::ZERO)
            .validate()
            .is_err());
        assert!(TriggerSpec::fixed_delay(Duration::ZERO, Duration::ZERO)
            .build()
            .is_err());
        assert!(TriggerSpec::FixedRate {
            initial_delay_ms: 0,
            period_ms: 10,
            max_runs: Some(0),
        }
        .validate()
        .is_err());
        assert!(TriggerSpec::once(Duration::ZERO).validate().is_ok());
    }

    #[test]
    fn test_spec_serialization() {
        let spec: TriggerSpec =
            serde_json::from_str(r#"{"kind":"fixed_delay","delay_ms":1000,"max_runs":3}"#).unwrap();
        assert_eq!(
            spec,
            TriggerSpec::FixedDelay {
                initial_delay_ms: 0,
                delay_ms: 1000,
                max_runs: Some(3),
            }
        );

        let json = serde_json::to_string(&TriggerSpec::once(Duration::from_secs(2))).unwrap();
        assert_eq!(json, r#"{"kind":"once","delay_ms":2000}"#);
    }
