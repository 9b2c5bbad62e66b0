
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_now_follows_tokio_time() {
        let clock = TokioClock::new();
        let before = clock.now();

        tokio::time::advance(Duration::from_secs(3)).await;

        let after = clock.now();
        assert_eq!((after - before).num_seconds(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_until_future_instant() {
        let clock = TokioClock::new();
        let start = Instant::now();
        let target = clock.now() + ChronoDuration::milliseconds(1500);

        clock.sleep_until(target).await;

        assert_eq!(start.elapsed(), Duration::from_millis(1500));
        assert!(clock.now() >= target);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_until_past_instant_is_immediate() {
        let clock = TokioClock::new();
        let start = Instant::now();

        clock
            .sleep_until(clock.now() - ChronoDuration::seconds(10))
            .await;

        assert_eq!(start.elapsed(), Duration::ZERO);
    }
