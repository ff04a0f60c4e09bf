use courier_core::error::PipelineError;
use courier_core::operation::{RetryDecision, RetryDriver, RetryPolicy};
use courier_core::reachability::NetworkReachability;
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

/// Drive a retry driver through consecutive transient failures, counting executions
fn attempts_until_give_up(retry_limit: u32) -> (u32, PipelineError) {
    let mut driver = RetryDriver::new(
        RetryPolicy::new(retry_limit),
        Arc::new(NetworkReachability::new(true)),
    );
    let mut attempts = 0;
    loop {
        driver.begin_attempt();
        attempts += 1;
        let error = PipelineError::network(format!("attempt {attempts}"));
        match driver.decide(error, true) {
            RetryDecision::Reschedule(_) => driver = driver.successor(),
            RetryDecision::GiveUp(error) => return (attempts, error),
            RetryDecision::AwaitReachability => unreachable!("network is reachable"),
        }
    }
}

proptest! {
    /// Property: backoff grows strictly with the retry number
    #[test]
    fn backoff_is_strictly_increasing(unit_ms in 1u64..10_000, retry_number in 1u32..1_000) {
        let policy = RetryPolicy::new(3).with_backoff_unit(Duration::from_millis(unit_ms));
        prop_assert!(policy.delay_for_attempt(retry_number) < policy.delay_for_attempt(retry_number + 1));
    }

    /// Property: delay is `unit * n^2`
    #[test]
    fn backoff_is_quadratic(retry_number in 1u32..100) {
        let policy = RetryPolicy::new(3);
        let expected = Duration::from_secs(u64::from(retry_number * retry_number));
        prop_assert_eq!(policy.delay_for_attempt(retry_number), expected);
    }

    /// Property: a retryable operation executes at most N+1 times and reports the last error
    #[test]
    fn attempts_are_bounded_by_retry_limit(retry_limit in 0u32..20) {
        let (attempts, error) = attempts_until_give_up(retry_limit);
        prop_assert_eq!(attempts, retry_limit + 1);
        prop_assert_eq!(error, PipelineError::network(format!("attempt {attempts}")));
    }

    /// Property: non-retryable failures end after the first attempt
    #[test]
    fn terminal_failures_never_reschedule(retry_limit in 0u32..20, status in 400u16..408) {
        let mut driver = RetryDriver::new(
            RetryPolicy::new(retry_limit),
            Arc::new(NetworkReachability::new(false)),
        );
        driver.begin_attempt();
        let error = courier_core::classify_http_status(status, "rejected");
        let retryable = error.is_retryable();
        prop_assert!(!retryable);
        prop_assert_eq!(driver.decide(error.clone(), retryable), RetryDecision::GiveUp(error));
    }
}
