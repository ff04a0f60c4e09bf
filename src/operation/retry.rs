//! # Retry Driver
//!
//! Two-tier retry for failed operation attempts:
//!
//! - **Reachability-gated**: when the network is down at failure time the attempt
//!   waits for connectivity and re-executes once, without spending retry budget
//!   and without a timer.
//! - **Counter-gated**: otherwise a fresh successor attempt is scheduled after a
//!   quadratic backoff, `backoff_unit * retry_number^2`, until `retry_limit` is
//!   exhausted.
//!
//! The driver only decides. Scheduling the successor and waiting for
//! reachability happen in the operation runner.

use crate::error::PipelineError;
use crate::reachability::ReachabilityMonitor;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const DEFAULT_BACKOFF_UNIT: Duration = Duration::from_secs(1);
const DEFAULT_REACHABILITY_TIMEOUT: Duration = Duration::from_secs(60);

/// Immutable retry configuration shared by all attempts of one operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    retry_limit: u32,
    backoff_unit: Duration,
    reachability_timeout: Option<Duration>,
}

impl RetryPolicy {
    pub fn new(retry_limit: u32) -> Self {
        Self {
            retry_limit,
            backoff_unit: DEFAULT_BACKOFF_UNIT,
            reachability_timeout: Some(DEFAULT_REACHABILITY_TIMEOUT),
        }
    }

    /// Policy that never reschedules
    pub fn no_retry() -> Self {
        Self::new(0)
    }

    pub fn with_retry_limit(mut self, retry_limit: u32) -> Self {
        self.retry_limit = retry_limit;
        self
    }

    pub fn with_backoff_unit(mut self, backoff_unit: Duration) -> Self {
        self.backoff_unit = backoff_unit;
        self
    }

    pub fn with_reachability_timeout(mut self, timeout: Duration) -> Self {
        self.reachability_timeout = Some(timeout);
        self
    }

    /// Wait for connectivity indefinitely
    pub fn without_reachability_timeout(mut self) -> Self {
        self.reachability_timeout = None;
        self
    }

    pub fn retry_limit(&self) -> u32 {
        self.retry_limit
    }

    pub fn backoff_unit(&self) -> Duration {
        self.backoff_unit
    }

    pub fn reachability_timeout(&self) -> Option<Duration> {
        self.reachability_timeout
    }

    /// Delay before the given retry (1-based): `backoff_unit * retry_number^2`
    pub fn delay_for_attempt(&self, retry_number: u32) -> Duration {
        self.backoff_unit
            .saturating_mul(retry_number.saturating_mul(retry_number))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(crate::constants::DEFAULT_RETRY_LIMIT)
    }
}

/// Per-attempt retry bookkeeping carried from one attempt to its successor
#[derive(Debug, Clone, PartialEq)]
pub struct RetryState {
    pub retry_limit: u32,
    /// Starts at -1 and is incremented at the start of each counted attempt
    pub retry_counter: i32,
    pub current_error: Option<PipelineError>,
}

impl RetryState {
    pub fn new(retry_limit: u32) -> Self {
        Self {
            retry_limit,
            retry_counter: -1,
            current_error: None,
        }
    }

    fn has_budget(&self) -> bool {
        i64::from(self.retry_counter) < i64::from(self.retry_limit)
    }
}

/// What to do after a failed attempt
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// Network is down: wait for it and re-execute the same attempt
    AwaitReachability,
    /// Schedule a fresh successor attempt after the delay
    Reschedule(Duration),
    /// Surface this error as the terminal outcome
    GiveUp(PipelineError),
}

/// Retry state machine wrapped around any executable
pub struct RetryDriver {
    policy: RetryPolicy,
    state: RetryState,
    reachability: Arc<dyn ReachabilityMonitor>,
    reexecuting: bool,
}

impl fmt::Debug for RetryDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryDriver")
            .field("policy", &self.policy)
            .field("state", &self.state)
            .field("reexecuting", &self.reexecuting)
            .finish()
    }
}

impl RetryDriver {
    pub fn new(policy: RetryPolicy, reachability: Arc<dyn ReachabilityMonitor>) -> Self {
        Self {
            state: RetryState::new(policy.retry_limit),
            policy,
            reachability,
            reexecuting: false,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn state(&self) -> &RetryState {
        &self.state
    }

    pub fn retry_counter(&self) -> i32 {
        self.state.retry_counter
    }

    pub fn reachability(&self) -> &Arc<dyn ReachabilityMonitor> {
        &self.reachability
    }

    /// Mark the start of an execution attempt.
    ///
    /// A re-execution after a reachability wait does not consume a retry slot.
    pub fn begin_attempt(&mut self) {
        if self.reexecuting {
            self.reexecuting = false;
        } else {
            self.state.retry_counter += 1;
        }
    }

    /// Decide how to continue after a failed attempt.
    ///
    /// `retryable` comes from the executable's pure error classifier.
    pub fn decide(&mut self, error: PipelineError, retryable: bool) -> RetryDecision {
        self.state.current_error = Some(error.clone());

        if !retryable {
            debug!(
                retry_counter = self.state.retry_counter,
                error = %error,
                "Error is not retryable"
            );
            return RetryDecision::GiveUp(error);
        }

        if self.state.retry_limit > 0 && !self.reachability.is_reachable() {
            info!(
                retry_counter = self.state.retry_counter,
                error = %error,
                "📡 RETRY: Network unreachable, waiting for connectivity"
            );
            self.reexecuting = true;
            return RetryDecision::AwaitReachability;
        }

        if self.state.has_budget() {
            let retry_number = u32::try_from(self.state.retry_counter + 1).unwrap_or(u32::MAX);
            let delay = self.policy.delay_for_attempt(retry_number);
            info!(
                retry_counter = self.state.retry_counter,
                retry_limit = self.state.retry_limit,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "🔄 RETRY: Scheduling retry"
            );
            return RetryDecision::Reschedule(delay);
        }

        info!(
            retry_counter = self.state.retry_counter,
            retry_limit = self.state.retry_limit,
            error = %error,
            "Retry limit exhausted"
        );
        RetryDecision::GiveUp(error)
    }

    /// Last error recorded by [`decide`](Self::decide)
    pub fn take_error(&mut self) -> Option<PipelineError> {
        self.state.current_error.take()
    }

    /// Driver for the next attempt: same policy, counter and last error
    pub fn successor(&self) -> RetryDriver {
        RetryDriver {
            policy: self.policy.clone(),
            state: self.state.clone(),
            reachability: self.reachability.clone(),
            reexecuting: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reachability::NetworkReachability;

    fn driver(limit: u32, reachable: bool) -> RetryDriver {
        RetryDriver::new(
            RetryPolicy::new(limit).with_backoff_unit(Duration::from_millis(10)),
            Arc::new(NetworkReachability::new(reachable)),
        )
    }

    #[test]
    fn test_counter_gated_until_limit() {
        let mut driver = driver(2, true);
        let error = PipelineError::network("reset");

        driver.begin_attempt();
        assert_eq!(driver.retry_counter(), 0);
        assert_eq!(
            driver.decide(error.clone(), true),
            RetryDecision::Reschedule(Duration::from_millis(10))
        );

        let mut driver = driver.successor();
        driver.begin_attempt();
        assert_eq!(
            driver.decide(error.clone(), true),
            RetryDecision::Reschedule(Duration::from_millis(40))
        );

        let mut driver = driver.successor();
        driver.begin_attempt();
        assert_eq!(driver.retry_counter(), 2);
        assert_eq!(driver.decide(error.clone(), true), RetryDecision::GiveUp(error));
    }

    #[test]
    fn test_non_retryable_gives_up_immediately() {
        let mut driver = driver(5, true);
        driver.begin_attempt();
        let error = PipelineError::Authorization {
            message: "bad key".to_string(),
        };
        assert_eq!(driver.decide(error.clone(), false), RetryDecision::GiveUp(error));
    }

    #[test]
    fn test_unreachable_does_not_consume_budget() {
        let mut driver = driver(1, false);
        driver.begin_attempt();
        assert_eq!(
            driver.decide(PipelineError::network("offline"), true),
            RetryDecision::AwaitReachability
        );
        driver.begin_attempt();
        assert_eq!(driver.retry_counter(), 0);
    }

    #[test]
    fn test_zero_limit_skips_reachability_wait() {
        let mut driver = driver(0, false);
        driver.begin_attempt();
        let error = PipelineError::network("offline");
        assert_eq!(driver.decide(error.clone(), true), RetryDecision::GiveUp(error));
    }

    #[test]
    fn test_successor_carries_last_error() {
        let mut driver = driver(3, true);
        driver.begin_attempt();
        driver.decide(PipelineError::network("first"), true);
        let successor = driver.successor();
        assert_eq!(
            successor.state().current_error,
            Some(PipelineError::network("first"))
        );
        assert_eq!(successor.retry_counter(), 0);
    }
}
