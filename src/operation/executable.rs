//! # Operation Runner
//!
//! [`Operation`] wraps an [`Executable`] unit of work with its conditions, an
//! optional [`RetryDriver`] and the completion channel behind its
//! [`OperationHandle`]. Queues drive operations through
//! [`Schedulable::run`]:
//!
//! 1. cancelled before start → `Cancelled`, nothing evaluated
//! 2. conditions in order; the first failure finishes the operation
//! 3. `Pending → Executing`, then the body
//! 4. on failure the retry driver decides: wait for reachability and re-run,
//!    schedule a fresh successor attempt, or give up
//!
//! A retry never re-runs the same attempt object: the successor gets a new id
//! and core, shares the immutable work via `Arc`, and inherits the handle's
//! completion sender.

use super::condition::{Condition, ConditionResult};
use super::core::{OperationContext, OperationCore};
use super::queue::OperationQueue;
use super::retry::{RetryDecision, RetryDriver, RetryPolicy};
use super::states::{OperationKind, OperationOutcome, OperationState};
use crate::error::{PipelineError, Result};
use crate::logging::{log_error, log_operation_event};
use crate::reachability::ReachabilityMonitor;
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A unit of work the pipeline can run
#[async_trait]
pub trait Executable: Send + Sync + 'static {
    type Output: Send + 'static;

    /// Kind tag used for exclusive admission; defaults to the concrete type name
    fn kind(&self) -> OperationKind {
        OperationKind::of::<Self>()
    }

    /// Operation body. Should check `ctx.is_cancelled()` at natural suspension points.
    async fn execute(&self, ctx: &OperationContext) -> Result<Self::Output>;

    /// Pure failure classifier consulted by the retry driver
    fn is_retryable(&self, error: &PipelineError) -> bool {
        error.is_retryable()
    }
}

type CurrentCore = Arc<Mutex<Arc<OperationCore>>>;

/// Object-safe view of an operation used by queues
#[async_trait]
pub(crate) trait Schedulable: Send + 'static {
    fn core(&self) -> &Arc<OperationCore>;

    async fn run(self: Box<Self>, queue: OperationQueue);

    /// Resolve as `Cancelled` without running
    fn reject(self: Box<Self>);
}

pub struct Operation<E: Executable> {
    core: Arc<OperationCore>,
    work: Arc<E>,
    conditions: Vec<Arc<dyn Condition>>,
    retry: Option<RetryDriver>,
    completion: Option<oneshot::Sender<OperationOutcome<E::Output>>>,
    current: CurrentCore,
}

impl<E: Executable> fmt::Debug for Operation<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("id", &self.core.id())
            .field("kind", self.core.kind())
            .field("state", &self.core.state())
            .field("conditions", &self.conditions.len())
            .field("retry", &self.retry)
            .finish()
    }
}

impl<E: Executable> Operation<E> {
    /// Build a single-attempt operation and the handle observing it
    pub fn new(work: E) -> (Self, OperationHandle<E::Output>) {
        let core = OperationCore::new(work.kind());
        let current = Arc::new(Mutex::new(core.clone()));
        let (sender, receiver) = oneshot::channel();

        let operation = Self {
            core,
            work: Arc::new(work),
            conditions: Vec::new(),
            retry: None,
            completion: Some(sender),
            current: current.clone(),
        };
        (operation, OperationHandle { current, receiver })
    }

    /// Build an operation that retries transient failures per `policy`
    pub fn retryable(
        work: E,
        policy: RetryPolicy,
        reachability: Arc<dyn ReachabilityMonitor>,
    ) -> (Self, OperationHandle<E::Output>) {
        let (operation, handle) = Self::new(work);
        (operation.with_retry(policy, reachability), handle)
    }

    pub fn with_retry(mut self, policy: RetryPolicy, reachability: Arc<dyn ReachabilityMonitor>) -> Self {
        self.retry = Some(RetryDriver::new(policy, reachability));
        self
    }

    pub fn with_condition(mut self, condition: impl Condition + 'static) -> Self {
        self.conditions.push(Arc::new(condition));
        self
    }

    pub fn with_shared_condition(mut self, condition: Arc<dyn Condition>) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn id(&self) -> Uuid {
        self.core.id()
    }

    pub fn kind(&self) -> &OperationKind {
        self.core.kind()
    }

    pub fn state(&self) -> OperationState {
        self.core.state()
    }

    pub(crate) fn core_arc(&self) -> Arc<OperationCore> {
        self.core.clone()
    }

    pub fn cancel(&self) {
        self.core.cancel();
    }

    pub fn condition_names(&self) -> Vec<String> {
        self.conditions.iter().map(|c| c.name().to_string()).collect()
    }

    fn finish(&mut self, outcome: OperationOutcome<E::Output>) {
        let target = match &outcome {
            OperationOutcome::Cancelled => OperationState::Cancelled,
            OperationOutcome::Failed(error) => {
                self.core.record_error(error.clone());
                OperationState::Finished
            }
            OperationOutcome::Succeeded(_) => OperationState::Finished,
        };
        self.core.transition(target);

        let operation_id = self.core.id().to_string();
        let kind = self.core.kind().to_string();
        if let OperationOutcome::Failed(error) = &outcome {
            log_error("operation", &kind, &error.to_string(), Some(&operation_id));
        }
        log_operation_event(&operation_id, &kind, None, &self.core.state().to_string(), None);

        // finish is idempotent: only the first outcome reaches the handle
        if let Some(sender) = self.completion.take() {
            let _ = sender.send(outcome);
        }
    }

    async fn evaluate_conditions(&self) -> std::result::Result<(), PipelineError> {
        let descriptor = self.core.descriptor();
        for condition in &self.conditions {
            if let ConditionResult::Failed(error) = condition.evaluate(&descriptor).await {
                let error = match error {
                    failed @ PipelineError::ConditionFailed { .. } => failed,
                    other => PipelineError::condition_failed(condition.name(), other.to_string()),
                };
                warn!(
                    operation_id = %self.core.id(),
                    kind = %self.core.kind(),
                    condition = condition.name(),
                    error = %error,
                    "Condition failed, operation body will not run"
                );
                return Err(error);
            }
        }
        Ok(())
    }

    async fn drive(mut self, queue: OperationQueue) {
        if self.core.is_cancelled() {
            self.finish(OperationOutcome::Cancelled);
            return;
        }

        if let Err(error) = self.evaluate_conditions().await {
            self.finish(OperationOutcome::Failed(error));
            return;
        }

        if self.core.is_cancelled() || !self.core.transition(OperationState::Executing) {
            self.finish(OperationOutcome::Cancelled);
            return;
        }

        loop {
            if let Some(driver) = self.retry.as_mut() {
                driver.begin_attempt();
            }
            let retry_counter = self.retry.as_ref().map(RetryDriver::retry_counter);

            debug!(
                operation_id = %self.core.id(),
                kind = %self.core.kind(),
                queue = %queue.name(),
                retry_counter = ?retry_counter,
                "Executing operation"
            );

            let ctx = OperationContext::new(self.core.clone(), queue.clone(), retry_counter);
            let result = self.work.execute(&ctx).await;

            if self.core.is_cancelled() {
                self.finish(OperationOutcome::Cancelled);
                return;
            }

            let error = match result {
                Ok(output) => {
                    self.finish(OperationOutcome::Succeeded(output));
                    return;
                }
                Err(PipelineError::Cancelled) => {
                    self.finish(OperationOutcome::Cancelled);
                    return;
                }
                Err(error) => error,
            };

            let retryable = self.work.is_retryable(&error);
            let decision = match self.retry.as_mut() {
                Some(driver) => driver.decide(error, retryable),
                None => RetryDecision::GiveUp(error),
            };

            match decision {
                RetryDecision::GiveUp(error) => {
                    self.finish(OperationOutcome::Failed(error));
                    return;
                }
                RetryDecision::Reschedule(delay) => {
                    self.reschedule(queue, delay);
                    return;
                }
                RetryDecision::AwaitReachability => {
                    if !self.await_reachability().await {
                        return;
                    }
                }
            }
        }
    }

    /// Wait for connectivity; false when the operation was finished instead
    async fn await_reachability(&mut self) -> bool {
        let Some(driver) = self.retry.as_ref() else {
            return true;
        };
        let reachability = driver.reachability().clone();
        let timeout = driver.policy().reachability_timeout();

        let wait = async {
            match timeout {
                Some(limit) => tokio::time::timeout(limit, reachability.wait_until_reachable())
                    .await
                    .is_ok(),
                None => {
                    reachability.wait_until_reachable().await;
                    true
                }
            }
        };

        let core = self.core.clone();
        let reachable = tokio::select! {
            reachable = wait => Some(reachable),
            _ = core.cancelled() => None,
        };

        match reachable {
            None => {
                self.finish(OperationOutcome::Cancelled);
                false
            }
            Some(true) => {
                info!(
                    operation_id = %self.core.id(),
                    kind = %self.core.kind(),
                    "📡 RETRY: Network reachable again, re-executing"
                );
                true
            }
            Some(false) => {
                let error = self
                    .retry
                    .as_mut()
                    .and_then(RetryDriver::take_error)
                    .unwrap_or_else(|| PipelineError::network("network unreachable"));
                warn!(
                    operation_id = %self.core.id(),
                    kind = %self.core.kind(),
                    error = %error,
                    "Gave up waiting for network reachability"
                );
                self.finish(OperationOutcome::Failed(error));
                false
            }
        }
    }

    /// Hand the remaining work to a fresh attempt scheduled after `delay`
    fn reschedule(mut self, queue: OperationQueue, delay: Duration) {
        let Some(driver) = self.retry.as_ref() else {
            return;
        };
        let successor_driver = driver.successor();
        let successor_core = OperationCore::new(self.core.kind().clone());
        successor_core.transition(OperationState::Pending);

        // Tracking before the cancel check closes the race with cancel_all
        queue.track(successor_core.clone());
        {
            let mut current = self.current.lock();
            if self.core.is_cancelled() {
                drop(current);
                successor_core.cancel();
                self.finish(OperationOutcome::Cancelled);
                return;
            }
            *current = successor_core.clone();
        }

        if let Some(error) = successor_driver.state().current_error.clone() {
            self.core.record_error(error);
        }
        self.core.transition(OperationState::Finished);

        let successor = Operation {
            core: successor_core.clone(),
            work: self.work.clone(),
            conditions: self.conditions.clone(),
            retry: Some(successor_driver),
            completion: self.completion.take(),
            current: self.current.clone(),
        };

        debug!(
            operation_id = %self.core.id(),
            successor_id = %successor_core.id(),
            kind = %self.core.kind(),
            queue = %queue.name(),
            delay_ms = delay.as_millis() as u64,
            "Successor attempt scheduled"
        );

        let timer_queue = queue.clone();
        queue.spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => timer_queue.dispatch(Box::new(successor)),
                _ = successor_core.cancelled() => Box::new(successor).reject(),
            }
        });
    }
}

#[async_trait]
impl<E: Executable> Schedulable for Operation<E> {
    fn core(&self) -> &Arc<OperationCore> {
        &self.core
    }

    async fn run(self: Box<Self>, queue: OperationQueue) {
        (*self).drive(queue).await
    }

    fn reject(mut self: Box<Self>) {
        self.core.cancel();
        self.finish(OperationOutcome::Cancelled);
    }
}

/// Caller-side view of an operation, following retries to the newest attempt
pub struct OperationHandle<T> {
    current: CurrentCore,
    receiver: oneshot::Receiver<OperationOutcome<T>>,
}

impl<T> fmt::Debug for OperationHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.current.lock();
        f.debug_struct("OperationHandle")
            .field("id", &core.id())
            .field("kind", core.kind())
            .field("state", &core.state())
            .finish()
    }
}

impl<T> OperationHandle<T> {
    /// Id of the current attempt
    pub fn id(&self) -> Uuid {
        self.current.lock().id()
    }

    pub fn kind(&self) -> OperationKind {
        self.current.lock().kind().clone()
    }

    pub fn state(&self) -> OperationState {
        self.current.lock().state()
    }

    /// Cancel the current attempt, including one waiting on a retry timer
    pub fn cancel(&self) {
        self.current.lock().cancel();
    }

    pub fn canceller(&self) -> OperationCanceller {
        OperationCanceller {
            current: self.current.clone(),
        }
    }

    /// Wait for the final outcome.
    ///
    /// An operation dropped without finishing (its queue went away) reports `Cancelled`.
    pub async fn outcome(self) -> OperationOutcome<T> {
        self.receiver.await.unwrap_or(OperationOutcome::Cancelled)
    }
}

/// Cloneable cancel trigger detached from the handle's outcome
#[derive(Clone)]
pub struct OperationCanceller {
    current: CurrentCore,
}

impl OperationCanceller {
    pub fn cancel(&self) {
        self.current.lock().cancel();
    }
}

/// An [`Executable`] built from a kind and an async closure
pub struct BlockOperation<T> {
    kind: OperationKind,
    #[allow(clippy::type_complexity)]
    block: Box<dyn Fn(OperationContext) -> BoxFuture<'static, Result<T>> + Send + Sync>,
}

impl<T: Send + 'static> BlockOperation<T> {
    pub fn new<F, Fut>(kind: OperationKind, block: F) -> Self
    where
        F: Fn(OperationContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        Self {
            kind,
            block: Box::new(move |ctx| block(ctx).boxed()),
        }
    }
}

#[async_trait]
impl<T: Send + 'static> Executable for BlockOperation<T> {
    type Output = T;

    fn kind(&self) -> OperationKind {
        self.kind.clone()
    }

    async fn execute(&self, ctx: &OperationContext) -> Result<T> {
        (self.block)(ctx.clone()).await
    }
}
