//! Shared per-attempt operation state and the context handed to operation bodies.

use super::executable::{Executable, Operation, OperationHandle};
use super::queue::OperationQueue;
use super::states::{OperationKind, OperationOutcome, OperationState};
use crate::error::PipelineError;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

/// State shared between an operation attempt, its queue and its handle.
///
/// Every attempt of a retryable operation gets its own core; the cancel flag is
/// a watch channel so bodies and timers can await it.
#[derive(Debug)]
pub struct OperationCore {
    id: Uuid,
    kind: OperationKind,
    state: Mutex<OperationState>,
    cancel_tx: watch::Sender<bool>,
    sub_operations: Mutex<Vec<Uuid>>,
    error: Mutex<Option<PipelineError>>,
}

impl OperationCore {
    pub(crate) fn new(kind: OperationKind) -> Arc<Self> {
        let (cancel_tx, _) = watch::channel(false);
        Arc::new(Self {
            id: Uuid::new_v4(),
            kind,
            state: Mutex::new(OperationState::Created),
            cancel_tx,
            sub_operations: Mutex::new(Vec::new()),
            error: Mutex::new(None),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> &OperationKind {
        &self.kind
    }

    pub fn state(&self) -> OperationState {
        *self.state.lock()
    }

    /// Apply a state transition; illegal transitions are refused and return false
    pub(crate) fn transition(&self, target: OperationState) -> bool {
        let mut state = self.state.lock();
        if state.can_transition_to(target) {
            *state = target;
            true
        } else {
            debug!(
                operation_id = %self.id,
                kind = %self.kind,
                from = %*state,
                to = %target,
                "Ignoring refused operation state transition"
            );
            false
        }
    }

    /// Set the cooperative cancel flag.
    ///
    /// Operations that have not started yet move straight to `Cancelled`;
    /// an executing body keeps running until it observes the flag.
    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
        let mut state = self.state.lock();
        if matches!(*state, OperationState::Created | OperationState::Pending) {
            *state = OperationState::Cancelled;
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_tx.borrow()
    }

    /// Resolve once the cancel flag is set
    pub async fn cancelled(&self) {
        let mut receiver = self.cancel_tx.subscribe();
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }

    pub(crate) fn record_sub_operation(&self, id: Uuid) {
        self.sub_operations.lock().push(id);
    }

    /// Ids of operations this attempt spawned while executing
    pub fn sub_operations(&self) -> Vec<Uuid> {
        self.sub_operations.lock().clone()
    }

    pub(crate) fn record_error(&self, error: PipelineError) {
        *self.error.lock() = Some(error);
    }

    /// Last error recorded for this attempt
    pub fn error(&self) -> Option<PipelineError> {
        self.error.lock().clone()
    }

    pub fn descriptor(&self) -> OperationDescriptor {
        OperationDescriptor {
            id: self.id,
            kind: self.kind.clone(),
        }
    }
}

/// Read-only view of an operation handed to conditions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationDescriptor {
    pub id: Uuid,
    pub kind: OperationKind,
}

/// What an operation body can see and do while it executes
#[derive(Debug, Clone)]
pub struct OperationContext {
    core: Arc<OperationCore>,
    queue: OperationQueue,
    retry_counter: Option<i32>,
}

impl OperationContext {
    pub(crate) fn new(
        core: Arc<OperationCore>,
        queue: OperationQueue,
        retry_counter: Option<i32>,
    ) -> Self {
        Self {
            core,
            queue,
            retry_counter,
        }
    }

    pub fn id(&self) -> Uuid {
        self.core.id()
    }

    pub fn kind(&self) -> &OperationKind {
        self.core.kind()
    }

    pub fn is_cancelled(&self) -> bool {
        self.core.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.core.cancelled().await
    }

    /// Retry counter of the current attempt, `None` for non-retryable operations
    pub fn retry_counter(&self) -> Option<i32> {
        self.retry_counter
    }

    /// Queue this operation is executing on
    pub fn queue(&self) -> &OperationQueue {
        &self.queue
    }

    /// Enqueue a child operation and record it as produced by this one
    pub fn submit_sub_operation<E: Executable>(
        &self,
        operation: Operation<E>,
        handle_queue: &OperationQueue,
    ) {
        self.core.record_sub_operation(operation.id());
        debug!(
            parent_id = %self.core.id(),
            child_id = %operation.id(),
            queue = %handle_queue.name(),
            "Submitting sub-operation"
        );
        handle_queue.enqueue(operation);
    }

    /// Wait for a child operation, cancelling it if this operation is cancelled first
    pub async fn await_sub_operation<T>(&self, handle: OperationHandle<T>) -> OperationOutcome<T> {
        let canceller = handle.canceller();
        let outcome = handle.outcome();
        tokio::pin!(outcome);

        tokio::select! {
            result = &mut outcome => result,
            _ = self.cancelled() => {
                canceller.cancel();
                outcome.await
            }
        }
    }

    /// Submit a child operation and wait for its outcome
    pub async fn run_sub_operation<E: Executable>(
        &self,
        operation: Operation<E>,
        handle: OperationHandle<E::Output>,
        queue: &OperationQueue,
    ) -> OperationOutcome<E::Output> {
        self.submit_sub_operation(operation, queue);
        self.await_sub_operation(handle).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_before_start_moves_to_cancelled() {
        let core = OperationCore::new(OperationKind::new("test"));
        assert!(core.transition(OperationState::Pending));
        core.cancel();
        assert!(core.is_cancelled());
        assert_eq!(core.state(), OperationState::Cancelled);
        assert!(!core.transition(OperationState::Executing));
    }

    #[test]
    fn test_cancel_while_executing_keeps_state() {
        let core = OperationCore::new(OperationKind::new("test"));
        core.transition(OperationState::Pending);
        core.transition(OperationState::Executing);
        core.cancel();
        assert_eq!(core.state(), OperationState::Executing);
        assert!(core.transition(OperationState::Cancelled));
        assert!(!core.transition(OperationState::Finished));
    }

    #[tokio::test]
    async fn test_cancelled_future_resolves() {
        let core = OperationCore::new(OperationKind::new("test"));
        let waiter = {
            let core = core.clone();
            tokio::spawn(async move { core.cancelled().await })
        };
        core.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .expect("cancelled() should resolve")
            .unwrap();
    }
}
