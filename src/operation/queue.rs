//! # Operation Queue
//!
//! FIFO admission with a per-queue concurrency limit. Each queue owns one
//! dispatcher task:
//!
//! ```text
//! enqueue → [mpsc] → dispatcher → [Semaphore permit] → spawn(run) → prune
//! ```
//!
//! The dispatcher acquires permits in arrival order, so a serial queue
//! (`max_concurrent == 1`) starts each body only after the previous operation
//! has delivered its outcome. The dispatcher starts lazily on first use, which
//! lets queues be constructed outside a runtime.
//!
//! The tracked set holds every outstanding operation core, including retry
//! successors waiting on their timer. Exclusive admission scans and admits
//! under that set's mutex.

use super::core::OperationCore;
use super::executable::{Executable, Operation, Schedulable};
use crate::config::QueueSettings;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info, warn};

/// Scheduling hint carried by a queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueuePriority {
    #[default]
    Default,
    UserInitiated,
}

#[derive(Debug, Clone)]
struct QueueOptions {
    name: String,
    max_concurrent: usize,
    priority: QueuePriority,
    runtime: Option<Handle>,
}

type Dispatch = Box<dyn Schedulable>;

struct QueueInner {
    options: QueueOptions,
    semaphore: Arc<Semaphore>,
    tracked: Mutex<Vec<Arc<OperationCore>>>,
    sender: mpsc::UnboundedSender<Dispatch>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Dispatch>>>,
}

impl QueueInner {
    fn prune(&self) {
        self.tracked.lock().retain(|core| core.state().is_outstanding());
    }
}

/// Cheaply cloneable handle to a queue
#[derive(Clone)]
pub struct OperationQueue {
    inner: Arc<QueueInner>,
}

impl fmt::Debug for OperationQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationQueue")
            .field("name", &self.inner.options.name)
            .field("max_concurrent", &self.inner.options.max_concurrent)
            .field("priority", &self.inner.options.priority)
            .finish()
    }
}

impl OperationQueue {
    fn from_options(options: QueueOptions) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(QueueInner {
                semaphore: Arc::new(Semaphore::new(options.max_concurrent.max(1))),
                options,
                tracked: Mutex::new(Vec::new()),
                sender,
                receiver: Mutex::new(Some(receiver)),
            }),
        }
    }

    /// Queue that runs one operation at a time in admission order
    pub fn serial(name: impl Into<String>) -> Self {
        Self::concurrent(name, 1)
    }

    pub fn concurrent(name: impl Into<String>, max_concurrent: usize) -> Self {
        Self::from_options(QueueOptions {
            name: name.into(),
            max_concurrent: max_concurrent.max(1),
            priority: QueuePriority::Default,
            runtime: None,
        })
    }

    pub fn from_config(name: impl Into<String>, settings: &QueueSettings) -> Self {
        Self::concurrent(name, settings.max_concurrent).with_priority(settings.priority)
    }

    /// Reconfigured queue with the given priority; call before first use
    pub fn with_priority(self, priority: QueuePriority) -> Self {
        let mut options = self.inner.options.clone();
        options.priority = priority;
        Self::from_options(options)
    }

    /// Reconfigured queue whose tasks run on `runtime`; call before first use
    pub fn with_runtime(self, runtime: Handle) -> Self {
        let mut options = self.inner.options.clone();
        options.runtime = Some(runtime);
        Self::from_options(options)
    }

    pub fn name(&self) -> &str {
        &self.inner.options.name
    }

    pub fn max_concurrent(&self) -> usize {
        self.inner.options.max_concurrent
    }

    pub fn priority(&self) -> QueuePriority {
        self.inner.options.priority
    }

    pub fn is_serial(&self) -> bool {
        self.inner.options.max_concurrent == 1
    }

    /// Number of outstanding (not finished, not cancelled) operations
    pub fn operation_count(&self) -> usize {
        self.inner.prune();
        self.inner.tracked.lock().len()
    }

    /// Unconditional FIFO admission
    pub fn enqueue<E: Executable>(&self, operation: Operation<E>) {
        let core = operation.core_arc();
        self.track(core.clone());
        core.transition(super::OperationState::Pending);
        self.dispatch(Box::new(operation));
    }

    /// Admit unless an outstanding operation of the same kind is tracked.
    ///
    /// A rejected operation resolves its handle as `Cancelled`.
    pub fn enqueue_exclusive<E: Executable>(&self, operation: Operation<E>) -> bool {
        let core = operation.core_arc();
        let admitted = {
            let mut tracked = self.inner.tracked.lock();
            tracked.retain(|c| c.state().is_outstanding());
            if tracked.iter().any(|c| c.kind() == core.kind()) {
                false
            } else {
                tracked.push(core.clone());
                true
            }
        };

        if !admitted {
            debug!(
                queue = %self.name(),
                operation_id = %core.id(),
                kind = %core.kind(),
                "Exclusive admission rejected, same kind already outstanding"
            );
            Box::new(operation).reject();
            return false;
        }

        core.transition(super::OperationState::Pending);
        self.dispatch(Box::new(operation));
        true
    }

    /// Cancel every tracked operation: queued, executing or waiting on a retry timer
    pub fn cancel_all(&self) {
        let tracked = self.inner.tracked.lock();
        if !tracked.is_empty() {
            info!(
                queue = %self.name(),
                count = tracked.len(),
                "🛑 QUEUE: Cancelling all operations"
            );
        }
        // Cancel while holding the lock so a concurrently tracked retry successor
        // is either in this set or sees its predecessor cancelled
        for core in tracked.iter() {
            core.cancel();
        }
    }

    pub(crate) fn track(&self, core: Arc<OperationCore>) {
        self.inner.tracked.lock().push(core);
    }

    pub(crate) fn dispatch(&self, operation: Dispatch) {
        self.ensure_dispatcher();
        if let Err(mpsc::error::SendError(operation)) = self.inner.sender.send(operation) {
            warn!(queue = %self.name(), "Queue dispatcher is gone, rejecting operation");
            operation.reject();
        }
    }

    pub(crate) fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match &self.inner.options.runtime {
            Some(runtime) => {
                runtime.spawn(future);
            }
            None => {
                tokio::spawn(future);
            }
        }
    }

    fn ensure_dispatcher(&self) {
        let Some(receiver) = self.inner.receiver.lock().take() else {
            return;
        };
        debug!(
            queue = %self.name(),
            max_concurrent = self.max_concurrent(),
            priority = ?self.priority(),
            "Starting queue dispatcher"
        );
        let weak = Arc::downgrade(&self.inner);
        let semaphore = self.inner.semaphore.clone();
        self.spawn(Self::run_dispatcher(weak, semaphore, receiver));
    }

    async fn run_dispatcher(
        inner: Weak<QueueInner>,
        semaphore: Arc<Semaphore>,
        mut receiver: mpsc::UnboundedReceiver<Dispatch>,
    ) {
        while let Some(operation) = receiver.recv().await {
            let core = operation.core().clone();

            let permit = tokio::select! {
                permit = semaphore.clone().acquire_owned() => permit,
                _ = core.cancelled() => {
                    operation.reject();
                    continue;
                }
            };
            let Ok(permit) = permit else {
                operation.reject();
                continue;
            };

            let Some(queue) = inner.upgrade().map(|inner| OperationQueue { inner }) else {
                operation.reject();
                continue;
            };

            let runner = queue.clone();
            queue.spawn(async move {
                operation.run(runner.clone()).await;
                drop(permit);
                runner.inner.prune();
            });
        }
        debug!("Queue dispatcher stopped - channel closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{BlockOperation, OperationKind, OperationOutcome};
    use std::time::Duration;

    #[tokio::test]
    async fn test_serial_queue_preserves_order() {
        let queue = OperationQueue::serial("serial");
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut handles = Vec::new();

        for index in 0..5u64 {
            let log = log.clone();
            let (operation, handle) = Operation::new(BlockOperation::new(
                OperationKind::new("ordered"),
                move |_ctx| {
                    let log = log.clone();
                    async move {
                        log.lock().push(format!("start-{index}"));
                        tokio::time::sleep(Duration::from_millis(5 - index)).await;
                        log.lock().push(format!("end-{index}"));
                        Ok(index)
                    }
                },
            ));
            queue.enqueue(operation);
            handles.push(handle);
        }

        for (index, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.outcome().await, OperationOutcome::Succeeded(index as u64));
        }

        let expected: Vec<String> = (0..5)
            .flat_map(|i| [format!("start-{i}"), format!("end-{i}")])
            .collect();
        assert_eq!(*log.lock(), expected);
    }

    #[tokio::test]
    async fn test_with_priority_keeps_settings() {
        let queue = OperationQueue::concurrent("requests", 4).with_priority(QueuePriority::UserInitiated);
        assert_eq!(queue.max_concurrent(), 4);
        assert_eq!(queue.priority(), QueuePriority::UserInitiated);
        assert!(!queue.is_serial());
        assert_eq!(queue.operation_count(), 0);
    }
}
