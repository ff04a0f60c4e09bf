//! # Operation Engine
//!
//! Conditionally gated, retryable, cancellable units of work executed on
//! queues with FIFO admission, bounded concurrency and optional per-kind
//! exclusivity.
//!
//! ```rust,no_run
//! use courier_core::operation::{BlockOperation, Operation, OperationKind, OperationQueue};
//!
//! # async fn example() {
//! let queue = OperationQueue::serial("example");
//! let (operation, handle) = Operation::new(BlockOperation::new(
//!     OperationKind::new("example"),
//!     |_ctx| async { Ok(42) },
//! ));
//! queue.enqueue(operation);
//! let outcome = handle.outcome().await;
//! assert!(outcome.is_success());
//! # }
//! ```

pub mod condition;
pub mod core;
pub mod executable;
pub mod queue;
pub mod request;
pub mod retry;
pub mod states;

pub use self::core::{OperationContext, OperationCore, OperationDescriptor};
pub use condition::{
    Condition, ConditionResult, HealthyRegistrationCondition, NotPendingDepersonalizationCondition,
};
pub use executable::{BlockOperation, Executable, Operation, OperationCanceller, OperationHandle};
pub use queue::{OperationQueue, QueuePriority};
pub use request::{ApiRequest, HttpMethod, RemoteRequest, RemoteRequestOperation, RequestExecutor};
pub use retry::{RetryDecision, RetryDriver, RetryPolicy, RetryState};
pub use states::{OperationKind, OperationOutcome, OperationState};
