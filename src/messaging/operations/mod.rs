//! # Message Operations
//!
//! The units of work the message handler schedules on its queues. Each
//! operation receives the collaborators it needs through [`MessagingContext`];
//! remote calls run as retryable sub-operations on the request queue.

pub mod eviction;
pub mod handling;
pub mod id_update;
pub mod local_fetch;
pub mod posting;
pub mod seen;
pub mod sync;

pub use eviction::MessagesEvictionOperation;
pub use handling::{HandledBatch, MessageHandlingOperation};
pub use id_update::MessageIdUpdateOperation;
pub use local_fetch::LocalMessageFetchOperation;
pub use posting::MessagePostingOperation;
pub use seen::{SeenStatusPersistingOperation, SeenStatusSendingOperation};
pub use sync::MessagesSyncOperation;

use super::storage::MessageStore;
use crate::config::MessagesConfig;
use crate::error::Result;
use crate::installation::RegistrationHealth;
use crate::operation::{
    OperationContext, OperationQueue, RemoteRequest, RemoteRequestOperation, RequestExecutor,
    RetryPolicy,
};
use crate::reachability::ReachabilityMonitor;
use crate::utils::clock::Clock;
use std::sync::Arc;

/// Collaborators shared by the message operations
#[derive(Clone)]
pub struct MessagingContext {
    pub store: Arc<dyn MessageStore>,
    pub executor: Arc<dyn RequestExecutor>,
    pub registration: Arc<dyn RegistrationHealth>,
    pub reachability: Arc<dyn ReachabilityMonitor>,
    pub clock: Arc<dyn Clock>,
    pub retry_policy: RetryPolicy,
    pub request_queue: OperationQueue,
    pub settings: MessagesConfig,
}

impl std::fmt::Debug for MessagingContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessagingContext")
            .field("retry_policy", &self.retry_policy)
            .field("request_queue", &self.request_queue)
            .field("settings", &self.settings)
            .finish()
    }
}

impl MessagingContext {
    /// Run `request` as a retryable sub-operation of `ctx` on the request queue
    pub async fn send_request<R: RemoteRequest>(
        &self,
        ctx: &OperationContext,
        request: R,
    ) -> Result<R::Response> {
        let (operation, handle) = RemoteRequestOperation::new(request, self.executor.clone())
            .into_operation(&self.retry_policy, self.reachability.clone());
        ctx.run_sub_operation(operation, handle, &self.request_queue)
            .await
            .into_result()
    }
}
