//! # Message Handler
//!
//! Orchestrates the message operations on four queues:
//!
//! - `handling` (serial): incoming batches, eviction, id updates
//! - `sending` (serial, user initiated): mobile-originated posting
//! - `sync` (serial): reconciliation, local fetch, seen status
//! - `request` (concurrent): remote request sub-operations
//!
//! Handling a batch fans the messages out to every subservice and, at the
//! same time, reconciles with the backend. Messages fetched by the
//! reconciliation are handled again with the next handling iteration until
//! `fetch_iteration_limit` is reached.
//!
//! Nothing is admitted unless the service is running.

use super::lifecycle::{LifecycleEvent, ServiceEvent, ServiceState, ServiceStateMachine};
use super::models::{Message, OutgoingMessage};
use super::operations::{
    HandledBatch, LocalMessageFetchOperation, MessageHandlingOperation, MessageIdUpdateOperation,
    MessagePostingOperation, MessagesEvictionOperation, MessagesSyncOperation, MessagingContext,
    SeenStatusPersistingOperation, SeenStatusSendingOperation,
};
use super::postponer::Postponer;
use super::storage::MessageStore;
use super::subservice::{notify_subservices, LocalMessageSource, Subservice};
use crate::config::PipelineConfig;
use crate::constants::{kinds, queues, MESSAGE_HANDLER_SERVICE_ID};
use crate::error::{PipelineError, Result};
use crate::installation::{
    DepersonalizationStatus, DepersonalizationStatusSource, InstallationState, RegistrationHealth,
};
use crate::operation::{
    BlockOperation, Executable, HealthyRegistrationCondition, NotPendingDepersonalizationCondition,
    Operation, OperationHandle, OperationKind, OperationOutcome, OperationQueue, RequestExecutor,
};
use crate::reachability::{NetworkReachability, ReachabilityMonitor};
use crate::utils::clock::{Clock, SystemClock};
use futures::future::{BoxFuture, FutureExt};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const LIFECYCLE_CHANNEL_CAPACITY: usize = 32;

/// Result of handling a batch of incoming messages
#[derive(Debug, Clone, PartialEq)]
pub enum MessageHandlingResult {
    NewData,
    NoData,
    Failed(PipelineError),
}

/// External collaborators of a [`MessageHandler`]
pub struct HandlerCollaborators {
    pub store: Arc<dyn MessageStore>,
    pub executor: Arc<dyn RequestExecutor>,
    pub registration: Arc<dyn RegistrationHealth>,
    pub depersonalization: Arc<dyn DepersonalizationStatusSource>,
    pub reachability: Arc<dyn ReachabilityMonitor>,
    pub clock: Arc<dyn Clock>,
    pub local_source: Option<Arc<dyn LocalMessageSource>>,
    pub subservices: Vec<Arc<dyn Subservice>>,
}

impl HandlerCollaborators {
    pub fn new(
        store: Arc<dyn MessageStore>,
        executor: Arc<dyn RequestExecutor>,
        registration: Arc<dyn RegistrationHealth>,
        depersonalization: Arc<dyn DepersonalizationStatusSource>,
    ) -> Self {
        Self {
            store,
            executor,
            registration,
            depersonalization,
            reachability: Arc::new(NetworkReachability::default()),
            clock: Arc::new(SystemClock),
            local_source: None,
            subservices: Vec::new(),
        }
    }

    /// Collaborators backed by one [`InstallationState`]
    pub fn for_installation(
        store: Arc<dyn MessageStore>,
        executor: Arc<dyn RequestExecutor>,
        installation: Arc<InstallationState>,
    ) -> Self {
        Self::new(store, executor, installation.clone(), installation)
    }

    pub fn with_reachability(mut self, reachability: Arc<dyn ReachabilityMonitor>) -> Self {
        self.reachability = reachability;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_local_source(mut self, source: Arc<dyn LocalMessageSource>) -> Self {
        self.local_source = Some(source);
        self
    }

    pub fn with_subservice(mut self, subservice: Arc<dyn Subservice>) -> Self {
        self.subservices.push(subservice);
        self
    }
}

struct HandlerInner {
    deps: MessagingContext,
    depersonalization: Arc<dyn DepersonalizationStatusSource>,
    local_source: Option<Arc<dyn LocalMessageSource>>,
    subservices: RwLock<Vec<Arc<dyn Subservice>>>,
    handling_queue: OperationQueue,
    sending_queue: OperationQueue,
    sync_queue: OperationQueue,
    seen_postponer: Postponer,
    service_state: ServiceStateMachine,
}

#[derive(Clone)]
pub struct MessageHandler {
    inner: Arc<HandlerInner>,
}

impl std::fmt::Debug for MessageHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageHandler")
            .field("state", &self.state())
            .field("handling_queue", &self.inner.handling_queue)
            .field("sending_queue", &self.inner.sending_queue)
            .field("sync_queue", &self.inner.sync_queue)
            .field("subservices", &self.inner.subservices.read().len())
            .finish()
    }
}

impl MessageHandler {
    pub fn new(config: &PipelineConfig, collaborators: HandlerCollaborators) -> Self {
        let queue_config = &config.queues;
        let deps = MessagingContext {
            store: collaborators.store,
            executor: collaborators.executor,
            registration: collaborators.registration,
            reachability: collaborators.reachability,
            clock: collaborators.clock,
            retry_policy: config.retry.policy(config.retry.default_retry_limit),
            request_queue: OperationQueue::from_config(queues::REQUEST, &queue_config.request),
            settings: config.messages.clone(),
        };

        info!(
            handling = queue_config.handling.max_concurrent,
            sending = queue_config.sending.max_concurrent,
            sync = queue_config.sync.max_concurrent,
            request = queue_config.request.max_concurrent,
            seen_debounce_ms = config.messages.seen_debounce_ms,
            "🚀 MESSAGE HANDLER: Created"
        );

        Self {
            inner: Arc::new(HandlerInner {
                deps,
                depersonalization: collaborators.depersonalization,
                local_source: collaborators.local_source,
                subservices: RwLock::new(collaborators.subservices),
                handling_queue: OperationQueue::from_config(queues::HANDLING, &queue_config.handling),
                sending_queue: OperationQueue::from_config(queues::SENDING, &queue_config.sending),
                sync_queue: OperationQueue::from_config(queues::SYNC, &queue_config.sync),
                seen_postponer: Postponer::new(config.messages.seen_debounce()),
                service_state: ServiceStateMachine::new(),
            }),
        }
    }

    pub fn id(&self) -> &'static str {
        MESSAGE_HANDLER_SERVICE_ID
    }

    pub fn state(&self) -> ServiceState {
        self.inner.service_state.current_state()
    }

    pub fn is_running(&self) -> bool {
        self.inner.service_state.is_running()
    }

    pub fn handling_queue(&self) -> &OperationQueue {
        &self.inner.handling_queue
    }

    pub fn sending_queue(&self) -> &OperationQueue {
        &self.inner.sending_queue
    }

    pub fn sync_queue(&self) -> &OperationQueue {
        &self.inner.sync_queue
    }

    pub fn request_queue(&self) -> &OperationQueue {
        &self.inner.deps.request_queue
    }

    pub fn add_subservice(&self, subservice: Arc<dyn Subservice>) {
        debug!(subservice = subservice.id(), "Registering subservice");
        self.inner.subservices.write().push(subservice);
    }

    /// Start the service, evict stale messages and sync with the backend.
    ///
    /// Returns whether the service is running afterwards.
    pub async fn start(&self) -> bool {
        if self.inner.service_state.transition(ServiceEvent::Start).is_err() {
            debug!(state = %self.state(), "Start ignored");
            return self.is_running();
        }
        if let Err(error) = self.inner.service_state.transition(ServiceEvent::Started) {
            warn!(error = %error, "Message handler could not finish starting");
            return self.is_running();
        }
        info!("✅ MESSAGE HANDLER: Running");

        let max_age = self.inner.deps.settings.message_max_age();
        if let Err(error) = self.evict_older_than(max_age).await {
            warn!(error = %error, "Eviction at start failed");
        }
        if let Err(error) = self.sync_with_server().await {
            warn!(error = %error, "Sync at start failed");
        }
        self.is_running()
    }

    pub async fn resume(&self) -> bool {
        self.start().await
    }

    /// Stop admitting work, cancel every queue and drop a pending seen report
    pub fn suspend(&self) {
        if self.inner.service_state.transition(ServiceEvent::Suspend).is_err() {
            debug!(state = %self.state(), "Suspend ignored");
            return;
        }
        self.cancel_all();
        self.inner.seen_postponer.cancel();
        if let Err(error) = self.inner.service_state.transition(ServiceEvent::Suspended) {
            warn!(error = %error, "Message handler could not finish suspending");
        }
        info!("⏸️ MESSAGE HANDLER: Suspended");
    }

    /// Cancel every queue without changing the lifecycle state
    pub fn cancel_all(&self) {
        self.inner.handling_queue.cancel_all();
        self.inner.sending_queue.cancel_all();
        self.inner.sync_queue.cancel_all();
        self.inner.deps.request_queue.cancel_all();
    }

    /// Admit `operation` on `queue`.
    ///
    /// `Ok(false)` means an outstanding operation of the same kind rejected
    /// an exclusive submission.
    pub fn submit<E: Executable>(
        &self,
        operation: Operation<E>,
        queue: &OperationQueue,
        exclusive: bool,
    ) -> Result<bool> {
        if !self.is_running() {
            debug!(
                kind = %operation.kind(),
                queue = %queue.name(),
                state = %self.state(),
                "Service not running, operation not admitted"
            );
            return Err(PipelineError::not_running(MESSAGE_HANDLER_SERVICE_ID));
        }
        if exclusive {
            Ok(queue.enqueue_exclusive(operation))
        } else {
            queue.enqueue(operation);
            Ok(true)
        }
    }

    /// Handle a batch of incoming messages
    pub async fn handle_incoming(&self, messages: Vec<Message>) -> MessageHandlingResult {
        self.handle_messages(messages, 0).await
    }

    fn handle_messages(
        &self,
        messages: Vec<Message>,
        iteration: u32,
    ) -> BoxFuture<'static, MessageHandlingResult> {
        let handler = self.clone();
        async move {
            if messages.is_empty() || !handler.is_running() {
                return MessageHandlingResult::NoData;
            }

            let (operation, handle) = Operation::new(MessageHandlingOperation::new(
                messages,
                handler.inner.deps.clone(),
            ));
            if let Err(error) = handler.submit(operation, &handler.inner.handling_queue, false) {
                debug!(error = %error, "Message handling not admitted");
                return MessageHandlingResult::NoData;
            }
            let batch: HandledBatch = match handle.outcome().await {
                OperationOutcome::Succeeded(batch) => batch,
                OperationOutcome::Failed(error) => return MessageHandlingResult::Failed(error),
                OperationOutcome::Cancelled => {
                    debug!(iteration, "Message handling cancelled");
                    return MessageHandlingResult::NoData;
                }
            };

            let subservices = handler.inner.subservices.read().clone();
            let notify = notify_subservices(&subservices, &batch.new_messages, &batch.all_messages);
            let (_, reconciled) = futures::join!(notify, handler.reconcile(iteration));

            debug!(
                iteration,
                new = batch.new_messages.len(),
                all = batch.all_messages.len(),
                "Message handling finished"
            );
            match reconciled {
                _ if batch.has_new_messages() => MessageHandlingResult::NewData,
                Ok(true) => MessageHandlingResult::NewData,
                Ok(false) => MessageHandlingResult::NoData,
                Err(PipelineError::ConditionFailed { .. }) | Err(PipelineError::NotRunning { .. }) => {
                    MessageHandlingResult::NoData
                }
                Err(error) => MessageHandlingResult::Failed(error),
            }
        }
        .boxed()
    }

    /// Exclusive reconciliation; true when fetched messages produced new data
    fn reconcile(&self, iteration: u32) -> BoxFuture<'static, Result<bool>> {
        let handler = self.clone();
        async move {
            let (operation, handle) = handler.sync_operation();
            if !handler.submit(operation, &handler.inner.sync_queue, true)? {
                debug!(iteration, "Reconciliation already outstanding, riding along");
                return Ok(false);
            }
            let fetched = match handle.outcome().await {
                OperationOutcome::Succeeded(fetched) => fetched,
                OperationOutcome::Failed(error) => return Err(error),
                OperationOutcome::Cancelled => return Ok(false),
            };

            let limit = handler.inner.deps.settings.fetch_iteration_limit;
            if fetched.is_empty() || iteration >= limit {
                if !fetched.is_empty() {
                    debug!(iteration, limit, "Fetch iteration limit reached, fetched messages not handled");
                }
                return Ok(false);
            }
            match handler.handle_messages(fetched, iteration + 1).await {
                MessageHandlingResult::NewData => Ok(true),
                MessageHandlingResult::NoData => Ok(false),
                MessageHandlingResult::Failed(error) => Err(error),
            }
        }
        .boxed()
    }

    fn sync_operation(&self) -> (Operation<MessagesSyncOperation>, OperationHandle<Vec<Message>>) {
        let (operation, handle) = Operation::new(MessagesSyncOperation::new(self.inner.deps.clone()));
        let operation = operation
            .with_condition(HealthyRegistrationCondition::new(self.inner.deps.registration.clone()))
            .with_condition(NotPendingDepersonalizationCondition::new(
                self.inner.depersonalization.clone(),
            ));
        (operation, handle)
    }

    /// Pull locally delivered messages, then reconcile with the backend
    pub async fn sync_with_server(&self) -> Result<()> {
        if let Some(source) = self.inner.local_source.clone() {
            let (operation, handle) = Operation::new(LocalMessageFetchOperation::new(source));
            if self.submit(operation, &self.inner.sync_queue, true)? {
                if let OperationOutcome::Succeeded(messages) = handle.outcome().await {
                    if !messages.is_empty() {
                        info!(count = messages.len(), "📥 Handling locally delivered messages");
                        self.handle_messages(messages, 0).await;
                    }
                }
            }
        }
        self.reconcile(0).await.map(|_| ())
    }

    /// Mark messages seen, then report them now or after the debounce window
    pub async fn set_seen(&self, message_ids: Vec<String>, immediately: bool) -> Result<()> {
        if message_ids.is_empty() {
            return Ok(());
        }
        let (operation, handle) = Operation::new(SeenStatusPersistingOperation::new(
            message_ids,
            self.inner.deps.clone(),
        ));
        self.submit(operation, &self.inner.sync_queue, false)?;
        handle.outcome().await.into_result()?;

        if immediately {
            self.sync_seen_status_updates().await.map(|_| ())
        } else {
            let handler = self.clone();
            self.inner.seen_postponer.postpone(move || {
                async move {
                    if let Err(error) = handler.sync_seen_status_updates().await {
                        warn!(error = %error, "Postponed seen status report failed");
                    }
                }
                .boxed()
            });
            Ok(())
        }
    }

    /// Report every seen-but-unreported message; returns the number reported
    pub async fn sync_seen_status_updates(&self) -> Result<usize> {
        let (operation, handle) = Operation::new(SeenStatusSendingOperation::new(self.inner.deps.clone()));
        let operation = operation.with_condition(NotPendingDepersonalizationCondition::new(
            self.inner.depersonalization.clone(),
        ));
        self.submit(operation, &self.inner.sync_queue, false)?;
        handle.outcome().await.into_result()
    }

    /// Remove messages created before `now - max_age`; returns the number removed
    pub async fn evict_older_than(&self, max_age: Duration) -> Result<usize> {
        let (operation, handle) =
            Operation::new(MessagesEvictionOperation::new(max_age, self.inner.deps.clone()));
        self.submit(operation, &self.inner.handling_queue, false)?;
        handle.outcome().await.into_result()
    }

    /// Persist and post mobile-originated messages
    pub async fn send_messages(&self, messages: Vec<OutgoingMessage>) -> Result<Vec<Message>> {
        let (operation, handle) =
            Operation::new(MessagePostingOperation::new(messages, self.inner.deps.clone()));
        let operation = operation
            .with_condition(HealthyRegistrationCondition::new(self.inner.deps.registration.clone()))
            .with_condition(NotPendingDepersonalizationCondition::new(
                self.inner.depersonalization.clone(),
            ));
        self.submit(operation, &self.inner.sending_queue, false)?;
        handle.outcome().await.into_result()
    }

    /// Replace SDK-generated ids with the ids assigned by the backend
    pub async fn update_sdk_generated_message_ids(
        &self,
        id_map: HashMap<String, String>,
    ) -> Result<usize> {
        if id_map.is_empty() {
            return Ok(0);
        }
        let (operation, handle) =
            Operation::new(MessageIdUpdateOperation::new(id_map, self.inner.deps.clone()));
        self.submit(operation, &self.inner.handling_queue, false)?;
        handle.outcome().await.into_result()
    }

    /// Cancel all queued work and remove every stored message.
    ///
    /// Runs regardless of the lifecycle state; returns the number removed.
    pub async fn depersonalize(&self) -> Result<usize> {
        info!("🧽 MESSAGE HANDLER: Depersonalizing");
        self.cancel_all();
        self.inner.seen_postponer.cancel();

        let store = self.inner.deps.store.clone();
        let (operation, handle) = Operation::new(BlockOperation::new(
            OperationKind::new(kinds::STORAGE_RESET),
            move |_ctx| {
                let store = store.clone();
                async move { store.remove_all().await }
            },
        ));
        self.inner.sync_queue.enqueue(operation);
        handle.outcome().await.into_result()
    }

    /// Flush a pending seen report immediately
    pub async fn flush_seen_status(&self) {
        self.inner.seen_postponer.flush().await;
    }

    /// React to one host notification
    pub async fn handle_lifecycle_event(&self, event: LifecycleEvent) {
        debug!(event = ?event, state = %self.state(), "Handling lifecycle event");
        match event {
            LifecycleEvent::AppWillEnterForeground | LifecycleEvent::BaseUrlChanged { .. } => {
                if self.is_running() {
                    if let Err(error) = self.sync_with_server().await {
                        warn!(error = %error, "Sync after lifecycle event failed");
                    }
                }
            }
            LifecycleEvent::AppDidEnterBackground => self.flush_seen_status().await,
            LifecycleEvent::RegistrationHealthChanged { healthy: true } => {
                self.start().await;
            }
            LifecycleEvent::RegistrationHealthChanged { healthy: false } => self.suspend(),
            LifecycleEvent::DepersonalizationStatusChanged(DepersonalizationStatus::Pending) => {
                self.suspend()
            }
            LifecycleEvent::DepersonalizationStatusChanged(
                DepersonalizationStatus::Success | DepersonalizationStatus::Undefined,
            ) => {
                self.start().await;
            }
        }
    }

    /// Sender for host notifications, consumed by a spawned listener task.
    ///
    /// The listener stops once every sender is dropped.
    pub fn lifecycle_channel(&self) -> mpsc::Sender<LifecycleEvent> {
        let (sender, mut receiver) = mpsc::channel(LIFECYCLE_CHANNEL_CAPACITY);
        let handler = self.clone();
        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                handler.handle_lifecycle_event(event).await;
            }
            debug!("Lifecycle listener stopped - channel closed");
        });
        sender
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::storage::InMemoryMessageStore;
    use crate::operation::ApiRequest;
    use async_trait::async_trait;

    struct EmptyExecutor;

    #[async_trait]
    impl RequestExecutor for EmptyExecutor {
        async fn send(&self, _request: &ApiRequest) -> Result<serde_json::Value> {
            Ok(serde_json::json!({}))
        }
    }

    fn handler(installation: Arc<InstallationState>) -> MessageHandler {
        MessageHandler::new(
            &PipelineConfig::default(),
            HandlerCollaborators::for_installation(
                Arc::new(InMemoryMessageStore::new()),
                Arc::new(EmptyExecutor),
                installation,
            ),
        )
    }

    #[tokio::test]
    async fn test_start_and_suspend() {
        let handler = handler(Arc::new(InstallationState::registered("reg-1")));
        assert_eq!(handler.state(), ServiceState::Stopped);
        assert!(handler.start().await);
        assert!(handler.is_running());

        handler.suspend();
        assert_eq!(handler.state(), ServiceState::Stopped);
        let err = handler.evict_older_than(Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, PipelineError::NotRunning { .. }));
    }

    #[tokio::test]
    async fn test_depersonalization_events_drive_lifecycle() {
        let installation = Arc::new(InstallationState::registered("reg-1"));
        let handler = handler(installation);
        handler.start().await;

        handler
            .handle_lifecycle_event(LifecycleEvent::DepersonalizationStatusChanged(
                DepersonalizationStatus::Pending,
            ))
            .await;
        assert!(!handler.is_running());

        handler
            .handle_lifecycle_event(LifecycleEvent::DepersonalizationStatusChanged(
                DepersonalizationStatus::Success,
            ))
            .await;
        assert!(handler.is_running());
    }
}
