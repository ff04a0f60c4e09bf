//! Message handling: retention filter, dedup against the store, persist.

use super::MessagingContext;
use crate::constants::kinds;
use crate::error::{PipelineError, Result};
use crate::messaging::models::Message;
use crate::operation::{Executable, OperationContext, OperationKind};
use async_trait::async_trait;
use std::collections::HashSet;
use tracing::{debug, info};

/// Messages of one handled batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HandledBatch {
    /// Messages that were not stored before this batch
    pub new_messages: Vec<Message>,
    /// Every message of the batch that passed the retention filter
    pub all_messages: Vec<Message>,
}

impl HandledBatch {
    pub fn has_new_messages(&self) -> bool {
        !self.new_messages.is_empty()
    }
}

#[derive(Debug)]
pub struct MessageHandlingOperation {
    messages: Vec<Message>,
    deps: MessagingContext,
}

impl MessageHandlingOperation {
    pub fn new(messages: Vec<Message>, deps: MessagingContext) -> Self {
        Self { messages, deps }
    }
}

#[async_trait]
impl Executable for MessageHandlingOperation {
    type Output = HandledBatch;

    fn kind(&self) -> OperationKind {
        OperationKind::new(kinds::MESSAGE_HANDLING)
    }

    async fn execute(&self, ctx: &OperationContext) -> Result<HandledBatch> {
        let retention_threshold = self.deps.clock.before(self.deps.settings.retention_period());

        let mut seen_in_batch = HashSet::new();
        let mut batch = HandledBatch::default();
        for message in &self.messages {
            if message.created_at < retention_threshold {
                debug!(message_id = %message.message_id, "Skipping message older than retention period");
                continue;
            }
            if !seen_in_batch.insert(message.message_id.clone()) {
                continue;
            }
            if ctx.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            if self.deps.store.get(&message.message_id).await?.is_none() {
                batch.new_messages.push(message.clone());
            }
            batch.all_messages.push(message.clone());
        }

        if !batch.new_messages.is_empty() {
            self.deps.store.insert(batch.new_messages.clone()).await?;
        }

        info!(
            operation_id = %ctx.id(),
            received = self.messages.len(),
            handled = batch.all_messages.len(),
            new = batch.new_messages.len(),
            "📨 Handled incoming messages"
        );
        Ok(batch)
    }
}
