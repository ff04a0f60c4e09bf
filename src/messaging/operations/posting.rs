//! Mobile-originated message posting.

use super::MessagingContext;
use crate::constants::kinds;
use crate::error::{PipelineError, Result};
use crate::messaging::api::SendMessagesRequest;
use crate::messaging::models::{Message, OutgoingMessage, SendStatus};
use crate::operation::{Executable, OperationContext, OperationKind};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};

#[derive(Debug)]
pub struct MessagePostingOperation {
    messages: Vec<OutgoingMessage>,
    deps: MessagingContext,
}

impl MessagePostingOperation {
    pub fn new(messages: Vec<OutgoingMessage>, deps: MessagingContext) -> Self {
        Self { messages, deps }
    }

    fn ids(&self) -> HashSet<String> {
        self.messages.iter().map(|m| m.message_id.clone()).collect()
    }

    /// Store a record for every message not persisted by an earlier attempt
    async fn persist_outbound(&self) -> Result<()> {
        let mut records = Vec::new();
        for message in &self.messages {
            if self.deps.store.get(&message.message_id).await?.is_none() {
                records.push(message.to_message());
            }
        }
        if !records.is_empty() {
            self.deps.store.insert(records).await?;
        }
        Ok(())
    }

    async fn records(&self) -> Result<Vec<Message>> {
        let ids = self.ids();
        let mut records = self
            .deps
            .store
            .find_where(&|m| ids.contains(&m.message_id))
            .await?;
        let order: HashMap<&str, usize> = self
            .messages
            .iter()
            .enumerate()
            .map(|(index, m)| (m.message_id.as_str(), index))
            .collect();
        records.sort_by_key(|m| order.get(m.message_id.as_str()).copied().unwrap_or(usize::MAX));
        Ok(records)
    }
}

#[async_trait]
impl Executable for MessagePostingOperation {
    /// Stored records with their updated send status
    type Output = Vec<Message>;

    fn kind(&self) -> OperationKind {
        OperationKind::new(kinds::MESSAGE_POSTING)
    }

    async fn execute(&self, ctx: &OperationContext) -> Result<Vec<Message>> {
        if self.messages.is_empty() {
            return Ok(Vec::new());
        }
        let push_registration_id = self
            .deps
            .registration
            .push_registration_id()
            .ok_or(PipelineError::NoRegistration)?;

        self.persist_outbound().await?;
        if ctx.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let request = SendMessagesRequest {
            push_registration_id,
            messages: self.messages.clone(),
        };
        let response = match self.deps.send_request(ctx, request).await {
            Ok(response) => response,
            Err(error) => {
                if !error.is_cancelled() {
                    let ids = self.ids();
                    self.deps
                        .store
                        .update_where(&|m| ids.contains(&m.message_id), &|m| {
                            m.send_status = SendStatus::Failed
                        })
                        .await?;
                    warn!(operation_id = %ctx.id(), error = %error, "Message posting failed");
                }
                return Err(error);
            }
        };

        let statuses: HashMap<String, SendStatus> = response
            .messages
            .iter()
            .map(|status| {
                let send_status = if status.is_accepted() {
                    SendStatus::Sent
                } else {
                    SendStatus::Failed
                };
                (status.message_id.clone(), send_status)
            })
            .collect();
        let ids = self.ids();
        self.deps
            .store
            .update_where(&|m| ids.contains(&m.message_id), &|m| {
                m.send_status = statuses
                    .get(&m.message_id)
                    .copied()
                    .unwrap_or(SendStatus::Failed);
            })
            .await?;

        let records = self.records().await?;
        info!(
            operation_id = %ctx.id(),
            sent = records.iter().filter(|m| m.send_status == SendStatus::Sent).count(),
            total = records.len(),
            "📤 Posted outgoing messages"
        );
        Ok(records)
    }
}
