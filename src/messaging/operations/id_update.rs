use super::MessagingContext;
use crate::constants::kinds;
use crate::error::{PipelineError, Result};
use crate::operation::{Executable, OperationContext, OperationKind};
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{debug, info};

/// Replaces temporary SDK-generated message ids with the ids the backend assigned
#[derive(Debug)]
pub struct MessageIdUpdateOperation {
    /// SDK-generated id → backend id
    id_map: HashMap<String, String>,
    deps: MessagingContext,
}

impl MessageIdUpdateOperation {
    pub fn new(id_map: HashMap<String, String>, deps: MessagingContext) -> Self {
        Self { id_map, deps }
    }
}

#[async_trait]
impl Executable for MessageIdUpdateOperation {
    /// Number of records renamed
    type Output = usize;

    fn kind(&self) -> OperationKind {
        OperationKind::new(kinds::MESSAGE_ID_UPDATE)
    }

    async fn execute(&self, ctx: &OperationContext) -> Result<usize> {
        let id_map = &self.id_map;
        let stale = self
            .deps
            .store
            .find_where(&|m| m.has_sdk_generated_id() && id_map.contains_key(&m.message_id))
            .await?;
        if stale.is_empty() {
            return Ok(0);
        }
        if ctx.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let mut renamed = Vec::with_capacity(stale.len());
        for mut message in stale {
            if let Some(server_id) = id_map.get(&message.message_id) {
                debug!(from = %message.message_id, to = %server_id, "Updating message id");
                message.message_id = server_id.clone();
                renamed.push(message);
            }
        }

        self.deps
            .store
            .remove_where(&|m| id_map.contains_key(&m.message_id))
            .await?;
        let count = renamed.len();
        self.deps.store.insert(renamed).await?;

        info!(operation_id = %ctx.id(), renamed = count, "Updated SDK-generated message ids");
        Ok(count)
    }
}
