//! Seen status: persisting locally, then reporting to the backend.

use super::MessagingContext;
use crate::constants::kinds;
use crate::error::{PipelineError, Result};
use crate::messaging::api::{SeenEntry, SeenStatusRequest};
use crate::messaging::models::SeenStatus;
use crate::operation::{Executable, OperationContext, OperationKind};
use async_trait::async_trait;
use std::collections::HashSet;
use tracing::{debug, info};

/// Marks `NotSeen` inbound messages as `SeenNotSent`, keeping the first seen date
#[derive(Debug)]
pub struct SeenStatusPersistingOperation {
    message_ids: HashSet<String>,
    deps: MessagingContext,
}

impl SeenStatusPersistingOperation {
    pub fn new(message_ids: impl IntoIterator<Item = String>, deps: MessagingContext) -> Self {
        Self {
            message_ids: message_ids.into_iter().collect(),
            deps,
        }
    }
}

#[async_trait]
impl Executable for SeenStatusPersistingOperation {
    /// Number of records moved to `SeenNotSent`
    type Output = usize;

    fn kind(&self) -> OperationKind {
        OperationKind::new(kinds::SEEN_STATUS_PERSISTING)
    }

    async fn execute(&self, ctx: &OperationContext) -> Result<usize> {
        let now = self.deps.clock.now();
        let ids = &self.message_ids;
        let updated = self
            .deps
            .store
            .update_where(
                &|m| {
                    m.is_inbound()
                        && m.seen_status == SeenStatus::NotSeen
                        && ids.contains(&m.message_id)
                },
                &|m| {
                    m.seen_status = SeenStatus::SeenNotSent;
                    if m.seen_at.is_none() {
                        m.seen_at = Some(now);
                    }
                },
            )
            .await?;
        debug!(operation_id = %ctx.id(), requested = ids.len(), updated, "Persisted seen status");
        Ok(updated)
    }
}

/// Reports every `SeenNotSent` inbound message with a backend-assigned id
#[derive(Debug)]
pub struct SeenStatusSendingOperation {
    deps: MessagingContext,
}

impl SeenStatusSendingOperation {
    pub fn new(deps: MessagingContext) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Executable for SeenStatusSendingOperation {
    /// Number of messages reported
    type Output = usize;

    fn kind(&self) -> OperationKind {
        OperationKind::new(kinds::SEEN_STATUS_SENDING)
    }

    async fn execute(&self, ctx: &OperationContext) -> Result<usize> {
        let pending = self
            .deps
            .store
            .find_where(&|m| {
                m.is_inbound()
                    && m.seen_status == SeenStatus::SeenNotSent
                    && !m.has_sdk_generated_id()
            })
            .await?;
        if pending.is_empty() {
            debug!(operation_id = %ctx.id(), "No seen status updates to report");
            return Ok(0);
        }
        if ctx.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let now = self.deps.clock.now();
        let request = SeenStatusRequest {
            push_registration_id: self.deps.registration.push_registration_id(),
            entries: pending
                .iter()
                .map(|m| SeenEntry {
                    message_id: m.message_id.clone(),
                    seen_at: m.seen_at.unwrap_or(now),
                })
                .collect(),
            reported_at: now,
        };
        let reported: HashSet<String> = request.message_ids().into_iter().collect();
        self.deps.send_request(ctx, request).await?;

        let updated = self
            .deps
            .store
            .update_where(
                &|m| m.seen_status == SeenStatus::SeenNotSent && reported.contains(&m.message_id),
                &|m| m.seen_status = SeenStatus::SeenSent,
            )
            .await?;

        info!(operation_id = %ctx.id(), reported = reported.len(), updated, "👁️ Seen status reported");
        Ok(reported.len())
    }
}
