//! Reconciliation with the backend.
//!
//! Reports delivered ids and the archive window, receives pending messages,
//! and marks the reported ids delivered once the backend accepted them.

use super::MessagingContext;
use crate::constants::kinds;
use crate::error::{PipelineError, Result};
use crate::messaging::api::SyncMessagesRequest;
use crate::messaging::models::Message;
use crate::operation::{Executable, OperationContext, OperationKind};
use async_trait::async_trait;
use std::collections::HashSet;
use std::time::Duration;
use tracing::info;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

#[derive(Debug)]
pub struct MessagesSyncOperation {
    deps: MessagingContext,
}

impl MessagesSyncOperation {
    pub fn new(deps: MessagingContext) -> Self {
        Self { deps }
    }

    /// Inbound messages whose delivery was not reported yet
    async fn undelivered_ids(&self) -> Result<Vec<String>> {
        let messages = self
            .deps
            .store
            .find_where(&|m| m.is_inbound() && !m.delivery_report_sent)
            .await?;
        Ok(messages.into_iter().map(|m| m.message_id).collect())
    }

    /// Delivery-reported messages inside the archive window, newest first
    async fn archive_ids(&self) -> Result<Vec<String>> {
        let settings = &self.deps.settings;
        let archive_length = Duration::from_secs(settings.archive_length_days.max(0) as u64 * SECONDS_PER_DAY);
        let window_start = self.deps.clock.before(archive_length);

        let mut messages = self
            .deps
            .store
            .find_where(&|m| m.is_inbound() && m.delivery_report_sent && m.created_at > window_start)
            .await?;
        messages.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(messages
            .into_iter()
            .take(settings.fetch_limit)
            .map(|m| m.message_id)
            .collect())
    }
}

#[async_trait]
impl Executable for MessagesSyncOperation {
    /// Messages returned by the backend, not yet handled
    type Output = Vec<Message>;

    fn kind(&self) -> OperationKind {
        OperationKind::new(kinds::MESSAGES_SYNC)
    }

    async fn execute(&self, ctx: &OperationContext) -> Result<Vec<Message>> {
        let push_registration_id = self
            .deps
            .registration
            .push_registration_id()
            .ok_or(PipelineError::NoRegistration)?;

        let delivered_message_ids = self.undelivered_ids().await?;
        let archive_message_ids = self.archive_ids().await?;
        if ctx.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let request = SyncMessagesRequest {
            push_registration_id,
            archive_message_ids,
            delivered_message_ids: delivered_message_ids.clone(),
        };
        let response = self.deps.send_request(ctx, request).await?;

        let now = self.deps.clock.now();
        let reported: HashSet<String> = delivered_message_ids.into_iter().collect();
        let marked = self
            .deps
            .store
            .update_where(&|m| reported.contains(&m.message_id), &|m| {
                m.delivery_report_sent = true;
                m.delivery_reported_at = Some(now);
            })
            .await?;

        let fetched: Vec<Message> = response
            .messages
            .unwrap_or_default()
            .into_iter()
            .map(|remote| remote.into_message(now))
            .collect();

        info!(
            operation_id = %ctx.id(),
            delivery_reported = marked,
            fetched = fetched.len(),
            "🔄 SYNC: Messages reconciled with server"
        );
        Ok(fetched)
    }
}
