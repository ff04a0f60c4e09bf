use super::MessagingContext;
use crate::constants::kinds;
use crate::error::Result;
use crate::operation::{Executable, OperationContext, OperationKind};
use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

/// Removes messages created strictly before `now - max_age`
#[derive(Debug)]
pub struct MessagesEvictionOperation {
    max_age: Duration,
    deps: MessagingContext,
}

impl MessagesEvictionOperation {
    pub fn new(max_age: Duration, deps: MessagingContext) -> Self {
        Self { max_age, deps }
    }
}

#[async_trait]
impl Executable for MessagesEvictionOperation {
    /// Number of messages removed
    type Output = usize;

    fn kind(&self) -> OperationKind {
        OperationKind::new(kinds::MESSAGES_EVICTION)
    }

    async fn execute(&self, ctx: &OperationContext) -> Result<usize> {
        let threshold = self.deps.clock.before(self.max_age);
        let removed = self
            .deps
            .store
            .remove_where(&|m| m.created_at < threshold)
            .await?;
        info!(
            operation_id = %ctx.id(),
            max_age_seconds = self.max_age.as_secs(),
            removed,
            "🧹 Evicted old messages"
        );
        Ok(removed)
    }
}
