use crate::constants::kinds;
use crate::error::Result;
use crate::messaging::models::Message;
use crate::messaging::subservice::LocalMessageSource;
use crate::operation::{Executable, OperationContext, OperationKind};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Collects messages delivered through local channels since the last fetch
pub struct LocalMessageFetchOperation {
    source: Arc<dyn LocalMessageSource>,
}

impl LocalMessageFetchOperation {
    pub fn new(source: Arc<dyn LocalMessageSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Executable for LocalMessageFetchOperation {
    type Output = Vec<Message>;

    fn kind(&self) -> OperationKind {
        OperationKind::new(kinds::LOCAL_MESSAGE_FETCH)
    }

    async fn execute(&self, ctx: &OperationContext) -> Result<Vec<Message>> {
        let messages = self.source.take_messages().await;
        debug!(operation_id = %ctx.id(), count = messages.len(), "Fetched local messages");
        Ok(messages)
    }
}
