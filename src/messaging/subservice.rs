//! Subservices interested in incoming messages, plus local message sources.

use super::models::Message;
use async_trait::async_trait;
use futures::future::{join_all, FutureExt};
use std::sync::Arc;
use tracing::debug;

/// A service notified about handled messages
#[async_trait]
pub trait Subservice: Send + Sync {
    fn id(&self) -> &str;

    /// Called for messages that were not known before this batch
    async fn handle_new_message(&self, message: &Message);

    /// Called for every message in a handled batch
    async fn handle_any_message(&self, message: &Message);
}

/// Messages delivered through a local channel (e.g. the notification center)
#[async_trait]
pub trait LocalMessageSource: Send + Sync {
    /// Take the messages delivered locally since the last call
    async fn take_messages(&self) -> Vec<Message>;
}

/// Notify every subservice about a handled batch and wait for all callbacks.
///
/// The join acts as the completion barrier: it resolves only after every
/// subservice has finished with every message.
pub async fn notify_subservices(
    subservices: &[Arc<dyn Subservice>],
    new_messages: &[Message],
    all_messages: &[Message],
) {
    let mut notifications = Vec::new();
    for subservice in subservices {
        for message in new_messages {
            let subservice = subservice.clone();
            notifications.push(async move {
                debug!(
                    subservice = subservice.id(),
                    message_id = %message.message_id,
                    "Subservice handling new message"
                );
                subservice.handle_new_message(message).await;
            }
            .boxed());
        }
        for message in all_messages {
            let subservice = subservice.clone();
            notifications.push(async move {
                debug!(
                    subservice = subservice.id(),
                    message_id = %message.message_id,
                    "Subservice handling message"
                );
                subservice.handle_any_message(message).await;
            }
            .boxed());
        }
    }

    if !notifications.is_empty() {
        let count = notifications.len();
        join_all(notifications).await;
        debug!(notifications = count, "Subservice notifications complete");
    }
}
