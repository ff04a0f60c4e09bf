//! # Message Storage
//!
//! The persistence collaborator the message operations read and update. The
//! concrete embedded database belongs to the host; [`InMemoryMessageStore`]
//! backs tests and hosts without persistence.

use super::models::Message;
use crate::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Insert or replace records by message id
    async fn insert(&self, messages: Vec<Message>) -> Result<()>;

    async fn get(&self, message_id: &str) -> Result<Option<Message>>;

    async fn find_where(
        &self,
        predicate: &(dyn for<'m> Fn(&'m Message) -> bool + Send + Sync),
    ) -> Result<Vec<Message>>;

    /// Apply `update` to every matching record; returns the number updated
    async fn update_where(
        &self,
        predicate: &(dyn for<'m> Fn(&'m Message) -> bool + Send + Sync),
        update: &(dyn for<'m> Fn(&'m mut Message) + Send + Sync),
    ) -> Result<usize>;

    /// Remove every matching record; returns the number removed
    async fn remove_where(
        &self,
        predicate: &(dyn for<'m> Fn(&'m Message) -> bool + Send + Sync),
    ) -> Result<usize>;

    async fn remove_all(&self) -> Result<usize>;

    async fn count(&self) -> Result<usize> {
        Ok(self.find_where(&|_| true).await?.len())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryMessageStore {
    messages: DashMap<String, Message>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn insert(&self, messages: Vec<Message>) -> Result<()> {
        for message in messages {
            self.messages.insert(message.message_id.clone(), message);
        }
        Ok(())
    }

    async fn get(&self, message_id: &str) -> Result<Option<Message>> {
        Ok(self.messages.get(message_id).map(|entry| entry.value().clone()))
    }

    async fn find_where(
        &self,
        predicate: &(dyn for<'m> Fn(&'m Message) -> bool + Send + Sync),
    ) -> Result<Vec<Message>> {
        Ok(self
            .messages
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn update_where(
        &self,
        predicate: &(dyn for<'m> Fn(&'m Message) -> bool + Send + Sync),
        update: &(dyn for<'m> Fn(&'m mut Message) + Send + Sync),
    ) -> Result<usize> {
        let mut updated = 0;
        for mut entry in self.messages.iter_mut() {
            if predicate(entry.value()) {
                update(entry.value_mut());
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn remove_where(
        &self,
        predicate: &(dyn for<'m> Fn(&'m Message) -> bool + Send + Sync),
    ) -> Result<usize> {
        let before = self.messages.len();
        self.messages.retain(|_, message| !predicate(message));
        Ok(before.saturating_sub(self.messages.len()))
    }

    async fn remove_all(&self) -> Result<usize> {
        let removed = self.messages.len();
        self.messages.clear();
        Ok(removed)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.messages.len())
    }
}
