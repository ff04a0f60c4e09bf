//! # Messaging Module
//!
//! Message synchronization built on the operation engine: persisted message
//! records, the backend API shapes, the operations that reconcile local state
//! with the backend, and the [`MessageHandler`] that schedules them.

pub mod api;
pub mod handler;
pub mod lifecycle;
pub mod models;
pub mod operations;
pub mod postponer;
pub mod storage;
pub mod subservice;

pub use api::{
    RemoteMessage, SeenEntry, SeenStatusRequest, SendMessagesRequest, SendMessagesResponse,
    SentMessageStatus, SyncMessagesRequest, SyncMessagesResponse,
};
pub use handler::{HandlerCollaborators, MessageHandler, MessageHandlingResult};
pub use lifecycle::{LifecycleEvent, ServiceEvent, ServiceState, ServiceStateMachine};
pub use models::{
    is_sdk_generated_id, DeliveryMethod, Direction, Message, OutgoingMessage, SeenStatus,
    SendStatus,
};
pub use operations::{HandledBatch, MessagingContext};
pub use postponer::Postponer;
pub use storage::{InMemoryMessageStore, MessageStore};
pub use subservice::{notify_subservices, LocalMessageSource, Subservice};
