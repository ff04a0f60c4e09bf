//! # System Constants
//!
//! Queue names, operation kinds and the default limits of the messaging
//! pipeline. Tunable values have matching fields in [`crate::config`]; the
//! constants here are the defaults those fields start from.

/// Retry limit used by remote requests that do not set their own
pub const DEFAULT_RETRY_LIMIT: u32 = 3;

/// Queue names owned by the message handler
pub mod queues {
    pub const HANDLING: &str = "message-handling";
    pub const SENDING: &str = "message-sending";
    pub const SYNC: &str = "message-sync";
    pub const REQUEST: &str = "remote-request";
}

/// Operation kind tags for the message handler's non-generic operations
pub mod kinds {
    pub const MESSAGE_HANDLING: &str = "message_handling";
    pub const MESSAGES_SYNC: &str = "messages_sync";
    pub const LOCAL_MESSAGE_FETCH: &str = "local_message_fetch";
    pub const SEEN_STATUS_PERSISTING: &str = "seen_status_persisting";
    pub const SEEN_STATUS_SENDING: &str = "seen_status_sending";
    pub const MESSAGES_EVICTION: &str = "messages_eviction";
    pub const MESSAGE_POSTING: &str = "message_posting";
    pub const MESSAGE_ID_UPDATE: &str = "message_id_update";
    pub const STORAGE_RESET: &str = "storage_reset";
}

/// Backend API paths
pub mod paths {
    pub const SYNC_MESSAGES: &str = "/mobile/5/messages";
    pub const SEEN_MESSAGES: &str = "/mobile/2/messages/seen";
    pub const SEND_MESSAGES: &str = "/mobile/1/messages/mo";
}

/// Header carrying the application code on every backend request
pub const APPLICATION_CODE_HEADER: &str = "Authorization";
pub const PUSH_REGISTRATION_HEADER: &str = "pushregistrationid";

/// Identifier of the message handler when it appears among subservices
pub const MESSAGE_HANDLER_SERVICE_ID: &str = "message_handler";
