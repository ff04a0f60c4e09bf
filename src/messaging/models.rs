//! # Message Models
//!
//! Persisted message records and the status fields the message handler
//! updates after each exchange with the backend. Payloads are opaque JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Mobile-terminated: received from the backend
    Inbound,
    /// Mobile-originated: composed on the device
    Outbound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMethod {
    Push,
    Pull,
    /// Delivered through a local channel such as the notification center
    Local,
    GeneratedLocally,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeenStatus {
    #[default]
    NotSeen,
    /// Seen locally, report not yet accepted by the backend
    SeenNotSent,
    SeenSent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendStatus {
    #[default]
    Undefined,
    Sent,
    Failed,
}

/// A persisted message record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub message_id: String,
    pub direction: Direction,
    pub delivery_method: DeliveryMethod,
    #[serde(default)]
    pub seen_status: SeenStatus,
    #[serde(default)]
    pub send_status: SendStatus,
    #[serde(default)]
    pub is_silent: bool,
    /// Whether the delivery report for this message was accepted by the backend
    #[serde(default)]
    pub delivery_report_sent: bool,
    pub created_at: DateTime<Utc>,
    pub seen_at: Option<DateTime<Utc>>,
    pub delivery_reported_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Message {
    /// New inbound message as received from push or pull delivery
    pub fn inbound(
        message_id: impl Into<String>,
        delivery_method: DeliveryMethod,
        created_at: DateTime<Utc>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            direction: Direction::Inbound,
            delivery_method,
            seen_status: SeenStatus::NotSeen,
            send_status: SendStatus::Undefined,
            is_silent: false,
            delivery_report_sent: false,
            created_at,
            seen_at: None,
            delivery_reported_at: None,
            payload,
        }
    }

    pub fn is_inbound(&self) -> bool {
        self.direction == Direction::Inbound
    }

    /// Messages generated on the device carry a UUID id until the backend assigns one
    pub fn has_sdk_generated_id(&self) -> bool {
        is_sdk_generated_id(&self.message_id)
    }
}

pub fn is_sdk_generated_id(message_id: &str) -> bool {
    Uuid::parse_str(message_id).is_ok()
}

/// A mobile-originated message the application wants to send
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub message_id: String,
    pub destination: Option<String>,
    pub text: String,
    #[serde(default)]
    pub custom_payload: serde_json::Value,
    pub composed_at: DateTime<Utc>,
}

impl OutgoingMessage {
    /// Outgoing message with an SDK-generated id
    pub fn new(text: impl Into<String>, composed_at: DateTime<Utc>) -> Self {
        Self {
            message_id: Uuid::new_v4().to_string(),
            destination: None,
            text: text.into(),
            custom_payload: serde_json::Value::Null,
            composed_at,
        }
    }

    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    /// Persisted record for this message before it is sent
    pub fn to_message(&self) -> Message {
        Message {
            message_id: self.message_id.clone(),
            direction: Direction::Outbound,
            delivery_method: DeliveryMethod::GeneratedLocally,
            seen_status: SeenStatus::NotSeen,
            send_status: SendStatus::Undefined,
            is_silent: false,
            delivery_report_sent: false,
            created_at: self.composed_at,
            seen_at: None,
            delivery_reported_at: None,
            payload: serde_json::json!({
                "text": self.text,
                "destination": self.destination,
                "customPayload": self.custom_payload,
            }),
        }
    }
}
