//! # Backend API Shapes
//!
//! Typed remote requests used by the message operations. Each request builds
//! its passive [`ApiRequest`]; the wire field names follow the backend's JSON
//! contract.

use super::models::{DeliveryMethod, Message, OutgoingMessage};
use crate::constants::{paths, PUSH_REGISTRATION_HEADER};
use crate::error::Result;
use crate::operation::{ApiRequest, RemoteRequest};
use chrono::{DateTime, Utc};
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Reconciliation: report delivered and archived ids, receive pending messages
#[derive(Debug, Clone, PartialEq)]
pub struct SyncMessagesRequest {
    pub push_registration_id: String,
    pub archive_message_ids: Vec<String>,
    pub delivered_message_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
struct SyncMessagesBody<'a> {
    #[serde(rename = "mIDs")]
    archive_message_ids: &'a [String],
    #[serde(rename = "drIDs")]
    delivered_message_ids: &'a [String],
}

/// A message as returned by the sync endpoint
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteMessage {
    #[serde(rename = "messageId")]
    pub message_id: String,
    #[serde(default)]
    pub silent: bool,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl RemoteMessage {
    pub fn into_message(self, received_at: DateTime<Utc>) -> Message {
        let mut message = Message::inbound(
            self.message_id,
            DeliveryMethod::Pull,
            received_at,
            Value::Object(self.payload),
        );
        message.is_silent = self.silent;
        message
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SyncMessagesResponse {
    #[serde(default)]
    pub messages: Option<Vec<RemoteMessage>>,
}

impl RemoteRequest for SyncMessagesRequest {
    type Response = SyncMessagesResponse;

    fn to_api_request(&self) -> Result<ApiRequest> {
        ApiRequest::post(paths::SYNC_MESSAGES)
            .with_header(PUSH_REGISTRATION_HEADER, &self.push_registration_id)
            .with_json(&SyncMessagesBody {
                archive_message_ids: &self.archive_message_ids,
                delivered_message_ids: &self.delivered_message_ids,
            })
    }
}

/// One seen report entry
#[derive(Debug, Clone, PartialEq)]
pub struct SeenEntry {
    pub message_id: String,
    pub seen_at: DateTime<Utc>,
}

/// Report of messages seen on the device
#[derive(Debug, Clone, PartialEq)]
pub struct SeenStatusRequest {
    pub push_registration_id: Option<String>,
    pub entries: Vec<SeenEntry>,
    /// Reference time for the `timestampDelta` field
    pub reported_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct SeenMessageBody {
    #[serde(rename = "messageId")]
    message_id: String,
    #[serde(rename = "timestampDelta")]
    timestamp_delta: i64,
}

#[derive(Debug, Serialize)]
struct SeenStatusBody {
    messages: Vec<SeenMessageBody>,
}

impl SeenStatusRequest {
    pub fn message_ids(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.message_id.clone()).collect()
    }
}

impl RemoteRequest for SeenStatusRequest {
    /// The backend acknowledges with an empty body or an empty object
    type Response = IgnoredAny;

    fn to_api_request(&self) -> Result<ApiRequest> {
        let body = SeenStatusBody {
            messages: self
                .entries
                .iter()
                .map(|entry| SeenMessageBody {
                    message_id: entry.message_id.clone(),
                    timestamp_delta: (self.reported_at - entry.seen_at).num_seconds().max(0),
                })
                .collect(),
        };
        let mut request = ApiRequest::post(paths::SEEN_MESSAGES).with_json(&body)?;
        if let Some(id) = &self.push_registration_id {
            request = request.with_header(PUSH_REGISTRATION_HEADER, id);
        }
        Ok(request)
    }
}

/// Mobile-originated messages to post
#[derive(Debug, Clone, PartialEq)]
pub struct SendMessagesRequest {
    pub push_registration_id: String,
    pub messages: Vec<OutgoingMessage>,
}

#[derive(Debug, Serialize)]
struct OutgoingMessageBody<'a> {
    #[serde(rename = "messageId")]
    message_id: &'a str,
    destination: Option<&'a str>,
    text: &'a str,
    #[serde(rename = "customPayload", skip_serializing_if = "Value::is_null")]
    custom_payload: &'a Value,
}

#[derive(Debug, Serialize)]
struct SendMessagesBody<'a> {
    from: &'a str,
    messages: Vec<OutgoingMessageBody<'a>>,
}

/// Per-message result of a send request; status code 0 means accepted
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SentMessageStatus {
    #[serde(rename = "messageId")]
    pub message_id: String,
    #[serde(rename = "statusCode", default)]
    pub status_code: i32,
}

impl SentMessageStatus {
    pub fn is_accepted(&self) -> bool {
        self.status_code == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SendMessagesResponse {
    #[serde(default)]
    pub messages: Vec<SentMessageStatus>,
}

impl RemoteRequest for SendMessagesRequest {
    type Response = SendMessagesResponse;

    fn to_api_request(&self) -> Result<ApiRequest> {
        let body = SendMessagesBody {
            from: &self.push_registration_id,
            messages: self
                .messages
                .iter()
                .map(|m| OutgoingMessageBody {
                    message_id: &m.message_id,
                    destination: m.destination.as_deref(),
                    text: &m.text,
                    custom_payload: &m.custom_payload,
                })
                .collect(),
        };
        ApiRequest::post(paths::SEND_MESSAGES)
            .with_header(PUSH_REGISTRATION_HEADER, &self.push_registration_id)
            .with_json(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_sync_request_body() {
        let request = SyncMessagesRequest {
            push_registration_id: "reg-1".to_string(),
            archive_message_ids: vec!["a".to_string()],
            delivered_message_ids: vec!["b".to_string(), "c".to_string()],
        };
        let api = request.to_api_request().unwrap();
        assert_eq!(api.path, paths::SYNC_MESSAGES);
        assert_eq!(api.headers.get(PUSH_REGISTRATION_HEADER).unwrap(), "reg-1");
        assert_eq!(api.body, Some(json!({"mIDs": ["a"], "drIDs": ["b", "c"]})));
    }

    #[test]
    fn test_seen_request_reports_timestamp_delta() {
        let reported_at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 30).unwrap();
        let request = SeenStatusRequest {
            push_registration_id: None,
            entries: vec![SeenEntry {
                message_id: "m-1".to_string(),
                seen_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            }],
            reported_at,
        };
        let api = request.to_api_request().unwrap();
        assert_eq!(
            api.body,
            Some(json!({"messages": [{"messageId": "m-1", "timestampDelta": 30}]}))
        );
    }

    #[test]
    fn test_remote_message_keeps_payload() {
        let remote: RemoteMessage = serde_json::from_value(json!({
            "messageId": "m-9",
            "silent": true,
            "aps": {"alert": "hi"}
        }))
        .unwrap();
        let message = remote.into_message(Utc::now());
        assert_eq!(message.message_id, "m-9");
        assert!(message.is_silent);
        assert_eq!(message.payload["aps"]["alert"], "hi");
        assert_eq!(message.delivery_method, DeliveryMethod::Pull);
    }
}
