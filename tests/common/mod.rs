//! Shared test infrastructure: scripted transport, recording subservice,
//! controllable collaborators and a ready-to-start message handler harness.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use courier_core::config::PipelineConfig;
use courier_core::error::{PipelineError, Result};
use courier_core::installation::InstallationState;
use courier_core::messaging::{
    DeliveryMethod, HandlerCollaborators, InMemoryMessageStore, LocalMessageSource, Message,
    MessageHandler, Subservice,
};
use courier_core::operation::{ApiRequest, RequestExecutor};
use courier_core::reachability::NetworkReachability;
use courier_core::utils::FixedClock;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Request executor answering from per-path scripts and recording every call
#[derive(Default)]
pub struct ScriptedExecutor {
    scripts: Mutex<HashMap<String, VecDeque<Result<Value>>>>,
    calls: Mutex<Vec<ApiRequest>>,
}

impl ScriptedExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a response for the next call to `path`; unscripted calls get `{}`
    pub fn respond(&self, path: &str, response: Result<Value>) {
        self.scripts
            .lock()
            .entry(path.to_string())
            .or_default()
            .push_back(response);
    }

    pub fn calls(&self) -> Vec<ApiRequest> {
        self.calls.lock().clone()
    }

    pub fn calls_to(&self, path: &str) -> Vec<ApiRequest> {
        self.calls
            .lock()
            .iter()
            .filter(|request| request.path == path)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl RequestExecutor for ScriptedExecutor {
    async fn send(&self, request: &ApiRequest) -> Result<Value> {
        self.calls.lock().push(request.clone());
        self.scripts
            .lock()
            .get_mut(&request.path)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Ok(json!({})))
    }
}

/// Subservice recording the ids it was notified about
#[derive(Default)]
pub struct RecordingSubservice {
    pub new_messages: Mutex<Vec<String>>,
    pub any_messages: Mutex<Vec<String>>,
}

impl RecordingSubservice {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn new_ids(&self) -> Vec<String> {
        let mut ids = self.new_messages.lock().clone();
        ids.sort();
        ids
    }

    pub fn any_ids(&self) -> Vec<String> {
        let mut ids = self.any_messages.lock().clone();
        ids.sort();
        ids
    }
}

#[async_trait]
impl Subservice for RecordingSubservice {
    fn id(&self) -> &str {
        "recording"
    }

    async fn handle_new_message(&self, message: &Message) {
        self.new_messages.lock().push(message.message_id.clone());
    }

    async fn handle_any_message(&self, message: &Message) {
        self.any_messages.lock().push(message.message_id.clone());
    }
}

/// Local source handing out a fixed set of messages once
#[derive(Default)]
pub struct StaticLocalSource {
    messages: Mutex<Vec<Message>>,
}

impl StaticLocalSource {
    pub fn with_messages(messages: Vec<Message>) -> Arc<Self> {
        Arc::new(Self {
            messages: Mutex::new(messages),
        })
    }
}

#[async_trait]
impl LocalMessageSource for StaticLocalSource {
    async fn take_messages(&self) -> Vec<Message> {
        std::mem::take(&mut *self.messages.lock())
    }
}

pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

pub fn inbound(id: &str, created_at: DateTime<Utc>) -> Message {
    Message::inbound(id, DeliveryMethod::Push, created_at, Value::Null)
}

pub fn network_error() -> PipelineError {
    PipelineError::network("connection reset")
}

/// Config with millisecond backoff and a short seen debounce
pub fn test_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.retry.backoff_unit_ms = 1;
    config.retry.reachability_timeout_seconds = 5;
    config.messages.seen_debounce_ms = 100;
    config
}

/// A message handler wired to in-memory collaborators
pub struct HandlerHarness {
    pub handler: MessageHandler,
    pub store: Arc<InMemoryMessageStore>,
    pub executor: Arc<ScriptedExecutor>,
    pub installation: Arc<InstallationState>,
    pub reachability: Arc<NetworkReachability>,
    pub clock: Arc<FixedClock>,
    pub subservice: Arc<RecordingSubservice>,
}

impl HandlerHarness {
    pub fn new() -> Self {
        Self::with_config(test_config(), None)
    }

    pub fn with_local_source(source: Arc<StaticLocalSource>) -> Self {
        Self::with_config(test_config(), Some(source))
    }

    pub fn with_config(config: PipelineConfig, local_source: Option<Arc<StaticLocalSource>>) -> Self {
        let store = Arc::new(InMemoryMessageStore::new());
        let executor = ScriptedExecutor::new();
        let installation = Arc::new(InstallationState::registered("reg-1"));
        let reachability = Arc::new(NetworkReachability::new(true));
        let clock = Arc::new(FixedClock::new(fixed_now()));
        let subservice = RecordingSubservice::new();

        let mut collaborators =
            HandlerCollaborators::for_installation(store.clone(), executor.clone(), installation.clone())
                .with_reachability(reachability.clone())
                .with_clock(clock.clone())
                .with_subservice(subservice.clone());
        if let Some(source) = local_source {
            collaborators = collaborators.with_local_source(source);
        }

        Self {
            handler: MessageHandler::new(&config, collaborators),
            store,
            executor,
            installation,
            reachability,
            clock,
            subservice,
        }
    }

    /// Start the handler and forget the calls made while starting
    pub async fn started(self) -> Self {
        assert!(self.handler.start().await);
        self.executor.calls.lock().clear();
        self
    }
}
