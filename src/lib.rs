#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Courier Core
//!
//! Resilient, in-process operation pipeline for a mobile messaging SDK
//! backend, plus the message synchronization orchestrator built on it.
//!
//! ## Overview
//!
//! Work is expressed as operations: units with a kind tag, gating
//! conditions, a cancellation flag and an optional retry policy. Queues run
//! them in FIFO order with bounded concurrency and can refuse a submission
//! while another operation of the same kind is outstanding. Failed remote
//! requests are retried with quadratic backoff or, when the network is down,
//! re-executed once it comes back.
//!
//! The [`messaging::MessageHandler`] uses that machinery to keep the local
//! message store consistent with the backend: handling incoming messages,
//! reconciling delivery and archive state, reporting seen status through a
//! debounce window, evicting old messages and posting mobile-originated ones.
//!
//! ## Module Organization
//!
//! - [`operation`] - Operations, conditions, retry, queues and remote requests
//! - [`messaging`] - Message models, storage, operations and the handler
//! - [`client`] - HTTP transport for remote requests
//! - [`reachability`] - Network reachability monitoring
//! - [`installation`] - Registration health and depersonalization status
//! - [`config`] - Configuration types and YAML loading
//! - [`error`] - Pipeline error type and classification
//! - [`logging`] - Structured logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use courier_core::config::PipelineConfig;
//! use courier_core::installation::InstallationState;
//! use courier_core::messaging::{HandlerCollaborators, InMemoryMessageStore, MessageHandler};
//! use courier_core::client::{HttpClientConfig, HttpRequestExecutor};
//! use std::sync::Arc;
//!
//! # async fn example() -> courier_core::Result<()> {
//! courier_core::logging::init_structured_logging();
//!
//! let config = PipelineConfig::default();
//! let executor = HttpRequestExecutor::new(HttpClientConfig::default())?;
//! let handler = MessageHandler::new(
//!     &config,
//!     HandlerCollaborators::for_installation(
//!         Arc::new(InMemoryMessageStore::new()),
//!         Arc::new(executor),
//!         Arc::new(InstallationState::registered("push-registration-id")),
//!     ),
//! );
//!
//! handler.start().await;
//! handler.set_seen(vec!["message-id".to_string()], false).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod constants;
pub mod error;
pub mod installation;
pub mod logging;
pub mod messaging;
pub mod operation;
pub mod reachability;
pub mod utils;

pub use config::{ConfigManager, ConfigurationError, PipelineConfig};
pub use error::{classify_http_status, ErrorCategory, PipelineError, Result};
pub use messaging::{MessageHandler, MessageHandlingResult};
pub use operation::{
    Executable, Operation, OperationHandle, OperationKind, OperationOutcome, OperationQueue,
    OperationState, RetryPolicy,
};
pub use reachability::{NetworkReachability, ReachabilityMonitor};
