//! # Backend Clients
//!
//! Transport implementations of [`crate::operation::RequestExecutor`].

pub mod http;

pub use http::{HttpClientConfig, HttpRequestExecutor};
