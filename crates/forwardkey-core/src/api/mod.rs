//! REST API client module for the openai-forward management API.
//!
//! This module provides the `ApiClient` for the auth handshake and the
//! model listings. Every call goes through one pipeline: request
//! interceptors (bearer token) before the send, envelope normalization
//! after it.

pub mod client;
pub mod envelope;
pub mod error;
pub mod interceptor;

pub use client::{ApiClient, AuthGrant};
pub use error::ClientError;
pub use interceptor::{BearerAuth, RequestInterceptor};
