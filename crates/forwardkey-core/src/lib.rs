//! Core library for forwardkey.
//!
//! This crate is the client side of the openai-forward management API:
//! - `session`: persisted bearer credential (`token` / `token_expires_at`)
//! - `api`: the HTTP pipeline and the named remote operations
//! - `bootstrap`: picks up an authorization code from the current location
//! - `navigation`: where "go to this URL" ends up (system browser, recorder)
//! - `config`: endpoint, origin and storage settings

pub mod api;
pub mod bootstrap;
pub mod config;
pub mod navigation;
pub mod session;

pub use api::{ApiClient, AuthGrant, ClientError};
pub use bootstrap::{bootstrap, Boot};
pub use config::{ClientConfig, StorageKind};
pub use navigation::{Navigator, RecordingNavigator, SystemBrowser};
pub use session::{Credential, SessionInfo, SessionState, SessionStore};
