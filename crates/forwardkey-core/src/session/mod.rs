//! Session persistence for the bearer credential.
//!
//! This module provides:
//! - `SessionStore`: the `token` / `token_expires_at` pair plus an explicit
//!   `SessionState`, shared by the API client and the bootstrap flow
//! - `Storage`: the key-value backend trait, with file, keyring and
//!   in-memory implementations
//!
//! Expiry is stored but never checked here; a token is used until the
//! backend rejects it.

pub mod storage;
pub mod store;

pub use storage::{FileStorage, KeyringStorage, MemoryStorage, Storage};
pub use store::{Credential, SessionInfo, SessionState, SessionStore, EXPIRES_AT_KEY, TOKEN_KEY};
