use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::storage::{FileStorage, KeyringStorage, MemoryStorage, Storage};
use crate::config::{ClientConfig, StorageKind};

/// Storage key holding the bearer token
pub const TOKEN_KEY: &str = "token";

/// Storage key holding the expiry string returned with the token
pub const EXPIRES_AT_KEY: &str = "token_expires_at";

/// The persisted bearer credential. `expires_at` is whatever the backend
/// sent; nothing in this crate compares it with the clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Credential {
    pub token: String,
    pub expires_at: String,
}

/// Raw view of both storage keys, each possibly absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct SessionInfo {
    pub token: Option<String>,
    pub token_expires_at: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum SessionState {
    Anonymous,
    Authenticated,
}

struct Inner {
    storage: Box<dyn Storage>,
    state: SessionState,
}

/// Credential store shared between the API client and bootstrap.
///
/// Backend failures are logged and otherwise treated as success: a failed
/// read reads as absent, a failed write leaves the previous state in place.
/// The state enum is updated under the same lock as the backend.
pub struct SessionStore {
    inner: Mutex<Inner>,
}

impl SessionStore {
    pub fn new(storage: Box<dyn Storage>) -> Self {
        let state = match read_key(storage.as_ref(), TOKEN_KEY) {
            Some(_) => SessionState::Authenticated,
            None => SessionState::Anonymous,
        };
        debug!(?state, "Session store opened");
        Self {
            inner: Mutex::new(Inner { storage, state }),
        }
    }

    /// Open the backend selected in the config.
    pub fn open(config: &ClientConfig) -> Result<Self> {
        let storage: Box<dyn Storage> = match config.storage {
            StorageKind::File => Box::new(FileStorage::new(config.data_dir()?)),
            StorageKind::Keyring => Box::new(KeyringStorage),
            StorageKind::Memory => Box::new(MemoryStorage::new()),
        };
        Ok(Self::new(storage))
    }

    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryStorage::new()))
    }

    /// Current credential, if a token is stored. No expiry validation.
    pub fn get(&self) -> Option<Credential> {
        let inner = self.inner.lock();
        let token = read_key(inner.storage.as_ref(), TOKEN_KEY)?;
        let expires_at = read_key(inner.storage.as_ref(), EXPIRES_AT_KEY).unwrap_or_default();
        Some(Credential { token, expires_at })
    }

    /// Overwrite the stored credential. Failures are logged; see `try_set`.
    pub fn set(&self, token: &str, expires_at: &str) {
        if let Err(e) = self.try_set(token, expires_at) {
            warn!(error = %e, "Failed to persist session");
        }
    }

    /// Overwrite the stored credential, reporting backend failures.
    ///
    /// Both keys are written or neither is: if the expiry write fails the
    /// previous token is put back and the state is left as it was.
    pub fn try_set(&self, token: &str, expires_at: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        let previous_token = read_key(inner.storage.as_ref(), TOKEN_KEY);

        inner
            .storage
            .set_item(TOKEN_KEY, token)
            .context("Failed to persist token")?;

        if let Err(e) = inner.storage.set_item(EXPIRES_AT_KEY, expires_at) {
            let rollback = match previous_token {
                Some(ref previous) => inner.storage.set_item(TOKEN_KEY, previous),
                None => inner.storage.remove_item(TOKEN_KEY),
            };
            if let Err(rollback_err) = rollback {
                warn!(error = %rollback_err, "Failed to restore previous token");
            }
            return Err(e).context("Failed to persist token expiry");
        }

        inner.state = SessionState::Authenticated;
        Ok(())
    }

    /// Remove both keys. The client only does this when clear-on-401 is
    /// enabled; otherwise it is an explicit logout.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        for key in [TOKEN_KEY, EXPIRES_AT_KEY] {
            if let Err(e) = inner.storage.remove_item(key) {
                warn!(error = %e, key, "Failed to remove session key");
            }
        }
        inner.state = SessionState::Anonymous;
    }

    pub fn info(&self) -> SessionInfo {
        let inner = self.inner.lock();
        SessionInfo {
            token: read_key(inner.storage.as_ref(), TOKEN_KEY),
            token_expires_at: read_key(inner.storage.as_ref(), EXPIRES_AT_KEY),
        }
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    /// Get the bearer token if one is stored
    pub fn token(&self) -> Option<String> {
        let inner = self.inner.lock();
        read_key(inner.storage.as_ref(), TOKEN_KEY)
    }
}

fn read_key(storage: &dyn Storage, key: &str) -> Option<String> {
    match storage.get_item(key) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, key, "Failed to read session key");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    /// Backend whose writes always fail.
    struct ReadOnlyStorage;

    impl Storage for ReadOnlyStorage {
        fn get_item(&self, _key: &str) -> Result<Option<String>> {
            Ok(None)
        }
        fn set_item(&self, _key: &str, _value: &str) -> Result<()> {
            Err(anyhow!("read-only"))
        }
        fn remove_item(&self, _key: &str) -> Result<()> {
            Err(anyhow!("read-only"))
        }
    }

    /// Backend that refuses to store the expiry key.
    #[derive(Default)]
    struct NoExpiryStorage {
        inner: MemoryStorage,
    }

    impl Storage for NoExpiryStorage {
        fn get_item(&self, key: &str) -> Result<Option<String>> {
            self.inner.get_item(key)
        }
        fn set_item(&self, key: &str, value: &str) -> Result<()> {
            if key == EXPIRES_AT_KEY {
                return Err(anyhow!("disk full"));
            }
            self.inner.set_item(key, value)
        }
        fn remove_item(&self, key: &str) -> Result<()> {
            self.inner.remove_item(key)
        }
    }

    #[test]
    fn test_empty_store_is_anonymous() {
        let store = SessionStore::in_memory();
        assert_eq!(store.get(), None);
        assert_eq!(store.state(), SessionState::Anonymous);
        assert_eq!(store.info(), SessionInfo::default());
    }

    #[test]
    fn test_set_overwrites_and_authenticates() {
        let store = SessionStore::in_memory();
        store.set("first", "2024-01-01T00:00:00Z");
        store.set("abc123", "2025-01-01T00:00:00Z");

        assert_eq!(
            store.get(),
            Some(Credential {
                token: "abc123".to_string(),
                expires_at: "2025-01-01T00:00:00Z".to_string(),
            })
        );
        assert_eq!(store.state(), SessionState::Authenticated);
        assert_eq!(store.token().as_deref(), Some("abc123"));
    }

    #[test]
    fn test_expired_credential_is_still_returned() {
        let store = SessionStore::in_memory();
        store.set("old", "2000-01-01T00:00:00Z");
        assert_eq!(store.get().map(|c| c.token), Some("old".to_string()));
    }

    #[test]
    fn test_token_without_expiry() {
        let storage = MemoryStorage::new();
        storage.set_item(TOKEN_KEY, "lonely").unwrap();
        let store = SessionStore::new(Box::new(storage));

        assert_eq!(store.state(), SessionState::Authenticated);
        let credential = store.get().expect("token present");
        assert_eq!(credential.expires_at, "");
        assert_eq!(store.info().token_expires_at, None);
    }

    #[test]
    fn test_clear_returns_to_anonymous() {
        let store = SessionStore::in_memory();
        store.set("abc", "later");
        store.clear();
        assert_eq!(store.get(), None);
        assert_eq!(store.state(), SessionState::Anonymous);
    }

    #[test]
    fn test_failed_write_keeps_state() {
        let store = SessionStore::new(Box::new(ReadOnlyStorage));
        store.set("abc", "later");
        assert_eq!(store.state(), SessionState::Anonymous);
        assert_eq!(store.get(), None);
    }

    #[test]
    fn test_failed_expiry_write_restores_previous_token() {
        let storage = NoExpiryStorage::default();
        storage.inner.set_item(TOKEN_KEY, "old-token").unwrap();
        storage.inner.set_item(EXPIRES_AT_KEY, "old-exp").unwrap();
        let store = SessionStore::new(Box::new(storage));

        assert!(store.try_set("new-token", "new-exp").is_err());
        store.set("new-token", "new-exp");

        assert_eq!(
            store.get(),
            Some(Credential {
                token: "old-token".to_string(),
                expires_at: "old-exp".to_string(),
            })
        );
        assert_eq!(store.state(), SessionState::Authenticated);
    }

    #[test]
    fn test_failed_expiry_write_on_empty_store_stays_anonymous() {
        let store = SessionStore::new(Box::new(NoExpiryStorage::default()));

        assert!(store.try_set("new-token", "new-exp").is_err());

        assert_eq!(store.get(), None);
        assert_eq!(store.state(), SessionState::Anonymous);
    }

    #[test]
    fn test_file_backed_store_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = ClientConfig {
            data_dir: Some(dir.path().to_path_buf()),
            ..ClientConfig::default()
        };

        SessionStore::open(&config).unwrap().set("abc", "exp");

        let reopened = SessionStore::open(&config).unwrap();
        assert_eq!(reopened.state(), SessionState::Authenticated);
        assert_eq!(reopened.token().as_deref(), Some("abc"));
    }
}
