use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use anyhow::{Context, Result};
use keyring::Entry;
use parking_lot::Mutex;
use tracing::warn;

/// Session file name in the data directory
const SESSION_FILE: &str = "session.json";

/// Keychain service name; each storage key becomes one entry under it.
const SERVICE_NAME: &str = "forwardkey";

/// String key-value persistence, shaped like browser local storage.
pub trait Storage: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>>;
    fn set_item(&self, key: &str, value: &str) -> Result<()>;
    fn remove_item(&self, key: &str) -> Result<()>;
}

/// All keys in one JSON object file.
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            path: data_dir.join(SESSION_FILE),
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents =
            std::fs::read_to_string(&self.path).context("Failed to read session file")?;
        serde_json::from_str(&contents).context("Failed to parse session file")
    }

    /// Current items as the base for a write. A file that no longer parses
    /// is replaced rather than blocking every future write.
    fn read_for_update(&self) -> Result<BTreeMap<String, String>> {
        match self.read_all() {
            Err(e) if e.downcast_ref::<serde_json::Error>().is_some() => {
                warn!(error = %e, path = %self.path.display(), "Replacing unreadable session file");
                Ok(BTreeMap::new())
            }
            other => other,
        }
    }

    fn write_all(&self, items: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(items)?;
        std::fs::write(&self.path, contents).context("Failed to write session file")?;
        Ok(())
    }
}

impl Storage for FileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read_all()?.remove(key))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let mut items = self.read_for_update()?;
        items.insert(key.to_string(), value.to_string());
        self.write_all(&items)
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        let mut items = self.read_for_update()?;
        if items.remove(key).is_some() {
            self.write_all(&items)?;
        }
        Ok(())
    }
}

/// OS keychain backend.
pub struct KeyringStorage;

impl KeyringStorage {
    fn entry(key: &str) -> Result<Entry> {
        Entry::new(SERVICE_NAME, key).context("Failed to create keyring entry")
    }
}

impl Storage for KeyringStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        match Self::entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to retrieve value from keychain"),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        Self::entry(key)?
            .set_password(value)
            .context("Failed to store value in keychain")
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        match Self::entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete value from keychain"),
        }
    }
}

/// Process-local storage; nothing survives a restart.
#[derive(Default)]
pub struct MemoryStorage {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.items.lock().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.items.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.items.lock().remove(key);
        Ok(())
    }
}
