//! Client configuration management.
//!
//! Settings are resolved in layers: built-in defaults, then
//! `~/.config/forwardkey/config.json` if it exists, then environment
//! variables. The CLI applies its flags on top of the result.

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Application name used for config/data directory paths
pub const APP_NAME: &str = "forwardkey";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// API root the proxy mounts its management routes under.
pub const DEFAULT_API_ENDPOINT: &str = "/api/v1";

/// Origin the proxy serves the web root from.
pub const DEFAULT_ORIGIN: &str = "http://localhost:8080";

const ENV_API_ENDPOINT: &str = "API_ENDPOINT";
const ENV_ORIGIN: &str = "FORWARDKEY_ORIGIN";
const ENV_STORAGE: &str = "FORWARDKEY_STORAGE";
const ENV_CLEAR_ON_401: &str = "FORWARDKEY_CLEAR_ON_401";

/// Where the session store keeps `token` and `token_expires_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    File,
    Keyring,
    Memory,
}

impl FromStr for StorageKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(StorageKind::File),
            "keyring" => Ok(StorageKind::Keyring),
            "memory" => Ok(StorageKind::Memory),
            other => Err(anyhow::anyhow!("Unknown storage kind: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base address prefixed to every API path. Relative values are
    /// resolved against `origin`.
    pub api_endpoint: String,
    pub origin: String,
    pub storage: StorageKind,
    /// Drop the stored credential when the backend answers 401.
    /// Off by default: a rejected token stays persisted and keeps being sent.
    pub clear_session_on_unauthorized: bool,
    /// Whole-request timeout. Unset means requests wait as long as the
    /// backend takes.
    pub request_timeout_secs: Option<u64>,
    pub data_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_endpoint: DEFAULT_API_ENDPOINT.to_string(),
            origin: DEFAULT_ORIGIN.to_string(),
            storage: StorageKind::default(),
            clear_session_on_unauthorized: false,
            request_timeout_secs: None,
            data_dir: None,
        }
    }
}

impl ClientConfig {
    /// Load the config file (if any) and apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_file()?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn load_file() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    /// Apply overrides from an environment lookup. Split out so tests can
    /// feed a map instead of mutating the process environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(endpoint) = lookup(ENV_API_ENDPOINT).filter(|v| !v.is_empty()) {
            self.api_endpoint = endpoint;
        }
        if let Some(origin) = lookup(ENV_ORIGIN).filter(|v| !v.is_empty()) {
            self.origin = origin;
        }
        if let Some(storage) = lookup(ENV_STORAGE).filter(|v| !v.is_empty()) {
            self.storage = storage.parse()?;
        }
        if let Some(flag) = lookup(ENV_CLEAR_ON_401) {
            self.clear_session_on_unauthorized = parse_flag(&flag);
        }
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding the file-backed session store.
    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.data_dir {
            return Ok(dir.clone());
        }
        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
