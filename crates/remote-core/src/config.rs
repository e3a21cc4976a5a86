//! Daemon configuration
//!
//! A compiled-in default is always available; a user file at
//! `~/.config/remote/config.json` fully replaces it when present. Each
//! host gets its own execution policy, with `defaults` covering hosts
//! that have no entry of their own.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// SSH port commands are dispatched over
pub const SSH_PORT: u16 = 22;

/// Idle span with no accepted connections before the daemon exits
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Bound on the SSH dial
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Client-side poll cadence while waiting for a spawned daemon's socket
pub const SPAWN_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Client-side poll attempts before giving up on a spawned daemon
pub const SPAWN_RETRY_ATTEMPTS: u32 = 20;

/// Embedded fallback used when no user config exists
const DEFAULT_CONFIG: &str = include_str!("default_config.json");

/// Per-host execution policy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostPolicy {
    /// Login user; empty means the invoking user's $USER
    #[serde(default)]
    pub user: String,

    /// Permitted command heads, compared byte-for-byte
    #[serde(default)]
    pub allowed_commands: Vec<String>,
}

impl HostPolicy {
    /// Exact-match allow-list check on a command head
    pub fn is_command_allowed(&self, head: &str) -> bool {
        self.allowed_commands.iter().any(|allowed| allowed == head)
    }

    /// Login user, falling back to $USER
    pub fn login_user(&self) -> String {
        if self.user.is_empty() {
            std::env::var("USER").unwrap_or_default()
        } else {
            self.user.clone()
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Per-host policies, keyed by resolved host name
    #[serde(default)]
    pub hosts: HashMap<String, HostPolicy>,

    /// Policy for hosts without an entry of their own
    #[serde(default)]
    pub defaults: HostPolicy,
}

impl Config {
    /// The compiled-in default configuration
    pub fn embedded_default() -> Self {
        serde_json::from_str(DEFAULT_CONFIG).expect("embedded default config is valid JSON")
    }

    /// Load the active configuration.
    ///
    /// The user file at `path` fully replaces the embedded default when
    /// it exists; a present-but-invalid file is an error rather than a
    /// silent fallback, so a typo cannot widen the allow-list.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::embedded_default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Default user config location under `home`
    pub fn user_config_path(home: &Path) -> PathBuf {
        home.join(".config").join("remote").join("config.json")
    }

    /// Active policy for `host`: its own entry, else the defaults
    pub fn policy_for(&self, host: &str) -> &HostPolicy {
        self.hosts.get(host).unwrap_or(&self.defaults)
    }
}
