//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/tally/config.toml)
//! 3. Environment variables (TALLY_* prefix)
//!
//! Environment variables take precedence over config file values.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::User;

/// Environment variable prefix
const ENV_PREFIX: &str = "TALLY";

/// Default gist API endpoint
pub const DEFAULT_API_BASE_URL: &str = "https://api.github.com/gists";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory for the local snapshot and log file
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Remote document id; remote sync is enabled when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,

    /// Base URL of the remote document API
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Scheme used in the Authorization header
    #[serde(default = "default_auth_scheme")]
    pub auth_scheme: String,

    /// Operator-supplied credential; never expires
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// How long a prompted credential stays cached
    #[serde(default = "default_credential_ttl_minutes")]
    pub credential_ttl_minutes: u64,

    /// Periodic pull interval (0 disables)
    #[serde(default = "default_sync_interval_minutes")]
    pub sync_interval_minutes: u64,

    /// How long a write waits for an in-flight sync before giving up
    #[serde(default = "default_persist_wait_ms")]
    pub persist_wait_ms: u64,

    /// HTTP request timeout
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Version tag written into the remote document
    #[serde(default = "default_document_version")]
    pub document_version: String,

    /// Log file path (default: {data_dir}/debug.log)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,

    /// Users created by an explicit "seed defaults" decision
    #[serde(default = "default_users")]
    pub default_users: Vec<User>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            document_id: None,
            api_base_url: default_api_base_url(),
            auth_scheme: default_auth_scheme(),
            token: None,
            credential_ttl_minutes: default_credential_ttl_minutes(),
            sync_interval_minutes: default_sync_interval_minutes(),
            persist_wait_ms: default_persist_wait_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            document_version: default_document_version(),
            log_file: None,
            default_users: default_users(),
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (TALLY_DATA_DIR, TALLY_DOCUMENT_ID, TALLY_TOKEN, ...)
    /// 2. Config file (~/.config/tally/config.toml or TALLY_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration, preferring a path given on the command line
    pub fn load_with_cli_override(path: Option<&PathBuf>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let mut config = Self::load_file_only(path)?;
        config.apply_env_overrides();
        config.ensure_data_dir()?;
        Ok(config)
    }

    /// Load only what the config file says, without environment overrides
    ///
    /// Use this before editing and saving the file, so values that came from
    /// `TALLY_*` variables (the token in particular) are never written to disk.
    pub fn load_file_only(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var(format!("{}_DATA_DIR", ENV_PREFIX)) {
            self.data_dir = PathBuf::from(val);
        }

        // Empty string clears the document id (local-only mode)
        if let Ok(val) = std::env::var(format!("{}_DOCUMENT_ID", ENV_PREFIX)) {
            self.document_id = non_empty(val);
        }

        if let Ok(val) = std::env::var(format!("{}_API_BASE_URL", ENV_PREFIX)) {
            if !val.is_empty() {
                self.api_base_url = val;
            }
        }

        if let Ok(val) = std::env::var(format!("{}_TOKEN", ENV_PREFIX)) {
            self.token = non_empty(val);
        }

        if let Ok(val) = std::env::var(format!("{}_SYNC_INTERVAL_MINUTES", ENV_PREFIX)) {
            if let Ok(minutes) = val.trim().parse() {
                self.sync_interval_minutes = minutes;
            }
        }
    }

    /// Ensure data directory exists
    fn ensure_data_dir(&self) -> Result<()> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)
                .with_context(|| format!("Failed to create data directory: {:?}", self.data_dir))?;
        }
        Ok(())
    }

    /// Save configuration to the default file
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_file_path())
    }

    /// Save configuration to a specific file
    pub fn save_to_path(&self, config_path: &PathBuf) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with TALLY_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tally")
            .join("config.toml")
    }

    /// Whether a remote document is configured
    pub fn remote_enabled(&self) -> bool {
        self.document_id
            .as_deref()
            .is_some_and(|id| !id.trim().is_empty())
    }

    /// Path of the local snapshot file
    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join("tally.json")
    }

    pub fn credential_ttl(&self) -> Duration {
        Duration::from_secs(self.credential_ttl_minutes * 60)
    }

    /// Periodic pull interval, `None` when disabled
    pub fn sync_interval(&self) -> Option<Duration> {
        (self.sync_interval_minutes > 0)
            .then(|| Duration::from_secs(self.sync_interval_minutes * 60))
    }

    pub fn persist_wait(&self) -> Duration {
        Duration::from_millis(self.persist_wait_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn non_empty(val: String) -> Option<String> {
    if val.trim().is_empty() {
        None
    } else {
        Some(val)
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tally")
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_auth_scheme() -> String {
    "token".to_string()
}

fn default_credential_ttl_minutes() -> u64 {
    30
}

fn default_sync_interval_minutes() -> u64 {
    5
}

fn default_persist_wait_ms() -> u64 {
    1000
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_document_version() -> String {
    "2.1".to_string()
}

/// The two users created when an empty tracker is seeded
pub fn default_users() -> Vec<User> {
    vec![User::new("person1", "Alex"), User::new("person2", "Jordan")]
}
