//! Configuration system for streamhost.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $STREAMHOST_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/streamhost/config.toml
//!   3. ~/.config/streamhost/config.toml

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::PathBuf;
use std::time::Duration;

use crate::wire::{DEFAULT_STREAM_PORT, DISCOVERY_PORT};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamhostConfig {
    pub discovery: DiscoveryConfig,
    pub storage: StorageConfig,
    pub responder: ResponderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Start background discovery when the client comes up.
    pub enabled: bool,
    /// Time between the start of two discovery rounds.
    pub interval_ms: u64,
    /// How long a round waits for replies. Clamped to `interval_ms`.
    pub round_timeout_ms: u64,
    /// Port hosts listen on for probes.
    pub port: u16,
    /// Explicit probe destinations ("ip:port"). Empty = IPv4 broadcast on `port`.
    pub targets: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON file holding the known hosts between runs.
    pub hosts_path: PathBuf,
    /// Save the host list on shutdown.
    pub autosave: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponderConfig {
    /// Display name announced to clients.
    pub name: String,
    /// Hex host id. Empty = random per run.
    pub host_id: String,
    /// Streaming port announced to clients.
    pub stream_port: u16,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 5_000,
            round_timeout_ms: 1_500,
            port: DISCOVERY_PORT,
            targets: Vec::new(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            hosts_path: data_dir().join("hosts.json"),
            autosave: true,
        }
    }
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            name: std::env::var("HOSTNAME").unwrap_or_else(|_| "streamhost".to_string()),
            host_id: String::new(),
            stream_port: DEFAULT_STREAM_PORT,
        }
    }
}

impl DiscoveryConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }

    /// Per-round reply window, never longer than the interval.
    pub fn round_timeout(&self) -> Duration {
        Duration::from_millis(self.round_timeout_ms.min(self.interval_ms).max(1))
    }

    /// Resolve probe destinations. Unparseable targets are returned as errors.
    pub fn probe_targets(&self) -> Result<Vec<SocketAddr>, ConfigError> {
        if self.targets.is_empty() {
            return Ok(vec![SocketAddr::V4(SocketAddrV4::new(
                Ipv4Addr::BROADCAST,
                self.port,
            ))]);
        }
        self.targets
            .iter()
            .map(|t| {
                t.parse::<SocketAddr>()
                    .map_err(|_| ConfigError::InvalidTarget(t.clone()))
            })
            .collect()
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("streamhost")
}

pub fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".local").join("share"))
        .join("streamhost")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
    #[error("invalid probe target: {0}")]
    InvalidTarget(String),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl StreamhostConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            StreamhostConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("STREAMHOST_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&StreamhostConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply STREAMHOST_* env var overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("STREAMHOST_DISCOVERY__ENABLED") {
            self.discovery.enabled = v == "true" || v == "1";
        }
        if let Some(Ok(ms)) = var("STREAMHOST_DISCOVERY__INTERVAL_MS").map(|v| v.parse()) {
            self.discovery.interval_ms = ms;
        }
        if let Some(Ok(ms)) = var("STREAMHOST_DISCOVERY__ROUND_TIMEOUT_MS").map(|v| v.parse()) {
            self.discovery.round_timeout_ms = ms;
        }
        if let Some(Ok(port)) = var("STREAMHOST_DISCOVERY__PORT").map(|v| v.parse()) {
            self.discovery.port = port;
        }
        if let Some(v) = var("STREAMHOST_STORAGE__HOSTS_PATH") {
            self.storage.hosts_path = PathBuf::from(v);
        }
        if let Some(v) = var("STREAMHOST_RESPONDER__NAME") {
            self.responder.name = v;
        }
    }
}
