use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration loaded from `~/.relay-bridge/config.toml`
/// (overridable via `RELAY_BRIDGE_CONFIG`).
///
/// This governs the bridge's and spawner's own operational knobs. The set of
/// projects they operate against is supplied by the caller as
/// [`crate::types::ProjectConfig`] values, not read from this file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub spawner: SpawnerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            bridge: BridgeConfig::default(),
            spawner: SpawnerConfig::default(),
        }
    }
}

impl Config {
    /// Load config from `RELAY_BRIDGE_CONFIG` if set, else
    /// `~/.relay-bridge/config.toml`, falling back to defaults when the file
    /// does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path();
        if path.exists() {
            Self::load_from(path)
        } else {
            Ok(Config::default())
        }
    }

    /// Load from a specific path.
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let cfg: Config = toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(cfg)
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("RELAY_BRIDGE_CONFIG") {
            return PathBuf::from(path);
        }
        Self::default_path()
    }

    fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".relay-bridge")
            .join("config.toml")
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(String),
    #[error("parse: {0}")]
    Parse(String),
}

// ---------------------------------------------------------------------------
// Section structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub workspace_root: Option<String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            workspace_root: None,
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

/// Handshake identity and reconnect policy for the [`relay_bridge`](../relay_bridge) client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "default_agent_name")]
    pub agent_name: String,
    #[serde(default = "default_reconnect")]
    pub reconnect: bool,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_max_reconnect_delay_ms")]
    pub max_reconnect_delay_ms: u64,
    #[serde(default)]
    pub max_reconnect_attempts: Option<u32>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            agent_name: default_agent_name(),
            reconnect: default_reconnect(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            max_reconnect_delay_ms: default_max_reconnect_delay_ms(),
            max_reconnect_attempts: None,
        }
    }
}

fn default_agent_name() -> String {
    "__BridgeClient".into()
}
fn default_reconnect() -> bool {
    true
}
fn default_reconnect_delay_ms() -> u64 {
    1000
}
fn default_max_reconnect_delay_ms() -> u64 {
    30_000
}

/// Worker-supervision knobs for [`relay_spawner`](../relay_spawner).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnerConfig {
    #[serde(default)]
    pub dashboard_port: Option<u16>,
    #[serde(default = "default_max_workers")]
    pub max_workers: u32,
    #[serde(default = "default_registration_timeout_secs")]
    pub registration_timeout_secs: u64,
    #[serde(default = "default_registration_poll_ms")]
    pub registration_poll_ms: u64,
}

impl Default for SpawnerConfig {
    fn default() -> Self {
        Self {
            dashboard_port: None,
            max_workers: default_max_workers(),
            registration_timeout_secs: default_registration_timeout_secs(),
            registration_poll_ms: default_registration_poll_ms(),
        }
    }
}

fn default_max_workers() -> u32 {
    32
}
fn default_registration_timeout_secs() -> u64 {
    30
}
fn default_registration_poll_ms() -> u64 {
    500
}
