//! Application configuration
//!
//! Loaded from a TOML file in the platform config directory. Every field has
//! a default so a missing or partial file is fine.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::constants::*;
use crate::error::ConfigError;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub network: NetworkConfig,
    pub registry: RegistryConfig,
    pub ui: UiConfig,
}

/// JACK client settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    /// JACK client name
    pub client_name: String,
    /// Ports per endpoint
    pub channels: usize,
    /// Connect to physical ports after activation
    pub auto_connect: bool,
    /// Handoff queue depth for the send direction
    pub queue_depth: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            client_name: "net_recv".to_string(),
            channels: DEFAULT_CHANNELS,
            auto_connect: true,
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }
}

/// LAN transport settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address the discovery and audio sockets bind to
    pub bind_address: String,
    /// UDP port for announcements
    pub discovery_port: u16,
    /// Interval between announcements and subscription refreshes
    pub beacon_interval_ms: u64,
    /// A source or subscriber not heard from within this is forgotten
    pub source_timeout_ms: u64,
    /// Frame synchronizer latency bound
    pub sync_latency_ms: u32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            discovery_port: DEFAULT_DISCOVERY_PORT,
            beacon_interval_ms: 250,
            source_timeout_ms: 3000,
            sync_latency_ms: DEFAULT_SYNC_LATENCY_MS,
        }
    }
}

/// Stream registry settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RegistryConfig {
    /// Maximum concurrently bridged streams
    pub capacity: usize,
    /// Where `save_streams` writes and startup restores from
    pub presets_path: PathBuf,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_REGISTRY_CAPACITY,
            presets_path: project_dirs()
                .map(|dirs| dirs.data_dir().join("presets.txt"))
                .unwrap_or_else(|| PathBuf::from("presets.txt")),
        }
    }
}

/// Web control surface settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UiConfig {
    pub bind_address: String,
    pub http_port: u16,
    /// Static files served for every path other than `/ws` and `/rest`
    pub assets_dir: PathBuf,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            http_port: DEFAULT_HTTP_PORT,
            assets_dir: PathBuf::from("assets"),
        }
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", "jack-net-bridge")
}

impl AppConfig {
    /// Default location of the config file
    pub fn default_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load from `path`, falling back to defaults when the file does not exist
    pub fn load(path: &Path) -> Result<Self, crate::Error> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the default location
    pub fn load_default() -> Result<Self, crate::Error> {
        match Self::default_path() {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Write the config, creating parent directories
    pub fn save(&self, path: &Path) -> Result<(), crate::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// Reject values the bridge cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.audio.channels == 0 || self.audio.channels > MAX_CHANNELS {
            return Err(ConfigError::Invalid(format!(
                "channels must be between 1 and {}, got {}",
                MAX_CHANNELS, self.audio.channels
            )));
        }
        if self.audio.queue_depth == 0 {
            return Err(ConfigError::Invalid("queue_depth must be at least 1".into()));
        }
        if self.registry.capacity == 0 {
            return Err(ConfigError::Invalid("registry capacity must be at least 1".into()));
        }
        if self.network.beacon_interval_ms == 0 {
            return Err(ConfigError::Invalid("beacon_interval_ms must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.registry.capacity, 30);
        assert_eq!(config.audio.queue_depth, 1);
        assert_eq!(config.audio.channels, 2);
    }

    #[test]
    fn test_partial_toml() {
        let config = AppConfig::from_toml(
            r#"
            [audio]
            channels = 8

            [ui]
            http_port = 9000
            "#,
        )
        .unwrap();

        assert_eq!(config.audio.channels, 8);
        assert!(config.audio.auto_connect);
        assert_eq!(config.ui.http_port, 9000);
        assert_eq!(config.network.discovery_port, DEFAULT_DISCOVERY_PORT);
    }

    #[test]
    fn test_toml_roundtrip() {
        let mut config = AppConfig::default();
        config.audio.client_name = "bridge".into();
        config.registry.capacity = 4;

        let text = config.to_toml().unwrap();
        assert_eq!(AppConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.audio.channels = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.audio.channels = MAX_CHANNELS + 1;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.audio.queue_depth = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.registry.capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let path = std::env::temp_dir().join("jack-net-bridge-does-not-exist.toml");
        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config, AppConfig::default());
    }
}
