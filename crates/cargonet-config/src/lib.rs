//! Layered configuration loading for the CargoNetSim RPC client core.
//!
//! This crate provides configuration loading with minimal dependencies,
//! designed to be imported by every `cargonet-*` crate without causing
//! circular dependency issues.
//!
//! # Configuration Philosophy
//!
//! Configuration is split into two categories:
//!
//! - **Broker** (`BrokerDefaults`): the AMQP endpoint and topology naming
//!   convention shared by every client.
//! - **Client** (`ClientDefaults`): per-client-kind tuning (timeouts,
//!   retries, heartbeat cadence) that seeds a `Client` on construction but
//!   can be overridden per call.
//!
//! # Usage
//!
//! ```rust,no_run
//! use cargonet_config::CargonetConfig;
//!
//! let config = CargonetConfig::load().expect("failed to load config");
//! println!("broker: {}:{}", config.broker.host, config.broker.port);
//! println!("command timeout: {}ms", config.client.command_timeout_ms);
//! ```
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/cargonet/config.toml` (system)
//! 2. `~/.config/cargonet/config.toml` (user)
//! 3. `./cargonet.toml` (local override)
//! 4. Environment variables (`CARGONET_*`)
//!
//! # Example Config
//!
//! ```toml
//! [broker]
//! host = "localhost"
//! port = 5672
//! exchange = "CargoNetSim.Exchange"
//!
//! [client]
//! heartbeat_interval_secs = 5
//! command_timeout_ms = 1800000
//! max_retries = 5
//! backoff_base_ms = 2000
//! backoff_max_ms = 30000
//! ```

pub mod loader;

pub use loader::ConfigSources;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// AMQP broker connection and topology defaults, shared by every client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerDefaults {
    /// Broker hostname. Default: localhost
    #[serde(default = "BrokerDefaults::default_host")]
    pub host: String,

    /// Broker port. Default: 5672
    #[serde(default = "BrokerDefaults::default_port")]
    pub port: u16,

    /// Topic exchange name. Default: CargoNetSim.Exchange
    #[serde(default = "BrokerDefaults::default_exchange")]
    pub exchange: String,
}

impl BrokerDefaults {
    fn default_host() -> String {
        "localhost".to_string()
    }

    fn default_port() -> u16 {
        5672
    }

    fn default_exchange() -> String {
        "CargoNetSim.Exchange".to_string()
    }
}

impl Default for BrokerDefaults {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
            exchange: Self::default_exchange(),
        }
    }
}

/// Per-client tuning that seeds a freshly constructed client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientDefaults {
    /// Seconds between heartbeat publishes. Default: 5
    #[serde(default = "ClientDefaults::default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,

    /// Per-command deadline in milliseconds. Default: 1_800_000 (30 min),
    /// the single value every client kind uses.
    #[serde(default = "ClientDefaults::default_command_timeout_ms")]
    pub command_timeout_ms: u64,

    /// Retry attempts for connection and publish operations. Default: 5
    #[serde(default = "ClientDefaults::default_max_retries")]
    pub max_retries: u32,

    /// Base backoff for connection-level retries, milliseconds. Default: 2000
    #[serde(default = "ClientDefaults::default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Backoff ceiling, milliseconds. Default: 30000
    #[serde(default = "ClientDefaults::default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

impl ClientDefaults {
    fn default_heartbeat_interval_secs() -> u64 {
        5
    }

    fn default_command_timeout_ms() -> u64 {
        1_800_000
    }

    fn default_max_retries() -> u32 {
        5
    }

    fn default_backoff_base_ms() -> u64 {
        2_000
    }

    fn default_backoff_max_ms() -> u64 {
        30_000
    }
}

impl Default for ClientDefaults {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: Self::default_heartbeat_interval_secs(),
            command_timeout_ms: Self::default_command_timeout_ms(),
            max_retries: Self::default_max_retries(),
            backoff_base_ms: Self::default_backoff_base_ms(),
            backoff_max_ms: Self::default_backoff_max_ms(),
        }
    }
}

/// Complete CargoNetSim client-core configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CargonetConfig {
    #[serde(default)]
    pub broker: BrokerDefaults,

    #[serde(default)]
    pub client: ClientDefaults,
}

impl CargonetConfig {
    /// Load configuration from all sources.
    ///
    /// Load order (later wins):
    /// 1. Compiled defaults
    /// 2. `/etc/cargonet/config.toml`
    /// 3. `~/.config/cargonet/config.toml`
    /// 4. `./cargonet.toml`
    /// 5. Environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration from a specific file path, then apply env overrides.
    ///
    /// If `config_path` is provided, it takes precedence over the local
    /// `./cargonet.toml` override. System and user configs still load first.
    pub fn load_from(config_path: Option<&std::path::Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration and return information about sources.
    pub fn load_with_sources() -> Result<(Self, ConfigSources), ConfigError> {
        Self::load_with_sources_from(None)
    }

    /// Load configuration from optional path and return information about sources.
    pub fn load_with_sources_from(
        config_path: Option<&std::path::Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut config = CargonetConfig::default();

        for path in loader::discover_config_files_with_override(config_path) {
            let file_config = loader::load_from_file(&path)?;
            config = loader::merge_configs(config, file_config);
            sources.files.push(path);
        }

        loader::apply_env_overrides(&mut config, &mut sources);

        Ok((config, sources))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CargonetConfig::default();
        assert_eq!(config.broker.port, 5672);
        assert_eq!(config.client.command_timeout_ms, 1_800_000);
    }

    #[test]
    fn test_load_defaults() {
        let config = CargonetConfig::load().unwrap();
        assert_eq!(config.broker.host, "localhost");
    }
}
