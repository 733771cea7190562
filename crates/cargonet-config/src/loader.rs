//! Config file discovery, loading, and environment variable overlay.

use crate::{BrokerDefaults, CargonetConfig, ClientDefaults, ConfigError};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order).
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values.
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations.
///
/// Returns paths in load order (system, user, local).
/// Only returns files that exist.
pub fn discover_config_files() -> Vec<PathBuf> {
    discover_config_files_with_override(None)
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided and exists, it replaces the local override.
/// Returns paths in load order (system, user, local/cli).
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/cargonet/config.toml");
    if system.exists() {
        files.push(system);
    }

    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("cargonet/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("cargonet.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Load config from a TOML file.
pub fn load_from_file(path: &Path) -> Result<CargonetConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    parse_toml(&contents, path)
}

/// Parse config from a TOML string.
fn parse_toml(contents: &str, path: &Path) -> Result<CargonetConfig, ConfigError> {
    let table: toml::Table = contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let broker = if let Some(broker) = table.get("broker").and_then(|v| v.as_table()) {
        let mut broker_cfg = BrokerDefaults::default();
        if let Some(v) = broker.get("host").and_then(|v| v.as_str()) {
            broker_cfg.host = v.to_string();
        }
        if let Some(v) = broker.get("port").and_then(|v| v.as_integer()) {
            broker_cfg.port = v as u16;
        }
        if let Some(v) = broker.get("exchange").and_then(|v| v.as_str()) {
            broker_cfg.exchange = v.to_string();
        }
        broker_cfg
    } else {
        BrokerDefaults::default()
    };

    let client = if let Some(client) = table.get("client").and_then(|v| v.as_table()) {
        let mut client_cfg = ClientDefaults::default();
        if let Some(v) = client.get("heartbeat_interval_secs").and_then(|v| v.as_integer()) {
            client_cfg.heartbeat_interval_secs = v as u64;
        }
        if let Some(v) = client.get("command_timeout_ms").and_then(|v| v.as_integer()) {
            client_cfg.command_timeout_ms = v as u64;
        }
        if let Some(v) = client.get("max_retries").and_then(|v| v.as_integer()) {
            client_cfg.max_retries = v as u32;
        }
        if let Some(v) = client.get("backoff_base_ms").and_then(|v| v.as_integer()) {
            client_cfg.backoff_base_ms = v as u64;
        }
        if let Some(v) = client.get("backoff_max_ms").and_then(|v| v.as_integer()) {
            client_cfg.backoff_max_ms = v as u64;
        }
        client_cfg
    } else {
        ClientDefaults::default()
    };

    Ok(CargonetConfig { broker, client })
}

/// Merge two configs, with `overlay` taking precedence field-by-field.
pub fn merge_configs(base: CargonetConfig, overlay: CargonetConfig) -> CargonetConfig {
    let broker_default = BrokerDefaults::default();
    let client_default = ClientDefaults::default();

    CargonetConfig {
        broker: BrokerDefaults {
            host: if overlay.broker.host != broker_default.host {
                overlay.broker.host
            } else {
                base.broker.host
            },
            port: if overlay.broker.port != broker_default.port {
                overlay.broker.port
            } else {
                base.broker.port
            },
            exchange: if overlay.broker.exchange != broker_default.exchange {
                overlay.broker.exchange
            } else {
                base.broker.exchange
            },
        },
        client: ClientDefaults {
            heartbeat_interval_secs: if overlay.client.heartbeat_interval_secs
                != client_default.heartbeat_interval_secs
            {
                overlay.client.heartbeat_interval_secs
            } else {
                base.client.heartbeat_interval_secs
            },
            command_timeout_ms: if overlay.client.command_timeout_ms
                != client_default.command_timeout_ms
            {
                overlay.client.command_timeout_ms
            } else {
                base.client.command_timeout_ms
            },
            max_retries: if overlay.client.max_retries != client_default.max_retries {
                overlay.client.max_retries
            } else {
                base.client.max_retries
            },
            backoff_base_ms: if overlay.client.backoff_base_ms != client_default.backoff_base_ms {
                overlay.client.backoff_base_ms
            } else {
                base.client.backoff_base_ms
            },
            backoff_max_ms: if overlay.client.backoff_max_ms != client_default.backoff_max_ms {
                overlay.client.backoff_max_ms
            } else {
                base.client.backoff_max_ms
            },
        },
    }
}

/// Apply environment variable overrides to config.
pub fn apply_env_overrides(config: &mut CargonetConfig, sources: &mut ConfigSources) {
    if let Ok(v) = env::var("CARGONET_BROKER_HOST") {
        config.broker.host = v;
        sources.env_overrides.push("CARGONET_BROKER_HOST".to_string());
    }
    if let Ok(v) = env::var("CARGONET_BROKER_PORT") {
        if let Ok(port) = v.parse() {
            config.broker.port = port;
            sources.env_overrides.push("CARGONET_BROKER_PORT".to_string());
        }
    }
    if let Ok(v) = env::var("CARGONET_EXCHANGE") {
        config.broker.exchange = v;
        sources.env_overrides.push("CARGONET_EXCHANGE".to_string());
    }
    if let Ok(v) = env::var("CARGONET_HEARTBEAT_INTERVAL_SECS") {
        if let Ok(secs) = v.parse() {
            config.client.heartbeat_interval_secs = secs;
            sources
                .env_overrides
                .push("CARGONET_HEARTBEAT_INTERVAL_SECS".to_string());
        }
    }
    if let Ok(v) = env::var("CARGONET_COMMAND_TIMEOUT_MS") {
        if let Ok(ms) = v.parse() {
            config.client.command_timeout_ms = ms;
            sources
                .env_overrides
                .push("CARGONET_COMMAND_TIMEOUT_MS".to_string());
        }
    }
    if let Ok(v) = env::var("CARGONET_MAX_RETRIES") {
        if let Ok(n) = v.parse() {
            config.client.max_retries = n;
            sources.env_overrides.push("CARGONET_MAX_RETRIES".to_string());
        }
    }
    if let Ok(v) = env::var("RUST_LOG") {
        // Not a cargonet-config field, but recorded so callers can see that
        // tracing's own env var participated in this process's configuration.
        sources.env_overrides.push(format!("RUST_LOG={v}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discover_config_files() {
        let _files = discover_config_files();
    }

    #[test]
    fn test_parse_minimal_toml() {
        let toml = r#"
[broker]
host = "broker.internal"
"#;
        let config = parse_toml(toml, Path::new("test.toml")).unwrap();
        assert_eq!(config.broker.host, "broker.internal");
        assert_eq!(config.broker.port, 5672);
    }

    #[test]
    fn test_parse_full_toml() {
        let toml = r#"
[broker]
host = "10.0.0.5"
port = 15672
exchange = "Custom.Exchange"

[client]
heartbeat_interval_secs = 10
command_timeout_ms = 5000
max_retries = 3
backoff_base_ms = 500
backoff_max_ms = 5000
"#;
        let config = parse_toml(toml, Path::new("test.toml")).unwrap();

        assert_eq!(config.broker.host, "10.0.0.5");
        assert_eq!(config.broker.port, 15672);
        assert_eq!(config.broker.exchange, "Custom.Exchange");
        assert_eq!(config.client.heartbeat_interval_secs, 10);
        assert_eq!(config.client.command_timeout_ms, 5000);
        assert_eq!(config.client.max_retries, 3);
        assert_eq!(config.client.backoff_base_ms, 500);
        assert_eq!(config.client.backoff_max_ms, 5000);
    }

    #[test]
    fn test_merge_overlay_wins_on_changed_fields() {
        let base = CargonetConfig::default();
        let mut overlay = CargonetConfig::default();
        overlay.broker.host = "overlay-host".to_string();

        let merged = merge_configs(base, overlay);
        assert_eq!(merged.broker.host, "overlay-host");
        assert_eq!(merged.broker.port, 5672);
    }
}
