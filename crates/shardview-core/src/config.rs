//! Configuration for shardview
//!
//! TigerStyle: Explicit defaults, validation, reasonable limits.

use crate::constants::*;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration for shardview
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShardviewConfig {
    /// Service registry connection configuration
    #[serde(default)]
    pub registry: RegistryConfig,
}

impl ShardviewConfig {
    /// Parse a configuration from JSON, normalizing and validating it
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let mut config: ShardviewConfig =
            serde_json::from_str(raw).map_err(|e| Error::ConfigurationParse {
                reason: e.to_string(),
            })?;
        config.registry.namespace = normalize_namespace(&config.registry.namespace);
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.registry.validate()
    }
}

/// Service registry connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Registry address in host:port format
    #[serde(default = "default_registry_address")]
    pub address: String,

    /// Cluster namespace path inside the registry (always starts with `/`)
    pub namespace: String,

    /// Connection timeout in milliseconds
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,

    /// Pause between consecutive shard registrations during a join
    #[serde(default = "default_join_interval_ms")]
    pub join_interval_ms: u64,
}

fn default_registry_address() -> String {
    "127.0.0.1:2181".to_string()
}

fn default_connection_timeout_ms() -> u64 {
    CONNECTION_TIMEOUT_MS_DEFAULT
}

fn default_join_interval_ms() -> u64 {
    JOIN_INTERVAL_MS_DEFAULT
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            address: default_registry_address(),
            namespace: normalize_namespace("shardview"),
            connection_timeout_ms: default_connection_timeout_ms(),
            join_interval_ms: default_join_interval_ms(),
        }
    }
}

impl RegistryConfig {
    /// Create a configuration for the given registry address and cluster name
    ///
    /// The cluster name is normalized to a path starting with `/`.
    pub fn new(address: impl Into<String>, namespace: impl AsRef<str>) -> Self {
        Self {
            address: address.into(),
            namespace: normalize_namespace(namespace.as_ref()),
            ..Default::default()
        }
    }

    /// Set the connection timeout
    pub fn with_connection_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.connection_timeout_ms = timeout_ms;
        self
    }

    /// Set the pause between shard registrations
    pub fn with_join_interval_ms(mut self, interval_ms: u64) -> Self {
        self.join_interval_ms = interval_ms;
        self
    }

    /// Get connection timeout as Duration
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        match self.address.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {}
            _ => {
                return Err(Error::invalid_config(
                    "registry.address",
                    format!("'{}' must be in host:port format", self.address),
                ));
            }
        }

        if !self.namespace.starts_with(NAMESPACE_SEPARATOR) {
            return Err(Error::invalid_config(
                "registry.namespace",
                format!("'{}' must start with '{}'", self.namespace, NAMESPACE_SEPARATOR),
            ));
        }

        if self.namespace.len() <= 1 {
            return Err(Error::invalid_config(
                "registry.namespace",
                "cluster name cannot be empty",
            ));
        }

        if self.namespace.len() > NAMESPACE_LENGTH_BYTES_MAX {
            return Err(Error::invalid_config(
                "registry.namespace",
                format!(
                    "length {} exceeds limit {}",
                    self.namespace.len(),
                    NAMESPACE_LENGTH_BYTES_MAX
                ),
            ));
        }

        if self.connection_timeout_ms == 0 {
            return Err(Error::invalid_config(
                "registry.connection_timeout_ms",
                "must be positive",
            ));
        }

        if self.connection_timeout_ms > CONNECTION_TIMEOUT_MS_MAX {
            return Err(Error::invalid_config(
                "registry.connection_timeout_ms",
                format!(
                    "{} exceeds limit {}",
                    self.connection_timeout_ms, CONNECTION_TIMEOUT_MS_MAX
                ),
            ));
        }

        if self.join_interval_ms > JOIN_INTERVAL_MS_MAX {
            return Err(Error::invalid_config(
                "registry.join_interval_ms",
                format!(
                    "{} exceeds limit {}",
                    self.join_interval_ms, JOIN_INTERVAL_MS_MAX
                ),
            ));
        }

        Ok(())
    }
}

/// Prefix a cluster name with the namespace separator if it lacks one
pub fn normalize_namespace(name: &str) -> String {
    if name.starts_with(NAMESPACE_SEPARATOR) {
        name.to_string()
    } else {
        format!("{}{}", NAMESPACE_SEPARATOR, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = RegistryConfig::default();
        assert_eq!(config.connection_timeout_ms, CONNECTION_TIMEOUT_MS_DEFAULT);
        assert_eq!(config.connection_timeout(), Duration::from_secs(300));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_namespace_normalized() {
        let config = RegistryConfig::new("zk:2181", "search-cluster");
        assert_eq!(config.namespace, "/search-cluster");

        let config = RegistryConfig::new("zk:2181", "/search-cluster");
        assert_eq!(config.namespace, "/search-cluster");
    }

    #[test]
    fn test_config_validation() {
        let bad_address = RegistryConfig {
            address: "no-port".into(),
            ..Default::default()
        };
        assert!(bad_address.validate().is_err());

        let bad_namespace = RegistryConfig {
            namespace: "relative".into(),
            ..Default::default()
        };
        assert!(bad_namespace.validate().is_err());

        let empty_namespace = RegistryConfig::new("zk:2181", "");
        assert!(empty_namespace.validate().is_err());

        let zero_timeout = RegistryConfig::default().with_connection_timeout_ms(0);
        assert!(zero_timeout.validate().is_err());

        let slow_join = RegistryConfig::default().with_join_interval_ms(JOIN_INTERVAL_MS_MAX + 1);
        assert!(slow_join.validate().is_err());
    }

    #[test]
    fn test_config_from_json() {
        let config = ShardviewConfig::from_json_str(
            r#"{"registry": {"address": "10.0.0.5:2181", "namespace": "shards"}}"#,
        )
        .unwrap();

        assert_eq!(config.registry.address, "10.0.0.5:2181");
        assert_eq!(config.registry.namespace, "/shards");
        assert_eq!(
            config.registry.connection_timeout_ms,
            CONNECTION_TIMEOUT_MS_DEFAULT
        );
    }

    #[test]
    fn test_config_from_json_rejects_invalid() {
        let result = ShardviewConfig::from_json_str(r#"{"registry": {"namespace": 7}}"#);
        assert!(matches!(result, Err(Error::ConfigurationParse { .. })));

        let result = ShardviewConfig::from_json_str(
            r#"{"registry": {"namespace": "shards", "connection_timeout_ms": 0}}"#,
        );
        assert!(matches!(result, Err(Error::InvalidConfiguration { .. })));
    }
}
