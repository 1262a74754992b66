//! Endpoints, instances, and resolved addresses
//!
//! TigerStyle: Validated addresses, explicit identity.

use crate::error::{RegistryError, RegistryResult};
use serde::{Deserialize, Serialize};
use shardview_core::constants::ENDPOINT_HOST_LENGTH_BYTES_MAX;
use std::collections::BTreeMap;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// Shard (partition) identifier
pub type ShardId = u32;

/// Identity of a registered service instance as reported by the registry
///
/// Two endpoints are the same instance only if host, port, and metadata all
/// match. The reconciler keys identity continuity on this type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Endpoint {
    /// Host name or IP literal
    pub host: String,
    /// Service port
    pub port: u16,
    /// Registry-specific metadata
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Endpoint {
    /// Create an endpoint without metadata
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            metadata: BTreeMap::new(),
        }
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// One entry of a registry snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInstance {
    /// Primary endpoint clients connect to
    pub service_endpoint: Endpoint,
    /// Named auxiliary endpoints (admin, metrics, ...)
    #[serde(default)]
    pub additional_endpoints: BTreeMap<String, Endpoint>,
    /// Shard served by this instance; `None` marks a malformed entry
    pub shard: Option<ShardId>,
}

impl ServiceInstance {
    /// Create an instance serving a shard
    pub fn new(service_endpoint: Endpoint, shard: ShardId) -> Self {
        Self {
            service_endpoint,
            additional_endpoints: BTreeMap::new(),
            shard: Some(shard),
        }
    }

    /// Create an instance that declares no shard
    pub fn without_shard(service_endpoint: Endpoint) -> Self {
        Self {
            service_endpoint,
            additional_endpoints: BTreeMap::new(),
            shard: None,
        }
    }

    /// Attach an auxiliary endpoint
    pub fn with_additional_endpoint(mut self, name: impl Into<String>, endpoint: Endpoint) -> Self {
        self.additional_endpoints.insert(name.into(), endpoint);
        self
    }
}

/// Network address consumers use to connect to a node
///
/// IP literals carry a ready `SocketAddr`. Hostnames stay unresolved so that
/// building a view never blocks on DNS.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    host: String,
    port: u16,
    socket_addr: Option<SocketAddr>,
}

impl Address {
    /// Create an address from host and port
    ///
    /// # Errors
    /// Returns error if the host is empty or too long, or the port is zero.
    pub fn new(host: impl Into<String>, port: u16) -> RegistryResult<Self> {
        let host = host.into();

        if host.is_empty() {
            return Err(RegistryError::InvalidEndpoint {
                host,
                port,
                reason: "host cannot be empty".into(),
            });
        }

        if host.len() > ENDPOINT_HOST_LENGTH_BYTES_MAX {
            return Err(RegistryError::InvalidEndpoint {
                reason: format!(
                    "host length {} exceeds limit {}",
                    host.len(),
                    ENDPOINT_HOST_LENGTH_BYTES_MAX
                ),
                host,
                port,
            });
        }

        if port == 0 {
            return Err(RegistryError::InvalidEndpoint {
                host,
                port,
                reason: "port cannot be zero".into(),
            });
        }

        let socket_addr = host
            .parse::<IpAddr>()
            .ok()
            .map(|ip| SocketAddr::new(ip, port));

        Ok(Self {
            host,
            port,
            socket_addr,
        })
    }

    /// Resolve the address of a registry endpoint
    pub fn resolve(endpoint: &Endpoint) -> RegistryResult<Self> {
        Self::new(endpoint.host.clone(), endpoint.port)
    }

    /// Host name or IP literal
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Socket address, if the host is an IP literal
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        self.socket_addr
    }

    /// Check whether this address refers to the given host and port
    pub fn matches(&self, host: &str, port: u16) -> bool {
        self.host == host && self.port == port
    }
}

impl From<SocketAddr> for Address {
    fn from(addr: SocketAddr) -> Self {
        Self {
            host: addr.ip().to_string(),
            port: addr.port(),
            socket_addr: Some(addr),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.socket_addr {
            Some(addr) => write!(f, "{}", addr),
            None => write!(f, "{}:{}", self.host, self.port),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_from_ip_literal() {
        let addr = Address::new("10.0.0.1", 9000).unwrap();
        assert_eq!(addr.host(), "10.0.0.1");
        assert_eq!(addr.port(), 9000);
        assert_eq!(addr.socket_addr(), Some("10.0.0.1:9000".parse().unwrap()));
        assert_eq!(addr.to_string(), "10.0.0.1:9000");
    }

    #[test]
    fn test_address_hostname_unresolved() {
        let addr = Address::new("shard-host.internal", 7000).unwrap();
        assert!(addr.socket_addr().is_none());
        assert_eq!(addr.to_string(), "shard-host.internal:7000");
    }

    #[test]
    fn test_address_ipv6_display() {
        let addr = Address::new("::1", 9000).unwrap();
        assert_eq!(addr.to_string(), "[::1]:9000");
    }

    #[test]
    fn test_address_rejects_invalid() {
        assert!(matches!(
            Address::new("", 9000),
            Err(RegistryError::InvalidEndpoint { .. })
        ));
        assert!(matches!(
            Address::new("host", 0),
            Err(RegistryError::InvalidEndpoint { .. })
        ));
        let long_host = "a".repeat(ENDPOINT_HOST_LENGTH_BYTES_MAX + 1);
        assert!(Address::new(long_host, 1).is_err());
    }

    #[test]
    fn test_address_from_socket_addr() {
        let socket: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        let addr = Address::from(socket);
        assert!(addr.matches("127.0.0.1", 8080));
        assert_eq!(addr, Address::new("127.0.0.1", 8080).unwrap());
    }

    #[test]
    fn test_endpoint_identity_includes_metadata() {
        let plain = Endpoint::new("h1", 1);
        let tagged = Endpoint::new("h1", 1).with_metadata("zone", "a");
        assert_ne!(plain, tagged);
        assert_eq!(plain, Endpoint::new("h1", 1));
    }

    #[test]
    fn test_instance_serde() {
        let instance = ServiceInstance::new(Endpoint::new("h1", 1), 3)
            .with_additional_endpoint("admin", Endpoint::new("h1", 2));
        let json = serde_json::to_string(&instance).unwrap();
        let parsed: ServiceInstance = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, instance);
    }
}
