//! Registry error types
//!
//! TigerStyle: Explicit error variants with context.

use crate::endpoint::ShardId;
use thiserror::Error;

/// Registry-specific errors
#[derive(Error, Debug)]
pub enum RegistryError {
    /// Endpoint cannot be turned into a connectable address
    #[error("invalid endpoint {host}:{port}, reason: {reason}")]
    InvalidEndpoint {
        host: String,
        port: u16,
        reason: String,
    },

    /// Shard list passed to join is unusable
    #[error("invalid shard set: {reason}")]
    InvalidShardSet { reason: String },

    /// Registering the local node for a shard failed
    #[error("registration for shard {shard} failed: {reason}")]
    RegistrationFailed { shard: ShardId, reason: String },

    /// Removing a shard registration failed
    #[error("deregistration for shard {shard} failed: {reason}")]
    DeregistrationFailed { shard: ShardId, reason: String },

    /// Registry connection or session failure
    #[error("registry connection failed: {reason}")]
    ConnectionFailed { reason: String },

    /// Subscribing to membership changes failed
    #[error("failed to monitor {namespace}: {reason}")]
    MonitorFailed { namespace: String, reason: String },

    /// Subscribing to membership changes did not finish in time
    #[error("monitoring {namespace} timed out after {timeout_ms}ms")]
    MonitorTimeout { namespace: String, timeout_ms: u64 },

    /// Waiting for a view condition did not finish in time
    #[error("cluster view wait timed out after {timeout_ms}ms")]
    WaitTimeout { timeout_ms: u64 },

    /// Watcher is stopped
    #[error("cluster watcher is not running")]
    NotRunning,

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] shardview_core::Error),
}

impl RegistryError {
    /// Create a registration failed error
    pub fn registration_failed(shard: ShardId, reason: impl Into<String>) -> Self {
        Self::RegistrationFailed {
            shard,
            reason: reason.into(),
        }
    }

    /// Create a deregistration failed error
    pub fn deregistration_failed(shard: ShardId, reason: impl Into<String>) -> Self {
        Self::DeregistrationFailed {
            shard,
            reason: reason.into(),
        }
    }

    /// Check if this error indicates a retriable condition
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. }
                | Self::RegistrationFailed { .. }
                | Self::DeregistrationFailed { .. }
                | Self::MonitorTimeout { .. }
        )
    }
}

/// Result type for registry operations
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RegistryError::registration_failed(7, "session expired");
        let msg = err.to_string();
        assert!(msg.contains("shard 7"));
        assert!(msg.contains("session expired"));
    }

    #[test]
    fn test_error_retriable() {
        let conn = RegistryError::ConnectionFailed {
            reason: "timeout".into(),
        };
        assert!(conn.is_retriable());

        let invalid = RegistryError::InvalidShardSet {
            reason: "empty".into(),
        };
        assert!(!invalid.is_retriable());
    }

    #[test]
    fn test_config_error_conversion() {
        let err: RegistryError = shardview_core::Error::invalid_config("x", "y").into();
        assert!(matches!(err, RegistryError::Config(_)));
    }
}
