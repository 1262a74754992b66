//! TigerStyle constants for shardview
//!
//! All limits are explicit, use big-endian naming (most significant first),
//! and include units in the name.

// =============================================================================
// Registry Connection
// =============================================================================

/// Default registry connection timeout in milliseconds (300 sec)
pub const CONNECTION_TIMEOUT_MS_DEFAULT: u64 = 300 * 1000;

/// Maximum registry connection timeout in milliseconds (1 hour)
pub const CONNECTION_TIMEOUT_MS_MAX: u64 = 60 * 60 * 1000;

/// Maximum length of a cluster namespace path in bytes
pub const NAMESPACE_LENGTH_BYTES_MAX: usize = 1024;

/// Separator that every cluster namespace starts with
pub const NAMESPACE_SEPARATOR: char = '/';

// =============================================================================
// Membership
// =============================================================================

/// Maximum number of shards a single join call may register
pub const JOIN_SHARDS_COUNT_MAX: usize = 4096;

/// Default pause between consecutive shard registrations in milliseconds
pub const JOIN_INTERVAL_MS_DEFAULT: u64 = 0;

/// Maximum pause between consecutive shard registrations in milliseconds (1 min)
pub const JOIN_INTERVAL_MS_MAX: u64 = 60 * 1000;

/// Maximum length of an endpoint host in bytes (DNS name limit)
pub const ENDPOINT_HOST_LENGTH_BYTES_MAX: usize = 253;

// Compile-time assertions for constant validity
const _: () = {
    assert!(CONNECTION_TIMEOUT_MS_DEFAULT > 0);
    assert!(CONNECTION_TIMEOUT_MS_DEFAULT <= CONNECTION_TIMEOUT_MS_MAX);
    assert!(NAMESPACE_LENGTH_BYTES_MAX >= 2);
};
