//! Cluster view snapshot
//!
//! TigerStyle: Immutable once built; replaced whole, never edited.

use crate::endpoint::{Address, Endpoint, ShardId};
use std::collections::HashMap;
use std::sync::Arc;

/// Shard id to the addresses currently serving it
pub type ShardMap = HashMap<ShardId, Vec<Arc<Address>>>;

/// Endpoint to resolved address, one entry per registered endpoint
pub type NodeMap = HashMap<Endpoint, Arc<Address>>;

/// Membership of the cluster at one point in time
///
/// # Invariants
/// - Every address in `shards` is a value of `nodes`
/// - Every endpoint in `nodes` is listed under at least one shard
#[derive(Debug, Clone, Default)]
pub struct ClusterView {
    nodes: NodeMap,
    shards: ShardMap,
    version: u64,
    created_at_ms: u64,
}

impl ClusterView {
    /// The initial view: no nodes, version 0
    pub fn empty() -> Self {
        Self::default()
    }

    pub(crate) fn new(nodes: NodeMap, shards: ShardMap, version: u64, created_at_ms: u64) -> Self {
        let view = Self {
            nodes,
            shards,
            version,
            created_at_ms,
        };
        debug_assert!(view.is_consistent());
        view
    }

    /// Endpoint to address mapping
    pub fn nodes(&self) -> &NodeMap {
        &self.nodes
    }

    /// Shard to address-list mapping
    pub fn shards(&self) -> &ShardMap {
        &self.shards
    }

    /// Publish counter; 0 for the initial empty view
    pub fn version(&self) -> u64 {
        self.version
    }

    /// When this view was built (Unix timestamp ms)
    pub fn created_at_ms(&self) -> u64 {
        self.created_at_ms
    }

    /// Addresses serving a shard (empty if none)
    pub fn addresses_for(&self, shard: ShardId) -> &[Arc<Address>] {
        self.shards.get(&shard).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Address of a registered endpoint
    pub fn address_of(&self, endpoint: &Endpoint) -> Option<&Arc<Address>> {
        self.nodes.get(endpoint)
    }

    /// Shards that list the given address, in ascending order
    pub fn shards_served_by(&self, address: &Address) -> Vec<ShardId> {
        let mut served: Vec<ShardId> = self
            .shards
            .iter()
            .filter(|(_, addrs)| addrs.iter().any(|a| a.as_ref() == address))
            .map(|(shard, _)| *shard)
            .collect();
        served.sort_unstable();
        served
    }

    /// Number of registered endpoints
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of shards with at least one address
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Check if no endpoint is registered
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Compare membership, ignoring version and timestamp
    pub fn same_membership(&self, other: &ClusterView) -> bool {
        self.nodes == other.nodes && self.shards == other.shards
    }

    /// Check the view invariants
    pub fn is_consistent(&self) -> bool {
        let every_shard_address_known = self.shards.values().flatten().all(|addr| {
            self.nodes
                .values()
                .any(|known| Arc::ptr_eq(known, addr))
        });

        let every_node_in_a_shard = self.nodes.values().all(|addr| {
            self.shards
                .values()
                .flatten()
                .any(|listed| Arc::ptr_eq(listed, addr))
        });

        every_shard_address_known && every_node_in_a_shard
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(host: &str, port: u16) -> Arc<Address> {
        Arc::new(Address::new(host, port).unwrap())
    }

    #[test]
    fn test_empty_view() {
        let view = ClusterView::empty();
        assert!(view.is_empty());
        assert_eq!(view.version(), 0);
        assert_eq!(view.shard_count(), 0);
        assert!(view.addresses_for(1).is_empty());
        assert!(view.is_consistent());
    }

    #[test]
    fn test_view_accessors() {
        let a = addr("10.0.0.1", 9000);
        let endpoint = Endpoint::new("10.0.0.1", 9000);

        let mut nodes = NodeMap::new();
        nodes.insert(endpoint.clone(), a.clone());
        let mut shards = ShardMap::new();
        shards.insert(3, vec![a.clone()]);
        shards.insert(7, vec![a.clone()]);

        let view = ClusterView::new(nodes, shards, 4, 1234);
        assert_eq!(view.version(), 4);
        assert_eq!(view.created_at_ms(), 1234);
        assert_eq!(view.node_count(), 1);
        assert_eq!(view.shard_count(), 2);
        assert!(Arc::ptr_eq(view.address_of(&endpoint).unwrap(), &a));
        assert_eq!(view.shards_served_by(&a), vec![3, 7]);
        assert!(view.is_consistent());
    }

    #[test]
    fn test_inconsistent_view_detected() {
        let mut nodes = NodeMap::new();
        nodes.insert(Endpoint::new("h1", 1), addr("h1", 1));

        let view = ClusterView {
            nodes,
            shards: ShardMap::new(),
            version: 1,
            created_at_ms: 0,
        };
        assert!(!view.is_consistent());
    }

    #[test]
    fn test_same_membership_ignores_version() {
        let a = addr("h1", 1);
        let mut nodes = NodeMap::new();
        nodes.insert(Endpoint::new("h1", 1), a.clone());
        let mut shards = ShardMap::new();
        shards.insert(0, vec![a]);

        let first = ClusterView::new(nodes.clone(), shards.clone(), 1, 100);
        let second = ClusterView::new(nodes, shards, 2, 200);
        assert!(first.same_membership(&second));
        assert!(!first.same_membership(&ClusterView::empty()));
    }
}
