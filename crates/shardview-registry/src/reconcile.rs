//! View reconciliation
//!
//! TigerStyle: Pure function over in-memory data; cannot fail.
//!
//! Turns a complete registry snapshot plus the previous view into the next
//! view and the list of addresses that left.
//!
//! # Rules
//! - An endpoint already in the previous view keeps its `Arc<Address>`, so
//!   connection pools keyed by address see no churn.
//! - An endpoint listed under several shards is one node that serves all of
//!   them. Exact duplicates (same endpoint, same shard) count once.
//! - Instances are processed in `(shard, endpoint)` order, so the result does
//!   not depend on the order the registry reports them in.
//! - Malformed instances are skipped and counted, never fatal.

use crate::endpoint::{Address, Endpoint, ServiceInstance, ShardId};
use crate::view::{ClusterView, NodeMap, ShardMap};
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of one reconciliation pass
#[derive(Debug, Clone)]
pub struct Reconciliation {
    /// The fully built next view
    pub view: ClusterView,
    /// Addresses of endpoints that were in the previous view but not this one
    pub departed: Vec<Arc<Address>>,
    /// Number of instances skipped as malformed
    pub rejected: usize,
}

impl Reconciliation {
    /// Check whether any node left relative to the previous view
    pub fn has_departures(&self) -> bool {
        !self.departed.is_empty()
    }
}

/// Builds the next `ClusterView` from a registry snapshot
#[derive(Debug, Clone, Copy, Default)]
pub struct ViewReconciler;

impl ViewReconciler {
    /// Reconcile a complete snapshot against the previous view
    ///
    /// # Arguments
    /// * `previous` - The currently published view
    /// * `instances` - Every instance currently registered (not a diff)
    /// * `now_ms` - Timestamp recorded on the new view
    pub fn reconcile(
        previous: &ClusterView,
        instances: &[ServiceInstance],
        now_ms: u64,
    ) -> Reconciliation {
        let mut rejected = 0usize;
        let mut accepted: Vec<(ShardId, &Endpoint)> = Vec::with_capacity(instances.len());

        for instance in instances {
            match instance.shard {
                Some(shard) => accepted.push((shard, &instance.service_endpoint)),
                None => {
                    warn!(
                        endpoint = %instance.service_endpoint,
                        "skipping instance without shard id"
                    );
                    rejected += 1;
                }
            }
        }

        accepted.sort();
        accepted.dedup();

        let mut nodes = NodeMap::with_capacity(accepted.len());
        let mut shards = ShardMap::new();

        for (shard, endpoint) in accepted {
            let address = if let Some(seen) = nodes.get(endpoint) {
                Arc::clone(seen)
            } else if let Some(known) = previous.address_of(endpoint) {
                Arc::clone(known)
            } else {
                match Address::resolve(endpoint) {
                    Ok(resolved) => {
                        debug!(endpoint = %endpoint, shard, "discovered new node");
                        Arc::new(resolved)
                    }
                    Err(e) => {
                        warn!(endpoint = %endpoint, shard, error = %e, "skipping malformed instance");
                        rejected += 1;
                        continue;
                    }
                }
            };

            nodes
                .entry(endpoint.clone())
                .or_insert_with(|| Arc::clone(&address));
            shards.entry(shard).or_default().push(address);
        }

        let mut departed: Vec<Arc<Address>> = previous
            .nodes()
            .iter()
            .filter(|(endpoint, _)| !nodes.contains_key(*endpoint))
            .map(|(_, address)| Arc::clone(address))
            .collect();
        departed.sort_by(|a, b| (a.host(), a.port()).cmp(&(b.host(), b.port())));

        let version = previous.version().saturating_add(1);
        let view = ClusterView::new(nodes, shards, version, now_ms);

        debug!(
            version,
            nodes = view.node_count(),
            shards = view.shard_count(),
            departed = departed.len(),
            rejected,
            "reconciled cluster view"
        );

        Reconciliation {
            view,
            departed,
            rejected,
        }
    }
}
