//! Cluster membership state
//!
//! TigerStyle: Reconcile, publish, then notify; one change at a time.
//!
//! Owns the current view and the listeners. Every snapshot goes through
//! `apply`, which holds a mutex across reconcile, publish, and notify. Two
//! overlapping snapshots therefore cannot lose an update, and listeners see
//! changes in publish order.

use crate::endpoint::{Address, ServiceInstance, ShardId};
use crate::listener::{ClusterEventListener, ListenerRegistry};
use crate::reconcile::{Reconciliation, ViewReconciler};
use crate::store::ClusterViewStore;
use crate::view::ClusterView;
use shardview_core::io::{TimeProvider, WallClockTime};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Summary of one applied snapshot
#[derive(Debug, Clone)]
pub struct AppliedChange {
    /// The view that was published
    pub view: Arc<ClusterView>,
    /// Addresses that left with this change
    pub departed: Vec<Arc<Address>>,
    /// Instances skipped as malformed
    pub rejected: usize,
}

/// Live membership of the cluster
#[derive(Debug)]
pub struct ClusterMembership {
    store: ClusterViewStore,
    listeners: ListenerRegistry,
    time: Arc<dyn TimeProvider>,
    reconcile_lock: Mutex<()>,
}

impl ClusterMembership {
    /// Create with the production wall clock
    pub fn new() -> Self {
        Self::with_time(Arc::new(WallClockTime::new()))
    }

    /// Create with a custom time provider
    pub fn with_time(time: Arc<dyn TimeProvider>) -> Self {
        Self {
            store: ClusterViewStore::new(),
            listeners: ListenerRegistry::new(),
            time,
            reconcile_lock: Mutex::new(()),
        }
    }

    /// The latest published view
    pub fn current(&self) -> Arc<ClusterView> {
        self.store.current()
    }

    /// Addresses currently serving a shard
    pub fn shards_for(&self, shard: ShardId) -> Vec<Arc<Address>> {
        self.store.current().addresses_for(shard).to_vec()
    }

    /// Register a listener for subsequent changes
    pub fn add_listener(&self, listener: Arc<dyn ClusterEventListener>) {
        self.listeners.register(listener);
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Apply a complete registry snapshot
    ///
    /// Reconciles against the current view, publishes the result, then
    /// notifies listeners synchronously. Listeners calling `current()` from
    /// their callback see the new view.
    pub async fn apply(&self, instances: Vec<ServiceInstance>) -> AppliedChange {
        let _guard = self.reconcile_lock.lock().await;

        let previous = self.store.current();
        let Reconciliation {
            view,
            departed,
            rejected,
        } = ViewReconciler::reconcile(&previous, &instances, self.time.now_ms());

        let view = self.store.publish(view);

        if !departed.is_empty() {
            let gone: Vec<String> = departed.iter().map(|a| a.to_string()).collect();
            info!(version = view.version(), departed = ?gone, "nodes left the cluster");
        }
        debug!(
            version = view.version(),
            nodes = view.node_count(),
            shards = view.shard_count(),
            listeners = self.listeners.len(),
            "published cluster view"
        );

        self.listeners.notify_all(view.shards());
        self.listeners.notify_departed(&departed);

        AppliedChange {
            view,
            departed,
            rejected,
        }
    }
}

impl Default for ClusterMembership {
    fn default() -> Self {
        Self::new()
    }
}
