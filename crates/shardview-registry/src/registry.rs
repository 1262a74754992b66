//! Service registry contract and in-memory implementation
//!
//! TigerStyle: Explicit trait at the collaborator seam; errors returned, never panics.
//!
//! The real registry client (sessions, watches, payload serialization) lives
//! outside this crate. `MemoryServiceRegistry` implements the same contract
//! for single-process deployments and tests.

use crate::endpoint::{Address, Endpoint, ServiceInstance, ShardId};
use crate::error::{RegistryError, RegistryResult};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

// =============================================================================
// Contract
// =============================================================================

/// Subscriber to registry membership changes
///
/// Receives the complete set of registered instances on every change, not a
/// diff. Implementations must return quickly.
pub trait HostChangeMonitor: Send + Sync {
    /// Called with every instance currently registered
    fn on_change(&self, instances: Vec<ServiceInstance>);

    /// Whether this monitor no longer wants snapshots
    ///
    /// Registries drop closed monitors instead of delivering to them.
    fn is_closed(&self) -> bool {
        false
    }
}

/// One active shard registration
#[async_trait]
pub trait Registration: Send + Sync {
    /// Shard this registration serves
    fn shard(&self) -> ShardId;

    /// Remove the registration from the registry
    async fn leave(&mut self) -> RegistryResult<()>;
}

/// The external service registry
///
/// # Guarantees expected from implementations
/// - `monitor` delivers the current snapshot right away, then one snapshot
///   per change
/// - Snapshots are delivered one at a time, in change order
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    /// Cluster namespace path this client is bound to
    fn namespace(&self) -> &str;

    /// Subscribe to membership changes
    async fn monitor(&self, monitor: Arc<dyn HostChangeMonitor>) -> RegistryResult<()>;

    /// Register `address` as serving `shard`
    async fn register(
        &self,
        address: &Address,
        metadata: BTreeMap<String, String>,
        shard: ShardId,
    ) -> RegistryResult<Box<dyn Registration>>;
}

// =============================================================================
// In-memory implementation
// =============================================================================

/// Injected failures for `MemoryServiceRegistry`
#[derive(Debug, Default)]
struct Faults {
    register: HashSet<ShardId>,
    leave: HashSet<ShardId>,
    monitor: Option<String>,
}

struct MemoryState {
    instances: BTreeMap<u64, ServiceInstance>,
    monitors: Vec<Arc<dyn HostChangeMonitor>>,
    next_id: u64,
    faults: Faults,
}

impl MemoryState {
    fn snapshot(&self) -> Vec<ServiceInstance> {
        self.instances.values().cloned().collect()
    }

    /// Deliver the current snapshot to every open monitor
    ///
    /// Runs while the state lock is held, so deliveries are serialized.
    /// Closed monitors are unsubscribed.
    fn broadcast(&mut self) {
        self.monitors.retain(|monitor| !monitor.is_closed());
        let snapshot = self.snapshot();
        for monitor in &self.monitors {
            monitor.on_change(snapshot.clone());
        }
    }
}

/// In-memory service registry
///
/// Suitable for single-process deployments or testing.
/// All state is lost on restart.
#[derive(Clone)]
pub struct MemoryServiceRegistry {
    namespace: String,
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryServiceRegistry {
    /// Create an empty registry for a cluster namespace
    pub fn new(namespace: impl AsRef<str>) -> Self {
        Self {
            namespace: shardview_core::config::normalize_namespace(namespace.as_ref()),
            state: Arc::new(Mutex::new(MemoryState {
                instances: BTreeMap::new(),
                monitors: Vec::new(),
                next_id: 0,
                faults: Faults::default(),
            })),
        }
    }

    /// Current registered instances
    pub async fn instances(&self) -> Vec<ServiceInstance> {
        self.state.lock().await.snapshot()
    }

    /// Number of registered instances
    pub async fn len(&self) -> usize {
        self.state.lock().await.instances.len()
    }

    /// Check if no instance is registered
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Number of subscribed monitors
    pub async fn monitor_count(&self) -> usize {
        self.state.lock().await.monitors.len()
    }

    /// Insert a raw instance, bypassing validation, and notify monitors
    ///
    /// Returns an id usable with `remove_instance`.
    pub async fn insert_instance(&self, instance: ServiceInstance) -> u64 {
        let mut state = self.state.lock().await;
        let id = state.next_id;
        state.next_id += 1;
        state.instances.insert(id, instance);
        state.broadcast();
        id
    }

    /// Remove a raw instance and notify monitors
    pub async fn remove_instance(&self, id: u64) -> bool {
        let mut state = self.state.lock().await;
        let removed = state.instances.remove(&id).is_some();
        if removed {
            state.broadcast();
        }
        removed
    }

    /// Make every registration for `shard` fail
    pub async fn fail_register(&self, shard: ShardId) {
        self.state.lock().await.faults.register.insert(shard);
    }

    /// Make every deregistration for `shard` fail
    pub async fn fail_leave(&self, shard: ShardId) {
        self.state.lock().await.faults.leave.insert(shard);
    }

    /// Make `monitor` fail with the given reason
    pub async fn fail_monitor(&self, reason: impl Into<String>) {
        self.state.lock().await.faults.monitor = Some(reason.into());
    }

    /// Remove all injected failures
    pub async fn clear_faults(&self) {
        self.state.lock().await.faults = Faults::default();
    }
}

impl std::fmt::Debug for MemoryServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryServiceRegistry")
            .field("namespace", &self.namespace)
            .finish()
    }
}

#[async_trait]
impl ServiceRegistry for MemoryServiceRegistry {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn monitor(&self, monitor: Arc<dyn HostChangeMonitor>) -> RegistryResult<()> {
        let mut state = self.state.lock().await;

        if let Some(reason) = &state.faults.monitor {
            return Err(RegistryError::MonitorFailed {
                namespace: self.namespace.clone(),
                reason: reason.clone(),
            });
        }

        monitor.on_change(state.snapshot());
        state.monitors.push(monitor);
        Ok(())
    }

    async fn register(
        &self,
        address: &Address,
        metadata: BTreeMap<String, String>,
        shard: ShardId,
    ) -> RegistryResult<Box<dyn Registration>> {
        let mut state = self.state.lock().await;

        if state.faults.register.contains(&shard) {
            return Err(RegistryError::registration_failed(
                shard,
                "injected registration failure",
            ));
        }

        let endpoint = Endpoint {
            host: address.host().to_string(),
            port: address.port(),
            metadata,
        };

        let id = state.next_id;
        state.next_id += 1;
        state
            .instances
            .insert(id, ServiceInstance::new(endpoint, shard));
        debug!(namespace = %self.namespace, %address, shard, id, "registered instance");
        state.broadcast();

        Ok(Box::new(MemoryRegistration {
            id,
            shard,
            state: Arc::clone(&self.state),
        }))
    }
}

/// Registration handed out by `MemoryServiceRegistry`
struct MemoryRegistration {
    id: u64,
    shard: ShardId,
    state: Arc<Mutex<MemoryState>>,
}

#[async_trait]
impl Registration for MemoryRegistration {
    fn shard(&self) -> ShardId {
        self.shard
    }

    async fn leave(&mut self) -> RegistryResult<()> {
        let mut state = self.state.lock().await;

        if state.faults.leave.contains(&self.shard) {
            return Err(RegistryError::deregistration_failed(
                self.shard,
                "injected deregistration failure",
            ));
        }

        if state.instances.remove(&self.id).is_none() {
            return Err(RegistryError::deregistration_failed(
                self.shard,
                format!("registration {} not found", self.id),
            ));
        }

        debug!(shard = self.shard, id = self.id, "deregistered instance");
        state.broadcast();
        Ok(())
    }
}
