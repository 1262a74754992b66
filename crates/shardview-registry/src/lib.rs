//! Shardview Registry
//!
//! Shard membership views reconciled from a service registry.
//!
//! # Overview
//!
//! The registry crate provides:
//! - Immutable cluster views mapping shards to addresses
//! - Reconciliation of registry snapshots with stable address identity
//! - Atomic publication of views to lock-free readers
//! - Ordered change listeners and a watch-channel subscription
//! - Joining and leaving shards with explicit partial-failure reporting
//! - An in-memory registry backend

pub mod endpoint;
pub mod error;
pub mod listener;
pub mod membership;
pub mod reconcile;
pub mod registrar;
pub mod registry;
pub mod store;
pub mod view;
pub mod watcher;

pub use endpoint::{Address, Endpoint, ServiceInstance, ShardId};
pub use error::{RegistryError, RegistryResult};
pub use listener::{ClusterEventListener, ListenerRegistry};
pub use membership::{AppliedChange, ClusterMembership};
pub use reconcile::{Reconciliation, ViewReconciler};
pub use registrar::{JoinError, LeaveError, MembershipRegistrar, RegistrationHandle};
pub use registry::{HostChangeMonitor, MemoryServiceRegistry, Registration, ServiceRegistry};
pub use store::ClusterViewStore;
pub use view::{ClusterView, NodeMap, ShardMap};
pub use watcher::ClusterWatcher;
