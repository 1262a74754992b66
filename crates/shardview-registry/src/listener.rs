//! Cluster change listeners
//!
//! TigerStyle: Append-only, notified synchronously in registration order.
//!
//! # Hazard
//!
//! Listeners run on the reconciliation path, one after another. A listener
//! that blocks delays every later listener and the next reconciliation; a
//! listener that panics aborts the rest of the pass. Listeners must return
//! quickly and hand heavy work to their own task.

use crate::endpoint::Address;
use crate::view::ShardMap;
use arc_swap::ArcSwap;
use std::sync::Arc;

/// Receiver of cluster membership changes
pub trait ClusterEventListener: Send + Sync {
    /// Called once per published view with its shard map
    fn cluster_changed(&self, shards: &ShardMap);

    /// Called after `cluster_changed` when endpoints left the cluster
    fn nodes_departed(&self, _departed: &[Arc<Address>]) {}
}

/// Ordered set of registered listeners
///
/// Registration is copy-on-write, so a listener may register another
/// listener from inside its callback; the new one is notified from the next
/// change on.
pub struct ListenerRegistry {
    listeners: ArcSwap<Vec<Arc<dyn ClusterEventListener>>>,
}

impl ListenerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            listeners: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Add a listener for all subsequent changes
    ///
    /// Past views are not replayed.
    pub fn register(&self, listener: Arc<dyn ClusterEventListener>) {
        self.listeners.rcu(|current| {
            let mut next = Vec::with_capacity(current.len() + 1);
            next.extend(current.iter().cloned());
            next.push(Arc::clone(&listener));
            next
        });
    }

    /// Number of registered listeners
    pub fn len(&self) -> usize {
        self.listeners.load().len()
    }

    /// Check if no listener is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Notify every listener of a new shard map, in registration order
    pub fn notify_all(&self, shards: &ShardMap) {
        let listeners = self.listeners.load_full();
        for listener in listeners.iter() {
            listener.cluster_changed(shards);
        }
    }

    /// Notify every listener of departed addresses, in registration order
    pub fn notify_departed(&self, departed: &[Arc<Address>]) {
        if departed.is_empty() {
            return;
        }
        let listeners = self.listeners.load_full();
        for listener in listeners.iter() {
            listener.nodes_departed(departed);
        }
    }
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl ClusterEventListener for Recorder {
        fn cluster_changed(&self, shards: &ShardMap) {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.name, shards.len()));
        }

        fn nodes_departed(&self, departed: &[Arc<Address>]) {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}:departed:{}", self.name, departed.len()));
        }
    }

    fn recorder(name: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Arc<Recorder> {
        Arc::new(Recorder {
            name,
            log: Arc::clone(log),
        })
    }

    #[test]
    fn test_notify_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = ListenerRegistry::new();
        registry.register(recorder("l1", &log));
        registry.register(recorder("l2", &log));
        assert_eq!(registry.len(), 2);

        registry.notify_all(&ShardMap::new());
        registry.notify_all(&ShardMap::new());

        assert_eq!(*log.lock().unwrap(), vec!["l1:0", "l2:0", "l1:0", "l2:0"]);
    }

    #[test]
    fn test_no_replay_for_late_listener() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = ListenerRegistry::new();
        registry.register(recorder("early", &log));
        registry.notify_all(&ShardMap::new());

        registry.register(recorder("late", &log));
        assert_eq!(*log.lock().unwrap(), vec!["early:0"]);
    }

    #[test]
    fn test_departed_skipped_when_empty() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = ListenerRegistry::new();
        registry.register(recorder("l1", &log));

        registry.notify_departed(&[]);
        assert!(log.lock().unwrap().is_empty());

        let gone = vec![Arc::new(Address::new("h1", 1).unwrap())];
        registry.notify_departed(&gone);
        assert_eq!(*log.lock().unwrap(), vec!["l1:departed:1"]);
    }

    #[test]
    fn test_register_from_inside_callback() {
        struct Spawner {
            registry: Arc<ListenerRegistry>,
            child_log: Arc<Mutex<Vec<String>>>,
        }

        impl ClusterEventListener for Spawner {
            fn cluster_changed(&self, _shards: &ShardMap) {
                self.registry.register(Arc::new(Recorder {
                    name: "child",
                    log: Arc::clone(&self.child_log),
                }));
            }
        }

        let child_log = Arc::new(Mutex::new(Vec::new()));
        let registry = Arc::new(ListenerRegistry::new());
        registry.register(Arc::new(Spawner {
            registry: Arc::clone(&registry),
            child_log: Arc::clone(&child_log),
        }));

        registry.notify_all(&ShardMap::new());
        assert_eq!(registry.len(), 2);
        // The child joined mid-pass and was not notified of that pass
        assert!(child_log.lock().unwrap().is_empty());
    }
}
