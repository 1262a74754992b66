//! Cluster watcher
//!
//! TigerStyle: Single entry point; one worker serializes reconciliation.
//!
//! ```text
//! registry ──on_change──> mpsc ──> worker ──apply──> ClusterMembership
//!                                     │                 ├─ publish view
//!                                     │                 └─ notify listeners
//!                                     └──> watch channel (async subscribers)
//! ```
//!
//! The registry callback only enqueues the snapshot. A single worker task
//! applies snapshots in arrival order, so reconciliation never races even if
//! the registry delivers overlapping callbacks.

use crate::endpoint::{Address, ServiceInstance, ShardId};
use crate::error::{RegistryError, RegistryResult};
use crate::listener::ClusterEventListener;
use crate::membership::ClusterMembership;
use crate::registrar::{JoinError, LeaveError, MembershipRegistrar, RegistrationHandle};
use crate::registry::{HostChangeMonitor, ServiceRegistry};
use crate::view::ClusterView;
use shardview_core::config::RegistryConfig;
use shardview_core::io::{TimeProvider, WallClockTime};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Forwards registry snapshots to the reconciliation worker
struct SnapshotForwarder {
    tx: mpsc::UnboundedSender<Vec<ServiceInstance>>,
}

impl HostChangeMonitor for SnapshotForwarder {
    fn on_change(&self, instances: Vec<ServiceInstance>) {
        if self.tx.send(instances).is_err() {
            debug!("cluster watcher stopped; dropping registry snapshot");
        }
    }

    fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Watches a service registry and keeps the cluster view current
pub struct ClusterWatcher<R: ServiceRegistry + 'static> {
    config: RegistryConfig,
    membership: Arc<ClusterMembership>,
    registrar: MembershipRegistrar<R>,
    views: Arc<watch::Sender<Arc<ClusterView>>>,
    shutdown: Arc<Notify>,
    worker: Mutex<Option<JoinHandle<()>>>,
    running: AtomicBool,
}

impl<R: ServiceRegistry + 'static> ClusterWatcher<R> {
    /// Start watching with the production wall clock
    pub async fn start(registry: Arc<R>, config: RegistryConfig) -> RegistryResult<Self> {
        Self::start_with_time(registry, config, Arc::new(WallClockTime::new())).await
    }

    /// Start watching with a custom time provider
    ///
    /// # Errors
    /// Fails if the configuration is invalid or names a different namespace
    /// than the registry, or if the watch cannot be established within the
    /// connection timeout. Nothing keeps running after a failed start.
    pub async fn start_with_time(
        registry: Arc<R>,
        config: RegistryConfig,
        time: Arc<dyn TimeProvider>,
    ) -> RegistryResult<Self> {
        config.validate()?;

        if registry.namespace() != config.namespace {
            return Err(shardview_core::Error::invalid_config(
                "registry.namespace",
                format!(
                    "configured '{}' but registry is bound to '{}'",
                    config.namespace,
                    registry.namespace()
                ),
            )
            .into());
        }

        info!(
            registry = %config.address,
            namespace = %config.namespace,
            timeout_ms = config.connection_timeout_ms,
            "starting cluster watcher"
        );

        let membership = Arc::new(ClusterMembership::with_time(Arc::clone(&time)));
        let (views_tx, _) = watch::channel(membership.current());
        let views = Arc::new(views_tx);
        let shutdown = Arc::new(Notify::new());
        let (tx, rx) = mpsc::unbounded_channel();

        let worker = tokio::spawn(run_worker(
            Arc::clone(&membership),
            rx,
            Arc::clone(&views),
            Arc::clone(&shutdown),
        ));

        let forwarder = Arc::new(SnapshotForwarder { tx });
        let monitored =
            tokio::time::timeout(config.connection_timeout(), registry.monitor(forwarder)).await;

        let failure = match monitored {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e),
            Err(_) => Some(RegistryError::MonitorTimeout {
                namespace: config.namespace.clone(),
                timeout_ms: config.connection_timeout_ms,
            }),
        };
        if let Some(e) = failure {
            error!(namespace = %config.namespace, error = %e, "failed to establish watch");
            worker.abort();
            return Err(e);
        }

        let registrar = MembershipRegistrar::new(registry)
            .with_join_interval_ms(config.join_interval_ms)
            .with_time(time);

        info!(namespace = %config.namespace, "cluster watcher started");

        Ok(Self {
            config,
            membership,
            registrar,
            views,
            shutdown,
            worker: Mutex::new(Some(worker)),
            running: AtomicBool::new(true),
        })
    }

    /// Configuration this watcher was started with
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Shared membership state
    pub fn membership(&self) -> &Arc<ClusterMembership> {
        &self.membership
    }

    /// Registrar bound to the watched registry
    pub fn registrar(&self) -> &MembershipRegistrar<R> {
        &self.registrar
    }

    /// The latest published view
    pub fn current(&self) -> Arc<ClusterView> {
        self.membership.current()
    }

    /// Addresses currently serving a shard
    pub fn shards_for(&self, shard: ShardId) -> Vec<Arc<Address>> {
        self.membership.shards_for(shard)
    }

    /// Register a synchronous listener for subsequent changes
    pub fn add_listener(&self, listener: Arc<dyn ClusterEventListener>) {
        self.membership.add_listener(listener);
    }

    /// Subscribe to published views without blocking reconciliation
    ///
    /// Slow receivers only miss intermediate views; they always see the latest.
    pub fn subscribe(&self) -> watch::Receiver<Arc<ClusterView>> {
        self.views.subscribe()
    }

    /// Wait until a published view satisfies `predicate`
    pub async fn wait_for<F>(&self, mut predicate: F, timeout: Duration) -> RegistryResult<Arc<ClusterView>>
    where
        F: FnMut(&ClusterView) -> bool,
    {
        let mut rx = self.views.subscribe();
        let wait = async {
            loop {
                let view = rx.borrow_and_update().clone();
                if predicate(&view) {
                    return Ok(view);
                }
                if rx.changed().await.is_err() {
                    return Err(RegistryError::NotRunning);
                }
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result,
            Err(_) => Err(RegistryError::WaitTimeout {
                timeout_ms: duration_ms(timeout),
            }),
        }
    }

    /// Check if the watcher is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Register the local node at `address` for each shard
    pub async fn join(
        &self,
        address: &Address,
        shards: &[ShardId],
    ) -> Result<Vec<RegistrationHandle>, JoinError> {
        if !self.is_running() {
            return Err(RegistryError::NotRunning.into());
        }
        self.registrar.join(address, shards).await
    }

    /// Deregister the given handles
    pub async fn leave(&self, handles: Vec<RegistrationHandle>) -> Result<(), LeaveError> {
        self.registrar.leave(handles).await
    }

    /// Stop the reconciliation worker
    ///
    /// The last published view stays readable.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        self.shutdown.notify_one();
        if let Some(worker) = self.worker.lock().await.take() {
            if let Err(e) = worker.await {
                error!(error = %e, "reconciliation worker ended abnormally");
            }
        }

        info!(namespace = %self.config.namespace, "cluster watcher stopped");
    }
}

impl<R: ServiceRegistry + 'static> Drop for ClusterWatcher<R> {
    fn drop(&mut self) {
        if self.running.swap(false, Ordering::SeqCst) {
            self.shutdown.notify_one();
        }
    }
}

/// Milliseconds in `duration`, saturating at `u64::MAX`
fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Apply snapshots one at a time until shutdown or the registry drops us
async fn run_worker(
    membership: Arc<ClusterMembership>,
    mut rx: mpsc::UnboundedReceiver<Vec<ServiceInstance>>,
    views: Arc<watch::Sender<Arc<ClusterView>>>,
    shutdown: Arc<Notify>,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.notified() => {
                debug!("reconciliation worker shutting down");
                break;
            }
            next = rx.recv() => {
                let Some(snapshot) = next else {
                    debug!("registry released the monitor; reconciliation worker exiting");
                    break;
                };

                // A panicking listener must not end the watch
                let applying = Arc::clone(&membership);
                match tokio::spawn(async move { applying.apply(snapshot).await }).await {
                    Ok(change) => {
                        views.send_replace(change.view);
                    }
                    Err(e) => {
                        error!(error = %e, "applying registry snapshot failed");
                        views.send_replace(membership.current());
                    }
                }
            }
        }
    }
}
