//! Joining and leaving shards
//!
//! TigerStyle: Sequential pass-through to the registry, explicit partial failure.
//!
//! # Partial failure
//! - `join` stops at the first failed shard. Shards registered before it stay
//!   registered and their handles come back in `JoinError`; the caller
//!   decides whether to leave them.
//! - `leave` stops at the first failed deregistration and hands back both the
//!   failed handle and the ones it never reached, so the caller can retry.

use crate::endpoint::{Address, ShardId};
use crate::error::{RegistryError, RegistryResult};
use crate::registry::{Registration, ServiceRegistry};
use shardview_core::constants::JOIN_SHARDS_COUNT_MAX;
use shardview_core::io::{TimeProvider, WallClockTime};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Right to deregister one shard registration
///
/// Created by `join`, consumed by `leave`.
pub struct RegistrationHandle {
    shard: ShardId,
    address: Address,
    registration: Box<dyn Registration>,
}

impl RegistrationHandle {
    /// Shard this handle registered
    pub fn shard(&self) -> ShardId {
        self.shard
    }

    /// Address registered for the shard
    pub fn address(&self) -> &Address {
        &self.address
    }

    async fn leave(&mut self) -> RegistryResult<()> {
        self.registration.leave().await
    }
}

impl fmt::Debug for RegistrationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationHandle")
            .field("shard", &self.shard)
            .field("address", &self.address)
            .finish()
    }
}

/// Batch join stopped before registering every shard
#[derive(Error, Debug)]
#[error("join stopped with {} shard(s) registered: {source}", .registered.len())]
pub struct JoinError {
    /// Handles for shards registered before the failure (still registered)
    pub registered: Vec<RegistrationHandle>,
    /// Why the join stopped
    #[source]
    pub source: RegistryError,
}

impl JoinError {
    /// Hand back the registrations made before the failure
    pub fn into_registered(self) -> Vec<RegistrationHandle> {
        self.registered
    }
}

impl From<RegistryError> for JoinError {
    fn from(source: RegistryError) -> Self {
        Self {
            registered: Vec::new(),
            source,
        }
    }
}

/// Batch leave stopped at a failed deregistration
#[derive(Error, Debug)]
#[error("leave failed for shard {}; {} handle(s) not processed: {source}", .failed.shard(), .unprocessed.len())]
pub struct LeaveError {
    /// The handle whose deregistration failed (still registered)
    pub failed: RegistrationHandle,
    /// Handles after the failed one, untouched
    pub unprocessed: Vec<RegistrationHandle>,
    /// Why the deregistration failed
    #[source]
    pub source: RegistryError,
}

impl LeaveError {
    /// Every handle still registered, failed one first
    pub fn into_remaining(self) -> Vec<RegistrationHandle> {
        let mut remaining = Vec::with_capacity(self.unprocessed.len() + 1);
        remaining.push(self.failed);
        remaining.extend(self.unprocessed);
        remaining
    }
}

/// Registers the local node for shards with the service registry
pub struct MembershipRegistrar<R: ServiceRegistry + ?Sized> {
    registry: Arc<R>,
    time: Arc<dyn TimeProvider>,
    join_interval_ms: u64,
}

impl<R: ServiceRegistry + ?Sized> MembershipRegistrar<R> {
    /// Create a registrar with no pause between registrations
    pub fn new(registry: Arc<R>) -> Self {
        Self {
            registry,
            time: Arc::new(WallClockTime::new()),
            join_interval_ms: 0,
        }
    }

    /// Pause between consecutive shard registrations
    pub fn with_join_interval_ms(mut self, interval_ms: u64) -> Self {
        self.join_interval_ms = interval_ms;
        self
    }

    /// Use a custom time provider for pacing
    pub fn with_time(mut self, time: Arc<dyn TimeProvider>) -> Self {
        self.time = time;
        self
    }

    /// Register `address` for each shard, in order, one handle per shard
    ///
    /// # Errors
    /// Returns `JoinError` wrapping `InvalidShardSet` for an empty, oversized,
    /// or repeating shard list, or wrapping the first registration error.
    /// Earlier registrations are not rolled back; their handles are carried
    /// in the error.
    pub async fn join(
        &self,
        address: &Address,
        shards: &[ShardId],
    ) -> Result<Vec<RegistrationHandle>, JoinError> {
        validate_shards(shards)?;

        let mut handles = Vec::with_capacity(shards.len());
        for (index, &shard) in shards.iter().enumerate() {
            if index > 0 && self.join_interval_ms > 0 {
                self.time.sleep_ms(self.join_interval_ms).await;
            }

            match self.registry.register(address, BTreeMap::new(), shard).await {
                Ok(registration) => handles.push(RegistrationHandle {
                    shard,
                    address: address.clone(),
                    registration,
                }),
                Err(e) => {
                    warn!(
                        %address,
                        shard,
                        registered = handles.len(),
                        error = %e,
                        "join failed; earlier registrations left in place"
                    );
                    return Err(JoinError {
                        registered: handles,
                        source: e,
                    });
                }
            }
        }

        info!(
            %address,
            namespace = self.registry.namespace(),
            joined = handles.len(),
            "joined shards"
        );
        Ok(handles)
    }

    /// Deregister each handle, in order
    ///
    /// # Errors
    /// Returns `LeaveError` at the first failed deregistration, carrying the
    /// failed handle and every handle not yet processed.
    pub async fn leave(&self, handles: Vec<RegistrationHandle>) -> Result<(), LeaveError> {
        let total = handles.len();
        let mut pending = handles.into_iter();

        while let Some(mut handle) = pending.next() {
            if let Err(source) = handle.leave().await {
                let unprocessed: Vec<RegistrationHandle> = pending.by_ref().collect();
                warn!(
                    shard = handle.shard(),
                    unprocessed = unprocessed.len(),
                    error = %source,
                    "leave failed"
                );
                return Err(LeaveError {
                    failed: handle,
                    unprocessed,
                    source,
                });
            }
        }

        info!(namespace = self.registry.namespace(), left = total, "left shards");
        Ok(())
    }
}

fn validate_shards(shards: &[ShardId]) -> RegistryResult<()> {
    if shards.is_empty() {
        return Err(RegistryError::InvalidShardSet {
            reason: "shard list cannot be empty".into(),
        });
    }

    if shards.len() > JOIN_SHARDS_COUNT_MAX {
        return Err(RegistryError::InvalidShardSet {
            reason: format!(
                "{} shards exceeds limit {}",
                shards.len(),
                JOIN_SHARDS_COUNT_MAX
            ),
        });
    }

    let mut seen = HashSet::with_capacity(shards.len());
    if let Some(repeated) = shards.iter().find(|shard| !seen.insert(**shard)) {
        return Err(RegistryError::InvalidShardSet {
            reason: format!("shard {} listed more than once", repeated),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MemoryServiceRegistry;
    use shardview_core::io::ManualClock;

    fn addr() -> Address {
        Address::new("10.0.0.1", 9000).unwrap()
    }

    fn registered_shards(instances: &[crate::endpoint::ServiceInstance]) -> Vec<ShardId> {
        let mut shards: Vec<ShardId> = instances.iter().filter_map(|i| i.shard).collect();
        shards.sort_unstable();
        shards
    }

    #[tokio::test]
    async fn test_join_and_leave() {
        let registry = Arc::new(MemoryServiceRegistry::new("/c"));
        let registrar = MembershipRegistrar::new(registry.clone());

        let handles = registrar.join(&addr(), &[3, 7]).await.unwrap();
        assert_eq!(handles.len(), 2);
        assert_eq!(handles[0].shard(), 3);
        assert_eq!(handles[1].shard(), 7);
        assert_eq!(handles[0].address(), &addr());
        assert_eq!(registered_shards(&registry.instances().await), vec![3, 7]);

        registrar.leave(handles).await.unwrap();
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_join_rejects_bad_shard_sets() {
        let registry = Arc::new(MemoryServiceRegistry::new("/c"));
        let registrar = MembershipRegistrar::new(registry.clone());

        let err = registrar.join(&addr(), &[]).await.unwrap_err();
        assert!(matches!(err.source, RegistryError::InvalidShardSet { .. }));
        assert!(err.registered.is_empty());

        let err = registrar.join(&addr(), &[1, 2, 1]).await.unwrap_err();
        assert!(matches!(err.source, RegistryError::InvalidShardSet { .. }));
        let too_many: Vec<ShardId> = (0..=JOIN_SHARDS_COUNT_MAX as ShardId).collect();
        assert!(registrar.join(&addr(), &too_many).await.is_err());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_partial_join_keeps_earlier_registrations() {
        let registry = Arc::new(MemoryServiceRegistry::new("/c"));
        registry.fail_register(2).await;
        let registrar = MembershipRegistrar::new(registry.clone());

        let err = registrar.join(&addr(), &[1, 2, 3]).await.unwrap_err();
        assert!(matches!(
            err.source,
            RegistryError::RegistrationFailed { shard: 2, .. }
        ));
        assert!(err.to_string().contains("1 shard(s) registered"));
        assert_eq!(registered_shards(&registry.instances().await), vec![1]);
    }

    #[tokio::test]
    async fn test_partial_join_returns_handles_for_cleanup() {
        let registry = Arc::new(MemoryServiceRegistry::new("/c"));
        registry.fail_register(2).await;
        let registrar = MembershipRegistrar::new(registry.clone());

        let err = registrar.join(&addr(), &[1, 2]).await.unwrap_err();
        let registered = err.into_registered();
        assert_eq!(registered.len(), 1);
        assert_eq!(registered[0].shard(), 1);

        registrar.leave(registered).await.unwrap();
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_partial_leave_reports_unprocessed() {
        let registry = Arc::new(MemoryServiceRegistry::new("/c"));
        let registrar = MembershipRegistrar::new(registry.clone());
        let handles = registrar.join(&addr(), &[1, 2, 3]).await.unwrap();

        registry.fail_leave(2).await;
        let err = registrar.leave(handles).await.unwrap_err();
        assert_eq!(err.failed.shard(), 2);
        assert_eq!(err.unprocessed.len(), 1);
        assert_eq!(err.unprocessed[0].shard(), 3);
        assert!(matches!(
            err.source,
            RegistryError::DeregistrationFailed { shard: 2, .. }
        ));
        assert!(err.to_string().contains("shard 2"));
        assert_eq!(registered_shards(&registry.instances().await), vec![2, 3]);

        registry.clear_faults().await;
        registrar.leave(err.into_remaining()).await.unwrap();
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_join_pacing() {
        let registry = Arc::new(MemoryServiceRegistry::new("/c"));
        let clock = Arc::new(ManualClock::new(0));
        let registrar = MembershipRegistrar::new(registry)
            .with_join_interval_ms(5000)
            .with_time(clock.clone());

        registrar.join(&addr(), &[1, 2, 3]).await.unwrap();
        // Pauses between registrations, not before the first
        assert_eq!(clock.slept_ms(), 10_000);
    }
}
