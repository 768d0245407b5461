//! Idempotent zone and subscription provisioning.

use crate::error::{SyncError, SyncResult};
use crate::remote::RemoteService;
use crate::state::StateStore;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};
use zonesync_protocol::{DatabaseScope, ZoneId};

fn zone_gate_key(zone: &ZoneId) -> String {
    format!("zone-created:{}", zone.name)
}

fn subscription_gate_key(scope: DatabaseScope) -> String {
    format!("subscription-registered:{}", scope.key())
}

/// Ensures the engine's record zones exist remotely, at most once per
/// device lifetime.
///
/// The created state is a persisted gate flag, not re-derived from the
/// remote service: once set, `ensure` succeeds without a network call.
/// The remote `create_zone` contract is an upsert, so a gate lost to a
/// reinstall costs one redundant create, never a failure.
pub struct ZoneDirectory<R> {
    remote: Arc<R>,
    state: Arc<dyn StateStore>,
    gate: Mutex<()>,
}

impl<R: RemoteService> ZoneDirectory<R> {
    /// Creates a zone directory.
    pub fn new(remote: Arc<R>, state: Arc<dyn StateStore>) -> Self {
        Self {
            remote,
            state,
            gate: Mutex::new(()),
        }
    }

    /// Ensures `zone` exists remotely.
    ///
    /// On failure the gate stays unset so the next call retries.
    pub fn ensure(&self, zone: &ZoneId) -> SyncResult<()> {
        let _serialized = self.gate.lock();
        let key = zone_gate_key(zone);
        if self.state.flag(&key) {
            return Ok(());
        }

        debug!(zone = %zone, "creating record zone");
        self.remote.create_zone(zone).map_err(SyncError::remote)?;
        self.state.set_flag(&key, true)?;
        info!(zone = %zone, "record zone created");
        Ok(())
    }

    /// Clears the created gate after the remote reports the zone deleted,
    /// so the next `ensure` recreates it.
    pub fn mark_missing(&self, zone: &ZoneId) -> SyncResult<()> {
        let _serialized = self.gate.lock();
        self.state.set_flag(&zone_gate_key(zone), false)
    }
}

/// Registers silent push subscriptions, at most once per device per scope.
///
/// Subscriptions carry no payload; their sole purpose is to wake the fetch
/// pipeline for the affected scope.
pub struct SubscriptionRegistrar<R> {
    remote: Arc<R>,
    state: Arc<dyn StateStore>,
    gate: Mutex<()>,
}

impl<R: RemoteService> SubscriptionRegistrar<R> {
    /// Creates a subscription registrar.
    pub fn new(remote: Arc<R>, state: Arc<dyn StateStore>) -> Self {
        Self {
            remote,
            state,
            gate: Mutex::new(()),
        }
    }

    /// Ensures the device is subscribed to change notifications for `scope`.
    ///
    /// On failure the gate stays unset so the next call retries.
    pub fn ensure(&self, scope: DatabaseScope) -> SyncResult<()> {
        let _serialized = self.gate.lock();
        let key = subscription_gate_key(scope);
        if self.state.flag(&key) {
            return Ok(());
        }

        debug!(%scope, "registering change subscription");
        self.remote
            .create_subscription(scope)
            .map_err(SyncError::remote)?;
        self.state.set_flag(&key, true)?;
        info!(%scope, "change subscription registered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MockRemote;
    use crate::state::MemoryStateStore;
    use zonesync_protocol::{RemoteError, RemoteErrorCode};

    #[test]
    fn ensure_zone_creates_once() {
        let remote = Arc::new(MockRemote::new());
        let state: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        let zones = ZoneDirectory::new(Arc::clone(&remote), state);
        let zone = ZoneId::own("notes");

        zones.ensure(&zone).unwrap();
        zones.ensure(&zone).unwrap();

        assert_eq!(remote.created_zones().len(), 1);
    }

    #[test]
    fn zone_gate_survives_directory_restart() {
        let remote = Arc::new(MockRemote::new());
        let state: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        let zone = ZoneId::own("notes");

        ZoneDirectory::new(Arc::clone(&remote), Arc::clone(&state))
            .ensure(&zone)
            .unwrap();
        // A new directory over the same persisted state skips the network.
        ZoneDirectory::new(Arc::clone(&remote), state)
            .ensure(&zone)
            .unwrap();

        assert_eq!(remote.created_zones().len(), 1);
    }

    #[test]
    fn failed_creation_leaves_gate_unset() {
        let remote = Arc::new(MockRemote::new());
        remote.fail_zone_creation(RemoteError::new(RemoteErrorCode::ZoneBusy, "busy"));
        let state: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        let zones = ZoneDirectory::new(Arc::clone(&remote), state);
        let zone = ZoneId::own("notes");

        assert!(zones.ensure(&zone).is_err());

        // The next attempt retries and succeeds.
        remote.allow_zone_creation();
        zones.ensure(&zone).unwrap();
        assert_eq!(remote.created_zones().len(), 1);
    }

    #[test]
    fn mark_missing_forces_recreation() {
        let remote = Arc::new(MockRemote::new());
        let state: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        let zones = ZoneDirectory::new(Arc::clone(&remote), state);
        let zone = ZoneId::own("notes");

        zones.ensure(&zone).unwrap();
        zones.mark_missing(&zone).unwrap();
        zones.ensure(&zone).unwrap();

        assert_eq!(remote.created_zones().len(), 2);
    }

    #[test]
    fn ensure_subscription_registers_once_per_scope() {
        let remote = Arc::new(MockRemote::new());
        let state: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        let subscriptions = SubscriptionRegistrar::new(Arc::clone(&remote), state);

        subscriptions.ensure(DatabaseScope::Private).unwrap();
        subscriptions.ensure(DatabaseScope::Private).unwrap();
        subscriptions.ensure(DatabaseScope::Shared).unwrap();

        assert_eq!(
            remote.created_subscriptions(),
            vec![DatabaseScope::Private, DatabaseScope::Shared]
        );
    }

    #[test]
    fn failed_subscription_retries() {
        let remote = Arc::new(MockRemote::new());
        remote.fail_subscription_creation(RemoteError::new(
            RemoteErrorCode::NetworkUnavailable,
            "offline",
        ));
        let state: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        let subscriptions = SubscriptionRegistrar::new(Arc::clone(&remote), state);

        let err = subscriptions.ensure(DatabaseScope::Private).unwrap_err();
        assert!(err.is_retryable());
        assert!(remote.created_subscriptions().is_empty());
    }
}
