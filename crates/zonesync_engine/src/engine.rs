//! The sync engine facade.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::events::SyncEvent;
use crate::provision::{SubscriptionRegistrar, ZoneDirectory};
use crate::remote::RemoteService;
use crate::state::StateStore;
use crate::store::LocalStore;
use crate::token::TokenStore;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use tracing::{debug, info};
use zonesync_protocol::DatabaseScope;

/// Counters describing the engine's work so far.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Completed fetch cycles, across scopes.
    pub fetch_cycles: u64,
    /// Completed push cycles.
    pub push_cycles: u64,
    /// Zone scans that completed and committed a token.
    pub zones_fetched: u64,
    /// Changed records handed to the local store.
    pub records_applied: u64,
    /// Deletions handed to the local store.
    pub records_deleted: u64,
    /// Records uploaded and marked synced.
    pub records_pushed: u64,
    /// Change tokens reset after expiry.
    pub token_resets: u64,
    /// Message of the most recent error, if any.
    pub last_error: Option<String>,
}

/// The sync engine: change discovery, local application, and outbound push
/// for one device.
///
/// Constructed once at process start and shared by reference; there is no
/// ambient global state. Generic over the remote service port `R` and the
/// local store port `L`.
pub struct SyncEngine<R: RemoteService, L: LocalStore> {
    pub(crate) config: SyncConfig,
    pub(crate) remote: Arc<R>,
    pub(crate) local: Arc<L>,
    pub(crate) tokens: TokenStore,
    pub(crate) zones: ZoneDirectory<R>,
    pub(crate) subscriptions: SubscriptionRegistrar<R>,
    scope_guards: [Mutex<()>; 3],
    pub(crate) push_guard: Mutex<()>,
    subscribers: Mutex<Vec<Sender<SyncEvent>>>,
    pub(crate) stats: RwLock<SyncStats>,
    cancelled: AtomicBool,
}

impl<R: RemoteService, L: LocalStore> SyncEngine<R, L> {
    /// Creates a new engine over the given ports and persisted state.
    pub fn new(config: SyncConfig, remote: R, local: L, state: Arc<dyn StateStore>) -> Self {
        let remote = Arc::new(remote);
        Self {
            tokens: TokenStore::new(Arc::clone(&state)),
            zones: ZoneDirectory::new(Arc::clone(&remote), Arc::clone(&state)),
            subscriptions: SubscriptionRegistrar::new(Arc::clone(&remote), state),
            config,
            remote,
            local: Arc::new(local),
            scope_guards: [Mutex::new(()), Mutex::new(()), Mutex::new(())],
            push_guard: Mutex::new(()),
            subscribers: Mutex::new(Vec::new()),
            stats: RwLock::new(SyncStats::default()),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Returns the engine's configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the token store, e.g. to inspect committed tokens.
    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    /// Returns a snapshot of the engine's counters.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Subscribes to lifecycle events. The caller owns the receiver;
    /// dropping it unsubscribes.
    pub fn subscribe(&self) -> Receiver<SyncEvent> {
        let (tx, rx) = channel();
        self.subscribers.lock().push(tx);
        rx
    }

    pub(crate) fn emit(&self, event: SyncEvent) {
        // Prune subscribers whose receiver is gone.
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Requests cancellation of in-flight work. Honored at pagination and
    /// batch boundaries, where no token state is in flux.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Clears a previous cancellation request.
    pub fn reset_cancel(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    pub(crate) fn check_cancelled(&self) -> SyncResult<()> {
        if self.cancelled.load(Ordering::SeqCst) {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub(crate) fn scope_guard(&self, scope: DatabaseScope) -> &Mutex<()> {
        let index = match scope {
            DatabaseScope::Private => 0,
            DatabaseScope::Shared => 1,
            DatabaseScope::Public => 2,
        };
        &self.scope_guards[index]
    }

    pub(crate) fn record_error(&self, error: &SyncError) {
        self.stats.write().last_error = Some(error.to_string());
    }

    /// Provisions the remote side and runs an initial full cycle:
    /// ensure zone, ensure subscriptions, fetch every configured scope,
    /// then push local changes.
    pub fn setup(&self) -> SyncResult<()> {
        info!("starting sync setup");
        self.reset_cancel();

        self.zones.ensure(&self.config.zone())?;
        for &scope in &self.config.databases {
            // The public database does not support change subscriptions.
            if scope != DatabaseScope::Public {
                self.subscriptions.ensure(scope)?;
            }
        }

        for &scope in &self.config.databases {
            self.fetch_changes(scope)?;
        }
        self.push_local_changes()?;

        info!("sync setup finished");
        Ok(())
    }

    /// Handles a push notification: re-fetches the affected scope only.
    pub fn handle_notification(&self, scope: DatabaseScope) -> SyncResult<()> {
        debug!(%scope, "change notification received");
        self.fetch_changes(scope)
    }
}
