//! Lifecycle events published by the engine.

use zonesync_protocol::{DatabaseScope, ZoneId};

/// A lifecycle event emitted while syncing.
///
/// Events are delivered over channels handed out by
/// [`SyncEngine::subscribe`](crate::SyncEngine::subscribe); the caller owns
/// the receiving end and a dropped receiver is silently pruned.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// A fetch started for a database scope.
    FetchStarted {
        /// The scope being fetched.
        scope: DatabaseScope,
    },
    /// A fetch completed successfully for a database scope.
    FetchCompleted {
        /// The scope that finished.
        scope: DatabaseScope,
    },
    /// The remote service reported a zone as deleted.
    ZoneDeleted {
        /// The deleted zone.
        zone: ZoneId,
    },
    /// A push cycle completed successfully.
    PushCompleted {
        /// Number of records uploaded across all batches.
        uploaded: usize,
    },
}
