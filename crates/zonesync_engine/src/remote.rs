//! The remote service port and a scripted mock for tests.

use parking_lot::Mutex;
use std::collections::VecDeque;
use zonesync_protocol::{
    ChangeToken, DatabaseScanPage, DatabaseScope, RemoteError, RemoteErrorCode, SyncRecord,
    ZoneId, ZoneScanBatch, ZoneScanRequest,
};

/// Network port to the record-oriented cloud service.
///
/// Implementations handle transport concerns (HTTP, retry plumbing,
/// serialization); the engine only sees pages, batches, and wire errors.
pub trait RemoteService: Send + Sync {
    /// Creates a record zone in the private database.
    ///
    /// Creating a zone that already exists must succeed: the engine relies
    /// on upsert semantics to recover when its local gate flag was lost
    /// (e.g. after a reinstall).
    fn create_zone(&self, zone: &ZoneId) -> Result<(), RemoteError>;

    /// Registers a silent push subscription for a database scope.
    /// Re-registering an existing subscription must succeed.
    fn create_subscription(&self, scope: DatabaseScope) -> Result<(), RemoteError>;

    /// Requests one page of database-level changes since `since`.
    /// `None` requests a full scan.
    fn scan_database_changes(
        &self,
        scope: DatabaseScope,
        since: Option<&ChangeToken>,
    ) -> Result<DatabaseScanPage, RemoteError>;

    /// Requests record-level changes for a set of zones in one batched
    /// call, each zone scanned from its own stored token.
    ///
    /// Token expiry is reported per zone through that zone's result, never
    /// as a batch-level failure; the batch-level `Err` is reserved for
    /// failures of the request itself.
    fn scan_zone_changes(
        &self,
        scope: DatabaseScope,
        requests: &[ZoneScanRequest],
    ) -> Result<ZoneScanBatch, RemoteError>;

    /// Uploads a batch of records as one atomic multi-record write.
    /// Returns the saved records carrying fresh server metadata.
    fn upload_records(
        &self,
        scope: DatabaseScope,
        records: &[SyncRecord],
    ) -> Result<Vec<SyncRecord>, RemoteError>;
}

impl<T: RemoteService + ?Sized> RemoteService for std::sync::Arc<T> {
    fn create_zone(&self, zone: &ZoneId) -> Result<(), RemoteError> {
        (**self).create_zone(zone)
    }

    fn create_subscription(&self, scope: DatabaseScope) -> Result<(), RemoteError> {
        (**self).create_subscription(scope)
    }

    fn scan_database_changes(
        &self,
        scope: DatabaseScope,
        since: Option<&ChangeToken>,
    ) -> Result<DatabaseScanPage, RemoteError> {
        (**self).scan_database_changes(scope, since)
    }

    fn scan_zone_changes(
        &self,
        scope: DatabaseScope,
        requests: &[ZoneScanRequest],
    ) -> Result<ZoneScanBatch, RemoteError> {
        (**self).scan_zone_changes(scope, requests)
    }

    fn upload_records(
        &self,
        scope: DatabaseScope,
        records: &[SyncRecord],
    ) -> Result<Vec<SyncRecord>, RemoteError> {
        (**self).upload_records(scope, records)
    }
}

/// A scripted remote service for testing.
///
/// Responses are queues so paginated flows can be scripted page by page;
/// every call is recorded for assertions.
#[derive(Default)]
pub struct MockRemote {
    database_pages: Mutex<VecDeque<Result<DatabaseScanPage, RemoteError>>>,
    repeat_database_page: Mutex<Option<DatabaseScanPage>>,
    zone_batches: Mutex<VecDeque<Result<ZoneScanBatch, RemoteError>>>,
    upload_failures: Mutex<VecDeque<RemoteError>>,
    zone_failure: Mutex<Option<RemoteError>>,
    subscription_failure: Mutex<Option<RemoteError>>,

    created_zones: Mutex<Vec<ZoneId>>,
    created_subscriptions: Mutex<Vec<DatabaseScope>>,
    database_scans: Mutex<Vec<(DatabaseScope, Option<ChangeToken>)>>,
    zone_scans: Mutex<Vec<Vec<ZoneScanRequest>>>,
    uploads: Mutex<Vec<Vec<SyncRecord>>>,
}

impl MockRemote {
    /// Creates a mock with no scripted responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a database scan page.
    pub fn enqueue_database_page(&self, page: DatabaseScanPage) {
        self.database_pages.lock().push_back(Ok(page));
    }

    /// Queues a database scan failure.
    pub fn enqueue_database_error(&self, error: RemoteError) {
        self.database_pages.lock().push_back(Err(error));
    }

    /// Serves `page` for every database scan once the queue is empty.
    pub fn repeat_database_page(&self, page: DatabaseScanPage) {
        *self.repeat_database_page.lock() = Some(page);
    }

    /// Queues a zone scan batch.
    pub fn enqueue_zone_batch(&self, batch: ZoneScanBatch) {
        self.zone_batches.lock().push_back(Ok(batch));
    }

    /// Queues a zone scan failure.
    pub fn enqueue_zone_error(&self, error: RemoteError) {
        self.zone_batches.lock().push_back(Err(error));
    }

    /// Queues an upload failure; uploads succeed once the queue is empty.
    pub fn enqueue_upload_failure(&self, error: RemoteError) {
        self.upload_failures.lock().push_back(error);
    }

    /// Makes every zone creation fail with `error`.
    pub fn fail_zone_creation(&self, error: RemoteError) {
        *self.zone_failure.lock() = Some(error);
    }

    /// Clears a previously scripted zone creation failure.
    pub fn allow_zone_creation(&self) {
        *self.zone_failure.lock() = None;
    }

    /// Makes every subscription creation fail with `error`.
    pub fn fail_subscription_creation(&self, error: RemoteError) {
        *self.subscription_failure.lock() = Some(error);
    }

    /// Zones created so far.
    pub fn created_zones(&self) -> Vec<ZoneId> {
        self.created_zones.lock().clone()
    }

    /// Subscriptions created so far.
    pub fn created_subscriptions(&self) -> Vec<DatabaseScope> {
        self.created_subscriptions.lock().clone()
    }

    /// Database scans issued so far, with the token each carried.
    pub fn database_scans(&self) -> Vec<(DatabaseScope, Option<ChangeToken>)> {
        self.database_scans.lock().clone()
    }

    /// Zone scan requests issued so far, one entry per batched call.
    pub fn zone_scans(&self) -> Vec<Vec<ZoneScanRequest>> {
        self.zone_scans.lock().clone()
    }

    /// Upload batches issued so far, in order.
    pub fn uploads(&self) -> Vec<Vec<SyncRecord>> {
        self.uploads.lock().clone()
    }

    fn unscripted(what: &str) -> RemoteError {
        RemoteError::new(
            RemoteErrorCode::Other,
            format!("no scripted {what} response"),
        )
    }
}

impl RemoteService for MockRemote {
    fn create_zone(&self, zone: &ZoneId) -> Result<(), RemoteError> {
        if let Some(error) = self.zone_failure.lock().clone() {
            return Err(error);
        }
        self.created_zones.lock().push(zone.clone());
        Ok(())
    }

    fn create_subscription(&self, scope: DatabaseScope) -> Result<(), RemoteError> {
        if let Some(error) = self.subscription_failure.lock().clone() {
            return Err(error);
        }
        self.created_subscriptions.lock().push(scope);
        Ok(())
    }

    fn scan_database_changes(
        &self,
        scope: DatabaseScope,
        since: Option<&ChangeToken>,
    ) -> Result<DatabaseScanPage, RemoteError> {
        self.database_scans.lock().push((scope, since.cloned()));
        if let Some(response) = self.database_pages.lock().pop_front() {
            return response;
        }
        if let Some(page) = self.repeat_database_page.lock().clone() {
            return Ok(page);
        }
        Err(Self::unscripted("database scan"))
    }

    fn scan_zone_changes(
        &self,
        _scope: DatabaseScope,
        requests: &[ZoneScanRequest],
    ) -> Result<ZoneScanBatch, RemoteError> {
        self.zone_scans.lock().push(requests.to_vec());
        self.zone_batches
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(Self::unscripted("zone scan")))
    }

    fn upload_records(
        &self,
        _scope: DatabaseScope,
        records: &[SyncRecord],
    ) -> Result<Vec<SyncRecord>, RemoteError> {
        if let Some(error) = self.upload_failures.lock().pop_front() {
            return Err(error);
        }
        self.uploads.lock().push(records.to_vec());
        // Echo the batch back with server metadata filled in, the way the
        // real service returns saved records.
        Ok(records
            .iter()
            .map(|record| {
                let mut saved = record.clone();
                saved.system_metadata =
                    format!("srv-meta:{}", record.record_id.name).into_bytes();
                saved
            })
            .collect())
    }
}
