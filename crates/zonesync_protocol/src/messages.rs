//! Pages and batches produced by the remote service's change scans.

use crate::error::RemoteError;
use crate::record::{DeletedRecord, SyncRecord};
use crate::scope::ZoneId;
use crate::token::ChangeToken;
use serde::{Deserialize, Serialize};

/// One page of a database-level change scan.
///
/// The scan streams zone identifiers whose contents changed, zone
/// identifiers deleted remotely, zero or more intermediate token
/// checkpoints, and a final token. `more_coming` signals that another page
/// must be requested with the final token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseScanPage {
    /// Zones with record changes since the request token.
    pub changed_zones: Vec<ZoneId>,
    /// Zones deleted since the request token.
    pub deleted_zones: Vec<ZoneId>,
    /// Intermediate tokens, safe to stage but not to commit.
    pub token_checkpoints: Vec<ChangeToken>,
    /// Token covering everything in this page.
    pub final_token: ChangeToken,
    /// True if another page is available.
    pub more_coming: bool,
}

impl DatabaseScanPage {
    /// Creates a page with the given changed zones and final token.
    pub fn new(changed_zones: Vec<ZoneId>, final_token: ChangeToken, more_coming: bool) -> Self {
        Self {
            changed_zones,
            deleted_zones: Vec::new(),
            token_checkpoints: Vec::new(),
            final_token,
            more_coming,
        }
    }

    /// Adds deleted zones to the page.
    pub fn with_deleted_zones(mut self, zones: Vec<ZoneId>) -> Self {
        self.deleted_zones = zones;
        self
    }

    /// Adds intermediate token checkpoints to the page.
    pub fn with_checkpoints(mut self, checkpoints: Vec<ChangeToken>) -> Self {
        self.token_checkpoints = checkpoints;
        self
    }
}

/// Per-zone input to a zone-level change scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneScanRequest {
    /// The zone to scan.
    pub zone: ZoneId,
    /// The zone's stored token; `None` forces a full scan of the zone.
    pub since: Option<ChangeToken>,
}

impl ZoneScanRequest {
    /// Creates a scan request for one zone.
    pub fn new(zone: ZoneId, since: Option<ChangeToken>) -> Self {
        Self { zone, since }
    }
}

/// Successful completion of one zone within a zone-level scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneCompletion {
    /// Token covering everything delivered for the zone.
    pub final_token: ChangeToken,
    /// True if the zone has further changes and must be scanned again.
    pub more_coming: bool,
}

/// Outcome of one zone within a zone-level scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneScanResult {
    /// The zone this result belongs to.
    pub zone: ZoneId,
    /// Intermediate tokens for the zone, safe to stage but not to commit.
    pub token_checkpoints: Vec<ChangeToken>,
    /// Completion signal, or the zone's failure.
    pub completion: Result<ZoneCompletion, RemoteError>,
}

impl ZoneScanResult {
    /// Creates a successful zone result.
    pub fn success(zone: ZoneId, final_token: ChangeToken, more_coming: bool) -> Self {
        Self {
            zone,
            token_checkpoints: Vec::new(),
            completion: Ok(ZoneCompletion {
                final_token,
                more_coming,
            }),
        }
    }

    /// Creates a failed zone result.
    pub fn failure(zone: ZoneId, error: RemoteError) -> Self {
        Self {
            zone,
            token_checkpoints: Vec::new(),
            completion: Err(error),
        }
    }

    /// Adds intermediate token checkpoints.
    pub fn with_checkpoints(mut self, checkpoints: Vec<ChangeToken>) -> Self {
        self.token_checkpoints = checkpoints;
        self
    }
}

/// Result of one batched zone-level scan covering several zones.
///
/// Changed and deleted records arrive interleaved across zones; consumers
/// partition them by the zone in each record's identity.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ZoneScanBatch {
    /// Records created or modified, across all requested zones.
    pub changed_records: Vec<SyncRecord>,
    /// Records deleted, across all requested zones.
    pub deleted_records: Vec<DeletedRecord>,
    /// One result per requested zone.
    pub zone_results: Vec<ZoneScanResult>,
}

impl ZoneScanBatch {
    /// Creates an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a changed record.
    pub fn with_changed(mut self, record: SyncRecord) -> Self {
        self.changed_records.push(record);
        self
    }

    /// Adds a deletion notice.
    pub fn with_deleted(mut self, record: DeletedRecord) -> Self {
        self.deleted_records.push(record);
        self
    }

    /// Adds a zone result.
    pub fn with_zone_result(mut self, result: ZoneScanResult) -> Self {
        self.zone_results.push(result);
        self
    }
}
