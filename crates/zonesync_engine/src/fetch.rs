//! The change fetch pipeline: database-level and zone-level scans.

use crate::engine::SyncEngine;
use crate::error::{ErrorKind, SyncError, SyncResult};
use crate::events::SyncEvent;
use crate::remote::RemoteService;
use crate::store::LocalStore;
use std::collections::HashSet;
use tracing::{debug, warn};
use zonesync_protocol::{
    DatabaseScope, DeletedRecord, SyncRecord, TokenScope, ZoneId, ZoneScanRequest,
};

impl<R: RemoteService, L: LocalStore> SyncEngine<R, L> {
    /// Discovers and applies all remote changes for one database scope.
    ///
    /// Concurrent calls for the same scope are serialized; different scopes
    /// have independent token spaces and may proceed concurrently. A
    /// scope's token only ever advances after the corresponding records
    /// were applied through the local store, so any failure leaves the
    /// scope safe to retry.
    pub fn fetch_changes(&self, scope: DatabaseScope) -> SyncResult<()> {
        let _inflight = self.scope_guard(scope).lock();
        self.check_cancelled()?;

        debug!(%scope, "fetching database changes");
        self.emit(SyncEvent::FetchStarted { scope });

        let result = self.scan_database(scope);
        match &result {
            Ok(()) => {
                self.stats.write().fetch_cycles += 1;
                debug!(%scope, "database fetch finished");
                self.emit(SyncEvent::FetchCompleted { scope });
            }
            Err(error) => self.record_error(error),
        }
        result
    }

    /// Pages through the database-level change scan.
    ///
    /// Each successful page runs the zone-level scan for the zones it
    /// reported and only then commits the page's final token, so the
    /// stored token strictly advances page by page. The loop is bounded:
    /// a remote that keeps signalling more pages (or keeps expiring
    /// tokens) hits the page ceiling instead of looping forever.
    fn scan_database(&self, scope: DatabaseScope) -> SyncResult<()> {
        let db_scope = TokenScope::Database(scope);
        let limit = self.config.max_scan_pages;
        let mut pages = 0u32;

        loop {
            self.check_cancelled()?;
            pages += 1;
            if pages > limit {
                return Err(SyncError::PaginationCeiling { limit });
            }

            let since = self.tokens.latest(&db_scope);
            let page = match self.remote.scan_database_changes(scope, since.as_ref()) {
                Ok(page) => page,
                Err(source) => {
                    let error = SyncError::remote(source);
                    if error.kind() == Some(ErrorKind::ChangeTokenExpired) {
                        warn!(%scope, "database change token expired, forcing full resync");
                        self.tokens.reset(&db_scope)?;
                        self.stats.write().token_resets += 1;
                        continue;
                    }
                    return Err(error);
                }
            };

            // Deduplicate changed zones, preserving discovery order.
            let mut seen = HashSet::new();
            let mut changed: Vec<ZoneId> = page
                .changed_zones
                .into_iter()
                .filter(|zone| seen.insert(zone.clone()))
                .collect();

            for zone in &page.deleted_zones {
                warn!(%zone, "zone deleted remotely");
                changed.retain(|z| z != zone);
                self.tokens.reset(&TokenScope::Zone(zone.clone()))?;
                self.zones.mark_missing(zone)?;
                if *zone == self.config.zone() {
                    // Recreate our own zone right away so later pushes
                    // have somewhere to land.
                    self.zones.ensure(zone)?;
                }
                self.emit(SyncEvent::ZoneDeleted { zone: zone.clone() });
            }

            for checkpoint in page.token_checkpoints {
                self.tokens.save_new(&db_scope, checkpoint, false)?;
            }

            self.fetch_changes_in_zones(scope, &changed)?;

            // Every zone in this page has applied; the database cursor may
            // now advance durably.
            self.tokens.save_new(&db_scope, page.final_token, true)?;

            if !page.more_coming {
                return Ok(());
            }
            debug!(%scope, page = pages, "more database changes coming");
        }
    }

    /// Fetches and applies record changes for a set of zones.
    ///
    /// One batched remote call covers all given zones. A zone's token is
    /// committed only after its records were applied; zones reporting
    /// `more_coming` are rescanned in follow-up rounds. A single zone's
    /// unrecoverable failure aborts the aggregate, but the other zones in
    /// the same batch still complete first.
    pub(crate) fn fetch_changes_in_zones(
        &self,
        scope: DatabaseScope,
        zones: &[ZoneId],
    ) -> SyncResult<()> {
        if zones.is_empty() {
            return Ok(());
        }
        debug!(%scope, zones = zones.len(), "fetching zone changes");

        let limit = self.config.max_scan_pages;
        let mut queue: Vec<ZoneId> = zones.to_vec();
        let mut rounds = 0u32;

        while !queue.is_empty() {
            self.check_cancelled()?;
            rounds += 1;
            if rounds > limit {
                return Err(SyncError::PaginationCeiling { limit });
            }

            let requests: Vec<ZoneScanRequest> = queue
                .iter()
                .map(|zone| {
                    let since = self.tokens.latest(&TokenScope::Zone(zone.clone()));
                    ZoneScanRequest::new(zone.clone(), since)
                })
                .collect();

            let batch = self
                .remote
                .scan_zone_changes(scope, &requests)
                .map_err(SyncError::remote)?;

            let mut followups: Vec<ZoneId> = Vec::new();
            let mut first_error: Option<SyncError> = None;

            for result in batch.zone_results {
                let zone_scope = TokenScope::Zone(result.zone.clone());
                for checkpoint in result.token_checkpoints {
                    self.tokens.save_new(&zone_scope, checkpoint, false)?;
                }

                match result.completion {
                    Err(source) => {
                        let error = SyncError::remote(source);
                        if error.kind() == Some(ErrorKind::ChangeTokenExpired) {
                            warn!(zone = %result.zone, "zone change token expired, rescanning zone");
                            self.tokens.reset(&zone_scope)?;
                            self.stats.write().token_resets += 1;
                            followups.push(result.zone);
                        } else {
                            warn!(zone = %result.zone, %error, "zone scan failed");
                            first_error.get_or_insert(error);
                        }
                    }
                    Ok(completion) => {
                        let deleted: Vec<DeletedRecord> = batch
                            .deleted_records
                            .iter()
                            .filter(|d| d.record_id.zone == result.zone)
                            .cloned()
                            .collect();
                        // Deletion wins: a record reported both changed and
                        // deleted in one batch is applied as deleted.
                        let changed: Vec<SyncRecord> = batch
                            .changed_records
                            .iter()
                            .filter(|r| r.record_id.zone == result.zone)
                            .filter(|r| !deleted.iter().any(|d| d.record_id == r.record_id))
                            .cloned()
                            .collect();

                        match self.local.apply_changes(&changed, &deleted) {
                            Err(store_error) => {
                                warn!(zone = %result.zone, error = %store_error, "local apply failed");
                                first_error.get_or_insert(store_error.into());
                            }
                            Ok(()) => {
                                self.tokens
                                    .save_new(&zone_scope, completion.final_token, true)?;
                                {
                                    let mut stats = self.stats.write();
                                    stats.zones_fetched += 1;
                                    stats.records_applied += changed.len() as u64;
                                    stats.records_deleted += deleted.len() as u64;
                                }
                                if completion.more_coming {
                                    debug!(zone = %result.zone, "more zone changes coming");
                                    followups.push(result.zone);
                                }
                            }
                        }
                    }
                }
            }

            if let Some(error) = first_error {
                return Err(error);
            }
            queue = followups;
        }
        Ok(())
    }
}
