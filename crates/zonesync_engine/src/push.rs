//! The outbound push pipeline: hierarchy-ordered, batched uploads.

use crate::engine::SyncEngine;
use crate::error::{SyncError, SyncResult};
use crate::events::SyncEvent;
use crate::remote::RemoteService;
use crate::store::{LocalStore, SyncedUpload};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};
use uuid::Uuid;
use zonesync_protocol::{
    DatabaseScope, LocalEntityId, LocalFieldValue, LocalRecord, RecordField, RecordId, SyncRecord,
    ZoneId,
};

impl<R: RemoteService, L: LocalStore> SyncEngine<R, L> {
    /// Uploads all locally modified records, parents before children.
    ///
    /// Records are pushed strictly by ascending hierarchy level so that a
    /// referenced parent exists remotely before any child references it,
    /// and in batches capped at the configured size because the remote
    /// service rejects oversized writes. Records are marked synced only
    /// after the remote acknowledged the batch; a failed batch is left
    /// pending and retried on the next run.
    pub fn push_local_changes(&self) -> SyncResult<()> {
        let _inflight = self.push_guard.lock();
        self.check_cancelled()?;

        match self.push_pending() {
            Ok(uploaded) => {
                self.stats.write().push_cycles += 1;
                self.emit(SyncEvent::PushCompleted { uploaded });
                Ok(())
            }
            Err(error) => {
                self.record_error(&error);
                Err(error)
            }
        }
    }

    fn push_pending(&self) -> SyncResult<usize> {
        let mut remaining: Vec<LocalRecord> = self
            .local
            .pending_upload()?
            .into_iter()
            .filter(|record| record.sync_required)
            .collect();

        if remaining.is_empty() {
            debug!("no local changes to push");
            return Ok(0);
        }
        self.warn_unregistered_types(&remaining);

        let zone = self.config.zone();
        let limit = self.config.max_push_rounds;
        // Remote identities assigned during this run, for resolving
        // references to records uploaded a few batches earlier.
        let mut assigned: HashMap<LocalEntityId, RecordId> = HashMap::new();
        let mut uploaded_total = 0usize;
        let mut rounds = 0u32;

        while let Some(level) = remaining.iter().map(|r| r.hierarchy_level).min() {
            self.check_cancelled()?;
            rounds += 1;
            if rounds > limit {
                return Err(SyncError::HierarchyCeiling { limit });
            }

            // Up to max_batch records of the current level, stable order.
            // The level is drained completely before the next one starts.
            let mut batch: Vec<LocalRecord> = Vec::new();
            let mut rest: Vec<LocalRecord> = Vec::with_capacity(remaining.len());
            for record in remaining {
                if record.hierarchy_level == level && batch.len() < self.config.max_batch {
                    batch.push(record);
                } else {
                    rest.push(record);
                }
            }
            remaining = rest;

            debug!(level, count = batch.len(), "uploading record batch");
            let records: Vec<SyncRecord> = batch
                .iter()
                .map(|entity| self.build_upload(entity, &zone, &mut assigned))
                .collect();

            let saved = self
                .remote
                .upload_records(DatabaseScope::Private, &records)
                .map_err(SyncError::remote)?;

            // Pair saved records back to their entities; a record the
            // server did not echo stays pending for the next run.
            let uploads: Vec<SyncedUpload> = batch
                .iter()
                .filter_map(|entity| {
                    let record_id = assigned.get(&entity.entity_id)?.clone();
                    let echoed = saved.iter().find(|s| s.record_id == record_id)?;
                    Some(SyncedUpload {
                        entity_id: entity.entity_id.clone(),
                        record_id,
                        system_metadata: echoed.system_metadata.clone(),
                    })
                })
                .collect();

            self.local.mark_synced(&uploads)?;
            uploaded_total += uploads.len();
            self.stats.write().records_pushed += uploads.len() as u64;
        }

        debug!(uploaded = uploaded_total, rounds, "push finished");
        Ok(uploaded_total)
    }

    /// Builds the remote record for one local entity, reusing its stored
    /// identity or synthesizing a fresh one in the configured zone.
    fn build_upload(
        &self,
        entity: &LocalRecord,
        zone: &ZoneId,
        assigned: &mut HashMap<LocalEntityId, RecordId>,
    ) -> SyncRecord {
        let record_id = if entity.has_remote_identity() {
            RecordId::new(
                zone.clone(),
                entity.record_name.clone().unwrap_or_default(),
            )
        } else {
            RecordId::new(zone.clone(), Uuid::new_v4().to_string())
        };
        assigned.insert(entity.entity_id.clone(), record_id.clone());

        let mut record = SyncRecord {
            record_id,
            record_type: entity.record_type.clone(),
            system_metadata: entity.system_metadata.clone().unwrap_or_default(),
            fields: Vec::new(),
        };

        for field in &entity.fields {
            match &field.value {
                LocalFieldValue::Scalar(scalar) => {
                    record
                        .fields
                        .push(RecordField::scalar(&field.key, scalar.clone()));
                }
                LocalFieldValue::Reference { target, parent } => {
                    let resolved = target
                        .record_id
                        .clone()
                        .or_else(|| assigned.get(&target.entity).cloned());
                    match resolved {
                        Some(target_id) => {
                            record.fields.push(RecordField::reference(
                                &field.key,
                                target_id,
                                *parent,
                            ));
                        }
                        None => {
                            // A target without a remote identity means the
                            // hierarchy levels are miswired; the reference
                            // is omitted and heals on a later push.
                            warn!(
                                entity = %entity.entity_id,
                                target = %target.entity,
                                key = %field.key,
                                "reference target has no remote identity, omitting reference"
                            );
                        }
                    }
                }
            }
        }
        record
    }

    fn warn_unregistered_types(&self, records: &[LocalRecord]) {
        let mut warned: HashSet<&str> = HashSet::new();
        for record in records {
            if self.config.level_for(&record.record_type).is_none()
                && warned.insert(record.record_type.as_str())
            {
                warn!(record_type = %record.record_type, "record type not registered in configuration");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RecordTypeDescriptor, SyncConfig};
    use crate::remote::MockRemote;
    use crate::state::MemoryStateStore;
    use crate::store::MemoryStore;
    use proptest::prelude::*;
    use std::sync::Arc;
    use zonesync_protocol::{
        LocalField, ReferenceTarget, RemoteError, RemoteErrorCode, ScalarValue,
    };

    fn config() -> SyncConfig {
        SyncConfig::new("notes")
            .with_record_type(RecordTypeDescriptor::new("Folder", 0))
            .with_record_type(RecordTypeDescriptor::new("Note", 1))
            .with_record_type(RecordTypeDescriptor::new("Attachment", 2))
    }

    fn engine(
        config: SyncConfig,
        remote: MockRemote,
        store: MemoryStore,
    ) -> SyncEngine<MockRemote, MemoryStore> {
        SyncEngine::new(config, remote, store, Arc::new(MemoryStateStore::new()))
    }

    fn pending(id: &str, record_type: &str, level: u32) -> LocalRecord {
        LocalRecord::new(LocalEntityId::from(id), record_type, level)
    }

    #[test]
    fn batch_cap_splits_a_large_level() {
        let store = MemoryStore::new();
        for i in 0..300 {
            store.add_record(pending(&format!("e{i}"), "Folder", 0));
        }

        let engine = engine(config(), MockRemote::new(), store);
        engine.push_local_changes().unwrap();

        let uploads = engine.remote.uploads();
        assert_eq!(uploads.len(), 2);
        assert_eq!(uploads[0].len(), 260);
        assert_eq!(uploads[1].len(), 40);
        assert!(engine.local.pending_upload().unwrap().is_empty());
        assert_eq!(engine.stats().records_pushed, 300);
    }

    #[test]
    fn batches_ascend_the_hierarchy() {
        let store = MemoryStore::new();
        store.add_record(pending("f1", "Folder", 0));
        store.add_record(pending("f2", "Folder", 0));
        store.add_record(pending("n1", "Note", 1));
        store.add_record(pending("a1", "Attachment", 2));

        let engine = engine(config(), MockRemote::new(), store);
        engine.push_local_changes().unwrap();

        let uploads = engine.remote.uploads();
        let batch_types: Vec<Vec<&str>> = uploads
            .iter()
            .map(|b| b.iter().map(|r| r.record_type.as_str()).collect())
            .collect();
        assert_eq!(
            batch_types,
            vec![
                vec!["Folder", "Folder"],
                vec!["Note"],
                vec!["Attachment"],
            ]
        );
    }

    #[test]
    fn failed_batch_marks_nothing_synced() {
        let store = MemoryStore::new();
        store.add_record(pending("f1", "Folder", 0));
        store.add_record(pending("n1", "Note", 1));

        let remote = MockRemote::new();
        remote.enqueue_upload_failure(RemoteError::new(
            RemoteErrorCode::ServiceUnavailable,
            "maintenance",
        ));

        let engine = engine(config(), remote, store);
        let err = engine.push_local_changes().unwrap_err();
        assert!(err.is_retryable());

        // Both records still pending; the next run retries from level 0.
        assert_eq!(engine.local.pending_upload().unwrap().len(), 2);
        assert!(engine.remote.uploads().is_empty());
        assert_eq!(engine.stats().records_pushed, 0);
    }

    #[test]
    fn existing_identity_is_reused() {
        let store = MemoryStore::new();
        let mut record = pending("f1", "Folder", 0);
        record.record_name = Some("existing-name".into());
        record.system_metadata = Some(b"old-meta".to_vec());
        store.add_record(record);

        let engine = engine(config(), MockRemote::new(), store);
        engine.push_local_changes().unwrap();

        let uploads = engine.remote.uploads();
        assert_eq!(uploads[0][0].record_id.name, "existing-name");
        assert_eq!(uploads[0][0].system_metadata, b"old-meta".to_vec());

        // The echoed server metadata replaced the stored blob.
        let local = engine.local.record(&LocalEntityId::from("f1")).unwrap();
        assert_eq!(
            local.system_metadata.as_deref(),
            Some(b"srv-meta:existing-name".as_slice())
        );
    }

    #[test]
    fn fresh_records_get_synthesized_identities() {
        let store = MemoryStore::new();
        store.add_record(pending("f1", "Folder", 0));

        let engine = engine(config(), MockRemote::new(), store);
        engine.push_local_changes().unwrap();

        let uploads = engine.remote.uploads();
        let name = &uploads[0][0].record_id.name;
        assert!(!name.is_empty());
        assert!(uploads[0][0].system_metadata.is_empty());

        let local = engine.local.record(&LocalEntityId::from("f1")).unwrap();
        assert!(local.has_remote_identity());
        assert_eq!(local.record_name.as_ref(), Some(name));
        assert!(!local.sync_required);
    }

    #[test]
    fn references_resolve_to_identities_assigned_this_run() {
        let store = MemoryStore::new();
        store.add_record(pending("f1", "Folder", 0));
        store.add_record(
            pending("n1", "Note", 1).with_field(LocalField::reference(
                "folder",
                ReferenceTarget {
                    entity: LocalEntityId::from("f1"),
                    record_id: None,
                },
                true,
            )),
        );

        let engine = engine(config(), MockRemote::new(), store);
        engine.push_local_changes().unwrap();

        let uploads = engine.remote.uploads();
        let folder_id = uploads[0][0].record_id.clone();
        let note = &uploads[1][0];
        assert_eq!(note.fields.len(), 1);
        match &note.fields[0].value {
            zonesync_protocol::FieldValue::Reference { target, parent } => {
                assert_eq!(*target, folder_id);
                assert!(*parent);
            }
            other => panic!("expected reference field, got {other:?}"),
        }
    }

    #[test]
    fn unresolvable_reference_is_omitted_not_fatal() {
        let store = MemoryStore::new();
        store.add_record(
            pending("n1", "Note", 1)
                .with_field(LocalField::scalar(
                    "title",
                    ScalarValue::Text("hello".into()),
                ))
                .with_field(LocalField::reference(
                    "folder",
                    ReferenceTarget {
                        entity: LocalEntityId::from("missing"),
                        record_id: None,
                    },
                    true,
                )),
        );

        let engine = engine(config(), MockRemote::new(), store);
        engine.push_local_changes().unwrap();

        let uploads = engine.remote.uploads();
        let keys: Vec<&str> = uploads[0][0]
            .fields
            .iter()
            .map(|f| f.key.as_str())
            .collect();
        assert_eq!(keys, vec!["title"]);
    }

    #[test]
    fn empty_push_is_a_noop_cycle() {
        let engine = engine(config(), MockRemote::new(), MemoryStore::new());
        let events = engine.subscribe();

        engine.push_local_changes().unwrap();

        assert!(engine.remote.uploads().is_empty());
        assert_eq!(engine.stats().push_cycles, 1);
        assert_eq!(
            events.try_iter().collect::<Vec<_>>(),
            vec![SyncEvent::PushCompleted { uploaded: 0 }]
        );
    }

    proptest! {
        // Whatever the mix of levels, batches ascend the hierarchy, never
        // exceed the cap, and every pending record is uploaded exactly once.
        #[test]
        fn push_order_properties(levels in proptest::collection::vec(0u32..4, 1..40)) {
            let store = MemoryStore::new();
            for (i, level) in levels.iter().enumerate() {
                store.add_record(pending(&format!("e{i}"), &format!("T{level}"), *level));
            }

            let engine = engine(
                SyncConfig::new("notes").with_max_batch(3),
                MockRemote::new(),
                store,
            );
            engine.push_local_changes().unwrap();

            let uploads = engine.remote.uploads();
            let total: usize = uploads.iter().map(|b| b.len()).sum();
            prop_assert_eq!(total, levels.len());

            let mut last_level = 0u32;
            for batch in &uploads {
                prop_assert!(batch.len() <= 3);
                prop_assert!(!batch.is_empty());
                for record in batch {
                    let level: u32 = record.record_type[1..].parse().unwrap();
                    prop_assert!(level >= last_level);
                    last_level = level;
                }
            }
        }
    }
}
