//! The local store port and an in-memory implementation for tests.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use zonesync_protocol::{
    DeletedRecord, FieldValue, LocalEntityId, LocalField, LocalFieldValue, LocalRecord, RecordId,
    ReferenceTarget, SyncRecord,
};

/// A failure reported by the local store.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("local store error: {0}")]
pub struct StoreError(pub String);

/// The outcome of uploading one local record, handed back to the store.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncedUpload {
    /// The uploaded entity.
    pub entity_id: LocalEntityId,
    /// The remote identity the record now has.
    pub record_id: RecordId,
    /// The server metadata blob returned by the upload.
    pub system_metadata: Vec<u8>,
}

/// Port to the local persistent store.
///
/// The engine borrows records for the duration of a fetch or push cycle;
/// the store owns them. `apply_changes` must be durable before returning:
/// the fetch pipeline commits the scope's change token immediately after a
/// successful return, and a token must never run ahead of applied data.
pub trait LocalStore: Send + Sync {
    /// Applies a batch of remote changes and deletions. The server's
    /// records are authoritative and overwrite local state.
    fn apply_changes(
        &self,
        changed: &[SyncRecord],
        deleted: &[DeletedRecord],
    ) -> Result<(), StoreError>;

    /// Returns all locally modified records awaiting upload, in a stable
    /// order, each tagged with its type's hierarchy level.
    fn pending_upload(&self) -> Result<Vec<LocalRecord>, StoreError>;

    /// Records the uploads as synced: stores the remote identity and
    /// metadata and clears the sync-required flag.
    fn mark_synced(&self, uploads: &[SyncedUpload]) -> Result<(), StoreError>;
}

impl<T: LocalStore + ?Sized> LocalStore for std::sync::Arc<T> {
    fn apply_changes(
        &self,
        changed: &[SyncRecord],
        deleted: &[DeletedRecord],
    ) -> Result<(), StoreError> {
        (**self).apply_changes(changed, deleted)
    }

    fn pending_upload(&self) -> Result<Vec<LocalRecord>, StoreError> {
        (**self).pending_upload()
    }

    fn mark_synced(&self, uploads: &[SyncedUpload]) -> Result<(), StoreError> {
        (**self).mark_synced(uploads)
    }
}

/// One applied batch, recorded by [`MemoryStore`] for assertions.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedBatch {
    /// Records passed as changed.
    pub changed: Vec<SyncRecord>,
    /// Records passed as deleted.
    pub deleted: Vec<DeletedRecord>,
}

/// An in-memory local store for testing.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<Vec<LocalRecord>>,
    applied: RwLock<Vec<AppliedBatch>>,
    fail_next_apply: AtomicBool,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a local record (typically one awaiting upload).
    pub fn add_record(&self, record: LocalRecord) {
        self.records.write().push(record);
    }

    /// Returns a snapshot of all local records.
    pub fn records(&self) -> Vec<LocalRecord> {
        self.records.read().clone()
    }

    /// Returns the record with the given entity id, if present.
    pub fn record(&self, entity_id: &LocalEntityId) -> Option<LocalRecord> {
        self.records
            .read()
            .iter()
            .find(|r| &r.entity_id == entity_id)
            .cloned()
    }

    /// Returns every batch passed to `apply_changes`, in order.
    pub fn applied_batches(&self) -> Vec<AppliedBatch> {
        self.applied.read().clone()
    }

    /// Makes the next `apply_changes` call fail.
    pub fn fail_next_apply(&self) {
        self.fail_next_apply.store(true, Ordering::SeqCst);
    }

    fn local_from_remote(record: &SyncRecord) -> LocalRecord {
        let fields = record
            .fields
            .iter()
            .map(|f| LocalField {
                key: f.key.clone(),
                value: match &f.value {
                    FieldValue::Scalar(scalar) => LocalFieldValue::Scalar(scalar.clone()),
                    FieldValue::Reference { target, parent } => LocalFieldValue::Reference {
                        target: ReferenceTarget {
                            entity: LocalEntityId::new(target.name.clone()),
                            record_id: Some(target.clone()),
                        },
                        parent: *parent,
                    },
                },
            })
            .collect();

        LocalRecord {
            entity_id: LocalEntityId::new(record.record_id.name.clone()),
            record_type: record.record_type.clone(),
            record_name: Some(record.record_id.name.clone()),
            system_metadata: Some(record.system_metadata.clone()),
            hierarchy_level: 0,
            sync_required: false,
            fields,
        }
    }
}

impl LocalStore for MemoryStore {
    fn apply_changes(
        &self,
        changed: &[SyncRecord],
        deleted: &[DeletedRecord],
    ) -> Result<(), StoreError> {
        if self.fail_next_apply.swap(false, Ordering::SeqCst) {
            return Err(StoreError("injected apply failure".into()));
        }

        self.applied.write().push(AppliedBatch {
            changed: changed.to_vec(),
            deleted: deleted.to_vec(),
        });

        let mut records = self.records.write();
        for record in changed {
            let local = Self::local_from_remote(record);
            match records
                .iter_mut()
                .find(|r| r.record_name.as_deref() == Some(record.record_id.name.as_str()))
            {
                Some(existing) => *existing = local,
                None => records.push(local),
            }
        }
        for deletion in deleted {
            records.retain(|r| r.record_name.as_deref() != Some(deletion.record_id.name.as_str()));
        }
        Ok(())
    }

    fn pending_upload(&self) -> Result<Vec<LocalRecord>, StoreError> {
        Ok(self
            .records
            .read()
            .iter()
            .filter(|r| r.sync_required)
            .cloned()
            .collect())
    }

    fn mark_synced(&self, uploads: &[SyncedUpload]) -> Result<(), StoreError> {
        let mut records = self.records.write();
        for upload in uploads {
            if let Some(record) = records.iter_mut().find(|r| r.entity_id == upload.entity_id) {
                record.record_name = Some(upload.record_id.name.clone());
                record.system_metadata = Some(upload.system_metadata.clone());
                record.sync_required = false;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zonesync_protocol::ZoneId;

    fn remote_record(name: &str) -> SyncRecord {
        SyncRecord::new(RecordId::new(ZoneId::own("notes"), name), "Note")
            .with_system_metadata(format!("meta:{name}").into_bytes())
    }

    #[test]
    fn apply_upserts_and_deletes() {
        let store = MemoryStore::new();

        store
            .apply_changes(&[remote_record("a"), remote_record("b")], &[])
            .unwrap();
        assert_eq!(store.records().len(), 2);

        // Overwrite one, delete the other.
        store
            .apply_changes(
                &[remote_record("a")],
                &[DeletedRecord::new(
                    RecordId::new(ZoneId::own("notes"), "b"),
                    "Note",
                )],
            )
            .unwrap();

        let records = store.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].record_name.as_deref(), Some("a"));
        assert!(!records[0].sync_required);
    }

    #[test]
    fn injected_failure_fails_once() {
        let store = MemoryStore::new();
        store.fail_next_apply();

        assert!(store.apply_changes(&[remote_record("a")], &[]).is_err());
        assert!(store.apply_changes(&[remote_record("a")], &[]).is_ok());
    }

    #[test]
    fn pending_upload_filters_by_sync_required() {
        let store = MemoryStore::new();
        store.add_record(LocalRecord::new(LocalEntityId::from("e1"), "Note", 0));

        let mut synced = LocalRecord::new(LocalEntityId::from("e2"), "Note", 0);
        synced.sync_required = false;
        store.add_record(synced);

        let pending = store.pending_upload().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].entity_id, LocalEntityId::from("e1"));
    }

    #[test]
    fn mark_synced_stores_identity() {
        let store = MemoryStore::new();
        store.add_record(LocalRecord::new(LocalEntityId::from("e1"), "Note", 0));

        store
            .mark_synced(&[SyncedUpload {
                entity_id: LocalEntityId::from("e1"),
                record_id: RecordId::new(ZoneId::own("notes"), "n1"),
                system_metadata: b"meta".to_vec(),
            }])
            .unwrap();

        let record = store.record(&LocalEntityId::from("e1")).unwrap();
        assert!(record.has_remote_identity());
        assert!(!record.sync_required);
        assert!(store.pending_upload().unwrap().is_empty());
    }
}
