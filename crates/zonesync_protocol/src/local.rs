//! The local store's view of a syncable record.

use crate::record::{RecordId, ScalarValue};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Store-local identifier of an entity, stable across syncs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalEntityId(String);

impl LocalEntityId {
    /// Creates a local entity identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LocalEntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LocalEntityId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// The target of a local reference field.
///
/// The store fills in `record_id` when the target entity already has a
/// remote identity; for targets never uploaded it stays `None` and the push
/// pipeline resolves it from identities assigned earlier in the same run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceTarget {
    /// Local identifier of the referenced entity.
    pub entity: LocalEntityId,
    /// Remote identity of the referenced entity, if it has synced before.
    pub record_id: Option<RecordId>,
}

/// A field value on a local record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LocalFieldValue {
    /// A plain scalar value.
    Scalar(ScalarValue),
    /// A reference to another local entity.
    Reference {
        /// The referenced entity.
        target: ReferenceTarget,
        /// True if the referenced entity is this record's parent.
        parent: bool,
    },
}

/// An ordered key-value pair on a local record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalField {
    /// Field key.
    pub key: String,
    /// Field value.
    pub value: LocalFieldValue,
}

impl LocalField {
    /// Creates a scalar field.
    pub fn scalar(key: impl Into<String>, value: ScalarValue) -> Self {
        Self {
            key: key.into(),
            value: LocalFieldValue::Scalar(value),
        }
    }

    /// Creates a reference field.
    pub fn reference(key: impl Into<String>, target: ReferenceTarget, parent: bool) -> Self {
        Self {
            key: key.into(),
            value: LocalFieldValue::Reference { target, parent },
        }
    }
}

/// A locally stored entity that participates in sync.
///
/// `record_name` and `system_metadata` stay `None` until the entity's first
/// successful upload. `hierarchy_level` is static per entity type and
/// controls push ordering: types referenced as parents must carry a strictly
/// lower level than their children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalRecord {
    /// Store-local identifier.
    pub entity_id: LocalEntityId,
    /// Record type tag.
    pub record_type: String,
    /// Remote record name; `None` until first sync.
    pub record_name: Option<String>,
    /// Opaque server metadata blob; `None` until first sync.
    pub system_metadata: Option<Vec<u8>>,
    /// Static push-ordering level of this entity's type.
    pub hierarchy_level: u32,
    /// True if local changes have not been uploaded yet.
    pub sync_required: bool,
    /// Ordered custom fields.
    pub fields: Vec<LocalField>,
}

impl LocalRecord {
    /// Creates a never-synced local record with no fields.
    pub fn new(
        entity_id: LocalEntityId,
        record_type: impl Into<String>,
        hierarchy_level: u32,
    ) -> Self {
        Self {
            entity_id,
            record_type: record_type.into(),
            record_name: None,
            system_metadata: None,
            hierarchy_level,
            sync_required: true,
            fields: Vec::new(),
        }
    }

    /// Appends a field.
    pub fn with_field(mut self, field: LocalField) -> Self {
        self.fields.push(field);
        self
    }

    /// Returns true if this record has been uploaded before.
    pub fn has_remote_identity(&self) -> bool {
        self.record_name.is_some() && self.system_metadata.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_record_needs_sync_and_lacks_identity() {
        let record = LocalRecord::new(LocalEntityId::from("e1"), "Note", 1);
        assert!(record.sync_required);
        assert!(!record.has_remote_identity());
    }

    #[test]
    fn identity_requires_both_name_and_metadata() {
        let mut record = LocalRecord::new(LocalEntityId::from("e1"), "Note", 0);
        record.record_name = Some("n1".into());
        assert!(!record.has_remote_identity());
        record.system_metadata = Some(vec![1, 2, 3]);
        assert!(record.has_remote_identity());
    }
}
