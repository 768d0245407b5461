//! Records as exchanged with the remote service.

use crate::scope::ZoneId;
use serde::{Deserialize, Serialize};

/// Identity of a record within the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId {
    /// The zone the record lives in.
    pub zone: ZoneId,
    /// The record name, unique within the zone.
    pub name: String,
}

impl RecordId {
    /// Creates a new record identity.
    pub fn new(zone: ZoneId, name: impl Into<String>) -> Self {
        Self {
            zone,
            name: name.into(),
        }
    }
}

/// A scalar field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScalarValue {
    /// UTF-8 text.
    Text(String),
    /// Signed integer.
    Integer(i64),
    /// Floating point number.
    Real(f64),
    /// Boolean.
    Boolean(bool),
    /// Raw bytes.
    Bytes(Vec<u8>),
}

/// A field value on a remote record: a scalar or a reference to another record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    /// A plain scalar value.
    Scalar(ScalarValue),
    /// A reference to another record.
    Reference {
        /// Identity of the referenced record.
        target: RecordId,
        /// True if the referenced record is this record's parent.
        parent: bool,
    },
}

/// An ordered key-value pair on a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordField {
    /// Field key.
    pub key: String,
    /// Field value.
    pub value: FieldValue,
}

impl RecordField {
    /// Creates a scalar field.
    pub fn scalar(key: impl Into<String>, value: ScalarValue) -> Self {
        Self {
            key: key.into(),
            value: FieldValue::Scalar(value),
        }
    }

    /// Creates a reference field.
    pub fn reference(key: impl Into<String>, target: RecordId, parent: bool) -> Self {
        Self {
            key: key.into(),
            value: FieldValue::Reference { target, parent },
        }
    }
}

/// The unit exchanged with the remote service.
///
/// `system_metadata` is an opaque server-issued blob sufficient to
/// reconstruct the record's identity and version without re-fetching; the
/// client stores it verbatim and never inspects it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRecord {
    /// Record identity, including the zone.
    pub record_id: RecordId,
    /// Record type tag, e.g. `"Note"`.
    pub record_type: String,
    /// Opaque server metadata blob. Empty for records never uploaded.
    pub system_metadata: Vec<u8>,
    /// Ordered custom fields.
    pub fields: Vec<RecordField>,
}

impl SyncRecord {
    /// Creates a record with no fields.
    pub fn new(record_id: RecordId, record_type: impl Into<String>) -> Self {
        Self {
            record_id,
            record_type: record_type.into(),
            system_metadata: Vec::new(),
            fields: Vec::new(),
        }
    }

    /// Sets the opaque server metadata blob.
    pub fn with_system_metadata(mut self, metadata: impl Into<Vec<u8>>) -> Self {
        self.system_metadata = metadata.into();
        self
    }

    /// Appends a field.
    pub fn with_field(mut self, field: RecordField) -> Self {
        self.fields.push(field);
        self
    }
}

/// Identifier of a record the remote service reports as deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeletedRecord {
    /// Identity of the deleted record.
    pub record_id: RecordId,
    /// Record type tag of the deleted record.
    pub record_type: String,
}

impl DeletedRecord {
    /// Creates a deletion notice.
    pub fn new(record_id: RecordId, record_type: impl Into<String>) -> Self {
        Self {
            record_id,
            record_type: record_type.into(),
        }
    }
}
