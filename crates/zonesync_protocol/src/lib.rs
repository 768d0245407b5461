//! # Zonesync Protocol
//!
//! Scope, token, and record model for the zonesync engine.
//!
//! This crate provides:
//! - `DatabaseScope`, `ZoneId`, `TokenScope` for addressing change streams
//! - `ChangeToken` opaque change cursors
//! - `SyncRecord` / `LocalRecord` for records crossing the sync boundary
//! - Scan page/batch messages produced by the remote service port
//! - `RemoteError` with the wire-level failure codes
//!
//! This is a pure types crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod local;
mod messages;
mod record;
mod scope;
mod token;

pub use error::{RemoteError, RemoteErrorCode};
pub use local::{LocalEntityId, LocalField, LocalFieldValue, LocalRecord, ReferenceTarget};
pub use messages::{
    DatabaseScanPage, ZoneCompletion, ZoneScanBatch, ZoneScanRequest, ZoneScanResult,
};
pub use record::{DeletedRecord, FieldValue, RecordField, RecordId, ScalarValue, SyncRecord};
pub use scope::{DatabaseScope, TokenScope, ZoneId, DEFAULT_ZONE_OWNER};
pub use token::ChangeToken;
