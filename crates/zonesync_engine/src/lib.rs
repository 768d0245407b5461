//! # Zonesync Engine
//!
//! Sync state machine and engine for zonesync.
//!
//! This crate provides:
//! - Change-token lifecycle (stage, commit, reset) per database and zone
//! - Idempotent zone and subscription provisioning behind persisted gates
//! - Two-level paginated change discovery (database scan, zone scan)
//! - Dependency-ordered outbound push with batch caps
//! - A closed error taxonomy driving retry and reset decisions
//!
//! ## Architecture
//!
//! The engine implements a **fetch-then-push** synchronization model:
//! 1. Discover changed zones since the stored database token
//! 2. Fetch and apply changed records per zone (server is authoritative)
//! 3. Push locally modified records, parents before children
//!
//! Remote changes flow through the [`LocalStore`] port; a scope's change
//! token is committed only after that port reports success, so a crash at
//! any point costs at most a redundant re-fetch, never a silent gap.
//!
//! ## Key Invariants
//!
//! - A token is never committed before its changes are durably applied
//! - Zone and subscription creation happen at most once per device
//! - A record deleted and changed in the same batch is applied as deleted
//! - Push levels drain fully before the next level starts
//! - Pagination and hierarchy recursion are bounded by hard ceilings

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod engine;
mod error;
mod events;
mod fetch;
mod provision;
mod push;
mod remote;
mod state;
mod store;
mod token;

pub use config::{RecordTypeDescriptor, RetryConfig, SyncConfig};
pub use engine::{SyncEngine, SyncStats};
pub use error::{ErrorKind, SyncError, SyncResult};
pub use events::SyncEvent;
pub use provision::{SubscriptionRegistrar, ZoneDirectory};
pub use remote::{MockRemote, RemoteService};
pub use state::{FileStateStore, MemoryStateStore, StateStore};
pub use store::{AppliedBatch, LocalStore, MemoryStore, StoreError, SyncedUpload};
pub use token::TokenStore;
