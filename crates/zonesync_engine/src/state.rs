//! Persisted sync state: committed tokens and provisioning gates.

use crate::error::{SyncError, SyncResult};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use zonesync_protocol::ChangeToken;

/// Durable storage for the engine's small per-device state.
///
/// Holds committed change tokens and the boolean gates that make zone and
/// subscription provisioning idempotent. Implementations must make each
/// mutation durable before returning, and reads must observe completed
/// writes (the provisioning check-then-set relies on it).
pub trait StateStore: Send + Sync {
    /// Returns the committed token stored under `key`, if any.
    fn token(&self, key: &str) -> Option<ChangeToken>;

    /// Durably stores `token` under `key`, replacing any previous value.
    fn set_token(&self, key: &str, token: &ChangeToken) -> SyncResult<()>;

    /// Durably removes the token stored under `key`.
    fn clear_token(&self, key: &str) -> SyncResult<()>;

    /// Returns the gate flag stored under `key`; unset flags read as false.
    fn flag(&self, key: &str) -> bool;

    /// Durably stores a gate flag.
    fn set_flag(&self, key: &str, value: bool) -> SyncResult<()>;
}

/// The serialized shape shared by the state store implementations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StateSnapshot {
    tokens: HashMap<String, ChangeToken>,
    flags: HashMap<String, bool>,
}

/// An in-memory state store for tests.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    inner: RwLock<StateSnapshot>,
}

impl MemoryStateStore {
    /// Creates an empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn token(&self, key: &str) -> Option<ChangeToken> {
        self.inner.read().tokens.get(key).cloned()
    }

    fn set_token(&self, key: &str, token: &ChangeToken) -> SyncResult<()> {
        self.inner.write().tokens.insert(key.into(), token.clone());
        Ok(())
    }

    fn clear_token(&self, key: &str) -> SyncResult<()> {
        self.inner.write().tokens.remove(key);
        Ok(())
    }

    fn flag(&self, key: &str) -> bool {
        self.inner.read().flags.get(key).copied().unwrap_or(false)
    }

    fn set_flag(&self, key: &str, value: bool) -> SyncResult<()> {
        self.inner.write().flags.insert(key.into(), value);
        Ok(())
    }
}

/// A file-backed state store.
///
/// The whole snapshot is small (a handful of tokens and flags), so every
/// mutation rewrites it as JSON via a temp file and an atomic rename.
#[derive(Debug)]
pub struct FileStateStore {
    path: PathBuf,
    inner: RwLock<StateSnapshot>,
}

impl FileStateStore {
    /// Opens the store at `path`, loading existing state if present.
    pub fn open(path: impl Into<PathBuf>) -> SyncResult<Self> {
        let path = path.into();
        let snapshot = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| SyncError::State(format!("corrupt state file: {e}")))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StateSnapshot::default(),
            Err(e) => return Err(SyncError::State(e.to_string())),
        };
        Ok(Self {
            path,
            inner: RwLock::new(snapshot),
        })
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, snapshot: &StateSnapshot) -> SyncResult<()> {
        let bytes = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| SyncError::State(e.to_string()))?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, bytes).map_err(|e| SyncError::State(e.to_string()))?;
        fs::rename(&tmp, &self.path).map_err(|e| SyncError::State(e.to_string()))?;
        Ok(())
    }
}

impl StateStore for FileStateStore {
    fn token(&self, key: &str) -> Option<ChangeToken> {
        self.inner.read().tokens.get(key).cloned()
    }

    fn set_token(&self, key: &str, token: &ChangeToken) -> SyncResult<()> {
        let mut inner = self.inner.write();
        inner.tokens.insert(key.into(), token.clone());
        self.persist(&inner)
    }

    fn clear_token(&self, key: &str) -> SyncResult<()> {
        let mut inner = self.inner.write();
        inner.tokens.remove(key);
        self.persist(&inner)
    }

    fn flag(&self, key: &str) -> bool {
        self.inner.read().flags.get(key).copied().unwrap_or(false)
    }

    fn set_flag(&self, key: &str, value: bool) -> SyncResult<()> {
        let mut inner = self.inner.write();
        inner.flags.insert(key.into(), value);
        self.persist(&inner)
    }
}
