//! Scopes addressing the remote service's change streams.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Owner name used for zones the current device creates for itself.
pub const DEFAULT_ZONE_OWNER: &str = "__defaultOwner__";

/// A database partition of the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatabaseScope {
    /// Records owned by the current user.
    Private,
    /// Records shared with the current user.
    Shared,
    /// Records visible to everyone.
    Public,
}

impl DatabaseScope {
    /// Returns a stable key fragment for persisted state.
    pub fn key(&self) -> &'static str {
        match self {
            DatabaseScope::Private => "private",
            DatabaseScope::Shared => "shared",
            DatabaseScope::Public => "public",
        }
    }
}

impl fmt::Display for DatabaseScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// A record zone: a logical grouping of records within a database scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ZoneId {
    /// Zone name, unique per owner.
    pub name: String,
    /// Owner name; `DEFAULT_ZONE_OWNER` for zones created by this device.
    pub owner: String,
}

impl ZoneId {
    /// Creates a new zone identifier.
    pub fn new(name: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner: owner.into(),
        }
    }

    /// Creates a zone identifier owned by the current device.
    pub fn own(name: impl Into<String>) -> Self {
        Self::new(name, DEFAULT_ZONE_OWNER)
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.owner, self.name)
    }
}

/// Addresses one change-token stream: a whole database or a single zone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenScope {
    /// The database-level change stream of a scope.
    Database(DatabaseScope),
    /// The record-level change stream of one zone.
    Zone(ZoneId),
}

impl TokenScope {
    /// Returns the key under which this scope's token is persisted.
    pub fn storage_key(&self) -> String {
        match self {
            TokenScope::Database(scope) => format!("token:database:{}", scope.key()),
            TokenScope::Zone(zone) => format!("token:zone:{}:{}", zone.owner, zone.name),
        }
    }
}

impl fmt::Display for TokenScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenScope::Database(scope) => write!(f, "database {scope}"),
            TokenScope::Zone(zone) => write!(f, "zone {zone}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_keys_are_distinct_per_scope() {
        let private = TokenScope::Database(DatabaseScope::Private);
        let shared = TokenScope::Database(DatabaseScope::Shared);
        let zone = TokenScope::Zone(ZoneId::own("notes"));

        assert_ne!(private.storage_key(), shared.storage_key());
        assert_ne!(private.storage_key(), zone.storage_key());
    }

    #[test]
    fn zone_key_includes_owner() {
        let mine = TokenScope::Zone(ZoneId::own("notes"));
        let theirs = TokenScope::Zone(ZoneId::new("notes", "other-user"));

        assert_ne!(mine.storage_key(), theirs.storage_key());
    }
}
