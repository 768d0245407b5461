//! Opaque change tokens.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A server-issued cursor over a scope's change stream.
///
/// Tokens are opaque blobs: the client never inspects or orders them, it
/// only stores the most recent one and hands it back on the next scan.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChangeToken(Vec<u8>);

impl ChangeToken {
    /// Creates a token from raw bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Returns the raw token bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for ChangeToken {
    fn from(value: &str) -> Self {
        Self(value.as_bytes().to_vec())
    }
}

impl fmt::Debug for ChangeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Tokens can be long binary blobs; show a short hex prefix.
        let prefix: String = self.0.iter().take(8).map(|b| format!("{b:02x}")).collect();
        if self.0.len() > 8 {
            write!(f, "ChangeToken({prefix}…, {} bytes)", self.0.len())
        } else {
            write!(f, "ChangeToken({prefix})")
        }
    }
}
