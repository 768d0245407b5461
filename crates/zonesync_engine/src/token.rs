//! Change-token staging and persistence.

use crate::error::SyncResult;
use crate::state::StateStore;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use zonesync_protocol::{ChangeToken, TokenScope};

/// Stages and persists change tokens per scope.
///
/// A token may be staged (held in memory only) and committed later, once
/// the changes it covers have been durably applied. Only committed tokens
/// survive a crash; callers must never commit a token before the
/// corresponding changes are applied, otherwise those changes would be
/// silently skipped after a restart.
pub struct TokenStore {
    state: Arc<dyn StateStore>,
    staged: Mutex<HashMap<String, ChangeToken>>,
}

impl TokenStore {
    /// Creates a token store backed by the given state store.
    pub fn new(state: Arc<dyn StateStore>) -> Self {
        Self {
            state,
            staged: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the committed token for a scope, or `None` if the scope has
    /// never completed a sync.
    pub fn latest(&self, scope: &TokenScope) -> Option<ChangeToken> {
        self.state.token(&scope.storage_key())
    }

    /// Stages a token for a scope, replacing any previously staged value.
    ///
    /// With `commit` set, the token is also persisted immediately.
    pub fn save_new(&self, scope: &TokenScope, token: ChangeToken, commit: bool) -> SyncResult<()> {
        self.staged.lock().insert(scope.storage_key(), token);
        if commit {
            self.commit(scope)?;
        }
        Ok(())
    }

    /// Persists the staged token for a scope, if any, and clears the
    /// staged slot. No-op when nothing is staged.
    pub fn commit(&self, scope: &TokenScope) -> SyncResult<()> {
        let key = scope.storage_key();
        let staged = self.staged.lock().remove(&key);
        if let Some(token) = staged {
            debug!(scope = %scope, "committing change token");
            self.state.set_token(&key, &token)?;
        }
        Ok(())
    }

    /// Clears the committed and staged tokens for a scope, forcing the
    /// next fetch to be a full resync.
    pub fn reset(&self, scope: &TokenScope) -> SyncResult<()> {
        let key = scope.storage_key();
        self.staged.lock().remove(&key);
        debug!(scope = %scope, "resetting change token");
        self.state.clear_token(&key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MemoryStateStore;
    use zonesync_protocol::{DatabaseScope, ZoneId};

    fn store() -> TokenStore {
        TokenStore::new(Arc::new(MemoryStateStore::new()))
    }

    fn db_scope() -> TokenScope {
        TokenScope::Database(DatabaseScope::Private)
    }

    #[test]
    fn staged_token_is_not_visible_until_committed() {
        let tokens = store();
        let scope = db_scope();

        tokens
            .save_new(&scope, ChangeToken::from("t1"), false)
            .unwrap();
        assert_eq!(tokens.latest(&scope), None);

        tokens.commit(&scope).unwrap();
        assert_eq!(tokens.latest(&scope), Some(ChangeToken::from("t1")));
    }

    #[test]
    fn save_with_commit_persists_immediately() {
        let tokens = store();
        let scope = db_scope();

        tokens
            .save_new(&scope, ChangeToken::from("t1"), true)
            .unwrap();
        assert_eq!(tokens.latest(&scope), Some(ChangeToken::from("t1")));
    }

    #[test]
    fn staging_replaces_previous_staged_value() {
        let tokens = store();
        let scope = db_scope();

        tokens
            .save_new(&scope, ChangeToken::from("old"), false)
            .unwrap();
        tokens
            .save_new(&scope, ChangeToken::from("new"), false)
            .unwrap();
        tokens.commit(&scope).unwrap();

        assert_eq!(tokens.latest(&scope), Some(ChangeToken::from("new")));
    }

    #[test]
    fn commit_without_staged_token_is_noop() {
        let tokens = store();
        let scope = db_scope();

        tokens
            .save_new(&scope, ChangeToken::from("t1"), true)
            .unwrap();
        // Nothing staged anymore; a second commit must not disturb state.
        tokens.commit(&scope).unwrap();
        assert_eq!(tokens.latest(&scope), Some(ChangeToken::from("t1")));
    }

    #[test]
    fn reset_clears_committed_and_staged() {
        let tokens = store();
        let scope = db_scope();

        tokens
            .save_new(&scope, ChangeToken::from("t1"), true)
            .unwrap();
        tokens
            .save_new(&scope, ChangeToken::from("t2"), false)
            .unwrap();
        tokens.reset(&scope).unwrap();

        assert_eq!(tokens.latest(&scope), None);
        // The staged slot is gone too; committing resurrects nothing.
        tokens.commit(&scope).unwrap();
        assert_eq!(tokens.latest(&scope), None);
    }

    #[test]
    fn scopes_are_independent() {
        let tokens = store();
        let db = db_scope();
        let zone = TokenScope::Zone(ZoneId::own("notes"));

        tokens.save_new(&db, ChangeToken::from("d"), true).unwrap();
        tokens
            .save_new(&zone, ChangeToken::from("z"), true)
            .unwrap();
        tokens.reset(&db).unwrap();

        assert_eq!(tokens.latest(&db), None);
        assert_eq!(tokens.latest(&zone), Some(ChangeToken::from("z")));
    }
}
