//! Process-wide credential state.
//!
//! A `Session` is created once at startup and shared by every request. Only
//! the authentication operations write to it; everything else reads. The
//! token lives in memory and is mirrored to a [`TokenStore`] when one is
//! available. A failing store degrades the session to memory-only.

use std::sync::{Arc, RwLock};

use tracing::{debug, warn};

use crate::infra::token_store::{TokenStore, TOKEN_STORAGE_KEY};

pub struct Session {
    token: RwLock<Option<String>>,
    store: Option<Arc<dyn TokenStore>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("authenticated", &self.is_authenticated())
            .field("persistent", &self.store.is_some())
            .finish()
    }
}

impl Session {
    /// A session that never touches persistent storage.
    pub fn in_memory() -> Self {
        Self {
            token: RwLock::new(None),
            store: None,
        }
    }

    /// Restores any persisted token from `store`.
    pub fn restore(store: Arc<dyn TokenStore>) -> Self {
        let token = match store.load(TOKEN_STORAGE_KEY) {
            Ok(token) => token,
            Err(err) => {
                warn!(error = ?err, "token store unavailable, continuing memory-only");
                None
            }
        };
        debug!(restored = token.is_some(), "session initialized");

        Self {
            token: RwLock::new(token),
            store: Some(store),
        }
    }

    pub fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_some()
    }

    pub(crate) fn set_token(&self, token: String) {
        if let Some(store) = &self.store {
            if let Err(err) = store.save(TOKEN_STORAGE_KEY, &token) {
                warn!(error = ?err, "failed to persist token, keeping it in memory only");
            }
        }
        *self
            .token
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(token);
    }

    pub(crate) fn clear(&self) {
        if let Some(store) = &self.store {
            if let Err(err) = store.remove(TOKEN_STORAGE_KEY) {
                warn!(error = ?err, "failed to remove persisted token");
            }
        }
        *self
            .token
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
    }
}
