//! In-memory credential store mirrored to durable storage
//!
//! The store holds at most one access/refresh pair. Readers get a clone of
//! the whole pair under a read lock; writers replace the whole pair under a
//! write lock, so no reader can ever observe an access token from one pair
//! next to a refresh token from another.
//!
//! Writes then mirror the pair to `Storage`. A failed mirror is reported to
//! the caller but never rolls back memory: memory is the source of truth.

use std::sync::{Arc, PoisonError, RwLock};

use common::Secret;
use tracing::{debug, info, warn};

use crate::constants::{ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, SESSION_KEYS, USER_PROFILE_KEY};
use crate::error::{Error, Result};
use crate::storage::Storage;

/// An access/refresh credential pair. Debug output is redacted.
#[derive(Debug, Clone)]
pub struct Credential {
    access: Secret<String>,
    refresh: Secret<String>,
}

impl Credential {
    pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            access: Secret::new(access.into()),
            refresh: Secret::new(refresh.into()),
        }
    }

    /// Bearer token attached to business requests.
    pub fn access_token(&self) -> &str {
        self.access.expose()
    }

    /// Token presented to the renewal endpoint.
    pub fn refresh_token(&self) -> &str {
        self.refresh.expose()
    }

    pub fn has_access_token(&self) -> bool {
        !self.access.is_empty()
    }

    pub fn has_refresh_token(&self) -> bool {
        !self.refresh.is_empty()
    }

    /// Whether this pair carries the given access token.
    pub fn is_access_token(&self, token: &str) -> bool {
        self.access.matches(token)
    }
}

/// Current session credential plus the cached user profile.
pub struct CredentialStore {
    current: RwLock<Option<Credential>>,
    profile: RwLock<Option<serde_json::Value>>,
    storage: Arc<dyn Storage>,
    // Serializes memory swap + durable mirror so the file always ends up
    // holding the last pair written to memory.
    write_lock: tokio::sync::Mutex<()>,
}

impl CredentialStore {
    /// Empty store (signed out) backed by `storage`.
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            current: RwLock::new(None),
            profile: RwLock::new(None),
            storage,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Repopulate a store from durable storage (process start).
    ///
    /// A pair is restored if either token is present; a missing half is kept
    /// as an empty string so the first renewal attempt fails and ends the
    /// session the same way a rejected refresh credential would.
    pub async fn restore(storage: Arc<dyn Storage>) -> Result<Self> {
        let access = storage.get(ACCESS_TOKEN_KEY).await?;
        let refresh = storage.get(REFRESH_TOKEN_KEY).await?;
        let profile = match storage.get(USER_PROFILE_KEY).await? {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(error = %e, "ignoring unreadable cached profile");
                    None
                }
            },
            None => None,
        };

        let credential = match (access, refresh) {
            (None, None) => None,
            (access, refresh) => Some(Credential::new(
                access.unwrap_or_default(),
                refresh.unwrap_or_default(),
            )),
        };
        info!(
            signed_in = credential.is_some(),
            profile = profile.is_some(),
            "restored session from storage"
        );

        let store = Self::new(storage);
        *store.current.write().unwrap_or_else(PoisonError::into_inner) = credential;
        *store.profile.write().unwrap_or_else(PoisonError::into_inner) = profile;
        Ok(store)
    }

    /// Snapshot of the current pair.
    pub fn read(&self) -> Option<Credential> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the pair in memory, then mirror it to durable storage.
    pub async fn write(&self, credential: Credential) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let entries = vec![
            (ACCESS_TOKEN_KEY, credential.access_token().to_owned()),
            (REFRESH_TOKEN_KEY, credential.refresh_token().to_owned()),
        ];
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(credential);
        debug!("credential replaced");
        self.storage.set_all(entries).await
    }

    /// Drop the pair and the cached profile, in memory and in storage.
    pub async fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = None;
        *self.profile.write().unwrap_or_else(PoisonError::into_inner) = None;
        debug!("credential cleared");
        self.storage.remove_all(SESSION_KEYS).await
    }

    /// Cached profile of the signed-in user, if any.
    pub fn profile(&self) -> Option<serde_json::Value> {
        self.profile
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Cache the signed-in user's profile and mirror it to storage.
    pub async fn set_profile(&self, profile: serde_json::Value) -> Result<()> {
        let raw = serde_json::to_string(&profile)
            .map_err(|e| Error::CredentialParse(format!("serializing profile: {e}")))?;
        *self.profile.write().unwrap_or_else(PoisonError::into_inner) = Some(profile);
        self.storage.set_all(vec![(USER_PROFILE_KEY, raw)]).await
    }

    pub fn is_signed_in(&self) -> bool {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}
