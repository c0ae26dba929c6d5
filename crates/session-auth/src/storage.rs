//! Durable client-side storage for session keys
//!
//! A small key/value surface in the spirit of browser local storage: string
//! keys, string values, batch set and batch remove. `FileStorage` persists
//! the whole map as JSON with an atomic temp-file + rename so a crash never
//! leaves half a credential pair on disk. `MemoryStorage` backs tests and
//! ephemeral sessions.
//!
//! The durable copy is a cache. `CredentialStore` in memory stays
//! authoritative while the process is alive.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};

use tracing::{debug, info};

use crate::error::{Error, Result};

/// Boxed future returned by `Storage` methods (keeps the trait dyn-compatible).
pub type StorageFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Durable key/value storage for session data.
pub trait Storage: Send + Sync {
    /// Read one key.
    fn get(&self, key: &'static str) -> StorageFuture<'_, Option<String>>;

    /// Write several keys in one durable update.
    fn set_all(&self, entries: Vec<(&'static str, String)>) -> StorageFuture<'_, ()>;

    /// Remove several keys in one durable update. Missing keys are ignored.
    fn remove_all(&self, keys: &'static [&'static str]) -> StorageFuture<'_, ()>;
}

/// JSON file storage with atomic writes and 0600 permissions.
///
/// A tokio Mutex serializes writers so concurrent updates from the refresh
/// path and the login path cannot interleave on disk.
pub struct FileStorage {
    path: PathBuf,
    state: tokio::sync::Mutex<HashMap<String, String>>,
}

impl FileStorage {
    /// Open the storage file, creating it as `{}` if it doesn't exist.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Storage(format!("reading session file: {e}")))?;
            let entries: HashMap<String, String> = serde_json::from_str(&contents)
                .map_err(|e| Error::CredentialParse(format!("parsing session file: {e}")))?;
            info!(path = %path.display(), keys = entries.len(), "loaded session storage");
            entries
        } else {
            info!(path = %path.display(), "session file not found, starting signed out");
            let entries = HashMap::new();
            write_atomic(&path, &entries).await?;
            entries
        };

        Ok(Self {
            path,
            state: tokio::sync::Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &'static str) -> StorageFuture<'_, Option<String>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            Ok(state.get(key).cloned())
        })
    }

    fn set_all(&self, entries: Vec<(&'static str, String)>) -> StorageFuture<'_, ()> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            for (key, value) in entries {
                state.insert(key.to_owned(), value);
            }
            write_atomic(&self.path, &state).await
        })
    }

    fn remove_all(&self, keys: &'static [&'static str]) -> StorageFuture<'_, ()> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            let before = state.len();
            for key in keys {
                state.remove(*key);
            }
            if state.len() == before {
                return Ok(());
            }
            debug!(removed = before - state.len(), "removed session keys");
            write_atomic(&self.path, &state).await
        })
    }
}

/// In-process storage. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed storage with entries, as if left behind by an earlier run.
    pub fn with_entries(entries: &[(&str, &str)]) -> Self {
        let map = entries
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        Self {
            entries: Mutex::new(map),
        }
    }

    /// Snapshot of the stored map.
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &'static str) -> StorageFuture<'_, Option<String>> {
        let value = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned();
        Box::pin(async move { Ok(value) })
    }

    fn set_all(&self, entries: Vec<(&'static str, String)>) -> StorageFuture<'_, ()> {
        let mut map = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        for (key, value) in entries {
            map.insert(key.to_owned(), value);
        }
        Box::pin(async { Ok(()) })
    }

    fn remove_all(&self, keys: &'static [&'static str]) -> StorageFuture<'_, ()> {
        let mut map = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        for key in keys {
            map.remove(*key);
        }
        Box::pin(async { Ok(()) })
    }
}

/// Write the session map to a file atomically (temp file in the same
/// directory, then rename). Permissions are 0600 on unix since the file
/// holds tokens.
async fn write_atomic(path: &Path, data: &HashMap<String, String>) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::CredentialParse(format!("serializing session: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Storage("session path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".session.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Storage(format!("writing temp session file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Storage(format!("setting session file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Storage(format!("renaming temp session file: {e}")))?;

    debug!(path = %path.display(), "persisted session");
    Ok(())
}
