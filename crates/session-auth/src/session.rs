//! Session termination
//!
//! When renewal fails the session is over: credentials are cleared and the
//! user is sent back to the login entry point. Several paths can reach that
//! conclusion at nearly the same moment. Every call clears credentials, but
//! the notice is latched: only the first call emits one until `rearm` is
//! called by a successful login.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::credentials::CredentialStore;

/// User-facing notices emitted by the session layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    /// The session expired and could not be renewed. The user should sign in
    /// again at `entry_point`.
    Expired { entry_point: String },
}

impl std::fmt::Display for SessionNotice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Expired { entry_point } => write!(
                f,
                "session expired, please sign in again ({entry_point})"
            ),
        }
    }
}

pub struct SessionTerminator {
    store: Arc<CredentialStore>,
    entry_point: String,
    ended: AtomicBool,
    notices: broadcast::Sender<SessionNotice>,
}

impl SessionTerminator {
    pub fn new(store: Arc<CredentialStore>, entry_point: impl Into<String>) -> Self {
        let (notices, _) = broadcast::channel(8);
        Self {
            store,
            entry_point: entry_point.into(),
            ended: AtomicBool::new(false),
            notices,
        }
    }

    /// Receive future session notices.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionNotice> {
        self.notices.subscribe()
    }

    /// End the session: clear credentials and profile, then notify once.
    ///
    /// The clear happens on every call, so a pair written after an earlier
    /// termination is dropped too. Returns `true` if this call emitted the
    /// notice, `false` if the session had already ended.
    pub async fn terminate(&self, reason: &str) -> bool {
        if let Err(e) = self.store.clear().await {
            // Memory is already cleared; only the durable copy is stale.
            warn!(error = %e, "failed to clear stored session");
        }
        if self.ended.swap(true, Ordering::AcqRel) {
            debug!(reason, "session already ended, credentials cleared");
            return false;
        }

        info!(reason, entry_point = %self.entry_point, "ending session");
        // No subscribers is fine (e.g. library use without a UI).
        let _ = self.notices.send(SessionNotice::Expired {
            entry_point: self.entry_point.clone(),
        });
        true
    }

    /// Allow a future termination again. Called after a successful login.
    pub fn rearm(&self) {
        self.ended.store(false, Ordering::Release);
    }

    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::Acquire)
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }
}
