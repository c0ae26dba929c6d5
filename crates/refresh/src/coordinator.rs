//! Refresh coordinator: single-flight renewal plus a FIFO wait queue
//!
//! State is `Idle` or `Refreshing { queue }`, behind a std `Mutex` that is
//! never held across an await. The queue holds one single-use `oneshot`
//! sender per parked request. Every sender is removed from the queue before
//! it is settled, and the queue is taken (flipping the state to `Idle`) in a
//! single critical section, so a request arriving after the flip starts or
//! joins the next renewal instead of landing in a queue nobody will drain.
//!
//! Renewal runs in its own spawned task. A caller that stops waiting only
//! drops its receiver; the renewal still completes and the rest of the queue
//! is still settled. Released requests are driven from one task through a
//! `FuturesUnordered`, which first polls them in the order they were pushed,
//! so they go out on the wire in queue order. A `DrainGuard` rejects the
//! queue and flips to `Idle` if the renewal task panics or is torn down
//! before settling it.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use request::{Attempt, RequestDescriptor, Response};
use session_auth::{CredentialStore, Renewer, SessionTerminator};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::classify::{Recovery, classify_unauthorized};
use crate::error::{Error, Result};
use crate::metrics;

/// Boxed future returned by `Replay::replay`.
pub type ReplayFuture = Pin<Box<dyn Future<Output = Result<Response>> + Send + 'static>>;

/// Re-issues a released request through the client with `Attempt::Replay`.
///
/// `replay` must capture the credential and build the outgoing request
/// before returning, so that calling it for each queued request in order
/// dispatches them in order.
pub trait Replay: Send + Sync {
    fn replay(&self, request: Arc<RequestDescriptor>) -> ReplayFuture;
}

struct Pending {
    request: Arc<RequestDescriptor>,
    settle: oneshot::Sender<Result<Response>>,
}

enum RefreshState {
    Idle,
    Refreshing { queue: Vec<Pending> },
}

impl RefreshState {
    /// Park a request. Returns `true` if this call started the renewal.
    fn enqueue(&mut self, pending: Pending) -> bool {
        match self {
            Self::Refreshing { queue } => {
                queue.push(pending);
                false
            }
            Self::Idle => {
                *self = Self::Refreshing {
                    queue: vec![pending],
                };
                true
            }
        }
    }

    /// Take the whole queue and flip to `Idle`.
    fn take(&mut self) -> Vec<Pending> {
        match std::mem::replace(self, Self::Idle) {
            Self::Refreshing { queue } => queue,
            Self::Idle => Vec::new(),
        }
    }
}

pub struct RefreshCoordinator {
    state: Mutex<RefreshState>,
    store: Arc<CredentialStore>,
    renewer: Arc<dyn Renewer>,
    terminator: Arc<SessionTerminator>,
}

impl RefreshCoordinator {
    pub fn new(
        store: Arc<CredentialStore>,
        renewer: Arc<dyn Renewer>,
        terminator: Arc<SessionTerminator>,
    ) -> Self {
        Self {
            state: Mutex::new(RefreshState::Idle),
            store,
            renewer,
            terminator,
        }
    }

    /// Recover from a 401 on `request`.
    ///
    /// `sent_with` is the access token the failed send carried. If the
    /// coordinator is idle and the current credential differs from it, a
    /// renewal already happened after that send went out, so the request is
    /// replayed right away instead of renewing again.
    pub async fn recover(
        self: &Arc<Self>,
        request: Arc<RequestDescriptor>,
        attempt: Attempt,
        sent_with: Option<String>,
        replay: Arc<dyn Replay>,
    ) -> Result<Response> {
        match classify_unauthorized(request.kind, attempt) {
            Recovery::Exempt => {
                debug!(request_id = %request.id, kind = request.kind.label(), "401 on exempt request");
                return Err(Error::Unauthorized {
                    path: request.path.clone(),
                });
            }
            Recovery::Exhausted => {
                warn!(request_id = %request.id, path = %request.path, "401 after replay, giving up");
                metrics::record_retry_exhausted();
                return Err(Error::RetryExhausted {
                    path: request.path.clone(),
                });
            }
            Recovery::Renew => {}
        }

        let (settle, settled) = oneshot::channel();
        let pending = Pending {
            request: Arc::clone(&request),
            settle,
        };

        let started = {
            let mut state = self.lock_state();
            let idle = matches!(*state, RefreshState::Idle);
            if idle && self.credential_changed(sent_with.as_deref()) {
                None
            } else {
                Some(state.enqueue(pending))
            }
        };

        match started {
            None => {
                debug!(request_id = %request.id, "credential already renewed, replaying");
                metrics::record_replay();
                return replay.replay(request).await;
            }
            Some(true) => {
                info!(request_id = %request.id, path = %request.path, "401 received, starting renewal");
                metrics::record_queued();
                self.spawn_renewal(replay);
            }
            Some(false) => {
                debug!(request_id = %request.id, path = %request.path, "renewal in flight, queued");
                metrics::record_queued();
            }
        }

        settled
            .await
            .unwrap_or_else(|_| Err(Error::RenewalFailure("renewal was abandoned".into())))
    }

    pub fn is_refreshing(&self) -> bool {
        matches!(*self.lock_state(), RefreshState::Refreshing { .. })
    }

    /// Number of requests parked behind the current renewal.
    pub fn queued_len(&self) -> usize {
        match &*self.lock_state() {
            RefreshState::Refreshing { queue } => queue.len(),
            RefreshState::Idle => 0,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn credential_changed(&self, sent_with: Option<&str>) -> bool {
        match self.store.read() {
            Some(current) if current.has_access_token() => {
                sent_with.is_none_or(|token| !current.is_access_token(token))
            }
            _ => false,
        }
    }

    fn take_queue(&self) -> Vec<Pending> {
        self.lock_state().take()
    }

    fn spawn_renewal(self: &Arc<Self>, replay: Arc<dyn Replay>) {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            coordinator.run_renewal(replay).await;
        });
    }

    async fn run_renewal(&self, replay: Arc<dyn Replay>) {
        let mut guard = DrainGuard {
            coordinator: self,
            armed: true,
            terminate: true,
        };

        let renewed = match self.store.read() {
            Some(credential) => self.renewer.renew(&credential).await,
            None => Err(session_auth::Error::MissingRefreshToken),
        };

        match renewed {
            Ok(credential) => {
                // The pair is valid from here on; an unwind must not end the session.
                guard.terminate = false;
                // Memory is updated even if the durable mirror fails.
                if let Err(e) = self.store.write(credential).await {
                    warn!(error = %e, "failed to persist renewed credential");
                }
                let queue = self.take_queue();
                guard.armed = false;
                metrics::record_renewal("success");
                info!(released = queue.len(), "renewal succeeded, replaying queued requests");

                let mut replays = FuturesUnordered::new();
                for pending in queue {
                    metrics::record_replay();
                    let outcome = replay.replay(pending.request);
                    let settle = pending.settle;
                    replays.push(async move {
                        // A receiver dropped by its caller is fine.
                        let _ = settle.send(outcome.await);
                    });
                }
                tokio::spawn(async move { while replays.next().await.is_some() {} });
            }
            Err(e) => {
                metrics::record_renewal("failure");
                warn!(error = %e, "renewal failed, ending session");
                let reason = e.to_string();
                // Terminate while still `Refreshing` so late arrivals are
                // rejected with the rest instead of starting another renewal.
                if self.terminator.terminate(&reason).await {
                    metrics::record_termination();
                }
                let queue = self.take_queue();
                guard.armed = false;
                info!(rejected = queue.len(), "rejecting queued requests");
                for pending in queue {
                    let _ = pending.settle.send(Err(Error::RenewalFailure(reason.clone())));
                }
            }
        }
    }
}

/// Settles the queue if the renewal task unwinds before doing so. The
/// session is ended too, unless the renewal had already succeeded.
struct DrainGuard<'a> {
    coordinator: &'a RefreshCoordinator,
    armed: bool,
    terminate: bool,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let queue = self.coordinator.take_queue();
        error!(abandoned = queue.len(), "renewal ended without settling its queue");
        for pending in queue {
            let _ = pending.settle.send(Err(Error::RenewalFailure(
                "renewal aborted".into(),
            )));
        }

        if !self.terminate {
            return;
        }
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let terminator = Arc::clone(&self.coordinator.terminator);
            handle.spawn(async move {
                if terminator.terminate("renewal aborted").await {
                    metrics::record_termination();
                }
            });
        }
    }
}
