//! Error taxonomy for requests sent through the session-aware client

use request::StatusCode;

/// Failures a caller of the client can observe.
///
/// An unauthorized answer is classified once, where it happens. A request
/// parked behind a renewal is settled with whatever the renewal produced and
/// is never classified again.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport-level failure (connect, timeout, body read).
    #[error("network error: {0}")]
    Network(String),

    /// Non-success status other than 401.
    #[error("{path} returned {status}: {body}")]
    Status {
        status: StatusCode,
        path: String,
        body: String,
    },

    /// 401 on a request that is not allowed to trigger renewal.
    #[error("{path} rejected the credential")]
    Unauthorized { path: String },

    /// Renewal failed; the session has been ended.
    #[error("credential renewal failed: {0}")]
    RenewalFailure(String),

    /// 401 again on a request that was already replayed after a renewal.
    #[error("{path} rejected the renewed credential")]
    RetryExhausted { path: String },

    /// The request could not be built (bad path, unencodable body).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Login was answered but not accepted.
    #[error("login rejected: {0}")]
    Login(String),

    /// Credential storage or renewal plumbing failed outside the protocol.
    #[error("session error: {0}")]
    Session(#[from] session_auth::Error),
}

impl Error {
    /// Whether this error means the user must sign in again.
    pub fn is_session_expired(&self) -> bool {
        matches!(self, Self::RenewalFailure(_))
    }
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;
