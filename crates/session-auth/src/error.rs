//! Error types for credential storage and renewal

/// Errors from credential storage and the renewal endpoint.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("renewal failed: {0}")]
    Renewal(String),

    #[error("refresh credential rejected: {0}")]
    InvalidCredentials(String),

    #[error("no refresh credential available")]
    MissingRefreshToken,

    #[error("credential parse error: {0}")]
    CredentialParse(String),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Result alias for credential operations.
pub type Result<T> = std::result::Result<T, Error>;
