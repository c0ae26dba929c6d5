//! Command-line usage errors

use thiserror::Error;

/// Errors in how the binary was invoked. Request failures are reported by
/// the client's own error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("missing command (expected one of: login, request, whoami, logout)")]
    MissingCommand,

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("missing argument: {0}")]
    MissingArgument(&'static str),

    #[error("missing value for {0}")]
    MissingFlagValue(&'static str),

    #[error("invalid HTTP method: {0}")]
    InvalidMethod(String),

    #[error("invalid JSON body: {0}")]
    InvalidBody(String),
}

/// Result alias using CLI Error
pub type Result<T> = std::result::Result<T, Error>;
