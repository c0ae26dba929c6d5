//! Shared building blocks for the session client workspace
//!
//! Holds the secret wrapper used for access/refresh tokens and the
//! configuration error type shared by the CLI and the client builder.

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
