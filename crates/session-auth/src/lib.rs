//! Session credentials for the client-side HTTP layer
//!
//! Owns everything that touches the access/refresh credential pair outside of
//! the request pipeline itself:
//!
//! 1. `CredentialStore` keeps the pair in memory and mirrors it to a durable
//!    `Storage` (file or memory), restoring it on start.
//! 2. `token::renew()` calls the renewal endpoint over a bare `reqwest::Client`
//!    that never goes through the refresh coordinator.
//! 3. `SessionTerminator` wipes the store and tells the host application that
//!    the session is over.

pub mod constants;
pub mod credentials;
pub mod error;
pub mod session;
pub mod storage;
pub mod token;

pub use constants::*;
pub use credentials::{Credential, CredentialStore};
pub use error::{Error, Result};
pub use session::{SessionNotice, SessionTerminator};
pub use storage::{FileStorage, MemoryStorage, Storage, StorageFuture};
pub use token::{
    EndpointRenewer, LoginRequest, LoginResponse, RenewFuture, Renewer, TokenPair, renew,
};
