//! Session-aware HTTP client
//!
//! `HttpClient` decorates every request with the current credential, sends
//! it, and hands unauthorized answers to the `RefreshCoordinator`. Callers
//! never see a transient expiry: they either get the replayed response or a
//! terminal error.

mod http_client;
mod options;

pub use http_client::HttpClient;
pub use options::{ClientOptions, Endpoints};
pub use refresh::{Error, Result};
pub use request::{Body, Method, MultipartBody, RequestDescriptor, RequestKind, Response};
pub use session_auth::{SessionNotice, Storage};
