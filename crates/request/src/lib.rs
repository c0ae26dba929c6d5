//! Request model and decoration for the session-aware HTTP client
//!
//! A `RequestDescriptor` is built once per logical request and shared
//! immutably (`Arc`) between the first send and any replay. Its `RequestKind`
//! is fixed at construction and decides whether an unauthorized answer may
//! trigger credential renewal. Whether a send is the first one or a replay is
//! carried separately as an `Attempt`, never stored on the request.
//!
//! `Decorator` turns a descriptor plus the current credential into the final
//! header set. It is a pure function: no I/O and no suspension.

pub mod cookie;
pub mod decorator;
pub mod descriptor;
pub mod response;

pub use cookie::{CookieSource, StaticCookies, find_cookie};
pub use decorator::{AntiForgeryRule, CredentialDecorator, Decorator, HeaderInjection};
pub use descriptor::{Attempt, Body, FilePart, MultipartBody, RequestDescriptor, RequestKind};
pub use response::Response;

pub use reqwest::header;
pub use reqwest::{Method, StatusCode, Url};
