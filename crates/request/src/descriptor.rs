//! Request descriptors

use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::warn;
use uuid::Uuid;

/// What a request does with respect to the session.
///
/// Set when the request is built, never inferred from its path. Only
/// `Business` requests may start or join a credential renewal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Ordinary application traffic that needs a valid credential.
    Business,
    /// Login: issues a fresh credential pair.
    CredentialIssuance,
    /// The renewal call itself.
    CredentialRenewal,
    /// Logout.
    SessionTermination,
}

impl RequestKind {
    /// Whether an unauthorized answer to this kind of request may trigger renewal.
    pub fn may_trigger_renewal(self) -> bool {
        matches!(self, Self::Business)
    }

    /// Short label for logs and metrics.
    pub fn label(self) -> &'static str {
        match self {
            Self::Business => "business",
            Self::CredentialIssuance => "credential_issuance",
            Self::CredentialRenewal => "credential_renewal",
            Self::SessionTermination => "session_termination",
        }
    }
}

/// Which send of a logical request this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    First,
    /// Re-issued once after a renewal. A second unauthorized answer is final.
    Replay,
}

impl Attempt {
    pub fn is_replay(self) -> bool {
        matches!(self, Self::Replay)
    }
}

/// One file in a multipart body.
#[derive(Debug, Clone)]
pub struct FilePart {
    pub field: String,
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: bytes::Bytes,
}

/// Multipart form body. The transport picks the boundary.
#[derive(Debug, Clone, Default)]
pub struct MultipartBody {
    pub text: Vec<(String, String)>,
    pub files: Vec<FilePart>,
}

impl MultipartBody {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.text.push((name.into(), value.into()));
        self
    }

    pub fn file(
        mut self,
        field: impl Into<String>,
        file_name: impl Into<String>,
        content_type: Option<&str>,
        bytes: impl Into<bytes::Bytes>,
    ) -> Self {
        self.files.push(FilePart {
            field: field.into(),
            file_name: file_name.into(),
            content_type: content_type.map(str::to_owned),
            bytes: bytes.into(),
        });
        self
    }
}

#[derive(Debug, Clone, Default)]
pub enum Body {
    #[default]
    Empty,
    Json(serde_json::Value),
    Multipart(MultipartBody),
}

/// Immutable description of one logical request.
///
/// `path` is relative to the client's base URL. The descriptor is cloned into
/// an `Arc` once and the same instance is used for the first send and for
/// the replay after renewal.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub id: Uuid,
    pub kind: RequestKind,
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Body,
}

impl RequestDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: RequestKind::Business,
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: Body::Empty,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn with_kind(mut self, kind: RequestKind) -> Self {
        self.kind = kind;
        self
    }

    /// Add a caller header. Invalid names or values are logged and skipped.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            _ => warn!(header = name, "skipping invalid request header"),
        }
        self
    }

    pub fn json(mut self, value: serde_json::Value) -> Self {
        self.body = Body::Json(value);
        self
    }

    pub fn multipart(mut self, form: MultipartBody) -> Self {
        self.body = Body::Multipart(form);
        self
    }
}
