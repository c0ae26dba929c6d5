use std::time::Duration;

use request::{AntiForgeryRule, HeaderInjection, Url};
use session_auth::{LOGIN_ENTRY_POINT, LOGIN_PATH, LOGOUT_PATH, PROFILE_PATH, RENEWAL_PATH};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Endpoint paths relative to the base URL.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub login: String,
    pub renewal: String,
    pub logout: String,
    pub profile: String,
    /// Where the host sends the user when the session expires.
    pub entry_point: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            login: LOGIN_PATH.to_string(),
            renewal: RENEWAL_PATH.to_string(),
            logout: LOGOUT_PATH.to_string(),
            profile: PROFILE_PATH.to_string(),
            entry_point: LOGIN_ENTRY_POINT.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub base_url: Url,
    pub timeout: Duration,
    pub endpoints: Endpoints,
    pub anti_forgery: AntiForgeryRule,
    pub headers: Vec<HeaderInjection>,
}

impl ClientOptions {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            timeout: DEFAULT_TIMEOUT,
            endpoints: Endpoints::default(),
            anti_forgery: AntiForgeryRule::default(),
            headers: Vec::new(),
        }
    }
}
