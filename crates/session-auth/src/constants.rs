//! Endpoint paths, storage keys and header names shared by the client.
//!
//! Paths are relative to the API base URL. All of them can be overridden in
//! the CLI config; these are the values the backend ships with.

/// Credential-issuing endpoint (email + password in, token pair out)
pub const LOGIN_PATH: &str = "/member/login";

/// Renewal endpoint (current pair in, rotated pair out)
pub const RENEWAL_PATH: &str = "/auth/reissue";

/// Session-termination endpoint
pub const LOGOUT_PATH: &str = "/member/logout";

/// Current user's profile
pub const PROFILE_PATH: &str = "/member/fetchMyInfo";

/// Unauthenticated entry point the host is sent to when the session expires
pub const LOGIN_ENTRY_POINT: &str = "/login";

/// Durable storage key for the access credential
pub const ACCESS_TOKEN_KEY: &str = "accessToken";

/// Durable storage key for the refresh credential
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

/// Durable storage key for the cached user profile (JSON)
pub const USER_PROFILE_KEY: &str = "loginUser";

/// Every key cleared together when a session ends.
pub const SESSION_KEYS: &[&str] = &[ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_PROFILE_KEY];

/// Anti-forgery header attached to state-changing requests
pub const ANTI_FORGERY_HEADER: &str = "X-XSRF-TOKEN";

/// Cookie the anti-forgery header value is read from
pub const ANTI_FORGERY_COOKIE: &str = "XSRF-TOKEN";
