//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! `API_BASE_URL` overrides `api.base_url`. Credentials never live in the
//! TOML; they are kept in the session file at `auth.storage_path`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use client::{ClientOptions, Endpoints};
use request::{AntiForgeryRule, HeaderInjection, Url};
use serde::Deserialize;
use session_auth::{LOGIN_ENTRY_POINT, LOGIN_PATH, LOGOUT_PATH, PROFILE_PATH, RENEWAL_PATH};

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub anti_forgery: AntiForgeryRule,
    #[serde(default)]
    pub headers: Vec<HeaderInjection>,
}

/// Backend location and per-request timeout
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Session endpoints and where the session is kept between runs
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub login_path: String,
    pub renewal_path: String,
    pub logout_path: String,
    pub profile_path: String,
    pub entry_point: String,
    pub storage_path: PathBuf,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            login_path: LOGIN_PATH.to_string(),
            renewal_path: RENEWAL_PATH.to_string(),
            logout_path: LOGOUT_PATH.to_string(),
            profile_path: PROFILE_PATH.to_string(),
            entry_point: LOGIN_ENTRY_POINT.to_string(),
            storage_path: PathBuf::from("session.json"),
        }
    }
}

fn default_timeout() -> u64 {
    5
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if let Ok(base_url) = std::env::var("API_BASE_URL") {
            config.api.base_url = base_url;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        self.base_url()?;

        if self.api.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        for (name, path) in [
            ("login_path", &self.auth.login_path),
            ("renewal_path", &self.auth.renewal_path),
            ("logout_path", &self.auth.logout_path),
            ("profile_path", &self.auth.profile_path),
        ] {
            if !path.starts_with('/') {
                return Err(common::Error::Config(format!(
                    "{name} must start with '/', got: {path}"
                )));
            }
        }

        Ok(())
    }

    /// Parsed base URL. Only http(s) is accepted.
    pub fn base_url(&self) -> common::Result<Url> {
        let raw = &self.api.base_url;
        let url = Url::parse(raw).map_err(|e| common::Error::InvalidUrl {
            url: raw.clone(),
            reason: e.to_string(),
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(common::Error::InvalidUrl {
                url: raw.clone(),
                reason: "base_url must start with http:// or https://".into(),
            });
        }
        Ok(url)
    }

    pub fn client_options(&self) -> common::Result<ClientOptions> {
        Ok(ClientOptions {
            base_url: self.base_url()?,
            timeout: Duration::from_secs(self.api.timeout_secs),
            endpoints: Endpoints {
                login: self.auth.login_path.clone(),
                renewal: self.auth.renewal_path.clone(),
                logout: self.auth.logout_path.clone(),
                profile: self.auth.profile_path.clone(),
                entry_point: self.auth.entry_point.clone(),
            },
            anti_forgery: self.anti_forgery.clone(),
            headers: self.headers.clone(),
        })
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("session-cli.toml")
    }
}
