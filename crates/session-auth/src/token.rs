//! Renewal endpoint calls and credential wire types
//!
//! The renewal call goes over a plain `reqwest::Client` (the "bare"
//! transport). It never passes through the refresh coordinator, so an
//! unauthorized answer from the renewal endpoint is just an error here and
//! can't recursively start another renewal.
//!
//! Wire format is camelCase JSON on both sides:
//! request `{accessToken, refreshToken}`, response `{accessToken, refreshToken}`.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::credentials::Credential;
use crate::error::{Error, Result};

/// Token pair as sent to and returned by the renewal endpoint.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
}

impl TokenPair {
    fn from_credential(credential: &Credential) -> Self {
        Self {
            access_token: credential.access_token().to_owned(),
            refresh_token: credential.refresh_token().to_owned(),
        }
    }

    /// Turn a renewal response into the next credential.
    ///
    /// An empty access token is not a usable credential. An empty refresh
    /// token means the server did not rotate it, so the previous one is kept.
    pub fn into_credential(self, previous: &Credential) -> Result<Credential> {
        if self.access_token.is_empty() {
            return Err(Error::Renewal(
                "renewal response carried no access token".into(),
            ));
        }
        let refresh = if self.refresh_token.is_empty() {
            previous.refresh_token().to_owned()
        } else {
            self.refresh_token
        };
        Ok(Credential::new(self.access_token, refresh))
    }
}

/// Body of the credential-issuing (login) request.
#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// Response of the credential-issuing endpoint.
///
/// `message` is `"success"` when the backend issued a pair; anything else is
/// a rejection even if the status code was 200.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub message: String,
    #[serde(default)]
    pub user_info: Option<serde_json::Value>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl LoginResponse {
    pub fn is_success(&self) -> bool {
        self.message == "success"
    }

    /// Credential issued by a successful login, if the response carried one.
    pub fn credential(&self) -> Option<Credential> {
        match (&self.access_token, &self.refresh_token) {
            (Some(access), Some(refresh)) if !access.is_empty() => {
                Some(Credential::new(access.clone(), refresh.clone()))
            }
            _ => None,
        }
    }
}

/// Exchange the current pair for a new one at the renewal endpoint.
///
/// A missing refresh credential fails before any network call. 401/403 from
/// the endpoint means the refresh credential is revoked or expired.
pub async fn renew(
    client: &reqwest::Client,
    url: Url,
    timeout: Duration,
    credential: &Credential,
) -> Result<Credential> {
    if !credential.has_refresh_token() {
        return Err(Error::MissingRefreshToken);
    }

    let response = client
        .post(url)
        .timeout(timeout)
        .json(&TokenPair::from_credential(credential))
        .send()
        .await
        .map_err(|e| Error::Http(format!("renewal request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(Error::InvalidCredentials(format!(
                "renewal rejected ({status}): {body}"
            )));
        }

        return Err(Error::Renewal(format!(
            "renewal endpoint returned {status}: {body}"
        )));
    }

    let pair = response
        .json::<TokenPair>()
        .await
        .map_err(|e| Error::Renewal(format!("invalid renewal response: {e}")))?;
    debug!("renewal endpoint issued a new pair");
    pair.into_credential(credential)
}

/// Boxed future returned by `Renewer::renew`.
pub type RenewFuture<'a> = Pin<Box<dyn Future<Output = Result<Credential>> + Send + 'a>>;

/// Performs the one renewal call the refresh coordinator is allowed to make.
pub trait Renewer: Send + Sync {
    fn renew<'a>(&'a self, credential: &'a Credential) -> RenewFuture<'a>;
}

/// `Renewer` that posts to the renewal endpoint over the bare transport.
pub struct EndpointRenewer {
    client: reqwest::Client,
    url: Url,
    timeout: Duration,
}

impl EndpointRenewer {
    pub fn new(client: reqwest::Client, url: Url, timeout: Duration) -> Self {
        Self {
            client,
            url,
            timeout,
        }
    }
}

impl Renewer for EndpointRenewer {
    fn renew<'a>(&'a self, credential: &'a Credential) -> RenewFuture<'a> {
        Box::pin(renew(&self.client, self.url.clone(), self.timeout, credential))
    }
}
