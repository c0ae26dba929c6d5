//! Header decoration applied before every send.
//!
//! Order: caller headers, then configured static injections, then content
//! type, then credential headers. Static injections never overwrite
//! `Authorization`; the bearer header is owned by the credential step.

use std::str::FromStr;
use std::sync::Arc;

use reqwest::Url;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use session_auth::{ANTI_FORGERY_COOKIE, ANTI_FORGERY_HEADER, Credential};
use tracing::warn;

use crate::cookie::CookieSource;
use crate::descriptor::{Body, RequestDescriptor};

/// Header injection rule (name + value pair from config).
#[derive(Debug, Clone, Deserialize)]
pub struct HeaderInjection {
    pub name: String,
    pub value: String,
}

/// Which cookie feeds which header on state-changing requests.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AntiForgeryRule {
    pub header: String,
    pub cookie: String,
}

impl Default for AntiForgeryRule {
    fn default() -> Self {
        Self {
            header: ANTI_FORGERY_HEADER.to_string(),
            cookie: ANTI_FORGERY_COOKIE.to_string(),
        }
    }
}

/// Computes the final header set for one send of a request.
pub trait Decorator: Send + Sync {
    fn decorate(
        &self,
        request: &RequestDescriptor,
        url: &Url,
        credential: Option<&Credential>,
    ) -> HeaderMap;
}

pub struct CredentialDecorator {
    injections: Vec<(HeaderName, HeaderValue)>,
    anti_forgery: Option<HeaderName>,
    anti_forgery_cookie: String,
    cookies: Arc<dyn CookieSource>,
}

impl CredentialDecorator {
    /// Invalid injections (and any attempt to inject `Authorization`) are
    /// logged and dropped here, once, instead of on every request.
    pub fn new(
        injections: Vec<HeaderInjection>,
        rule: AntiForgeryRule,
        cookies: Arc<dyn CookieSource>,
    ) -> Self {
        let mut parsed = Vec::with_capacity(injections.len());
        for injection in injections {
            let name = match HeaderName::from_str(&injection.name) {
                Ok(n) => n,
                Err(e) => {
                    warn!(header = %injection.name, error = %e, "skipping invalid header name");
                    continue;
                }
            };
            if name == AUTHORIZATION {
                warn!(header = %injection.name, "refusing to inject authorization header");
                continue;
            }
            let value = match HeaderValue::from_str(&injection.value) {
                Ok(v) => v,
                Err(e) => {
                    warn!(header = %injection.name, error = %e, "skipping invalid header value");
                    continue;
                }
            };
            parsed.push((name, value));
        }

        let anti_forgery = match HeaderName::from_str(&rule.header) {
            Ok(name) => Some(name),
            Err(e) => {
                warn!(header = %rule.header, error = %e, "invalid anti-forgery header, disabled");
                None
            }
        };

        Self {
            injections: parsed,
            anti_forgery,
            anti_forgery_cookie: rule.cookie,
            cookies,
        }
    }
}

impl Decorator for CredentialDecorator {
    fn decorate(
        &self,
        request: &RequestDescriptor,
        url: &Url,
        credential: Option<&Credential>,
    ) -> HeaderMap {
        let mut headers = request.headers.clone();

        for (name, value) in &self.injections {
            headers.insert(name.clone(), value.clone());
        }

        match &request.body {
            Body::Json(_) => {
                if !headers.contains_key(CONTENT_TYPE) {
                    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                }
            }
            // The transport sets multipart/form-data with its own boundary.
            Body::Multipart(_) => {
                headers.remove(CONTENT_TYPE);
            }
            Body::Empty => {}
        }

        if let Some(credential) = credential.filter(|c| c.has_access_token()) {
            match HeaderValue::from_str(&format!("Bearer {}", credential.access_token())) {
                Ok(mut value) => {
                    value.set_sensitive(true);
                    headers.insert(AUTHORIZATION, value);
                }
                Err(_) => warn!(request_id = %request.id, "access token is not a valid header value"),
            }
        }

        if let Some(name) = &self.anti_forgery {
            if request.method.is_safe() {
                headers.remove(name);
            } else if let Some(token) = self.cookies.cookie(url, &self.anti_forgery_cookie)
                && let Ok(value) = HeaderValue::from_str(&token)
            {
                headers.insert(name.clone(), value);
            }
        }

        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cookie::StaticCookies;
    use crate::descriptor::MultipartBody;

    fn url() -> Url {
        Url::parse("http://127.0.0.1:8080/plan").unwrap()
    }

    fn decorator(injections: Vec<HeaderInjection>) -> CredentialDecorator {
        let cookies = StaticCookies::new().with("XSRF-TOKEN", "csrf-1");
        CredentialDecorator::new(injections, AntiForgeryRule::default(), Arc::new(cookies))
    }

    fn credential() -> Credential {
        Credential::new("A1", "R1")
    }

    #[test]
    fn attaches_bearer_token() {
        let headers = decorator(vec![]).decorate(
            &RequestDescriptor::get("/plan"),
            &url(),
            Some(&credential()),
        );
        let auth = headers.get(AUTHORIZATION).unwrap();
        assert_eq!(auth, "Bearer A1");
        assert!(auth.is_sensitive());
    }

    #[test]
    fn no_bearer_without_credential_or_with_empty_token() {
        let d = decorator(vec![]);
        let request = RequestDescriptor::get("/plan");

        assert!(d.decorate(&request, &url(), None).get(AUTHORIZATION).is_none());

        let empty = Credential::new("", "R1");
        assert!(
            d.decorate(&request, &url(), Some(&empty))
                .get(AUTHORIZATION)
                .is_none()
        );
    }

    #[test]
    fn anti_forgery_header_only_on_state_changing_methods() {
        let d = decorator(vec![]);
        for request in [
            RequestDescriptor::post("/plan"),
            RequestDescriptor::put("/plan/1"),
            RequestDescriptor::patch("/plan/1"),
            RequestDescriptor::delete("/plan/1"),
        ] {
            let headers = d.decorate(&request, &url(), None);
            assert_eq!(headers.get("x-xsrf-token").unwrap(), "csrf-1", "{}", request.method);
        }

        let headers = d.decorate(&RequestDescriptor::get("/plan"), &url(), None);
        assert!(headers.get("x-xsrf-token").is_none());
    }

    #[test]
    fn safe_methods_drop_caller_supplied_anti_forgery_header() {
        let request = RequestDescriptor::get("/plan").with_header("X-XSRF-TOKEN", "leak");
        let headers = decorator(vec![]).decorate(&request, &url(), None);
        assert!(headers.get("x-xsrf-token").is_none());
    }

    #[test]
    fn missing_cookie_means_no_anti_forgery_header() {
        let d = CredentialDecorator::new(
            vec![],
            AntiForgeryRule::default(),
            Arc::new(StaticCookies::new()),
        );
        let headers = d.decorate(&RequestDescriptor::post("/plan"), &url(), None);
        assert!(headers.get("x-xsrf-token").is_none());
    }

    #[test]
    fn json_body_defaults_content_type() {
        let d = decorator(vec![]);
        let request = RequestDescriptor::post("/plan").json(serde_json::json!({"title": "Jeju"}));
        let headers = d.decorate(&request, &url(), None);
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "application/json");

        let request = RequestDescriptor::post("/plan")
            .with_header("content-type", "application/merge-patch+json")
            .json(serde_json::json!({}));
        let headers = d.decorate(&request, &url(), None);
        assert_eq!(
            headers.get(CONTENT_TYPE).unwrap(),
            "application/merge-patch+json"
        );
    }

    #[test]
    fn multipart_body_never_gets_forced_content_type() {
        let request = RequestDescriptor::post("/board/write")
            .with_header("content-type", "application/json")
            .multipart(MultipartBody::new().text("title", "hello"));
        let headers = decorator(vec![]).decorate(&request, &url(), None);
        assert!(headers.get(CONTENT_TYPE).is_none());
    }

    #[test]
    fn injects_configured_headers() {
        let d = decorator(vec![
            HeaderInjection {
                name: "x-client".into(),
                value: "session-cli".into(),
            },
            HeaderInjection {
                name: "accept-language".into(),
                value: "ko-KR".into(),
            },
        ]);
        let headers = d.decorate(&RequestDescriptor::get("/plan"), &url(), None);
        assert_eq!(headers.get("x-client").unwrap(), "session-cli");
        assert_eq!(headers.get("accept-language").unwrap(), "ko-KR");
    }

    #[test]
    fn injection_cannot_set_authorization() {
        let d = decorator(vec![HeaderInjection {
            name: "authorization".into(),
            value: "Bearer INJECTED-SHOULD-NOT-APPEAR".into(),
        }]);

        let headers = d.decorate(&RequestDescriptor::get("/plan"), &url(), None);
        assert!(headers.get(AUTHORIZATION).is_none());

        let headers = d.decorate(&RequestDescriptor::get("/plan"), &url(), Some(&credential()));
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer A1");
    }

    #[test]
    fn injection_replaces_caller_header() {
        let d = decorator(vec![HeaderInjection {
            name: "x-client".into(),
            value: "session-cli".into(),
        }]);
        let request = RequestDescriptor::get("/plan").with_header("x-client", "old-value");
        let headers = d.decorate(&request, &url(), None);
        assert_eq!(headers.get("x-client").unwrap(), "session-cli");
    }

    #[test]
    fn skips_invalid_header_name() {
        let d = decorator(vec![
            HeaderInjection {
                name: "invalid header name".into(),
                value: "value".into(),
            },
            HeaderInjection {
                name: "x-valid".into(),
                value: "works".into(),
            },
        ]);
        let headers = d.decorate(&RequestDescriptor::get("/plan"), &url(), None);
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("x-valid").unwrap(), "works");
    }

    #[test]
    fn decoration_does_not_mutate_request() {
        let request = RequestDescriptor::post("/plan").json(serde_json::json!({}));
        let _ = decorator(vec![]).decorate(&request, &url(), Some(&credential()));
        assert!(request.headers.is_empty());
    }
}
