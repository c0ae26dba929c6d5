//! Cookie lookup for the anti-forgery header

use std::collections::HashMap;

use reqwest::Url;
use reqwest::cookie::{CookieStore, Jar};

/// Read access to cookies the transport holds for a URL.
pub trait CookieSource: Send + Sync {
    fn cookie(&self, url: &Url, name: &str) -> Option<String>;
}

impl CookieSource for Jar {
    fn cookie(&self, url: &Url, name: &str) -> Option<String> {
        let header = self.cookies(url)?;
        find_cookie(header.to_str().ok()?, name)
    }
}

/// Find `name` in a `Cookie` header value (`a=1; b=2`).
pub fn find_cookie(header: &str, name: &str) -> Option<String> {
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then(|| value.to_owned())
    })
}

/// Fixed cookie values, independent of URL.
#[derive(Debug, Default)]
pub struct StaticCookies(HashMap<String, String>);

impl StaticCookies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }
}

impl CookieSource for StaticCookies {
    fn cookie(&self, _url: &Url, name: &str) -> Option<String> {
        self.0.get(name).cloned()
    }
}
