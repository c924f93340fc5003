//! Requests as the interception layer sees them.

use std::fmt;

use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};

/// How the request was initiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestMode {
    /// Top-level document navigation.
    Navigate,
    SameOrigin,
    Cors,
    NoCors,
}

impl RequestMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Navigate => "navigate",
            Self::SameOrigin => "same-origin",
            Self::Cors => "cors",
            Self::NoCors => "no-cors",
        }
    }
}

impl fmt::Display for RequestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An outgoing request offered to the interceptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptedRequest {
    pub url: Url,
    pub method: Method,
    pub mode: RequestMode,
}

impl InterceptedRequest {
    pub fn new(method: Method, url: Url, mode: RequestMode) -> Self {
        Self { url, method, mode }
    }

    /// A same-origin `GET`, the shape of most subresource fetches.
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url, RequestMode::SameOrigin)
    }

    pub fn navigate(url: Url) -> Self {
        Self::new(Method::GET, url, RequestMode::Navigate)
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }

    pub fn key(&self) -> RequestKey {
        RequestKey::new(&self.method, &self.url)
    }

    /// True when the request targets `origin` (scheme, host and port).
    pub fn is_same_origin(&self, origin: &Url) -> bool {
        self.url.origin() == origin.origin()
    }
}

/// Storage key of a request: method plus absolute URL, fragment stripped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestKey(String);

impl RequestKey {
    pub fn new(method: &Method, url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self(format!("{} {}", method.as_str(), url))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
