//! Request classification.
//!
//! Every request maps to exactly one [`Strategy`]. The mapping is a pure
//! function of the request and the configured [`RouteTable`], checked in a
//! fixed order: navigation, method, icon family, API prefix, everything else.

use std::fmt;

use reqwest::Method;

use super::request::{InterceptedRequest, RequestMode};

pub const DEFAULT_API_PREFIX: &str = "/api/";
pub const DEFAULT_ICON_PATTERNS: [&str; 4] = ["favicon", "apple-touch-icon", "/icons/", ".ico"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Not intercepted; the platform handles the request.
    Bypass,
    /// Always from the network with caching disabled; never stored.
    NetworkOnlyNoStore,
    /// Network first, stored copy only when the network is unreachable.
    NetworkFirstWithFallback,
    /// Stored copy first, network on a miss.
    CacheFirst,
}

impl Strategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bypass => "bypass",
            Self::NetworkOnlyNoStore => "network_only_no_store",
            Self::NetworkFirstWithFallback => "network_first",
            Self::CacheFirst => "cache_first",
        }
    }

    /// Whether responses under this strategy may ever be written to storage.
    pub fn may_store(self) -> bool {
        matches!(self, Self::NetworkFirstWithFallback | Self::CacheFirst)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Route patterns that drive classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTable {
    api_prefix: String,
    icon_patterns: Vec<String>,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self {
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            icon_patterns: DEFAULT_ICON_PATTERNS.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl From<&crate::config::ClientSettings> for RouteTable {
    fn from(settings: &crate::config::ClientSettings) -> Self {
        Self::new(settings.api_prefix.clone(), settings.icon_patterns.clone())
    }
}

impl RouteTable {
    pub fn new(api_prefix: impl Into<String>, icon_patterns: Vec<String>) -> Self {
        Self {
            api_prefix: api_prefix.into(),
            icon_patterns: icon_patterns
                .into_iter()
                .map(|pattern| pattern.to_ascii_lowercase())
                .filter(|pattern| !pattern.is_empty())
                .collect(),
        }
    }

    pub fn api_prefix(&self) -> &str {
        &self.api_prefix
    }

    pub fn strategy_for(&self, request: &InterceptedRequest) -> Strategy {
        if request.mode == RequestMode::Navigate {
            return Strategy::Bypass;
        }
        if request.method != Method::GET {
            return Strategy::Bypass;
        }

        let path = request.path();
        if self.is_icon(path) {
            return Strategy::NetworkOnlyNoStore;
        }
        if path.starts_with(&self.api_prefix) {
            return Strategy::NetworkFirstWithFallback;
        }
        Strategy::CacheFirst
    }

    /// Patterns like `.ico` match the file extension of the last segment;
    /// every other pattern matches anywhere in the path.
    fn is_icon(&self, path: &str) -> bool {
        let path = path.to_ascii_lowercase();
        let file_name = path.rsplit('/').next().unwrap_or_default();
        self.icon_patterns.iter().any(|pattern| {
            if is_extension(pattern) {
                file_name.ends_with(pattern.as_str())
            } else {
                path.contains(pattern.as_str())
            }
        })
    }
}

fn is_extension(pattern: &str) -> bool {
    pattern.starts_with('.') && !pattern.contains('/')
}
