//! Cache configuration.
//!
//! Controls the server-side compute cache via the `[cache]` section of
//! `inboxdesk.toml`.

use std::num::NonZeroUsize;
use std::time::Duration;

use super::keys::Namespace;

const DEFAULT_TTL_SECS: u64 = 300;
const DEFAULT_FRESHNESS_WINDOW_SECS: u64 = 60;
const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Resolved compute cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// When false every read computes and invalidation is a no-op.
    pub enabled: bool,
    /// Lifetime of dashboard and listing entries.
    pub ttl_seconds: u64,
    /// Window in which `If-Modified-Since` may short-circuit to 304.
    pub freshness_window_seconds: u64,
    /// Capacity of the in-process store.
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: DEFAULT_TTL_SECS,
            freshness_window_seconds: DEFAULT_FRESHNESS_WINDOW_SECS,
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            ttl_seconds: settings.ttl.as_secs(),
            freshness_window_seconds: settings.freshness_window.as_secs(),
            max_entries: settings.max_entries.get(),
        }
    }
}

impl CacheConfig {
    /// TTL applied to entries of the given namespace.
    ///
    /// Every namespace currently shares one TTL; the match keeps a new
    /// namespace from silently inheriting it.
    pub fn ttl_for(&self, namespace: Namespace) -> Duration {
        match namespace {
            Namespace::Dashboard | Namespace::Inboxes | Namespace::Domains => {
                Duration::from_secs(self.ttl_seconds)
            }
        }
    }

    pub fn freshness_window(&self) -> Duration {
        Duration::from_secs(self.freshness_window_seconds)
    }

    /// Returns the store capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn max_entries_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.max_entries).unwrap_or(NonZeroUsize::MIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert!(config.enabled);
        assert_eq!(config.ttl_seconds, 300);
        assert_eq!(config.freshness_window_seconds, 60);
        assert_eq!(config.max_entries, 10_000);
    }

    #[test]
    fn every_namespace_uses_the_listing_ttl() {
        let config = CacheConfig::default();
        for namespace in Namespace::ALL {
            assert_eq!(config.ttl_for(namespace), Duration::from_secs(300));
        }
    }

    #[test]
    fn freshness_window_is_shorter_than_ttl() {
        let config = CacheConfig::default();
        assert!(config.freshness_window() < config.ttl_for(Namespace::Dashboard));
    }

    #[test]
    fn non_zero_clamps_to_min() {
        let config = CacheConfig {
            max_entries: 0,
            ..Default::default()
        };
        assert_eq!(config.max_entries_non_zero().get(), 1);
    }
}
