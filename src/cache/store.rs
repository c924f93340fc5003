//! Cache store adapter.
//!
//! [`CacheStore`] is the raw key/value backend with per-entry TTL.
//! [`StoreAdapter`] sits in front of it and turns backend failures into
//! misses and logged no-ops, so an unreachable store degrades the compute
//! cache to always-compute instead of failing requests.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use metrics::counter;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::config::CacheConfig;
use super::keys::CacheKey;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";
const METRIC_STORE_ERROR: &str = "inboxdesk_cache_store_error_total";
const METRIC_EVICT: &str = "inboxdesk_cache_evict_total";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cache store unavailable: {0}")]
    Unavailable(String),
    #[error("cache store rejected the operation: {0}")]
    Rejected(String),
}

/// A stored value and the wall-clock time it was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    pub value: Bytes,
    pub stored_at: OffsetDateTime,
}

impl StoredEntry {
    pub fn new(value: impl Into<Bytes>, stored_at: OffsetDateTime) -> Self {
        Self {
            value: value.into(),
            stored_at,
        }
    }
}

/// Key/value backend with per-entry expiry.
///
/// Implementations own expiry: `get` must never return an entry whose
/// `stored_at + ttl` has passed. Writing an existing key overwrites it, and
/// `get` returns the entry exactly as it was handed to `set`.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<StoredEntry>, StoreError>;

    async fn set(&self, key: &str, entry: StoredEntry, ttl: Duration) -> Result<(), StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

struct MemoryEntry {
    entry: StoredEntry,
    /// `None` when the TTL reaches past what the clock can represent.
    expires_at: Option<Instant>,
}

/// In-process LRU store.
///
/// Expiry is measured on the tokio clock so tests can pause and advance time.
pub struct MemoryStore {
    entries: RwLock<LruCache<String, MemoryEntry>>,
}

impl MemoryStore {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(config.max_entries_non_zero())),
        }
    }

    /// Number of entries currently held, expired ones included.
    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<StoredEntry>, StoreError> {
        let mut entries = rw_write(&self.entries, SOURCE, "get");
        let Some(entry) = entries.get(key) else {
            return Ok(None);
        };
        let live = entry
            .expires_at
            .is_none_or(|deadline| Instant::now() < deadline);
        if live {
            return Ok(Some(entry.entry.clone()));
        }

        entries.pop(key);
        debug!(cache = "store", key, "dropped expired entry");
        Ok(None)
    }

    async fn set(&self, key: &str, entry: StoredEntry, ttl: Duration) -> Result<(), StoreError> {
        let expires_at = Instant::now().checked_add(ttl);
        if expires_at.is_none() {
            debug!(cache = "store", key, "ttl beyond clock range; entry kept until evicted");
        }
        let entry = MemoryEntry { entry, expires_at };

        let displaced = rw_write(&self.entries, SOURCE, "set").push(key.to_string(), entry);
        if let Some((evicted_key, _)) = displaced {
            if evicted_key != key {
                counter!(METRIC_EVICT).increment(1);
                debug!(cache = "store", key = %evicted_key, "evicted entry at capacity");
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        rw_write(&self.entries, SOURCE, "delete").pop(key);
        Ok(())
    }
}

/// Failure-absorbing front of a [`CacheStore`].
#[derive(Clone)]
pub struct StoreAdapter {
    inner: Arc<dyn CacheStore>,
}

impl StoreAdapter {
    pub fn new(inner: Arc<dyn CacheStore>) -> Self {
        Self { inner }
    }

    /// Returns the live entry for `key`, or `None` on a miss or store failure.
    pub async fn get(&self, key: &CacheKey) -> Option<StoredEntry> {
        let raw = key.to_string();
        match self.inner.get(&raw).await {
            Ok(entry) => entry,
            Err(err) => {
                record_store_error("get");
                warn!(
                    cache = "store",
                    op = "get",
                    key = %raw,
                    error = %err,
                    "cache store read failed; treating as miss"
                );
                None
            }
        }
    }

    pub async fn set(&self, key: &CacheKey, entry: StoredEntry, ttl: Duration) {
        let raw = key.to_string();
        if let Err(err) = self.inner.set(&raw, entry, ttl).await {
            record_store_error("set");
            warn!(
                cache = "store",
                op = "set",
                key = %raw,
                error = %err,
                "cache store write failed; continuing without caching"
            );
        }
    }

    pub async fn delete(&self, key: &CacheKey) {
        let raw = key.to_string();
        if let Err(err) = self.inner.delete(&raw).await {
            record_store_error("delete");
            warn!(
                cache = "store",
                op = "delete",
                key = %raw,
                error = %err,
                "cache store delete failed"
            );
        }
    }
}

fn record_store_error(op: &'static str) {
    counter!(METRIC_STORE_ERROR, "op" => op).increment(1);
}
