//! Read-through compute cache.
//!
//! Given a key, a TTL and a producer, returns the stored value while it is
//! live and otherwise runs the producer once, stores its result and returns
//! it. A failing producer writes nothing, so the next call simply retries.
//!
//! There is no single-flight guard: two concurrent misses on one key both run
//! their producer and the later write wins. That is only sound because every
//! producer is an idempotent, side-effect-free read. A side-effecting
//! producer needs a per-key in-flight map before it can be cached here.

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use metrics::counter;
use serde::{Serialize, de::DeserializeOwned};
use time::OffsetDateTime;
use tracing::{debug, instrument, warn};

use super::config::CacheConfig;
use super::keys::CacheKey;
use super::store::{StoreAdapter, StoredEntry};

const METRIC_HIT: &str = "inboxdesk_cache_hit_total";
const METRIC_MISS: &str = "inboxdesk_cache_miss_total";

/// Where a [`CacheRead`] value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadSource {
    Cache,
    Computed,
}

/// A value plus the metadata HTTP collaborators derive validators from.
#[derive(Debug, Clone)]
pub struct CacheRead<T> {
    value: T,
    stored_at: OffsetDateTime,
    source: ReadSource,
}

impl<T> CacheRead<T> {
    pub fn from_cache(value: T, stored_at: OffsetDateTime) -> Self {
        Self {
            value,
            stored_at,
            source: ReadSource::Cache,
        }
    }

    pub fn computed(value: T, stored_at: OffsetDateTime) -> Self {
        Self {
            value,
            stored_at,
            source: ReadSource::Computed,
        }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn into_value(self) -> T {
        self.value
    }

    /// When the value was produced.
    pub fn stored_at(&self) -> OffsetDateTime {
        self.stored_at
    }

    pub fn source(&self) -> ReadSource {
        self.source
    }

    pub fn is_hit(&self) -> bool {
        self.source == ReadSource::Cache
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CacheRead<U> {
        CacheRead {
            value: f(self.value),
            stored_at: self.stored_at,
            source: self.source,
        }
    }
}

/// Get-or-compute cache over a [`StoreAdapter`].
#[derive(Clone)]
pub struct ComputeCache {
    store: StoreAdapter,
    config: CacheConfig,
}

impl ComputeCache {
    pub fn new(store: StoreAdapter, config: CacheConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Return the live value for `key`, computing and storing it on a miss.
    pub async fn get_or_compute<T, E, F, Fut>(
        &self,
        key: &CacheKey,
        ttl: Duration,
        producer: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.read_through(key, ttl, producer)
            .await
            .map(CacheRead::into_value)
    }

    /// Same as [`ComputeCache::get_or_compute`], keeping read metadata.
    #[instrument(skip_all, fields(key = %key))]
    pub async fn read_through<T, E, F, Fut>(
        &self,
        key: &CacheKey,
        ttl: Duration,
        producer: F,
    ) -> Result<CacheRead<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.config.enabled {
            let value = producer().await?;
            return Ok(CacheRead::computed(value, OffsetDateTime::now_utc()));
        }

        let namespace = key.namespace().as_str();

        if let Some(entry) = self.store.get(key).await {
            match serde_json::from_slice::<T>(&entry.value) {
                Ok(value) => {
                    counter!(METRIC_HIT, "namespace" => namespace).increment(1);
                    debug!(cache = "compute", outcome = "hit", "serving cached value");
                    return Ok(CacheRead::from_cache(value, entry.stored_at));
                }
                Err(err) => {
                    warn!(
                        cache = "compute",
                        error = %err,
                        "discarding cache entry that no longer decodes"
                    );
                    self.store.delete(key).await;
                }
            }
        }

        counter!(METRIC_MISS, "namespace" => namespace).increment(1);
        debug!(cache = "compute", outcome = "miss", "computing fresh value");

        let value = producer().await?;
        let stored_at = OffsetDateTime::now_utc();

        if ttl.is_zero() {
            debug!(cache = "compute", "zero ttl; value not stored");
            return Ok(CacheRead::computed(value, stored_at));
        }

        match serde_json::to_vec(&value) {
            Ok(bytes) => {
                let entry = StoredEntry::new(Bytes::from(bytes), stored_at);
                self.store.set(key, entry, ttl).await
            }
            Err(err) => warn!(
                cache = "compute",
                error = %err,
                "value could not be serialized; not cached"
            ),
        }

        Ok(CacheRead::computed(value, stored_at))
    }

    /// Evict one key. Used by the invalidation router.
    pub async fn evict(&self, key: &CacheKey) {
        self.store.delete(key).await;
    }
}
