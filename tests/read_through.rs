//! Compute cache behaviour across TTL windows, invalidation and store faults.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use inboxdesk::cache::{
    CacheConfig, CacheKey, CacheStore, ComputeCache, InvalidationRouter, MemoryStore, Namespace,
    StoreAdapter, StoreError, StoredEntry,
};
use inboxdesk::domain::accounts::AccountId;

const TTL: Duration = Duration::from_secs(300);

struct Harness {
    cache: ComputeCache,
    router: InvalidationRouter,
    store: Arc<MemoryStore>,
}

fn harness() -> Harness {
    let config = CacheConfig::default();
    let store = Arc::new(MemoryStore::new(&config));
    let adapter = StoreAdapter::new(store.clone());
    Harness {
        cache: ComputeCache::new(adapter.clone(), config.clone()),
        router: InvalidationRouter::new(adapter, config),
        store,
    }
}

fn account(raw: &str) -> AccountId {
    AccountId::parse(raw).expect("account id")
}

/// Producer backed by a mutable "database" value that counts its calls.
struct Source {
    value: AtomicUsize,
    calls: AtomicUsize,
}

impl Source {
    fn new(value: usize) -> Self {
        Self {
            value: AtomicUsize::new(value),
            calls: AtomicUsize::new(0),
        }
    }

    async fn read(&self) -> Result<usize, std::io::Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.value.load(Ordering::SeqCst))
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[tokio::test(start_paused = true)]
async fn value_is_live_until_ttl_then_recomputed() {
    let h = harness();
    let key = CacheKey::dashboard(&account("acct-ttl"));
    let source = Source::new(1);

    let first = h.cache.get_or_compute(&key, TTL, || source.read()).await;
    assert_eq!(first.expect("first"), 1);

    tokio::time::advance(TTL - Duration::from_secs(1)).await;
    let before_expiry = h.cache.get_or_compute(&key, TTL, || source.read()).await;
    assert_eq!(before_expiry.expect("cached"), 1);
    assert_eq!(source.calls(), 1);

    tokio::time::advance(Duration::from_secs(2)).await;
    let after_expiry = h.cache.get_or_compute(&key, TTL, || source.read()).await;
    assert_eq!(after_expiry.expect("recomputed"), 1);
    assert_eq!(source.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn staleness_without_invalidation_is_bounded_by_ttl() {
    let h = harness();
    let key = CacheKey::domains(&account("acct-stale"));
    let source = Source::new(10);

    h.cache
        .get_or_compute(&key, TTL, || source.read())
        .await
        .expect("prime");

    // Underlying data changes through a path that does not invalidate.
    source.value.store(20, Ordering::SeqCst);

    tokio::time::advance(Duration::from_secs(120)).await;
    let stale = h.cache.get_or_compute(&key, TTL, || source.read()).await;
    assert_eq!(stale.expect("stale"), 10);

    tokio::time::advance(Duration::from_secs(181)).await;
    let fresh = h.cache.get_or_compute(&key, TTL, || source.read()).await;
    assert_eq!(fresh.expect("fresh"), 20);
}

#[tokio::test]
async fn invalidation_forces_recompute_only_for_affected_keys() {
    let h = harness();
    let acct = account("acct-inv");
    let inboxes = Source::new(3);
    let domains = Source::new(1);

    for _ in 0..2 {
        h.cache
            .get_or_compute(&CacheKey::inboxes(&acct), TTL, || inboxes.read())
            .await
            .expect("inboxes");
        h.cache
            .get_or_compute(&CacheKey::domains(&acct), TTL, || domains.read())
            .await
            .expect("domains");
    }
    assert_eq!((inboxes.calls(), domains.calls()), (1, 1));

    inboxes.value.store(4, Ordering::SeqCst);
    let evicted = h.router.inboxes_changed(&acct).await;
    assert!(evicted.contains(&CacheKey::inboxes(&acct)));
    assert!(evicted.contains(&CacheKey::dashboard(&acct)));

    let refreshed = h
        .cache
        .get_or_compute(&CacheKey::inboxes(&acct), TTL, || inboxes.read())
        .await
        .expect("inboxes");
    assert_eq!(refreshed, 4);
    h.cache
        .get_or_compute(&CacheKey::domains(&acct), TTL, || domains.read())
        .await
        .expect("domains");

    assert_eq!((inboxes.calls(), domains.calls()), (2, 1));
}

#[tokio::test]
async fn invalidating_all_namespaces_clears_the_account() {
    let h = harness();
    let acct = account("acct-all");
    let other = account("acct-other");
    let source = Source::new(0);

    for namespace in Namespace::ALL {
        for id in [&acct, &other] {
            h.cache
                .get_or_compute(&CacheKey::new(namespace, id.clone()), TTL, || source.read())
                .await
                .expect("prime");
        }
    }
    assert_eq!(h.store.len(), 6);

    h.router.invalidate(&acct, &Namespace::ALL).await;
    assert_eq!(h.store.len(), 3);
}

#[tokio::test]
async fn producer_failure_is_not_cached() {
    let h = harness();
    let key = CacheKey::inboxes(&account("acct-fail"));
    let attempts = AtomicUsize::new(0);

    let failed: Result<u32, std::io::Error> = h
        .cache
        .get_or_compute(&key, TTL, || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(std::io::Error::other("database unavailable"))
        })
        .await;
    assert!(failed.is_err());
    assert!(h.store.is_empty());

    let recovered = h
        .cache
        .get_or_compute(&key, TTL, || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Ok::<_, std::io::Error>(7_u32)
        })
        .await;
    assert_eq!(recovered.expect("recovered"), 7);
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn producer_failure_leaves_other_keys_cached() {
    let h = harness();
    let acct = account("acct-iso");
    let source = Source::new(5);

    h.cache
        .get_or_compute(&CacheKey::domains(&acct), TTL, || source.read())
        .await
        .expect("prime");

    let failed: Result<usize, std::io::Error> = h
        .cache
        .get_or_compute(&CacheKey::inboxes(&acct), TTL, || async {
            Err(std::io::Error::other("timeout"))
        })
        .await;
    assert!(failed.is_err());

    h.cache
        .get_or_compute(&CacheKey::domains(&acct), TTL, || source.read())
        .await
        .expect("still cached");
    assert_eq!(source.calls(), 1);
}

struct UnreachableStore {
    calls: AtomicUsize,
}

#[async_trait]
impl CacheStore for UnreachableStore {
    async fn get(&self, _key: &str) -> Result<Option<StoredEntry>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn set(
        &self,
        _key: &str,
        _entry: StoredEntry,
        _ttl: Duration,
    ) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn delete(&self, _key: &str) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Unavailable("connection refused".to_string()))
    }
}

#[tokio::test]
async fn store_outage_degrades_to_always_compute() {
    let backend = Arc::new(UnreachableStore {
        calls: AtomicUsize::new(0),
    });
    let config = CacheConfig::default();
    let adapter = StoreAdapter::new(backend.clone());
    let cache = ComputeCache::new(adapter.clone(), config.clone());
    let router = InvalidationRouter::new(adapter, config);
    let acct = account("acct-down");
    let source = Source::new(9);

    for _ in 0..3 {
        let value = cache
            .get_or_compute(&CacheKey::dashboard(&acct), TTL, || source.read())
            .await;
        assert_eq!(value.expect("computed despite outage"), 9);
    }
    assert_eq!(source.calls(), 3);

    let evicted = router.order_fulfilled(&acct).await;
    assert_eq!(evicted.len(), 3);
    assert!(backend.calls.load(Ordering::SeqCst) >= 9);
}
