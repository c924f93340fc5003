//! Invalidation router.
//!
//! Maps a committed mutation to the cache keys it makes stale and deletes
//! them before the mutation's response is returned. Invalidation targets are
//! computed on the spot from the account id and never persisted.
//!
//! This only guarantees read-after-write for readers that go through the
//! cache after the delete. A client that already holds a copy keeps it until
//! its TTL runs out; that window is bounded by [`CacheConfig::ttl_for`].

use futures::future::join_all;
use metrics::counter;
use tracing::{debug, info, instrument};

use crate::domain::accounts::AccountId;

use super::config::CacheConfig;
use super::keys::{CacheKey, Namespace};
use super::store::StoreAdapter;

const METRIC_INVALIDATE: &str = "inboxdesk_cache_invalidate_total";

/// Mutations that change cached account data.
///
/// Adding a cached namespace or a new kind of mutation means extending
/// [`Mutation::affected_namespaces`], which the compiler enforces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// An inbox record was created, edited, suspended or removed.
    InboxesChanged { account_id: AccountId },
    /// A domain record was created, edited, suspended or removed.
    DomainsChanged { account_id: AccountId },
    /// An order was fulfilled, provisioning both inboxes and domains.
    OrderFulfilled { account_id: AccountId },
}

impl Mutation {
    pub fn account_id(&self) -> &AccountId {
        match self {
            Mutation::InboxesChanged { account_id }
            | Mutation::DomainsChanged { account_id }
            | Mutation::OrderFulfilled { account_id } => account_id,
        }
    }

    pub fn affected_namespaces(&self) -> &'static [Namespace] {
        match self {
            Mutation::InboxesChanged { .. } => &[Namespace::Dashboard, Namespace::Inboxes],
            Mutation::DomainsChanged { .. } => &[Namespace::Dashboard, Namespace::Domains],
            Mutation::OrderFulfilled { .. } => &Namespace::ALL,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Mutation::InboxesChanged { .. } => "inboxes_changed",
            Mutation::DomainsChanged { .. } => "domains_changed",
            Mutation::OrderFulfilled { .. } => "order_fulfilled",
        }
    }
}

/// Deletes the cache keys a mutation invalidates.
#[derive(Clone)]
pub struct InvalidationRouter {
    store: StoreAdapter,
    config: CacheConfig,
}

impl InvalidationRouter {
    pub fn new(store: StoreAdapter, config: CacheConfig) -> Self {
        Self { store, config }
    }

    /// Delete `<namespace>:<account>` for every namespace given.
    ///
    /// Returns the keys that were targeted. Store failures are absorbed by
    /// the adapter, so this never fails the calling mutation.
    #[instrument(skip(self), fields(account = %account_id))]
    pub async fn invalidate(
        &self,
        account_id: &AccountId,
        namespaces: &[Namespace],
    ) -> Vec<CacheKey> {
        if !self.config.enabled {
            debug!(cache = "invalidate", "skipped: cache disabled");
            return Vec::new();
        }

        let mut keys: Vec<CacheKey> = namespaces
            .iter()
            .map(|namespace| CacheKey::new(*namespace, account_id.clone()))
            .collect();
        keys.sort_by_key(CacheKey::namespace);
        keys.dedup();

        join_all(keys.iter().map(|key| self.store.delete(key))).await;

        for key in &keys {
            counter!(METRIC_INVALIDATE, "namespace" => key.namespace().as_str()).increment(1);
        }
        debug!(cache = "invalidate", count = keys.len(), "cache keys evicted");
        keys
    }

    pub async fn apply(&self, mutation: &Mutation) -> Vec<CacheKey> {
        info!(
            cache = "invalidate",
            mutation = mutation.label(),
            account = %mutation.account_id(),
            "invalidating after mutation"
        );
        self.invalidate(mutation.account_id(), mutation.affected_namespaces())
            .await
    }

    pub async fn inboxes_changed(&self, account_id: &AccountId) -> Vec<CacheKey> {
        self.apply(&Mutation::InboxesChanged {
            account_id: account_id.clone(),
        })
        .await
    }

    pub async fn domains_changed(&self, account_id: &AccountId) -> Vec<CacheKey> {
        self.apply(&Mutation::DomainsChanged {
            account_id: account_id.clone(),
        })
        .await
    }

    pub async fn order_fulfilled(&self, account_id: &AccountId) -> Vec<CacheKey> {
        self.apply(&Mutation::OrderFulfilled {
            account_id: account_id.clone(),
        })
        .await
    }
}
