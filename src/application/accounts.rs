//! Account dashboard reads and the mutations that stale them.
//!
//! Reads go through the compute cache. Every mutation commits first and only
//! then invalidates, so a failed write leaves cached entries untouched.

use std::sync::Arc;

use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

use crate::application::repos::{AccountsRepo, DomainUpdate, InboxUpdate, RepoError};
use crate::cache::{CacheConfig, CacheKey, CacheRead, ComputeCache, InvalidationRouter, Namespace};
use crate::domain::accounts::AccountId;
use crate::domain::entities::{DashboardSummary, DomainRecord, FulfilledOrder, InboxRecord};

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("{0}")]
    ConstraintViolation(&'static str),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Clone)]
pub struct AccountService {
    repo: Arc<dyn AccountsRepo>,
    cache: ComputeCache,
    invalidation: InvalidationRouter,
}

impl AccountService {
    pub fn new(
        repo: Arc<dyn AccountsRepo>,
        cache: ComputeCache,
        invalidation: InvalidationRouter,
    ) -> Self {
        Self {
            repo,
            cache,
            invalidation,
        }
    }

    pub fn cache_config(&self) -> &CacheConfig {
        self.cache.config()
    }

    #[instrument(skip(self), fields(account = %account))]
    pub async fn dashboard(
        &self,
        account: &AccountId,
    ) -> Result<CacheRead<DashboardSummary>, AccountError> {
        let key = CacheKey::dashboard(account);
        self.cache
            .read_through(&key, self.ttl(Namespace::Dashboard), || {
                self.repo.dashboard_summary(account)
            })
            .await
            .map_err(AccountError::from)
    }

    #[instrument(skip(self), fields(account = %account))]
    pub async fn inboxes(
        &self,
        account: &AccountId,
    ) -> Result<CacheRead<Vec<InboxRecord>>, AccountError> {
        let key = CacheKey::inboxes(account);
        self.cache
            .read_through(&key, self.ttl(Namespace::Inboxes), || {
                self.repo.list_inboxes(account)
            })
            .await
            .map_err(AccountError::from)
    }

    #[instrument(skip(self), fields(account = %account))]
    pub async fn domains(
        &self,
        account: &AccountId,
    ) -> Result<CacheRead<Vec<DomainRecord>>, AccountError> {
        let key = CacheKey::domains(account);
        self.cache
            .read_through(&key, self.ttl(Namespace::Domains), || {
                self.repo.list_domains(account)
            })
            .await
            .map_err(AccountError::from)
    }

    #[instrument(skip(self, update), fields(account = %account))]
    pub async fn update_inbox(
        &self,
        account: &AccountId,
        inbox_id: Uuid,
        update: InboxUpdate,
    ) -> Result<InboxRecord, AccountError> {
        if update.is_empty() {
            return Err(AccountError::ConstraintViolation("no inbox fields to update"));
        }
        let record = self.repo.update_inbox(account, inbox_id, &update).await?;
        self.invalidation.inboxes_changed(account).await;
        Ok(record)
    }

    #[instrument(skip(self, update), fields(account = %account))]
    pub async fn update_domain(
        &self,
        account: &AccountId,
        domain_id: Uuid,
        update: DomainUpdate,
    ) -> Result<DomainRecord, AccountError> {
        if update.is_empty() {
            return Err(AccountError::ConstraintViolation("no domain fields to update"));
        }
        let record = self.repo.update_domain(account, domain_id, &update).await?;
        self.invalidation.domains_changed(account).await;
        Ok(record)
    }

    #[instrument(skip(self), fields(account = %account))]
    pub async fn fulfill_order(
        &self,
        account: &AccountId,
        order_id: Uuid,
    ) -> Result<FulfilledOrder, AccountError> {
        let fulfilled = self.repo.fulfill_order(account, order_id).await?;
        self.invalidation.order_fulfilled(account).await;
        Ok(fulfilled)
    }

    pub async fn health(&self) -> Result<(), RepoError> {
        self.repo.ping().await
    }

    fn ttl(&self, namespace: Namespace) -> std::time::Duration {
        self.cache.config().ttl_for(namespace)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use time::OffsetDateTime;

    use super::*;
    use crate::cache::{MemoryStore, StoreAdapter};
    use crate::domain::types::ProvisioningStatus;

    #[derive(Default)]
    struct CountingRepo {
        dashboard_calls: AtomicUsize,
        inbox_calls: AtomicUsize,
        domain_calls: AtomicUsize,
        inbox_status: Mutex<Option<ProvisioningStatus>>,
        fail_writes: bool,
    }

    fn inbox(status: ProvisioningStatus) -> InboxRecord {
        InboxRecord {
            id: Uuid::nil(),
            address: "ops@example.com".to_string(),
            display_name: None,
            domain: "example.com".to_string(),
            status,
            created_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[async_trait]
    impl AccountsRepo for CountingRepo {
        async fn dashboard_summary(
            &self,
            account: &AccountId,
        ) -> Result<DashboardSummary, RepoError> {
            self.dashboard_calls.fetch_add(1, Ordering::SeqCst);
            Ok(DashboardSummary {
                account_id: account.clone(),
                total_inboxes: 1,
                active_inboxes: 0,
                total_domains: 0,
                active_domains: 0,
                pending_orders: 0,
            })
        }

        async fn list_inboxes(&self, _account: &AccountId) -> Result<Vec<InboxRecord>, RepoError> {
            self.inbox_calls.fetch_add(1, Ordering::SeqCst);
            let status = self
                .inbox_status
                .lock()
                .expect("status lock")
                .unwrap_or(ProvisioningStatus::Pending);
            Ok(vec![inbox(status)])
        }

        async fn list_domains(
            &self,
            _account: &AccountId,
        ) -> Result<Vec<DomainRecord>, RepoError> {
            self.domain_calls.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }

        async fn update_inbox(
            &self,
            _account: &AccountId,
            _inbox_id: Uuid,
            update: &InboxUpdate,
        ) -> Result<InboxRecord, RepoError> {
            if self.fail_writes {
                return Err(RepoError::from_persistence("write rejected"));
            }
            let status = update.status.unwrap_or(ProvisioningStatus::Pending);
            *self.inbox_status.lock().expect("status lock") = Some(status);
            Ok(inbox(status))
        }

        async fn update_domain(
            &self,
            _account: &AccountId,
            _domain_id: Uuid,
            _update: &DomainUpdate,
        ) -> Result<DomainRecord, RepoError> {
            Err(RepoError::NotFound)
        }

        async fn fulfill_order(
            &self,
            _account: &AccountId,
            order_id: Uuid,
        ) -> Result<FulfilledOrder, RepoError> {
            Ok(FulfilledOrder {
                order_id,
                inboxes_activated: 1,
                domains_activated: 1,
            })
        }

        async fn ping(&self) -> Result<(), RepoError> {
            Ok(())
        }
    }

    fn service(repo: Arc<CountingRepo>) -> AccountService {
        let config = CacheConfig::default();
        let store = StoreAdapter::new(Arc::new(MemoryStore::new(&config)));
        AccountService::new(
            repo,
            ComputeCache::new(store.clone(), config.clone()),
            InvalidationRouter::new(store, config),
        )
    }

    fn account() -> AccountId {
        AccountId::parse("acct-1").expect("account id")
    }

    #[tokio::test]
    async fn repeated_reads_hit_the_cache() {
        let repo = Arc::new(CountingRepo::default());
        let service = service(repo.clone());

        let first = service.dashboard(&account()).await.expect("dashboard");
        let second = service.dashboard(&account()).await.expect("dashboard");

        assert!(!first.is_hit());
        assert!(second.is_hit());
        assert_eq!(repo.dashboard_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn inbox_update_is_visible_on_next_read() {
        let repo = Arc::new(CountingRepo::default());
        let service = service(repo.clone());
        let account = account();

        let before = service.inboxes(&account).await.expect("inboxes");
        assert_eq!(before.value()[0].status, ProvisioningStatus::Pending);
        service.domains(&account).await.expect("domains");

        let update = InboxUpdate {
            status: Some(ProvisioningStatus::Active),
            ..InboxUpdate::default()
        };
        service
            .update_inbox(&account, Uuid::nil(), update)
            .await
            .expect("update");

        let after = service.inboxes(&account).await.expect("inboxes");
        assert!(!after.is_hit());
        assert_eq!(after.value()[0].status, ProvisioningStatus::Active);

        // Domain listing is not affected by an inbox change.
        assert!(service.domains(&account).await.expect("domains").is_hit());
        assert_eq!(repo.domain_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_mutation_keeps_cache() {
        let repo = Arc::new(CountingRepo {
            fail_writes: true,
            ..CountingRepo::default()
        });
        let service = service(repo.clone());
        let account = account();

        service.inboxes(&account).await.expect("inboxes");
        let update = InboxUpdate {
            display_name: Some("Ops".to_string()),
            ..InboxUpdate::default()
        };
        assert!(service.update_inbox(&account, Uuid::nil(), update).await.is_err());

        assert!(service.inboxes(&account).await.expect("inboxes").is_hit());
        assert_eq!(repo.inbox_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_update_is_rejected() {
        let service = service(Arc::new(CountingRepo::default()));
        let err = service
            .update_inbox(&account(), Uuid::nil(), InboxUpdate::default())
            .await
            .expect_err("empty update");
        assert!(matches!(err, AccountError::ConstraintViolation(_)));
    }

    #[tokio::test]
    async fn fulfilled_order_refreshes_dashboard() {
        let repo = Arc::new(CountingRepo::default());
        let service = service(repo.clone());
        let account = account();

        service.dashboard(&account).await.expect("dashboard");
        service
            .fulfill_order(&account, Uuid::nil())
            .await
            .expect("fulfill");
        service.dashboard(&account).await.expect("dashboard");

        assert_eq!(repo.dashboard_calls.load(Ordering::SeqCst), 2);
    }
}
