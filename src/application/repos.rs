//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::accounts::AccountId;
use crate::domain::entities::{DashboardSummary, DomainRecord, FulfilledOrder, InboxRecord};
use crate::domain::types::ProvisioningStatus;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}

/// Fields of an inbox an operator may change. `None` leaves a field as is.
#[derive(Debug, Clone, Default)]
pub struct InboxUpdate {
    pub display_name: Option<String>,
    pub status: Option<ProvisioningStatus>,
}

impl InboxUpdate {
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none() && self.status.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct DomainUpdate {
    pub forwarding_url: Option<String>,
    pub status: Option<ProvisioningStatus>,
}

impl DomainUpdate {
    pub fn is_empty(&self) -> bool {
        self.forwarding_url.is_none() && self.status.is_none()
    }
}

/// Account-scoped reads and writes.
///
/// Read queries must be idempotent: the compute cache may run them at any
/// time and more than once.
#[async_trait]
pub trait AccountsRepo: Send + Sync {
    async fn dashboard_summary(&self, account: &AccountId) -> Result<DashboardSummary, RepoError>;

    async fn list_inboxes(&self, account: &AccountId) -> Result<Vec<InboxRecord>, RepoError>;

    async fn list_domains(&self, account: &AccountId) -> Result<Vec<DomainRecord>, RepoError>;

    async fn update_inbox(
        &self,
        account: &AccountId,
        inbox_id: Uuid,
        update: &InboxUpdate,
    ) -> Result<InboxRecord, RepoError>;

    async fn update_domain(
        &self,
        account: &AccountId,
        domain_id: Uuid,
        update: &DomainUpdate,
    ) -> Result<DomainRecord, RepoError>;

    /// Mark a paid order fulfilled and activate what it provisioned.
    async fn fulfill_order(
        &self,
        account: &AccountId,
        order_id: Uuid,
    ) -> Result<FulfilledOrder, RepoError>;

    async fn ping(&self) -> Result<(), RepoError>;
}
