//! Records returned by the account-scoped read queries.
//!
//! These are the values the compute cache stores, so they must round-trip
//! through JSON without loss.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::accounts::AccountId;
use super::types::ProvisioningStatus;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboxRecord {
    pub id: Uuid,
    pub address: String,
    pub display_name: Option<String>,
    pub domain: String,
    pub status: ProvisioningStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainRecord {
    pub id: Uuid,
    pub name: String,
    pub forwarding_url: Option<String>,
    pub status: ProvisioningStatus,
    pub inbox_count: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Aggregate counters shown on the account dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub account_id: AccountId,
    pub total_inboxes: i64,
    pub active_inboxes: i64,
    pub total_domains: i64,
    pub active_domains: i64,
    pub pending_orders: i64,
}

/// Outcome of fulfilling one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FulfilledOrder {
    pub order_id: Uuid,
    pub inboxes_activated: i64,
    pub domains_activated: i64,
}
