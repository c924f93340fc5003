use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{AccountsRepo, DomainUpdate, InboxUpdate, RepoError};
use crate::domain::accounts::AccountId;
use crate::domain::entities::{DashboardSummary, DomainRecord, FulfilledOrder, InboxRecord};
use crate::domain::types::ProvisioningStatus;

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct InboxRow {
    id: Uuid,
    address: String,
    display_name: Option<String>,
    domain: String,
    status: ProvisioningStatus,
    created_at: OffsetDateTime,
}

impl From<InboxRow> for InboxRecord {
    fn from(row: InboxRow) -> Self {
        Self {
            id: row.id,
            address: row.address,
            display_name: row.display_name,
            domain: row.domain,
            status: row.status,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct DomainRow {
    id: Uuid,
    name: String,
    forwarding_url: Option<String>,
    status: ProvisioningStatus,
    inbox_count: i64,
    created_at: OffsetDateTime,
}

impl From<DomainRow> for DomainRecord {
    fn from(row: DomainRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            forwarding_url: row.forwarding_url,
            status: row.status,
            inbox_count: row.inbox_count,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct DashboardRow {
    total_inboxes: i64,
    active_inboxes: i64,
    total_domains: i64,
    active_domains: i64,
    pending_orders: i64,
}

const INBOX_COLUMNS: &str = "i.id, i.address, i.display_name, d.name AS domain, i.status, i.created_at";

const DOMAIN_SELECT: &str = r#"
    SELECT d.id, d.name, d.forwarding_url, d.status, d.created_at,
           (SELECT COUNT(*) FROM inboxes i WHERE i.domain_id = d.id) AS inbox_count
    FROM domains d
"#;

#[async_trait]
impl AccountsRepo for PostgresRepositories {
    async fn dashboard_summary(&self, account: &AccountId) -> Result<DashboardSummary, RepoError> {
        let row = sqlx::query_as::<_, DashboardRow>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM inboxes WHERE account_id = $1) AS total_inboxes,
                (SELECT COUNT(*) FROM inboxes
                    WHERE account_id = $1 AND status = 'active'::provisioning_status) AS active_inboxes,
                (SELECT COUNT(*) FROM domains WHERE account_id = $1) AS total_domains,
                (SELECT COUNT(*) FROM domains
                    WHERE account_id = $1 AND status = 'active'::provisioning_status) AS active_domains,
                (SELECT COUNT(*) FROM orders
                    WHERE account_id = $1 AND fulfilled_at IS NULL) AS pending_orders
            "#,
        )
        .bind(account.as_str())
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(DashboardSummary {
            account_id: account.clone(),
            total_inboxes: row.total_inboxes,
            active_inboxes: row.active_inboxes,
            total_domains: row.total_domains,
            active_domains: row.active_domains,
            pending_orders: row.pending_orders,
        })
    }

    async fn list_inboxes(&self, account: &AccountId) -> Result<Vec<InboxRecord>, RepoError> {
        let sql = format!(
            "SELECT {INBOX_COLUMNS} FROM inboxes i \
             INNER JOIN domains d ON d.id = i.domain_id \
             WHERE i.account_id = $1 \
             ORDER BY i.created_at DESC, i.id"
        );
        let rows = sqlx::query_as::<_, InboxRow>(&sql)
            .bind(account.as_str())
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(InboxRecord::from).collect())
    }

    async fn list_domains(&self, account: &AccountId) -> Result<Vec<DomainRecord>, RepoError> {
        let sql = format!("{DOMAIN_SELECT} WHERE d.account_id = $1 ORDER BY d.name, d.id");
        let rows = sqlx::query_as::<_, DomainRow>(&sql)
            .bind(account.as_str())
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(DomainRecord::from).collect())
    }

    async fn update_inbox(
        &self,
        account: &AccountId,
        inbox_id: Uuid,
        update: &InboxUpdate,
    ) -> Result<InboxRecord, RepoError> {
        let sql = format!(
            "WITH updated AS ( \
                UPDATE inboxes SET \
                    display_name = COALESCE($3, display_name), \
                    status = COALESCE($4, status) \
                WHERE id = $1 AND account_id = $2 \
                RETURNING * \
             ) \
             SELECT {INBOX_COLUMNS} FROM updated i \
             INNER JOIN domains d ON d.id = i.domain_id"
        );
        let row = sqlx::query_as::<_, InboxRow>(&sql)
            .bind(inbox_id)
            .bind(account.as_str())
            .bind(update.display_name.as_deref())
            .bind(update.status)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?
            .ok_or(RepoError::NotFound)?;

        Ok(InboxRecord::from(row))
    }

    async fn update_domain(
        &self,
        account: &AccountId,
        domain_id: Uuid,
        update: &DomainUpdate,
    ) -> Result<DomainRecord, RepoError> {
        let updated = sqlx::query(
            r#"
            UPDATE domains SET
                forwarding_url = COALESCE($3, forwarding_url),
                status = COALESCE($4, status)
            WHERE id = $1 AND account_id = $2
            "#,
        )
        .bind(domain_id)
        .bind(account.as_str())
        .bind(update.forwarding_url.as_deref())
        .bind(update.status)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        if updated.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }

        let sql = format!("{DOMAIN_SELECT} WHERE d.id = $1");
        let row = sqlx::query_as::<_, DomainRow>(&sql)
            .bind(domain_id)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(DomainRecord::from(row))
    }

    async fn fulfill_order(
        &self,
        account: &AccountId,
        order_id: Uuid,
    ) -> Result<FulfilledOrder, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let claimed = sqlx::query(
            r#"
            UPDATE orders SET fulfilled_at = now()
            WHERE id = $1 AND account_id = $2 AND fulfilled_at IS NULL
            "#,
        )
        .bind(order_id)
        .bind(account.as_str())
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        if claimed.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }

        let domains = sqlx::query(
            r#"
            UPDATE domains SET status = 'active'::provisioning_status
            WHERE order_id = $1 AND status = 'pending'::provisioning_status
            "#,
        )
        .bind(order_id)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let inboxes = sqlx::query(
            r#"
            UPDATE inboxes SET status = 'active'::provisioning_status
            WHERE order_id = $1 AND status = 'pending'::provisioning_status
            "#,
        )
        .bind(order_id)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(FulfilledOrder {
            order_id,
            inboxes_activated: i64::try_from(inboxes.rows_affected()).unwrap_or(i64::MAX),
            domains_activated: i64::try_from(domains.rows_affected()).unwrap_or(i64::MAX),
        })
    }

    async fn ping(&self) -> Result<(), RepoError> {
        self.health_check().await.map_err(map_sqlx_error)
    }
}
