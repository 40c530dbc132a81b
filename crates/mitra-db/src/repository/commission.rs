//! # Commission Repository
//!
//! Stores commission rows keyed by `(organization, product, partner?, branch?)`.
//!
//! ## Save Is an Upsert
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  save(org, voucher, Some(p1), None, rates)                             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  BEGIN                                                                  │
//! │  SELECT id FROM commission_configs                                     │
//! │   WHERE product_id = ? AND partner_id IS ? AND branch_id IS ?          │
//! │       │                                                                 │
//! │       ├── found ──► UPDATE rates (id and created_at kept)              │
//! │       └── none  ──► INSERT new row                                     │
//! │  COMMIT                                                                 │
//! │                                                                         │
//! │  `IS` matches NULL against NULL, so the global default row (no         │
//! │  partner, no branch) is found like any other key.                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::entity::fetch_entity;
use mitra_core::commission::{CommissionRates, CommissionTable};
use mitra_core::validation::validate_commission_config;
use mitra_core::{CommissionConfig, CoreError, Tier};

const COMMISSION_COLUMNS: &str = "id, organization_id, product_id, partner_id, branch_id, \
     link_commission, branch_commission, partner_commission, link_share, branch_share, \
     created_at, updated_at";

/// Repository for commission configuration rows.
#[derive(Debug, Clone)]
pub struct CommissionRepository {
    pool: SqlitePool,
}

impl CommissionRepository {
    /// Creates a new CommissionRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CommissionRepository { pool }
    }

    /// Saves the rates for a key, replacing any row already stored for it.
    ///
    /// Pass `None` for both `partner_id` and `branch_id` to set the
    /// product's global default.
    pub async fn save(
        &self,
        organization_id: &str,
        product_id: &str,
        partner_id: Option<&str>,
        branch_id: Option<&str>,
        rates: CommissionRates,
    ) -> DbResult<CommissionConfig> {
        let now = Utc::now();
        self.upsert(&CommissionConfig {
            id: Uuid::new_v4().to_string(),
            organization_id: organization_id.to_string(),
            product_id: product_id.to_string(),
            partner_id: partner_id.map(str::to_string),
            branch_id: branch_id.map(str::to_string),
            link_commission: rates.link_commission,
            branch_commission: rates.branch_commission,
            partner_commission: rates.partner_commission,
            link_share: rates.link_share,
            branch_share: rates.branch_share,
            created_at: now,
            updated_at: now,
        })
        .await
    }

    /// Inserts `config`, or updates the row with the same key.
    ///
    /// ## Returns
    /// The stored row. When a row already existed its id and `created_at`
    /// are kept.
    ///
    /// ## Errors
    /// * `DbError::Core(Validation)` - a rate above 100% or a negative share
    /// * `DbError::Core(ProductNotFound)` - product not in the organization
    /// * `DbError::Core(InconsistentHierarchy)` - partner or branch id of
    ///   the wrong tier, or a branch outside the given partner
    pub async fn upsert(&self, config: &CommissionConfig) -> DbResult<CommissionConfig> {
        validate_commission_config(config)?;

        let mut tx = self.pool.begin().await?;
        check_key(&mut tx, config).await?;

        let existing = sqlx::query_as::<_, (String, DateTime<Utc>)>(
            r#"
            SELECT id, created_at FROM commission_configs
            WHERE organization_id = ?1
              AND product_id = ?2
              AND partner_id IS ?3
              AND branch_id IS ?4
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(&config.organization_id)
        .bind(&config.product_id)
        .bind(&config.partner_id)
        .bind(&config.branch_id)
        .fetch_optional(&mut *tx)
        .await?;

        let stored = match existing {
            Some((id, created_at)) => {
                let updated_at = Utc::now();
                sqlx::query(
                    r#"
                    UPDATE commission_configs SET
                        link_commission = ?2,
                        branch_commission = ?3,
                        partner_commission = ?4,
                        link_share = ?5,
                        branch_share = ?6,
                        updated_at = ?7
                    WHERE id = ?1
                    "#,
                )
                .bind(&id)
                .bind(config.link_commission)
                .bind(config.branch_commission)
                .bind(config.partner_commission)
                .bind(config.link_share)
                .bind(config.branch_share)
                .bind(updated_at)
                .execute(&mut *tx)
                .await?;

                debug!(id = %id, product_id = %config.product_id, "Commission row updated");
                CommissionConfig {
                    id,
                    created_at,
                    updated_at,
                    ..config.clone()
                }
            }
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO commission_configs (
                        id, organization_id, product_id, partner_id, branch_id,
                        link_commission, branch_commission, partner_commission,
                        link_share, branch_share, created_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                    "#,
                )
                .bind(&config.id)
                .bind(&config.organization_id)
                .bind(&config.product_id)
                .bind(&config.partner_id)
                .bind(&config.branch_id)
                .bind(config.link_commission)
                .bind(config.branch_commission)
                .bind(config.partner_commission)
                .bind(config.link_share)
                .bind(config.branch_share)
                .bind(config.created_at)
                .bind(config.updated_at)
                .execute(&mut *tx)
                .await?;

                debug!(id = %config.id, product_id = %config.product_id, "Commission row inserted");
                config.clone()
            }
        };

        tx.commit().await?;

        info!(
            product_id = %stored.product_id,
            partner_id = ?stored.partner_id,
            branch_id = ?stored.branch_id,
            "Commission saved"
        );
        Ok(stored)
    }

    /// Deletes a commission row. Sales it priced fall back to the next
    /// less specific row.
    pub async fn delete(&self, id: &str) -> DbResult<()> {
        debug!(id = %id, "Deleting commission row");

        let result = sqlx::query("DELETE FROM commission_configs WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("CommissionConfig", id));
        }

        Ok(())
    }

    /// Lists every row of an organization.
    pub async fn list(&self, organization_id: &str) -> DbResult<Vec<CommissionConfig>> {
        fetch_commissions(&self.pool, organization_id).await
    }

    /// Loads an organization's rows into a resolver table.
    pub async fn table(&self, organization_id: &str) -> DbResult<CommissionTable> {
        Ok(CommissionTable::new(self.list(organization_id).await?))
    }
}

/// Fetches an organization's commission rows through any executor.
pub(crate) async fn fetch_commissions<'e, E>(
    executor: E,
    organization_id: &str,
) -> DbResult<Vec<CommissionConfig>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query_as::<_, CommissionConfig>(&format!(
        "SELECT {} FROM commission_configs WHERE organization_id = ?1 \
         ORDER BY product_id, created_at",
        COMMISSION_COLUMNS
    ))
    .bind(organization_id)
    .fetch_all(executor)
    .await?;

    Ok(rows)
}

/// Checks that the product and the optional partner/branch of a key belong
/// to the organization.
async fn check_key(tx: &mut Transaction<'_, Sqlite>, config: &CommissionConfig) -> DbResult<()> {
    let product_org: Option<String> =
        sqlx::query_scalar("SELECT organization_id FROM products WHERE id = ?1")
            .bind(&config.product_id)
            .fetch_optional(&mut **tx)
            .await?;
    if product_org.as_deref() != Some(config.organization_id.as_str()) {
        return Err(CoreError::ProductNotFound(config.product_id.clone()).into());
    }

    let mut branch_partner = None;
    for (id, tier) in [
        (config.partner_id.as_deref(), Tier::Partner),
        (config.branch_id.as_deref(), Tier::Branch),
    ] {
        let Some(id) = id else { continue };
        let entity = fetch_entity(&mut **tx, id)
            .await?
            .ok_or_else(|| CoreError::EntityNotFound(id.to_string()))?;
        if entity.tier != tier || entity.organization_id != config.organization_id {
            return Err(CoreError::InconsistentHierarchy {
                entity_id: id.to_string(),
                reason: format!("commission key expects a {} of this organization", tier),
            }
            .into());
        }
        if tier == Tier::Branch {
            branch_partner = entity.partner_id;
        }
    }

    if let (Some(partner_id), Some(_)) = (config.partner_id.as_deref(), config.branch_id.as_deref()) {
        if branch_partner.as_deref() != Some(partner_id) {
            return Err(CoreError::InconsistentHierarchy {
                entity_id: config.branch_id.clone().unwrap_or_default(),
                reason: "branch belongs to a different partner".to_string(),
            }
            .into());
        }
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures::hierarchy;
    use mitra_core::commission::Specificity;
    use mitra_core::{Money, Rate};

    fn rates(link_pct: u32) -> CommissionRates {
        CommissionRates {
            link_commission: Rate::from_percent(link_pct),
            branch_commission: Rate::from_percent(3),
            partner_commission: Rate::from_percent(2),
            link_share: Money::from_minor(50),
            branch_share: Money::zero(),
        }
    }

    #[tokio::test]
    async fn test_save_twice_keeps_one_row() {
        let h = hierarchy().await;
        let repo = h.db.commissions();

        let first = repo
            .save(&h.org.id, &h.voucher.id, None, None, rates(5))
            .await
            .unwrap();
        let second = repo
            .save(&h.org.id, &h.voucher.id, None, None, rates(7))
            .await
            .unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.created_at, first.created_at);

        let rows = repo.list(&h.org.id).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].link_commission, Rate::from_percent(7));
    }

    #[tokio::test]
    async fn test_table_resolves_most_specific_row() {
        let h = hierarchy().await;
        let repo = h.db.commissions();

        repo.save(&h.org.id, &h.voucher.id, None, None, rates(5)).await.unwrap();
        repo.save(&h.org.id, &h.voucher.id, Some(&h.p1.id), None, rates(6)).await.unwrap();
        repo.save(&h.org.id, &h.voucher.id, Some(&h.p1.id), Some(&h.b1.id), rates(8))
            .await
            .unwrap();

        let table = repo.table(&h.org.id).await.unwrap();
        assert_eq!(table.len(), 3);

        let exact = table.resolve(&h.voucher.id, Some(&h.p1.id), Some(&h.b1.id));
        assert_eq!(exact.specificity, Specificity::PartnerAndBranch);
        assert_eq!(exact.rates.link_commission, Rate::from_percent(8));

        let other = table.resolve(&h.voucher.id, Some(&h.p2.id), Some(&h.b2.id));
        assert_eq!(other.specificity, Specificity::Global);
    }

    #[tokio::test]
    async fn test_key_must_fit_hierarchy() {
        let h = hierarchy().await;
        let repo = h.db.commissions();

        let err = repo
            .save(&h.org.id, &h.voucher.id, Some(&h.p2.id), Some(&h.b1.id), rates(5))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::InconsistentHierarchy { .. })));

        let err = repo
            .save(&h.org.id, &h.voucher.id, Some(&h.b1.id), None, rates(5))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::InconsistentHierarchy { .. })));

        let err = repo
            .save(&h.org.id, "ghost", None, None, rates(5))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::ProductNotFound(_))));
    }

    #[tokio::test]
    async fn test_rate_above_hundred_percent_is_rejected() {
        let h = hierarchy().await;
        let mut bad = rates(5);
        bad.partner_commission = Rate::from_bps(10_001);

        let err = h
            .db
            .commissions()
            .save(&h.org.id, &h.voucher.id, None, None, bad)
            .await
            .unwrap_err();
        assert!(err.is_rule_violation());
    }

    #[tokio::test]
    async fn test_delete() {
        let h = hierarchy().await;
        let repo = h.db.commissions();
        let row = repo
            .save(&h.org.id, &h.voucher.id, None, Some(&h.b1.id), rates(5))
            .await
            .unwrap();

        repo.delete(&row.id).await.unwrap();
        assert!(repo.list(&h.org.id).await.unwrap().is_empty());
        assert!(matches!(repo.delete(&row.id).await, Err(DbError::NotFound { .. })));
    }
}
