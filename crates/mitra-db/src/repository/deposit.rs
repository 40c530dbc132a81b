//! # Deposit Repository
//!
//! Records money remitted by links, guarded against overpayment.
//!
//! ## Deposit Guard
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    record_deposit(l1, 15.000)                           │
//! │                                                                         │
//! │  BEGIN                                                                  │
//! │   ├── link exists, is a link, is active                                │
//! │   ├── all sales of l1          ┐                                       │
//! │   ├── all deposits of l1       ├── same transaction                    │
//! │   ├── commission rows          ┘                                       │
//! │   │                                                                     │
//! │   ▼                                                                     │
//! │  Books::live_settlement(l1)   billed 27.000, deposited 15.000          │
//! │   │                           outstanding 12.000                        │
//! │   ▼                                                                     │
//! │  check_deposit(15.000) ──► DepositExceedsOutstanding  (ROLLBACK)       │
//! │  check_deposit(12.000) ──► INSERT deposit             (COMMIT)         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The balance is always the link's all-time balance, whatever period a
//! report screen happens to be showing.
//!
//! SQLite allows one writer at a time. Two guards racing on the same link
//! both read inside their transaction; the second one to write fails with a
//! busy error instead of committing a stale decision.

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::DbResult;
use crate::repository::commission::fetch_commissions;
use crate::repository::entity::fetch_active_link;
use crate::repository::filter::push_record_filter;
use crate::repository::sale::fetch_sales;
use mitra_core::report::Books;
use mitra_core::scope::{RecordFilter, Scope, Selection};
use mitra_core::settlement::{check_deposit, Settlement};
use mitra_core::validation::validate_note;
use mitra_core::{Deposit, Entity, Money};

const DEPOSIT_COLUMNS: &str = "id, organization_id, link_id, branch_id, partner_id, amount, \
     note, recorded_by, remitted_at, billed_before, outstanding_before, created_at";

/// Input for a new deposit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDeposit {
    pub link_id: String,
    pub amount: Money,
    pub note: Option<String>,
    /// Entity id of whoever typed the deposit in.
    pub recorded_by: Option<String>,
    /// Date written on the transfer slip, if any.
    pub remitted_at: Option<DateTime<Utc>>,
}

impl NewDeposit {
    pub fn new(link_id: impl Into<String>, amount: Money) -> Self {
        NewDeposit {
            link_id: link_id.into(),
            amount,
            note: None,
            recorded_by: None,
            remitted_at: None,
        }
    }
}

/// Repository for deposits.
#[derive(Debug, Clone)]
pub struct DepositRepository {
    pool: SqlitePool,
}

impl DepositRepository {
    /// Creates a new DepositRepository.
    pub fn new(pool: SqlitePool) -> Self {
        DepositRepository { pool }
    }

    /// Records a deposit made now.
    pub async fn record_deposit(&self, deposit: NewDeposit) -> DbResult<Deposit> {
        self.record_deposit_at(deposit, Utc::now()).await
    }

    /// Records a deposit with an explicit `created_at`.
    ///
    /// ## Errors
    /// * `DbError::Core(Validation)` - amount not positive, note too long
    /// * `DbError::Core(EntityNotFound | NotALink | InactiveEntity)` - bad link
    /// * `DbError::Core(DepositExceedsOutstanding)` - amount above what the
    ///   link owes right now
    pub async fn record_deposit_at(
        &self,
        deposit: NewDeposit,
        created_at: DateTime<Utc>,
    ) -> DbResult<Deposit> {
        let note = validate_note(deposit.note.as_deref())?;

        let mut tx = self.pool.begin().await?;

        let link = fetch_active_link(&mut *tx, &deposit.link_id).await?;
        let live = settlement_of(&mut *tx, &link).await?;

        if let Err(err) = check_deposit(deposit.amount, &live) {
            warn!(
                link_id = %link.id,
                requested = %deposit.amount,
                outstanding = %live.outstanding,
                "Deposit rejected"
            );
            return Err(err.into());
        }

        let record = Deposit {
            id: generate_deposit_id(),
            organization_id: link.organization_id,
            link_id: link.id,
            branch_id: link.branch_id,
            partner_id: link.partner_id,
            amount: deposit.amount,
            note,
            recorded_by: deposit.recorded_by,
            remitted_at: deposit.remitted_at,
            billed_before: Some(live.billed),
            outstanding_before: Some(live.outstanding),
            created_at,
        };

        sqlx::query(
            r#"
            INSERT INTO deposits (
                id, organization_id, link_id, branch_id, partner_id,
                amount, note, recorded_by, remitted_at,
                billed_before, outstanding_before, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&record.id)
        .bind(&record.organization_id)
        .bind(&record.link_id)
        .bind(&record.branch_id)
        .bind(&record.partner_id)
        .bind(record.amount)
        .bind(&record.note)
        .bind(&record.recorded_by)
        .bind(record.remitted_at)
        .bind(record.billed_before)
        .bind(record.outstanding_before)
        .bind(record.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            id = %record.id,
            link_id = %record.link_id,
            amount = %record.amount,
            outstanding_after = %(live.outstanding - record.amount),
            "Deposit recorded"
        );
        Ok(record)
    }

    /// The link's all-time settlement as the guard sees it.
    pub async fn live_settlement(&self, link_id: &str) -> DbResult<Settlement> {
        let mut conn = self.pool.acquire().await?;
        let link = fetch_active_link(&mut *conn, link_id).await?;
        settlement_of(&mut *conn, &link).await
    }

    /// Lists the deposits `filter` admits, oldest first.
    pub async fn list(&self, filter: &RecordFilter) -> DbResult<Vec<Deposit>> {
        fetch_deposits(&self.pool, filter).await
    }
}

/// Computes a link's live settlement from rows read through `conn`.
async fn settlement_of(conn: &mut SqliteConnection, link: &Entity) -> DbResult<Settlement> {
    let filter = RecordFilter::new(
        Scope::unrestricted(link.organization_id.as_str()),
        Selection::link(link.id.as_str()),
    );

    let sales = fetch_sales(&mut *conn, &filter).await?;
    let deposits = fetch_deposits(&mut *conn, &filter).await?;
    let commissions = fetch_commissions(&mut *conn, &link.organization_id).await?;

    let books = Books::new(
        link.organization_id.as_str(),
        vec![link.clone()],
        Vec::new(),
        commissions,
        sales,
        deposits,
    );
    Ok(books.live_settlement(&link.id))
}

/// Fetches scoped deposits through any executor.
pub(crate) async fn fetch_deposits<'e, E>(executor: E, filter: &RecordFilter) -> DbResult<Vec<Deposit>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM deposits", DEPOSIT_COLUMNS));
    push_record_filter(&mut qb, filter, false);
    qb.push(" ORDER BY created_at, id");

    let deposits = qb.build_query_as::<Deposit>().fetch_all(executor).await?;

    debug!(count = deposits.len(), "Deposits fetched");
    Ok(deposits)
}

/// Generates a new deposit ID.
pub fn generate_deposit_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::repository::fixtures::hierarchy;
    use mitra_core::commission::CommissionRates;
    use mitra_core::settlement::SettlementStatus;
    use mitra_core::{Actor, CoreError, Rate};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_partial_deposits_until_settled() {
        let h = hierarchy().await;
        h.db.sales().record_sale(&h.l1.id, &h.voucher.id, 10).await.unwrap();
        let repo = h.db.deposits();

        let live = repo.live_settlement(&h.l1.id).await.unwrap();
        assert_eq!(live.billed, Money::from_minor(15_000));
        assert_eq!(live.outstanding, Money::from_minor(15_000));

        repo.record_deposit(NewDeposit::new(h.l1.id.clone(), Money::from_minor(10_000)))
            .await
            .unwrap();
        let live = repo.live_settlement(&h.l1.id).await.unwrap();
        assert_eq!(live.outstanding, Money::from_minor(5_000));
        assert_eq!(live.status, SettlementStatus::Outstanding);

        let last = repo
            .record_deposit(NewDeposit::new(h.l1.id.clone(), Money::from_minor(5_000)))
            .await
            .unwrap();
        assert_eq!(last.billed_before, Some(Money::from_minor(15_000)));
        assert_eq!(last.outstanding_before, Some(Money::from_minor(5_000)));

        let filter = RecordFilter::for_actor(&Actor::for_entity(&h.org));
        let stored = repo.list(&filter).await.unwrap();
        assert_eq!(stored.len(), 2);
        let (latest, first): (Vec<_>, Vec<_>) = stored.into_iter().partition(|d| d.id == last.id);
        assert_eq!(latest, vec![last]);
        assert_eq!(first[0].outstanding_before, Some(Money::from_minor(15_000)));

        let live = repo.live_settlement(&h.l1.id).await.unwrap();
        assert_eq!(live.outstanding, Money::zero());
        assert_eq!(live.status, SettlementStatus::Settled);
        assert_eq!(live.deposit_count, 2);
    }

    #[tokio::test]
    async fn test_overpayment_is_rejected_and_not_stored() {
        let h = hierarchy().await;
        h.db.commissions()
            .save(
                &h.org.id,
                &h.voucher.id,
                None,
                None,
                CommissionRates {
                    link_commission: Rate::from_percent(5),
                    branch_commission: Rate::zero(),
                    partner_commission: Rate::zero(),
                    link_share: Money::from_minor(50),
                    branch_share: Money::zero(),
                },
            )
            .await
            .unwrap();
        h.db.sales().record_sale(&h.l1.id, &h.voucher.id, 10).await.unwrap();

        // Link keeps 10 × 50 + 5% of 10.000 = 1.000 and owes 14.000.
        let err = h
            .db
            .deposits()
            .record_deposit(NewDeposit::new(h.l1.id.clone(), Money::from_minor(14_001)))
            .await
            .unwrap_err();
        match err {
            DbError::Core(CoreError::DepositExceedsOutstanding { outstanding, requested, .. }) => {
                assert_eq!(outstanding, Money::from_minor(14_000));
                assert_eq!(requested, Money::from_minor(14_001));
            }
            other => panic!("unexpected error: {other}"),
        }

        let filter = RecordFilter::for_actor(&Actor::for_entity(&h.org));
        assert!(h.db.deposits().list(&filter).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_deposits() {
        let h = hierarchy().await;
        h.db.sales().record_sale(&h.l1.id, &h.voucher.id, 1).await.unwrap();
        let repo = h.db.deposits();

        let err = repo
            .record_deposit(NewDeposit::new(h.l1.id.clone(), Money::zero()))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::Validation(_))));

        let err = repo
            .record_deposit(NewDeposit::new(h.b1.id.clone(), Money::from_minor(100)))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::NotALink { .. })));

        // Nothing owed, nothing accepted.
        let err = repo
            .record_deposit(NewDeposit::new(h.l2.id.clone(), Money::from_minor(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::DepositExceedsOutstanding { .. })));
    }

    #[tokio::test]
    async fn test_deposit_copies_link_parents_and_note() {
        let h = hierarchy().await;
        h.db.sales().record_sale(&h.l3.id, &h.voucher.id, 2).await.unwrap();

        let mut new = NewDeposit::new(h.l3.id.clone(), Money::from_minor(1_000));
        new.note = Some("  transfer BCA  ".to_string());
        new.recorded_by = Some(h.org.id.clone());
        let deposit = h.db.deposits().record_deposit(new).await.unwrap();

        assert_eq!(deposit.partner_id.as_deref(), Some(h.p2.id.as_str()));
        assert_eq!(deposit.branch_id.as_deref(), Some(h.b2.id.as_str()));
        assert_eq!(deposit.note.as_deref(), Some("transfer BCA"));

        let partner = RecordFilter::for_actor(&Actor::for_entity(&h.p2));
        assert_eq!(h.db.deposits().list(&partner).await.unwrap(), vec![deposit]);

        let other = RecordFilter::for_actor(&Actor::for_entity(&h.p1));
        assert!(h.db.deposits().list(&other).await.unwrap().is_empty());
    }
}
