//! # Sale Repository
//!
//! Database operations for voucher sales.
//!
//! ## Recording a Sale
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sale Capture                                      │
//! │                                                                         │
//! │  record_sale(link, voucher, 10)                                        │
//! │       │                                                                 │
//! │       ├── link exists, is a link, is active                            │
//! │       ├── product exists in the link's organization                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Sale {                                                                │
//! │     total_cost    = cost_price × 10     ← frozen at sale time          │
//! │     total_revenue = sale_price × 10                                    │
//! │     partner_id, branch_id copied from the link                         │
//! │  }                                                                      │
//! │                                                                         │
//! │  Sales are immutable: there is no update and no delete.                │
//! │  Commission is NOT stored; it is resolved from the current rows        │
//! │  every time a report runs.                                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DbResult;
use crate::repository::entity::fetch_active_link;
use crate::repository::filter::push_record_filter;
use mitra_core::scope::RecordFilter;
use mitra_core::validation::{validate_quantity, validate_sale_record};
use mitra_core::{CoreError, Product, Sale};

const SALE_COLUMNS: &str = "id, organization_id, product_id, link_id, branch_id, partner_id, \
     quantity, total_cost, total_revenue, created_at";

/// Repository for sale database operations.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    /// Creates a new SaleRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// Records a sale made now.
    pub async fn record_sale(&self, link_id: &str, product_id: &str, quantity: i64) -> DbResult<Sale> {
        self.record_sale_at(link_id, product_id, quantity, Utc::now()).await
    }

    /// Records a sale with an explicit timestamp (imports, backfills).
    ///
    /// ## Errors
    /// * `DbError::Core(Validation)` - quantity outside 1..=10.000
    /// * `DbError::Core(EntityNotFound | NotALink | InactiveEntity)` - bad link
    /// * `DbError::Core(ProductNotFound)` - product not in the organization
    pub async fn record_sale_at(
        &self,
        link_id: &str,
        product_id: &str,
        quantity: i64,
        created_at: DateTime<Utc>,
    ) -> DbResult<Sale> {
        validate_quantity(quantity)?;

        let link = fetch_active_link(&self.pool, link_id).await?;

        let product = sqlx::query_as::<_, Product>(
            "SELECT id, organization_id, name, cost_price, sale_price, duration_hours, \
             is_active, created_at, updated_at FROM products WHERE id = ?1",
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?
        .filter(|p| p.organization_id == link.organization_id)
        .ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()))?;

        let sale = Sale {
            id: generate_sale_id(),
            organization_id: link.organization_id,
            product_id: product.id,
            link_id: link.id,
            branch_id: link.branch_id,
            partner_id: link.partner_id,
            quantity,
            total_cost: product.cost_price.multiply_quantity(quantity),
            total_revenue: product.sale_price.multiply_quantity(quantity),
            created_at,
        };

        self.insert(&sale).await?;

        info!(
            id = %sale.id,
            link_id = %sale.link_id,
            quantity,
            total_revenue = %sale.total_revenue,
            "Sale recorded"
        );
        Ok(sale)
    }

    /// Inserts a sale as-is (used by imports).
    pub async fn insert(&self, sale: &Sale) -> DbResult<()> {
        validate_sale_record(sale)?;

        debug!(id = %sale.id, link_id = %sale.link_id, "Inserting sale");

        sqlx::query(
            r#"
            INSERT INTO sales (
                id, organization_id, product_id, link_id, branch_id, partner_id,
                quantity, total_cost, total_revenue, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&sale.id)
        .bind(&sale.organization_id)
        .bind(&sale.product_id)
        .bind(&sale.link_id)
        .bind(&sale.branch_id)
        .bind(&sale.partner_id)
        .bind(sale.quantity)
        .bind(sale.total_cost)
        .bind(sale.total_revenue)
        .bind(sale.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets a sale by ID.
    pub async fn get(&self, id: &str) -> DbResult<Option<Sale>> {
        let sale = sqlx::query_as::<_, Sale>(&format!("SELECT {} FROM sales WHERE id = ?1", SALE_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(sale)
    }

    /// Lists the sales `filter` admits, oldest first.
    ///
    /// Every period is served from this list, so no date predicate is
    /// applied here.
    pub async fn list(&self, filter: &RecordFilter) -> DbResult<Vec<Sale>> {
        fetch_sales(&self.pool, filter).await
    }
}

/// Fetches scoped sales through any executor (pool or open transaction).
pub(crate) async fn fetch_sales<'e, E>(executor: E, filter: &RecordFilter) -> DbResult<Vec<Sale>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM sales", SALE_COLUMNS));
    push_record_filter(&mut qb, filter, true);
    qb.push(" ORDER BY created_at, id");

    let sales = qb.build_query_as::<Sale>().fetch_all(executor).await?;

    debug!(count = sales.len(), "Sales fetched");
    Ok(sales)
}

/// Generates a new sale ID.
pub fn generate_sale_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Unit Tests
// =============================================================================
