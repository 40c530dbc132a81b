//! # Product Repository
//!
//! Database operations for voucher types.
//!
//! ## Key Operations
//! - Create and update with price validation
//! - Listing per organization, with or without inactive products
//! - Soft deactivation
//!
//! Inactive products are still loaded into report snapshots so historical
//! sales keep their names and prices in the per-product breakdown.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use mitra_core::validation::{validate_duration_hours, validate_name, validate_prices};
use mitra_core::{Money, Product};

const PRODUCT_COLUMNS: &str = "id, organization_id, name, cost_price, sale_price, \
     duration_hours, is_active, created_at, updated_at";

/// Repository for product database operations.
///
/// ## Usage
/// ```rust,ignore
/// let repo = ProductRepository::new(pool);
///
/// let voucher = repo
///     .create(&org_id, "Voucher 1 Hari", Money::from_minor(1_000), Money::from_minor(1_500), Some(24))
///     .await?;
/// let all = repo.list(&org_id, false).await?;
/// ```
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Creates an active product for an organization.
    pub async fn create(
        &self,
        organization_id: &str,
        name: &str,
        cost_price: Money,
        sale_price: Money,
        duration_hours: Option<i64>,
    ) -> DbResult<Product> {
        let now = Utc::now();
        self.insert(&Product {
            id: generate_product_id(),
            organization_id: organization_id.to_string(),
            name: name.trim().to_string(),
            cost_price,
            sale_price,
            duration_hours,
            is_active: true,
            created_at: now,
            updated_at: now,
        })
        .await
    }

    /// Inserts a new product.
    ///
    /// ## Returns
    /// * `Ok(Product)` - Inserted product
    /// * `Err(DbError::Core(Validation))` - blank name, negative price,
    ///   sale price below cost or non-positive duration
    pub async fn insert(&self, product: &Product) -> DbResult<Product> {
        validate_product(product)?;

        debug!(id = %product.id, name = %product.name, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, organization_id, name, cost_price, sale_price,
                duration_hours, is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&product.id)
        .bind(&product.organization_id)
        .bind(&product.name)
        .bind(product.cost_price)
        .bind(product.sale_price)
        .bind(product.duration_hours)
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(product.clone())
    }

    /// Updates name, prices, duration and the active flag.
    ///
    /// Past sales keep the totals they were recorded with; only new sales
    /// see new prices.
    ///
    /// ## Returns
    /// * `Ok(())` - Update successful
    /// * `Err(DbError::NotFound)` - Product doesn't exist
    pub async fn update(&self, product: &Product) -> DbResult<()> {
        validate_product(product)?;

        debug!(id = %product.id, "Updating product");

        let result = sqlx::query(
            r#"
            UPDATE products SET
                name = ?2,
                cost_price = ?3,
                sale_price = ?4,
                duration_hours = ?5,
                is_active = ?6,
                updated_at = ?7
            WHERE id = ?1
            "#,
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(product.cost_price)
        .bind(product.sale_price)
        .bind(product.duration_hours)
        .bind(product.is_active)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", &product.id));
        }

        Ok(())
    }

    /// Gets a product by its ID.
    ///
    /// ## Returns
    /// * `Ok(Some(Product))` - Product found
    /// * `Ok(None)` - Product not found
    pub async fn get(&self, id: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {} FROM products WHERE id = ?1",
            PRODUCT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Lists an organization's products by name.
    pub async fn list(&self, organization_id: &str, include_inactive: bool) -> DbResult<Vec<Product>> {
        let sql = if include_inactive {
            format!(
                "SELECT {} FROM products WHERE organization_id = ?1 ORDER BY name, id",
                PRODUCT_COLUMNS
            )
        } else {
            format!(
                "SELECT {} FROM products WHERE organization_id = ?1 AND is_active = 1 ORDER BY name, id",
                PRODUCT_COLUMNS
            )
        };

        let products = sqlx::query_as::<_, Product>(&sql)
            .bind(organization_id)
            .fetch_all(&self.pool)
            .await?;

        debug!(count = products.len(), include_inactive, "Products listed");
        Ok(products)
    }

    /// Soft-deletes a product by setting is_active = false.
    ///
    /// Historical sales still reference it, so rows are never removed.
    pub async fn deactivate(&self, id: &str) -> DbResult<()> {
        debug!(id = %id, "Deactivating product");

        let result = sqlx::query("UPDATE products SET is_active = 0, updated_at = ?2 WHERE id = ?1")
            .bind(id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        Ok(())
    }
}

fn validate_product(product: &Product) -> DbResult<()> {
    validate_name(&product.name)?;
    validate_prices(product.cost_price, product.sale_price)?;
    validate_duration_hours(product.duration_hours)?;
    Ok(())
}

/// Helper to generate a new product ID.
pub fn generate_product_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Unit Tests
// =============================================================================
