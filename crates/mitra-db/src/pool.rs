//! # Database Pool Management
//!
//! Connection pool creation and repository access.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Database Connection Pool                           │
//! │                                                                         │
//! │  AppConfig::load() ──► db_config()                                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Database::new(config).await ← Create pool + run migrations            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────┐                           │
//! │  │            SqlitePool                    │                           │
//! │  │  ┌─────┐ ┌─────┐ ┌─────┐ ┌─────┐       │                           │
//! │  │  │Conn1│ │Conn2│ │Conn3│ │Conn4│ ...   │  (max_connections)        │
//! │  │  └─────┘ └─────┘ └─────┘ └─────┘       │                           │
//! │  └─────────────────────────────────────────┘                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  load_books(actor)                                                     │
//! │  ├── entities ──► Conn1 ┐                                              │
//! │  ├── products ──► Conn2 │                                              │
//! │  ├── commissions► Conn3 ├── tokio::try_join! ──► Books                 │
//! │  ├── sales ─────► Conn4 │                                              │
//! │  └── deposits ──► Conn5 ┘                                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## WAL Mode
//! WAL journaling lets the snapshot reads proceed while a deposit is being
//! written.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use mitra_core::report::Books;
use mitra_core::scope::{RecordFilter, Scope, Selection};
use mitra_core::Actor;

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::commission::CommissionRepository;
use crate::repository::deposit::DepositRepository;
use crate::repository::entity::EntityRepository;
use crate::repository::product::ProductRepository;
use crate::repository::sale::SaleRepository;

// =============================================================================
// Configuration
// =============================================================================

/// Database configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::new("/path/to/mitra.db")
///     .max_connections(5)
///     .min_connections(1);
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Path to the SQLite database file.
    pub database_path: PathBuf,

    /// Maximum number of connections in the pool.
    /// Default: 5 (one per concurrent snapshot read)
    pub max_connections: u32,

    /// Minimum number of connections to keep alive.
    /// Default: 1
    pub min_connections: u32,

    /// Connection timeout duration.
    /// Default: 30 seconds
    pub connect_timeout: Duration,

    /// Idle timeout before closing a connection.
    /// Default: 10 minutes
    pub idle_timeout: Duration,

    /// Whether to run migrations on connect.
    /// Default: true
    pub run_migrations: bool,
}

impl DbConfig {
    /// Creates a new database configuration with the given path.
    ///
    /// ## Arguments
    /// * `path` - Path to the SQLite database file. Will be created if it doesn't exist.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let config = DbConfig::new("./data/mitra.db");
    /// ```
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            run_migrations: true,
        }
    }

    /// Sets the maximum number of connections.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the minimum number of connections.
    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    /// Sets the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets whether to run migrations on connect.
    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    /// Creates an in-memory database configuration (for testing).
    ///
    /// ## Usage
    /// ```rust,ignore
    /// let config = DbConfig::in_memory();
    /// let db = Database::new(config).await?;
    /// // Database is isolated, perfect for tests
    /// ```
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(":memory:"),
            max_connections: 1, // In-memory requires single connection
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60),
            run_migrations: true,
        }
    }
}

// =============================================================================
// Database
// =============================================================================

/// Main database handle providing repository access.
///
/// Cheap to clone; every repository gets its own handle to the pool.
///
/// ## Usage
/// ```rust,ignore
/// let db = Database::new(config.db_config()).await?;
/// let books = db.load_books(&actor).await?;
/// let report = books.report(&actor, &request, &config.reporting, today)?;
/// ```
#[derive(Debug, Clone)]
pub struct Database {
    /// The SQLite connection pool.
    pool: SqlitePool,
}

impl Database {
    /// Creates a new database connection pool.
    ///
    /// ## What This Does
    /// 1. Creates the database file if it doesn't exist
    /// 2. Configures SQLite:
    ///    - WAL mode for concurrent reads
    ///    - NORMAL synchronous (balance of safety/speed)
    ///    - Foreign keys enabled
    /// 3. Creates the connection pool
    /// 4. Runs migrations (if enabled)
    ///
    /// ## Arguments
    /// * `config` - Database configuration
    ///
    /// ## Returns
    /// * `Ok(Database)` - Ready-to-use database handle
    /// * `Err(DbError)` - Connection or migration failed
    ///
    /// ## Example
    /// ```rust,ignore
    /// let config = DbConfig::new("./mitra.db");
    /// let db = Database::new(config).await?;
    /// ```
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(
            path = %config.database_path.display(),
            "Initializing database connection"
        );

        // mode=rwc creates the file when missing
        let connect_url = format!("sqlite://{}?mode=rwc", config.database_path.display());

        let connect_options = SqliteConnectOptions::from_str(&connect_url)
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            // Off by default in SQLite
            .foreign_keys(true)
            .create_if_missing(true);

        debug!("Connection options configured");

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        info!(
            max_connections = config.max_connections,
            "Database pool created"
        );

        let db = Database { pool };

        if config.run_migrations {
            db.run_migrations().await?;
        }

        Ok(db)
    }

    /// Runs database migrations.
    ///
    /// ## What This Does
    /// - Applies all pending migrations in order
    /// - Tracks applied migrations in `_sqlx_migrations` table
    /// - Idempotent: safe to run multiple times
    ///
    /// ## When To Call
    /// - Automatically called by `new()` if `run_migrations` is true
    /// - Manually call when migrations are disabled in config
    pub async fn run_migrations(&self) -> DbResult<()> {
        info!("Running database migrations");
        migrations::run_migrations(&self.pool).await?;
        info!("Migrations complete");
        Ok(())
    }

    /// Returns a reference to the connection pool.
    ///
    /// ## Usage
    /// For advanced queries not covered by repositories.
    /// Prefer using repository methods when available.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Returns the entity repository.
    pub fn entities(&self) -> EntityRepository {
        EntityRepository::new(self.pool.clone())
    }

    /// Returns the product repository.
    pub fn products(&self) -> ProductRepository {
        ProductRepository::new(self.pool.clone())
    }

    /// Returns the commission config repository.
    pub fn commissions(&self) -> CommissionRepository {
        CommissionRepository::new(self.pool.clone())
    }

    /// Returns the sale repository.
    pub fn sales(&self) -> SaleRepository {
        SaleRepository::new(self.pool.clone())
    }

    /// Returns the deposit repository.
    pub fn deposits(&self) -> DepositRepository {
        DepositRepository::new(self.pool.clone())
    }

    /// Loads everything `actor` may see into a [`Books`] snapshot.
    ///
    /// The five reads are independent and run concurrently. Sales and
    /// deposits are restricted by the actor's scope in SQL; period
    /// filtering is left to the engine so one snapshot serves every view.
    ///
    /// The entity directory holds the whole organization. Reports grouped
    /// by a tier above the actor need the actor's own branch and partner to
    /// resolve, and every listing of it goes through a scoped filter.
    pub async fn load_books(&self, actor: &Actor) -> DbResult<Books> {
        let filter = RecordFilter::for_actor(actor);
        let organization_id = actor.organization_id.as_str();
        let directory = RecordFilter::new(Scope::unrestricted(organization_id), Selection::default());

        let entities = self.entities();
        let products = self.products();
        let commissions = self.commissions();
        let sales = self.sales();
        let deposits = self.deposits();

        let (entities, products, commissions, sales, deposits) = tokio::try_join!(
            entities.list(&directory, None),
            products.list(organization_id, true),
            commissions.list(organization_id),
            sales.list(&filter),
            deposits.list(&filter),
        )?;

        info!(
            actor = %actor.id,
            role = %actor.role,
            entities = entities.len(),
            sales = sales.len(),
            deposits = deposits.len(),
            "Books loaded"
        );

        Ok(Books::new(
            organization_id,
            entities,
            products,
            commissions,
            sales,
            deposits,
        ))
    }

    /// Closes the database connection pool.
    ///
    /// After calling close, all repository operations will fail.
    pub async fn close(&self) {
        info!("Closing database connection pool");
        self.pool.close().await;
    }

    /// Checks if the database is healthy (can execute queries).
    ///
    /// ## Returns
    /// * `true` - Database is responsive
    /// * `false` - Database is unavailable
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .is_ok()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_database() {
        let config = DbConfig::in_memory();
        let db = Database::new(config).await.unwrap();

        assert!(db.health_check().await);
    }

    #[tokio::test]
    async fn test_config_builder() {
        let config = DbConfig::new("/tmp/test.db")
            .max_connections(10)
            .min_connections(2);

        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 2);
    }

    #[tokio::test]
    async fn test_load_books_is_scoped_to_actor() {
        use crate::repository::deposit::NewDeposit;
        use crate::repository::fixtures::hierarchy;
        use mitra_core::{Money, Tier};

        let h = hierarchy().await;
        h.db.sales().record_sale(&h.l1.id, &h.voucher.id, 4).await.unwrap();
        h.db.sales().record_sale(&h.l3.id, &h.voucher.id, 2).await.unwrap();
        h.db.deposits()
            .record_deposit(NewDeposit::new(h.l1.id.clone(), Money::from_minor(1_000)))
            .await
            .unwrap();

        let owner = h.db.load_books(&Actor::for_entity(&h.org)).await.unwrap();
        assert_eq!(owner.organization_id, h.org.id);
        assert_eq!(owner.entities.len(), 8);
        assert_eq!(owner.products.len(), 1);
        assert_eq!(owner.sales.len(), 2);
        assert_eq!(owner.deposits.len(), 1);

        let partner = h.db.load_books(&Actor::for_entity(&h.p2)).await.unwrap();
        assert_eq!(partner.sales.len(), 1);
        assert_eq!(partner.sales[0].link_id, h.l3.id);
        assert!(partner.deposits.is_empty());
        let visible_links: Vec<&str> = partner
            .entities
            .list(Tier::Link, &RecordFilter::for_actor(&Actor::for_entity(&h.p2)))
            .into_iter()
            .map(|e| e.id.as_str())
            .collect();
        assert_eq!(visible_links, vec![h.l3.id.as_str()]);

        // The owner's live view of l1 matches what the deposit guard sees.
        let live = h.db.deposits().live_settlement(&h.l1.id).await.unwrap();
        assert_eq!(owner.live_settlement(&h.l1.id), live);
        assert_eq!(live.outstanding, Money::from_minor(5_000));
    }

    #[tokio::test]
    async fn test_reports_group_by_tiers_above_the_actor() {
        use crate::repository::fixtures::hierarchy;
        use chrono::Utc;
        use mitra_core::aggregate::GroupBy;
        use mitra_core::period::today_in;
        use mitra_core::report::{ReportOptions, ReportRequest};
        use mitra_core::UNKNOWN_GROUP;

        let h = hierarchy().await;
        h.db.sales().record_sale(&h.l1.id, &h.voucher.id, 4).await.unwrap();
        h.db.sales().record_sale(&h.l2.id, &h.voucher.id, 1).await.unwrap();

        let options = ReportOptions::default();
        let today = today_in(options.offset().unwrap(), Utc::now());
        let rows = |actor: Actor, group_by: GroupBy| {
            let db = h.db.clone();
            let options = options.clone();
            async move {
                let books = db.load_books(&actor).await.unwrap();
                let report = books
                    .report(&actor, &ReportRequest::new(group_by), &options, today)
                    .unwrap();
                assert_eq!(report.unresolved, 0);
                report
                    .rows
                    .into_iter()
                    .map(|r| (r.entity_id, r.name, r.totals.quantity))
                    .collect::<Vec<_>>()
            }
        };

        let link = Actor::for_entity(&h.l1);
        assert_eq!(
            rows(link.clone(), GroupBy::Branch).await,
            vec![(h.b1.id.clone(), h.b1.name.clone(), 4)]
        );
        assert_eq!(
            rows(link, GroupBy::Partner).await,
            vec![(h.p1.id.clone(), h.p1.name.clone(), 4)]
        );

        let branch = Actor::for_entity(&h.b1);
        let by_partner = rows(branch, GroupBy::Partner).await;
        assert_eq!(by_partner, vec![(h.p1.id.clone(), h.p1.name.clone(), 5)]);
        assert!(by_partner.iter().all(|(id, _, _)| id != UNKNOWN_GROUP));
    }
}
