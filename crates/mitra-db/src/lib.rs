//! # mitra-db: Database Layer for Mitra Settlement
//!
//! Persistence for the settlement engine. SQLite through sqlx, with the
//! settlement math itself left to mitra-core.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Mitra Settlement Data Flow                          │
//! │                                                                         │
//! │  Back-office request (actor, report request)                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     mitra-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories  │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │                │    │  (embedded)  │  │   │
//! │  │   │               │    │ EntityRepo     │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ ProductRepo    │    │ 001_initial  │  │   │
//! │  │   │ load_books()  │    │ CommissionRepo │    │   _schema    │  │   │
//! │  │   │               │    │ SaleRepo       │    │              │  │   │
//! │  │   │ AppConfig     │    │ DepositRepo    │    │              │  │   │
//! │  │   └───────────────┘    └────────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                   ▲                             │
//! │       ▼                                   │ Books snapshot              │
//! │  ┌──────────────────────────┐      ┌──────┴───────────────────────┐    │
//! │  │      SQLite Database     │      │  mitra-core report / settle  │    │
//! │  └──────────────────────────┘      └──────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`config`] - `settlement.toml` plus environment overrides
//! - [`pool`] - Connection pool creation and snapshot loading
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database and configuration error types
//! - [`repository`] - Entity, product, commission, sale and deposit access
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mitra_db::{AppConfig, Database};
//! use mitra_core::report::ReportRequest;
//!
//! let config = AppConfig::load(None)?;
//! let db = Database::new(config.db_config()).await?;
//!
//! let books = db.load_books(&actor).await?;
//! let report = books.report(&actor, &ReportRequest::new(GroupBy::Link), &config.reporting, today)?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::AppConfig;
pub use error::{ConfigError, DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::commission::CommissionRepository;
pub use repository::deposit::{DepositRepository, NewDeposit};
pub use repository::entity::EntityRepository;
pub use repository::product::ProductRepository;
pub use repository::sale::SaleRepository;
