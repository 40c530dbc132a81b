//! # mitra-core: Pure Settlement Engine
//!
//! Revenue-share and settlement logic for a multi-tier voucher reselling
//! network. Every function in this crate is pure: inputs are immutable
//! snapshots handed over by the data layer, outputs are plain values.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Mitra Settlement Architecture                       │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  Web back-office (reports)                      │   │
//! │  │   Dashboard ──► Link / Branch / Partner reports ──► Alerts     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ Books snapshot                         │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ mitra-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   scope ──► commission ──► allocation ──► aggregate ──► settle  │   │
//! │  │     │                                          │                │   │
//! │  │     └──────────────── report (Books) ◄─────────┘                │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO GLOBAL STATE                        │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    mitra-db (Database Layer)                    │   │
//! │  │        SQLite, scoped queries, concurrent snapshot loading      │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain records (Entity, Product, CommissionConfig, Sale, Deposit)
//! - [`money`] - Integer money with half-up rate application
//! - [`period`] - Half-open reporting windows in a fixed UTC offset
//! - [`directory`] - Entity lookup and hierarchy validation
//! - [`commission`] - Commission Resolver
//! - [`allocation`] - Sale Allocator
//! - [`aggregate`] - Aggregator
//! - [`settlement`] - Settlement Calculator and deposit guard
//! - [`scope`] - Scope Filter and explicit record selections
//! - [`report`] - Report assembly over a [`report::Books`] snapshot
//! - [`validation`] - Input validation rules
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use mitra_core::allocation::allocate;
//! use mitra_core::commission::CommissionRates;
//! use mitra_core::{Money, Rate};
//!
//! let rates = CommissionRates {
//!     link_commission: Rate::from_percent(5),
//!     branch_commission: Rate::from_percent(3),
//!     partner_commission: Rate::from_percent(2),
//!     link_share: Money::from_minor(50),
//!     branch_share: Money::from_minor(20),
//! };
//!
//! // 10 vouchers, total cost 10.000, sold for 15.000
//! let split = allocate(10, Money::from_minor(10_000), Money::from_minor(15_000), &rates).unwrap();
//! assert_eq!(split.link.minor(), 1_000);
//! assert_eq!(split.branch.minor(), 500);
//! assert_eq!(split.owner.minor(), 13_300);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod aggregate;
pub mod allocation;
pub mod commission;
pub mod directory;
pub mod error;
pub mod money;
pub mod period;
pub mod report;
pub mod scope;
pub mod settlement;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Group key used for records whose grouping entity is missing or unknown.
pub const UNKNOWN_GROUP: &str = "unknown";

/// Default reporting offset in minutes east of UTC (+08:00, Asia/Makassar).
pub const DEFAULT_UTC_OFFSET_MINUTES: i32 = 480;

/// Default look-back window of a report when no dates are chosen.
pub const DEFAULT_LOOKBACK_DAYS: u32 = 7;

/// Number of links shown in the overdue alert panel.
pub const DEFAULT_OVERDUE_ALERT_LIMIT: usize = 8;

/// Maximum quantity of vouchers in a single sale record.
///
/// Guards against typing 10000 instead of 10 at the point of sale.
pub const MAX_SALE_QUANTITY: i64 = 10_000;
