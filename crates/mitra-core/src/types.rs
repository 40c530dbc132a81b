//! # Domain Types
//!
//! Records shared by the engine and the database layer.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │   Owner (organization root)                                             │
//! │     └── Partner (mitra)          Entity { tier, partner_id, branch_id } │
//! │           └── Branch (cabang)                                           │
//! │                 └── Link (reseller) ──► records Sale                    │
//! │                                      ──► remits Deposit                 │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌──────────────────┐   ┌─────────────────┐      │
//! │  │    Product      │   │ CommissionConfig │   │      Sale       │      │
//! │  │  cost_price     │   │ key: product,    │   │ link/branch/    │      │
//! │  │  sale_price     │   │  partner?, branch│   │ partner (frozen)│      │
//! │  └─────────────────┘   │ 3 × Rate, 2 flat │   │ totals, qty     │      │
//! │                        └──────────────────┘   └─────────────────┘      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Sales and deposits carry the link's branch and partner as they were when
//! the record was written; later reparenting of a link never rewrites
//! history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::commission::CommissionRates;
use crate::error::ValidationError;
use crate::money::Money;

// =============================================================================
// Rate
// =============================================================================

/// A percentage stored in basis points (1 bps = 0.01%).
///
/// Commission percentages are entered as 0-100 with up to two decimals,
/// so `2.5%` is stored as `250`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
#[ts(export)]
pub struct Rate(u32);

impl Rate {
    /// Creates a rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        Rate(bps)
    }

    /// Creates a rate from a whole percentage.
    #[inline]
    pub const fn from_percent(pct: u32) -> Self {
        Rate(pct * 100)
    }

    /// Creates a rate from a fractional percentage (form input).
    pub fn from_percentage(pct: f64) -> Self {
        Rate((pct * 100.0).round().max(0.0) as u32)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage (for display only).
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Zero rate.
    #[inline]
    pub const fn zero() -> Self {
        Rate(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

// =============================================================================
// Tier
// =============================================================================

/// Position of an entity in the hierarchy.
///
/// Legacy rows spell the partner tier `mitra-cabang` or `mitracabang`;
/// [`FromStr`] and the serde aliases normalise every spelling once, at the
/// boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Tier {
    Owner,
    #[serde(alias = "mitra-cabang", alias = "mitracabang", alias = "mitra")]
    Partner,
    #[serde(alias = "cabang")]
    Branch,
    #[serde(alias = "reseller")]
    Link,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Owner => "owner",
            Tier::Partner => "partner",
            Tier::Branch => "branch",
            Tier::Link => "link",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "owner" => Ok(Tier::Owner),
            "partner" | "mitra" | "mitra-cabang" | "mitracabang" | "mitra_cabang" => {
                Ok(Tier::Partner)
            }
            "branch" | "cabang" => Ok(Tier::Branch),
            "link" | "reseller" => Ok(Tier::Link),
            other => Err(ValidationError::InvalidFormat {
                field: "tier".to_string(),
                reason: format!("unknown tier '{}'", other),
            }),
        }
    }
}

// =============================================================================
// Role
// =============================================================================

/// Role of the user requesting a report.
///
/// Admins act on behalf of the owner and see the whole organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Role {
    Owner,
    Admin,
    #[serde(alias = "mitra-cabang", alias = "mitracabang", alias = "mitra")]
    Partner,
    #[serde(alias = "cabang")]
    Branch,
    #[serde(alias = "reseller")]
    Link,
}

impl Role {
    /// The tier whose figures this role owns.
    pub fn tier(&self) -> Tier {
        match self {
            Role::Owner | Role::Admin => Tier::Owner,
            Role::Partner => Tier::Partner,
            Role::Branch => Tier::Branch,
            Role::Link => Tier::Link,
        }
    }
}

impl From<Tier> for Role {
    fn from(tier: Tier) -> Self {
        match tier {
            Tier::Owner => Role::Owner,
            Tier::Partner => Role::Partner,
            Tier::Branch => Role::Branch,
            Tier::Link => Role::Link,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => f.write_str("admin"),
            other => f.write_str(other.tier().as_str()),
        }
    }
}

impl FromStr for Role {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("admin") {
            return Ok(Role::Admin);
        }
        s.parse::<Tier>().map(Role::from)
    }
}

// =============================================================================
// Actor
// =============================================================================

/// The authenticated caller of a report.
///
/// Authentication happens elsewhere; the engine only trusts `role` and `id`
/// to derive visibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Actor {
    pub id: String,
    pub role: Role,
    pub organization_id: String,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role, organization_id: impl Into<String>) -> Self {
        Actor {
            id: id.into(),
            role,
            organization_id: organization_id.into(),
        }
    }

    /// Builds the actor for an entity logging in as itself.
    pub fn for_entity(entity: &Entity) -> Self {
        Actor::new(
            entity.id.clone(),
            Role::from(entity.tier),
            entity.organization_id.clone(),
        )
    }
}

// =============================================================================
// Entity
// =============================================================================

/// A member of the hierarchy.
///
/// - branch: `partner_id` set
/// - link: `partner_id` and `branch_id` set, and the branch belongs to the
///   same partner
/// - owner: `organization_id == id`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Entity {
    pub id: String,
    pub organization_id: String,
    pub tier: Tier,
    /// Display only.
    pub name: String,
    pub partner_id: Option<String>,
    pub branch_id: Option<String>,
    /// Entities are deactivated, never deleted.
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Entity {
    /// Id of the entity at `tier` above (or equal to) this one.
    pub fn ancestor_id(&self, tier: Tier) -> Option<&str> {
        if self.tier == tier {
            return Some(&self.id);
        }
        match tier {
            Tier::Owner => Some(&self.organization_id),
            Tier::Partner => self.partner_id.as_deref(),
            Tier::Branch => self.branch_id.as_deref(),
            Tier::Link => None,
        }
    }
}

// =============================================================================
// Product
// =============================================================================

/// A voucher type offered by the organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    pub id: String,
    pub organization_id: String,
    pub name: String,
    /// What the organization pays per voucher.
    pub cost_price: Money,
    /// What the end customer pays per voucher.
    pub sale_price: Money,
    /// Validity of one voucher, informational.
    pub duration_hours: Option<i64>,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Commission Config
// =============================================================================

/// One commission row, keyed by `(organization, product, partner?, branch?)`.
///
/// A row with neither partner nor branch is the product's global default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct CommissionConfig {
    pub id: String,
    pub organization_id: String,
    pub product_id: String,
    pub partner_id: Option<String>,
    pub branch_id: Option<String>,
    /// Percent of total cost paid to the link.
    pub link_commission: Rate,
    /// Percent of total cost paid to the branch.
    pub branch_commission: Rate,
    /// Percent of total cost paid to the partner.
    pub partner_commission: Rate,
    /// Flat amount per voucher paid to the link.
    pub link_share: Money,
    /// Flat amount per voucher paid to the branch.
    pub branch_share: Money,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl CommissionConfig {
    pub fn rates(&self) -> CommissionRates {
        CommissionRates {
            link_commission: self.link_commission,
            branch_commission: self.branch_commission,
            partner_commission: self.partner_commission,
            link_share: self.link_share,
            branch_share: self.branch_share,
        }
    }

    /// True when both rows target the same key tuple.
    pub fn same_key(&self, other: &CommissionConfig) -> bool {
        self.organization_id == other.organization_id
            && self.product_id == other.product_id
            && self.partner_id == other.partner_id
            && self.branch_id == other.branch_id
    }
}

// =============================================================================
// Sale
// =============================================================================

/// An immutable sale recorded by a link.
///
/// `branch_id` and `partner_id` are frozen from the link at sale time. They
/// are optional here because imported history may lack them; such sales are
/// grouped under [`crate::UNKNOWN_GROUP`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Sale {
    pub id: String,
    pub organization_id: String,
    pub product_id: String,
    pub link_id: String,
    pub branch_id: Option<String>,
    pub partner_id: Option<String>,
    pub quantity: i64,
    pub total_cost: Money,
    pub total_revenue: Money,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Sale {
    /// Id of the entity this sale belongs to at `tier`.
    pub fn tier_id(&self, tier: Tier) -> Option<&str> {
        match tier {
            Tier::Owner => Some(&self.organization_id),
            Tier::Partner => self.partner_id.as_deref(),
            Tier::Branch => self.branch_id.as_deref(),
            Tier::Link => Some(&self.link_id),
        }
    }
}

// =============================================================================
// Deposit
// =============================================================================

/// Money remitted by a link toward what it was billed.
///
/// `created_at` is the canonical timestamp for periodisation;
/// `remitted_at` is whatever date the link wrote on the slip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Deposit {
    pub id: String,
    pub organization_id: String,
    pub link_id: String,
    pub branch_id: Option<String>,
    pub partner_id: Option<String>,
    pub amount: Money,
    pub note: Option<String>,
    /// Entity id of whoever typed the deposit in.
    pub recorded_by: Option<String>,
    #[ts(as = "Option<String>")]
    pub remitted_at: Option<DateTime<Utc>>,
    /// All-time billed amount of the link when the deposit was taken.
    /// Audit only; settlement always recomputes. Absent on imported rows.
    pub billed_before: Option<Money>,
    /// Outstanding balance of the link when the deposit was taken.
    pub outstanding_before: Option<Money>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Deposit {
    /// Id of the entity this deposit belongs to at `tier`.
    pub fn tier_id(&self, tier: Tier) -> Option<&str> {
        match tier {
            Tier::Owner => Some(&self.organization_id),
            Tier::Partner => self.partner_id.as_deref(),
            Tier::Branch => self.branch_id.as_deref(),
            Tier::Link => Some(&self.link_id),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_parsing_normalizes_legacy_spellings() {
        assert_eq!("mitra-cabang".parse::<Tier>().unwrap(), Tier::Partner);
        assert_eq!("mitracabang".parse::<Tier>().unwrap(), Tier::Partner);
        assert_eq!("Partner".parse::<Tier>().unwrap(), Tier::Partner);
        assert_eq!("cabang".parse::<Tier>().unwrap(), Tier::Branch);
        assert_eq!(" link ".parse::<Tier>().unwrap(), Tier::Link);
        assert!("cashier".parse::<Tier>().is_err());
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("owner".parse::<Role>().unwrap(), Role::Owner);
        assert_eq!("mitracabang".parse::<Role>().unwrap(), Role::Partner);
        assert_eq!(Role::Admin.tier(), Tier::Owner);
        assert_eq!(Role::Admin.to_string(), "admin");
        assert_eq!(Role::Partner.to_string(), "partner");
    }

    #[test]
    fn test_tier_serde_aliases() {
        let tier: Tier = serde_json::from_str("\"mitra-cabang\"").unwrap();
        assert_eq!(tier, Tier::Partner);
        assert_eq!(serde_json::to_string(&Tier::Branch).unwrap(), "\"branch\"");
    }

    #[test]
    fn test_rate_conversions() {
        assert_eq!(Rate::from_percent(5).bps(), 500);
        assert_eq!(Rate::from_percentage(2.5).bps(), 250);
        assert_eq!(Rate::from_percentage(-1.0).bps(), 0);
        assert!((Rate::from_bps(825).percentage() - 8.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_entity_ancestor_id() {
        let link = Entity {
            id: "l1".to_string(),
            organization_id: "org".to_string(),
            tier: Tier::Link,
            name: "Link 1".to_string(),
            partner_id: Some("p1".to_string()),
            branch_id: Some("b1".to_string()),
            is_active: true,
            created_at: Utc::now(),
        };
        assert_eq!(link.ancestor_id(Tier::Link), Some("l1"));
        assert_eq!(link.ancestor_id(Tier::Branch), Some("b1"));
        assert_eq!(link.ancestor_id(Tier::Partner), Some("p1"));
        assert_eq!(link.ancestor_id(Tier::Owner), Some("org"));
    }
}
