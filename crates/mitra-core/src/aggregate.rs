//! # Aggregator
//!
//! Sums allocations per entity of one tier over a reporting period.
//!
//! ## Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  sales (already scope-filtered)                                         │
//! │     │                                                                   │
//! │     ├── outside [start, end)? ───► skipped                              │
//! │     ├── malformed? ──────────────► excluded += 1, warn!                 │
//! │     ▼                                                                   │
//! │  resolve(product, partner, branch) ──► allocate(sale) (per sale!)       │
//! │     │                      (overflows i64 ──► excluded += 1, warn!)     │
//! │     ▼                                                                   │
//! │  group key = sale's link / branch / partner id                          │
//! │     │         (missing or unknown ──► "unknown", unresolved += 1)       │
//! │     ▼                                                                   │
//! │  GroupTotals += quantities, amounts, allocations, billed                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Allocation happens per sale and is then summed. Summing revenue first
//! and allocating once would apply the owner floor to the total instead
//! of to each sale.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};
use ts_rs::TS;

use crate::allocation::{allocate_sale, Allocation};
use crate::commission::CommissionTable;
use crate::directory::EntityDirectory;
use crate::error::ValidationError;
use crate::money::Money;
use crate::period::Period;
use crate::types::{Sale, Tier};
use crate::validation::validate_sale_record;
use crate::UNKNOWN_GROUP;

// =============================================================================
// Group By
// =============================================================================

/// Tier a report is grouped by. The owner is never a grouping key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum GroupBy {
    Link,
    Branch,
    Partner,
}

impl GroupBy {
    pub fn tier(&self) -> Tier {
        match self {
            GroupBy::Link => Tier::Link,
            GroupBy::Branch => Tier::Branch,
            GroupBy::Partner => Tier::Partner,
        }
    }
}

impl TryFrom<Tier> for GroupBy {
    type Error = ValidationError;

    fn try_from(tier: Tier) -> Result<Self, Self::Error> {
        match tier {
            Tier::Link => Ok(GroupBy::Link),
            Tier::Branch => Ok(GroupBy::Branch),
            Tier::Partner => Ok(GroupBy::Partner),
            Tier::Owner => Err(ValidationError::InvalidFormat {
                field: "group_by".to_string(),
                reason: "reports cannot be grouped by owner".to_string(),
            }),
        }
    }
}

impl FromStr for GroupBy {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<Tier>().and_then(GroupBy::try_from)
    }
}

impl fmt::Display for GroupBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.tier(), f)
    }
}

// =============================================================================
// Group Totals
// =============================================================================

/// Sums for one group.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct GroupTotals {
    pub entity_id: String,
    pub sale_count: u32,
    pub quantity: i64,
    pub total_cost: Money,
    pub total_revenue: Money,
    pub link_revenue: Money,
    pub branch_revenue: Money,
    pub partner_revenue: Money,
    pub owner_revenue: Money,
    pub overallocation: Money,
    /// Revenue minus what the grouped tier and every tier below it keep.
    pub billed: Money,
}

impl GroupTotals {
    pub fn new(entity_id: impl Into<String>) -> Self {
        GroupTotals {
            entity_id: entity_id.into(),
            ..Default::default()
        }
    }

    /// Adds one allocated sale, billing it to `tier`.
    ///
    /// Returns `None` and leaves the sums untouched when any of them would
    /// overflow.
    pub fn add_sale(&mut self, sale: &Sale, allocation: &Allocation, tier: Tier) -> Option<()> {
        let next = GroupTotals {
            entity_id: self.entity_id.clone(),
            sale_count: self.sale_count.checked_add(1)?,
            quantity: self.quantity.checked_add(sale.quantity)?,
            total_cost: self.total_cost.checked_add(sale.total_cost)?,
            total_revenue: self.total_revenue.checked_add(sale.total_revenue)?,
            link_revenue: self.link_revenue.checked_add(allocation.link)?,
            branch_revenue: self.branch_revenue.checked_add(allocation.branch)?,
            partner_revenue: self.partner_revenue.checked_add(allocation.partner)?,
            owner_revenue: self.owner_revenue.checked_add(allocation.owner)?,
            overallocation: self.overallocation.checked_add(allocation.overallocation)?,
            billed: self.billed.checked_add(allocation.billed_to(tier))?,
        };
        *self = next;
        Some(())
    }

    pub fn revenue_of(&self, tier: Tier) -> Money {
        match tier {
            Tier::Owner => self.owner_revenue,
            Tier::Partner => self.partner_revenue,
            Tier::Branch => self.branch_revenue,
            Tier::Link => self.link_revenue,
        }
    }
}

// =============================================================================
// Aggregation
// =============================================================================

/// Result of [`aggregate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Aggregation {
    pub group_by: GroupBy,
    pub period: Period,
    pub groups: BTreeMap<String, GroupTotals>,
    /// Malformed sales left out of every sum.
    pub excluded: u32,
    /// Sales counted under [`UNKNOWN_GROUP`].
    pub unresolved: u32,
    /// Sums across every group.
    pub overall: GroupTotals,
}

impl Aggregation {
    /// Billed amount per group, the input of settlement.
    pub fn billed(&self) -> BTreeMap<String, Money> {
        self.groups
            .iter()
            .map(|(id, totals)| (id.clone(), totals.billed))
            .collect()
    }

    /// Sums across every group.
    pub fn overall(&self) -> GroupTotals {
        self.overall.clone()
    }
}

/// Aggregates `sales` by `group_by` within `period`.
///
/// `sales` must already be scope-filtered. When `directory` is given, group
/// ids it does not know are bucketed under [`UNKNOWN_GROUP`] like missing
/// ids.
pub fn aggregate<'a>(
    sales: impl IntoIterator<Item = &'a Sale>,
    group_by: GroupBy,
    period: &Period,
    commissions: &CommissionTable,
    directory: Option<&EntityDirectory>,
) -> Aggregation {
    let tier = group_by.tier();
    let mut aggregation = Aggregation {
        group_by,
        period: *period,
        groups: BTreeMap::new(),
        excluded: 0,
        unresolved: 0,
        overall: GroupTotals::default(),
    };

    for sale in sales {
        if !period.contains(sale.created_at) {
            continue;
        }
        if let Err(reason) = validate_sale_record(sale) {
            warn!(sale_id = %sale.id, %reason, "Excluding malformed sale");
            aggregation.excluded += 1;
            continue;
        }

        let resolution = commissions.resolve(
            &sale.product_id,
            sale.partner_id.as_deref(),
            sale.branch_id.as_deref(),
        );
        let key = group_key(sale, tier, directory);
        let group_id = key.unwrap_or(UNKNOWN_GROUP);

        let mut group = aggregation
            .groups
            .get(group_id)
            .cloned()
            .unwrap_or_else(|| GroupTotals::new(group_id));
        let mut overall = aggregation.overall.clone();
        let added = allocate_sale(sale, &resolution.rates).and_then(|allocation| {
            group.add_sale(sale, &allocation, tier)?;
            overall.add_sale(sale, &allocation, tier)
        });
        if added.is_none() {
            warn!(sale_id = %sale.id, "Excluding sale whose amounts overflow");
            aggregation.excluded += 1;
            continue;
        }

        if key.is_none() {
            aggregation.unresolved += 1;
        }
        aggregation.groups.insert(group_id.to_string(), group);
        aggregation.overall = overall;
    }

    debug!(
        group_by = %group_by,
        groups = aggregation.groups.len(),
        excluded = aggregation.excluded,
        unresolved = aggregation.unresolved,
        "Sales aggregated"
    );
    aggregation
}

fn group_key<'a>(sale: &'a Sale, tier: Tier, directory: Option<&EntityDirectory>) -> Option<&'a str> {
    let id = sale.tier_id(tier).filter(|id| !id.is_empty())?;
    match directory {
        Some(dir) if !dir.contains(id) => None,
        _ => Some(id),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
