//! # Sale Allocator
//!
//! Splits one sale's revenue between the four tiers.
//!
//! ## Formula
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  link    = link_share   × qty + total_cost × link_commission            │
//! │  branch  = branch_share × qty + total_cost × branch_commission          │
//! │  partner =                      total_cost × partner_commission         │
//! │  owner   = max(0, total_revenue − (link + branch + partner))            │
//! │                                                                         │
//! │  billed to link    = total_revenue − link                               │
//! │  billed to branch  = total_revenue − (link + branch)                    │
//! │  billed to partner = total_revenue − (link + branch + partner)          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Percentages apply to cost, not revenue; the partner has no flat share.
//! When lower tiers are configured above the margin the owner is floored at
//! zero and the excess is reported as `overallocation`, so
//! `link + branch + partner + owner == total_revenue + overallocation`
//! always holds.
//!
//! Every report path calls [`allocate`]; there is no second copy of this
//! arithmetic anywhere in the workspace.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::commission::CommissionRates;
use crate::money::Money;
use crate::types::{Sale, Tier};

/// Four-way split of a single sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Allocation {
    pub total_revenue: Money,
    pub link: Money,
    pub branch: Money,
    pub partner: Money,
    pub owner: Money,
    /// How far lower-tier commissions exceed revenue; zero normally.
    pub overallocation: Money,
}

/// Allocates one sale.
///
/// Returns `None` when a share does not fit in i64; such a sale cannot be
/// allocated and is left out by the caller.
pub fn allocate(
    quantity: i64,
    total_cost: Money,
    total_revenue: Money,
    rates: &CommissionRates,
) -> Option<Allocation> {
    let link = rates
        .link_share
        .checked_multiply_quantity(quantity)?
        .checked_add(total_cost.checked_apply_rate(rates.link_commission)?)?;
    let branch = rates
        .branch_share
        .checked_multiply_quantity(quantity)?
        .checked_add(total_cost.checked_apply_rate(rates.branch_commission)?)?;
    let partner = total_cost.checked_apply_rate(rates.partner_commission)?;

    let lower = link.checked_add(branch)?.checked_add(partner)?;
    Some(Allocation {
        total_revenue,
        link,
        branch,
        partner,
        owner: total_revenue.checked_sub(lower)?.floor_zero(),
        overallocation: lower.checked_sub(total_revenue)?.floor_zero(),
    })
}

/// Allocates a recorded sale.
pub fn allocate_sale(sale: &Sale, rates: &CommissionRates) -> Option<Allocation> {
    allocate(sale.quantity, sale.total_cost, sale.total_revenue, rates)
}

impl Allocation {
    /// Revenue kept by `tier`.
    pub fn revenue_of(&self, tier: Tier) -> Money {
        match tier {
            Tier::Owner => self.owner,
            Tier::Partner => self.partner,
            Tier::Branch => self.branch,
            Tier::Link => self.link,
        }
    }

    /// Revenue kept by `tier` and every tier below it.
    pub fn retained_through(&self, tier: Tier) -> Money {
        match tier {
            Tier::Link => self.link,
            Tier::Branch => self.link + self.branch,
            Tier::Partner => self.link + self.branch + self.partner,
            Tier::Owner => self.link + self.branch + self.partner + self.owner,
        }
    }

    /// What `tier` owes upward for this sale.
    ///
    /// The owner owes nobody, so that case is zero. Other tiers may come out
    /// negative when commissions exceed revenue; settlement floors it.
    pub fn billed_to(&self, tier: Tier) -> Money {
        match tier {
            Tier::Owner => Money::zero(),
            other => self.total_revenue - self.retained_through(other),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Rate;
    use pretty_assertions::assert_eq;

    fn rates(link: u32, branch: u32, partner: u32, link_flat: i64, branch_flat: i64) -> CommissionRates {
        CommissionRates {
            link_commission: Rate::from_percent(link),
            branch_commission: Rate::from_percent(branch),
            partner_commission: Rate::from_percent(partner),
            link_share: Money::from_minor(link_flat),
            branch_share: Money::from_minor(branch_flat),
        }
    }

    #[test]
    fn test_worked_example() {
        // unit cost 1.000, unit price 1.500, qty 10; 5% / 3% / 2%, flat 50 / 20
        let split = allocate(
            10,
            Money::from_minor(10_000),
            Money::from_minor(15_000),
            &rates(5, 3, 2, 50, 20),
        )
        .unwrap();

        assert_eq!(
            split,
            Allocation {
                total_revenue: Money::from_minor(15_000),
                link: Money::from_minor(1_000),
                branch: Money::from_minor(500),
                partner: Money::from_minor(200),
                owner: Money::from_minor(13_300),
                overallocation: Money::zero(),
            }
        );
        assert_eq!(split.billed_to(Tier::Link), Money::from_minor(14_000));
        assert_eq!(split.billed_to(Tier::Branch), Money::from_minor(13_500));
        assert_eq!(split.billed_to(Tier::Partner), Money::from_minor(13_300));
    }

    #[test]
    fn test_flat_shares_scale_with_quantity() {
        let split = allocate(
            4,
            Money::from_minor(40_000),
            Money::from_minor(60_000),
            &rates(0, 0, 0, 500, 250),
        )
        .unwrap();
        assert_eq!(split.link, Money::from_minor(2_000));
        assert_eq!(split.branch, Money::from_minor(1_000));
        assert_eq!(split.partner, Money::zero());
        assert_eq!(split.owner, Money::from_minor(57_000));
    }

    #[test]
    fn test_unconfigured_sale_goes_to_owner() {
        let split = allocate(
            2,
            Money::from_minor(20_000),
            Money::from_minor(30_000),
            &CommissionRates::zero(),
        )
        .unwrap();
        assert_eq!(split.owner, Money::from_minor(30_000));
        assert_eq!(split.billed_to(Tier::Link), Money::from_minor(30_000));
    }

    #[test]
    fn test_allocation_sums_to_revenue() {
        let cases = [
            (1, 10_000, 15_000, rates(5, 3, 2, 500, 0)),
            (3, 29_997, 45_000, rates(7, 1, 1, 125, 75)),
            (10, 100_000, 100_000, rates(0, 0, 0, 0, 0)),
            (1, 9_999, 10_001, Default::default()),
        ];
        for (qty, cost, revenue, r) in cases {
            let split = allocate(qty, Money::from_minor(cost), Money::from_minor(revenue), &r).unwrap();
            assert_eq!(
                split.link + split.branch + split.partner + split.owner,
                Money::from_minor(revenue) + split.overallocation
            );
            assert_eq!(split.overallocation, Money::zero());
        }
    }

    #[test]
    fn test_overallocation_floors_owner() {
        // 150% of cost to each lower tier
        let split = allocate(
            1,
            Money::from_minor(10_000),
            Money::from_minor(12_000),
            &CommissionRates {
                link_commission: Rate::from_percent(150),
                branch_commission: Rate::from_percent(150),
                partner_commission: Rate::from_percent(150),
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(split.owner, Money::zero());
        assert!(!split.link.is_negative());
        assert!(!split.branch.is_negative());
        assert!(!split.partner.is_negative());
        assert_eq!(split.overallocation, Money::from_minor(45_000 - 12_000));
        assert_eq!(
            split.link + split.branch + split.partner + split.owner,
            split.total_revenue + split.overallocation
        );
    }

    #[test]
    fn test_shares_too_large_for_i64_cannot_be_allocated() {
        let split = allocate(
            20_000_000_000_000,
            Money::from_minor(1_000),
            Money::from_minor(1_500),
            &rates(0, 0, 0, 1_000_000, 0),
        );
        assert_eq!(split, None);

        let split = allocate(
            1,
            Money::from_minor(i64::MAX),
            Money::from_minor(i64::MAX),
            &rates(60, 60, 0, 0, 0),
        );
        assert_eq!(split, None);
    }

    #[test]
    fn test_revenue_and_retained_views() {
        let split = allocate(
            10,
            Money::from_minor(10_000),
            Money::from_minor(15_000),
            &rates(5, 3, 2, 50, 20),
        )
        .unwrap();
        assert_eq!(split.revenue_of(Tier::Branch), Money::from_minor(500));
        assert_eq!(split.retained_through(Tier::Partner), Money::from_minor(1_700));
        assert_eq!(split.retained_through(Tier::Owner), Money::from_minor(15_000));
        assert_eq!(split.billed_to(Tier::Owner), Money::zero());
    }
}
