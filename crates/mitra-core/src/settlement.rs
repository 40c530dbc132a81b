//! # Settlement Calculator
//!
//! Compares what each entity was billed with what it deposited.
//!
//! ## Settlement Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Aggregation.billed()          deposits (scope-filtered)                │
//! │     { l1: 14.000,                 │                                     │
//! │       l2:  7.000 }                ├── outside period? ─► skipped        │
//! │        │                          ├── amount <= 0? ─► excluded          │
//! │        │                          ▼                                     │
//! │        │                   group by same tier key                       │
//! │        ▼                          ▼                                     │
//! │  Settlement { billed, deposited, outstanding = max(0, b − d) }          │
//! │                                                                         │
//! │  billed only   → deposited = 0                                          │
//! │  deposits only → billed = 0 (entry still listed)                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Deposits are assigned to a period by `created_at` only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};
use ts_rs::TS;

use crate::aggregate::GroupBy;
use crate::directory::EntityDirectory;
use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::period::Period;
use crate::types::Deposit;
use crate::validation::{validate_deposit_amount, validate_deposit_record};
use crate::UNKNOWN_GROUP;

// =============================================================================
// Settlement
// =============================================================================

/// Whether anything is still owed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum SettlementStatus {
    Settled,
    Outstanding,
}

/// Billed versus deposited for one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Settlement {
    pub entity_id: String,
    pub billed: Money,
    pub deposited: Money,
    /// `max(0, billed - deposited)`.
    pub outstanding: Money,
    pub status: SettlementStatus,
    pub deposit_count: u32,
    #[ts(as = "Option<String>")]
    pub last_deposit_at: Option<DateTime<Utc>>,
}

impl Settlement {
    pub fn new(entity_id: impl Into<String>, billed: Money) -> Self {
        let mut settlement = Settlement {
            entity_id: entity_id.into(),
            billed,
            deposited: Money::zero(),
            outstanding: Money::zero(),
            status: SettlementStatus::Settled,
            deposit_count: 0,
            last_deposit_at: None,
        };
        settlement.recompute();
        settlement
    }

    /// `None` when the deposited sum would overflow; nothing is changed.
    fn add_deposit(&mut self, deposit: &Deposit) -> Option<()> {
        let deposited = self.deposited.checked_add(deposit.amount)?;
        self.deposited = deposited;
        self.deposit_count += 1;
        if self.last_deposit_at.map_or(true, |last| deposit.created_at > last) {
            self.last_deposit_at = Some(deposit.created_at);
        }
        self.recompute();
        Some(())
    }

    fn recompute(&mut self) {
        self.outstanding = (self.billed - self.deposited).floor_zero();
        self.status = if self.outstanding.is_positive() {
            SettlementStatus::Outstanding
        } else {
            SettlementStatus::Settled
        };
    }

    /// Overpayment beyond the billed amount, if any.
    pub fn surplus(&self) -> Money {
        (self.deposited - self.billed).floor_zero()
    }
}

// =============================================================================
// Settlement Sheet
// =============================================================================

/// Result of [`settle`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SettlementSheet {
    pub group_by: GroupBy,
    pub period: Period,
    pub entries: BTreeMap<String, Settlement>,
    /// Deposits rejected by [`validate_deposit_record`].
    pub excluded: u32,
    /// Deposits counted under [`UNKNOWN_GROUP`].
    pub unresolved: u32,
}

impl SettlementSheet {
    pub fn get(&self, entity_id: &str) -> Option<&Settlement> {
        self.entries.get(entity_id)
    }

    pub fn total_billed(&self) -> Money {
        self.entries.values().map(|s| s.billed).sum()
    }

    pub fn total_deposited(&self) -> Money {
        self.entries.values().map(|s| s.deposited).sum()
    }

    /// Sum of per-entity outstanding amounts. One entity's surplus never
    /// offsets another entity's debt.
    pub fn total_outstanding(&self) -> Money {
        self.entries.values().map(|s| s.outstanding).sum()
    }
}

/// Settles `billed` against `deposits` within `period`.
///
/// `deposits` must already be scope-filtered, and grouped by the same tier
/// as `billed`.
pub fn settle<'a>(
    billed: &BTreeMap<String, Money>,
    deposits: impl IntoIterator<Item = &'a Deposit>,
    group_by: GroupBy,
    period: &Period,
    directory: Option<&EntityDirectory>,
) -> SettlementSheet {
    let tier = group_by.tier();
    let mut sheet = SettlementSheet {
        group_by,
        period: *period,
        entries: billed
            .iter()
            .map(|(id, amount)| (id.clone(), Settlement::new(id.clone(), *amount)))
            .collect(),
        excluded: 0,
        unresolved: 0,
    };

    for deposit in deposits {
        if !period.contains(deposit.created_at) {
            continue;
        }
        if let Err(reason) = validate_deposit_record(deposit) {
            warn!(deposit_id = %deposit.id, %reason, "Excluding malformed deposit");
            sheet.excluded += 1;
            continue;
        }

        let key = deposit
            .tier_id(tier)
            .filter(|id| !id.is_empty())
            .filter(|id| directory.map_or(true, |dir| dir.contains(id)));
        let group_id = key.unwrap_or(UNKNOWN_GROUP);

        let added = sheet
            .entries
            .entry(group_id.to_string())
            .or_insert_with(|| Settlement::new(group_id, Money::zero()))
            .add_deposit(deposit);
        if added.is_none() {
            warn!(deposit_id = %deposit.id, "Excluding deposit whose amount overflows");
            sheet.excluded += 1;
            continue;
        }
        if key.is_none() {
            sheet.unresolved += 1;
        }
    }

    debug!(
        group_by = %group_by,
        entries = sheet.entries.len(),
        excluded = sheet.excluded,
        "Deposits settled"
    );
    sheet
}

/// Entities still owing money, largest debt first, at most `limit`.
pub fn overdue<'a>(settlements: impl IntoIterator<Item = &'a Settlement>, limit: usize) -> Vec<Settlement> {
    let mut owing: Vec<Settlement> = settlements
        .into_iter()
        .filter(|s| s.outstanding.is_positive())
        .cloned()
        .collect();
    owing.sort_by(|a, b| {
        b.outstanding
            .cmp(&a.outstanding)
            .then_with(|| a.entity_id.cmp(&b.entity_id))
    });
    owing.truncate(limit);
    owing
}

/// Guards a new deposit against the link's live, all-time settlement.
///
/// ## Rules
/// - amount must be positive
/// - amount must not exceed what the link currently owes
pub fn check_deposit(amount: Money, live: &Settlement) -> CoreResult<()> {
    validate_deposit_amount(amount)?;
    if amount > live.outstanding {
        return Err(CoreError::DepositExceedsOutstanding {
            link_id: live.entity_id.clone(),
            outstanding: live.outstanding,
            requested: amount,
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::period::fixed_offset;
    use chrono::{Duration, NaiveDate, TimeZone};

    fn march(from: u32, to: u32) -> Period {
        Period::from_dates(
            NaiveDate::from_ymd_opt(2024, 3, from).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, to).unwrap(),
            fixed_offset(480).unwrap(),
        )
    }

    fn deposit(id: &str, link: &str, amount: i64, created_at: DateTime<Utc>) -> Deposit {
        Deposit {
            id: id.to_string(),
            organization_id: "org".to_string(),
            link_id: link.to_string(),
            branch_id: Some("b1".to_string()),
            partner_id: Some("p1".to_string()),
            amount: Money::from_minor(amount),
            note: None,
            recorded_by: None,
            remitted_at: None,
            billed_before: None,
            outstanding_before: None,
            created_at,
        }
    }

    fn mid_march() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 2, 4, 0, 0).unwrap()
    }

    fn billed(entries: &[(&str, i64)]) -> BTreeMap<String, Money> {
        entries
            .iter()
            .map(|(id, amount)| (id.to_string(), Money::from_minor(*amount)))
            .collect()
    }

    #[test]
    fn test_partial_deposit_leaves_outstanding() {
        let deposits = vec![deposit("d1", "l1", 4_000, mid_march())];
        let sheet = settle(&billed(&[("l1", 14_000)]), &deposits, GroupBy::Link, &march(1, 3), None);

        let l1 = sheet.get("l1").unwrap();
        assert_eq!(l1.deposited, Money::from_minor(4_000));
        assert_eq!(l1.outstanding, Money::from_minor(10_000));
        assert_eq!(l1.status, SettlementStatus::Outstanding);
        assert_eq!(l1.last_deposit_at, Some(mid_march()));
    }

    #[test]
    fn test_overpayment_floors_outstanding_at_zero() {
        let deposits = vec![deposit("d1", "l1", 20_000, mid_march())];
        let sheet = settle(&billed(&[("l1", 14_000)]), &deposits, GroupBy::Link, &march(1, 3), None);

        let l1 = sheet.get("l1").unwrap();
        assert_eq!(l1.outstanding, Money::zero());
        assert_eq!(l1.status, SettlementStatus::Settled);
        assert_eq!(l1.surplus(), Money::from_minor(6_000));
    }

    #[test]
    fn test_deposit_only_entity_is_listed() {
        let deposits = vec![deposit("d1", "l9", 1_000, mid_march())];
        let sheet = settle(&billed(&[("l1", 14_000)]), &deposits, GroupBy::Link, &march(1, 3), None);

        let l9 = sheet.get("l9").unwrap();
        assert_eq!(l9.billed, Money::zero());
        assert_eq!(l9.deposited, Money::from_minor(1_000));
        assert_eq!(sheet.get("l1").unwrap().deposited, Money::zero());
    }

    #[test]
    fn test_deposit_one_millisecond_past_period_is_excluded() {
        let period = march(1, 3);
        let deposits = vec![
            deposit("late", "l1", 5_000, period.end + Duration::milliseconds(1)),
            deposit("edge", "l1", 1_000, period.end),
            deposit("last", "l1", 2_000, period.end - Duration::milliseconds(1)),
        ];
        let sheet = settle(&billed(&[("l1", 14_000)]), &deposits, GroupBy::Link, &period, None);
        assert_eq!(sheet.get("l1").unwrap().deposited, Money::from_minor(2_000));
    }

    #[test]
    fn test_grouping_by_branch_sums_links() {
        let deposits = vec![
            deposit("d1", "l1", 1_000, mid_march()),
            deposit("d2", "l2", 2_000, mid_march()),
        ];
        let sheet = settle(&billed(&[("b1", 5_000)]), &deposits, GroupBy::Branch, &march(1, 3), None);
        let b1 = sheet.get("b1").unwrap();
        assert_eq!(b1.deposited, Money::from_minor(3_000));
        assert_eq!(b1.deposit_count, 2);
        assert_eq!(b1.outstanding, Money::from_minor(2_000));
    }

    #[test]
    fn test_non_positive_deposits_are_excluded() {
        let deposits = vec![
            deposit("zero", "l1", 0, mid_march()),
            deposit("neg", "l1", -500, mid_march()),
        ];
        let sheet = settle(&billed(&[("l1", 1_000)]), &deposits, GroupBy::Link, &march(1, 3), None);
        assert_eq!(sheet.excluded, 2);
        assert_eq!(sheet.get("l1").unwrap().outstanding, Money::from_minor(1_000));
    }

    #[test]
    fn test_malformed_deposits_outside_period_are_not_counted() {
        let deposits = vec![
            deposit("feb-neg", "l1", -500, Utc.with_ymd_and_hms(2024, 2, 10, 4, 0, 0).unwrap()),
            deposit("d1", "l1", 400, mid_march()),
        ];
        let sheet = settle(&billed(&[("l1", 1_000)]), &deposits, GroupBy::Link, &march(1, 3), None);
        assert_eq!(sheet.excluded, 0);
        assert_eq!(sheet.get("l1").unwrap().outstanding, Money::from_minor(600));
    }

    #[test]
    fn test_deposit_overflowing_the_sum_is_excluded() {
        let deposits = vec![
            deposit("big", "l1", i64::MAX, mid_march()),
            deposit("more", "l1", 1, mid_march()),
        ];
        let sheet = settle(&billed(&[("l1", 1_000)]), &deposits, GroupBy::Link, &march(1, 3), None);
        assert_eq!(sheet.excluded, 1);
        let l1 = sheet.get("l1").unwrap();
        assert_eq!(l1.deposited, Money::from_minor(i64::MAX));
        assert_eq!(l1.deposit_count, 1);
    }

    #[test]
    fn test_totals_do_not_net_surplus_against_debt() {
        let deposits = vec![deposit("d1", "l2", 9_000, mid_march())];
        let sheet = settle(
            &billed(&[("l1", 5_000), ("l2", 1_000)]),
            &deposits,
            GroupBy::Link,
            &march(1, 3),
            None,
        );
        assert_eq!(sheet.total_billed(), Money::from_minor(6_000));
        assert_eq!(sheet.total_deposited(), Money::from_minor(9_000));
        assert_eq!(sheet.total_outstanding(), Money::from_minor(5_000));
    }

    #[test]
    fn test_overdue_sorted_and_limited() {
        let entries = vec![
            Settlement::new("a", Money::from_minor(100)),
            Settlement::new("b", Money::from_minor(900)),
            Settlement::new("c", Money::zero()),
            Settlement::new("d", Money::from_minor(500)),
        ];
        let top = overdue(&entries, 2);
        let ids: Vec<&str> = top.iter().map(|s| s.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "d"]);
    }

    #[test]
    fn test_check_deposit() {
        let live = Settlement::new("l1", Money::from_minor(12_000));
        assert!(check_deposit(Money::from_minor(12_000), &live).is_ok());
        assert!(matches!(
            check_deposit(Money::from_minor(15_000), &live),
            Err(CoreError::DepositExceedsOutstanding { .. })
        ));
        assert!(matches!(
            check_deposit(Money::zero(), &live),
            Err(CoreError::Validation(_))
        ));
    }
}
