//! # Commission Resolver
//!
//! Finds the commission row that applies to a sale.
//!
//! ## Specificity Chain
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  resolve(product, partner?, branch?)                                    │
//! │                                                                         │
//! │   1. (product, partner, branch)   ── both known ──► hit? done           │
//! │   2. (product, partner, -     )   ── partner known ─► hit? done         │
//! │   3. (product, -,       branch)   ── branch known ──► hit? done         │
//! │   4. (product, -,       -     )   ── global default ► hit? done         │
//! │   5. all zero                     ── owner keeps everything             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every level is an exact match on the whole key: a row for
//! `(product, partner, branch)` never answers a lookup that lacks the
//! branch. A missing configuration is not an error.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::trace;
use ts_rs::TS;

use crate::money::Money;
use crate::types::{CommissionConfig, Rate};

// =============================================================================
// Commission Rates
// =============================================================================

/// The five numbers the allocator needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CommissionRates {
    pub link_commission: Rate,
    pub branch_commission: Rate,
    pub partner_commission: Rate,
    pub link_share: Money,
    pub branch_share: Money,
}

impl CommissionRates {
    /// No commissions at all.
    pub fn zero() -> Self {
        CommissionRates::default()
    }
}

/// Which level of the chain produced a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Specificity {
    PartnerAndBranch,
    PartnerOnly,
    BranchOnly,
    Global,
    /// Nothing configured; all rates are zero.
    Unconfigured,
}

/// Result of a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution<'a> {
    pub rates: CommissionRates,
    pub specificity: Specificity,
    /// The matched row, `None` when unconfigured.
    pub config: Option<&'a CommissionConfig>,
}

// =============================================================================
// Commission Table
// =============================================================================

/// All commission rows of one organization, indexed by product.
///
/// Holds at most one row per key tuple. When duplicate rows arrive (legacy
/// data written before saves became upserts) the newest `created_at` wins.
#[derive(Debug, Clone, Default)]
pub struct CommissionTable {
    by_product: HashMap<String, Vec<CommissionConfig>>,
}

impl CommissionTable {
    pub fn new(rows: impl IntoIterator<Item = CommissionConfig>) -> Self {
        let mut table = CommissionTable::default();
        for row in rows {
            table.insert_newest(row);
        }
        table
    }

    /// Saves a row, replacing any row with the same key.
    ///
    /// Returns the replaced row.
    pub fn upsert(&mut self, row: CommissionConfig) -> Option<CommissionConfig> {
        let rows = self.by_product.entry(row.product_id.clone()).or_default();
        match rows.iter_mut().find(|existing| existing.same_key(&row)) {
            Some(existing) => Some(std::mem::replace(existing, row)),
            None => {
                rows.push(row);
                None
            }
        }
    }

    /// Removes a row by id.
    pub fn remove(&mut self, id: &str) -> Option<CommissionConfig> {
        for rows in self.by_product.values_mut() {
            if let Some(pos) = rows.iter().position(|row| row.id == id) {
                return Some(rows.remove(pos));
            }
        }
        None
    }

    pub fn len(&self) -> usize {
        self.by_product.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &CommissionConfig> {
        self.by_product.values().flatten()
    }

    /// Resolves the rates for a sale context.
    ///
    /// Empty ids are treated as absent.
    pub fn resolve(
        &self,
        product_id: &str,
        partner_id: Option<&str>,
        branch_id: Option<&str>,
    ) -> Resolution<'_> {
        let partner_id = partner_id.filter(|id| !id.is_empty());
        let branch_id = branch_id.filter(|id| !id.is_empty());

        let Some(rows) = self.by_product.get(product_id) else {
            return Resolution::unconfigured();
        };

        let mut levels: Vec<(Option<&str>, Option<&str>, Specificity)> = Vec::with_capacity(4);
        if let (Some(p), Some(b)) = (partner_id, branch_id) {
            levels.push((Some(p), Some(b), Specificity::PartnerAndBranch));
        }
        if let Some(p) = partner_id {
            levels.push((Some(p), None, Specificity::PartnerOnly));
        }
        if let Some(b) = branch_id {
            levels.push((None, Some(b), Specificity::BranchOnly));
        }
        levels.push((None, None, Specificity::Global));

        for (partner, branch, specificity) in levels {
            let hit = rows.iter().find(|row| {
                row.partner_id.as_deref() == partner && row.branch_id.as_deref() == branch
            });
            if let Some(row) = hit {
                trace!(product_id, config_id = %row.id, ?specificity, "Commission resolved");
                return Resolution {
                    rates: row.rates(),
                    specificity,
                    config: Some(row),
                };
            }
        }

        Resolution::unconfigured()
    }

    fn insert_newest(&mut self, row: CommissionConfig) {
        let rows = self.by_product.entry(row.product_id.clone()).or_default();
        match rows.iter_mut().find(|existing| existing.same_key(&row)) {
            Some(existing) if row.created_at >= existing.created_at => *existing = row,
            Some(_) => {}
            None => rows.push(row),
        }
    }
}

impl Resolution<'_> {
    fn unconfigured() -> Self {
        Resolution {
            rates: CommissionRates::zero(),
            specificity: Specificity::Unconfigured,
            config: None,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn row(id: &str, partner: Option<&str>, branch: Option<&str>, link_pct: u32) -> CommissionConfig {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        CommissionConfig {
            id: id.to_string(),
            organization_id: "org".to_string(),
            product_id: "voucher-1d".to_string(),
            partner_id: partner.map(str::to_string),
            branch_id: branch.map(str::to_string),
            link_commission: Rate::from_percent(link_pct),
            branch_commission: Rate::zero(),
            partner_commission: Rate::zero(),
            link_share: Money::zero(),
            branch_share: Money::zero(),
            created_at: at,
            updated_at: at,
        }
    }

    fn full_table() -> CommissionTable {
        CommissionTable::new(vec![
            row("both", Some("P"), Some("B"), 4),
            row("partner", Some("P"), None, 3),
            row("branch", None, Some("B"), 2),
            row("global", None, None, 1),
        ])
    }

    #[test]
    fn test_most_specific_row_wins() {
        let table = full_table();
        let hit = table.resolve("voucher-1d", Some("P"), Some("B"));
        assert_eq!(hit.specificity, Specificity::PartnerAndBranch);
        assert_eq!(hit.config.map(|c| c.id.as_str()), Some("both"));
    }

    #[test]
    fn test_fallback_chain_as_rows_are_removed() {
        let mut table = full_table();

        table.remove("both");
        let hit = table.resolve("voucher-1d", Some("P"), Some("B"));
        assert_eq!(hit.specificity, Specificity::PartnerOnly);

        table.remove("partner");
        let hit = table.resolve("voucher-1d", Some("P"), Some("B"));
        assert_eq!(hit.specificity, Specificity::BranchOnly);

        table.remove("branch");
        let hit = table.resolve("voucher-1d", Some("P"), Some("B"));
        assert_eq!(hit.specificity, Specificity::Global);
        assert_eq!(hit.rates.link_commission, Rate::from_percent(1));

        table.remove("global");
        let hit = table.resolve("voucher-1d", Some("P"), Some("B"));
        assert_eq!(hit.specificity, Specificity::Unconfigured);
        assert_eq!(hit.rates, CommissionRates::zero());
        assert!(hit.config.is_none());
    }

    #[test]
    fn test_missing_context_skips_levels() {
        let table = full_table();

        let hit = table.resolve("voucher-1d", None, Some("B"));
        assert_eq!(hit.specificity, Specificity::BranchOnly);

        let hit = table.resolve("voucher-1d", Some("P"), None);
        assert_eq!(hit.specificity, Specificity::PartnerOnly);

        let hit = table.resolve("voucher-1d", Some(""), Some(""));
        assert_eq!(hit.specificity, Specificity::Global);
    }

    #[test]
    fn test_other_partner_does_not_match() {
        let table = CommissionTable::new(vec![row("both", Some("P"), Some("B"), 4)]);
        let hit = table.resolve("voucher-1d", Some("Q"), Some("B"));
        assert_eq!(hit.specificity, Specificity::Unconfigured);
    }

    #[test]
    fn test_unknown_product_is_unconfigured() {
        let table = full_table();
        let hit = table.resolve("voucher-30d", Some("P"), Some("B"));
        assert_eq!(hit.specificity, Specificity::Unconfigured);
    }

    #[test]
    fn test_upsert_replaces_same_key() {
        let mut table = full_table();
        let replaced = table.upsert(row("global-v2", None, None, 9));
        assert_eq!(replaced.map(|r| r.id), Some("global".to_string()));
        assert_eq!(table.len(), 4);

        let hit = table.resolve("voucher-1d", None, None);
        assert_eq!(hit.rates.link_commission, Rate::from_percent(9));
    }

    #[test]
    fn test_duplicate_rows_keep_newest() {
        let older = row("old", None, None, 1);
        let mut newer = row("new", None, None, 7);
        newer.created_at = older.created_at + Duration::days(1);

        let table = CommissionTable::new(vec![newer, older]);
        assert_eq!(table.len(), 1);
        let hit = table.resolve("voucher-1d", None, None);
        assert_eq!(hit.config.map(|c| c.id.as_str()), Some("new"));
    }
}
