//! # Reports
//!
//! Everything the back-office pages show, computed from one [`Books`]
//! snapshot.
//!
//! ## Report Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Books (loaded once by mitra-db)                                        │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  RecordFilter = visible_scope(actor) + request.selection                │
//! │     │                                                                   │
//! │     ├── sales ────► aggregate(group_by, period) ──► billed per group    │
//! │     │                                                  │                │
//! │     └── deposits ─────────────────────────────► settle(billed, ...)     │
//! │                                                        │                │
//! │                                                        ▼                │
//! │  Report { rows (name, totals, settlement), summary, by_product }        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The same snapshot also serves the ledger, the dashboard cards, the
//! overdue alert panel and the live settlement used by the deposit guard.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};
use ts_rs::TS;

use crate::aggregate::{aggregate, GroupBy, GroupTotals};
use crate::allocation::{allocate_sale, Allocation};
use crate::commission::{CommissionRates, CommissionTable, Specificity};
use crate::directory::EntityDirectory;
use crate::error::{CoreResult, ValidationError};
use crate::money::Money;
use crate::period::{fixed_offset, Period};
use crate::scope::{visible_scope, RecordFilter, Scope, Selection};
use crate::settlement::{overdue, settle, Settlement, SettlementSheet};
use crate::types::{Actor, CommissionConfig, Deposit, Entity, Product, Role, Sale, Tier};
use crate::validation::validate_sale_record;
use crate::{DEFAULT_LOOKBACK_DAYS, DEFAULT_OVERDUE_ALERT_LIMIT, DEFAULT_UTC_OFFSET_MINUTES};

// =============================================================================
// Options
// =============================================================================

/// Report settings, read from the `[reporting]` config section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportOptions {
    /// Offset in minutes east of UTC used to turn dates into instants.
    pub utc_offset_minutes: i32,
    /// Window used when a report request names no dates.
    pub default_lookback_days: u32,
    /// Number of links in the overdue alert panel.
    pub overdue_alert_limit: usize,
}

impl Default for ReportOptions {
    fn default() -> Self {
        ReportOptions {
            utc_offset_minutes: DEFAULT_UTC_OFFSET_MINUTES,
            default_lookback_days: DEFAULT_LOOKBACK_DAYS,
            overdue_alert_limit: DEFAULT_OVERDUE_ALERT_LIMIT,
        }
    }
}

impl ReportOptions {
    pub fn offset(&self) -> Result<FixedOffset, ValidationError> {
        fixed_offset(self.utc_offset_minutes)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.offset()?;
        if self.default_lookback_days == 0 {
            return Err(ValidationError::MustBePositive {
                field: "default_lookback_days".to_string(),
            });
        }
        Ok(())
    }
}

// =============================================================================
// Books
// =============================================================================

/// Snapshot of one organization's records.
///
/// Built by the data layer; nothing here performs I/O. Records of other
/// organizations may be present and are filtered out by scope.
#[derive(Debug, Clone, Default)]
pub struct Books {
    pub organization_id: String,
    pub entities: EntityDirectory,
    pub products: Vec<Product>,
    pub commissions: CommissionTable,
    pub sales: Vec<Sale>,
    pub deposits: Vec<Deposit>,
}

impl Books {
    pub fn new(
        organization_id: impl Into<String>,
        entities: Vec<Entity>,
        products: Vec<Product>,
        commissions: Vec<CommissionConfig>,
        sales: Vec<Sale>,
        deposits: Vec<Deposit>,
    ) -> Self {
        Books {
            organization_id: organization_id.into(),
            entities: EntityDirectory::new(entities),
            products,
            commissions: CommissionTable::new(commissions),
            sales,
            deposits,
        }
    }

    pub fn product(&self, id: &str) -> Option<&Product> {
        self.products.iter().find(|p| p.id == id)
    }
}

// =============================================================================
// Report
// =============================================================================

/// What the caller asks for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReportRequest {
    /// First calendar day, inclusive.
    #[ts(as = "Option<String>")]
    pub from: Option<NaiveDate>,
    /// Last calendar day, inclusive.
    #[ts(as = "Option<String>")]
    pub to: Option<NaiveDate>,
    pub group_by: GroupBy,
    #[serde(default)]
    pub selection: Selection,
}

impl ReportRequest {
    pub fn new(group_by: GroupBy) -> Self {
        ReportRequest {
            from: None,
            to: None,
            group_by,
            selection: Selection::default(),
        }
    }

    /// Resolves the requested dates.
    ///
    /// - no dates: the last `lookback_days` ending today
    /// - only `to`: the `lookback_days` ending on `to`
    /// - only `from`: `from` through today
    pub fn period(&self, lookback_days: u32, offset: FixedOffset, today: NaiveDate) -> Period {
        match (self.from, self.to) {
            (Some(from), Some(to)) => Period::from_dates(from, to, offset),
            (Some(from), None) => Period::from_dates(from, today, offset),
            (None, Some(to)) => Period::last_days(to, lookback_days, offset),
            (None, None) => Period::last_days(today, lookback_days, offset),
        }
    }
}

/// One grouped entity in a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReportRow {
    pub entity_id: String,
    pub name: String,
    pub totals: GroupTotals,
    pub settlement: Settlement,
}

/// Totals across every row.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReportSummary {
    pub sale_count: u32,
    pub quantity: i64,
    pub total_cost: Money,
    pub total_revenue: Money,
    pub link_revenue: Money,
    pub branch_revenue: Money,
    pub partner_revenue: Money,
    pub owner_revenue: Money,
    pub overallocation: Money,
    pub billed: Money,
    pub deposited: Money,
    /// Sum of row outstanding amounts.
    pub outstanding: Money,
}

/// Per-product lines with the rates that apply to the selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProductBreakdown {
    pub product_id: String,
    pub name: String,
    /// Current catalog prices; zero when the product is gone.
    pub cost_price: Money,
    pub sale_price: Money,
    pub quantity: i64,
    pub total_cost: Money,
    pub total_revenue: Money,
    pub rates: CommissionRates,
    pub specificity: Specificity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Report {
    pub period: Period,
    pub group_by: GroupBy,
    pub rows: Vec<ReportRow>,
    pub summary: ReportSummary,
    pub by_product: Vec<ProductBreakdown>,
    /// Malformed sales and deposits left out.
    pub excluded: u32,
    /// Records counted under the unknown group.
    pub unresolved: u32,
}

impl Books {
    /// Builds the grouped report `actor` is allowed to see.
    pub fn report(
        &self,
        actor: &Actor,
        request: &ReportRequest,
        options: &ReportOptions,
        today: NaiveDate,
    ) -> CoreResult<Report> {
        let period = request.period(options.default_lookback_days, options.offset()?, today);
        let filter = RecordFilter::new(visible_scope(actor), request.selection.clone());

        let sales = filter.apply(&self.sales);
        let deposits = filter.apply(&self.deposits);

        let aggregation = aggregate(
            sales.iter().copied(),
            request.group_by,
            &period,
            &self.commissions,
            Some(&self.entities),
        );
        let sheet = settle(
            &aggregation.billed(),
            deposits.iter().copied(),
            request.group_by,
            &period,
            Some(&self.entities),
        );

        let ids: BTreeSet<&String> = aggregation.groups.keys().chain(sheet.entries.keys()).collect();
        let mut rows: Vec<ReportRow> = ids
            .into_iter()
            .map(|id| ReportRow {
                entity_id: id.clone(),
                name: self.entities.name_of(id).to_string(),
                totals: aggregation
                    .groups
                    .get(id)
                    .cloned()
                    .unwrap_or_else(|| GroupTotals::new(id.as_str())),
                settlement: sheet
                    .get(id)
                    .cloned()
                    .unwrap_or_else(|| Settlement::new(id.as_str(), Money::zero())),
            })
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.entity_id.cmp(&b.entity_id)));

        let overall = aggregation.overall();
        let summary = ReportSummary {
            sale_count: overall.sale_count,
            quantity: overall.quantity,
            total_cost: overall.total_cost,
            total_revenue: overall.total_revenue,
            link_revenue: overall.link_revenue,
            branch_revenue: overall.branch_revenue,
            partner_revenue: overall.partner_revenue,
            owner_revenue: overall.owner_revenue,
            overallocation: overall.overallocation,
            billed: overall.billed,
            deposited: sheet.total_deposited(),
            outstanding: rows.iter().map(|r| r.settlement.outstanding).sum(),
        };

        let by_product = self.product_breakdown(&sales, &period, &filter);

        info!(
            actor = %actor.id,
            group_by = %request.group_by,
            rows = rows.len(),
            billed = %summary.billed,
            outstanding = %summary.outstanding,
            "Report built"
        );

        Ok(Report {
            period,
            group_by: request.group_by,
            rows,
            summary,
            by_product,
            excluded: aggregation.excluded + sheet.excluded,
            unresolved: aggregation.unresolved + sheet.unresolved,
        })
    }

    fn product_breakdown(&self, sales: &[&Sale], period: &Period, filter: &RecordFilter) -> Vec<ProductBreakdown> {
        let (partner_id, branch_id) = self.commission_context(filter);

        let mut lines: BTreeMap<&str, ProductBreakdown> = BTreeMap::new();
        for sale in sales {
            if !period.contains(sale.created_at) || validate_sale_record(sale).is_err() {
                continue;
            }
            let line = lines.entry(sale.product_id.as_str()).or_insert_with(|| {
                let product = self.product(&sale.product_id);
                let resolution = self.commissions.resolve(
                    &sale.product_id,
                    partner_id.as_deref(),
                    branch_id.as_deref(),
                );
                ProductBreakdown {
                    product_id: sale.product_id.clone(),
                    name: product.map_or_else(|| sale.product_id.clone(), |p| p.name.clone()),
                    cost_price: product.map_or(Money::zero(), |p| p.cost_price),
                    sale_price: product.map_or(Money::zero(), |p| p.sale_price),
                    quantity: 0,
                    total_cost: Money::zero(),
                    total_revenue: Money::zero(),
                    rates: resolution.rates,
                    specificity: resolution.specificity,
                }
            });
            let sums = (
                line.quantity.checked_add(sale.quantity),
                line.total_cost.checked_add(sale.total_cost),
                line.total_revenue.checked_add(sale.total_revenue),
            );
            if let (Some(quantity), Some(total_cost), Some(total_revenue)) = sums {
                line.quantity = quantity;
                line.total_cost = total_cost;
                line.total_revenue = total_revenue;
            }
        }

        let mut lines: Vec<ProductBreakdown> = lines.into_values().collect();
        lines.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.product_id.cmp(&b.product_id)));
        lines
    }

    /// Partner and branch implied by the role restriction and selection,
    /// used to show which commission row applies to the viewed slice.
    fn commission_context(&self, filter: &RecordFilter) -> (Option<String>, Option<String>) {
        let mut constraints: Vec<(Tier, &str)> = filter
            .scope
            .restriction
            .iter()
            .map(|r| (r.tier, r.entity_id.as_str()))
            .chain(filter.selection.tier_constraints())
            .collect();
        constraints.sort_by_key(|(tier, _)| match tier {
            Tier::Owner => 0,
            Tier::Partner => 1,
            Tier::Branch => 2,
            Tier::Link => 3,
        });

        let mut partner_id = None;
        let mut branch_id = None;
        for (tier, id) in constraints {
            match tier {
                Tier::Owner => {}
                Tier::Partner => partner_id = Some(id.to_string()),
                Tier::Branch => {
                    branch_id = Some(id.to_string());
                    if let Some(partner) = self.entities.get(id).and_then(|e| e.partner_id.clone()) {
                        partner_id = Some(partner);
                    }
                }
                Tier::Link => {
                    if let Some(link) = self.entities.get(id) {
                        partner_id = link.partner_id.clone().or(partner_id);
                        branch_id = link.branch_id.clone().or(branch_id);
                    }
                }
            }
        }
        (partner_id, branch_id)
    }
}

// =============================================================================
// Ledger
// =============================================================================

/// One allocated sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LedgerEntry {
    pub sale_id: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    pub product_id: String,
    pub product_name: String,
    pub link_id: String,
    pub link_name: String,
    pub quantity: i64,
    pub total_cost: Money,
    pub specificity: Specificity,
    pub allocation: Allocation,
    /// What the link owes upward for this sale.
    pub billed: Money,
}

impl Books {
    /// Per-sale allocation lines, oldest first.
    pub fn ledger(&self, actor: &Actor, selection: &Selection, period: &Period) -> Vec<LedgerEntry> {
        let filter = RecordFilter::new(visible_scope(actor), selection.clone());
        let mut entries: Vec<LedgerEntry> = filter
            .apply(&self.sales)
            .into_iter()
            .filter(|sale| period.contains(sale.created_at) && validate_sale_record(sale).is_ok())
            .filter_map(|sale| {
                let resolution = self.commissions.resolve(
                    &sale.product_id,
                    sale.partner_id.as_deref(),
                    sale.branch_id.as_deref(),
                );
                let allocation = allocate_sale(sale, &resolution.rates)?;
                Some(LedgerEntry {
                    sale_id: sale.id.clone(),
                    created_at: sale.created_at,
                    product_id: sale.product_id.clone(),
                    product_name: self
                        .product(&sale.product_id)
                        .map_or_else(|| sale.product_id.clone(), |p| p.name.clone()),
                    link_id: sale.link_id.clone(),
                    link_name: self.entities.name_of(&sale.link_id).to_string(),
                    quantity: sale.quantity,
                    total_cost: sale.total_cost,
                    specificity: resolution.specificity,
                    billed: allocation.billed_to(Tier::Link),
                    allocation,
                })
            })
            .collect();
        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.sale_id.cmp(&b.sale_id)));
        entries
    }
}

// =============================================================================
// Dashboard
// =============================================================================

/// Headline cards of the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DashboardMetrics {
    pub period: Period,
    pub role: Role,
    pub vouchers_sold: i64,
    /// Link-level billing: revenue minus what the links keep.
    pub billed: Money,
    pub deposited: Money,
    pub outstanding: Money,
    /// Revenue kept by the actor's own tier.
    pub own_revenue: Money,
}

impl Books {
    pub fn dashboard(&self, actor: &Actor, period: &Period) -> DashboardMetrics {
        let filter = RecordFilter::for_actor(actor);
        let aggregation = aggregate(
            filter.apply(&self.sales),
            GroupBy::Link,
            period,
            &self.commissions,
            Some(&self.entities),
        );
        let sheet = settle(
            &aggregation.billed(),
            filter.apply(&self.deposits),
            GroupBy::Link,
            period,
            Some(&self.entities),
        );
        let overall = aggregation.overall();

        DashboardMetrics {
            period: *period,
            role: actor.role,
            vouchers_sold: overall.quantity,
            billed: overall.billed,
            deposited: sheet.total_deposited(),
            outstanding: sheet.total_outstanding(),
            own_revenue: overall.revenue_of(actor.role.tier()),
        }
    }
}

// =============================================================================
// Arrears
// =============================================================================

/// A link with an all-time unpaid balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OverdueLink {
    pub name: String,
    pub settlement: Settlement,
}

impl Books {
    /// Links in scope that still owe money over all time, largest first.
    pub fn overdue_links(&self, actor: &Actor, limit: usize) -> Vec<OverdueLink> {
        let sheet = self.all_time_by_link(&RecordFilter::for_actor(actor));
        overdue(sheet.entries.values(), limit)
            .into_iter()
            .map(|settlement| OverdueLink {
                name: self.entities.name_of(&settlement.entity_id).to_string(),
                settlement,
            })
            .collect()
    }

    /// All-time settlement of one link, whatever the caller's period.
    pub fn live_settlement(&self, link_id: &str) -> Settlement {
        let filter = RecordFilter::new(Scope::unrestricted(self.organization_id.as_str()), Selection::link(link_id));
        let settlement = self
            .all_time_by_link(&filter)
            .entries
            .remove(link_id)
            .unwrap_or_else(|| Settlement::new(link_id, Money::zero()));
        debug!(
            link_id,
            billed = %settlement.billed,
            deposited = %settlement.deposited,
            "Live settlement computed"
        );
        settlement
    }

    fn all_time_by_link(&self, filter: &RecordFilter) -> SettlementSheet {
        let period = Period::all_time();
        let aggregation = aggregate(
            filter.apply(&self.sales),
            GroupBy::Link,
            &period,
            &self.commissions,
            None,
        );
        settle(
            &aggregation.billed(),
            filter.apply(&self.deposits),
            GroupBy::Link,
            &period,
            None,
        )
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
