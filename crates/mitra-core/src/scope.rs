//! # Scope Filter
//!
//! Decides which records a caller may see.
//!
//! ## Visibility by Role
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  role           restriction               sees                          │
//! │  ─────────────  ────────────────────────  ──────────────────────────    │
//! │  owner / admin  none                      whole organization            │
//! │  partner        partner_id = actor.id     own branches and links        │
//! │  branch         branch_id  = actor.id     own links                     │
//! │  link           link_id    = actor.id     own sales and deposits        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A [`Selection`] is the caller's explicit narrowing (a chosen partner,
//! branch, link or product). It is combined with the role [`Scope`] into a
//! [`RecordFilter`]; a record must satisfy both, so a selection can never
//! widen what the role allows. Filtering is a pure predicate, so applying a
//! filter twice gives the same result as applying it once.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::types::{Actor, Deposit, Entity, Sale, Tier};

// =============================================================================
// Hierarchy Records
// =============================================================================

/// Anything that can be placed in the hierarchy.
pub trait HierarchyRecord {
    fn organization_id(&self) -> &str;

    /// Id of the entity this record belongs to at `tier`.
    fn tier_id(&self, tier: Tier) -> Option<&str>;

    /// Tier of the record itself, for entities. Records such as sales sit
    /// below every tier.
    fn own_tier(&self) -> Option<Tier> {
        None
    }

    fn product_id(&self) -> Option<&str> {
        None
    }
}

impl HierarchyRecord for Sale {
    fn organization_id(&self) -> &str {
        &self.organization_id
    }

    fn tier_id(&self, tier: Tier) -> Option<&str> {
        Sale::tier_id(self, tier)
    }

    fn product_id(&self) -> Option<&str> {
        Some(&self.product_id)
    }
}

impl HierarchyRecord for Deposit {
    fn organization_id(&self) -> &str {
        &self.organization_id
    }

    fn tier_id(&self, tier: Tier) -> Option<&str> {
        Deposit::tier_id(self, tier)
    }
}

impl HierarchyRecord for Entity {
    fn organization_id(&self) -> &str {
        &self.organization_id
    }

    fn tier_id(&self, tier: Tier) -> Option<&str> {
        self.ancestor_id(tier)
    }

    fn own_tier(&self) -> Option<Tier> {
        Some(self.tier)
    }
}

// =============================================================================
// Scope
// =============================================================================

/// A role restriction: records must belong to `entity_id` at `tier`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Restriction {
    pub tier: Tier,
    pub entity_id: String,
}

/// What a role may see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Scope {
    pub organization_id: String,
    /// `None` for owners and admins.
    pub restriction: Option<Restriction>,
}

/// Derives the visibility of `actor`.
pub fn visible_scope(actor: &Actor) -> Scope {
    let tier = actor.role.tier();
    let restriction = match tier {
        Tier::Owner => None,
        Tier::Partner | Tier::Branch | Tier::Link => Some(Restriction {
            tier,
            entity_id: actor.id.clone(),
        }),
    };
    Scope {
        organization_id: actor.organization_id.clone(),
        restriction,
    }
}

impl Scope {
    /// Whole-organization visibility.
    pub fn unrestricted(organization_id: impl Into<String>) -> Self {
        Scope {
            organization_id: organization_id.into(),
            restriction: None,
        }
    }

    pub fn is_unrestricted(&self) -> bool {
        self.restriction.is_none()
    }

    /// Column of the sales/deposits tables carrying the restricted id.
    pub fn record_column(&self) -> Option<&'static str> {
        self.restriction.as_ref().map(|r| tier_column(r.tier))
    }

    pub fn admits<R: HierarchyRecord + ?Sized>(&self, record: &R) -> bool {
        if record.organization_id() != self.organization_id {
            return false;
        }
        match &self.restriction {
            None => true,
            Some(r) => record.tier_id(r.tier) == Some(r.entity_id.as_str()),
        }
    }
}

/// Column name holding the id of `tier` in record tables.
pub fn tier_column(tier: Tier) -> &'static str {
    match tier {
        Tier::Owner => "organization_id",
        Tier::Partner => "partner_id",
        Tier::Branch => "branch_id",
        Tier::Link => "link_id",
    }
}

// =============================================================================
// Selection
// =============================================================================

/// Explicit narrowing chosen by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Selection {
    pub partner_id: Option<String>,
    pub branch_id: Option<String>,
    pub link_id: Option<String>,
    pub product_id: Option<String>,
}

impl Selection {
    /// Narrowing for a single link.
    pub fn link(link_id: impl Into<String>) -> Self {
        Selection {
            link_id: Some(link_id.into()),
            ..Default::default()
        }
    }

    /// Tier-level selections that are set, with empty strings ignored.
    pub fn tier_constraints(&self) -> impl Iterator<Item = (Tier, &str)> + '_ {
        [
            (Tier::Partner, self.partner_id.as_deref()),
            (Tier::Branch, self.branch_id.as_deref()),
            (Tier::Link, self.link_id.as_deref()),
        ]
        .into_iter()
        .filter_map(|(tier, id)| id.filter(|id| !id.is_empty()).map(|id| (tier, id)))
    }

    pub fn product(&self) -> Option<&str> {
        self.product_id.as_deref().filter(|id| !id.is_empty())
    }

    pub fn admits<R: HierarchyRecord + ?Sized>(&self, record: &R) -> bool {
        let tiers_ok = self.tier_constraints().all(|(tier, id)| {
            match record.own_tier() {
                // An entity above the selected tier is not narrowed by it:
                // choosing a link does not hide the link's branch.
                Some(own) if depth(own) < depth(tier) => true,
                _ => record.tier_id(tier) == Some(id),
            }
        });
        let product_ok = match (self.product(), record.product_id()) {
            (Some(wanted), Some(actual)) => wanted == actual,
            _ => true,
        };
        tiers_ok && product_ok
    }
}

fn depth(tier: Tier) -> u8 {
    match tier {
        Tier::Owner => 0,
        Tier::Partner => 1,
        Tier::Branch => 2,
        Tier::Link => 3,
    }
}

// =============================================================================
// Record Filter
// =============================================================================

/// Role scope plus explicit selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RecordFilter {
    pub scope: Scope,
    pub selection: Selection,
}

impl RecordFilter {
    pub fn new(scope: Scope, selection: Selection) -> Self {
        RecordFilter { scope, selection }
    }

    /// Filter for `actor` with no extra selection.
    pub fn for_actor(actor: &Actor) -> Self {
        RecordFilter::new(visible_scope(actor), Selection::default())
    }

    pub fn admits<R: HierarchyRecord + ?Sized>(&self, record: &R) -> bool {
        self.scope.admits(record) && self.selection.admits(record)
    }

    pub fn admits_entity(&self, entity: &Entity) -> bool {
        self.admits(entity)
    }

    /// Keeps the admitted records, preserving order.
    pub fn apply<'a, R: HierarchyRecord>(&self, records: impl IntoIterator<Item = &'a R>) -> Vec<&'a R>
    where
        R: 'a,
    {
        records.into_iter().filter(|r| self.admits(*r)).collect()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
