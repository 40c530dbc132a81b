//! SQL rendition of [`RecordFilter`] for the sales and deposits tables.
//!
//! Both tables carry `organization_id`, `partner_id`, `branch_id` and
//! `link_id`, so the role restriction and every tier selection become
//! plain equality predicates:
//!
//! ```text
//! WHERE organization_id = ?
//!   [AND <restricted tier column> = ?]     -- role scope
//!   [AND partner_id = ?] [AND branch_id = ?] [AND link_id = ?]
//!   [AND product_id = ?]                   -- sales only
//! ```

use mitra_core::scope::{tier_column, RecordFilter};
use sqlx::{QueryBuilder, Sqlite};

/// Appends the WHERE clause for `filter`.
pub(crate) fn push_record_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &RecordFilter, has_product: bool) {
    qb.push(" WHERE organization_id = ")
        .push_bind(filter.scope.organization_id.clone());

    if let Some(restriction) = &filter.scope.restriction {
        qb.push(format!(" AND {} = ", tier_column(restriction.tier)))
            .push_bind(restriction.entity_id.clone());
    }

    for (tier, id) in filter.selection.tier_constraints() {
        qb.push(format!(" AND {} = ", tier_column(tier)))
            .push_bind(id.to_string());
    }

    if has_product {
        if let Some(product_id) = filter.selection.product() {
            qb.push(" AND product_id = ").push_bind(product_id.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mitra_core::scope::{visible_scope, Selection};
    use mitra_core::{Actor, Role};

    fn render(filter: &RecordFilter, has_product: bool) -> String {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT id FROM sales");
        push_record_filter(&mut qb, filter, has_product);
        qb.sql().to_string()
    }

    #[test]
    fn test_owner_sees_whole_organization() {
        let filter = RecordFilter::for_actor(&Actor::new("org", Role::Owner, "org"));
        assert_eq!(render(&filter, true), "SELECT id FROM sales WHERE organization_id = ?");
    }

    #[test]
    fn test_branch_scope_and_selection() {
        let filter = RecordFilter::new(
            visible_scope(&Actor::new("b1", Role::Branch, "org")),
            Selection {
                link_id: Some("l1".to_string()),
                product_id: Some("v1".to_string()),
                ..Default::default()
            },
        );
        assert_eq!(
            render(&filter, true),
            "SELECT id FROM sales WHERE organization_id = ? AND branch_id = ? AND link_id = ? AND product_id = ?"
        );
        assert_eq!(
            render(&filter, false),
            "SELECT id FROM sales WHERE organization_id = ? AND branch_id = ? AND link_id = ?"
        );
    }
}
