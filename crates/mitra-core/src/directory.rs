//! # Entity Directory
//!
//! Id-indexed view of an organization's hierarchy.
//!
//! Used to validate new entities against their parents, to tell the
//! aggregator which grouping ids are real, and to list the entities a
//! caller may pick from (the partner → branch → link cascade, expressed as
//! a filter rather than UI state).

use std::collections::HashMap;

use crate::error::{CoreError, CoreResult};
use crate::scope::RecordFilter;
use crate::types::{Entity, Tier};

/// Entities keyed by id.
#[derive(Debug, Clone, Default)]
pub struct EntityDirectory {
    entities: HashMap<String, Entity>,
}

impl EntityDirectory {
    pub fn new(entities: impl IntoIterator<Item = Entity>) -> Self {
        EntityDirectory {
            entities: entities.into_iter().map(|e| (e.id.clone(), e)).collect(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entities.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Display name, falling back to the id itself.
    pub fn name_of<'a>(&'a self, id: &'a str) -> &'a str {
        self.entities.get(id).map(|e| e.name.as_str()).unwrap_or(id)
    }

    /// Adds or replaces an entity.
    pub fn insert(&mut self, entity: Entity) {
        self.entities.insert(entity.id.clone(), entity);
    }

    /// Checks that `entity` fits under its parents in this directory.
    ///
    /// ## Rules
    /// - owner: no parents, `organization_id == id`
    /// - partner: no parents
    /// - branch: `partner_id` names a partner of the same organization
    /// - link: `branch_id` names a branch whose partner is the link's
    ///   `partner_id`
    pub fn validate_placement(&self, entity: &Entity) -> CoreResult<()> {
        let fail = |reason: &str| CoreError::InconsistentHierarchy {
            entity_id: entity.id.clone(),
            reason: reason.to_string(),
        };

        match entity.tier {
            Tier::Owner => {
                if entity.organization_id != entity.id {
                    return Err(fail("owner must be its own organization"));
                }
                if entity.partner_id.is_some() || entity.branch_id.is_some() {
                    return Err(fail("owner cannot have parents"));
                }
            }
            Tier::Partner => {
                if entity.partner_id.is_some() || entity.branch_id.is_some() {
                    return Err(fail("partner cannot have parents"));
                }
            }
            Tier::Branch => {
                if entity.branch_id.is_some() {
                    return Err(fail("branch cannot belong to another branch"));
                }
                let partner_id = entity
                    .partner_id
                    .as_deref()
                    .ok_or_else(|| fail("branch requires a partner"))?;
                self.expect_parent(entity, partner_id, Tier::Partner)?;
            }
            Tier::Link => {
                let partner_id = entity
                    .partner_id
                    .as_deref()
                    .ok_or_else(|| fail("link requires a partner"))?;
                let branch_id = entity
                    .branch_id
                    .as_deref()
                    .ok_or_else(|| fail("link requires a branch"))?;
                self.expect_parent(entity, partner_id, Tier::Partner)?;
                let branch = self.expect_parent(entity, branch_id, Tier::Branch)?;
                if branch.partner_id.as_deref() != Some(partner_id) {
                    return Err(fail("branch belongs to a different partner"));
                }
            }
        }
        Ok(())
    }

    /// Entities of `tier` that pass `filter`, sorted by name.
    pub fn list(&self, tier: Tier, filter: &RecordFilter) -> Vec<&Entity> {
        let mut found: Vec<&Entity> = self
            .entities
            .values()
            .filter(|e| e.tier == tier && filter.admits_entity(e))
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        found
    }

    fn expect_parent(&self, child: &Entity, parent_id: &str, tier: Tier) -> CoreResult<&Entity> {
        let parent = self
            .get(parent_id)
            .ok_or_else(|| CoreError::EntityNotFound(parent_id.to_string()))?;
        if parent.tier != tier || parent.organization_id != child.organization_id {
            return Err(CoreError::InconsistentHierarchy {
                entity_id: child.id.clone(),
                reason: format!("{} is not a {} of this organization", parent_id, tier),
            });
        }
        Ok(parent)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::{visible_scope, Selection};
    use crate::types::{Actor, Role};
    use chrono::Utc;

    fn entity(id: &str, tier: Tier, partner: Option<&str>, branch: Option<&str>) -> Entity {
        Entity {
            id: id.to_string(),
            organization_id: "org".to_string(),
            tier,
            name: id.to_uppercase(),
            partner_id: partner.map(str::to_string),
            branch_id: branch.map(str::to_string),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    fn directory() -> EntityDirectory {
        EntityDirectory::new(vec![
            entity("org", Tier::Owner, None, None),
            entity("p1", Tier::Partner, None, None),
            entity("p2", Tier::Partner, None, None),
            entity("b1", Tier::Branch, Some("p1"), None),
            entity("b2", Tier::Branch, Some("p2"), None),
            entity("l1", Tier::Link, Some("p1"), Some("b1")),
            entity("l2", Tier::Link, Some("p2"), Some("b2")),
        ])
    }

    #[test]
    fn test_valid_placements() {
        let dir = directory();
        assert!(dir.validate_placement(&entity("b3", Tier::Branch, Some("p1"), None)).is_ok());
        assert!(dir
            .validate_placement(&entity("l3", Tier::Link, Some("p1"), Some("b1")))
            .is_ok());
    }

    #[test]
    fn test_link_under_foreign_branch_is_rejected() {
        let dir = directory();
        let err = dir
            .validate_placement(&entity("l3", Tier::Link, Some("p1"), Some("b2")))
            .unwrap_err();
        assert!(matches!(err, CoreError::InconsistentHierarchy { .. }));
    }

    #[test]
    fn test_missing_parents_are_rejected() {
        let dir = directory();
        assert!(dir.validate_placement(&entity("b3", Tier::Branch, None, None)).is_err());
        assert!(dir.validate_placement(&entity("l3", Tier::Link, Some("p1"), None)).is_err());
        assert!(matches!(
            dir.validate_placement(&entity("b3", Tier::Branch, Some("ghost"), None)),
            Err(CoreError::EntityNotFound(_))
        ));
        // parent of the wrong tier
        assert!(dir.validate_placement(&entity("b3", Tier::Branch, Some("b1"), None)).is_err());
    }

    #[test]
    fn test_list_follows_scope_and_selection() {
        let dir = directory();
        let owner = Actor::new("org", Role::Owner, "org");

        let all = RecordFilter::new(visible_scope(&owner), Selection::default());
        assert_eq!(dir.list(Tier::Link, &all).len(), 2);

        let only_p1 = RecordFilter::new(
            visible_scope(&owner),
            Selection {
                partner_id: Some("p1".to_string()),
                ..Default::default()
            },
        );
        let ids: Vec<&str> = dir.list(Tier::Branch, &only_p1).iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["b1"]);

        let partner = Actor::new("p2", Role::Partner, "org");
        let scoped = RecordFilter::new(visible_scope(&partner), Selection::default());
        let ids: Vec<&str> = dir.list(Tier::Link, &scoped).iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["l2"]);
    }

    #[test]
    fn test_name_falls_back_to_id() {
        let dir = directory();
        assert_eq!(dir.name_of("l1"), "L1");
        assert_eq!(dir.name_of("ghost"), "ghost");
    }
}
