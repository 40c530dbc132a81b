//! # Entity Repository
//!
//! Database operations for the hierarchy: the owner, partners, branches
//! and links.
//!
//! ## Creating a Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  create_organization("Mitra Net")          → owner  (org = own id)     │
//! │       │                                                                 │
//! │  create_partner(org, "Mitra Sukajadi")     → partner                   │
//! │       │                                                                 │
//! │  create_branch(partner, "Cabang Pasar")    → branch (partner copied)   │
//! │       │                                                                 │
//! │  create_link(branch, "Reseller Andi")      → link   (partner + branch  │
//! │                                              copied from the branch)    │
//! │                                                                         │
//! │  Every insert is checked by EntityDirectory::validate_placement         │
//! │  against the stored parents.                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use mitra_core::directory::EntityDirectory;
use mitra_core::scope::RecordFilter;
use mitra_core::validation::validate_name;
use mitra_core::{CoreError, Entity, Tier};

const ENTITY_COLUMNS: &str =
    "id, organization_id, tier, name, partner_id, branch_id, is_active, created_at";

/// Repository for hierarchy entities.
#[derive(Debug, Clone)]
pub struct EntityRepository {
    pool: SqlitePool,
}

impl EntityRepository {
    /// Creates a new EntityRepository.
    pub fn new(pool: SqlitePool) -> Self {
        EntityRepository { pool }
    }

    /// Creates a new organization, represented by its owner entity.
    pub async fn create_organization(&self, name: &str) -> DbResult<Entity> {
        let id = generate_entity_id();
        self.insert(&new_entity(id.clone(), id, Tier::Owner, name, None, None))
            .await
    }

    /// Creates a partner directly under the owner.
    pub async fn create_partner(&self, organization_id: &str, name: &str) -> DbResult<Entity> {
        let owner = self.require(organization_id).await?;
        if owner.tier != Tier::Owner {
            return Err(CoreError::InconsistentHierarchy {
                entity_id: organization_id.to_string(),
                reason: "partners belong to an organization owner".to_string(),
            }
            .into());
        }
        self.insert(&new_entity(
            generate_entity_id(),
            owner.organization_id,
            Tier::Partner,
            name,
            None,
            None,
        ))
        .await
    }

    /// Creates a branch under `partner_id`.
    pub async fn create_branch(&self, partner_id: &str, name: &str) -> DbResult<Entity> {
        let partner = self.require(partner_id).await?;
        self.insert(&new_entity(
            generate_entity_id(),
            partner.organization_id,
            Tier::Branch,
            name,
            Some(partner.id),
            None,
        ))
        .await
    }

    /// Creates a link under `branch_id`; the partner is taken from the
    /// branch.
    pub async fn create_link(&self, branch_id: &str, name: &str) -> DbResult<Entity> {
        let branch = self.require(branch_id).await?;
        self.insert(&new_entity(
            generate_entity_id(),
            branch.organization_id,
            Tier::Link,
            name,
            branch.partner_id,
            Some(branch.id),
        ))
        .await
    }

    /// Inserts an entity after checking it against its stored parents.
    ///
    /// ## Returns
    /// * `Err(DbError::Core(InconsistentHierarchy))` - parents do not fit
    /// * `Err(DbError::Core(InactiveEntity))` - a parent is deactivated
    pub async fn insert(&self, entity: &Entity) -> DbResult<Entity> {
        validate_name(&entity.name)?;

        let mut parents = Vec::new();
        for parent_id in [entity.partner_id.as_deref(), entity.branch_id.as_deref()]
            .into_iter()
            .flatten()
        {
            if let Some(parent) = self.get(parent_id).await? {
                if !parent.is_active {
                    return Err(CoreError::InactiveEntity(parent.id).into());
                }
                parents.push(parent);
            }
        }
        EntityDirectory::new(parents).validate_placement(entity)?;

        debug!(id = %entity.id, tier = %entity.tier, "Inserting entity");

        sqlx::query(
            r#"
            INSERT INTO entities (
                id, organization_id, tier, name,
                partner_id, branch_id, is_active, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&entity.id)
        .bind(&entity.organization_id)
        .bind(entity.tier)
        .bind(entity.name.trim())
        .bind(&entity.partner_id)
        .bind(&entity.branch_id)
        .bind(entity.is_active)
        .bind(entity.created_at)
        .execute(&self.pool)
        .await?;

        Ok(Entity {
            name: entity.name.trim().to_string(),
            ..entity.clone()
        })
    }

    /// Gets an entity by ID.
    pub async fn get(&self, id: &str) -> DbResult<Option<Entity>> {
        fetch_entity(&self.pool, id).await
    }

    /// Gets an entity by ID, failing when it does not exist.
    pub async fn require(&self, id: &str) -> DbResult<Entity> {
        self.get(id)
            .await?
            .ok_or_else(|| CoreError::EntityNotFound(id.to_string()).into())
    }

    /// Lists the entities `filter` admits, optionally of one tier, by name.
    ///
    /// The organization is narrowed in SQL; role scope and selection are
    /// applied with [`RecordFilter::admits_entity`] since an entity's own id
    /// takes part in the match.
    pub async fn list(&self, filter: &RecordFilter, tier: Option<Tier>) -> DbResult<Vec<Entity>> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM entities", ENTITY_COLUMNS));
        qb.push(" WHERE organization_id = ")
            .push_bind(filter.scope.organization_id.clone());
        if let Some(tier) = tier {
            qb.push(" AND tier = ").push_bind(tier);
        }
        qb.push(" ORDER BY name, id");

        let mut entities = qb.build_query_as::<Entity>().fetch_all(&self.pool).await?;
        entities.retain(|e| filter.admits_entity(e));

        debug!(count = entities.len(), ?tier, "Entities listed");
        Ok(entities)
    }

    /// Soft-deactivates an entity. Its history stays in every report.
    pub async fn deactivate(&self, id: &str) -> DbResult<()> {
        debug!(id = %id, "Deactivating entity");

        let result = sqlx::query("UPDATE entities SET is_active = 0 WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Entity", id));
        }

        Ok(())
    }
}

/// Fetches one entity through any executor (pool or open transaction).
pub(crate) async fn fetch_entity<'e, E>(executor: E, id: &str) -> DbResult<Option<Entity>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let entity = sqlx::query_as::<_, Entity>(&format!(
        "SELECT {} FROM entities WHERE id = ?1",
        ENTITY_COLUMNS
    ))
    .bind(id)
    .fetch_optional(executor)
    .await?;

    Ok(entity)
}

/// Fetches an entity that may record sales and deposits: it must exist, be
/// a link and be active.
pub(crate) async fn fetch_active_link<'e, E>(executor: E, link_id: &str) -> DbResult<Entity>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let link = fetch_entity(executor, link_id)
        .await?
        .ok_or_else(|| CoreError::EntityNotFound(link_id.to_string()))?;

    if link.tier != Tier::Link {
        return Err(CoreError::NotALink {
            entity_id: link.id,
            tier: link.tier.to_string(),
        }
        .into());
    }
    if !link.is_active {
        return Err(CoreError::InactiveEntity(link.id).into());
    }

    Ok(link)
}

fn new_entity(
    id: String,
    organization_id: String,
    tier: Tier,
    name: &str,
    partner_id: Option<String>,
    branch_id: Option<String>,
) -> Entity {
    Entity {
        id,
        organization_id,
        tier,
        name: name.to_string(),
        partner_id,
        branch_id,
        is_active: true,
        created_at: Utc::now(),
    }
}

/// Generates a new entity ID.
pub fn generate_entity_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Unit Tests
// =============================================================================
