//! # Repository Module
//!
//! Database repositories for the settlement store.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repositories and the Engine                          │
//! │                                                                         │
//! │  Back-office handler                                                   │
//! │       │                                                                 │
//! │       │  db.deposits().record_deposit(NewDeposit { .. })               │
//! │       │  db.load_books(&actor)                                         │
//! │       ▼                                                                 │
//! │  EntityRepository       hierarchy writes, scoped listing               │
//! │  ProductRepository      voucher types                                  │
//! │  CommissionRepository   keyed upsert of commission rows                │
//! │  SaleRepository         sale capture with denormalized parents         │
//! │  DepositRepository      guarded deposit capture                        │
//! │       │                                                                 │
//! │       │  SQL (scope + selection only, never the period)                │
//! │       ▼                                                                 │
//! │  SQLite Database ──► rows ──► mitra-core (pure computation)            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`EntityRepository`](entity::EntityRepository) - Owner, partners, branches, links
//! - [`ProductRepository`](product::ProductRepository) - Voucher types
//! - [`CommissionRepository`](commission::CommissionRepository) - Commission rows
//! - [`SaleRepository`](sale::SaleRepository) - Sale records
//! - [`DepositRepository`](deposit::DepositRepository) - Deposits and the overpayment guard

pub mod commission;
pub mod deposit;
pub mod entity;
mod filter;
pub mod product;
pub mod sale;

#[cfg(test)]
pub(crate) mod fixtures {
    //! A small organization shared by the repository tests.
    //!
    //! ```text
    //! org
    //! ├── p1 ── b1 ── l1, l2
    //! └── p2 ── b2 ── l3
    //! ```

    use crate::{Database, DbConfig};
    use mitra_core::{Entity, Money, Product};

    pub(crate) struct Hierarchy {
        pub db: Database,
        pub org: Entity,
        pub p1: Entity,
        pub p2: Entity,
        pub b1: Entity,
        pub b2: Entity,
        pub l1: Entity,
        pub l2: Entity,
        pub l3: Entity,
        /// Cost 1.000, sells for 1.500.
        pub voucher: Product,
    }

    pub(crate) async fn hierarchy() -> Hierarchy {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let entities = db.entities();

        let org = entities.create_organization("Mitra Net").await.unwrap();
        let p1 = entities.create_partner(&org.id, "Mitra Sukajadi").await.unwrap();
        let p2 = entities.create_partner(&org.id, "Mitra Cibeunying").await.unwrap();
        let b1 = entities.create_branch(&p1.id, "Cabang Pasar").await.unwrap();
        let b2 = entities.create_branch(&p2.id, "Cabang Terminal").await.unwrap();
        let l1 = entities.create_link(&b1.id, "Reseller Andi").await.unwrap();
        let l2 = entities.create_link(&b1.id, "Reseller Budi").await.unwrap();
        let l3 = entities.create_link(&b2.id, "Reseller Citra").await.unwrap();

        let voucher = db
            .products()
            .create(
                &org.id,
                "Voucher 1 Hari",
                Money::from_minor(1_000),
                Money::from_minor(1_500),
                Some(24),
            )
            .await
            .unwrap();

        Hierarchy {
            db,
            org,
            p1,
            p2,
            b1,
            b2,
            l1,
            l2,
            l3,
            voucher,
        }
    }
}
