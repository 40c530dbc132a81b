//! # Seed Data Generator
//!
//! Populates the database with a demo organization for development.
//!
//! ## Usage
//! ```bash
//! # Seed the database named in settlement.toml (or the platform default)
//! cargo run -p mitra-db --bin seed
//!
//! # Specify database path
//! cargo run -p mitra-db --bin seed -- --db ./data/mitra_dev.db
//!
//! # Use another config file
//! cargo run -p mitra-db --bin seed -- --config ./settlement.toml
//! ```
//!
//! ## Generated Data
//! ```text
//! Mitra Net (owner)
//! ├── Mitra Sukajadi ── Cabang Pasar ──── 3 links
//! │                  └─ Cabang Stasiun ── 2 links
//! └── Mitra Cibeunying ─ Cabang Terminal ─ 3 links
//! ```
//! - 3 voucher types with global commission rows, one partner override and
//!   one branch override
//! - 14 days of sales per link, quantities derived from the day and link
//!   index so every run produces the same figures
//! - Partial deposits: some links settled, some half paid, some unpaid
//!
//! Ends by printing the owner's partner report and the overdue panel.

use chrono::{Duration, Utc};
use std::env;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mitra_core::aggregate::GroupBy;
use mitra_core::commission::CommissionRates;
use mitra_core::period::today_in;
use mitra_core::report::ReportRequest;
use mitra_core::{Actor, Money, Rate};
use mitra_db::{AppConfig, Database, NewDeposit};

/// Partners, their branches, and the links under each branch.
const HIERARCHY: &[(&str, &[(&str, &[&str])])] = &[
    (
        "Mitra Sukajadi",
        &[
            ("Cabang Pasar", &["Reseller Andi", "Reseller Budi", "Reseller Cici"]),
            ("Cabang Stasiun", &["Reseller Dedi", "Reseller Euis"]),
        ],
    ),
    (
        "Mitra Cibeunying",
        &[("Cabang Terminal", &["Reseller Fajar", "Reseller Gita", "Reseller Hadi"])],
    ),
];

/// (name, cost price, sale price, duration in hours)
const VOUCHERS: &[(&str, i64, i64, i64)] = &[
    ("Voucher 3 Jam", 1_500, 2_000, 3),
    ("Voucher 1 Hari", 2_500, 3_000, 24),
    ("Voucher 7 Hari", 10_000, 12_000, 168),
];

const SEED_DAYS: i64 = 14;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,mitra=debug,sqlx=warn")),
        )
        .init();

    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let mut db_path: Option<PathBuf> = None;
    let mut config_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Mitra Settlement Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>       Database file path (default: from config)");
                println!("  -c, --config <PATH>   Config file (default: platform config dir)");
                println!("  -h, --help            Show this help message");
                return Ok(());
            }
            other => warn!(argument = %other, "Ignoring unknown argument"),
        }
        i += 1;
    }

    let mut config = AppConfig::load_or_default(config_path);
    if let Some(path) = db_path {
        config.database.path = path;
    }

    println!("Mitra Settlement Seed Data Generator");
    println!("====================================");
    println!("Database: {}", config.database.path.display());
    println!();

    let db = Database::new(config.db_config()).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entities")
        .fetch_one(db.pool())
        .await?;
    if existing > 0 {
        println!("⚠ Database already has {} entities", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    // Hierarchy
    let entities = db.entities();
    let org = entities.create_organization("Mitra Net").await?;
    let mut partners = Vec::new();
    let mut branches = Vec::new();
    let mut links = Vec::new();

    for (partner_name, partner_branches) in HIERARCHY {
        let partner = entities.create_partner(&org.id, partner_name).await?;
        for (branch_name, branch_links) in partner_branches.iter() {
            let branch = entities.create_branch(&partner.id, branch_name).await?;
            for link_name in branch_links.iter() {
                links.push(entities.create_link(&branch.id, link_name).await?);
            }
            branches.push(branch);
        }
        partners.push(partner);
    }
    println!(
        "✓ Created {} partners, {} branches, {} links",
        partners.len(),
        branches.len(),
        links.len()
    );

    // Products and commissions
    let mut products = Vec::new();
    for (name, cost, sale, hours) in VOUCHERS {
        products.push(
            db.products()
                .create(&org.id, name, Money::from_minor(*cost), Money::from_minor(*sale), Some(*hours))
                .await?,
        );
    }

    let commissions = db.commissions();
    for product in &products {
        commissions
            .save(&org.id, &product.id, None, None, rates(5, 3, 2, 50, 0))
            .await?;
    }
    // First partner negotiated a better deal on the daily voucher.
    commissions
        .save(&org.id, &products[1].id, Some(&partners[0].id), None, rates(6, 3, 3, 50, 25))
        .await?;
    // The terminal branch gets a flat bonus on the weekly voucher.
    commissions
        .save(&org.id, &products[2].id, None, Some(&branches[2].id), rates(5, 4, 2, 100, 100))
        .await?;
    println!("✓ Created {} products with commission rows", products.len());

    // Sales
    let now = Utc::now();
    let mut sale_count = 0;
    for day in 0..SEED_DAYS {
        for (li, link) in links.iter().enumerate() {
            let li = li as i64;
            if (day + li) % 5 == 4 {
                continue; // day off
            }
            let product = &products[((day + li) % 3) as usize];
            let quantity = 1 + (day * 7 + li * 3) % 12;
            let at = now - Duration::days(day) - Duration::hours(li + 1);
            db.sales().record_sale_at(&link.id, &product.id, quantity, at).await?;
            sale_count += 1;
        }
    }
    println!("✓ Recorded {} sales over {} days", sale_count, SEED_DAYS);

    // Deposits: every third link settles, the next pays half, the rest owe.
    let mut deposit_count = 0;
    for (li, link) in links.iter().enumerate() {
        let live = db.deposits().live_settlement(&link.id).await?;
        let amount = match li % 3 {
            0 => live.outstanding,
            1 => Money::from_minor(live.outstanding.minor() / 2 / 1_000 * 1_000),
            _ => Money::zero(),
        };
        if !amount.is_positive() {
            continue;
        }

        let mut deposit = NewDeposit::new(link.id.clone(), amount);
        deposit.note = Some("Setoran transfer".to_string());
        deposit.recorded_by = Some(org.id.clone());
        db.deposits()
            .record_deposit_at(deposit, now - Duration::hours(li as i64))
            .await?;
        deposit_count += 1;
    }
    println!("✓ Recorded {} deposits", deposit_count);

    // Report as the owner
    let owner = Actor::for_entity(&org);
    let books = db.load_books(&owner).await?;
    let today = today_in(config.reporting.offset()?, now);
    let report = books.report(
        &owner,
        &ReportRequest::new(GroupBy::Partner),
        &config.reporting,
        today,
    )?;

    println!();
    println!("Partner report, last {} days", config.reporting.default_lookback_days);
    for row in &report.rows {
        println!(
            "  {:<20} billed {:>14}  deposited {:>14}  outstanding {:>14}",
            row.name, row.settlement.billed, row.settlement.deposited, row.settlement.outstanding
        );
    }
    println!(
        "  Owner keeps {} of {} revenue",
        report.summary.owner_revenue, report.summary.total_revenue
    );

    println!();
    println!("Overdue links");
    for link in books.overdue_links(&owner, config.reporting.overdue_alert_limit) {
        println!("  {:<20} {:>14}", link.name, link.settlement.outstanding);
    }

    info!(organization_id = %org.id, "Seed complete");
    println!();
    println!("✓ Seed complete!");
    println!("  Organization id: {}", org.id);
    println!("  Set MITRA_ORGANIZATION_ID or [organization].id to use it.");

    Ok(())
}

/// Builds a commission rate set from whole percentages and flat shares.
fn rates(link_pct: u32, branch_pct: u32, partner_pct: u32, link_share: i64, branch_share: i64) -> CommissionRates {
    CommissionRates {
        link_commission: Rate::from_percent(link_pct),
        branch_commission: Rate::from_percent(branch_pct),
        partner_commission: Rate::from_percent(partner_pct),
        link_share: Money::from_minor(link_share),
        branch_share: Money::from_minor(branch_share),
    }
}
