//! # Validation Module
//!
//! Input validation for everything written into the books.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Back-office form (TypeScript)                                │
//! │  └── Empty fields, obvious typos                                       │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: mitra-db repositories                                        │
//! │  └── THIS MODULE: business rules before INSERT / UPDATE                │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: SQLite                                                       │
//! │  ├── NOT NULL / CHECK constraints                                      │
//! │  └── Foreign keys                                                      │
//! │                                                                         │
//! │  Report side: validate_sale_record / validate_deposit_record decide    │
//! │  which stored rows are too malformed to aggregate                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use mitra_core::validation::{validate_name, validate_quantity};
//!
//! validate_name("Mitra Cabang Sukajadi").unwrap();
//! validate_quantity(25).unwrap();
//! ```

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::{CommissionConfig, Deposit, Rate, Sale};
use crate::MAX_SALE_QUANTITY;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Longest accepted entity or product name.
pub const MAX_NAME_LEN: usize = 120;

/// Longest accepted deposit note.
pub const MAX_NOTE_LEN: usize = 500;

// =============================================================================
// String Validators
// =============================================================================

/// Validates an entity or product name.
///
/// ## Rules
/// - Must not be empty after trimming
/// - At most [`MAX_NAME_LEN`] characters
///
/// ## Example
/// ```rust
/// use mitra_core::validation::validate_name;
///
/// assert!(validate_name("Voucher 1 Hari").is_ok());
/// assert!(validate_name("   ").is_err());
/// ```
pub fn validate_name(name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: "name".to_string(),
        });
    }

    if name.chars().count() > MAX_NAME_LEN {
        return Err(ValidationError::TooLong {
            field: "name".to_string(),
            max: MAX_NAME_LEN,
        });
    }

    Ok(())
}

/// Validates an optional free-text note. Returns the trimmed note, or
/// `None` when it is blank.
pub fn validate_note(note: Option<&str>) -> ValidationResult<Option<String>> {
    let Some(note) = note.map(str::trim).filter(|n| !n.is_empty()) else {
        return Ok(None);
    };

    if note.chars().count() > MAX_NOTE_LEN {
        return Err(ValidationError::TooLong {
            field: "note".to_string(),
            max: MAX_NOTE_LEN,
        });
    }

    Ok(Some(note.to_string()))
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates the quantity of a sale.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed [`MAX_SALE_QUANTITY`]
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_SALE_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_SALE_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a product's price pair.
///
/// ## Rules
/// - Neither price may be negative
/// - Sale price must be at least the cost price
///
/// ## Example
/// ```rust
/// use mitra_core::validation::validate_prices;
/// use mitra_core::Money;
///
/// assert!(validate_prices(Money::from_minor(1_000), Money::from_minor(1_500)).is_ok());
/// assert!(validate_prices(Money::from_minor(1_500), Money::from_minor(1_000)).is_err());
/// ```
pub fn validate_prices(cost_price: Money, sale_price: Money) -> ValidationResult<()> {
    if cost_price.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: "cost_price".to_string(),
        });
    }
    if sale_price.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: "sale_price".to_string(),
        });
    }
    if sale_price < cost_price {
        return Err(ValidationError::PriceBelowCost {
            cost_price,
            sale_price,
        });
    }

    Ok(())
}

/// Validates a voucher duration in hours, when one is given.
pub fn validate_duration_hours(hours: Option<i64>) -> ValidationResult<()> {
    match hours {
        Some(h) if h <= 0 => Err(ValidationError::MustBePositive {
            field: "duration_hours".to_string(),
        }),
        _ => Ok(()),
    }
}

/// Validates a commission rate.
///
/// ## Rules
/// - Between 0 and 10000 bps (0% to 100%)
pub fn validate_commission_rate(field: &str, rate: Rate) -> ValidationResult<()> {
    if rate.bps() > 10_000 {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: 10_000,
        });
    }

    Ok(())
}

/// Validates a flat per-unit share.
pub fn validate_flat_share(field: &str, share: Money) -> ValidationResult<()> {
    if share.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: field.to_string(),
        });
    }

    Ok(())
}

/// Validates a commission row before it is stored.
///
/// Rates are checked one by one; their sum may exceed 100%; the allocator
/// reports the excess as overallocation instead of rejecting the row.
pub fn validate_commission_config(config: &CommissionConfig) -> ValidationResult<()> {
    require_id("product_id", &config.product_id)?;
    if config.partner_id.as_deref() == Some("") || config.branch_id.as_deref() == Some("") {
        return Err(ValidationError::InvalidFormat {
            field: "partner_id/branch_id".to_string(),
            reason: "use no id instead of an empty one".to_string(),
        });
    }

    validate_commission_rate("link_commission", config.link_commission)?;
    validate_commission_rate("branch_commission", config.branch_commission)?;
    validate_commission_rate("partner_commission", config.partner_commission)?;
    validate_flat_share("link_share", config.link_share)?;
    validate_flat_share("branch_share", config.branch_share)?;

    Ok(())
}

/// Validates a deposit amount.
///
/// ## Rules
/// - Must be positive (> 0)
pub fn validate_deposit_amount(amount: Money) -> ValidationResult<()> {
    if !amount.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: "deposit amount".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Stored Record Validators
// =============================================================================

/// Decides whether a stored sale can take part in aggregation.
///
/// ## Rules
/// - 0 < quantity <= [`MAX_SALE_QUANTITY`]
/// - non-negative totals
/// - link and product ids present
pub fn validate_sale_record(sale: &Sale) -> ValidationResult<()> {
    validate_quantity(sale.quantity)?;
    if sale.total_cost.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: "total_cost".to_string(),
        });
    }
    if sale.total_revenue.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: "total_revenue".to_string(),
        });
    }
    require_id("link_id", &sale.link_id)?;
    require_id("product_id", &sale.product_id)?;

    Ok(())
}

/// Decides whether a stored deposit can take part in settlement.
pub fn validate_deposit_record(deposit: &Deposit) -> ValidationResult<()> {
    validate_deposit_amount(deposit.amount)?;
    require_id("link_id", &deposit.link_id)
}

fn require_id(field: &str, id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// UUID Validators
// =============================================================================

/// Validates a UUID string format.
///
/// ## Example
/// ```rust
/// use mitra_core::validation::validate_uuid;
///
/// assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000").is_ok());
/// assert!(validate_uuid("not-a-uuid").is_err());
/// ```
pub fn validate_uuid(id: &str) -> ValidationResult<()> {
    require_id("id", id)?;

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: "id".to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sale() -> Sale {
        Sale {
            id: "s1".to_string(),
            organization_id: "org".to_string(),
            product_id: "v1".to_string(),
            link_id: "l1".to_string(),
            branch_id: Some("b1".to_string()),
            partner_id: Some("p1".to_string()),
            quantity: 3,
            total_cost: Money::from_minor(3_000),
            total_revenue: Money::from_minor(4_500),
            created_at: Utc::now(),
        }
    }

    fn config() -> CommissionConfig {
        CommissionConfig {
            id: "c1".to_string(),
            organization_id: "org".to_string(),
            product_id: "v1".to_string(),
            partner_id: None,
            branch_id: None,
            link_commission: Rate::from_percent(5),
            branch_commission: Rate::from_percent(3),
            partner_commission: Rate::from_percent(2),
            link_share: Money::zero(),
            branch_share: Money::zero(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("Mitra Sukajadi").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("   ").is_err());
        assert!(validate_name(&"A".repeat(MAX_NAME_LEN + 1)).is_err());
    }

    #[test]
    fn test_validate_note() {
        assert_eq!(validate_note(None).unwrap(), None);
        assert_eq!(validate_note(Some("  ")).unwrap(), None);
        assert_eq!(validate_note(Some(" tunai ")).unwrap(), Some("tunai".to_string()));
        assert!(validate_note(Some(&"x".repeat(MAX_NOTE_LEN + 1))).is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(MAX_SALE_QUANTITY).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-4).is_err());
        assert!(validate_quantity(MAX_SALE_QUANTITY + 1).is_err());
    }

    #[test]
    fn test_validate_prices() {
        assert!(validate_prices(Money::zero(), Money::zero()).is_ok());
        assert!(validate_prices(Money::from_minor(1_000), Money::from_minor(1_000)).is_ok());
        assert!(matches!(
            validate_prices(Money::from_minor(1_000), Money::from_minor(900)),
            Err(ValidationError::PriceBelowCost { .. })
        ));
        assert!(validate_prices(Money::from_minor(-1), Money::from_minor(900)).is_err());
    }

    #[test]
    fn test_validate_commission_config() {
        assert!(validate_commission_config(&config()).is_ok());

        let mut too_high = config();
        too_high.link_commission = Rate::from_bps(10_001);
        assert!(validate_commission_config(&too_high).is_err());

        let mut negative_share = config();
        negative_share.branch_share = Money::from_minor(-20);
        assert!(validate_commission_config(&negative_share).is_err());

        let mut empty_partner = config();
        empty_partner.partner_id = Some(String::new());
        assert!(validate_commission_config(&empty_partner).is_err());

        // Rates summing past 100% are allowed individually.
        let mut greedy = config();
        greedy.link_commission = Rate::from_percent(80);
        greedy.branch_commission = Rate::from_percent(50);
        assert!(validate_commission_config(&greedy).is_ok());
    }

    #[test]
    fn test_validate_sale_record() {
        assert!(validate_sale_record(&sale()).is_ok());

        let mut zero_qty = sale();
        zero_qty.quantity = 0;
        assert!(validate_sale_record(&zero_qty).is_err());

        let mut imported = sale();
        imported.quantity = MAX_SALE_QUANTITY + 1;
        assert!(validate_sale_record(&imported).is_err());

        let mut negative = sale();
        negative.total_revenue = Money::from_minor(-1);
        assert!(validate_sale_record(&negative).is_err());

        let mut no_link = sale();
        no_link.link_id = String::new();
        assert!(validate_sale_record(&no_link).is_err());
    }

    #[test]
    fn test_validate_deposit_amount() {
        assert!(validate_deposit_amount(Money::from_minor(1)).is_ok());
        assert!(validate_deposit_amount(Money::zero()).is_err());
        assert!(validate_deposit_amount(Money::from_minor(-100)).is_err());
    }

    #[test]
    fn test_validate_uuid() {
        assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(validate_uuid("").is_err());
        assert!(validate_uuid("not-a-uuid").is_err());
    }
}
