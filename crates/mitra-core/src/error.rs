//! # Error Types
//!
//! Domain-specific error types for mitra-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  mitra-core errors (this file)                                         │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  mitra-db errors (separate crate)                                      │
//! │  ├── DbError          - Database operation failures                    │
//! │  └── ConfigError      - Configuration loading failures                 │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → caller                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Report computation itself never fails on bad data: malformed records are
//! excluded and counted instead. Errors here guard writes (new entities,
//! products, commission rows, deposits) and configuration.

use thiserror::Error;

use crate::money::Money;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Referenced entity is not part of the supplied directory.
    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    /// Product cannot be found.
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// An entity does not fit the Owner → Partner → Branch → Link chain.
    ///
    /// ## When This Occurs
    /// - A branch without a partner
    /// - A link whose branch belongs to a different partner
    /// - A parent id that points at an entity of the wrong tier
    #[error("Inconsistent hierarchy for {entity_id}: {reason}")]
    InconsistentHierarchy { entity_id: String, reason: String },

    /// Sales can only be recorded by link entities.
    #[error("Entity {entity_id} is a {tier}, only links can record sales")]
    NotALink { entity_id: String, tier: String },

    /// Entity is deactivated and cannot take part in new records.
    #[error("Entity {0} is inactive")]
    InactiveEntity(String),

    /// Deposit would exceed what the link currently owes.
    ///
    /// ## User Workflow
    /// ```text
    /// Link owes 12.000, admin types 15.000
    ///      │
    ///      ▼
    /// check_deposit(15.000, live settlement)
    ///      │
    ///      ▼
    /// DepositExceedsOutstanding { outstanding: 12.000, requested: 15.000 }
    /// ```
    #[error("Deposit {requested} exceeds outstanding balance {outstanding} for {link_id}")]
    DepositExceedsOutstanding {
        link_id: String,
        outstanding: Money,
        requested: Money,
    },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Invalid format (e.g., invalid UUID, unknown tier spelling).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Sale price below cost price.
    #[error("sale price {sale_price} is below cost price {cost_price}")]
    PriceBelowCost { cost_price: Money, sale_price: Money },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::DepositExceedsOutstanding {
            link_id: "link-1".to_string(),
            outstanding: Money::from_minor(12_000),
            requested: Money::from_minor(15_000),
        };
        assert_eq!(
            err.to_string(),
            "Deposit Rp 15.000 exceeds outstanding balance Rp 12.000 for link-1"
        );
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "name".to_string(),
        };
        assert_eq!(err.to_string(), "name is required");

        let err = ValidationError::PriceBelowCost {
            cost_price: Money::from_minor(10_000),
            sale_price: Money::from_minor(9_000),
        };
        assert_eq!(
            err.to_string(),
            "sale price Rp 9.000 is below cost price Rp 10.000"
        );
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::MustBePositive {
            field: "amount".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
