//! Supply conservation invariant for the payment ledger.
//!
//! ```text
//! Σ wallets + Σ holds + Σ treasuries == Σ deposits
//! ```
//!
//! Purchases, refunds, captures, and releases only move value between those
//! buckets. If the sum drifts, a refund was paid twice or a hold leaked.

use rust_decimal::Decimal;
use tiergate_types::{Result, TiergateError};

/// Tracks total deposits and validates conservation against the ledger.
#[derive(Debug, Default)]
pub struct SupplyConservation {
    deposits: Decimal,
}

impl SupplyConservation {
    #[must_use]
    pub fn new() -> Self {
        Self {
            deposits: Decimal::ZERO,
        }
    }

    pub fn record_deposit(&mut self, amount: Decimal) {
        self.deposits += amount;
    }

    /// Expected total supply: everything ever deposited.
    #[must_use]
    pub fn expected_supply(&self) -> Decimal {
        self.deposits
    }

    /// Verify that the actual supply matches the expected supply.
    ///
    /// # Errors
    /// Returns [`TiergateError::SupplyInvariantViolation`] if actual ≠ expected.
    pub fn verify(&self, actual_supply: Decimal) -> Result<()> {
        if actual_supply != self.deposits {
            return Err(TiergateError::SupplyInvariantViolation {
                reason: format!(
                    "actual supply {actual_supply} != expected {} (deposits)",
                    self.deposits
                ),
            });
        }
        Ok(())
    }
}
