//! # tiergate-settlement
//!
//! **Settlement plane**: refunds, same-tier renewal policy, and the payment
//! ledger that escrows purchase payments.
//!
//! ## Architecture
//!
//! The coordinator never moves money itself. It asks the
//! [`SettlementResolver`] to:
//! 1. Refund rejected purchases in full
//! 2. Decide whether a same-tier re-purchase is refunded or extends the key
//! 3. Refuse a second refund for the same purchase ([`RefundLog`])
//!
//! Value moves through the [`RefundTransfer`] seam. [`PaymentLedger`] is the
//! in-memory implementation, with a [`SupplyConservation`] check that no
//! refund ever mints or burns funds.

pub mod ledger;
pub mod refund_log;
pub mod renewal;
pub mod resolver;
pub mod supply_conservation;

pub use ledger::{Hold, PaymentLedger};
pub use refund_log::{RefundLog, RefundRecord};
pub use renewal::{RenewalOutcome, RenewalPolicy};
pub use resolver::{RefundTransfer, SettlementResolver};
pub use supply_conservation::SupplyConservation;
