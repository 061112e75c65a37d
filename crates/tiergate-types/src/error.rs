//! Error types for TierGate.
//!
//! All errors use the `TG_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Catalog / configuration errors
//! - 2xx: Lock registry errors
//! - 3xx: Invariant errors
//! - 4xx: Settlement errors
//! - 5xx: Purchase errors
//! - 9xx: Serialization errors

use rust_decimal::Decimal;
use thiserror::Error;

use crate::{Address, IdentityId, PurchaseId, RejectReason, TierId};

/// Failure to move funds back to a purchaser.
///
/// Any of these aborts the enclosing purchase: the purchaser must end up with
/// either a membership or their money.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettlementError {
    /// A refund was already issued for this purchase.
    #[error("refund already issued for {0}")]
    AlreadyRefunded(PurchaseId),

    /// No payment hold exists for this purchase.
    #[error("no payment held for {0}")]
    UnknownPurchase(PurchaseId),

    /// The refund exceeds what is still held for the purchase.
    #[error("refund of {requested} exceeds held {held} for {purchase_id}")]
    ExceedsHeld {
        purchase_id: PurchaseId,
        requested: Decimal,
        held: Decimal,
    },

    /// The transfer to the purchaser failed.
    #[error("transfer to {identity} failed: {reason}")]
    TransferFailed { identity: IdentityId, reason: String },

    /// The purchaser's wallet cannot cover the payment.
    #[error("insufficient balance: need {needed}, have {available}")]
    InsufficientBalance { needed: Decimal, available: Decimal },

    /// A hold is already open under this purchase id.
    #[error("payment already held for {0}")]
    HoldExists(PurchaseId),
}

/// Central error enum for all TierGate operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TiergateError {
    // =================================================================
    // Catalog / Configuration Errors (1xx)
    // =================================================================
    /// The catalog was built with no tiers.
    #[error("TG_ERR_100: Tier catalog is empty")]
    EmptyCatalog,

    /// Two tiers share a name or a lock address.
    #[error("TG_ERR_101: Duplicate tier: {0}")]
    DuplicateTier(String),

    /// A lock did not answer its construction-time probe.
    #[error("TG_ERR_102: Lock {lock} is unreachable: {reason}")]
    UnreachableLock { lock: Address, reason: String },

    /// A tier definition is malformed (blank name, negative price).
    #[error("TG_ERR_103: Invalid tier {tier}: {reason}")]
    InvalidTier { tier: String, reason: String },

    /// Configuration error (invalid config file, bad values, etc.).
    #[error("TG_ERR_104: Configuration error: {0}")]
    Configuration(String),

    /// The coordinator was not granted lock-manager rights on a tier's lock.
    #[error("TG_ERR_105: {manager} lacks manager rights on lock {lock}")]
    MissingManagerRights { lock: Address, manager: Address },

    // =================================================================
    // Lock Registry Errors (2xx)
    // =================================================================
    /// A lock query or mutation failed.
    #[error("TG_ERR_200: Registry unavailable for lock {lock}: {reason}")]
    RegistryUnavailable { lock: Address, reason: String },

    /// The caller lacks lock-manager rights on this lock.
    #[error("TG_ERR_201: {manager} is not a manager of lock {lock}")]
    NotLockManager { lock: Address, manager: Address },

    /// The purchase came from a lock outside the catalog.
    #[error("TG_ERR_202: Unknown lock: {0}")]
    UnknownLock(Address),

    /// The identity has no key on this lock.
    #[error("TG_ERR_203: {identity} has no membership on lock {lock}")]
    NoMembership { lock: Address, identity: IdentityId },

    /// The lock reached its maximum number of keys.
    #[error("TG_ERR_204: Lock {0} is sold out")]
    LockSoldOut(Address),

    /// A purchase was attempted on a lock with no coordinator attached.
    #[error("TG_ERR_205: No purchase hook set on lock {0}")]
    HookNotSet(Address),

    // =================================================================
    // Invariant Errors (3xx)
    // =================================================================
    /// More than one tier reports a valid membership for one identity.
    #[error("TG_ERR_300: Invariant violation: {identity} holds {tiers:?}")]
    InvariantViolation {
        identity: IdentityId,
        tiers: Vec<TierId>,
    },

    /// Funds were created or destroyed by the payment ledger.
    #[error("TG_ERR_301: Supply invariant violation: {reason}")]
    SupplyInvariantViolation { reason: String },

    // =================================================================
    // Settlement Errors (4xx)
    // =================================================================
    /// A refund could not be settled.
    #[error("TG_ERR_400: Settlement failed: {0}")]
    Settlement(#[from] SettlementError),

    // =================================================================
    // Purchase Errors (5xx)
    // =================================================================
    /// The coordinator rejected the purchase. Funds were returned.
    #[error("TG_ERR_500: Purchase rejected: {0}")]
    PurchaseRejected(RejectReason),

    /// The value sent does not cover the key price.
    #[error("TG_ERR_501: Insufficient payment: price {price}, paid {paid}")]
    InsufficientPayment { price: Decimal, paid: Decimal },

    // =================================================================
    // Serialization (9xx)
    // =================================================================
    /// Serialization / deserialization error.
    #[error("TG_ERR_901: Serialization error: {0}")]
    Serialization(String),
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, TiergateError>;

impl From<serde_json::Error> for TiergateError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl TiergateError {
    /// Whether this error came from a lock query or mutation. The coordinator
    /// turns these into a `RegistryUnavailable` rejection.
    #[must_use]
    pub fn is_registry_failure(&self) -> bool {
        matches!(
            self,
            Self::RegistryUnavailable { .. } | Self::NotLockManager { .. } | Self::NoMembership { .. }
        )
    }

    /// Whether this is a deploy-time configuration error (1xx).
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::EmptyCatalog
                | Self::DuplicateTier(_)
                | Self::UnreachableLock { .. }
                | Self::InvalidTier { .. }
                | Self::Configuration(_)
                | Self::MissingManagerRights { .. }
        )
    }
}
