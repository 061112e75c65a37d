//! Purchase events and the coordinator's verdicts.
//!
//! A [`PurchaseEvent`] exists only for the duration of one coordination
//! decision. The resulting [`Verdict`] drives the selling lock: grant a new
//! key, extend the existing one, leave it untouched, or abort the purchase.
//!
//! ```text
//!   NoMembership ──purchase(T)──────────────────▶ HasMembership(T)
//!   HasMembership(T) ──purchase(T'), p(T')≥p(T)──▶ HasMembership(T'), T expired
//!   HasMembership(T) ──purchase(T'), p(T')<p(T)──▶ rejected, stays HasMembership(T)
//!   HasMembership(T) ──purchase(T)───────────────▶ renewed (or refunded)
//! ```

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Address, IdentityId, PurchaseId, TierId};

/// One purchase attempt, as reported by the selling lock before the new
/// membership record becomes visible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseEvent {
    pub purchase_id: PurchaseId,
    /// The identity that will own the key.
    pub identity: IdentityId,
    /// Address of the lock the purchase was made on.
    pub lock: Address,
    /// Value actually paid (held in escrow until the lock finalizes).
    pub amount_paid: Decimal,
}

impl PurchaseEvent {
    #[must_use]
    pub fn new(identity: IdentityId, lock: Address, amount_paid: Decimal) -> Self {
        Self {
            purchase_id: PurchaseId::new(),
            identity,
            lock,
            amount_paid,
        }
    }
}

/// Why a purchase was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RejectReason {
    /// The purchaser already holds a valid membership in a pricier tier.
    AlreadyHoldsHigherTier { held: TierId },
    /// A lock could not be queried or mutated; cross-tier state is unverified.
    RegistryUnavailable,
    /// More than one tier already reported a valid membership.
    InvariantViolation,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyHoldsHigherTier { held } => {
                write!(f, "ALREADY_HOLDS_HIGHER_TIER({held})")
            }
            Self::RegistryUnavailable => write!(f, "REGISTRY_UNAVAILABLE"),
            Self::InvariantViolation => write!(f, "INVARIANT_VIOLATION"),
        }
    }
}

/// The coordinator's decision for one purchase event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    /// No prior membership anywhere; grant the purchased tier.
    AcceptNew,
    /// Upgrade or equal-price move; `superseded` has already been expired.
    AcceptReplace { superseded: TierId },
    /// Re-purchase of the tier already held. When `refunded`, the payment was
    /// returned and the membership stays as it is; otherwise the lock extends it.
    Renew { refunded: bool },
    /// Abort the purchase. The payment has already been refunded in full.
    Reject(RejectReason),
}

impl Verdict {
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        !self.is_rejected()
    }

    #[must_use]
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Reject(_))
    }

    /// Whether the lock must write a fresh or extended key for the purchaser.
    #[must_use]
    pub fn grants_key(&self) -> bool {
        matches!(
            self,
            Self::AcceptNew | Self::AcceptReplace { .. } | Self::Renew { refunded: false }
        )
    }

    /// Whether the payment was handed back to the purchaser.
    #[must_use]
    pub fn refunded(&self) -> bool {
        matches!(self, Self::Reject(_) | Self::Renew { refunded: true })
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AcceptNew => write!(f, "ACCEPT_NEW"),
            Self::AcceptReplace { superseded } => write!(f, "ACCEPT_REPLACE({superseded})"),
            Self::Renew { refunded: true } => write!(f, "RENEW(REFUNDED)"),
            Self::Renew { refunded: false } => write!(f, "RENEW(EXTENDED)"),
            Self::Reject(reason) => write!(f, "REJECT({reason})"),
        }
    }
}
