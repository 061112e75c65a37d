//! The two seams between a membership lock and the coordinator.
//!
//! - [`LockRegistry`]: what the coordinator may ask of a lock (membership
//!   queries and lock-manager mutations).
//! - [`PurchaseHook`]: what a lock must call on the coordinator around every
//!   purchase.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tiergate_types::{Address, IdentityId, PurchaseEvent, Result, Verdict};

/// Handle to one tier's access-expiry record store.
///
/// Implementations must be cheap to query and must not hold internal locks
/// while calling back into a [`PurchaseHook`].
pub trait LockRegistry: Send + Sync {
    fn address(&self) -> Address;

    /// Display name of the lock (used as the tier name when the catalog is
    /// built from locks alone).
    fn name(&self) -> String;

    /// Current key price. Also used as the reachability probe.
    fn key_price(&self) -> Result<Decimal>;

    /// Expiration of `identity`'s key, expired or not. `None` if the identity
    /// never held a key here.
    fn key_expiration(&self, identity: IdentityId) -> Result<Option<DateTime<Utc>>>;

    /// Whether `identity` holds a non-expired key right now.
    fn has_valid_membership(&self, identity: IdentityId) -> Result<bool> {
        let now = Utc::now();
        Ok(self
            .key_expiration(identity)?
            .is_some_and(|expires_at| expires_at > now))
    }

    /// Expire `identity`'s key immediately. Requires lock-manager rights.
    fn expire_membership(&self, manager: Address, identity: IdentityId) -> Result<()>;

    /// Put back a key expiration, undoing an earlier
    /// [`expire_membership`](Self::expire_membership). Requires lock-manager
    /// rights.
    fn restore_membership(
        &self,
        manager: Address,
        identity: IdentityId,
        expires_at: DateTime<Utc>,
    ) -> Result<()>;

    fn is_lock_manager(&self, account: Address) -> Result<bool>;
}

/// Callbacks a lock invokes around each purchase.
pub trait PurchaseHook: Send + Sync {
    /// Called before the purchase's key becomes visible. The lock must honor
    /// the returned verdict and keep the decision alive until it has
    /// finalized the purchase.
    fn on_key_purchase(&self, event: &PurchaseEvent) -> Result<HookDecision>;

    /// Called after the lock finalized an accepted purchase.
    fn on_key_purchased(&self, event: &PurchaseEvent, verdict: &Verdict);
}

/// A verdict plus whatever exclusion the hook holds for the purchaser.
/// Dropping the decision releases that exclusion.
pub struct HookDecision {
    pub verdict: Verdict,
    permit: Option<Box<dyn Send>>,
}

impl HookDecision {
    #[must_use]
    pub fn new(verdict: Verdict) -> Self {
        Self {
            verdict,
            permit: None,
        }
    }

    /// Attach a permit that stays held until the decision is dropped.
    #[must_use]
    pub fn with_permit(verdict: Verdict, permit: impl Send + 'static) -> Self {
        Self {
            verdict,
            permit: Some(Box::new(permit)),
        }
    }
}

impl std::fmt::Debug for HookDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookDecision")
            .field("verdict", &self.verdict)
            .field("holds_permit", &self.permit.is_some())
            .finish()
    }
}
