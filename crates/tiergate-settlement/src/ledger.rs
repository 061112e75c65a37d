//! In-memory payment ledger.
//!
//! Tracks three buckets of value:
//! - **wallets**: per-identity spendable funds
//! - **holds**: per-purchase escrow, from payment until the lock finalizes
//! - **treasuries**: per-lock revenue from finalized purchases
//!
//! ```text
//! wallet ──hold()──▶ hold ──capture()──▶ treasury
//!   ▲                 │
//!   └─release()/refund┘
//! ```
//!
//! All mutations are atomic: either the full operation succeeds or the
//! ledger is unchanged.

use std::collections::{HashMap, HashSet};

use parking_lot::{Mutex, MutexGuard};
use rust_decimal::Decimal;
use tiergate_types::{Address, IdentityId, PurchaseId, Result, SettlementError};

use crate::resolver::RefundTransfer;
use crate::supply_conservation::SupplyConservation;

/// Value escrowed for one purchase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hold {
    pub identity: IdentityId,
    /// Amount originally paid.
    pub paid: Decimal,
    /// Amount still held (paid minus refunds).
    pub remaining: Decimal,
}

#[derive(Default)]
struct LedgerState {
    wallets: HashMap<IdentityId, Decimal>,
    holds: HashMap<PurchaseId, Hold>,
    treasuries: HashMap<Address, Decimal>,
    /// Identities whose incoming refunds fail.
    refund_blocked: HashSet<IdentityId>,
    supply: SupplyConservation,
}

/// Shared payment ledger. Locks hold, capture, and release through it; the
/// settlement resolver refunds through it.
#[derive(Default)]
pub struct PaymentLedger {
    state: Mutex<LedgerState>,
}

impl PaymentLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock()
    }

    /// Credit an identity's wallet with outside funds.
    pub fn deposit(&self, identity: IdentityId, amount: Decimal) {
        let mut state = self.state();
        *state.wallets.entry(identity).or_default() += amount;
        state.supply.record_deposit(amount);
    }

    /// Move a payment from the purchaser's wallet into escrow.
    ///
    /// # Errors
    /// - `HoldExists` if a hold is already open under `purchase_id`
    /// - `InsufficientBalance` if the wallet cannot cover `amount`
    pub fn hold(
        &self,
        purchase_id: PurchaseId,
        identity: IdentityId,
        amount: Decimal,
    ) -> std::result::Result<(), SettlementError> {
        let mut state = self.state();
        if state.holds.contains_key(&purchase_id) {
            return Err(SettlementError::HoldExists(purchase_id));
        }
        let available = state.wallets.get(&identity).copied().unwrap_or_default();
        if available < amount {
            return Err(SettlementError::InsufficientBalance {
                needed: amount,
                available,
            });
        }
        state.wallets.insert(identity, available - amount);
        state.holds.insert(
            purchase_id,
            Hold {
                identity,
                paid: amount,
                remaining: amount,
            },
        );
        Ok(())
    }

    /// Close a hold by paying what remains of it to `lock`'s treasury.
    /// Returns the captured amount.
    pub fn capture(
        &self,
        purchase_id: PurchaseId,
        lock: Address,
    ) -> std::result::Result<Decimal, SettlementError> {
        let mut state = self.state();
        let hold = state
            .holds
            .remove(&purchase_id)
            .ok_or(SettlementError::UnknownPurchase(purchase_id))?;
        *state.treasuries.entry(lock).or_default() += hold.remaining;
        Ok(hold.remaining)
    }

    /// Close a hold by returning what remains of it to the purchaser.
    /// Used to roll back a purchase that failed before finalization.
    pub fn release(&self, purchase_id: PurchaseId) -> std::result::Result<Decimal, SettlementError> {
        let mut state = self.state();
        let hold = state
            .holds
            .remove(&purchase_id)
            .ok_or(SettlementError::UnknownPurchase(purchase_id))?;
        *state.wallets.entry(hold.identity).or_default() += hold.remaining;
        Ok(hold.remaining)
    }

    /// Make every refund to `identity` fail, as a purchaser that cannot
    /// receive funds would.
    pub fn block_refunds_to(&self, identity: IdentityId) {
        self.state().refund_blocked.insert(identity);
    }

    pub fn unblock_refunds_to(&self, identity: IdentityId) {
        self.state().refund_blocked.remove(&identity);
    }

    #[must_use]
    pub fn wallet(&self, identity: IdentityId) -> Decimal {
        self.state().wallets.get(&identity).copied().unwrap_or_default()
    }

    #[must_use]
    pub fn hold_of(&self, purchase_id: PurchaseId) -> Option<Hold> {
        self.state().holds.get(&purchase_id).cloned()
    }

    #[must_use]
    pub fn open_holds(&self) -> usize {
        self.state().holds.len()
    }

    #[must_use]
    pub fn treasury(&self, lock: Address) -> Decimal {
        self.state().treasuries.get(&lock).copied().unwrap_or_default()
    }

    /// Verify Σ wallets + Σ holds + Σ treasuries == Σ deposits.
    pub fn verify_supply(&self) -> Result<()> {
        let state = self.state();
        let wallets: Decimal = state.wallets.values().copied().sum();
        let holds: Decimal = state.holds.values().map(|h| h.remaining).sum();
        let treasuries: Decimal = state.treasuries.values().copied().sum();
        state.supply.verify(wallets + holds + treasuries)
    }
}

impl RefundTransfer for PaymentLedger {
    fn transfer_refund(
        &self,
        purchase_id: PurchaseId,
        identity: IdentityId,
        amount: Decimal,
    ) -> std::result::Result<(), SettlementError> {
        let mut state = self.state();
        if state.refund_blocked.contains(&identity) {
            return Err(SettlementError::TransferFailed {
                identity,
                reason: "recipient rejected transfer".into(),
            });
        }
        let hold = state
            .holds
            .get_mut(&purchase_id)
            .ok_or(SettlementError::UnknownPurchase(purchase_id))?;
        if hold.identity != identity {
            return Err(SettlementError::TransferFailed {
                identity,
                reason: format!("{purchase_id} was paid by {}", hold.identity),
            });
        }
        if amount > hold.remaining {
            return Err(SettlementError::ExceedsHeld {
                purchase_id,
                requested: amount,
                held: hold.remaining,
            });
        }
        hold.remaining -= amount;
        *state.wallets.entry(identity).or_default() += amount;
        Ok(())
    }
}
