//! Refund/settlement resolver.
//!
//! Returns value to purchasers whose payment must not be retained (rejected
//! purchases, refunded renewals) and decides how same-tier re-purchases
//! settle. At most one refund is issued per purchase.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tiergate_types::{IdentityId, PurchaseId, SettlementError};

use crate::refund_log::{RefundLog, RefundRecord};
use crate::renewal::{RenewalOutcome, RenewalPolicy};

/// Moves refunded value back to a purchaser.
pub trait RefundTransfer: Send + Sync {
    /// Transfer `amount` of `purchase_id`'s payment back to `identity`.
    fn transfer_refund(
        &self,
        purchase_id: PurchaseId,
        identity: IdentityId,
        amount: Decimal,
    ) -> Result<(), SettlementError>;
}

/// Issues refunds through a [`RefundTransfer`] and applies the renewal policy.
pub struct SettlementResolver {
    transfer: Arc<dyn RefundTransfer>,
    policy: RenewalPolicy,
    log: Mutex<RefundLog>,
}

impl SettlementResolver {
    #[must_use]
    pub fn new(
        transfer: Arc<dyn RefundTransfer>,
        policy: RenewalPolicy,
        log_capacity: usize,
    ) -> Self {
        Self {
            transfer,
            policy,
            log: Mutex::new(RefundLog::new(log_capacity)),
        }
    }

    /// Refund `amount` to `identity` for `purchase_id`.
    ///
    /// # Errors
    /// - `AlreadyRefunded` if this purchase was refunded before
    /// - any transfer failure; nothing is logged and the purchase may be
    ///   refunded again
    pub fn refund(
        &self,
        purchase_id: PurchaseId,
        identity: IdentityId,
        amount: Decimal,
    ) -> Result<(), SettlementError> {
        let mut log = self.log.lock();
        if let Err(err) = log.check(purchase_id) {
            tracing::warn!(%purchase_id, %identity, "Duplicate refund blocked");
            return Err(err);
        }

        if amount > Decimal::ZERO {
            if let Err(err) = self.transfer.transfer_refund(purchase_id, identity, amount) {
                tracing::error!(
                    %purchase_id,
                    %identity,
                    %amount,
                    error = %err,
                    "Refund transfer failed"
                );
                return Err(err);
            }
        }
        log.record(RefundRecord {
            purchase_id,
            identity,
            amount,
            refunded_at: Utc::now(),
        })?;

        tracing::info!(%purchase_id, %identity, %amount, "Refund settled");
        Ok(())
    }

    /// How a same-tier re-purchase settles, given the held membership's
    /// current expiration.
    #[must_use]
    pub fn resolve_renewal(
        &self,
        expires_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> RenewalOutcome {
        self.policy.resolve(expires_at, now)
    }

    #[must_use]
    pub fn policy(&self) -> &RenewalPolicy {
        &self.policy
    }

    pub fn was_refunded(&self, purchase_id: &PurchaseId) -> bool {
        self.log.lock().contains(purchase_id)
    }

    /// The logged refund for `purchase_id`, if it is still retained.
    #[must_use]
    pub fn refund_record(&self, purchase_id: &PurchaseId) -> Option<RefundRecord> {
        self.log.lock().get(purchase_id).cloned()
    }

    /// Total refunded to `identity` since startup.
    #[must_use]
    pub fn refunded_to(&self, identity: IdentityId) -> Decimal {
        self.log.lock().refunded_to(identity)
    }
}
