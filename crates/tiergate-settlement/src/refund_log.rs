//! Refund log.
//!
//! Every refund the resolver settles leaves a [`RefundRecord`]: which
//! purchase, who was paid back, how much, and when. A purchase is refunded at
//! most once, so a second request for a logged purchase is refused with
//! [`SettlementError::AlreadyRefunded`] before any value moves.
//!
//! The log keeps at most `capacity` records and drops the oldest first.
//! Dropping a record only loses the log's own duplicate check for that
//! purchase. The ledger still guards the money: a refund draws down the
//! purchase's hold, so a replay asking for more than is left fails with
//! `ExceedsHeld`, and one against a captured or released hold fails with
//! `UnknownPurchase`. Per-identity totals are never evicted.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tiergate_types::{IdentityId, PurchaseId, SettlementError};

/// One settled refund.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundRecord {
    pub purchase_id: PurchaseId,
    pub identity: IdentityId,
    pub amount: Decimal,
    pub refunded_at: DateTime<Utc>,
}

/// Bounded, oldest-first log of settled refunds.
pub struct RefundLog {
    records: HashMap<PurchaseId, RefundRecord>,
    /// Settlement order (front = oldest).
    order: VecDeque<PurchaseId>,
    capacity: usize,
    refunded_to: HashMap<IdentityId, Decimal>,
    evicted: u64,
}

impl RefundLog {
    /// An empty log keeping up to `capacity` records.
    /// `CoordinatorConfig::validate` refuses a zero capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            records: HashMap::with_capacity(capacity.min(1_024)),
            order: VecDeque::with_capacity(capacity.min(1_024)),
            capacity,
            refunded_to: HashMap::new(),
            evicted: 0,
        }
    }

    /// Refuse a refund for a purchase that is already logged.
    pub fn check(&self, purchase_id: PurchaseId) -> Result<(), SettlementError> {
        match self.records.get(&purchase_id) {
            Some(_) => Err(SettlementError::AlreadyRefunded(purchase_id)),
            None => Ok(()),
        }
    }

    /// Log a settled refund, evicting the oldest record when full.
    ///
    /// # Errors
    /// `AlreadyRefunded` if the purchase is already logged; the log is
    /// unchanged.
    pub fn record(&mut self, record: RefundRecord) -> Result<(), SettlementError> {
        self.check(record.purchase_id)?;

        if self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.records.remove(&oldest);
                self.evicted += 1;
            }
        }

        *self.refunded_to.entry(record.identity).or_default() += record.amount;
        self.order.push_back(record.purchase_id);
        self.records.insert(record.purchase_id, record);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, purchase_id: &PurchaseId) -> Option<&RefundRecord> {
        self.records.get(purchase_id)
    }

    #[must_use]
    pub fn contains(&self, purchase_id: &PurchaseId) -> bool {
        self.records.contains_key(purchase_id)
    }

    /// Everything ever refunded to `identity`, evicted records included.
    #[must_use]
    pub fn refunded_to(&self, identity: IdentityId) -> Decimal {
        self.refunded_to.get(&identity).copied().unwrap_or_default()
    }

    /// Records dropped to stay within capacity.
    #[must_use]
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
