//! In-memory membership lock.
//!
//! A minimal stand-in for a production lock: fixed key price, fixed key
//! lifetime, optional key cap, a lock-manager set, and one purchase hook.
//!
//! Purchase flow:
//! 1. Validate payment and reserve a key slot
//! 2. Hold the payment in the [`PaymentLedger`]
//! 3. Ask the hook for a verdict (no key visible yet)
//! 4. On reject: close the (already refunded) hold and fail
//! 5. On accept: capture the remainder, write or extend the key, notify the hook
//!
//! If the hook errors, the hold is released back to the purchaser. The key
//! slot stays reserved from step 1 until the key is written or the purchase
//! fails, so concurrent purchases cannot overshoot the key cap.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, MutexGuard, RwLock};
use rust_decimal::Decimal;
use tiergate_settlement::PaymentLedger;
use tiergate_types::{
    Address, IdentityId, LockConfig, PurchaseEvent, PurchaseId, Result, TiergateError, Verdict,
};

use crate::handle::{LockRegistry, PurchaseHook};

/// What a successful purchase call returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseReceipt {
    pub purchase_id: PurchaseId,
    pub lock: Address,
    pub verdict: Verdict,
    /// Key expiration after the purchase. `None` only if the purchaser held
    /// no key and none was written.
    pub expires_at: Option<DateTime<Utc>>,
    /// Value kept by the lock (paid minus refunds).
    pub retained: Decimal,
}

struct LockState {
    keys: HashMap<IdentityId, DateTime<Utc>>,
    managers: HashSet<Address>,
    /// Key slots claimed by purchases still in flight.
    reserved: usize,
}

/// A key slot claimed by an in-flight purchase. Released on drop unless the
/// key was written.
struct SlotReservation<'a> {
    lock: &'a InMemoryLock,
    held: bool,
}

impl SlotReservation<'_> {
    fn settle(mut self, state: &mut LockState) {
        if self.held {
            state.reserved -= 1;
            self.held = false;
        }
    }
}

impl Drop for SlotReservation<'_> {
    fn drop(&mut self) {
        if self.held {
            self.lock.state().reserved -= 1;
        }
    }
}

pub struct InMemoryLock {
    address: Address,
    config: LockConfig,
    key_lifetime: Duration,
    ledger: Arc<PaymentLedger>,
    state: Mutex<LockState>,
    hook: RwLock<Option<Weak<dyn PurchaseHook>>>,
    available: AtomicBool,
    sequence: AtomicU64,
}

impl InMemoryLock {
    /// Deploy a lock whose address derives from its name. `owner` becomes
    /// the first lock manager.
    ///
    /// # Errors
    /// `Configuration` if `config` fails [`LockConfig::validate`].
    pub fn new(config: LockConfig, owner: Address, ledger: Arc<PaymentLedger>) -> Result<Self> {
        let address = Address::derive(&format!("lock:{}", config.name));
        Self::with_address(config, address, owner, ledger)
    }

    pub fn with_address(
        config: LockConfig,
        address: Address,
        owner: Address,
        ledger: Arc<PaymentLedger>,
    ) -> Result<Self> {
        config.validate()?;
        let key_lifetime = config.key_lifetime()?;
        Ok(Self {
            address,
            config,
            key_lifetime,
            ledger,
            state: Mutex::new(LockState {
                keys: HashMap::new(),
                managers: HashSet::from([owner]),
                reserved: 0,
            }),
            hook: RwLock::new(None),
            available: AtomicBool::new(true),
            sequence: AtomicU64::new(0),
        })
    }

    fn state(&self) -> MutexGuard<'_, LockState> {
        self.state.lock()
    }

    fn ensure_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TiergateError::RegistryUnavailable {
                lock: self.address,
                reason: "lock offline".into(),
            })
        }
    }

    fn ensure_manager(state: &LockState, lock: Address, caller: Address) -> Result<()> {
        if state.managers.contains(&caller) {
            Ok(())
        } else {
            Err(TiergateError::NotLockManager {
                lock,
                manager: caller,
            })
        }
    }

    #[must_use]
    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    /// Take the lock offline (or back online). While offline every query and
    /// mutation fails with `RegistryUnavailable`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Grant manager rights to `account`. Only an existing manager may.
    pub fn add_lock_manager(&self, caller: Address, account: Address) -> Result<()> {
        let mut state = self.state();
        Self::ensure_manager(&state, self.address, caller)?;
        state.managers.insert(account);
        tracing::debug!(lock = %self.address, manager = %account, "Lock manager added");
        Ok(())
    }

    /// Revoke `account`'s manager rights. Only a manager may.
    pub fn remove_lock_manager(&self, caller: Address, account: Address) -> Result<()> {
        let mut state = self.state();
        Self::ensure_manager(&state, self.address, caller)?;
        state.managers.remove(&account);
        tracing::debug!(lock = %self.address, manager = %account, "Lock manager removed");
        Ok(())
    }

    /// Attach the purchase hook. Only a manager may. The lock keeps a weak
    /// reference; the caller owns the hook.
    pub fn set_event_hook(&self, caller: Address, hook: &Arc<dyn PurchaseHook>) -> Result<()> {
        Self::ensure_manager(&self.state(), self.address, caller)?;
        *self.hook.write() = Some(Arc::downgrade(hook));
        Ok(())
    }

    /// Write a key directly, bypassing the purchase hook. Manager only.
    pub fn grant_key(
        &self,
        caller: Address,
        identity: IdentityId,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.state();
        Self::ensure_manager(&state, self.address, caller)?;
        state.keys.insert(identity, expires_at);
        Ok(())
    }

    /// Number of currently valid keys.
    #[must_use]
    pub fn total_keys(&self) -> usize {
        let now = Utc::now();
        self.state().keys.values().filter(|exp| **exp > now).count()
    }

    /// Purchase a key for `identity`, paying `value` from its wallet.
    ///
    /// # Errors
    /// - `InsufficientPayment` if `value` is below the key price
    /// - `LockSoldOut` if the key cap is reached
    /// - `HookNotSet` if no coordinator is attached
    /// - `PurchaseRejected` if the coordinator rejected (payment refunded)
    /// - any hook error (payment released back)
    pub fn purchase(&self, identity: IdentityId, value: Decimal) -> Result<PurchaseReceipt> {
        self.ensure_available()?;
        if value < self.config.key_price {
            return Err(TiergateError::InsufficientPayment {
                price: self.config.key_price,
                paid: value,
            });
        }
        let slot = self.reserve_slot(identity)?;

        let hook = self
            .hook
            .read()
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or(TiergateError::HookNotSet(self.address))?;

        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let event = PurchaseEvent {
            purchase_id: PurchaseId::deterministic(&self.address, sequence),
            identity,
            lock: self.address,
            amount_paid: value,
        };
        self.ledger.hold(event.purchase_id, identity, value)?;

        let decision = match hook.on_key_purchase(&event) {
            Ok(decision) => decision,
            Err(err) => {
                self.ledger.release(event.purchase_id)?;
                tracing::warn!(
                    lock = %self.address,
                    %identity,
                    purchase_id = %event.purchase_id,
                    error = %err,
                    "Purchase hook failed; payment released"
                );
                return Err(err);
            }
        };

        if let Verdict::Reject(reason) = &decision.verdict {
            self.ledger.release(event.purchase_id)?;
            return Err(TiergateError::PurchaseRejected(reason.clone()));
        }

        let retained = self.ledger.capture(event.purchase_id, self.address)?;
        let expires_at = if decision.verdict.grants_key() {
            Some(self.write_key(identity, slot))
        } else {
            self.state().keys.get(&identity).copied()
        };

        hook.on_key_purchased(&event, &decision.verdict);
        tracing::info!(
            lock = %self.address,
            %identity,
            purchase_id = %event.purchase_id,
            verdict = %decision.verdict,
            %retained,
            "Purchase finalized"
        );

        Ok(PurchaseReceipt {
            purchase_id: event.purchase_id,
            lock: self.address,
            verdict: decision.verdict.clone(),
            expires_at,
            retained,
        })
    }

    /// Claim a key slot for `identity`. A current key holder needs none;
    /// anyone else needs valid keys plus in-flight reservations to be under
    /// the cap.
    fn reserve_slot(&self, identity: IdentityId) -> Result<SlotReservation<'_>> {
        let mut slot = SlotReservation {
            lock: self,
            held: false,
        };
        let Some(max) = self.config.max_number_of_keys else {
            return Ok(slot);
        };
        let now = Utc::now();
        let mut state = self.state();
        if state.keys.get(&identity).is_some_and(|exp| *exp > now) {
            return Ok(slot);
        }
        let valid = state.keys.values().filter(|exp| **exp > now).count();
        if valid + state.reserved >= max {
            return Err(TiergateError::LockSoldOut(self.address));
        }
        state.reserved += 1;
        slot.held = true;
        Ok(slot)
    }

    /// Extend from the later of now and the current expiration, saturating
    /// at the latest representable instant.
    fn write_key(&self, identity: IdentityId, slot: SlotReservation<'_>) -> DateTime<Utc> {
        let now = Utc::now();
        let mut state = self.state();
        let base = state
            .keys
            .get(&identity)
            .copied()
            .filter(|exp| *exp > now)
            .unwrap_or(now);
        let expires_at = base
            .checked_add_signed(self.key_lifetime)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        state.keys.insert(identity, expires_at);
        slot.settle(&mut state);
        expires_at
    }

    /// Key slots currently claimed by in-flight purchases.
    #[must_use]
    pub fn reserved_slots(&self) -> usize {
        self.state().reserved
    }
}

impl LockRegistry for InMemoryLock {
    fn address(&self) -> Address {
        self.address
    }

    fn name(&self) -> String {
        self.config.name.clone()
    }

    fn key_price(&self) -> Result<Decimal> {
        self.ensure_available()?;
        Ok(self.config.key_price)
    }

    fn key_expiration(&self, identity: IdentityId) -> Result<Option<DateTime<Utc>>> {
        self.ensure_available()?;
        Ok(self.state().keys.get(&identity).copied())
    }

    fn expire_membership(&self, manager: Address, identity: IdentityId) -> Result<()> {
        self.ensure_available()?;
        let mut state = self.state();
        Self::ensure_manager(&state, self.address, manager)?;
        let now = Utc::now();
        let expires_at = state
            .keys
            .get_mut(&identity)
            .ok_or(TiergateError::NoMembership {
                lock: self.address,
                identity,
            })?;
        if *expires_at > now {
            *expires_at = now;
        }
        Ok(())
    }

    fn restore_membership(
        &self,
        manager: Address,
        identity: IdentityId,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        self.ensure_available()?;
        let mut state = self.state();
        Self::ensure_manager(&state, self.address, manager)?;
        state.keys.insert(identity, expires_at);
        Ok(())
    }

    fn is_lock_manager(&self, account: Address) -> Result<bool> {
        self.ensure_available()?;
        Ok(self.state().managers.contains(&account))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::HookDecision;
    use tiergate_types::RejectReason;

    const OWNER: Address = Address([1u8; 20]);

    /// Hook that answers every purchase with a fixed verdict.
    struct FixedHook {
        verdict: Verdict,
        finalized: Mutex<Vec<Verdict>>,
    }

    impl FixedHook {
        fn new(verdict: Verdict) -> Arc<Self> {
            Arc::new(Self {
                verdict,
                finalized: Mutex::new(Vec::new()),
            })
        }
    }

    impl PurchaseHook for FixedHook {
        fn on_key_purchase(&self, _event: &PurchaseEvent) -> Result<HookDecision> {
            Ok(HookDecision::new(self.verdict.clone()))
        }

        fn on_key_purchased(&self, _event: &PurchaseEvent, verdict: &Verdict) {
            self.finalized.lock().push(verdict.clone());
        }
    }

    struct FailingHook;

    impl PurchaseHook for FailingHook {
        fn on_key_purchase(&self, event: &PurchaseEvent) -> Result<HookDecision> {
            Err(TiergateError::RegistryUnavailable {
                lock: event.lock,
                reason: "test".into(),
            })
        }

        fn on_key_purchased(&self, _event: &PurchaseEvent, _verdict: &Verdict) {}
    }

    fn basic_lock() -> (InMemoryLock, Arc<PaymentLedger>, IdentityId) {
        let ledger = Arc::new(PaymentLedger::new());
        let lock = InMemoryLock::new(LockConfig::basic(), OWNER, ledger.clone()).unwrap();
        let user = IdentityId::new();
        ledger.deposit(user, Decimal::ONE);
        (lock, ledger, user)
    }

    #[test]
    fn purchase_without_hook_fails() {
        let (lock, ledger, user) = basic_lock();
        let err = lock.purchase(user, Decimal::new(1, 1)).unwrap_err();
        assert!(matches!(err, TiergateError::HookNotSet(_)));
        assert_eq!(ledger.wallet(user), Decimal::ONE);
    }

    #[test]
    fn accepted_purchase_grants_key_and_pays_treasury() {
        let (lock, ledger, user) = basic_lock();
        let hook = FixedHook::new(Verdict::AcceptNew);
        let dyn_hook: Arc<dyn PurchaseHook> = hook.clone();
        lock.set_event_hook(OWNER, &dyn_hook).unwrap();

        let receipt = lock.purchase(user, Decimal::new(1, 1)).unwrap();
        assert_eq!(receipt.verdict, Verdict::AcceptNew);
        assert_eq!(receipt.retained, Decimal::new(1, 1));
        assert!(lock.has_valid_membership(user).unwrap());
        assert_eq!(lock.total_keys(), 1);
        assert_eq!(ledger.treasury(lock.address()), Decimal::new(1, 1));
        assert_eq!(hook.finalized.lock().len(), 1);
        ledger.verify_supply().unwrap();
    }

    #[test]
    fn underpayment_rejected_before_hook() {
        let (lock, _ledger, user) = basic_lock();
        let err = lock.purchase(user, Decimal::new(1, 2)).unwrap_err();
        assert!(matches!(err, TiergateError::InsufficientPayment { .. }));
    }

    #[test]
    fn rejected_purchase_grants_nothing() {
        let (lock, ledger, user) = basic_lock();
        let hook: Arc<dyn PurchaseHook> =
            FixedHook::new(Verdict::Reject(RejectReason::InvariantViolation));
        lock.set_event_hook(OWNER, &hook).unwrap();

        let err = lock.purchase(user, Decimal::new(1, 1)).unwrap_err();
        assert!(matches!(
            err,
            TiergateError::PurchaseRejected(RejectReason::InvariantViolation)
        ));
        assert!(!lock.has_valid_membership(user).unwrap());
        assert_eq!(ledger.open_holds(), 0);
        // The fixed hook never refunded, so the released hold returns the payment.
        assert_eq!(ledger.wallet(user), Decimal::ONE);
    }

    #[test]
    fn hook_error_releases_payment() {
        let (lock, ledger, user) = basic_lock();
        let hook: Arc<dyn PurchaseHook> = Arc::new(FailingHook);
        lock.set_event_hook(OWNER, &hook).unwrap();

        assert!(lock.purchase(user, Decimal::new(1, 1)).is_err());
        assert_eq!(ledger.wallet(user), Decimal::ONE);
        assert_eq!(ledger.open_holds(), 0);
        assert_eq!(lock.total_keys(), 0);
    }

    #[test]
    fn renewal_extends_from_current_expiration() {
        let (lock, _ledger, user) = basic_lock();
        let hook: Arc<dyn PurchaseHook> = FixedHook::new(Verdict::Renew { refunded: false });
        lock.set_event_hook(OWNER, &hook).unwrap();

        let current = Utc::now() + Duration::hours(2);
        lock.grant_key(OWNER, user, current).unwrap();
        let receipt = lock.purchase(user, Decimal::new(1, 1)).unwrap();
        assert_eq!(
            receipt.expires_at,
            Some(current + Duration::seconds(LockConfig::basic().expiration_duration_secs))
        );
    }

    #[test]
    fn only_managers_mutate() {
        let (lock, _ledger, user) = basic_lock();
        let stranger = Address::derive("stranger");
        let err = lock.expire_membership(stranger, user).unwrap_err();
        assert!(matches!(err, TiergateError::NotLockManager { .. }));
        assert!(lock.add_lock_manager(stranger, stranger).is_err());

        lock.add_lock_manager(OWNER, stranger).unwrap();
        assert!(lock.is_lock_manager(stranger).unwrap());

        lock.remove_lock_manager(stranger, OWNER).unwrap();
        assert!(!lock.is_lock_manager(OWNER).unwrap());
        assert!(lock.grant_key(OWNER, user, Utc::now()).is_err());
    }

    #[test]
    fn expire_then_restore() {
        let (lock, _ledger, user) = basic_lock();
        let expires_at = Utc::now() + Duration::days(3);
        lock.grant_key(OWNER, user, expires_at).unwrap();

        lock.expire_membership(OWNER, user).unwrap();
        assert!(!lock.has_valid_membership(user).unwrap());

        lock.restore_membership(OWNER, user, expires_at).unwrap();
        assert_eq!(lock.key_expiration(user).unwrap(), Some(expires_at));
    }

    #[test]
    fn expire_without_key_fails() {
        let (lock, _ledger, user) = basic_lock();
        let err = lock.expire_membership(OWNER, user).unwrap_err();
        assert!(matches!(err, TiergateError::NoMembership { .. }));
    }

    #[test]
    fn offline_lock_fails_queries() {
        let (lock, _ledger, user) = basic_lock();
        lock.set_available(false);
        assert!(matches!(
            lock.has_valid_membership(user),
            Err(TiergateError::RegistryUnavailable { .. })
        ));
        assert!(lock.key_price().is_err());
        lock.set_available(true);
        assert!(!lock.has_valid_membership(user).unwrap());
    }

    #[test]
    fn sold_out_lock_refuses_new_holders() {
        let ledger = Arc::new(PaymentLedger::new());
        let config = LockConfig {
            max_number_of_keys: Some(1),
            ..LockConfig::basic()
        };
        let lock = InMemoryLock::new(config, OWNER, ledger.clone()).unwrap();
        let hook: Arc<dyn PurchaseHook> = FixedHook::new(Verdict::AcceptNew);
        lock.set_event_hook(OWNER, &hook).unwrap();

        let first = IdentityId::new();
        let second = IdentityId::new();
        ledger.deposit(first, Decimal::ONE);
        ledger.deposit(second, Decimal::ONE);

        lock.purchase(first, Decimal::new(1, 1)).unwrap();
        let err = lock.purchase(second, Decimal::new(1, 1)).unwrap_err();
        assert!(matches!(err, TiergateError::LockSoldOut(_)));
    }

    /// Hook that, while deciding the first purchase, tries to buy the same
    /// lock for a second identity.
    struct CompetingHook {
        lock: Mutex<Option<Arc<InMemoryLock>>>,
        rival: IdentityId,
        rival_result: Mutex<Option<Result<PurchaseReceipt>>>,
    }

    impl PurchaseHook for CompetingHook {
        fn on_key_purchase(&self, event: &PurchaseEvent) -> Result<HookDecision> {
            if event.identity != self.rival {
                if let Some(lock) = self.lock.lock().take() {
                    let result = lock.purchase(self.rival, Decimal::new(1, 1));
                    *self.rival_result.lock() = Some(result);
                }
            }
            Ok(HookDecision::new(Verdict::AcceptNew))
        }

        fn on_key_purchased(&self, _event: &PurchaseEvent, _verdict: &Verdict) {}
    }

    fn single_key_lock() -> (Arc<InMemoryLock>, Arc<PaymentLedger>) {
        let ledger = Arc::new(PaymentLedger::new());
        let config = LockConfig {
            max_number_of_keys: Some(1),
            ..LockConfig::basic()
        };
        let lock = Arc::new(InMemoryLock::new(config, OWNER, ledger.clone()).unwrap());
        (lock, ledger)
    }

    #[test]
    fn in_flight_purchase_holds_the_last_slot() {
        let (lock, ledger) = single_key_lock();
        let first = IdentityId::new();
        let rival = IdentityId::new();
        ledger.deposit(first, Decimal::ONE);
        ledger.deposit(rival, Decimal::ONE);
        let hook = Arc::new(CompetingHook {
            lock: Mutex::new(Some(lock.clone())),
            rival,
            rival_result: Mutex::new(None),
        });
        let dyn_hook: Arc<dyn PurchaseHook> = hook.clone();
        lock.set_event_hook(OWNER, &dyn_hook).unwrap();

        lock.purchase(first, Decimal::new(1, 1)).unwrap();

        let rival_result = hook.rival_result.lock().take().unwrap();
        assert!(matches!(rival_result, Err(TiergateError::LockSoldOut(_))));
        assert_eq!(lock.total_keys(), 1);
        assert_eq!(lock.reserved_slots(), 0);
        assert_eq!(ledger.wallet(rival), Decimal::ONE);
        ledger.verify_supply().unwrap();
    }

    #[test]
    fn failed_purchase_frees_its_slot() {
        let (lock, ledger) = single_key_lock();
        let user = IdentityId::new();
        ledger.deposit(user, Decimal::ONE);

        let failing: Arc<dyn PurchaseHook> = Arc::new(FailingHook);
        lock.set_event_hook(OWNER, &failing).unwrap();
        assert!(lock.purchase(user, Decimal::new(1, 1)).is_err());
        assert_eq!(lock.reserved_slots(), 0);

        let rejecting: Arc<dyn PurchaseHook> =
            FixedHook::new(Verdict::Reject(RejectReason::InvariantViolation));
        lock.set_event_hook(OWNER, &rejecting).unwrap();
        assert!(lock.purchase(user, Decimal::new(1, 1)).is_err());
        assert_eq!(lock.reserved_slots(), 0);

        let accepting: Arc<dyn PurchaseHook> = FixedHook::new(Verdict::AcceptNew);
        lock.set_event_hook(OWNER, &accepting).unwrap();
        lock.purchase(user, Decimal::new(1, 1)).unwrap();
        assert_eq!(lock.total_keys(), 1);
    }

    #[test]
    fn invalid_lock_config_refused() {
        let ledger = Arc::new(PaymentLedger::new());
        for secs in [-3_600, 0, i64::MAX] {
            let config = LockConfig {
                expiration_duration_secs: secs,
                ..LockConfig::basic()
            };
            let err = InMemoryLock::new(config, OWNER, ledger.clone())
                .err()
                .unwrap();
            assert!(err.is_config_error(), "{secs}: {err}");
        }
    }

    #[test]
    fn key_extension_saturates() {
        let (lock, _ledger, user) = basic_lock();
        let hook: Arc<dyn PurchaseHook> = FixedHook::new(Verdict::Renew { refunded: false });
        lock.set_event_hook(OWNER, &hook).unwrap();
        lock.grant_key(OWNER, user, DateTime::<Utc>::MAX_UTC - Duration::days(1))
            .unwrap();

        let receipt = lock.purchase(user, Decimal::new(1, 1)).unwrap();
        assert_eq!(receipt.expires_at, Some(DateTime::<Utc>::MAX_UTC));
    }

    #[test]
    fn dropped_hook_counts_as_unset() {
        let (lock, _ledger, user) = basic_lock();
        let hook: Arc<dyn PurchaseHook> = FixedHook::new(Verdict::AcceptNew);
        lock.set_event_hook(OWNER, &hook).unwrap();
        drop(hook);
        let err = lock.purchase(user, Decimal::new(1, 1)).unwrap_err();
        assert!(matches!(err, TiergateError::HookNotSet(_)));
    }
}
