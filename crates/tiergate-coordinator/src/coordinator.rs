//! The purchase coordinator.
//!
//! Invoked by a lock before a purchase's key becomes visible. Derives the
//! purchaser's current memberships by querying every tier (never cached),
//! classifies the transition, applies expirations through a
//! [`UnitOfWork`], and asks the [`SettlementResolver`] for refunds.
//!
//! | Valid before (other tiers) | Target valid | Verdict |
//! |---|---|---|
//! | none | no | `AcceptNew` |
//! | none | yes | `Renew` (refund or extend, per policy) |
//! | one, price ≤ target | no | `AcceptReplace`, old tier expired |
//! | one, price > target | no | `Reject(AlreadyHoldsHigherTier)`, refund |
//! | anything else | any | `Reject(InvariantViolation)`, refund, diagnostic |
//!
//! Any lock failure while deciding becomes `Reject(RegistryUnavailable)` with
//! a full refund. Refund failures abort the purchase with an error.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tiergate_registry::{HookDecision, LockRegistry, PurchaseHook};
use tiergate_settlement::{RefundTransfer, RenewalOutcome, RenewalPolicy, SettlementResolver};
use tiergate_types::{
    Address, CoordinatorConfig, IdentityId, PurchaseEvent, PurchaseId, RejectReason, Result,
    TierId, TiergateError, Verdict, constants,
};

use crate::catalog::{Tier, TierCatalog};
use crate::identity_gate::IdentityGate;
use crate::unit_of_work::UnitOfWork;

/// Something the coordinator refused to repair on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// More than one tier was valid when a purchase arrived.
    InvariantViolation { tiers: Vec<TierId> },
    /// More than one tier was valid after a purchase was finalized.
    PostPurchaseViolation { tiers: Vec<TierId> },
    /// A rollback could not restore an expired membership.
    RollbackFailed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub identity: IdentityId,
    pub purchase_id: Option<PurchaseId>,
    pub kind: DiagnosticKind,
    pub recorded_at: DateTime<Utc>,
}

pub struct PurchaseCoordinator {
    catalog: TierCatalog,
    resolver: SettlementResolver,
    /// Address used for lock-manager calls.
    manager: Address,
    gate: Arc<IdentityGate>,
    diagnostics: Mutex<VecDeque<Diagnostic>>,
    max_diagnostics: usize,
}

impl PurchaseCoordinator {
    #[must_use]
    pub fn new(catalog: TierCatalog, resolver: SettlementResolver, manager: Address) -> Self {
        Self {
            catalog,
            resolver,
            manager,
            gate: Arc::new(IdentityGate::new()),
            diagnostics: Mutex::new(VecDeque::new()),
            max_diagnostics: constants::MAX_DIAGNOSTICS,
        }
    }

    /// Wire a coordinator from configuration. Without explicit tiers in
    /// `cfg`, the catalog is read off `locks` in order.
    ///
    /// # Errors
    /// Any configuration error, including `MissingManagerRights` if
    /// `cfg.manager` cannot expire memberships on every tier's lock.
    pub fn from_config(
        cfg: &CoordinatorConfig,
        locks: Vec<Arc<dyn LockRegistry>>,
        transfer: Arc<dyn RefundTransfer>,
    ) -> Result<Self> {
        cfg.validate()?;
        let catalog = if cfg.tiers.is_empty() {
            TierCatalog::from_locks(locks)?
        } else {
            TierCatalog::from_config(&cfg.tiers, &locks)?
        };
        Self::ensure_manager_rights(&catalog, cfg.manager)?;
        let resolver = SettlementResolver::new(
            transfer,
            RenewalPolicy::from_config(&cfg.renewal)?,
            cfg.refund_log_capacity,
        );
        let mut coordinator = Self::new(catalog, resolver, cfg.manager);
        coordinator.max_diagnostics = cfg.max_diagnostics;
        Ok(coordinator)
    }

    fn ensure_manager_rights(catalog: &TierCatalog, manager: Address) -> Result<()> {
        for tier in catalog.tiers() {
            let lock = tier.address();
            let granted = tier
                .lock
                .is_lock_manager(manager)
                .map_err(|err| TiergateError::UnreachableLock {
                    lock,
                    reason: err.to_string(),
                })?;
            if !granted {
                tracing::error!(tier = %tier.id, %lock, %manager, "Coordinator lacks manager rights");
                return Err(TiergateError::MissingManagerRights { lock, manager });
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn catalog(&self) -> &TierCatalog {
        &self.catalog
    }

    #[must_use]
    pub fn resolver(&self) -> &SettlementResolver {
        &self.resolver
    }

    #[must_use]
    pub fn manager(&self) -> Address {
        self.manager
    }

    #[must_use]
    pub fn gate(&self) -> &Arc<IdentityGate> {
        &self.gate
    }

    /// Decide one purchase.
    ///
    /// The caller must hold the purchaser's identity permit;
    /// [`PurchaseHook::on_key_purchase`] takes it before calling this.
    pub fn on_purchase(&self, event: &PurchaseEvent) -> Result<Verdict> {
        let target = self
            .catalog
            .tier_for_lock(event.lock)
            .ok_or(TiergateError::UnknownLock(event.lock))?;

        let mut uow = UnitOfWork::begin(self.manager);
        let decided = self.decide(target, event, &mut uow);

        match decided {
            Ok(Verdict::Reject(reason)) => {
                self.rollback(uow, event)?;
                self.reject(event, reason)
            }
            Ok(verdict) => {
                uow.commit();
                tracing::info!(
                    identity = %event.identity,
                    tier = %target.id,
                    purchase_id = %event.purchase_id,
                    %verdict,
                    "Purchase accepted"
                );
                Ok(verdict)
            }
            Err(err) if err.is_registry_failure() => {
                tracing::warn!(
                    identity = %event.identity,
                    tier = %target.id,
                    error = %err,
                    "Cross-tier state unverifiable"
                );
                self.rollback(uow, event)?;
                self.reject(event, RejectReason::RegistryUnavailable)
            }
            Err(err) => {
                self.rollback(uow, event)?;
                Err(err)
            }
        }
    }

    fn decide(&self, target: &Tier, event: &PurchaseEvent, uow: &mut UnitOfWork) -> Result<Verdict> {
        let identity = event.identity;
        let target_held = target.lock.has_valid_membership(identity)?;
        let mut held_others = Vec::new();
        for tier in self.catalog.other_tiers(&target.id) {
            let valid = tier.lock.has_valid_membership(identity)?;
            tracing::debug!(%identity, tier = %tier.id, valid, "Membership queried");
            if valid {
                held_others.push(tier);
            }
        }

        match (held_others.as_slice(), target_held) {
            ([], false) => Ok(Verdict::AcceptNew),
            ([], true) => self.renew(target, event),
            ([old], false) if target.price >= old.price => {
                uow.expire(old, identity)?;
                if old.lock.has_valid_membership(identity)? {
                    return Err(TiergateError::RegistryUnavailable {
                        lock: old.address(),
                        reason: "expiration did not take effect".into(),
                    });
                }
                Ok(Verdict::AcceptReplace {
                    superseded: old.id.clone(),
                })
            }
            ([old], false) => Ok(Verdict::Reject(RejectReason::AlreadyHoldsHigherTier {
                held: old.id.clone(),
            })),
            (others, target_held) => {
                let mut tiers: Vec<TierId> = others.iter().map(|t| t.id.clone()).collect();
                if target_held {
                    tiers.push(target.id.clone());
                }
                tracing::error!(
                    %identity,
                    purchase_id = %event.purchase_id,
                    tiers = ?tiers,
                    "Multiple valid memberships before purchase"
                );
                self.record(Diagnostic {
                    identity,
                    purchase_id: Some(event.purchase_id),
                    kind: DiagnosticKind::InvariantViolation { tiers },
                    recorded_at: Utc::now(),
                });
                Ok(Verdict::Reject(RejectReason::InvariantViolation))
            }
        }
    }

    fn renew(&self, target: &Tier, event: &PurchaseEvent) -> Result<Verdict> {
        let expires_at = target.lock.key_expiration(event.identity)?;
        match self.resolver.resolve_renewal(expires_at, Utc::now()) {
            RenewalOutcome::Refund => {
                self.resolver
                    .refund(event.purchase_id, event.identity, event.amount_paid)?;
                Ok(Verdict::Renew { refunded: true })
            }
            RenewalOutcome::Extend => Ok(Verdict::Renew { refunded: false }),
        }
    }

    fn reject(&self, event: &PurchaseEvent, reason: RejectReason) -> Result<Verdict> {
        self.resolver
            .refund(event.purchase_id, event.identity, event.amount_paid)?;
        tracing::warn!(
            identity = %event.identity,
            purchase_id = %event.purchase_id,
            %reason,
            refunded = %event.amount_paid,
            "Purchase rejected"
        );
        Ok(Verdict::Reject(reason))
    }

    fn rollback(&self, uow: UnitOfWork, event: &PurchaseEvent) -> Result<()> {
        uow.rollback().inspect_err(|err| {
            self.record(Diagnostic {
                identity: event.identity,
                purchase_id: Some(event.purchase_id),
                kind: DiagnosticKind::RollbackFailed {
                    reason: err.to_string(),
                },
                recorded_at: Utc::now(),
            });
        })
    }

    /// Tiers in which `identity` currently holds a valid membership.
    pub fn valid_tiers(&self, identity: IdentityId) -> Result<Vec<TierId>> {
        let mut tiers = Vec::new();
        for tier in self.catalog.tiers() {
            if tier.lock.has_valid_membership(identity)? {
                tiers.push(tier.id.clone());
            }
        }
        Ok(tiers)
    }

    pub fn valid_membership_count(&self, identity: IdentityId) -> Result<usize> {
        Ok(self.valid_tiers(identity)?.len())
    }

    /// The single tier `identity` holds, if any.
    ///
    /// # Errors
    /// `InvariantViolation` if more than one tier is valid.
    pub fn current_tier(&self, identity: IdentityId) -> Result<Option<TierId>> {
        let mut tiers = self.valid_tiers(identity)?;
        if tiers.len() > 1 {
            return Err(TiergateError::InvariantViolation { identity, tiers });
        }
        Ok(tiers.pop())
    }

    fn record(&self, diagnostic: Diagnostic) {
        let mut diagnostics = self.diagnostics.lock();
        if diagnostics.len() >= self.max_diagnostics {
            diagnostics.pop_front();
        }
        diagnostics.push_back(diagnostic);
    }

    /// Recorded diagnostics, oldest first.
    #[must_use]
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics
            .lock()
            .iter()
            .cloned()
            .collect()
    }
}

impl PurchaseHook for PurchaseCoordinator {
    fn on_key_purchase(&self, event: &PurchaseEvent) -> Result<HookDecision> {
        let permit = self.gate.acquire(event.identity);
        let verdict = self.on_purchase(event)?;
        Ok(HookDecision::with_permit(verdict, permit))
    }

    fn on_key_purchased(&self, event: &PurchaseEvent, verdict: &Verdict) {
        match self.valid_tiers(event.identity) {
            Ok(tiers) if tiers.len() > 1 => {
                tracing::error!(
                    identity = %event.identity,
                    purchase_id = %event.purchase_id,
                    %verdict,
                    tiers = ?tiers,
                    "Multiple valid memberships after purchase"
                );
                self.record(Diagnostic {
                    identity: event.identity,
                    purchase_id: Some(event.purchase_id),
                    kind: DiagnosticKind::PostPurchaseViolation { tiers },
                    recorded_at: Utc::now(),
                });
            }
            Ok(tiers) => {
                tracing::debug!(identity = %event.identity, tiers = ?tiers, "Post-purchase check passed");
            }
            Err(err) => {
                tracing::warn!(
                    identity = %event.identity,
                    error = %err,
                    "Post-purchase check skipped"
                );
            }
        }
    }
}
