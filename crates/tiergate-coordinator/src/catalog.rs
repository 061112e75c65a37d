//! Tier catalog: the static, ordered list of tiers and their locks.
//!
//! Read-only after construction. Construction validates that the list is
//! non-empty, that no tier name or lock address repeats, and that every lock
//! answers a price probe.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use rust_decimal::Decimal;
use tiergate_registry::LockRegistry;
use tiergate_types::{Address, Result, TierConfig, TierId, TiergateError, constants};

/// One priced membership level backed by its own lock.
#[derive(Clone)]
pub struct Tier {
    pub id: TierId,
    pub lock: Arc<dyn LockRegistry>,
    pub price: Decimal,
}

impl Tier {
    #[must_use]
    pub fn new(id: impl Into<TierId>, lock: Arc<dyn LockRegistry>, price: Decimal) -> Self {
        Self {
            id: id.into(),
            lock,
            price,
        }
    }

    #[must_use]
    pub fn address(&self) -> Address {
        self.lock.address()
    }
}

impl fmt::Debug for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tier")
            .field("id", &self.id)
            .field("lock", &self.lock.address())
            .field("price", &self.price)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct TierCatalog {
    tiers: Vec<Tier>,
}

impl TierCatalog {
    /// Build a catalog from explicit tiers, in the given order.
    pub fn new(tiers: Vec<Tier>) -> Result<Self> {
        if tiers.is_empty() {
            return Err(TiergateError::EmptyCatalog);
        }
        if tiers.len() > constants::MAX_TIERS {
            return Err(TiergateError::Configuration(format!(
                "at most {} tiers supported, got {}",
                constants::MAX_TIERS,
                tiers.len()
            )));
        }

        let mut names = HashSet::new();
        let mut addresses = HashSet::new();
        for tier in &tiers {
            if tier.id.as_str().trim().is_empty() {
                return Err(TiergateError::InvalidTier {
                    tier: tier.id.to_string(),
                    reason: "name is blank".into(),
                });
            }
            if tier.price.is_sign_negative() {
                return Err(TiergateError::InvalidTier {
                    tier: tier.id.to_string(),
                    reason: format!("negative price {}", tier.price),
                });
            }
            if !names.insert(tier.id.clone()) {
                return Err(TiergateError::DuplicateTier(tier.id.to_string()));
            }
            let address = tier.address();
            if address.is_zero() {
                return Err(TiergateError::InvalidTier {
                    tier: tier.id.to_string(),
                    reason: "lock address is zero".into(),
                });
            }
            if !addresses.insert(address) {
                return Err(TiergateError::DuplicateTier(format!(
                    "{} (lock {address})",
                    tier.id
                )));
            }
            probe(tier.lock.as_ref())?;
        }

        tracing::info!(
            tiers = tiers.len(),
            names = ?tiers.iter().map(|t| t.id.as_str()).collect::<Vec<_>>(),
            "Tier catalog built"
        );
        Ok(Self { tiers })
    }

    /// Build a catalog from lock handles alone. Each lock's name becomes the
    /// tier name and its current key price the tier price.
    pub fn from_locks(locks: Vec<Arc<dyn LockRegistry>>) -> Result<Self> {
        let tiers = locks
            .into_iter()
            .map(|lock| {
                let price = probe(lock.as_ref())?;
                Ok(Tier::new(lock.name(), lock, price))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(tiers)
    }

    /// Build a catalog from tier configs, resolving each config's lock
    /// address against `locks`.
    pub fn from_config(configs: &[TierConfig], locks: &[Arc<dyn LockRegistry>]) -> Result<Self> {
        let tiers = configs
            .iter()
            .map(|cfg| {
                let lock = locks
                    .iter()
                    .find(|lock| lock.address() == cfg.lock)
                    .cloned()
                    .ok_or_else(|| {
                        TiergateError::Configuration(format!(
                            "tier {} references unknown lock {}",
                            cfg.name, cfg.lock
                        ))
                    })?;
                Ok(Tier::new(cfg.name.clone(), lock, cfg.price))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(tiers)
    }

    /// All tiers in catalog order.
    #[must_use]
    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    /// Every tier except `target`, in catalog order.
    pub fn other_tiers<'a>(&'a self, target: &'a TierId) -> impl Iterator<Item = &'a Tier> + 'a {
        self.tiers.iter().filter(move |tier| tier.id != *target)
    }

    #[must_use]
    pub fn tier(&self, id: &TierId) -> Option<&Tier> {
        self.tiers.iter().find(|tier| tier.id == *id)
    }

    #[must_use]
    pub fn tier_for_lock(&self, address: Address) -> Option<&Tier> {
        self.tiers.iter().find(|tier| tier.address() == address)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    /// Always false for a constructed catalog.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }
}

fn probe(lock: &dyn LockRegistry) -> Result<Decimal> {
    lock.key_price()
        .map_err(|err| TiergateError::UnreachableLock {
            lock: lock.address(),
            reason: err.to_string(),
        })
}
