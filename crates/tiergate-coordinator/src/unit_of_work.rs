//! Journaled unit of work over lock mutations.
//!
//! Every expiration the coordinator applies during one decision is recorded
//! with the expiration it replaced. `commit()` keeps them; `rollback()` (or
//! dropping the unit uncommitted) restores them newest-first, so a rejected
//! or failed decision never leaves an expired-but-unreplaced membership.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tiergate_registry::LockRegistry;
use tiergate_types::{Address, IdentityId, Result, TierId, TiergateError};

use crate::catalog::Tier;

struct Expiration {
    tier: TierId,
    lock: Arc<dyn LockRegistry>,
    identity: IdentityId,
    previous: DateTime<Utc>,
}

pub struct UnitOfWork {
    manager: Address,
    journal: Vec<Expiration>,
    finished: bool,
}

impl UnitOfWork {
    /// Start a unit of work acting as lock manager `manager`.
    #[must_use]
    pub fn begin(manager: Address) -> Self {
        Self {
            manager,
            journal: Vec::new(),
            finished: false,
        }
    }

    /// Expire `identity`'s membership in `tier`, journaling the previous
    /// expiration.
    pub fn expire(&mut self, tier: &Tier, identity: IdentityId) -> Result<()> {
        let previous = tier
            .lock
            .key_expiration(identity)?
            .ok_or(TiergateError::NoMembership {
                lock: tier.address(),
                identity,
            })?;
        tier.lock.expire_membership(self.manager, identity)?;
        tracing::debug!(tier = %tier.id, %identity, %previous, "Membership expired");
        self.journal.push(Expiration {
            tier: tier.id.clone(),
            lock: Arc::clone(&tier.lock),
            identity,
            previous,
        });
        Ok(())
    }

    /// Tiers expired so far, oldest first.
    #[must_use]
    pub fn expired_tiers(&self) -> Vec<TierId> {
        self.journal.iter().map(|e| e.tier.clone()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.journal.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.journal.is_empty()
    }

    /// Keep every applied mutation.
    pub fn commit(mut self) {
        self.journal.clear();
        self.finished = true;
    }

    /// Undo every applied mutation, newest first. Keeps going past failures
    /// and returns the first one.
    pub fn rollback(mut self) -> Result<()> {
        self.finished = true;
        self.undo()
    }

    fn undo(&mut self) -> Result<()> {
        let mut first_err = None;
        while let Some(entry) = self.journal.pop() {
            match entry
                .lock
                .restore_membership(self.manager, entry.identity, entry.previous)
            {
                Ok(()) => tracing::warn!(
                    tier = %entry.tier,
                    identity = %entry.identity,
                    "Expiration rolled back"
                ),
                Err(err) => {
                    tracing::error!(
                        tier = %entry.tier,
                        identity = %entry.identity,
                        error = %err,
                        "Rollback of expiration failed"
                    );
                    first_err.get_or_insert(err);
                }
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        if !self.finished && !self.journal.is_empty() {
            // Errors are already logged by undo().
            let _ = self.undo();
        }
    }
}
