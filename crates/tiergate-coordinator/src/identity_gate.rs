//! Per-identity purchase exclusion.
//!
//! Locks share no transaction, so two purchases by the same identity on two
//! different locks could each read "no membership" and each grant a key. The
//! gate serializes purchase decisions per identity: a permit is taken before
//! the first membership query and released only after the selling lock has
//! finalized the purchase. Different identities never wait on each other.
//!
//! Permits are not re-entrant. Acquiring a second permit for the same
//! identity on the same thread deadlocks.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex, MutexGuard};
use tiergate_types::IdentityId;

#[derive(Default)]
pub struct IdentityGate {
    in_flight: Mutex<HashSet<IdentityId>>,
    released: Condvar,
}

impl IdentityGate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn in_flight(&self) -> MutexGuard<'_, HashSet<IdentityId>> {
        self.in_flight.lock()
    }

    /// Block until no other purchase for `identity` is in flight, then take
    /// the permit.
    pub fn acquire(self: &Arc<Self>, identity: IdentityId) -> IdentityPermit {
        let mut in_flight = self.in_flight();
        while in_flight.contains(&identity) {
            self.released.wait(&mut in_flight);
        }
        in_flight.insert(identity);
        IdentityPermit {
            gate: Arc::clone(self),
            identity,
        }
    }

    /// Take the permit only if it is free.
    pub fn try_acquire(self: &Arc<Self>, identity: IdentityId) -> Option<IdentityPermit> {
        let mut in_flight = self.in_flight();
        if !in_flight.insert(identity) {
            return None;
        }
        Some(IdentityPermit {
            gate: Arc::clone(self),
            identity,
        })
    }

    pub fn is_held(&self, identity: IdentityId) -> bool {
        self.in_flight().contains(&identity)
    }

    pub fn held_count(&self) -> usize {
        self.in_flight().len()
    }
}

/// Exclusive right to decide a purchase for one identity. Released on drop.
pub struct IdentityPermit {
    gate: Arc<IdentityGate>,
    identity: IdentityId,
}

impl IdentityPermit {
    #[must_use]
    pub fn identity(&self) -> IdentityId {
        self.identity
    }
}

impl Drop for IdentityPermit {
    fn drop(&mut self) {
        self.gate.in_flight().remove(&self.identity);
        self.gate.released.notify_all();
    }
}
